use std::{fmt, str};

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
/// Four character code representing a pixelformat
pub struct FourCC {
    pub repr: [u8; 4],
}

impl FourCC {
    /// Returns a pixelformat as four character code
    ///
    /// # Arguments
    ///
    /// * `repr` - Four characters as raw bytes
    ///
    /// # Example
    ///
    /// ```
    /// use stk1160::format::FourCC;
    /// let fourcc = FourCC::new(b"UYVY");
    /// ```
    pub const fn new(repr: &[u8; 4]) -> FourCC {
        FourCC { repr: *repr }
    }

    /// Returns the string representation of a four character code
    pub fn str(&self) -> Result<&str, str::Utf8Error> {
        str::from_utf8(&self.repr)
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.str() {
            Ok(s) => write!(f, "{}", s),
            Err(_) => write!(f, "0x{:08x}", u32::from(*self)),
        }
    }
}

impl From<u32> for FourCC {
    fn from(code: u32) -> Self {
        FourCC::new(&code.to_le_bytes())
    }
}

impl From<FourCC> for u32 {
    fn from(fourcc: FourCC) -> Self {
        Self::from_le_bytes(fourcc.repr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_matches_v4l2() {
        // V4L2_PIX_FMT_UYVY
        assert_eq!(u32::from(FourCC::new(b"UYVY")), 0x5956_5955);
        assert_eq!(FourCC::from(0x5956_5955), FourCC::new(b"UYVY"));
    }

    #[test]
    fn display_falls_back_to_hex() {
        assert_eq!(FourCC::new(b"UYVY").to_string(), "UYVY");
        assert_eq!(FourCC::new(&[0xff, 0, 0, 0]).to_string(), "0x000000ff");
    }
}
