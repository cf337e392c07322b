use std::fmt;

pub mod description;
pub use description::Description;

pub mod fourcc;
pub use fourcc::FourCC;

/// Packed 4:2:2, the only format the bridge delivers
pub const UYVY: FourCC = FourCC::new(b"UYVY");

/// Bytes per pixel of the packed format
pub const BYTES_PER_PIXEL: u32 = 2;

struct PixelFormat {
    name: &'static str,
    fourcc: FourCC,
    depth: u32,
}

static FORMATS: [PixelFormat; 1] = [PixelFormat {
    name: "16 bpp YUY2, 4:2:2, packed",
    fourcc: UYVY,
    depth: 16,
}];

/// Describes the format at `index`, `None` past the end of the table
pub fn describe(index: u32) -> Option<Description> {
    let fmt = FORMATS.get(index as usize)?;
    Some(Description {
        index,
        description: fmt.name.to_string(),
        fourcc: fmt.fourcc,
        depth: fmt.depth,
    })
}

/// Bytes needed for one frame of the given geometry
pub const fn frame_size(width: u32, height: u32) -> usize {
    (width * height * BYTES_PER_PIXEL) as usize
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Represents how fields are interlaced
pub enum FieldOrder {
    /// both fields interlaced
    Interlaced,
}

impl fmt::Display for FieldOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interlaced => write!(f, "interlaced"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Colorspace {
    /// SMPTE 170M, used by analog NTSC and PAL sources
    Smpte170M,
}

impl fmt::Display for Colorspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Smpte170M => write!(f, "SMPTE 170M"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Streaming format (single-planar)
pub struct Format {
    /// width in pixels
    pub width: u32,
    /// height in pixels
    pub height: u32,
    /// pixelformat code
    pub fourcc: FourCC,
    /// field order for interlacing
    pub field_order: FieldOrder,

    /// bytes per line
    pub stride: u32,
    /// maximum number of bytes required to store an image
    pub size: u32,

    /// supplements the pixelformat (fourcc) information
    pub colorspace: Colorspace,
}

impl Format {
    /// Returns a capture format
    ///
    /// Stride and size are left for negotiation to fill in.
    ///
    /// # Arguments
    ///
    /// * `width` - Width in pixels
    /// * `height` - Height in pixels
    /// * `fourcc` - Four character code (pixelformat)
    ///
    /// # Example
    ///
    /// ```
    /// use stk1160::format::{Format, FourCC};
    /// let fmt = Format::new(720, 480, FourCC::new(b"UYVY"));
    /// ```
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        Format {
            width,
            height,
            fourcc,
            field_order: FieldOrder::Interlaced,
            stride: 0,
            size: 0,
            colorspace: Colorspace::Smpte170M,
        }
    }

    /// Returns the format the bridge produces for a geometry
    pub(crate) fn captured(width: u32, height: u32) -> Self {
        let stride = width * BYTES_PER_PIXEL;
        Format {
            width,
            height,
            fourcc: UYVY,
            field_order: FieldOrder::Interlaced,
            stride,
            size: stride * height,
            colorspace: Colorspace::Smpte170M,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "width          : {}", self.width)?;
        writeln!(f, "height         : {}", self.height)?;
        writeln!(f, "fourcc         : {}", self.fourcc)?;
        writeln!(f, "field          : {}", self.field_order)?;
        writeln!(f, "stride         : {}", self.stride)?;
        writeln!(f, "size           : {}", self.size)?;
        writeln!(f, "colorspace     : {}", self.colorspace)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_format() {
        let desc = describe(0).unwrap();
        assert_eq!(desc.fourcc, UYVY);
        assert_eq!(desc.depth, 16);
        assert!(describe(1).is_none());
    }

    #[test]
    fn captured_geometry() {
        let fmt = Format::captured(720, 576);
        assert_eq!(fmt.stride, 1440);
        assert_eq!(fmt.size as usize, frame_size(720, 576));
        assert_eq!(fmt.field_order, FieldOrder::Interlaced);
    }
}
