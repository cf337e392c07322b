use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Device capability flags
    #[allow(clippy::unreadable_literal)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u32 {
        const VIDEO_CAPTURE         = 0x00000001;
        const VIDEO_OUTPUT          = 0x00000002;
        const VIDEO_OVERLAY         = 0x00000004;
        const VBI_CAPTURE           = 0x00000010;
        const TUNER                 = 0x00010000;
        const AUDIO                 = 0x00020000;
        const READ_WRITE            = 0x01000000;
        const ASYNC_IO              = 0x02000000;
        const STREAMING             = 0x04000000;
    }
}

impl From<u32> for Flags {
    fn from(flags: u32) -> Self {
        Self::from_bits_retain(flags)
    }
}

impl From<Flags> for u32 {
    fn from(flags: Flags) -> Self {
        flags.bits()
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut prefix = "";
        let mut print_flag = |flag: Flags, info: &str| -> fmt::Result {
            if self.contains(flag) {
                write!(f, "{}{}", prefix, info)?;
                prefix = ", ";
            }
            Ok(())
        };

        print_flag(Flags::VIDEO_CAPTURE, "Video Capture")?;
        print_flag(Flags::VIDEO_OUTPUT, "Video Output")?;
        print_flag(Flags::VIDEO_OVERLAY, "Video Overlay")?;
        print_flag(Flags::VBI_CAPTURE, "VBI Capture")?;
        print_flag(Flags::TUNER, "Tuner")?;
        print_flag(Flags::AUDIO, "Audio")?;
        print_flag(Flags::READ_WRITE, "Read/Write")?;
        print_flag(Flags::ASYNC_IO, "Async I/O")?;
        print_flag(Flags::STREAMING, "Streaming")?;

        // flags we do not have a name for
        let unknown = self.bits() & !Flags::all().bits();
        if unknown != 0 {
            write!(f, "{}0x{:08x}", prefix, unknown)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Device capabilities
pub struct Capabilities {
    /// Driver name
    pub driver: String,
    /// Card name
    pub card: String,
    /// Bus location of the grabber
    pub bus: String,
    /// Version number MAJOR.MINOR.PATCH
    pub version: (u8, u8, u8),

    /// Capability flags
    pub capabilities: Flags,
}

impl Capabilities {
    pub(crate) fn new(bus: String) -> Self {
        Capabilities {
            driver: String::from("stk1160"),
            card: String::from("stk1160"),
            bus,
            version: crate_version(),
            capabilities: Flags::VIDEO_CAPTURE | Flags::STREAMING | Flags::READ_WRITE,
        }
    }
}

fn crate_version() -> (u8, u8, u8) {
    let part = |s: &str| s.parse::<u8>().unwrap_or(0);
    (
        part(env!("CARGO_PKG_VERSION_MAJOR")),
        part(env!("CARGO_PKG_VERSION_MINOR")),
        part(env!("CARGO_PKG_VERSION_PATCH")),
    )
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Driver      : {}", self.driver)?;
        writeln!(f, "Card        : {}", self.card)?;
        writeln!(f, "Bus         : {}", self.bus)?;
        writeln!(
            f,
            "Version     : {}.{}.{}",
            self.version.0, self.version.1, self.version.2
        )?;
        writeln!(f, "Capabilites : {}", self.capabilities)?;
        Ok(())
    }
}
