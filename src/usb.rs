use crate::error::Result;

/// Register transport and interface control of the bridge chip
///
/// Implementations wrap the USB control endpoint. All calls are synchronous and may fail, in
/// which case they should report [`crate::Error::Transport`].
pub trait Transport: Send + Sync {
    /// Reads a single bridge register
    fn read_register(&self, reg: u16) -> Result<u8>;

    /// Writes a single bridge register
    fn write_register(&self, reg: u16, value: u16) -> Result<()>;

    /// Selects an alternate setting on an interface
    ///
    /// # Arguments
    ///
    /// * `interface` - Interface number (the video interface is 0)
    /// * `alt` - Alternate setting index
    fn set_interface(&self, interface: u8, alt: u8) -> Result<()>;

    /// Bus location, e.g. "usb-0000:00:14.0-2"
    fn bus_info(&self) -> String {
        String::from("usb")
    }
}
