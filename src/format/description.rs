use std::fmt;

use crate::format::FourCC;

#[derive(Debug, Clone)]
/// Format description as returned by format enumeration
pub struct Description {
    pub index: u32,
    pub description: String,
    pub fourcc: FourCC,
    /// bits per pixel
    pub depth: u32,
}

impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "index       : {}", self.index)?;
        writeln!(f, "description : {}", self.description)?;
        writeln!(f, "fourcc      : {}", self.fourcc)?;
        writeln!(f, "depth       : {}", self.depth)?;
        Ok(())
    }
}
