//! Bridge register map

/// General control, selects the composite/s-video input
pub const GCTRL: u16 = 0x000;

/// Capture DMA control
pub const DCTRL: u16 = 0x100;

/// Capture frame start position
pub const CFSPO: u16 = 0x110;
pub const CFSPO_STX_L: u16 = 0x110;
pub const CFSPO_STX_H: u16 = 0x111;
pub const CFSPO_STY_L: u16 = 0x112;
pub const CFSPO_STY_H: u16 = 0x113;

/// Capture frame end position
pub const CFEPO: u16 = 0x114;
pub const CFEPO_ENX_L: u16 = 0x114;
pub const CFEPO_ENX_H: u16 = 0x115;
pub const CFEPO_ENY_L: u16 = 0x116;
pub const CFEPO_ENY_H: u16 = 0x117;

/// One register write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegVal {
    pub reg: u16,
    pub val: u16,
}

impl RegVal {
    pub const fn new(reg: u16, val: u16) -> Self {
        RegVal { reg, val }
    }
}

/// Terminates register tables
pub const SENTINEL: RegVal = RegVal::new(0xffff, 0xffff);

/// Iterates a sentinel terminated register table
pub fn sequence(table: &'static [RegVal]) -> impl Iterator<Item = &'static RegVal> {
    table.iter().take_while(|r| **r != SENTINEL)
}

/// DCTRL value that enables capture DMA
pub const DCTRL_START: u16 = 0xb3;
/// DCTRL value that disables capture DMA
pub const DCTRL_STOP: u16 = 0x00;
