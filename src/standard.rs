use bitflags::bitflags;
use log::{debug, error};
use std::fmt;

use crate::error::Result;
use crate::reg::{self, RegVal};
use crate::usb::Transport;

bitflags! {
    /// Analog video standard set
    #[allow(clippy::unreadable_literal)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StdId : u64 {
        const PAL_B         = 0x00000001;
        const PAL_B1        = 0x00000002;
        const PAL_G         = 0x00000004;
        const PAL_H         = 0x00000008;
        const PAL_I         = 0x00000010;
        const PAL_D         = 0x00000020;
        const PAL_D1        = 0x00000040;
        const PAL_K         = 0x00000080;

        const PAL_M         = 0x00000100;
        const PAL_N         = 0x00000200;
        const PAL_NC        = 0x00000400;
        const PAL_60        = 0x00000800;

        const NTSC_M        = 0x00001000;
        const NTSC_M_JP     = 0x00002000;
        const NTSC_443      = 0x00004000;
        const NTSC_M_KR     = 0x00008000;

        const SECAM_B       = 0x00010000;
        const SECAM_D       = 0x00020000;
        const SECAM_G       = 0x00040000;
        const SECAM_H       = 0x00080000;
        const SECAM_K       = 0x00100000;
        const SECAM_K1      = 0x00200000;
        const SECAM_L       = 0x00400000;
        const SECAM_LC      = 0x00800000;

        const ATSC_8_VSB    = 0x01000000;
        const ATSC_16_VSB   = 0x02000000;

        const NTSC = Self::NTSC_M.bits() | Self::NTSC_M_JP.bits() | Self::NTSC_M_KR.bits();
        const PAL_BG = Self::PAL_B.bits() | Self::PAL_B1.bits() | Self::PAL_G.bits();
        const PAL_DK = Self::PAL_D.bits() | Self::PAL_D1.bits() | Self::PAL_K.bits();
        const PAL = Self::PAL_BG.bits() | Self::PAL_DK.bits() | Self::PAL_H.bits()
            | Self::PAL_I.bits();
        const SECAM_DK = Self::SECAM_D.bits() | Self::SECAM_K.bits() | Self::SECAM_K1.bits();
        const SECAM = Self::SECAM_B.bits() | Self::SECAM_G.bits() | Self::SECAM_H.bits()
            | Self::SECAM_DK.bits() | Self::SECAM_L.bits() | Self::SECAM_LC.bits();

        /// 525 lines, 60 fields per second
        const STD_525_60 = Self::PAL_M.bits() | Self::PAL_60.bits() | Self::NTSC.bits()
            | Self::NTSC_443.bits();
        /// 625 lines, 50 fields per second
        const STD_625_50 = Self::PAL.bits() | Self::PAL_N.bits() | Self::PAL_NC.bits()
            | Self::SECAM.bits();
    }
}

impl From<u64> for StdId {
    fn from(id: u64) -> Self {
        Self::from_bits_retain(id)
    }
}

impl From<StdId> for u64 {
    fn from(id: StdId) -> Self {
        id.bits()
    }
}

impl fmt::Display for StdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Standards the bridge can capture
pub const SUPPORTED: StdId = StdId::STD_525_60.union(StdId::STD_625_50);

/// Standard selected at attach time
pub const DEFAULT: StdId = StdId::NTSC_M;

static STD_525: [RegVal; 9] = [
    // 720x480

    // Frame start
    RegVal::new(reg::CFSPO_STX_L, 0x0000),
    RegVal::new(reg::CFSPO_STX_H, 0x0000),
    RegVal::new(reg::CFSPO_STY_L, 0x0003),
    RegVal::new(reg::CFSPO_STY_H, 0x0000),
    // Frame end
    RegVal::new(reg::CFEPO_ENX_L, 0x05a0),
    RegVal::new(reg::CFEPO_ENX_H, 0x0005),
    RegVal::new(reg::CFEPO_ENY_L, 0x00f3),
    RegVal::new(reg::CFEPO_ENY_H, 0x0000),
    reg::SENTINEL,
];

static STD_625: [RegVal; 9] = [
    // 720x576

    // Frame start
    RegVal::new(reg::CFSPO, 0x0000),
    RegVal::new(reg::CFSPO + 1, 0x0000),
    RegVal::new(reg::CFSPO + 2, 0x0001),
    RegVal::new(reg::CFSPO + 3, 0x0000),
    // Frame end
    RegVal::new(reg::CFEPO, 0x05a0),
    RegVal::new(reg::CFEPO + 1, 0x0005),
    RegVal::new(reg::CFEPO + 2, 0x0121),
    RegVal::new(reg::CFEPO + 3, 0x0001),
    reg::SENTINEL,
];

/// The two line/field families the bridge supports
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Family {
    /// NTSC like, 720x480
    Lines525,
    /// PAL/SECAM like, 720x576
    Lines625,
}

impl Family {
    /// Derives the family from a requested standard set
    ///
    /// 525 line standards take precedence when a set spans both families.
    ///
    /// # Example
    ///
    /// ```
    /// use stk1160::standard::{Family, StdId};
    /// assert_eq!(Family::from_id(StdId::PAL_B), Some(Family::Lines625));
    /// assert_eq!(Family::from_id(StdId::ATSC_8_VSB), None);
    /// ```
    pub fn from_id(id: StdId) -> Option<Self> {
        if id.intersects(StdId::STD_525_60) {
            Some(Family::Lines525)
        } else if id.intersects(StdId::STD_625_50) {
            Some(Family::Lines625)
        } else {
            None
        }
    }

    /// Returns the capture geometry as (width, height)
    pub const fn geometry(&self) -> (u32, u32) {
        match self {
            Family::Lines525 => (720, 480),
            Family::Lines625 => (720, 576),
        }
    }

    /// Returns the register writes for this family, sentinel included
    pub fn registers(&self) -> &'static [RegVal] {
        match self {
            Family::Lines525 => &STD_525,
            Family::Lines625 => &STD_625,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::Lines525 => write!(f, "525 lines (NTSC like)"),
            Family::Lines625 => write!(f, "625 lines (PAL like)"),
        }
    }
}

/// Writes the frame window registers of a family
///
/// Frame start coordinates go out before frame end coordinates. The first failing write aborts
/// the sequence; pairs already written are left in place.
pub(crate) fn write_registers(usb: &dyn Transport, family: Family) -> Result<()> {
    debug!("registers to {} standard", family);
    for r in reg::sequence(family.registers()) {
        if let Err(e) = usb.write_register(r.reg, r.val) {
            error!("cannot write register 0x{:03x} (0x{:04x}): {}", r.reg, r.val, e);
            return Err(e);
        }
    }
    Ok(())
}
