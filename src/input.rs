use std::fmt;

use crate::standard::{self, StdId};

/// Highest valid input index
pub const MAX_INPUT: u32 = 3;

/// GCTRL values routing each composite input
static GCTRL: [u16; 4] = [0x98, 0x90, 0x88, 0x80];

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Type {
    Tuner,
    Camera,
}

#[derive(Debug, Clone)]
/// Video input description
pub struct Input {
    pub index: u32,
    pub name: String,
    pub typ: Type,
    /// Standards the input accepts
    pub std: StdId,
}

impl Input {
    /// Describes an input, `None` if the index is out of range
    ///
    /// # Example
    ///
    /// ```
    /// use stk1160::input::Input;
    /// assert_eq!(Input::describe(1).unwrap().name, "Composite1");
    /// assert!(Input::describe(4).is_none());
    /// ```
    pub fn describe(index: u32) -> Option<Self> {
        if index > MAX_INPUT {
            return None;
        }

        Some(Input {
            index,
            name: format!("Composite{}", index),
            typ: Type::Camera,
            std: standard::SUPPORTED,
        })
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "index : {}", self.index)?;
        writeln!(f, "name  : {}", self.name)?;
        writeln!(f, "type  : {:?}", self.typ)?;
        writeln!(f, "std   : {}", self.std)?;
        Ok(())
    }
}

/// Value to write to GCTRL when selecting `index`
pub(crate) fn route(index: u32) -> Option<u16> {
    GCTRL.get(index as usize).copied()
}
