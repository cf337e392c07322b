//! Capture driver core for STK1160 USB video grabbers
//!
//! The bridge delivers analog video (525 or 625 line standards) as UYVY frames over an
//! isochronous endpoint. This crate holds everything above the USB host stack: the buffer queue,
//! the isochronous transfer lifecycle, session ownership, standard and input selection and an
//! ioctl-like control surface on [`Session`].
//!
//! Hardware access goes through three traits supplied by the platform: [`usb::Transport`] for
//! register and interface requests, [`isoc::IsocEngine`] for isochronous transfers and
//! [`decoder::Decoder`] for the video decoder chips.

pub mod error;
pub use error::{Error, Result};

pub mod config;
pub use config::Config;

pub mod reg;
pub mod usb;

pub mod standard;
pub use standard::StdId;

pub mod decoder;
pub mod input;

pub mod format;
pub use format::{Format, FourCC};

mod capability;
pub use capability::{Capabilities, Flags as CapabilityFlags};

mod timestamp;
pub use timestamp::Timestamp;

pub mod buffer;
pub use buffer::Buffer;

pub mod queue;
pub use queue::BufferQueue;

pub mod isoc;
pub mod ownership;

mod stream;
pub use stream::StreamState;

mod device;
pub use device::Device;

mod session;
pub use session::Session;
