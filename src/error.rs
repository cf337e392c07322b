use std::{io, result};

use thiserror::Error;

/// Errors reported by control operations
///
/// Every variant maps onto the errno a video4linux client would see, see [`Error::errno`].
#[derive(Debug, Error)]
pub enum Error {
    /// The transport handle is gone, the device was physically disconnected
    #[error("no such device")]
    NoDevice,
    /// Another session owns the queue, or the device is streaming
    #[error("device or resource busy")]
    Busy,
    /// Unsupported format, standard, input or buffer index
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// Register I/O failed
    #[error("register transport failed: {0}")]
    Transport(#[source] io::Error),
    /// The isochronous transfer pool could not be allocated
    #[error("transfer pool allocation failed: {0}")]
    ResourceExhausted(String),
    /// Non-blocking dequeue found no finished buffer
    #[error("no buffer ready")]
    WouldBlock,
    /// Timed dequeue expired before a buffer finished
    #[error("timed out waiting for a buffer")]
    TimedOut,
}

pub type Result<T> = result::Result<T, Error>;

impl Error {
    /// Returns the Linux errno matching this error
    ///
    /// # Example
    ///
    /// ```
    /// use stk1160::Error;
    /// assert_eq!(Error::NoDevice.errno(), libc::ENODEV);
    /// ```
    pub fn errno(&self) -> i32 {
        match self {
            Error::NoDevice => libc::ENODEV,
            Error::Busy => libc::EBUSY,
            Error::InvalidArgument(_) => libc::EINVAL,
            Error::Transport(e) => e.raw_os_error().unwrap_or(libc::EIO),
            Error::ResourceExhausted(_) => libc::ENOMEM,
            Error::WouldBlock => libc::EAGAIN,
            Error::TimedOut => libc::ETIMEDOUT,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Transport(e)
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Transport(e) => e,
            e => io::Error::from_raw_os_error(e.errno()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping() {
        assert_eq!(Error::Busy.errno(), libc::EBUSY);
        assert_eq!(Error::InvalidArgument("std").errno(), libc::EINVAL);
        assert_eq!(Error::ResourceExhausted("urb".into()).errno(), libc::ENOMEM);
        assert_eq!(Error::WouldBlock.errno(), libc::EAGAIN);

        let e = Error::Transport(io::Error::new(io::ErrorKind::Other, "stall"));
        assert_eq!(e.errno(), libc::EIO);
    }

    #[test]
    fn no_device_becomes_enodev() {
        let e: io::Error = Error::NoDevice.into();
        // stream teardown code checks for ENODEV (19) to ignore unplugged devices
        assert_eq!(e.raw_os_error(), Some(19));
    }

    #[test]
    fn transport_error_passes_through() {
        let inner = io::Error::from_raw_os_error(libc::EPIPE);
        let e: io::Error = Error::from(inner).into();
        assert_eq!(e.raw_os_error(), Some(libc::EPIPE));
    }
}
