use bitflags::bitflags;
use std::fmt;

use crate::Timestamp;

bitflags! {
    #[allow(clippy::unreadable_literal)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u32 {
        /// Buffer is mapped
        const MAPPED                = 0x00000001;
        /// Buffer is queued for processing
        const QUEUED                = 0x00000002;
        /// Buffer is ready
        const DONE                  = 0x00000004;
        /// Buffer is ready, but the data contained within is corrupted
        const ERROR                 = 0x00000040;
        /// Timestamp type
        const TIMESTAMP_MONOTONIC   = 0x00002000;
    }
}

impl From<u32> for Flags {
    fn from(flags: u32) -> Flags {
        Flags::from_bits_truncate(flags)
    }
}

impl From<Flags> for u32 {
    fn from(flags: Flags) -> Self {
        flags.bits()
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Who holds a buffer and what happened to it
///
/// A buffer is in exactly one of these at any time. `Queued` buffers sit on the available list,
/// the `Active` one is the buffer currently being filled.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    /// Handed out to the session
    Dequeued,
    /// Waiting on the available list
    Queued,
    /// In the current-buffer slot, receiving data
    Active,
    /// Filled with a complete frame
    Done,
    /// Returned without (valid) data
    Error,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Dequeued => write!(f, "dequeued"),
            State::Queued => write!(f, "queued"),
            State::Active => write!(f, "active"),
            State::Done => write!(f, "done"),
            State::Error => write!(f, "error"),
        }
    }
}

/// Buffer metadata, mostly used not to convolute the main buffer structs
#[derive(Debug, Default, Copy, Clone)]
pub struct Metadata {
    /// Number of bytes holding frame data
    pub bytesused: u32,
    /// Sequence number, counting the frames
    pub sequence: u32,
    /// Time the frame completed
    pub timestamp: Timestamp,
    /// Buffer flags
    pub flags: Flags,
}

/// Capture buffer
///
/// While a buffer is queued it belongs to the driver. Dequeueing moves it back to the caller
/// together with the frame data and metadata.
pub struct Buffer {
    index: u32,
    generation: u32,
    mem: Vec<u8>,
    bytesused: usize,
    pos: usize,
    state: State,
    meta: Metadata,
}

impl Buffer {
    pub(crate) fn new(index: u32, generation: u32, size: usize) -> Self {
        Buffer {
            index,
            generation,
            mem: vec![0u8; size],
            bytesused: 0,
            pos: 0,
            state: State::Dequeued,
            meta: Metadata {
                flags: Flags::MAPPED,
                ..Metadata::default()
            },
        }
    }

    /// Index within the queue
    pub fn index(&self) -> u32 {
        self.index
    }

    pub(crate) fn generation(&self) -> u32 {
        self.generation
    }

    /// Frame data written so far
    pub fn data(&self) -> &[u8] {
        &self.mem[..self.bytesused]
    }

    /// Size of the backing memory region
    pub fn len(&self) -> usize {
        self.mem.len()
    }

    /// Whether the backing memory is empty
    pub fn is_empty(&self) -> bool {
        self.mem.is_empty()
    }

    pub fn bytes_used(&self) -> usize {
        self.bytesused
    }

    pub fn meta(&self) -> &Metadata {
        &self.meta
    }

    /// Completion status, `Done` or `Error` once the driver hands the buffer back
    pub fn state(&self) -> State {
        self.state
    }

    /// Shrinks the backing memory
    #[cfg(test)]
    pub(crate) fn truncate(&mut self, len: usize) {
        self.mem.truncate(len);
        self.bytesused = self.bytesused.min(len);
        self.pos = self.pos.min(len);
    }

    pub(crate) fn reset(&mut self) {
        self.bytesused = 0;
        self.pos = 0;
        self.meta.bytesused = 0;
    }

    /// Copies as much of `chunk` as fits at the write cursor, returns the bytes copied
    pub(crate) fn write(&mut self, chunk: &[u8]) -> usize {
        let room = self.mem.len() - self.pos;
        let n = chunk.len().min(room);
        self.mem[self.pos..self.pos + n].copy_from_slice(&chunk[..n]);
        self.pos += n;
        self.bytesused += n;
        n
    }

    pub(crate) fn meta_mut(&mut self) -> &mut Metadata {
        &mut self.meta
    }

    pub(crate) fn set_state(&mut self, state: State) {
        self.state = state;
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("index", &self.index)
            .field("len", &self.mem.len())
            .field("bytesused", &self.bytesused)
            .field("state", &self.state)
            .field("meta", &self.meta)
            .finish()
    }
}
