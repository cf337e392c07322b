use log::{debug, info};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::buffer::{Buffer, Flags, Metadata, State};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::format;
use crate::Timestamp;

/// Outcome of a buffer request
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Setup {
    /// Number of buffers after clamping
    pub count: u32,
    /// Planes per buffer, always 1 for the packed format
    pub planes: u32,
    /// Bytes per plane
    pub plane_size: usize,
}

/// Negotiates a buffer request for the current geometry
///
/// # Arguments
///
/// * `requested` - Number of buffers the caller asked for
/// * `width` - Frame width in pixels
/// * `height` - Frame height in pixels
/// * `config` - Supplies the clamp bounds
///
/// # Example
///
/// ```
/// use stk1160::{queue, Config};
///
/// let setup = queue::setup(1, 720, 480, &Config::default());
/// assert_eq!(setup.count, 8);
/// assert_eq!(setup.plane_size, 720 * 480 * 2);
/// ```
pub fn setup(requested: u32, width: u32, height: u32, config: &Config) -> Setup {
    let plane_size = format::frame_size(width, height);
    let count = requested.max(config.min_buffers).min(config.max_buffers);

    info!("buffer count {}, each {} bytes", count, plane_size);

    Setup {
        count,
        planes: 1,
        plane_size,
    }
}

/// Snapshot of one queue slot
#[derive(Debug, Copy, Clone)]
pub struct BufferInfo {
    pub index: u32,
    /// Size of the backing memory
    pub length: usize,
    pub state: State,
    pub meta: Metadata,
}

struct Slot {
    state: State,
    length: usize,
    meta: Metadata,
    /// Present while the driver holds the buffer
    buf: Option<Buffer>,
}

struct Inner {
    slots: Vec<Slot>,
    generation: u32,
    /// Buffers ready to receive data, oldest first
    avail: VecDeque<u32>,
    /// Buffer being filled
    current: Option<u32>,
    /// Finished buffers waiting to be dequeued
    done: VecDeque<u32>,
    streaming: bool,
    connected: bool,
    sequence: u32,
    /// Bumped on every stream start and stop, completions of other epochs are stale
    epoch: u64,
}

impl Inner {
    /// Moves a driver-held buffer onto the done list
    fn finish(&mut self, index: u32, state: State) {
        let sequence = if state == State::Done {
            let seq = self.sequence;
            self.sequence = self.sequence.wrapping_add(1);
            seq
        } else {
            0
        };

        let slot = &mut self.slots[index as usize];
        slot.state = state;
        if let Some(buf) = slot.buf.as_mut() {
            let bytesused = buf.bytes_used() as u32;
            buf.set_state(state);

            let meta = buf.meta_mut();
            meta.bytesused = bytesused;
            meta.sequence = sequence;
            meta.timestamp = Timestamp::now();
            meta.flags.remove(Flags::QUEUED);
            meta.flags.insert(Flags::DONE);
            meta.flags.set(Flags::ERROR, state == State::Error);
            slot.meta = *meta;
        }

        self.done.push_back(index);
    }
}

/// Video buffer queue
///
/// Owns the buffer arena, the available list, the current-buffer slot and the done list. A
/// single lock guards all of them; it is shared by the control path and the transfer completion
/// path and is never held across a blocking call, except for the condition wait in
/// [`BufferQueue::dequeue`] which releases it.
pub struct BufferQueue {
    inner: Mutex<Inner>,
    ready: Condvar,
}

impl Default for BufferQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferQueue {
    pub fn new() -> Self {
        BufferQueue {
            inner: Mutex::new(Inner {
                slots: Vec::new(),
                generation: 0,
                avail: VecDeque::new(),
                current: None,
                done: VecDeque::new(),
                streaming: false,
                connected: true,
                sequence: 0,
                epoch: 0,
            }),
            ready: Condvar::new(),
        }
    }

    /// Allocates a fresh set of buffers, releasing any previous ones
    ///
    /// All returned buffers start out dequeued, i.e. owned by the caller.
    pub fn allocate(&self, setup: &Setup) -> Result<Vec<Buffer>> {
        let mut inner = self.inner.lock();
        if inner.streaming {
            return Err(Error::Busy);
        }

        inner.generation = inner.generation.wrapping_add(1);
        inner.avail.clear();
        inner.done.clear();
        inner.current = None;

        let generation = inner.generation;
        let bufs: Vec<Buffer> = (0..setup.count)
            .map(|index| Buffer::new(index, generation, setup.plane_size))
            .collect();
        inner.slots = bufs
            .iter()
            .map(|buf| Slot {
                state: State::Dequeued,
                length: buf.len(),
                meta: *buf.meta(),
                buf: None,
            })
            .collect();

        Ok(bufs)
    }

    /// Drops every buffer the queue still holds
    pub fn free(&self) {
        let mut inner = self.inner.lock();
        inner.generation = inner.generation.wrapping_add(1);
        inner.slots.clear();
        inner.avail.clear();
        inner.done.clear();
        inner.current = None;
        inner.streaming = false;
        self.ready.notify_all();
    }

    /// Number of allocated buffers
    pub fn count(&self) -> u32 {
        self.inner.lock().slots.len() as u32
    }

    pub fn is_streaming(&self) -> bool {
        self.inner.lock().streaming
    }

    pub(crate) fn set_streaming(&self, on: bool) {
        let mut inner = self.inner.lock();
        inner.streaming = on;
        if on {
            inner.sequence = 0;
            inner.epoch = inner.epoch.wrapping_add(1);
        } else {
            // wake up waiters so they notice
            self.ready.notify_all();
        }
    }

    /// Stream epoch that completions must carry to be applied
    pub fn epoch(&self) -> u64 {
        self.inner.lock().epoch
    }

    /// Invalidates every completion of the running stream
    ///
    /// Completions still travelling towards the handler are discarded once they arrive.
    pub(crate) fn fence(&self) {
        let mut inner = self.inner.lock();
        inner.epoch = inner.epoch.wrapping_add(1);
    }

    pub(crate) fn disconnect(&self) {
        self.inner.lock().connected = false;
        self.ready.notify_all();
    }

    /// Returns the state of the buffer at `index`
    pub fn query(&self, index: u32) -> Result<BufferInfo> {
        let inner = self.inner.lock();
        let slot = inner
            .slots
            .get(index as usize)
            .ok_or(Error::InvalidArgument("buffer index out of range"))?;

        Ok(BufferInfo {
            index,
            length: slot.length,
            state: slot.state,
            meta: slot.meta,
        })
    }

    /// Hands a buffer to the driver
    ///
    /// If the device is gone, or the buffer is too small for a frame of `frame_size` bytes, the
    /// buffer goes straight to the done list flagged as error. Otherwise it is appended to the
    /// available list with its write cursor rewound.
    ///
    /// Fails only if the buffer does not belong to this queue or is already queued.
    pub fn enqueue(&self, mut buf: Buffer, frame_size: usize) -> Result<()> {
        let mut inner = self.inner.lock();

        let index = buf.index();
        if buf.generation() != inner.generation {
            return Err(Error::InvalidArgument("buffer belongs to a released queue"));
        }
        match inner.slots.get(index as usize) {
            Some(slot) if slot.state == State::Dequeued => {}
            Some(_) => return Err(Error::InvalidArgument("buffer is already queued")),
            None => return Err(Error::InvalidArgument("buffer index out of range")),
        }

        buf.reset();
        buf.set_state(State::Queued);
        buf.meta_mut().flags.insert(Flags::QUEUED);
        buf.meta_mut().flags.remove(Flags::DONE | Flags::ERROR);
        let undersized = buf.len() < frame_size;

        let slot = &mut inner.slots[index as usize];
        slot.length = buf.len();
        slot.meta = *buf.meta();
        slot.buf = Some(buf);

        if !inner.connected {
            // the next dequeue reports the error, the one after fails with NoDevice
            inner.finish(index, State::Error);
            self.ready.notify_all();
        } else if undersized {
            debug!("buffer [{}] smaller than a frame ({} bytes)", index, frame_size);
            inner.finish(index, State::Error);
            self.ready.notify_all();
        } else {
            inner.slots[index as usize].state = State::Queued;
            inner.avail.push_back(index);
        }

        Ok(())
    }

    /// Takes the oldest finished buffer
    ///
    /// # Arguments
    ///
    /// * `timeout` - `None` blocks until a buffer finishes, `Some(Duration::ZERO)` polls
    pub fn dequeue(&self, timeout: Option<Duration>) -> Result<Buffer> {
        let mut inner = self.inner.lock();

        loop {
            self.wait_done(&mut inner, timeout)?;
            while let Some(index) = inner.done.pop_front() {
                let slot = &mut inner.slots[index as usize];
                if let Some(buf) = slot.buf.take() {
                    slot.state = State::Dequeued;
                    return Ok(buf);
                }
            }
        }
    }

    /// Waits until a finished buffer can be dequeued without blocking
    ///
    /// Fails the same way [`BufferQueue::dequeue`] does, but leaves the buffer on the done list.
    pub fn poll(&self, timeout: Option<Duration>) -> Result<()> {
        let mut inner = self.inner.lock();
        self.wait_done(&mut inner, timeout)
    }

    fn wait_done(&self, inner: &mut MutexGuard<'_, Inner>, timeout: Option<Duration>) -> Result<()> {
        let mut deadline: Option<Instant> = None;

        while inner.done.is_empty() {
            if !inner.connected {
                return Err(Error::NoDevice);
            }
            if !inner.streaming {
                return Err(Error::InvalidArgument("not streaming"));
            }

            match timeout {
                None => self.ready.wait(inner),
                Some(t) if t.is_zero() => return Err(Error::WouldBlock),
                Some(t) => {
                    let deadline = *deadline.get_or_insert_with(|| Instant::now() + t);
                    if self.ready.wait_until(inner, deadline).timed_out() && inner.done.is_empty()
                    {
                        return Err(Error::TimedOut);
                    }
                }
            }
        }
        Ok(())
    }

    /// Removes the head of the available list and makes it the current buffer
    pub fn pop_next_available(&self) -> Option<u32> {
        self.filler().pop_next_available()
    }

    /// Returns every buffer the driver holds, marked with `state`
    ///
    /// Drains the available list and clears the current-buffer slot, so no buffer stays pinned.
    pub fn release_all(&self, state: State) {
        let mut inner = self.inner.lock();
        while let Some(index) = inner.avail.pop_front() {
            inner.finish(index, state);
            info!("buffer [{}] aborted", index);
        }
        if let Some(index) = inner.current.take() {
            inner.finish(index, state);
            info!("buffer [{}] aborted", index);
        }
        self.ready.notify_all();
    }

    /// Number of buffers on the available list
    pub fn available(&self) -> usize {
        self.inner.lock().avail.len()
    }

    /// Whether a buffer occupies the current-buffer slot
    pub fn has_current(&self) -> bool {
        self.inner.lock().current.is_some()
    }

    /// Number of buffers waiting to be dequeued
    pub fn finished(&self) -> usize {
        self.inner.lock().done.len()
    }

    /// Locks the queue for the completion path
    pub(crate) fn filler(&self) -> Filler<'_> {
        Filler {
            inner: self.inner.lock(),
            ready: &self.ready,
        }
    }
}

/// Locked view used while copying transfer payloads
pub(crate) struct Filler<'a> {
    inner: MutexGuard<'a, Inner>,
    ready: &'a Condvar,
}

impl Filler<'_> {
    pub fn has_current(&self) -> bool {
        self.inner.current.is_some()
    }

    /// Whether a completion of `epoch` belongs to the running stream
    pub fn accepts(&self, epoch: u64) -> bool {
        self.inner.streaming && self.inner.epoch == epoch
    }

    pub fn pop_next_available(&mut self) -> Option<u32> {
        let index = self.inner.avail.pop_front()?;
        self.inner.slots[index as usize].state = State::Active;
        if let Some(buf) = self.inner.slots[index as usize].buf.as_mut() {
            buf.set_state(State::Active);
        }
        self.inner.current = Some(index);
        Some(index)
    }

    /// Copies into the current buffer, returns the bytes copied
    pub fn write(&mut self, chunk: &[u8]) -> Option<usize> {
        let index = self.inner.current?;
        let buf = self.inner.slots[index as usize].buf.as_mut()?;
        Some(buf.write(chunk))
    }

    /// Completes the current buffer and clears the slot
    pub fn buffer_done(&mut self) -> Option<u32> {
        let index = self.inner.current.take()?;
        self.inner.finish(index, State::Done);
        self.ready.notify_all();
        Some(index)
    }
}
