use log::{debug, error};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::buffer::{Buffer, State};
use crate::capability::Capabilities;
use crate::device::{Control, Device};
use crate::error::{Error, Result};
use crate::format::{self, Description, Format};
use crate::input::{self, Input};
use crate::ownership::SessionId;
use crate::queue::{self, BufferInfo, Setup};
use crate::reg;
use crate::standard::{self, StdId};

/// An open handle on a [`Device`]
///
/// Read-only queries work from any session. The first session that configures the device or
/// requests buffers becomes its owner; others get [`Error::Busy`] until the owner releases its
/// buffers or closes.
///
/// # Example
///
/// ```no_run
/// # fn capture(dev: std::sync::Arc<stk1160::Device>) -> stk1160::Result<()> {
/// let session = dev.open();
/// for buf in session.request_buffers(4)? {
///     session.queue_buffer(buf)?;
/// }
/// session.stream_on()?;
/// let frame = session.dequeue_buffer(None)?;
/// println!("frame {} with {} bytes", frame.meta().sequence, frame.bytes_used());
/// session.queue_buffer(frame)?;
/// # Ok(())
/// # }
/// ```
pub struct Session {
    id: SessionId,
    dev: Arc<Device>,
    /// Set once [`Session::read`] started capturing
    reader: Mutex<Option<Reader>>,
}

#[derive(Default)]
struct Reader {
    /// Frame partially copied out, with the read offset
    pending: Option<(Buffer, usize)>,
}

impl Session {
    pub(crate) fn new(dev: Arc<Device>) -> Self {
        Session {
            id: SessionId::next(),
            dev,
            reader: Mutex::new(None),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.dev
    }

    fn trace(&self, op: &str) {
        if self.dev.config().vidioc_debug {
            debug!("{}: {}", self.id, op);
        }
    }

    fn acquire(&self, ctl: &mut Control) -> Result<()> {
        if ctl.owner.acquire(self.id) {
            Ok(())
        } else {
            Err(Error::Busy)
        }
    }

    fn check_owner(&self, ctl: &Control) -> Result<()> {
        if ctl.owner.is_owner(self.id) {
            Ok(())
        } else {
            Err(Error::Busy)
        }
    }

    /// Streaming calls are refused once the session captures through `read`
    fn check_not_reading(&self) -> Result<()> {
        match self.reader.try_lock() {
            Some(reader) if reader.is_none() => Ok(()),
            _ => Err(Error::Busy),
        }
    }

    /// Query for device capabilities
    pub fn query_caps(&self) -> Result<Capabilities> {
        self.trace("querycap");
        let ctl = self.dev.lock();
        let usb = ctl.usb.as_ref().ok_or(Error::NoDevice)?;
        Ok(Capabilities::new(usb.bus_info()))
    }

    /// Returns the format description at `index`
    pub fn enum_formats(&self, index: u32) -> Result<Description> {
        self.trace("enum_fmt");
        format::describe(index).ok_or(Error::InvalidArgument("format index out of range"))
    }

    /// Returns the format currently in use
    pub fn format(&self) -> Format {
        self.trace("g_fmt");
        let ctl = self.dev.lock();
        Format::captured(ctl.width, ctl.height)
    }

    /// Checks a format and returns what the device would actually use
    ///
    /// The frame size follows the video standard and cannot be chosen; only the pixelformat is
    /// validated.
    pub fn try_format(&self, fmt: &Format) -> Result<Format> {
        self.trace("try_fmt");
        let ctl = self.dev.lock();
        Self::negotiate(&ctl, fmt)
    }

    fn negotiate(ctl: &Control, fmt: &Format) -> Result<Format> {
        if fmt.fourcc != format::UYVY {
            error!("fourcc format 0x{:08x} invalid", u32::from(fmt.fourcc));
            return Err(Error::InvalidArgument("unsupported pixelformat"));
        }
        Ok(Format::captured(ctl.width, ctl.height))
    }

    /// Sets the capture format, claiming ownership
    pub fn set_format(&self, fmt: &Format) -> Result<Format> {
        self.trace("s_fmt");
        let mut ctl = self.dev.lock();
        self.acquire(&mut ctl)?;

        let fmt = Self::negotiate(&ctl, fmt)?;
        if self.dev.queue().is_streaming() {
            error!("device busy");
            return Err(Error::Busy);
        }
        Ok(fmt)
    }

    /// Returns the selected standard
    pub fn standard(&self) -> StdId {
        self.trace("g_std");
        self.dev.lock().std_id
    }

    /// Asks the decoders which standards match the incoming signal
    pub fn query_standard(&self) -> StdId {
        self.trace("querystd");
        let _ctl = self.dev.lock();
        self.dev.decoders().query_standard(standard::SUPPORTED)
    }

    /// Selects a video standard, claiming ownership
    pub fn set_standard(&self, id: StdId) -> Result<()> {
        self.trace("s_std");
        let mut ctl = self.dev.lock();
        self.acquire(&mut ctl)?;
        self.dev.apply_standard(&mut ctl, id)
    }

    /// Describes the input at `index`
    pub fn enum_inputs(&self, index: u32) -> Result<Input> {
        self.trace("enum_input");
        Input::describe(index).ok_or(Error::InvalidArgument("input index out of range"))
    }

    /// Returns the selected input
    pub fn input(&self) -> u32 {
        self.trace("g_input");
        self.dev.lock().input
    }

    /// Routes an input to the decoder, claiming ownership
    pub fn set_input(&self, index: u32) -> Result<()> {
        self.trace("s_input");
        let mut ctl = self.dev.lock();
        self.acquire(&mut ctl)?;

        if index > input::MAX_INPUT {
            return Err(Error::InvalidArgument("input index out of range"));
        }
        let usb = ctl.usb.clone().ok_or(Error::NoDevice)?;

        ctl.input = index;
        if let Some(route) = input::route(index) {
            usb.write_register(reg::GCTRL, route)?;
        }
        Ok(())
    }

    /// Allocates capture buffers, claiming ownership
    ///
    /// The count is clamped to the configured bounds. All buffers are handed to the caller and
    /// have to be queued before they receive data. A count of zero releases the queue and gives
    /// up ownership.
    pub fn request_buffers(&self, count: u32) -> Result<Vec<Buffer>> {
        self.trace("reqbufs");
        self.check_not_reading()?;
        let mut guard = self.dev.lock();
        let ctl = &mut *guard;
        self.acquire(ctl)?;

        if count == 0 {
            self.dev.release_queue(ctl);
            ctl.owner.release();
            return Ok(Vec::new());
        }

        if self.dev.queue().is_streaming() {
            return Err(Error::Busy);
        }

        let setup = queue::setup(count, ctl.width, ctl.height, self.dev.config());
        self.dev.queue().allocate(&setup)
    }

    /// Returns the state of the buffer at `index`
    pub fn query_buffer(&self, index: u32) -> Result<BufferInfo> {
        self.trace("querybuf");
        self.check_not_reading()?;
        let ctl = self.dev.lock();
        self.check_owner(&ctl)?;
        self.dev.queue().query(index)
    }

    /// Hands a buffer to the driver
    ///
    /// A buffer that cannot be filled, because it is too small or the device is gone, comes back
    /// from [`Session::dequeue_buffer`] flagged as error.
    pub fn queue_buffer(&self, buf: Buffer) -> Result<()> {
        self.trace("qbuf");
        self.check_not_reading()?;
        self.requeue(buf)
    }

    fn requeue(&self, buf: Buffer) -> Result<()> {
        let ctl = self.dev.lock();
        self.check_owner(&ctl)?;
        let frame_size = format::frame_size(ctl.width, ctl.height);
        self.dev.queue().enqueue(buf, frame_size)
    }

    /// Takes the oldest finished buffer
    ///
    /// The control mutex is not held while waiting, so other sessions and stream-off are not
    /// blocked by a pending dequeue.
    ///
    /// # Arguments
    ///
    /// * `timeout` - `None` blocks, `Some(Duration::ZERO)` polls
    pub fn dequeue_buffer(&self, timeout: Option<Duration>) -> Result<Buffer> {
        self.trace("dqbuf");
        self.check_not_reading()?;
        {
            let ctl = self.dev.lock();
            self.check_owner(&ctl)?;
        }
        self.dev.queue().dequeue(timeout)
    }

    /// Starts streaming
    pub fn stream_on(&self) -> Result<()> {
        self.trace("streamon");
        self.check_not_reading()?;
        let mut guard = self.dev.lock();
        let ctl = &mut *guard;
        self.check_owner(ctl)?;
        self.dev.start_streaming(ctl)
    }

    /// Stops streaming, every buffer still held by the driver is returned flagged as error
    pub fn stream_off(&self) -> Result<()> {
        self.trace("streamoff");
        self.check_not_reading()?;
        let mut guard = self.dev.lock();
        let ctl = &mut *guard;
        self.check_owner(ctl)?;

        if self.dev.queue().is_streaming() {
            self.dev.stop_streaming(ctl);
        }
        Ok(())
    }

    /// Reads frame data, starting capture on first use
    ///
    /// The first read claims ownership, allocates the minimum number of buffers, queues them
    /// and starts streaming. Every read copies from the oldest finished frame; a frame larger
    /// than `out` is continued by the next read, and a buffer read to its end is queued again.
    /// Frames that came back with an error are skipped. From then on the buffer calls of this
    /// session fail with [`Error::Busy`] until it is closed.
    ///
    /// # Arguments
    ///
    /// * `out` - Destination for frame data
    /// * `nonblocking` - Fail with [`Error::WouldBlock`] instead of waiting for a frame
    pub fn read(&self, out: &mut [u8], nonblocking: bool) -> Result<usize> {
        self.trace("read");
        let mut reader = self.reader.lock();
        if reader.is_none() {
            self.start_reading()?;
        }
        let reader = reader.get_or_insert_with(Reader::default);

        let (buf, pos) = match reader.pending.take() {
            Some(pending) => pending,
            None => (self.next_frame(nonblocking)?, 0),
        };

        let data = &buf.data()[pos..];
        let n = data.len().min(out.len());
        out[..n].copy_from_slice(&data[..n]);

        if pos + n < buf.bytes_used() {
            reader.pending = Some((buf, pos + n));
        } else {
            self.requeue(buf)?;
        }
        Ok(n)
    }

    fn start_reading(&self) -> Result<()> {
        let mut guard = self.dev.lock();
        let ctl = &mut *guard;
        self.acquire(ctl)?;
        if self.dev.queue().count() > 0 {
            return Err(Error::Busy);
        }

        let setup = queue::setup(1, ctl.width, ctl.height, self.dev.config());
        if let Err(e) = self.fill_and_start(ctl, &setup) {
            self.dev.release_queue(ctl);
            ctl.owner.release();
            return Err(e);
        }
        debug!("{}: read capture with {} buffers", self.id, setup.count);
        Ok(())
    }

    fn fill_and_start(&self, ctl: &mut Control, setup: &Setup) -> Result<()> {
        let frame_size = format::frame_size(ctl.width, ctl.height);
        for buf in self.dev.queue().allocate(setup)? {
            self.dev.queue().enqueue(buf, frame_size)?;
        }
        self.dev.start_streaming(ctl)
    }

    fn next_frame(&self, nonblocking: bool) -> Result<Buffer> {
        let timeout = if nonblocking {
            Some(Duration::ZERO)
        } else {
            None
        };

        loop {
            {
                let ctl = self.dev.lock();
                self.check_owner(&ctl)?;
            }
            let buf = self.dev.queue().dequeue(timeout)?;
            if buf.state() != State::Error {
                return Ok(buf);
            }

            debug!("{}: skipping buffer [{}]", self.id, buf.index());
            // once unplugged the buffer would only come straight back
            if self.dev.is_connected() {
                self.requeue(buf)?;
            }
        }
    }

    /// Waits until a read or dequeue would not block
    ///
    /// Fails like [`Session::dequeue_buffer`] when nothing is streaming or the device is gone.
    ///
    /// # Arguments
    ///
    /// * `timeout` - `None` blocks, `Some(Duration::ZERO)` only checks
    pub fn poll(&self, timeout: Option<Duration>) -> Result<()> {
        self.trace("poll");
        let pending = self
            .reader
            .try_lock()
            .map_or(false, |reader| {
                reader.as_ref().map_or(false, |r| r.pending.is_some())
            });
        if pending {
            return Ok(());
        }
        self.dev.queue().poll(timeout)
    }

    /// Reads a bridge register, for debugging
    pub fn register(&self, reg: u16) -> Result<u8> {
        self.trace("g_register");
        let ctl = self.dev.lock();
        let usb = ctl.usb.as_ref().ok_or(Error::NoDevice)?;
        usb.read_register(reg)
    }

    /// Writes a bridge register, for debugging
    pub fn set_register(&self, reg: u16, value: u16) -> Result<()> {
        self.trace("s_register");
        let ctl = self.dev.lock();
        let usb = ctl.usb.as_ref().ok_or(Error::NoDevice)?;
        usb.write_register(reg, value)
    }

    /// Closes the session
    ///
    /// Same as dropping it; the owner stops streaming, frees its buffers and gives up ownership.
    pub fn close(self) {}
}

impl Drop for Session {
    fn drop(&mut self) {
        let mut guard = self.dev.lock();
        let ctl = &mut *guard;
        if ctl.owner.is_owner(self.id) {
            self.dev.release_queue(ctl);
            ctl.owner.release();
        }
    }
}
