use crossbeam_channel::Receiver;
use log::{debug, info, warn};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::{io, thread};

use crate::config::Config;
use crate::decoder::Decoders;
use crate::error::{Error, Result};
use crate::isoc::{Completion, CompletionHandler, IsocEngine, Stats, StatsSnapshot};
use crate::ownership::OwnershipGuard;
use crate::queue::BufferQueue;
use crate::session::Session;
use crate::standard::{self, Family, StdId};
use crate::stream::{StreamController, StreamState};
use crate::usb::Transport;

/// State serialized by the control mutex
pub(crate) struct Control {
    /// Gone once the grabber is unplugged
    pub usb: Option<Arc<dyn Transport>>,
    pub owner: OwnershipGuard,
    pub std_id: StdId,
    pub width: u32,
    pub height: u32,
    pub input: u32,
    pub stream: StreamController,
}

/// A grabber instance
///
/// Created when the grabber is attached. It may outlive the physical device: after
/// [`Device::disconnect`] sessions that are still open keep a valid handle, but hardware
/// operations fail with [`Error::NoDevice`].
pub struct Device {
    control: Mutex<Control>,
    queue: Arc<BufferQueue>,
    decoders: Decoders,
    stats: Arc<Stats>,
    handler: CompletionHandler,
    completions: Receiver<Completion>,
    config: Config,
}

impl Device {
    /// Attaches a grabber
    ///
    /// The bridge is programmed for NTSC-M at 720x480, the default standard. Register failures
    /// at this point are logged only.
    ///
    /// # Arguments
    ///
    /// * `usb` - Register transport of the bridge
    /// * `engine` - Isochronous transfer engine of the video endpoint
    /// * `decoders` - Decoder chips behind the bridge
    /// * `alt_max_packet_sizes` - wMaxPacketSize of every alternate setting of the video interface
    /// * `config` - Tunables
    pub fn new(
        usb: Arc<dyn Transport>,
        engine: Arc<dyn IsocEngine>,
        decoders: Decoders,
        alt_max_packet_sizes: Vec<u32>,
        config: Config,
    ) -> Arc<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let queue = Arc::new(BufferQueue::new());
        let stats = Arc::new(Stats::default());
        let handler = CompletionHandler::new(queue.clone(), engine.clone(), stats.clone());

        let family = Family::Lines525;
        let (width, height) = family.geometry();
        if let Err(e) = standard::write_registers(usb.as_ref(), family) {
            warn!("cannot program default standard: {}", e);
        }
        decoders.set_standard(standard::DEFAULT);

        info!(
            "attached, {} alternate settings, {} decoder(s)",
            alt_max_packet_sizes.len(),
            decoders.len()
        );

        let stream = StreamController::new(alt_max_packet_sizes, engine, tx, config.clone());
        Arc::new(Device {
            control: Mutex::new(Control {
                usb: Some(usb),
                owner: OwnershipGuard::new(),
                std_id: standard::DEFAULT,
                width,
                height,
                input: 0,
                stream,
            }),
            queue,
            decoders,
            stats,
            handler,
            completions: rx,
            config,
        })
    }

    /// Opens a new session
    pub fn open(self: &Arc<Self>) -> Session {
        Session::new(self.clone())
    }

    /// Handles physical removal
    ///
    /// Transfers are canceled and freed, every buffer the driver holds is returned with an error
    /// and the transport handle is dropped. The bridge itself is not touched anymore.
    pub fn disconnect(&self) {
        let mut guard = self.control.lock();
        let ctl = &mut *guard;

        ctl.stream.stop(ctl.usb.as_ref(), &self.decoders, &self.queue, false);
        // the only place a kept transfer pool is released
        ctl.stream.tear_down();
        // waiters must see the device gone before streaming ends
        self.queue.disconnect();
        self.queue.set_streaming(false);
        ctl.usb = None;

        info!("disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.control.lock().usb.is_some()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The buffer queue, for inspection
    pub fn queue(&self) -> &BufferQueue {
        &self.queue
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn stream_state(&self) -> StreamState {
        self.control.lock().stream.state()
    }

    /// Currently selected alternate setting
    pub fn alternate(&self) -> usize {
        self.control.lock().stream.alternate()
    }

    /// Packet size of the selected alternate setting
    pub fn max_packet_size(&self) -> u32 {
        self.control.lock().stream.max_packet_size()
    }

    /// Whether a transfer pool is allocated
    pub fn has_transfer_pool(&self) -> bool {
        self.control.lock().stream.has_pool()
    }

    /// Returns a handler for the completions of this device
    pub fn completion_handler(&self) -> CompletionHandler {
        self.handler.clone()
    }

    /// Receiving end of the completion channel
    pub fn completions(&self) -> Receiver<Completion> {
        self.completions.clone()
    }

    /// Processes completions on a dedicated thread until the device is dropped
    pub fn spawn_completion_handler(&self) -> io::Result<thread::JoinHandle<()>> {
        self.completion_handler().spawn(self.completions())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock()
    }

    pub(crate) fn decoders(&self) -> &Decoders {
        &self.decoders
    }

    pub(crate) fn start_streaming(&self, ctl: &mut Control) -> Result<()> {
        if self.queue.is_streaming() {
            return Err(Error::Busy);
        }
        if self.queue.count() == 0 {
            return Err(Error::InvalidArgument("no buffers allocated"));
        }

        self.queue.set_streaming(true);
        let epoch = self.queue.epoch();
        if let Err(e) = ctl.stream.start(ctl.usb.as_ref(), &self.decoders, epoch) {
            self.queue.set_streaming(false);
            return Err(e);
        }
        Ok(())
    }

    pub(crate) fn stop_streaming(&self, ctl: &mut Control) {
        ctl.stream.stop(ctl.usb.as_ref(), &self.decoders, &self.queue, true);
        self.queue.set_streaming(false);
    }

    /// Stops streaming if needed and frees all buffers
    pub(crate) fn release_queue(&self, ctl: &mut Control) {
        if self.queue.is_streaming() {
            self.stop_streaming(ctl);
        }
        self.queue.free();
    }

    /// Switches the video standard
    ///
    /// Geometry is derived and stored first, then the frame window registers are written and
    /// the decoders told. A failed register write aborts without restoring the previous window.
    pub(crate) fn apply_standard(&self, ctl: &mut Control, id: StdId) -> Result<()> {
        if self.queue.is_streaming() {
            warn!("device busy");
            return Err(Error::Busy);
        }

        let usb = ctl.usb.clone().ok_or(Error::NoDevice)?;

        let family = match Family::from_id(id) {
            Some(family) => family,
            None => {
                warn!("invalid standard {}", id);
                return Err(Error::InvalidArgument("unsupported standard"));
            }
        };

        let (width, height) = family.geometry();
        ctl.std_id = id;
        ctl.width = width;
        ctl.height = height;

        // TODO: restore the previous frame window when a write fails halfway
        standard::write_registers(usb.as_ref(), family)?;

        self.decoders.set_standard(id);
        debug!("standard {} ({}x{})", id, width, height);
        Ok(())
    }
}
