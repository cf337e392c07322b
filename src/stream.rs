use crossbeam_channel::Sender;
use log::{debug, error, info, warn};
use std::sync::Arc;

use crate::buffer::State;
use crate::config::Config;
use crate::decoder::Decoders;
use crate::error::{Error, Result};
use crate::isoc::{Completion, IsocEngine, TransferPool};
use crate::queue::BufferQueue;
use crate::reg;
use crate::usb::Transport;

/// Video interface number
const VIDEO_INTERFACE: u8 = 0;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    /// Selecting the alternate setting and preparing transfers
    Configuring,
    Transferring,
    /// Stopped for good after a disconnect
    TornDown,
}

/// Sequences stream start and stop
///
/// Lives under the control mutex, so all fields are plain data.
pub(crate) struct StreamController {
    state: StreamState,
    alt: usize,
    max_pkt_size: u32,
    alt_max_pkt_size: Vec<u32>,
    pool: Option<TransferPool>,
    engine: Arc<dyn IsocEngine>,
    completions: Sender<Completion>,
    config: Config,
}

impl StreamController {
    pub fn new(
        alt_max_pkt_size: Vec<u32>,
        engine: Arc<dyn IsocEngine>,
        completions: Sender<Completion>,
        config: Config,
    ) -> Self {
        StreamController {
            state: StreamState::Idle,
            alt: 0,
            max_pkt_size: 0,
            alt_max_pkt_size,
            pool: None,
            engine,
            completions,
            config,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn alternate(&self) -> usize {
        self.alt
    }

    pub fn max_packet_size(&self) -> u32 {
        self.max_pkt_size
    }

    pub fn has_pool(&self) -> bool {
        self.pool.is_some()
    }

    /// Picks the alternate setting to stream with
    ///
    /// The first setting offering at least the minimum packet size wins. If none does, the one
    /// with the largest packet size is used since the minimum might be off. Returns whether the
    /// negotiated packet size changed.
    pub fn select_alternate_setting(&mut self, usb: &dyn Transport) -> bool {
        let prev_alt = self.alt;
        let min_pkt_size = self.config.min_packet_size;

        for (i, &size) in self.alt_max_pkt_size.iter().enumerate() {
            if size >= min_pkt_size {
                self.alt = i;
                break;
            } else if size > self.alt_pkt_size(self.alt) {
                self.alt = i;
            }
        }

        info!("setting alternate {}", self.alt);

        if self.alt != prev_alt {
            debug!(
                "minimum isoc packet size: {} (alt={})",
                min_pkt_size, self.alt
            );
            debug!(
                "setting alt {} with wMaxPacketSize={}",
                self.alt,
                self.alt_pkt_size(self.alt)
            );
            match u8::try_from(self.alt) {
                Ok(alt) => {
                    if let Err(e) = usb.set_interface(VIDEO_INTERFACE, alt) {
                        warn!("cannot set alternate {}: {}", self.alt, e);
                    }
                }
                Err(_) => warn!("alternate {} out of range", self.alt),
            }
        }

        let new_pkt_size = self.max_pkt_size != self.alt_pkt_size(self.alt);
        self.max_pkt_size = self.alt_pkt_size(self.alt);
        new_pkt_size
    }

    fn alt_pkt_size(&self, alt: usize) -> u32 {
        self.alt_max_pkt_size.get(alt).copied().unwrap_or(0)
    }

    /// Starts capturing
    ///
    /// Every request is armed with `epoch` before it is submitted. On failure every submitted
    /// request is canceled again and the decoder and bridge are left as they were.
    pub fn start(
        &mut self,
        usb: Option<&Arc<dyn Transport>>,
        decoders: &Decoders,
        epoch: u64,
    ) -> Result<()> {
        let usb = usb.ok_or(Error::NoDevice)?;

        self.state = StreamState::Configuring;
        let result = self.try_start(usb.as_ref(), decoders, epoch);
        self.state = match result {
            Ok(()) => StreamState::Transferring,
            Err(_) => StreamState::Idle,
        };
        result
    }

    fn try_start(&mut self, usb: &dyn Transport, decoders: &Decoders, epoch: u64) -> Result<()> {
        // the alternate setting must be selected before the transfers are set up
        let new_pkt_size = self.select_alternate_setting(usb);

        if self.pool.is_none() || new_pkt_size {
            self.alloc_pool()?;
        }
        let engine = &self.engine;
        let submitted = match self.pool.as_ref() {
            Some(pool) => pool.requests().iter().try_for_each(|request| {
                request.arm(epoch);
                engine.submit(request).map_err(|e| {
                    error!("cannot submit request [{}] ({})", request.index(), e);
                    e
                })
            }),
            None => Err(Error::ResourceExhausted(String::from("no transfer pool"))),
        };
        if let Err(e) = submitted {
            // never leave a partially submitted pool behind
            self.uninit_pool();
            return Err(e);
        }

        decoders.start_stream();

        let dma_on = usb
            .write_register(reg::DCTRL, reg::DCTRL_START)
            .and_then(|_| usb.write_register(reg::DCTRL + 3, 0x00));
        if let Err(e) = dma_on {
            error!("cannot enable capture: {}", e);
            decoders.stop_stream();
            self.uninit_pool();
            return Err(e);
        }

        debug!("streaming started");
        Ok(())
    }

    fn alloc_pool(&mut self) -> Result<()> {
        if let Some(old) = self.pool.take() {
            self.engine.free(&old);
        }

        let pool = TransferPool::new(
            self.config.num_transfers,
            self.config.packets_per_transfer,
            self.max_pkt_size,
            &self.completions,
        );
        if let Err(e) = self.engine.allocate(&pool) {
            error!("cannot allocate {} transfer requests: {}", pool.len(), e);
            return Err(match e {
                e @ Error::ResourceExhausted(_) => e,
                e => Error::ResourceExhausted(e.to_string()),
            });
        }

        debug!(
            "allocated {} requests of {} packets, {} bytes each",
            pool.len(),
            self.config.packets_per_transfer,
            self.max_pkt_size
        );
        self.pool = Some(pool);
        Ok(())
    }

    /// Cancels and frees the pool regardless of the keep-buffers policy
    pub fn uninit_pool(&mut self) {
        if let Some(pool) = self.pool.take() {
            self.engine.cancel_all(&pool);
            self.engine.free(&pool);
        }
    }

    /// Stops capturing, never fails
    ///
    /// Requests are always canceled and buffers always drained. The bridge and decoder are only
    /// touched while the device is still plugged in.
    pub fn stop(
        &mut self,
        usb: Option<&Arc<dyn Transport>>,
        decoders: &Decoders,
        queue: &BufferQueue,
        connected: bool,
    ) {
        // completions already posted must not resubmit or write once canceled
        queue.fence();

        if let Some(pool) = self.pool.as_ref() {
            self.engine.cancel_all(pool);
        }

        // keeping the pool around avoids memory fragmentation
        if !self.config.keep_buffers {
            if let Some(pool) = self.pool.take() {
                self.engine.free(&pool);
            }
        }

        match usb {
            Some(usb) if connected => {
                self.alt = 0;
                info!("setting alternate {}", self.alt);
                if let Err(e) = usb.set_interface(VIDEO_INTERFACE, 0) {
                    warn!("cannot reset alternate: {}", e);
                }

                let dma_off = usb
                    .write_register(reg::DCTRL, reg::DCTRL_STOP)
                    .and_then(|_| usb.write_register(reg::DCTRL + 3, 0x00));
                if let Err(e) = dma_off {
                    warn!("cannot disable capture: {}", e);
                }

                decoders.stop_stream();
            }
            _ => {}
        }

        queue.release_all(State::Error);

        if self.state != StreamState::TornDown {
            self.state = StreamState::Idle;
        }
        debug!("streaming stopped");
    }

    /// Final teardown after the device vanished
    pub fn tear_down(&mut self) {
        self.uninit_pool();
        self.state = StreamState::TornDown;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isoc::TransferRequest;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Usb {
        alts: Mutex<Vec<u8>>,
    }

    impl Transport for Usb {
        fn read_register(&self, _reg: u16) -> Result<u8> {
            Ok(0)
        }
        fn write_register(&self, _reg: u16, _value: u16) -> Result<()> {
            Ok(())
        }
        fn set_interface(&self, _interface: u8, alt: u8) -> Result<()> {
            self.alts.lock().push(alt);
            Ok(())
        }
    }

    struct Idle;

    impl IsocEngine for Idle {
        fn allocate(&self, _pool: &TransferPool) -> Result<()> {
            Ok(())
        }
        fn submit(&self, _request: &TransferRequest) -> Result<()> {
            Ok(())
        }
        fn resubmit(&self, _request: usize) -> Result<()> {
            Ok(())
        }
        fn cancel_all(&self, _pool: &TransferPool) {}
        fn free(&self, _pool: &TransferPool) {}
    }

    fn controller(alts: Vec<u32>) -> StreamController {
        let (tx, _rx) = crossbeam_channel::unbounded();
        StreamController::new(alts, Arc::new(Idle), tx, Config::default())
    }

    #[test]
    fn first_alternate_with_enough_bandwidth() {
        let usb = Usb::default();
        let mut ctl = controller(vec![0, 1024, 3072, 3072 * 2]);
        assert!(ctl.select_alternate_setting(&usb));
        assert_eq!(ctl.alternate(), 2);
        assert_eq!(ctl.max_packet_size(), 3072);
        assert_eq!(*usb.alts.lock(), vec![2]);

        // same choice again, nothing changes
        assert!(!ctl.select_alternate_setting(&usb));
        assert_eq!(usb.alts.lock().len(), 1);
    }

    #[test]
    fn falls_back_to_largest_packet() {
        let usb = Usb::default();
        let mut ctl = controller(vec![0, 1024, 2048, 512]);
        assert!(ctl.select_alternate_setting(&usb));
        assert_eq!(ctl.alternate(), 2);
        assert_eq!(ctl.max_packet_size(), 2048);
    }

    #[test]
    fn alternate_past_u8_is_not_requested() {
        let usb = Usb::default();
        let mut alts = vec![0; 300];
        alts[299] = 3072;
        let mut ctl = controller(alts);
        assert!(ctl.select_alternate_setting(&usb));
        assert_eq!(ctl.alternate(), 299);
        assert!(usb.alts.lock().is_empty());
    }

    #[test]
    fn no_alternates_keeps_default() {
        let usb = Usb::default();
        let mut ctl = controller(Vec::new());
        assert!(!ctl.select_alternate_setting(&usb));
        assert_eq!(ctl.alternate(), 0);
        assert!(usb.alts.lock().is_empty());
    }

    #[test]
    fn start_without_device() {
        let mut ctl = controller(vec![3072]);
        let result = ctl.start(None, &Decoders::default(), 1);
        assert!(matches!(result, Err(Error::NoDevice)));
        assert_eq!(ctl.state(), StreamState::Idle);
        assert!(!ctl.has_pool());
    }

    #[test]
    fn start_and_stop() {
        let usb: Arc<dyn Transport> = Arc::new(Usb::default());
        let queue = BufferQueue::new();
        let mut ctl = controller(vec![0, 3072]);

        ctl.start(Some(&usb), &Decoders::default(), 1).unwrap();
        assert_eq!(ctl.state(), StreamState::Transferring);
        assert!(ctl.has_pool());

        ctl.stop(Some(&usb), &Decoders::default(), &queue, true);
        assert_eq!(ctl.state(), StreamState::Idle);
        assert_eq!(ctl.alternate(), 0);
        assert!(!ctl.has_pool());
    }
}
