//! Isochronous transfer plumbing
//!
//! The engine that actually talks to the host controller lives outside this crate and is
//! reached through [`IsocEngine`]. Completed requests travel back over a channel as
//! [`Completion`] events and are applied to the buffer queue by a [`CompletionHandler`], so
//! nothing on the completion side ever needs the control mutex.

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, trace, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::{fmt, io, thread};

use crate::error::Result;
use crate::queue::BufferQueue;

/// One in-flight isochronous request
pub struct TransferRequest {
    index: usize,
    packet_sizes: Box<[u32]>,
    buffer: Box<[u8]>,
    link: CompletionLink,
}

impl TransferRequest {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Length of every isochronous packet in the request
    pub fn packet_sizes(&self) -> &[u32] {
        &self.packet_sizes
    }

    /// Transfer buffer, one `max_packet_size` slice per packet
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Returns the channel endpoint the engine reports completions on
    pub fn link(&self) -> CompletionLink {
        self.link.clone()
    }

    /// Tags every later completion of this request with the stream `epoch`
    pub(crate) fn arm(&self, epoch: u64) {
        self.link.epoch.store(epoch, Ordering::Release);
    }
}

impl fmt::Debug for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferRequest")
            .field("index", &self.index)
            .field("packets", &self.packet_sizes.len())
            .field("buffer", &self.buffer.len())
            .finish()
    }
}

/// Set of transfer requests sharing one packet size
#[derive(Debug)]
pub struct TransferPool {
    requests: Vec<TransferRequest>,
    max_packet_size: u32,
}

impl TransferPool {
    /// Builds the requests for a pool
    ///
    /// # Arguments
    ///
    /// * `num_requests` - Number of requests
    /// * `packets` - Isochronous packets per request
    /// * `max_packet_size` - Packet size of the selected alternate setting
    /// * `tx` - Where completions are delivered
    pub fn new(
        num_requests: usize,
        packets: usize,
        max_packet_size: u32,
        tx: &Sender<Completion>,
    ) -> Self {
        let sb_size = packets * max_packet_size as usize;
        let requests = (0..num_requests)
            .map(|index| TransferRequest {
                index,
                packet_sizes: vec![max_packet_size; packets].into_boxed_slice(),
                buffer: vec![0u8; sb_size].into_boxed_slice(),
                link: CompletionLink {
                    request: index,
                    epoch: Arc::new(AtomicU64::new(0)),
                    tx: tx.clone(),
                },
            })
            .collect();

        TransferPool {
            requests,
            max_packet_size,
        }
    }

    pub fn requests(&self) -> &[TransferRequest] {
        &self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn max_packet_size(&self) -> u32 {
        self.max_packet_size
    }
}

/// Host side isochronous transfer engine
pub trait IsocEngine: Send + Sync {
    /// Prepares engine resources for every request of `pool`
    fn allocate(&self, pool: &TransferPool) -> Result<()>;

    /// Submits one request
    fn submit(&self, request: &TransferRequest) -> Result<()>;

    /// Puts a completed request back in flight
    ///
    /// Called from the completion handler, must not block.
    fn resubmit(&self, request: usize) -> Result<()>;

    /// Cancels every request of `pool` and blocks until none is in flight
    fn cancel_all(&self, pool: &TransferPool);

    /// Releases the engine resources of `pool`
    fn free(&self, pool: &TransferPool);
}

/// Outcome of a whole request
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Status {
    Ok,
    /// Unlinked by `cancel_all`
    Canceled,
    /// The device went away
    Shutdown,
    /// Any other failure, carrying the host controller errno
    Failed(i32),
}

/// One isochronous packet as received
#[derive(Debug, Clone, Default)]
pub struct Packet {
    pub data: Vec<u8>,
    /// The packet closes a frame
    pub end_of_frame: bool,
    /// The packet arrived damaged
    pub error: bool,
}

impl Packet {
    pub fn data(data: Vec<u8>) -> Self {
        Packet {
            data,
            ..Packet::default()
        }
    }

    /// Frame-boundary marker without payload
    pub fn frame_end() -> Self {
        Packet {
            end_of_frame: true,
            ..Packet::default()
        }
    }

    pub fn damaged() -> Self {
        Packet {
            error: true,
            ..Packet::default()
        }
    }
}

/// A completed request
#[derive(Debug, Clone)]
pub struct Completion {
    pub request: usize,
    /// Stream the request was submitted for
    pub epoch: u64,
    pub status: Status,
    pub packets: Vec<Packet>,
}

/// Sending half handed to the engine for one request
#[derive(Clone)]
pub struct CompletionLink {
    request: usize,
    epoch: Arc<AtomicU64>,
    tx: Sender<Completion>,
}

impl CompletionLink {
    pub fn request(&self) -> usize {
        self.request
    }

    /// Posts a completion, never blocks
    ///
    /// Returns false once nobody listens anymore.
    pub fn deliver(&self, status: Status, packets: Vec<Packet>) -> bool {
        self.tx
            .send(Completion {
                request: self.request,
                epoch: self.epoch.load(Ordering::Acquire),
                status,
                packets,
            })
            .is_ok()
    }
}

impl fmt::Debug for CompletionLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionLink")
            .field("request", &self.request)
            .finish()
    }
}

/// Capture statistics
///
/// Frame loss never reaches callers as an error, these counters are the only trace of it.
#[derive(Debug, Default)]
pub struct Stats {
    frames: AtomicU64,
    dropped: AtomicU64,
    truncated: AtomicU64,
    packet_errors: AtomicU64,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Frames handed back to the queue
    pub frames: u64,
    /// Packets dropped because no buffer was available
    pub dropped: u64,
    /// Bytes that did not fit into the current buffer
    pub truncated: u64,
    /// Packets skipped because they arrived damaged
    pub packet_errors: u64,
}

impl Stats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            truncated: self.truncated.load(Ordering::Relaxed),
            packet_errors: self.packet_errors.load(Ordering::Relaxed),
        }
    }
}

/// Applies completions to the buffer queue
#[derive(Clone)]
pub struct CompletionHandler {
    queue: Arc<BufferQueue>,
    engine: Arc<dyn IsocEngine>,
    stats: Arc<Stats>,
}

impl CompletionHandler {
    pub(crate) fn new(
        queue: Arc<BufferQueue>,
        engine: Arc<dyn IsocEngine>,
        stats: Arc<Stats>,
    ) -> Self {
        CompletionHandler {
            queue,
            engine,
            stats,
        }
    }

    /// Processes one completion
    ///
    /// Payload is appended to the current buffer; a fresh buffer is taken from the available
    /// list when there is none, and the payload is dropped if the list is empty. A frame-boundary
    /// marker hands the current buffer back. The request is resubmitted afterwards unless it
    /// was canceled or failed.
    ///
    /// Completions of an earlier stream, or arriving while stopped, are discarded without
    /// touching the queue or the engine.
    pub fn handle(&self, completion: Completion) {
        match completion.status {
            Status::Ok => {}
            Status::Canceled | Status::Shutdown => {
                trace!("request [{}] unlinked", completion.request);
                return;
            }
            Status::Failed(code) => {
                error!("request [{}] error! status {}", completion.request, code);
                return;
            }
        }

        let mut fill = self.queue.filler();
        if !fill.accepts(completion.epoch) {
            trace!(
                "stale completion of request [{}] (epoch {}) dropped",
                completion.request,
                completion.epoch
            );
            return;
        }

        for packet in &completion.packets {
            if packet.error {
                self.stats.packet_errors.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            if !packet.data.is_empty() {
                if !fill.has_current() && fill.pop_next_available().is_none() {
                    trace!("no buffer available, dropping {} bytes", packet.data.len());
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }

                let copied = fill.write(&packet.data).unwrap_or(0);
                if copied < packet.data.len() {
                    let lost = (packet.data.len() - copied) as u64;
                    self.stats.truncated.fetch_add(lost, Ordering::Relaxed);
                }
            }

            if packet.end_of_frame {
                if let Some(index) = fill.buffer_done() {
                    trace!("buffer [{}] done", index);
                    self.stats.frames.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        // still under the queue lock, so a concurrent stop fences after this resubmission
        if let Err(e) = self.engine.resubmit(completion.request) {
            warn!("cannot resubmit request [{}]: {}", completion.request, e);
        }
    }

    /// Handles completions until every sender is gone
    pub fn run(&self, rx: Receiver<Completion>) {
        for completion in rx {
            self.handle(completion);
        }
        debug!("completion channel closed");
    }

    /// Runs the handler on its own thread
    pub fn spawn(self, rx: Receiver<Completion>) -> io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name(String::from("stk1160-isoc"))
            .spawn(move || self.run(rx))
    }
}
