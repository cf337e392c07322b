#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::io;
use std::sync::Arc;

use stk1160::decoder::{Decoder, Decoders};
use stk1160::isoc::{CompletionLink, IsocEngine, Packet, Status, TransferPool, TransferRequest};
use stk1160::usb::Transport;
use stk1160::{Config, Device, Error, Result, StdId};

/// wMaxPacketSize of the alternate settings, alt 2 is the first one large enough
pub const ALTS: [u32; 4] = [0, 1024, 3072, 3 * 1024 + 0x400];

#[derive(Default)]
struct UsbState {
    writes: Vec<(u16, u16)>,
    interfaces: Vec<(u8, u8)>,
    registers: HashMap<u16, u8>,
    fail_write_at: Option<usize>,
    gone: bool,
}

/// Bridge that records every request
#[derive(Default)]
pub struct MockUsb {
    state: Mutex<UsbState>,
}

impl MockUsb {
    pub fn writes(&self) -> Vec<(u16, u16)> {
        self.state.lock().writes.clone()
    }

    pub fn interfaces(&self) -> Vec<(u8, u8)> {
        self.state.lock().interfaces.clone()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.writes.clear();
        state.interfaces.clear();
    }

    /// Fails the n-th write from now on, counting from 1
    pub fn fail_write_at(&self, n: usize) {
        let mut state = self.state.lock();
        state.fail_write_at = Some(state.writes.len() + n);
    }

    pub fn set_register(&self, reg: u16, val: u8) {
        self.state.lock().registers.insert(reg, val);
    }

    /// Every request fails from now on
    pub fn unplug(&self) {
        self.state.lock().gone = true;
    }
}

impl Transport for MockUsb {
    fn read_register(&self, reg: u16) -> Result<u8> {
        let state = self.state.lock();
        if state.gone {
            return Err(Error::NoDevice);
        }
        Ok(state.registers.get(&reg).copied().unwrap_or(0))
    }

    fn write_register(&self, reg: u16, value: u16) -> Result<()> {
        let mut state = self.state.lock();
        if state.gone {
            return Err(Error::NoDevice);
        }
        if state.fail_write_at == Some(state.writes.len() + 1) {
            state.fail_write_at = None;
            return Err(Error::Transport(io::Error::from_raw_os_error(libc::EPIPE)));
        }
        state.writes.push((reg, value));
        Ok(())
    }

    fn set_interface(&self, interface: u8, alt: u8) -> Result<()> {
        let mut state = self.state.lock();
        if state.gone {
            return Err(Error::NoDevice);
        }
        state.interfaces.push((interface, alt));
        Ok(())
    }

    fn bus_info(&self) -> String {
        String::from("usb-mock-1")
    }
}

#[derive(Default)]
struct EngineState {
    allocations: usize,
    frees: usize,
    submits: usize,
    fail_submit_at: Option<usize>,
    fail_allocate: bool,
    in_flight: BTreeSet<usize>,
    links: HashMap<usize, CompletionLink>,
}

/// Transfer engine that completes requests on demand
#[derive(Default)]
pub struct MockEngine {
    state: Mutex<EngineState>,
}

impl MockEngine {
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    pub fn allocations(&self) -> usize {
        self.state.lock().allocations
    }

    pub fn frees(&self) -> usize {
        self.state.lock().frees
    }

    /// Fails the n-th submission from now on, counting from 1
    pub fn fail_submit_at(&self, n: usize) {
        let mut state = self.state.lock();
        state.fail_submit_at = Some(state.submits + n);
    }

    pub fn fail_allocate(&self) {
        self.state.lock().fail_allocate = true;
    }

    /// Completes an in-flight request with `packets`
    pub fn complete(&self, request: usize, packets: Vec<Packet>) -> bool {
        self.finish(request, Status::Ok, packets)
    }

    pub fn finish(&self, request: usize, status: Status, packets: Vec<Packet>) -> bool {
        let link = {
            let mut state = self.state.lock();
            if !state.in_flight.remove(&request) {
                return false;
            }
            match state.links.get(&request) {
                Some(link) => link.clone(),
                None => return false,
            }
        };
        link.deliver(status, packets)
    }
}

impl IsocEngine for MockEngine {
    fn allocate(&self, pool: &TransferPool) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_allocate {
            return Err(Error::ResourceExhausted(format!(
                "{} requests",
                pool.len()
            )));
        }
        state.allocations += 1;
        Ok(())
    }

    fn submit(&self, request: &TransferRequest) -> Result<()> {
        let mut state = self.state.lock();
        state.submits += 1;
        if state.fail_submit_at == Some(state.submits) {
            state.fail_submit_at = None;
            return Err(Error::Transport(io::Error::from_raw_os_error(libc::ENOSPC)));
        }
        state.in_flight.insert(request.index());
        state.links.insert(request.index(), request.link());
        Ok(())
    }

    fn resubmit(&self, request: usize) -> Result<()> {
        let mut state = self.state.lock();
        if !state.links.contains_key(&request) {
            return Err(Error::NoDevice);
        }
        state.in_flight.insert(request);
        Ok(())
    }

    fn cancel_all(&self, _pool: &TransferPool) {
        self.state.lock().in_flight.clear();
    }

    fn free(&self, _pool: &TransferPool) {
        let mut state = self.state.lock();
        state.frees += 1;
        state.links.clear();
    }
}

/// Decoder that logs its calls
#[derive(Default)]
pub struct MockDecoder {
    calls: Mutex<Vec<String>>,
    detected: Mutex<Option<StdId>>,
}

impl MockDecoder {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn detect(&self, id: StdId) {
        *self.detected.lock() = Some(id);
    }
}

impl Decoder for MockDecoder {
    fn set_standard(&self, id: StdId) {
        self.calls.lock().push(format!("s_std {:#x}", u64::from(id)));
    }

    fn start_stream(&self) {
        self.calls.lock().push(String::from("start"));
    }

    fn stop_stream(&self) {
        self.calls.lock().push(String::from("stop"));
    }

    fn query_standard(&self) -> Option<StdId> {
        *self.detected.lock()
    }
}

pub struct Rig {
    pub dev: Arc<Device>,
    pub usb: Arc<MockUsb>,
    pub engine: Arc<MockEngine>,
    pub decoder: Arc<MockDecoder>,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let usb = Arc::new(MockUsb::default());
        let engine = Arc::new(MockEngine::default());
        let decoder = Arc::new(MockDecoder::default());
        let dev = Device::new(
            usb.clone(),
            engine.clone(),
            Decoders::new(vec![decoder.clone() as Arc<dyn Decoder>]),
            ALTS.to_vec(),
            config,
        );
        Rig {
            dev,
            usb,
            engine,
            decoder,
        }
    }

    /// Runs the completion handler over everything delivered so far
    pub fn pump(&self) -> usize {
        let handler = self.dev.completion_handler();
        let mut n = 0;
        for completion in self.dev.completions().try_iter() {
            handler.handle(completion);
            n += 1;
        }
        n
    }
}
