use std::env;

/// Transfer requests allocated per pool
pub const NUM_TRANSFERS: usize = 16;
/// Isochronous packets per transfer request
pub const PACKETS_PER_TRANSFER: usize = 64;
/// Smallest packet size that carries a full 720 pixel line pair
pub const MIN_PACKET_SIZE: u32 = 3072;
/// Lower bound for the number of video buffers
pub const MIN_BUFFERS: u32 = 8;
/// Upper bound for the number of video buffers
pub const MAX_BUFFERS: u32 = 32;

/// Driver tunables
///
/// The defaults match what the hardware needs. `keep_buffers` and `vidioc_debug` can also be
/// picked up from the environment, see [`Config::from_env`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Keep the transfer pool around across stop/start cycles to avoid fragmentation
    pub keep_buffers: bool,
    /// Trace every control operation
    pub vidioc_debug: bool,
    /// Number of transfer requests in flight while streaming
    pub num_transfers: usize,
    /// Number of isochronous packets per transfer request
    pub packets_per_transfer: usize,
    /// Minimum packet size an alternate setting must offer
    pub min_packet_size: u32,
    /// Lower clamp bound for buffer requests
    pub min_buffers: u32,
    /// Upper clamp bound for buffer requests
    pub max_buffers: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            keep_buffers: false,
            vidioc_debug: false,
            num_transfers: NUM_TRANSFERS,
            packets_per_transfer: PACKETS_PER_TRANSFER,
            min_packet_size: MIN_PACKET_SIZE,
            min_buffers: MIN_BUFFERS,
            max_buffers: MAX_BUFFERS,
        }
    }
}

impl Config {
    /// Returns the default configuration, overridden by the environment
    ///
    /// `STK1160_KEEP_BUFFERS` and `STK1160_VIDIOC_DEBUG` accept `1`, `true`, `yes` or `on`.
    ///
    /// # Example
    ///
    /// ```
    /// use stk1160::Config;
    /// let config = Config::from_env();
    /// assert_eq!(config.num_transfers, 16);
    /// ```
    pub fn from_env() -> Self {
        let mut config = Config::default();
        if let Some(on) = env_flag("STK1160_KEEP_BUFFERS") {
            config.keep_buffers = on;
        }
        if let Some(on) = env_flag("STK1160_VIDIOC_DEBUG") {
            config.vidioc_debug = on;
        }
        config
    }

    pub fn keep_buffers(mut self, keep: bool) -> Self {
        self.keep_buffers = keep;
        self
    }

    pub fn vidioc_debug(mut self, debug: bool) -> Self {
        self.vidioc_debug = debug;
        self
    }

    /// Sets the transfer pool geometry
    ///
    /// # Arguments
    ///
    /// * `num_transfers` - Requests kept in flight
    /// * `packets` - Isochronous packets per request
    pub fn transfers(mut self, num_transfers: usize, packets: usize) -> Self {
        self.num_transfers = num_transfers;
        self.packets_per_transfer = packets;
        self
    }

    pub fn min_packet_size(mut self, size: u32) -> Self {
        self.min_packet_size = size;
        self
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    Some(parse_flag(&value))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "y"
    )
}
