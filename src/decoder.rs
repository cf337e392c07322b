use std::sync::Arc;

use crate::standard::StdId;

/// Video decoder chip attached behind the bridge
///
/// Calls are best-effort notifications, implementations swallow their own failures.
pub trait Decoder: Send + Sync {
    /// Switches the decoder to a new standard
    fn set_standard(&self, id: StdId);

    /// Starts the decoder output
    fn start_stream(&self);

    /// Stops the decoder output
    fn stop_stream(&self);

    /// Returns the standards compatible with the current input signal, if detection is supported
    fn query_standard(&self) -> Option<StdId> {
        None
    }
}

/// Broadcasts calls to every attached decoder
///
/// An empty set is valid, calls are simply dropped.
#[derive(Clone, Default)]
pub struct Decoders {
    chips: Vec<Arc<dyn Decoder>>,
}

impl Decoders {
    pub fn new(chips: Vec<Arc<dyn Decoder>>) -> Self {
        Decoders { chips }
    }

    pub fn len(&self) -> usize {
        self.chips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chips.is_empty()
    }

    pub fn set_standard(&self, id: StdId) {
        self.chips.iter().for_each(|chip| chip.set_standard(id));
    }

    pub fn start_stream(&self) {
        self.chips.iter().for_each(|chip| chip.start_stream());
    }

    pub fn stop_stream(&self) {
        self.chips.iter().for_each(|chip| chip.stop_stream());
    }

    /// Narrows `candidates` down to what the decoders detect
    ///
    /// Decoders without detection leave the set untouched.
    pub fn query_standard(&self, candidates: StdId) -> StdId {
        self.chips
            .iter()
            .filter_map(|chip| chip.query_standard())
            .fold(candidates, |acc, detected| acc & detected)
    }
}
