//! Input State Sink
//!
//! The boundary to the rest of the input system: one decoded sample per pad
//! slot, written by the bound driver on the I/O thread and read by whatever
//! thread polls input. Pure data, no policy.

use crate::domain::models::{PadSample, MAX_PADS};
use std::sync::{Arc, Mutex};

pub struct InputStateSink {
    slots: [PadSample; MAX_PADS],
}

impl InputStateSink {
    pub fn new() -> Self {
        Self {
            slots: [PadSample::default(); MAX_PADS],
        }
    }

    pub fn set(&mut self, slot: usize, sample: PadSample) {
        if let Some(entry) = self.slots.get_mut(slot) {
            *entry = sample;
        }
    }

    pub fn clear(&mut self, slot: usize) {
        if let Some(entry) = self.slots.get_mut(slot) {
            *entry = PadSample::default();
        }
    }

    pub fn sample(&self, slot: usize) -> PadSample {
        self.slots.get(slot).copied().unwrap_or_default()
    }

    pub fn buttons(&self, slot: usize) -> u32 {
        self.sample(slot).buttons
    }

    pub fn axis(&self, slot: usize, index: usize) -> i16 {
        let sample = self.sample(slot);
        sample.axes.get(index).copied().unwrap_or(0)
    }
}

impl Default for InputStateSink {
    fn default() -> Self {
        Self::new()
    }
}

/// The sink is shared with reader threads, so it lives behind a mutex.
pub type SharedSink = Arc<Mutex<InputStateSink>>;

pub fn shared_sink() -> SharedSink {
    Arc::new(Mutex::new(InputStateSink::new()))
}
