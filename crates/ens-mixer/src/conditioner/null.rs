//! Null conditioner

use super::{Activity, SignalConditioner};

/// Conditioner that leaves audio untouched and never classifies it
#[derive(Debug, Default)]
pub struct NullConditioner {
    frames_seen: u64,
}

impl NullConditioner {
    pub fn new() -> Self {
        Self { frames_seen: 0 }
    }

    /// Frames passed through since the last reset
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

impl SignalConditioner for NullConditioner {
    fn process(&mut self, _frame: &mut [i16]) -> Activity {
        self.frames_seen += 1;
        Activity::Unknown
    }

    fn reset(&mut self) {
        self.frames_seen = 0;
    }

    fn name(&self) -> &'static str {
        "null"
    }
}
