//! Per-channel signal conditioners

pub mod energy;
pub mod null;

pub use energy::EnergyConditioner;
pub use null::NullConditioner;

/// Voice-activity verdict for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Voice,
    Silence,
    /// Classification disabled
    Unknown,
}

/// Settings a conditioner is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionerConfig {
    pub sample_rate: u32,
    pub frame_samples: usize,
    pub vad: bool,
    /// AGC target level, 0 disables
    pub agc_level: u32,
}

impl ConditionerConfig {
    /// Nothing to do: no VAD and no AGC
    pub fn is_passive(&self) -> bool {
        !self.vad && self.agc_level == 0
    }
}

/// Voice-activity, noise and gain processing applied to one channel.
///
/// Runs on the engine thread once per consumed frame and may rewrite the
/// frame in place.
pub trait SignalConditioner: Send {
    /// Process one frame, returning its activity classification
    fn process(&mut self, frame: &mut [i16]) -> Activity;
    /// Forget all adaptive state
    fn reset(&mut self);
    /// Short name for diagnostics
    fn name(&self) -> &'static str;
}

/// Build the conditioner variant matching `config`
pub fn create(config: &ConditionerConfig) -> Box<dyn SignalConditioner> {
    if config.is_passive() {
        Box::new(NullConditioner::new())
    } else {
        Box::new(EnergyConditioner::new(*config))
    }
}
