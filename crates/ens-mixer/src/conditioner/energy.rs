//! Energy-based conditioner
//!
//! Classifies frames by RMS energy against an adaptive noise floor and,
//! when AGC is enabled, scales frames toward a target RMS level. The gain
//! follows the measured level through exponential smoothing so it never
//! jumps between frames.

use super::{Activity, ConditionerConfig, SignalConditioner};

/// Minimum RMS (in sample units) a frame needs to count as voice
const VOICE_THRESHOLD_RMS: f64 = 400.0;
/// Voice must stand this far above the tracked noise floor
const NOISE_FLOOR_RATIO: f64 = 2.5;
const NOISE_SMOOTHING: f64 = 0.05;
/// Frames still reported as voice after energy drops
const HANGOVER_FRAMES: u32 = 4;

const AGC_SMOOTHING: f64 = 0.2;
/// Frames quieter than this do not steer the gain
const AGC_MIN_RMS: f64 = 50.0;
const MIN_GAIN: f64 = 0.25;
const MAX_GAIN: f64 = 8.0;

/// Root-mean-square level of a frame in sample units
pub fn frame_rms(frame: &[i16]) -> f64 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_squares / frame.len() as f64).sqrt()
}

fn exp_smoothing(value: f64, prev_value: f64, factor: f64) -> f64 {
    prev_value + factor * (value - prev_value)
}

/// VAD + AGC conditioner driven by frame energy
#[derive(Debug, Clone)]
pub struct EnergyConditioner {
    config: ConditionerConfig,
    noise_floor: f64,
    hangover: u32,
    gain: f64,
}

impl EnergyConditioner {
    pub fn new(config: ConditionerConfig) -> Self {
        Self {
            config,
            noise_floor: 0.0,
            hangover: 0,
            gain: 1.0,
        }
    }

    pub fn config(&self) -> &ConditionerConfig {
        &self.config
    }

    /// Current AGC gain
    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn noise_floor(&self) -> f64 {
        self.noise_floor
    }

    fn classify(&mut self, rms: f64) -> Activity {
        let threshold = VOICE_THRESHOLD_RMS.max(self.noise_floor * NOISE_FLOOR_RATIO);
        if rms > threshold {
            self.hangover = HANGOVER_FRAMES;
            return Activity::Voice;
        }

        self.noise_floor = exp_smoothing(rms, self.noise_floor, NOISE_SMOOTHING);
        if self.hangover > 0 {
            self.hangover -= 1;
            Activity::Voice
        } else {
            Activity::Silence
        }
    }

    fn apply_gain(&mut self, frame: &mut [i16], rms: f64) {
        if rms >= AGC_MIN_RMS {
            let desired = (self.config.agc_level as f64 / rms).clamp(MIN_GAIN, MAX_GAIN);
            self.gain = exp_smoothing(desired, self.gain, AGC_SMOOTHING);
        }
        if (self.gain - 1.0).abs() < f64::EPSILON {
            return;
        }
        for sample in frame.iter_mut() {
            let scaled = (*sample as f64 * self.gain).round();
            *sample = scaled.clamp(i16::MIN as f64, i16::MAX as f64) as i16;
        }
    }
}

impl SignalConditioner for EnergyConditioner {
    fn process(&mut self, frame: &mut [i16]) -> Activity {
        let rms = frame_rms(frame);

        let activity = if self.config.vad {
            self.classify(rms)
        } else {
            Activity::Unknown
        };

        if self.config.agc_level > 0 {
            self.apply_gain(frame, rms);
        }

        activity
    }

    fn reset(&mut self) {
        self.noise_floor = 0.0;
        self.hangover = 0;
        self.gain = 1.0;
    }

    fn name(&self) -> &'static str {
        "energy"
    }
}
