//! Mixer configuration and frame geometry

use ens_core::error::MixerError;
use serde::{Deserialize, Serialize};

use crate::conditioner::ConditionerConfig;

/// Signed 16-bit little-endian mono
pub const BYTES_PER_SAMPLE: usize = 2;

/// Longest accepted frame duration
pub const MAX_FRAME_DURATION_MS: u32 = 100;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    pub sample_rate: u32,
    pub frame_duration_ms: u32,
    /// Allow relaying between two parties without summation
    pub direct_mode: bool,
    /// Prefer silent frames when correcting a flooding channel
    pub vad: bool,
    /// AGC target level, 0 disables
    pub agc_level: u32,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 8000,
            frame_duration_ms: 20,
            direct_mode: true,
            vad: false,
            agc_level: 0,
        }
    }
}

impl MixerConfig {
    /// Frame geometry implied by this config
    pub fn geometry(&self) -> Result<FrameGeometry, MixerError> {
        FrameGeometry::new(self.sample_rate, self.frame_duration_ms)
    }

    /// Settings handed to every slot's conditioner
    pub fn conditioner(&self, geometry: &FrameGeometry) -> ConditionerConfig {
        ConditionerConfig {
            sample_rate: self.sample_rate,
            frame_samples: geometry.frame_samples(),
            vad: self.vad,
            agc_level: self.agc_level,
        }
    }
}

/// Size of one mixing frame, derived from the sample rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    sample_rate: u32,
    frame_samples: usize,
    frame_bytes: usize,
}

impl FrameGeometry {
    /// `frame_samples = sample_rate * frame_duration_ms / 1000`, so 8 kHz at
    /// 20 ms gives 160 samples.
    pub fn new(sample_rate: u32, frame_duration_ms: u32) -> Result<Self, MixerError> {
        if sample_rate == 0 {
            return Err(MixerError::InvalidSampleRate(sample_rate));
        }
        if frame_duration_ms == 0 || frame_duration_ms > MAX_FRAME_DURATION_MS {
            return Err(MixerError::InvalidFrameDuration(frame_duration_ms));
        }

        let frame_samples = (sample_rate as u64 * frame_duration_ms as u64 / 1000) as usize;
        if frame_samples == 0 {
            return Err(MixerError::InvalidSampleRate(sample_rate));
        }

        Ok(Self {
            sample_rate,
            frame_samples,
            frame_bytes: frame_samples * BYTES_PER_SAMPLE,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Whole frames contained in `bytes`
    pub fn frames_in(&self, bytes: usize) -> usize {
        bytes / self.frame_bytes
    }

    /// Byte size of `frames` frames
    pub fn bytes_for(&self, frames: usize) -> usize {
        frames * self.frame_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telephony_geometry() {
        let geometry = MixerConfig::default().geometry().unwrap();
        assert_eq!(geometry.frame_samples(), 160);
        assert_eq!(geometry.frame_bytes(), 320);
        assert_eq!(geometry.frames_in(999), 3);
        assert_eq!(geometry.bytes_for(2), 640);
    }

    #[test]
    fn geometry_scales_with_rate() {
        let geometry = FrameGeometry::new(48000, 10).unwrap();
        assert_eq!(geometry.frame_samples(), 480);
        assert_eq!(geometry.frame_bytes(), 960);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: MixerConfig = toml::from_str("sample_rate = 16000\nvad = true").unwrap();
        assert_eq!(
            config,
            MixerConfig {
                sample_rate: 16000,
                vad: true,
                ..MixerConfig::default()
            }
        );

        let text = toml::to_string(&config).unwrap();
        assert_eq!(toml::from_str::<MixerConfig>(&text).unwrap(), config);
    }

    #[test]
    fn rejects_degenerate_settings() {
        assert_eq!(FrameGeometry::new(0, 20), Err(MixerError::InvalidSampleRate(0)));
        assert_eq!(FrameGeometry::new(8000, 0), Err(MixerError::InvalidFrameDuration(0)));
        assert_eq!(FrameGeometry::new(8000, 250), Err(MixerError::InvalidFrameDuration(250)));
        assert_eq!(FrameGeometry::new(10, 20), Err(MixerError::InvalidSampleRate(10)));
    }
}
