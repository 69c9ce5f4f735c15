//! Per-round summation and output synthesis

/// Output samples are clamped to +/- this value, inside the 16-bit range
pub const SATURATION_LIMIT: i32 = 32000;

/// Clamp a widened sample into the output range
#[inline]
pub fn saturate(value: i32) -> i16 {
    value.clamp(-SATURATION_LIMIT, SATURATION_LIMIT) as i16
}

/// Decode little-endian 16-bit PCM into `out`
pub fn decode_pcm(bytes: &[u8], out: &mut [i16]) {
    for (sample, chunk) in out.iter_mut().zip(bytes.chunks_exact(2)) {
        *sample = i16::from_le_bytes([chunk[0], chunk[1]]);
    }
}

/// Encode samples as little-endian 16-bit PCM, replacing the contents of `out`
pub fn encode_pcm(samples: &[i16], out: &mut Vec<u8>) {
    out.clear();
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
}

/// Widened running sum of every frame contributed in one mixing round
#[derive(Debug, Clone)]
pub struct FrameAccumulator {
    sums: Vec<i32>,
    contributors: usize,
}

impl FrameAccumulator {
    pub fn new(frame_samples: usize) -> Self {
        Self {
            sums: vec![0; frame_samples],
            contributors: 0,
        }
    }

    /// Change the frame length, clearing the sum
    pub fn resize(&mut self, frame_samples: usize) {
        self.sums.clear();
        self.sums.resize(frame_samples, 0);
        self.contributors = 0;
    }

    pub fn clear(&mut self) {
        self.sums.fill(0);
        self.contributors = 0;
    }

    /// Add one frame to the sum
    pub fn add(&mut self, frame: &[i16]) {
        debug_assert_eq!(frame.len(), self.sums.len());
        for (sum, &sample) in self.sums.iter_mut().zip(frame) {
            *sum += sample as i32;
        }
        self.contributors += 1;
    }

    pub fn sums(&self) -> &[i32] {
        &self.sums
    }

    /// Frames added since the last clear
    pub fn contributors(&self) -> usize {
        self.contributors
    }

    /// Write the output frame for one listener as PCM bytes.
    ///
    /// A listener that contributed gets the sum minus its own frame so it
    /// never hears itself; everyone else gets the full sum.
    pub fn synthesize(&self, own: Option<&[i16]>, out: &mut Vec<u8>) {
        out.clear();
        match own {
            Some(own) => {
                for (&sum, &mine) in self.sums.iter().zip(own) {
                    out.extend_from_slice(&saturate(sum - mine as i32).to_le_bytes());
                }
            }
            None => {
                for &sum in &self.sums {
                    out.extend_from_slice(&saturate(sum).to_le_bytes());
                }
            }
        }
    }
}
