//! Adaptive buffering depth for the reference channel

/// Lower bound of the tolerated depth, in frames
pub const MIN_DEPTH_FRAMES: usize = 3;
/// Upper bound of the tolerated depth, in frames
pub const MAX_DEPTH_FRAMES: usize = 6;
/// A raised depth above this many frames triggers a trim
pub const TRIM_TRIGGER_FRAMES: usize = 10;
/// The reference buffer is trimmed down to this many frames
pub const TRIM_TARGET_FRAMES: usize = 6;

/// Tracks how many frames of drift the reference channel may build up.
///
/// The scheduler and the device source run on different clocks; when the
/// device delivers in bursts the reference buffer grows and the depth
/// follows it, when it runs dry the depth relaxes one frame per round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptiveDepthController {
    depth: usize,
}

impl AdaptiveDepthController {
    pub fn new() -> Self {
        Self {
            depth: MIN_DEPTH_FRAMES,
        }
    }

    /// Current depth in frames, always within the bounds above
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn reset(&mut self) {
        self.depth = MIN_DEPTH_FRAMES;
    }

    /// Update the depth from the reference buffer fill and return how many
    /// of its oldest frames must be discarded.
    pub fn adjust(&mut self, buffered_bytes: usize, frame_bytes: usize) -> usize {
        let buffered_frames = buffered_bytes / frame_bytes;
        let mut trim = 0;

        if buffered_bytes > self.depth * frame_bytes {
            self.depth = buffered_frames.max(self.depth);
            if self.depth > TRIM_TRIGGER_FRAMES {
                trim = buffered_frames - TRIM_TARGET_FRAMES;
            }
        } else if buffered_bytes < self.depth * frame_bytes && self.depth > MIN_DEPTH_FRAMES {
            self.depth -= 1;
        }

        self.depth = self.depth.clamp(MIN_DEPTH_FRAMES, MAX_DEPTH_FRAMES);
        trim
    }
}

impl Default for AdaptiveDepthController {
    fn default() -> Self {
        Self::new()
    }
}
