//! Multi-party mixing engine
//!
//! The mixer is driven by an external scheduler: once per cycle the
//! pipeline ingests whatever each input pin received, calls [`Mixer::process`]
//! and then collects output frames with [`Mixer::produce`]. Slot 0 carries
//! the local device and paces the whole engine; one frame is mixed for every
//! frame the reference slot has buffered.
//!
//! Nothing here blocks or takes locks. Reconfiguration must not overlap a
//! cycle; callers sharing a mixer between threads serialise access
//! themselves.

use ens_core::error::MixerError;
use ens_core::{mixer_debug, mixer_info, mixer_trace};

use crate::accumulator::FrameAccumulator;
use crate::conditioner::Activity;
use crate::config::{FrameGeometry, MixerConfig};
use crate::depth::AdaptiveDepthController;
use crate::slot::{ChannelSlot, PinFlags, SlotStats, StatKind};

/// Number of slots in the pool
pub const MAX_SLOTS: usize = 32;
/// Slot carrying the local device, the engine's timing reference
pub const REFERENCE_SLOT: usize = 0;
/// A remote slot buffering more than the reference plus this many frames is
/// flooding
pub const FLOOD_MARGIN_FRAMES: usize = 6;

/// What a cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleMode {
    /// Reference not ready, nothing consumed
    Idle,
    /// Frames relayed between the reference and one remote
    Direct,
    /// Frames summed across all contributors
    Mixing,
}

/// Summary of one [`Mixer::process`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub mode: CycleMode,
    pub rounds: usize,
    /// Highest adaptive depth seen during the cycle
    pub peak_depth: usize,
    /// Reference frames dropped by the depth controller
    pub trimmed_frames: usize,
}

impl CycleReport {
    fn idle(depth: usize) -> Self {
        Self {
            mode: CycleMode::Idle,
            rounds: 0,
            peak_depth: depth,
            trimmed_frames: 0,
        }
    }
}

/// Conference mixer owning a fixed pool of channel slots
pub struct Mixer {
    config: MixerConfig,
    geometry: FrameGeometry,
    slots: Box<[ChannelSlot]>,
    depth: AdaptiveDepthController,
    accumulator: FrameAccumulator,
    /// Scratch for encoding one output frame
    output: Vec<u8>,
    last_mode: CycleMode,
}

impl Mixer {
    /// Create a mixer with every slot allocated and disconnected
    pub fn new(config: MixerConfig) -> Result<Self, MixerError> {
        let geometry = config.geometry()?;
        let conditioner = config.conditioner(&geometry);
        let slots = (0..MAX_SLOTS)
            .map(|_| ChannelSlot::new(&geometry, &conditioner))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        mixer_info!(
            sample_rate = geometry.sample_rate(),
            frame_samples = geometry.frame_samples(),
            direct_mode = config.direct_mode,
            "Mixer created"
        );

        Ok(Self {
            accumulator: FrameAccumulator::new(geometry.frame_samples()),
            output: Vec::with_capacity(geometry.frame_bytes()),
            config,
            geometry,
            slots,
            depth: AdaptiveDepthController::new(),
            last_mode: CycleMode::Idle,
        })
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    /// Current adaptive depth in frames
    pub fn depth(&self) -> usize {
        self.depth.depth()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: usize) -> Option<&ChannelSlot> {
        self.slots.get(index)
    }

    fn slot_mut_checked(&mut self, index: usize) -> Result<&mut ChannelSlot, MixerError> {
        let capacity = self.slots.len();
        self.slots
            .get_mut(index)
            .ok_or(MixerError::SlotOutOfRange { index, capacity })
    }

    /// Wire pins to a slot
    pub fn connect(&mut self, index: usize, pins: PinFlags) -> Result<(), MixerError> {
        self.slot_mut_checked(index)?.connect(pins);
        mixer_debug!(slot = index, ?pins, "Pins connected");
        Ok(())
    }

    /// Unwire a slot, clearing its buffers and statistics
    pub fn disconnect(&mut self, index: usize) -> Result<(), MixerError> {
        self.slot_mut_checked(index)?.disconnect();
        mixer_debug!(slot = index, "Pins disconnected");
        Ok(())
    }

    /// Append data received on an input pin. No-op for unconnected pins.
    pub fn ingest(&mut self, index: usize, data: &[u8]) {
        let Some(slot) = self.slots.get_mut(index).filter(|s| s.has_input()) else {
            mixer_trace!(slot = index, "Ingest on unconnected pin ignored");
            return;
        };

        slot.push_inbound(data);
        if data.is_empty() {
            return;
        }

        if slot.activate() {
            if index == REFERENCE_SLOT {
                mixer_debug!("Reference channel active");
            } else {
                mixer_info!(slot = index, "New contributor");
            }
        }
    }

    /// Remote slots currently counted as participants
    pub fn active_remote_count(&self) -> usize {
        self.slots[REFERENCE_SLOT + 1..]
            .iter()
            .filter(|s| s.has_input() && s.is_active())
            .count()
    }

    fn reference_ready(&self) -> bool {
        let reference = &self.slots[REFERENCE_SLOT];
        reference.has_input()
            && reference.is_active()
            && reference.available() >= self.geometry.frame_bytes()
    }

    /// Whether this cycle would sum frames rather than relay or idle
    pub fn should_mix(&self) -> bool {
        self.reference_ready() && (!self.config.direct_mode || self.active_remote_count() > 1)
    }

    /// Run one scheduler cycle: mixing or relaying rounds until the
    /// reference slot holds less than a frame.
    pub fn process(&mut self) -> CycleReport {
        if !self.reference_ready() {
            return CycleReport::idle(self.depth.depth());
        }

        let mixing = self.should_mix();
        let mode = if mixing {
            CycleMode::Mixing
        } else {
            CycleMode::Direct
        };
        if mode != self.last_mode {
            mixer_debug!(?mode, active = self.active_remote_count(), "Mode switch");
            self.last_mode = mode;
        }

        let mut report = CycleReport {
            mode,
            rounds: 0,
            peak_depth: self.depth.depth(),
            trimmed_frames: 0,
        };

        let frame_bytes = self.geometry.frame_bytes();
        while self.slots[REFERENCE_SLOT].available() >= frame_bytes {
            let (reference_available, trimmed) = self.regulate_reference();
            report.trimmed_frames += trimmed;
            report.peak_depth = report.peak_depth.max(self.depth.depth());

            if mixing {
                self.mix_round(reference_available);
            } else {
                self.relay_round(reference_available);
            }
            report.rounds += 1;
        }

        mixer_trace!(?report, "Cycle complete");
        report
    }

    /// Apply the adaptive depth controller to the reference buffer. Returns
    /// the reference fill after any trim, and the number of frames trimmed.
    fn regulate_reference(&mut self) -> (usize, usize) {
        let reference = &mut self.slots[REFERENCE_SLOT];
        let trim = self
            .depth
            .adjust(reference.available(), self.geometry.frame_bytes());

        let mut dropped = 0;
        if trim > 0 {
            dropped = reference.discard_frames(trim);
            mixer_debug!(dropped, depth = self.depth.depth(), "Reference burst trimmed");
        }
        (reference.available(), dropped)
    }

    fn mix_round(&mut self, reference_available: usize) {
        let flood_threshold = reference_available + self.geometry.bytes_for(FLOOD_MARGIN_FRAMES);
        let condition_reference = self.config.agc_level > 0;

        let Self {
            slots,
            accumulator,
            output,
            ..
        } = self;
        accumulator.clear();

        for (index, slot) in slots.iter_mut().enumerate() {
            if !slot.has_input() {
                slot.clear_contribution();
                continue;
            }
            let is_reference = index == REFERENCE_SLOT;
            let condition = !is_reference || condition_reference;

            if load_frame(index, slot, reference_available, flood_threshold, condition) {
                accumulator.add(slot.frame());
                slot.mark_contributed();
            } else if slot.mark_missed(is_reference) {
                mixer_info!(slot = index, "Contributor evicted after missed rounds");
            }
        }

        for slot in slots.iter_mut().filter(|s| s.has_output()) {
            accumulator.synthesize(slot.contributed().then(|| slot.frame()), output);
            slot.stage_output(output.as_slice());
        }

        mixer_trace!(contributors = accumulator.contributors(), "Mixed round");
    }

    fn relay_round(&mut self, reference_available: usize) {
        let flood_threshold = reference_available + self.geometry.bytes_for(FLOOD_MARGIN_FRAMES);
        let condition_reference = self.config.agc_level > 0;

        let Self { slots, output, .. } = self;
        let remote_index = slots
            .iter()
            .enumerate()
            .skip(REFERENCE_SLOT + 1)
            .find(|(_, s)| s.has_input() && s.is_active())
            .map(|(i, _)| i);

        let (head, rest) = slots.split_at_mut(REFERENCE_SLOT + 1);
        let reference = &mut head[REFERENCE_SLOT];
        if load_frame(REFERENCE_SLOT, reference, reference_available, usize::MAX, condition_reference) {
            reference.mark_contributed();
        } else {
            reference.mark_missed(true);
        }

        let Some(remote_index) = remote_index else {
            mixer_trace!("No remote party, reference frame dropped");
            return;
        };
        let remote = &mut rest[remote_index - REFERENCE_SLOT - 1];

        let remote_loaded = load_frame(remote_index, remote, reference_available, flood_threshold, true);
        if remote_loaded {
            remote.mark_contributed();
        } else if remote.mark_missed(false) {
            mixer_info!(slot = remote_index, "Contributor evicted after missed rounds");
        }

        if remote.has_output() && reference.contributed() {
            reference.encode_frame(output);
            remote.stage_output(output.as_slice());
        }
        if reference.has_output() && remote_loaded {
            remote.encode_frame(output);
            reference.stage_output(output.as_slice());
        }
    }

    /// Pop one output frame for a connected output pin
    pub fn produce(&mut self, index: usize) -> Option<Vec<u8>> {
        self.slots.get_mut(index).filter(|s| s.has_output())?.take_output()
    }

    /// Diagnostics counter for a slot, or -1 for an out-of-range or
    /// unconnected slot
    pub fn get_stat(&self, index: usize, kind: StatKind) -> i64 {
        match self.slots.get(index) {
            Some(slot) if slot.is_connected() => slot.stat(kind) as i64,
            _ => -1,
        }
    }

    /// Full snapshot of a connected slot
    pub fn slot_stats(&self, index: usize) -> Option<SlotStats> {
        self.slots
            .get(index)
            .filter(|s| s.is_connected())
            .map(ChannelSlot::stats)
    }

    /// Apply a new configuration, recomputing the frame geometry and
    /// rebuilding every slot's conditioner. Leaves the mixer untouched when
    /// the configuration is invalid.
    pub fn reconfigure(&mut self, config: MixerConfig) -> Result<(), MixerError> {
        let geometry = config.geometry()?;
        self.rebuild(config, geometry);
        Ok(())
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) -> Result<(), MixerError> {
        self.reconfigure(MixerConfig {
            sample_rate,
            ..self.config.clone()
        })
    }

    pub fn set_vad(&mut self, vad: bool) {
        let config = MixerConfig {
            vad,
            ..self.config.clone()
        };
        self.rebuild(config, self.geometry);
    }

    pub fn set_agc_level(&mut self, agc_level: u32) {
        let config = MixerConfig {
            agc_level,
            ..self.config.clone()
        };
        self.rebuild(config, self.geometry);
    }

    /// Toggle direct relaying. Takes effect on the next cycle.
    pub fn set_direct_mode(&mut self, direct_mode: bool) {
        self.config.direct_mode = direct_mode;
        mixer_debug!(direct_mode, "Direct mode updated");
    }

    fn rebuild(&mut self, config: MixerConfig, geometry: FrameGeometry) {
        let conditioner = config.conditioner(&geometry);
        for slot in self.slots.iter_mut() {
            slot.reconfigure(&geometry, &conditioner);
        }
        self.accumulator.resize(geometry.frame_samples());
        self.output = Vec::with_capacity(geometry.frame_bytes());

        mixer_info!(
            sample_rate = geometry.sample_rate(),
            frame_samples = geometry.frame_samples(),
            vad = config.vad,
            agc_level = config.agc_level,
            "Mixer reconfigured"
        );

        self.geometry = geometry;
        self.config = config;
    }

    /// Clear every slot's buffers, counters and activity. Pins stay wired.
    pub fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.reset();
        }
        self.depth.reset();
        self.accumulator.clear();
        self.last_mode = CycleMode::Idle;
        mixer_debug!("Mixer reset");
    }
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mixer")
            .field("config", &self.config)
            .field("geometry", &self.geometry)
            .field("depth", &self.depth.depth())
            .field("active_remotes", &self.active_remote_count())
            .finish()
    }
}

/// Load this round's frame for a slot, correcting a flood first.
///
/// A slot above `flood_threshold` is drained toward the reference fill one
/// frame at a time. Frames the conditioner calls voice are kept and end the
/// drain; everything else is discarded. Returns true if a frame is loaded.
fn load_frame(
    index: usize,
    slot: &mut ChannelSlot,
    reference_available: usize,
    flood_threshold: usize,
    condition: bool,
) -> bool {
    if slot.available() > flood_threshold {
        let before = slot.stat(StatKind::Discarded);
        let mut kept_voice = false;
        while slot.available() > reference_available && slot.read_frame() {
            if slot.condition() == Activity::Voice {
                kept_voice = true;
                break;
            }
            slot.discard_loaded();
        }
        mixer_debug!(
            slot = index,
            discarded = slot.stat(StatKind::Discarded) - before,
            kept_voice,
            "Flood corrected"
        );
        if kept_voice {
            return true;
        }
    }

    if !slot.read_frame() {
        return false;
    }
    if condition {
        slot.condition();
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(mixer: &Mixer, value: i16, count: usize) -> Vec<u8> {
        let samples = mixer.geometry().frame_samples() * count;
        (0..samples).flat_map(|_| value.to_le_bytes()).collect()
    }

    fn mixer_with(direct_mode: bool, remotes: usize) -> Mixer {
        let mut mixer = Mixer::new(MixerConfig {
            direct_mode,
            ..MixerConfig::default()
        })
        .unwrap();
        for index in 0..=remotes {
            mixer.connect(index, PinFlags::BOTH).unwrap();
        }
        mixer
    }

    #[test]
    fn test_connect_out_of_range() {
        let mut mixer = mixer_with(true, 0);
        assert_eq!(
            mixer.connect(MAX_SLOTS, PinFlags::INPUT),
            Err(MixerError::SlotOutOfRange {
                index: MAX_SLOTS,
                capacity: MAX_SLOTS
            })
        );
        assert!(mixer.disconnect(99).is_err());
    }

    #[test]
    fn test_ingest_requires_input_pin() {
        let mut mixer = mixer_with(true, 0);
        mixer.connect(5, PinFlags::OUTPUT).unwrap();
        let data = frames(&mixer, 100, 1);

        mixer.ingest(5, &data);
        mixer.ingest(7, &data);
        mixer.ingest(MAX_SLOTS + 3, &data);

        assert_eq!(mixer.slot_stats(5).unwrap().buffered_bytes, 0);
        assert!(mixer.slot_stats(7).is_none());
        assert_eq!(mixer.active_remote_count(), 0);
    }

    #[test]
    fn test_stat_sentinel() {
        let mixer = mixer_with(true, 1);
        assert_eq!(mixer.get_stat(1, StatKind::Processed), 0);
        assert_eq!(mixer.get_stat(2, StatKind::Processed), -1);
        assert_eq!(mixer.get_stat(MAX_SLOTS, StatKind::Missed), -1);
        assert_eq!(mixer.get_stat(usize::MAX, StatKind::Discarded), -1);
    }

    #[test]
    fn test_idle_until_reference_has_a_frame() {
        let mut mixer = mixer_with(false, 2);
        let partial = frames(&mixer, 1, 1);
        mixer.ingest(0, &partial[..partial.len() - 2]);

        let report = mixer.process();
        assert_eq!(report.mode, CycleMode::Idle);
        assert_eq!(report.rounds, 0);
        assert!(!mixer.should_mix());

        mixer.ingest(0, &partial[..2]);
        assert!(mixer.should_mix());
        assert_eq!(mixer.process().rounds, 1);
    }

    #[test]
    fn test_mode_follows_active_count() {
        let mut mixer = mixer_with(true, 2);
        let frame = frames(&mixer, 500, 1);

        mixer.ingest(0, &frame);
        assert_eq!(mixer.process().mode, CycleMode::Direct);

        mixer.ingest(0, &frame);
        mixer.ingest(1, &frame);
        assert_eq!(mixer.process().mode, CycleMode::Direct);

        mixer.ingest(0, &frame);
        mixer.ingest(1, &frame);
        mixer.ingest(2, &frame);
        assert_eq!(mixer.active_remote_count(), 2);
        assert_eq!(mixer.process().mode, CycleMode::Mixing);
    }

    #[test]
    fn test_direct_mode_disabled_always_mixes() {
        let mut mixer = mixer_with(false, 1);
        let frame = frames(&mixer, 500, 1);
        mixer.ingest(0, &frame);
        mixer.ingest(1, &frame);
        assert_eq!(mixer.process().mode, CycleMode::Mixing);
    }

    #[test]
    fn test_reconfigure_rejects_bad_rate() {
        let mut mixer = mixer_with(true, 0);
        assert_eq!(mixer.set_sample_rate(0), Err(MixerError::InvalidSampleRate(0)));
        assert_eq!(mixer.geometry().frame_samples(), 160);
    }

    #[test]
    fn test_vad_swaps_conditioners() {
        let mut mixer = mixer_with(true, 1);
        assert_eq!(mixer.slot(1).unwrap().conditioner_name(), "null");
        mixer.set_vad(true);
        assert_eq!(mixer.slot(1).unwrap().conditioner_name(), "energy");
        mixer.set_vad(false);
        mixer.set_agc_level(3000);
        assert_eq!(mixer.slot(0).unwrap().conditioner_name(), "energy");
    }

    #[test]
    fn test_reset_keeps_pins() {
        let mut mixer = mixer_with(false, 2);
        let frame = frames(&mixer, 500, 1);
        for index in 0..3 {
            mixer.ingest(index, &frame);
        }
        mixer.process();
        assert_eq!(mixer.get_stat(0, StatKind::Processed), 1);

        mixer.reset();
        assert_eq!(mixer.get_stat(0, StatKind::Processed), 0);
        assert_eq!(mixer.active_remote_count(), 0);
        assert!(mixer.produce(1).is_none());
        assert!(mixer.slot(1).unwrap().is_connected());
        assert_eq!(mixer.depth(), 3);
    }
}
