//! Per-participant channel state

use bitflags::bitflags;

use crate::accumulator::{decode_pcm, encode_pcm};
use crate::conditioner::{self, Activity, ConditionerConfig, SignalConditioner};
use crate::config::FrameGeometry;
use crate::fifo::{ByteFifo, ByteQueue};

/// A remote slot missing more consecutive rounds than this is evicted
pub const EVICTION_THRESHOLD: u32 = 15;

/// Staged output beyond this many frames drops its oldest frame
pub const OUTBOUND_LIMIT_FRAMES: usize = 32;

bitflags! {
    /// Which pipeline pins are wired to a slot
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PinFlags: u8 {
        const INPUT  = 0x01;
        const OUTPUT = 0x02;
        const BOTH   = Self::INPUT.bits() | Self::OUTPUT.bits();
    }
}

/// Counter selector for the diagnostics query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    Discarded,
    Missed,
    Processed,
}

/// Snapshot of one slot's state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotStats {
    pub discarded: u64,
    pub missed: u64,
    pub processed: u64,
    pub active: bool,
    pub consecutive_missed: u32,
    pub buffered_bytes: usize,
}

/// One participant's channel
pub struct ChannelSlot {
    pins: PinFlags,
    inbound: ByteQueue,
    outbound: ByteQueue,
    active: bool,
    contributed: bool,
    consecutive_missed: u32,
    discarded: u64,
    missed: u64,
    processed: u64,
    conditioner: Box<dyn SignalConditioner>,
    /// Frame consumed this round, after conditioning
    frame: Vec<i16>,
    scratch: Vec<u8>,
}

impl ChannelSlot {
    pub fn new(geometry: &FrameGeometry, conditioner: &ConditionerConfig) -> Self {
        Self {
            pins: PinFlags::empty(),
            inbound: ByteQueue::with_capacity(geometry.bytes_for(4)),
            outbound: ByteQueue::with_capacity(geometry.bytes_for(2)),
            active: false,
            contributed: false,
            consecutive_missed: 0,
            discarded: 0,
            missed: 0,
            processed: 0,
            conditioner: conditioner::create(conditioner),
            frame: vec![0; geometry.frame_samples()],
            scratch: vec![0; geometry.frame_bytes()],
        }
    }

    pub fn pins(&self) -> PinFlags {
        self.pins
    }

    pub fn is_connected(&self) -> bool {
        !self.pins.is_empty()
    }

    pub fn has_input(&self) -> bool {
        self.pins.contains(PinFlags::INPUT)
    }

    pub fn has_output(&self) -> bool {
        self.pins.contains(PinFlags::OUTPUT)
    }

    pub fn connect(&mut self, pins: PinFlags) {
        self.pins |= pins;
    }

    /// Unwire the slot and forget everything it held
    pub fn disconnect(&mut self) {
        self.pins = PinFlags::empty();
        self.reset();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Mark the slot as a live contributor. Returns true if it was not
    /// active before.
    pub fn activate(&mut self) -> bool {
        self.consecutive_missed = 0;
        !std::mem::replace(&mut self.active, true)
    }

    pub fn contributed(&self) -> bool {
        self.contributed
    }

    pub fn consecutive_missed(&self) -> u32 {
        self.consecutive_missed
    }

    pub fn conditioner_name(&self) -> &'static str {
        self.conditioner.name()
    }

    /// Append received bytes to the inbound buffer
    pub fn push_inbound(&mut self, data: &[u8]) {
        self.inbound.push(data);
    }

    /// Buffered inbound bytes
    pub fn available(&self) -> usize {
        self.inbound.available()
    }

    /// Pull exactly one frame from the inbound buffer into the frame slot.
    /// Returns false, consuming nothing, if a full frame is not buffered.
    pub fn read_frame(&mut self) -> bool {
        if !self.inbound.read_exact(&mut self.scratch) {
            return false;
        }
        decode_pcm(&self.scratch, &mut self.frame);
        true
    }

    /// Drop the `frames` oldest buffered frames, counting them as discarded
    pub fn discard_frames(&mut self, frames: usize) -> usize {
        let frame_bytes = self.scratch.len();
        let dropped = self.inbound.skip(frames * frame_bytes) / frame_bytes;
        self.discarded += dropped as u64;
        dropped
    }

    /// Count the frame currently loaded as discarded
    pub fn discard_loaded(&mut self) {
        self.discarded += 1;
    }

    /// Run the loaded frame through the conditioner
    pub fn condition(&mut self) -> Activity {
        self.conditioner.process(&mut self.frame)
    }

    /// The frame consumed this round
    pub fn frame(&self) -> &[i16] {
        &self.frame
    }

    pub fn mark_contributed(&mut self) {
        self.contributed = true;
        self.processed += 1;
    }

    /// Record a round without data. Returns true when this miss evicts the
    /// slot; the reference slot is never evicted.
    pub fn mark_missed(&mut self, is_reference: bool) -> bool {
        self.contributed = false;
        self.missed += 1;
        if is_reference {
            return false;
        }
        self.consecutive_missed = self.consecutive_missed.saturating_add(1);
        if self.active && self.consecutive_missed > EVICTION_THRESHOLD {
            self.active = false;
            return true;
        }
        false
    }

    /// Mark the slot as sitting out this round without touching counters
    pub fn clear_contribution(&mut self) {
        self.contributed = false;
    }

    /// Queue one output frame given as PCM bytes
    pub fn stage_output(&mut self, frame: &[u8]) {
        let frame_bytes = self.scratch.len();
        if self.outbound.available() >= frame_bytes * OUTBOUND_LIMIT_FRAMES {
            self.outbound.skip(frame_bytes);
        }
        self.outbound.push(frame);
    }

    /// Encode the loaded frame as PCM bytes
    pub fn encode_frame(&self, out: &mut Vec<u8>) {
        encode_pcm(&self.frame, out);
    }

    /// Pop one staged output frame
    pub fn take_output(&mut self) -> Option<Vec<u8>> {
        let mut frame = vec![0; self.scratch.len()];
        self.outbound.read_exact(&mut frame).then_some(frame)
    }

    /// Staged output frames waiting to be produced
    pub fn staged_frames(&self) -> usize {
        self.outbound.available() / self.scratch.len()
    }

    /// Rebuild frame storage and the conditioner for new settings
    pub fn reconfigure(&mut self, geometry: &FrameGeometry, conditioner: &ConditionerConfig) {
        self.conditioner = conditioner::create(conditioner);
        self.frame.clear();
        self.frame.resize(geometry.frame_samples(), 0);
        self.scratch.clear();
        self.scratch.resize(geometry.frame_bytes(), 0);
        self.outbound.clear();
    }

    /// Clear buffers, counters, activity and conditioner state. Pins stay wired.
    pub fn reset(&mut self) {
        self.inbound.clear();
        self.outbound.clear();
        self.active = false;
        self.contributed = false;
        self.consecutive_missed = 0;
        self.discarded = 0;
        self.missed = 0;
        self.processed = 0;
        self.frame.fill(0);
        self.conditioner.reset();
    }

    pub fn stat(&self, kind: StatKind) -> u64 {
        match kind {
            StatKind::Discarded => self.discarded,
            StatKind::Missed => self.missed,
            StatKind::Processed => self.processed,
        }
    }

    pub fn stats(&self) -> SlotStats {
        SlotStats {
            discarded: self.discarded,
            missed: self.missed,
            processed: self.processed,
            active: self.active,
            consecutive_missed: self.consecutive_missed,
            buffered_bytes: self.inbound.available(),
        }
    }
}

impl std::fmt::Debug for ChannelSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSlot")
            .field("pins", &self.pins)
            .field("conditioner", &self.conditioner.name())
            .field("stats", &self.stats())
            .finish()
    }
}
