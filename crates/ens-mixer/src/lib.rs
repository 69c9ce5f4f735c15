//! Real-time multi-party audio mixing engine
//!
//! A [`Mixer`] owns a fixed pool of [`ChannelSlot`]s. Slot 0 is the local
//! device and the timing reference; every other slot is a remote
//! participant. Each scheduler cycle ingests raw PCM per input pin, runs
//! [`Mixer::process`] and hands every output pin the sum of all other
//! participants, saturated to +/-32000.

pub mod accumulator;
pub mod conditioner;
pub mod config;
pub mod depth;
pub mod fifo;
pub mod mixer;
pub mod slot;

pub use conditioner::{Activity, SignalConditioner};
pub use config::{FrameGeometry, MixerConfig};
pub use mixer::{CycleMode, CycleReport, Mixer, MAX_SLOTS, REFERENCE_SLOT};
pub use slot::{ChannelSlot, PinFlags, SlotStats, StatKind};
