//! Ensemble - conference mixing session simulator
//!
//! Stands in for the scheduler and network transport around the mixing
//! engine: synthetic participants send tone frames, the device source
//! stalls and then delivers its backlog in one burst, one participant drops
//! out, and per-slot statistics are printed at the end.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam::channel::{self, Receiver, Sender};
use ens_core::config::{Config, MixerSettings, SimulationConfig};
use ens_mixer::{
    CycleMode, CycleReport, FrameGeometry, Mixer, MixerConfig, PinFlags, StatKind, REFERENCE_SLOT,
};
use parking_lot::Mutex;

/// Frames received from one participant during one cycle
struct Packet {
    slot: usize,
    data: Vec<u8>,
}

/// Square-wave generator with a per-participant pitch
struct ToneSource {
    half_period: usize,
    amplitude: i16,
    position: usize,
}

impl ToneSource {
    fn new(half_period: usize, amplitude: i16) -> Self {
        Self {
            half_period,
            amplitude,
            position: 0,
        }
    }

    fn next_samples(&mut self, samples: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(samples * 2);
        for _ in 0..samples {
            let value = if (self.position / self.half_period) % 2 == 0 {
                self.amplitude
            } else {
                -self.amplitude
            };
            data.extend_from_slice(&value.to_le_bytes());
            self.position += 1;
        }
        data
    }
}

#[derive(Debug, Default)]
struct SessionSummary {
    cycles: u32,
    mixing: u32,
    direct: u32,
    idle: u32,
    rounds: usize,
    trimmed_frames: usize,
    peak_depth: usize,
}

impl SessionSummary {
    fn record(&mut self, report: &CycleReport) {
        self.cycles += 1;
        match report.mode {
            CycleMode::Mixing => self.mixing += 1,
            CycleMode::Direct => self.direct += 1,
            CycleMode::Idle => self.idle += 1,
        }
        self.rounds += report.rounds;
        self.trimmed_frames += report.trimmed_frames;
        self.peak_depth = self.peak_depth.max(report.peak_depth);
    }
}

fn mixer_config(settings: &MixerSettings) -> MixerConfig {
    MixerConfig {
        sample_rate: settings.sample_rate,
        frame_duration_ms: settings.frame_duration_ms,
        direct_mode: settings.direct_mode,
        vad: settings.vad,
        agc_level: settings.agc_level,
    }
}

fn run_transport(
    sim: &SimulationConfig,
    geometry: FrameGeometry,
    frame_ms: u32,
    tx: Sender<Vec<Packet>>,
) {
    let amplitude = sim.amplitude;
    let mut sources: Vec<ToneSource> = (1..=sim.participants)
        .map(|p| ToneSource::new(4 + p, amplitude))
        .collect();

    for cycle in 0..sim.cycles {
        let dropped_out =
            sim.drop_participant_at_cycle > 0 && cycle >= sim.drop_participant_at_cycle;

        let batch: Vec<Packet> = sources
            .iter_mut()
            .enumerate()
            .map(|(i, source)| (i + 1, source))
            .filter(|(slot, _)| !(dropped_out && *slot == sim.participants))
            .map(|(slot, source)| Packet {
                slot,
                data: source.next_samples(geometry.frame_samples()),
            })
            .collect();

        if tx.send(batch).is_err() {
            break;
        }
        if sim.realtime {
            thread::sleep(Duration::from_millis(frame_ms as u64));
        }
    }
    tracing::debug!("Transport finished");
}

fn run_scheduler(
    sim: &SimulationConfig,
    mixer: &Mutex<Mixer>,
    rx: Receiver<Vec<Packet>>,
    report_tx: Sender<CycleReport>,
) -> u64 {
    let frame_samples = mixer.lock().geometry().frame_samples();
    let stall = sim.stall_at_cycle..sim.stall_at_cycle + sim.stall_length;
    let mut device = ToneSource::new(3, sim.amplitude / 2);
    let mut backlog = 0usize;
    let mut produced = 0u64;

    for (cycle, batch) in rx.iter().enumerate() {
        let mut mixer = mixer.lock();
        for packet in &batch {
            mixer.ingest(packet.slot, &packet.data);
        }

        if sim.stall_at_cycle > 0 && stall.contains(&(cycle as u32)) {
            backlog += 1;
        } else {
            // A stalled device hands over everything it held at once
            let data = device.next_samples(frame_samples * (backlog + 1));
            mixer.ingest(REFERENCE_SLOT, &data);
            if backlog > 0 {
                tracing::info!(frames = backlog + 1, "Device source burst");
            }
            backlog = 0;
        }

        let report = mixer.process();
        for slot in 0..=sim.participants {
            while mixer.produce(slot).is_some() {
                produced += 1;
            }
        }
        drop(mixer);

        if report_tx.send(report).is_err() {
            break;
        }
    }
    produced
}

fn collect_reports(mixer: &Mutex<Mixer>, rx: Receiver<CycleReport>) -> SessionSummary {
    let mut summary = SessionSummary::default();
    for report in rx.iter() {
        summary.record(&report);
        if summary.cycles % 50 == 0 {
            let mixer = mixer.lock();
            tracing::info!(
                cycle = summary.cycles,
                active = mixer.active_remote_count(),
                depth = mixer.depth(),
                "Session progress"
            );
        }
    }
    summary
}

fn print_summary(mixer: &Mixer, sim: &SimulationConfig, summary: &SessionSummary, produced: u64) {
    let geometry = mixer.geometry();
    println!("=== Ensemble Session ===\n");
    println!(
        "Format: {} Hz, {} samples per frame, direct mode {}",
        geometry.sample_rate(),
        geometry.frame_samples(),
        if mixer.config().direct_mode { "allowed" } else { "off" }
    );
    println!(
        "Cycles: {} (mixing {}, direct {}, idle {})",
        summary.cycles, summary.mixing, summary.direct, summary.idle
    );
    println!(
        "Rounds: {}, output frames: {}, reference frames trimmed: {}, peak depth: {}",
        summary.rounds, produced, summary.trimmed_frames, summary.peak_depth
    );

    println!(
        "\n{:>4} {:>8} {:>10} {:>8} {:>10}",
        "slot", "active", "processed", "missed", "discarded"
    );
    for slot in 0..=sim.participants {
        let active = mixer.slot_stats(slot).map(|s| s.active).unwrap_or(false);
        println!(
            "{:>4} {:>8} {:>10} {:>8} {:>10}",
            slot,
            active,
            mixer.get_stat(slot, StatKind::Processed),
            mixer.get_stat(slot, StatKind::Missed),
            mixer.get_stat(slot, StatKind::Discarded),
        );
    }
}

fn main() -> Result<()> {
    let config = Config::load().unwrap_or_default();
    ens_core::logging::init(&config.debug);

    tracing::info!("Starting ensemble session simulator");

    let sim = config.simulation.clone();
    let mut mixer =
        Mixer::new(mixer_config(&config.mixer)).context("Invalid mixer configuration")?;
    for slot in 0..=sim.participants {
        mixer
            .connect(slot, PinFlags::BOTH)
            .with_context(|| format!("Cannot seat participant {slot}"))?;
    }
    let geometry = mixer.geometry();
    let mixer = Arc::new(Mutex::new(mixer));

    let (packet_tx, packet_rx) = channel::bounded::<Vec<Packet>>(8);
    let (report_tx, report_rx) = channel::unbounded::<CycleReport>();

    let transport = {
        let sim = sim.clone();
        let frame_ms = config.mixer.frame_duration_ms;
        thread::Builder::new()
            .name("transport".into())
            .spawn(move || run_transport(&sim, geometry, frame_ms, packet_tx))?
    };
    let scheduler = {
        let sim = sim.clone();
        let mixer = Arc::clone(&mixer);
        thread::Builder::new()
            .name("scheduler".into())
            .spawn(move || run_scheduler(&sim, &mixer, packet_rx, report_tx))?
    };

    let summary = collect_reports(&mixer, report_rx);
    transport
        .join()
        .map_err(|_| anyhow!("transport thread panicked"))?;
    let produced = scheduler
        .join()
        .map_err(|_| anyhow!("scheduler thread panicked"))?;

    print_summary(&mixer.lock(), &sim, &summary, produced);
    Ok(())
}
