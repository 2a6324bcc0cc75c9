// keybed_cli - offline harness for the velocity engine
//
// Replays recorded sample traces (or generates seeded synthetic strokes)
// through the full engine pipeline and streams the resulting events to
// stdout as JSON lines. Useful for tuning thresholds and the velocity curve
// without hardware attached.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use keybed_engine::{
    AppConfig, EventDrainer, EventQueue, FileStore, KeyId, KeybedEngine, MemoryStore, MidiEvent,
    TableNoteMap, Transport,
};

#[derive(Parser, Debug)]
#[command(
    name = "keybed_cli",
    about = "Trace replay and synthetic stroke harness for the keybed engine"
)]
struct Cli {
    /// JSON config file; defaults are used if absent or invalid
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a JSON sample trace and print emitted events
    Replay {
        /// JSON array of {key, raw, t_us} samples
        #[arg(long)]
        trace: PathBuf,
        /// Threshold blob to load before the run (FileStore format)
        #[arg(long)]
        thresholds: Option<PathBuf>,
    },
    /// Run seeded synthetic strokes through the engine
    Synth {
        #[arg(long, default_value_t = 8)]
        keys: u16,
        #[arg(long, default_value_t = 32)]
        strokes: u32,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

/// One recorded scan slot
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TraceSample {
    key: u16,
    raw: u16,
    t_us: u64,
}

/// Prints each event as a JSON line; flush marks the end of a drain batch
struct StdoutTransport {
    emitted: u64,
}

impl Transport for StdoutTransport {
    fn send(&mut self, event: &MidiEvent) {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(err) => log::error!("[Cli] failed to serialize event: {}", err),
        }
        self.emitted += 1;
    }

    fn flush(&mut self) {
        let _ = std::io::stdout().flush();
    }
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Replay { trace, thresholds } => run_replay(config, &trace, thresholds),
        Commands::Synth {
            keys,
            strokes,
            seed,
        } => run_synth(config, keys, strokes, seed),
    }
}

fn build_engine(
    config: AppConfig,
    thresholds: Option<PathBuf>,
) -> (KeybedEngine, EventDrainer) {
    let (producer, drainer) = EventQueue::with_capacity(config.queue.capacity);
    let note_map = Box::new(TableNoteMap::linear(config.keys.key_count, 36));
    let storage: Box<dyn keybed_engine::ThresholdStorage> = match thresholds {
        Some(path) => Box::new(FileStore::new(path)),
        None => Box::new(MemoryStore::new()),
    };
    (
        KeybedEngine::new(config, note_map, storage, producer),
        drainer,
    )
}

fn run_replay(
    config: AppConfig,
    trace_path: &PathBuf,
    thresholds: Option<PathBuf>,
) -> Result<ExitCode> {
    let contents = fs::read_to_string(trace_path)
        .with_context(|| format!("reading trace {:?}", trace_path))?;
    let samples: Vec<TraceSample> =
        serde_json::from_str(&contents).context("parsing trace JSON")?;

    let (mut engine, mut drainer) = build_engine(config, thresholds);
    let mut transport = StdoutTransport { emitted: 0 };

    for sample in &samples {
        engine.process_sample(KeyId::new(sample.key), sample.raw, sample.t_us);
        // Mimic the device loop: a short budgeted drain per pass
        drainer.drain(Duration::from_micros(500), &mut transport);
    }
    while !drainer.is_empty() {
        drainer.drain(Duration::from_millis(1), &mut transport);
    }

    let stats = engine.stats();
    log::info!(
        "[Cli] replayed {} samples: {} note-on, {} note-off, {} dropped",
        samples.len(),
        stats.notes_on,
        stats.notes_off,
        stats.dropped_events
    );
    eprintln!(
        "{} samples -> {} events ({} dropped)",
        samples.len(),
        transport.emitted,
        stats.dropped_events
    );
    Ok(ExitCode::from(0))
}

fn run_synth(config: AppConfig, keys: u16, strokes: u32, seed: u64) -> Result<ExitCode> {
    let keys = keys.clamp(1, config.keys.key_count);
    let rest = config.calibration.default_low.saturating_sub(100);
    let (mut engine, mut drainer) = build_engine(config, None);
    let mut transport = StdoutTransport { emitted: 0 };
    let mut rng = StdRng::seed_from_u64(seed);
    let mut t_us: u64 = 0;

    for _ in 0..strokes {
        let key = KeyId::new(rng.gen_range(0..keys));
        let peak: u16 = rng.gen_range(930..=1010);
        let rise_step_us: u64 = rng.gen_range(100..=2_000);

        // Idle padding, ramp up to the peak, brief hold, ramp back down
        let mut levels: Vec<u16> = vec![rest, rest];
        let mut level = rest;
        while level < peak {
            level = (level + 40).min(peak);
            levels.push(level);
        }
        levels.extend_from_slice(&[peak, peak]);
        while level > rest {
            level = level.saturating_sub(60).max(rest);
            levels.push(level);
        }
        levels.extend_from_slice(&[rest, rest]);

        for raw in levels {
            let jitter: i32 = rng.gen_range(-2..=2);
            let raw = (raw as i32 + jitter).clamp(0, 1023) as u16;
            engine.process_sample(key, raw, t_us);
            t_us += rise_step_us;
            drainer.drain(Duration::from_micros(500), &mut transport);
        }
        // Gap between strokes
        t_us += 50_000;
    }
    while !drainer.is_empty() {
        drainer.drain(Duration::from_millis(1), &mut transport);
    }

    let stats = engine.stats();
    eprintln!(
        "{} strokes -> {} note-on, {} note-off ({} dropped)",
        strokes, stats.notes_on, stats.notes_off, stats.dropped_events
    );
    Ok(ExitCode::from(0))
}
