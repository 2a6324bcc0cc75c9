// Keybed Engine - velocity-sensing core for a multi-key analog controller
// Turns per-key ADC sample streams into note events with measured velocity

pub mod calibration;
pub mod config;
pub mod engine;
pub mod error;
pub mod notemap;
pub mod queue;
pub mod storage;
pub mod thresholds;
pub mod velocity;

pub use config::AppConfig;
pub use engine::{EngineStats, KeyId, KeybedEngine, UiInput};
pub use notemap::{NoteMap, TableNoteMap};
pub use queue::{EventDrainer, EventKind, EventProducer, EventQueue, MidiEvent, Transport};
pub use storage::{FileStore, MemoryStore, ThresholdStorage};
pub use thresholds::{Direction, KeyThresholds, Provenance, ThresholdStore, ThresholdTable};
pub use velocity::KeyState;
