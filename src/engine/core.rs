//! KeybedEngine: scanning-context orchestration layer.
//!
//! Owns the threshold store, one runtime per key, the calibration engine,
//! and the producer side of the event queue, and wires them together behind
//! the two entry points the scan loop calls: `process_sample` once per
//! fresh sample and `service` once per loop pass. Everything here runs on
//! the same cooperative context, so no locking is needed among the parts.

use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationEngine, CalibrationFeedback};
use crate::config::AppConfig;
use crate::engine::{KeyId, UiInput};
use crate::notemap::NoteMap;
use crate::queue::{EventProducer, MidiEvent};
use crate::storage::ThresholdStorage;
use crate::thresholds::{KeyThresholds, ThresholdStore};
use crate::velocity::{step, KeyRuntime, KeyState, StepEvent};

/// Per-key diagnostic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStats {
    pub total_triggers: u32,
    pub false_starts: u32,
}

/// Global event accounting
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EngineStats {
    pub notes_on: u64,
    pub notes_off: u64,
    /// Events rejected by a full queue; the queue never blocks the scanner
    pub dropped_events: u64,
}

/// The sensing-to-event core: samples in, note events out
pub struct KeybedEngine {
    config: AppConfig,
    store: ThresholdStore,
    runtimes: Vec<KeyRuntime>,
    calibration: CalibrationEngine,
    producer: EventProducer,
    note_map: Box<dyn NoteMap>,
    storage: Box<dyn ThresholdStorage>,
    stats: EngineStats,
}

impl KeybedEngine {
    /// Build the engine and restore persisted thresholds
    ///
    /// A missing or corrupt table falls back to the configured defaults;
    /// startup never fails.
    pub fn new(
        mut config: AppConfig,
        note_map: Box<dyn NoteMap>,
        mut storage: Box<dyn ThresholdStorage>,
        producer: EventProducer,
    ) -> Self {
        let key_count = config.keys.key_count;
        let mut store =
            ThresholdStore::new(key_count, &config.calibration, config.keys.max_reading);

        match storage.load() {
            Some(table) => {
                if store.apply_table(&table) {
                    config.velocity.gamma = table.gamma;
                    log::info!(
                        "[Engine] restored thresholds for {} keys (gamma {})",
                        key_count,
                        table.gamma
                    );
                } else {
                    log::warn!(
                        "[Engine] stored table does not fit this keyboard; using defaults"
                    );
                }
            }
            None => {
                log::info!("[Engine] no stored thresholds; using defaults");
            }
        }

        let calibration = CalibrationEngine::new(config.calibration.clone(), key_count);
        Self {
            config,
            store,
            runtimes: vec![KeyRuntime::new(); key_count as usize],
            calibration,
            producer,
            note_map,
            storage,
            stats: EngineStats::default(),
        }
    }

    /// The sole hot-path entry point: one fresh sample for one key
    ///
    /// Timestamps must be monotonic per key. Out-of-range keys are ignored.
    pub fn process_sample(&mut self, key: KeyId, raw: u16, timestamp_us: u64) {
        let idx = key.raw() as usize;
        let Some(th) = self.store.get(key).copied() else {
            return;
        };
        let raw = raw.min(self.store.max_reading());

        // The guided procedure taps the same stream the state machine
        // consumes; collection never pauses note processing
        if self.calibration.wants_samples() {
            self.calibration.on_guided_sample(key, raw, &self.store);
        }

        let note = self.note_map.resolve(key);
        let rt = &mut self.runtimes[idx];
        let state_before = rt.state;
        let event = step(rt, &th, &self.config, note, raw, timestamp_us);
        let state_after = rt.state;

        if state_before != state_after {
            log::trace!(
                "[Engine] key {} {} -> {} (adc {})",
                key.raw(),
                state_before.name(),
                state_after.name(),
                raw
            );
        }

        match event {
            StepEvent::None => {}
            StepEvent::NoteOn { note, velocity } => {
                self.stats.notes_on += 1;
                self.emit(MidiEvent::note_on(self.config.keys.midi_channel, note, velocity));
            }
            StepEvent::NoteOff { note, peak } => {
                self.stats.notes_off += 1;
                self.emit(MidiEvent::note_off(self.config.keys.midi_channel, note));
                self.calibration
                    .update_high_after_note(key, peak, &mut self.store);
            }
        }
    }

    /// Advance the calibration procedure; called once per loop pass
    pub fn service(&mut self, now_ms: u64, ui: UiInput) {
        self.calibration.service(
            now_ms,
            ui,
            &mut self.store,
            self.storage.as_mut(),
            self.config.velocity.gamma,
        );
    }

    fn emit(&mut self, event: MidiEvent) {
        if !self.producer.enqueue(event) {
            self.stats.dropped_events += 1;
            log::debug!("[Engine] queue full; dropped {:?}", event.kind);
        }
    }

    // ------------------------------------------------------------------
    // Operator controls and observability
    // ------------------------------------------------------------------

    /// Operator threshold override for one key
    pub fn set_manual_thresholds(&mut self, key: KeyId, low: u16, high: u16) {
        self.store.set_manual(key, low, high);
    }

    /// Return a key to learned thresholds
    pub fn clear_manual_thresholds(&mut self, key: KeyId) {
        self.store.clear_manual(key);
    }

    /// Adjust the velocity curve; persisted at the next calibration save
    pub fn set_gamma(&mut self, gamma: f32) {
        self.config.velocity.gamma = gamma.max(0.0);
    }

    pub fn gamma(&self) -> f32 {
        self.config.velocity.gamma
    }

    pub fn key_state(&self, key: KeyId) -> Option<KeyState> {
        self.runtimes.get(key.raw() as usize).map(|rt| rt.state)
    }

    pub fn key_stats(&self, key: KeyId) -> Option<KeyStats> {
        self.runtimes.get(key.raw() as usize).map(|rt| KeyStats {
            total_triggers: rt.total_triggers,
            false_starts: rt.false_starts,
        })
    }

    pub fn thresholds(&self, key: KeyId) -> Option<KeyThresholds> {
        self.store.get(key).copied()
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// What the status indicator collaborator should display
    pub fn calibration_feedback(&self) -> CalibrationFeedback {
        self.calibration.feedback()
    }
}
