// Calibration module - threshold learning, guided and continuous
//
// Two cooperating mechanisms share the threshold store: the guided
// two-phase procedure (operator-driven, persists on finalize) and the
// always-on per-note adaptation of the high threshold. Both run on the
// scanning context; the store never sees concurrent writers.

pub mod adaptive;
pub mod histogram;
pub mod procedure;

pub use adaptive::AdaptiveState;
pub use histogram::Histogram;
pub use procedure::{CalibrationFeedback, GuidedProcedure};

use crate::config::CalibrationConfig;
use crate::engine::{KeyId, UiInput};
use crate::storage::ThresholdStorage;
use crate::thresholds::ThresholdStore;

/// Facade over both calibration mechanisms
#[derive(Debug)]
pub struct CalibrationEngine {
    cfg: CalibrationConfig,
    adaptive: AdaptiveState,
    procedure: GuidedProcedure,
}

impl CalibrationEngine {
    pub fn new(cfg: CalibrationConfig, key_count: u16) -> Self {
        Self {
            cfg,
            adaptive: AdaptiveState::new(key_count),
            procedure: GuidedProcedure::new(),
        }
    }

    /// Advance the guided procedure; called once per loop pass
    pub fn service(
        &mut self,
        now_ms: u64,
        ui: UiInput,
        store: &mut ThresholdStore,
        storage: &mut dyn ThresholdStorage,
        gamma: f32,
    ) {
        let finalized = self
            .procedure
            .service(now_ms, ui, store, storage, &self.cfg, gamma);
        if finalized {
            // Freshly calibrated keys converge at the fast blend again
            self.adaptive.reset();
        }
    }

    /// True while the guided procedure consumes the raw sample stream
    pub fn wants_samples(&self) -> bool {
        self.procedure.wants_samples()
    }

    /// Feed one raw sample to the guided procedure
    pub fn on_guided_sample(&mut self, key: KeyId, raw: u16, store: &ThresholdStore) {
        self.procedure.on_sample(key, raw, store);
    }

    /// Blend a completed stroke's peak into the key's high threshold
    pub fn update_high_after_note(&mut self, key: KeyId, peak: u16, store: &mut ThresholdStore) {
        self.adaptive
            .update_high_after_note(key, peak, store, &self.cfg);
    }

    pub fn feedback(&self) -> CalibrationFeedback {
        self.procedure.feedback()
    }
}
