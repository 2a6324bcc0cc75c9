// Guided calibration procedure
//
// A two-phase operator workflow driven by one physical button:
//
// 1. Hold 3 s, release: every key's resting signal is histogrammed for one
//    second and its low threshold set from the median.
// 2. Press each key firmly, press the button again and hold 1 s: the
//    captured peaks become the high thresholds, and the table is persisted.
//
// Keys the operator never touched keep their previous high; the procedure
// must not silently degrade keys it learned nothing about. Releasing the
// button before a hold gate is met aborts, restoring the table exactly as
// it was.

use crate::calibration::histogram::Histogram;
use crate::config::CalibrationConfig;
use crate::engine::{KeyId, UiInput};
use crate::storage::ThresholdStorage;
use crate::thresholds::{KeyThresholds, ThresholdStore};
use serde::{Deserialize, Serialize};

/// Guided-procedure session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    /// Arm hold met; waiting for a clean release to start collecting
    ArmPending,
    CollectLow,
    CaptureHigh,
    /// Second press seen; waiting out the finish hold
    ArmFinish,
}

/// What the status indicator collaborator should show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationFeedback {
    Off,
    Collecting,
    Capturing,
}

/// Per-key peak capture during the second phase
#[derive(Debug, Clone, Copy, Default)]
struct CaptureSlot {
    /// Largest press-direction deviation from the learned low
    max_delta: u16,
}

/// The guided two-phase calibration FSM
#[derive(Debug)]
pub struct GuidedProcedure {
    state: SessionState,
    collect_until_ms: u64,
    /// Allocated on entering CollectLow, freed once medians are extracted;
    /// this is the core's only large buffer and it must not outlive the
    /// phase
    histograms: Option<Vec<Histogram>>,
    capture: Option<Vec<CaptureSlot>>,
    snapshot: Option<Vec<KeyThresholds>>,
    prev_button_down: bool,
}

impl GuidedProcedure {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            collect_until_ms: 0,
            histograms: None,
            capture: None,
            snapshot: None,
            prev_button_down: false,
        }
    }

    /// True while the procedure consumes the raw sample stream
    pub fn wants_samples(&self) -> bool {
        matches!(
            self.state,
            SessionState::CollectLow | SessionState::CaptureHigh
        )
    }

    pub fn feedback(&self) -> CalibrationFeedback {
        match self.state {
            SessionState::CollectLow => CalibrationFeedback::Collecting,
            SessionState::CaptureHigh | SessionState::ArmFinish => {
                CalibrationFeedback::Capturing
            }
            _ => CalibrationFeedback::Off,
        }
    }

    /// Feed one raw sample while collection or capture is active
    pub fn on_sample(&mut self, key: KeyId, raw: u16, store: &ThresholdStore) {
        match self.state {
            SessionState::CollectLow => {
                if let Some(hist) = self
                    .histograms
                    .as_mut()
                    .and_then(|h| h.get_mut(key.raw() as usize))
                {
                    hist.record(raw);
                }
            }
            SessionState::CaptureHigh => {
                let Some(th) = store.get(key) else {
                    return;
                };
                let Some(slot) = self
                    .capture
                    .as_mut()
                    .and_then(|c| c.get_mut(key.raw() as usize))
                else {
                    return;
                };
                let deviation = th.direction().press_delta(th.low, raw);
                if deviation > slot.max_delta as i32 {
                    slot.max_delta = deviation as u16;
                }
            }
            _ => {}
        }
    }

    /// Advance the procedure; called once per loop pass
    ///
    /// Returns true when a run was finalized and persisted, so the caller
    /// can reset its adaptation history.
    pub fn service(
        &mut self,
        now_ms: u64,
        ui: UiInput,
        store: &mut ThresholdStore,
        storage: &mut dyn ThresholdStorage,
        cfg: &CalibrationConfig,
        gamma: f32,
    ) -> bool {
        let pressed_edge = ui.is_down && !self.prev_button_down;
        self.prev_button_down = ui.is_down;
        let mut finalized = false;

        match self.state {
            SessionState::Idle => {
                if ui.is_down && ui.hold_elapsed_ms >= cfg.arm_hold_ms {
                    log::info!("[Calibration] armed; release to start collection");
                    self.state = SessionState::ArmPending;
                }
            }

            SessionState::ArmPending => {
                if !ui.is_down && ui.hold_elapsed_ms >= cfg.arm_release_ms {
                    self.enter_collect_low(now_ms, store, cfg);
                }
            }

            SessionState::CollectLow => {
                if now_ms >= self.collect_until_ms {
                    self.finish_collect_low(store, cfg);
                }
            }

            SessionState::CaptureHigh => {
                if pressed_edge {
                    self.state = SessionState::ArmFinish;
                }
            }

            SessionState::ArmFinish => {
                if ui.is_down {
                    if ui.hold_elapsed_ms >= cfg.finish_hold_ms {
                        self.finalize(store, storage, cfg, gamma);
                        finalized = true;
                    }
                } else {
                    // Released before the finish hold: abort the whole run
                    self.abort(store);
                }
            }
        }
        finalized
    }

    fn enter_collect_low(&mut self, now_ms: u64, store: &ThresholdStore, cfg: &CalibrationConfig) {
        let key_count = store.key_count() as usize;
        self.snapshot = Some(store.snapshot());
        self.histograms = Some(vec![Histogram::new(store.max_reading()); key_count]);
        self.collect_until_ms = now_ms + cfg.collect_window_ms as u64;
        self.state = SessionState::CollectLow;
        log::info!(
            "[Calibration] collecting rest levels for {} ms",
            cfg.collect_window_ms
        );
    }

    fn finish_collect_low(&mut self, store: &mut ThresholdStore, cfg: &CalibrationConfig) {
        // Extract medians, then free the histograms immediately: they are
        // by far the largest buffer in the core and must not persist into
        // normal operation
        if let Some(histograms) = self.histograms.take() {
            let mut learned = 0u32;
            for (idx, hist) in histograms.iter().enumerate() {
                let key = KeyId::new(idx as u16);
                let Some(median) = hist.median() else {
                    continue;
                };
                let Some(th) = store.get(key) else {
                    continue;
                };
                // The press side of the median is toward the current high
                let dir = crate::thresholds::Direction::of(median, th.high);
                let low = dir.advance(median, cfg.low_margin as i32, store.max_reading());
                store.set_low(key, low);
                learned += 1;
            }
            log::info!("[Calibration] learned rest level for {} keys", learned);
        }
        self.capture = Some(vec![CaptureSlot::default(); store.key_count() as usize]);
        self.state = SessionState::CaptureHigh;
    }

    fn finalize(
        &mut self,
        store: &mut ThresholdStore,
        storage: &mut dyn ThresholdStorage,
        cfg: &CalibrationConfig,
        gamma: f32,
    ) {
        let touch_gate = (cfg.touch_fraction * cfg.min_swing as f32) as i32;
        let mut touched_keys = 0u32;
        if let Some(capture) = self.capture.take() {
            for (idx, slot) in capture.iter().enumerate() {
                let key = KeyId::new(idx as u16);
                if (slot.max_delta as i32) < touch_gate {
                    // Never exercised during capture: leave high alone
                    continue;
                }
                let Some(th) = store.get(key).copied() else {
                    continue;
                };
                let dir = th.direction();
                touched_keys += 1;
                if slot.max_delta < cfg.min_swing {
                    // Too small to trust; fall back to the minimum valid
                    // swing instead of a noise-derived high
                    let fallback =
                        dir.advance(th.low, cfg.min_swing as i32, store.max_reading());
                    store.set_high(key, fallback);
                } else {
                    let margin = ((cfg.high_margin_pct * slot.max_delta as f32) as i32)
                        .max(cfg.high_margin_min as i32);
                    let peak_level =
                        dir.advance(th.low, slot.max_delta as i32, store.max_reading());
                    let high = dir.advance(peak_level, -margin, store.max_reading());
                    store.set_high(key, high);
                }
            }
        }
        storage.save(&store.to_table(gamma));
        self.snapshot = None;
        self.state = SessionState::Idle;
        log::info!(
            "[Calibration] finalized: {} keys captured, table persisted",
            touched_keys
        );
    }

    fn abort(&mut self, store: &mut ThresholdStore) {
        if let Some(snapshot) = self.snapshot.take() {
            store.restore(&snapshot);
        }
        self.histograms = None;
        self.capture = None;
        self.state = SessionState::Idle;
        log::info!("[Calibration] aborted; thresholds restored");
    }
}

impl Default for GuidedProcedure {
    fn default() -> Self {
        Self::new()
    }
}
