// Continuous threshold adaptation
//
// After every completed note the stroke's peak is blended into the key's
// high threshold, so a key whose mechanics drift over years of play keeps
// triggering at a sensible point in its travel. The first few notes after a
// calibration blend fast to converge; after that a slow factor resists
// noise. Grazing touches that never develop a full swing are discarded.

use crate::config::CalibrationConfig;
use crate::engine::KeyId;
use crate::thresholds::{Provenance, ThresholdStore};

/// Per-key adaptation bookkeeping
#[derive(Debug)]
pub struct AdaptiveState {
    /// Notes seen since the key was last calibrated; selects the blend rate
    note_counts: Vec<u8>,
}

impl AdaptiveState {
    pub fn new(key_count: u16) -> Self {
        Self {
            note_counts: vec![0; key_count as usize],
        }
    }

    /// Forget the note history, returning every key to the fast blend;
    /// called when the guided procedure finalizes
    pub fn reset(&mut self) {
        self.note_counts.fill(0);
    }

    /// Blend a completed stroke's peak into the key's high threshold
    pub fn update_high_after_note(
        &mut self,
        key: KeyId,
        peak: u16,
        store: &mut ThresholdStore,
        cfg: &CalibrationConfig,
    ) {
        let Some(count) = self.note_counts.get(key.raw() as usize).copied() else {
            return;
        };
        let Some(th) = store.get(key).copied() else {
            return;
        };
        if th.provenance == Provenance::Manual {
            return;
        }

        let dir = th.direction();
        let stroke = dir.press_delta(th.low, peak);
        if stroke < cfg.min_swing as i32 {
            // Grazing touch, not a full stroke; no information about high
            return;
        }

        let margin = ((cfg.high_margin_pct * th.swing() as f32) as i32)
            .max(cfg.high_margin_min as i32);
        let target = dir.advance(peak, -margin, store.max_reading());

        let alpha = if count < cfg.fast_note_count {
            cfg.ema_fast
        } else {
            cfg.ema_slow
        };
        let blended = th.high as f32 + alpha * (target as f32 - th.high as f32);
        store.set_high(key, blended.round() as u16);

        self.note_counts[key.raw() as usize] = count.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CalibrationConfig;

    fn setup() -> (AdaptiveState, ThresholdStore, CalibrationConfig) {
        let cfg = CalibrationConfig::default();
        let store = ThresholdStore::new(4, &cfg, 1023);
        (AdaptiveState::new(4), store, cfg)
    }

    #[test]
    fn test_converges_toward_peak_minus_margin() {
        let (mut adaptive, mut store, cfg) = setup();
        let key = KeyId::new(0);
        // Repeated strokes peaking at 980; target settles near
        // 980 - margin(~17)
        for _ in 0..40 {
            adaptive.update_high_after_note(key, 980, &mut store, &cfg);
        }
        let high = store.get(key).unwrap().high;
        assert!(
            (955..=968).contains(&high),
            "high should settle near the pulled-back peak, got {}",
            high
        );
    }

    #[test]
    fn test_first_notes_blend_faster() {
        let (mut adaptive, mut store, cfg) = setup();
        let key = KeyId::new(0);
        let start = store.get(key).unwrap().high;
        adaptive.update_high_after_note(key, 990, &mut store, &cfg);
        let after_fast = store.get(key).unwrap().high;
        let fast_step = after_fast.abs_diff(start);

        // Burn through the fast window, then measure a slow step from a
        // deliberately displaced equilibrium
        for _ in 0..10 {
            adaptive.update_high_after_note(key, 990, &mut store, &cfg);
        }
        let before_slow = store.get(key).unwrap().high;
        adaptive.update_high_after_note(key, 850, &mut store, &cfg);
        let slow_step = store.get(key).unwrap().high.abs_diff(before_slow);

        assert!(
            fast_step > slow_step,
            "fast step {} should exceed slow step {}",
            fast_step,
            slow_step
        );
    }

    #[test]
    fn test_grazing_touch_discarded() {
        let (mut adaptive, mut store, cfg) = setup();
        let key = KeyId::new(1);
        let before = store.get(key).unwrap().high;
        // Peak barely above low: closer than min_swing
        let peak = store.get(key).unwrap().low + cfg.min_swing - 1;
        adaptive.update_high_after_note(key, peak, &mut store, &cfg);
        assert_eq!(store.get(key).unwrap().high, before);
    }

    #[test]
    fn test_manual_key_untouched() {
        let (mut adaptive, mut store, cfg) = setup();
        let key = KeyId::new(2);
        store.set_manual(key, 700, 900);
        adaptive.update_high_after_note(key, 1000, &mut store, &cfg);
        assert_eq!(store.get(key).unwrap().high, 900);
    }

    #[test]
    fn test_release_invariant_after_updates() {
        let (mut adaptive, mut store, cfg) = setup();
        let key = KeyId::new(0);
        for peak in [990, 800, 960, 1010, 850] {
            adaptive.update_high_after_note(key, peak, &mut store, &cfg);
            let th = store.get(key).unwrap();
            let release = th.release(&cfg);
            let dir = th.direction();
            assert!(dir.press_delta(th.low, release) > 0);
            assert!(dir.press_delta(release, th.high) > 0);
        }
    }

    #[test]
    fn test_out_of_range_key_ignored() {
        let (mut adaptive, mut store, cfg) = setup();
        adaptive.update_high_after_note(KeyId::new(99), 1000, &mut store, &cfg);
    }

    #[test]
    fn test_reset_restores_fast_blend() {
        let (mut adaptive, mut store, cfg) = setup();
        let key = KeyId::new(0);
        for _ in 0..10 {
            adaptive.update_high_after_note(key, 980, &mut store, &cfg);
        }
        adaptive.reset();
        // Displace equilibrium and verify the next step is fast again
        let before = store.get(key).unwrap().high;
        adaptive.update_high_after_note(key, 850, &mut store, &cfg);
        let step = store.get(key).unwrap().high.abs_diff(before);
        // Fast alpha is 0.5; the step toward the new target must be large
        assert!(step > 20, "expected a fast step, got {}", step);
    }
}
