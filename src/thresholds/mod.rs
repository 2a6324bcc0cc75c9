// Threshold store - per-key low/high boundaries with polarity awareness
//
// One component owns every mutable threshold. The state machine reads it on
// each sample, the calibration engine is its only writer, and both run on the
// same cooperative scanning context, so no reader can observe a half-written
// entry.
//
// Sensors may be wired either way round: pressing can raise or lower the
// reading. All comparisons go through Direction so the rest of the crate
// never does sign arithmetic on raw ADC values.

use serde::{Deserialize, Serialize};

use crate::config::CalibrationConfig;
use crate::engine::KeyId;

/// Polarity of a key: which way the reading moves when the key is pressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Pressing raises the reading
    Rising,
    /// Pressing lowers the reading
    Falling,
}

impl Direction {
    /// Derive the press direction from the ordered low/high pair
    pub fn of(low: u16, high: u16) -> Self {
        if high >= low {
            Direction::Rising
        } else {
            Direction::Falling
        }
    }

    /// Signed distance from `from` to `to`, positive toward the press
    /// direction
    pub fn press_delta(self, from: u16, to: u16) -> i32 {
        match self {
            Direction::Rising => to as i32 - from as i32,
            Direction::Falling => from as i32 - to as i32,
        }
    }

    /// Move `level` by `amount` toward the press direction (negative
    /// amounts move away), clamped to the ADC range
    pub fn advance(self, level: u16, amount: i32, max_reading: u16) -> u16 {
        let raw = match self {
            Direction::Rising => level as i32 + amount,
            Direction::Falling => level as i32 - amount,
        };
        raw.clamp(0, max_reading as i32) as u16
    }
}

/// Who last wrote a key's thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    /// Learned by calibration; adaptation keeps refining it
    Auto,
    /// Operator override; adaptation is suppressed
    Manual,
}

/// The three analog boundaries governing one key
///
/// `release` is always derived from low/high, never stored, so it can never
/// drift out of the (low, high) interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyThresholds {
    pub low: u16,
    pub high: u16,
    pub provenance: Provenance,
}

impl KeyThresholds {
    pub fn direction(&self) -> Direction {
        Direction::of(self.low, self.high)
    }

    /// Dynamic range of the key's travel
    pub fn swing(&self) -> u16 {
        self.low.abs_diff(self.high)
    }

    /// Level below which a held note is released: high pulled back toward
    /// low by max(release_margin_min, release_pct * swing)
    pub fn release(&self, cfg: &CalibrationConfig) -> u16 {
        let dir = self.direction();
        let backoff = (cfg.release_pct * self.swing() as f32) as i32;
        let backoff = backoff.max(cfg.release_margin_min as i32);
        // Keep release strictly past low even on degenerate swings
        let release = dir.advance(self.high, -backoff, u16::MAX);
        if dir.press_delta(self.low, release) < 1 {
            dir.advance(self.low, 1, u16::MAX)
        } else {
            release
        }
    }
}

/// Persisted form of the threshold table
///
/// Per-key low/high plus the global velocity-curve exponent. Provenance is
/// runtime-only; everything loaded is Auto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable {
    pub lows: Vec<u16>,
    pub highs: Vec<u16>,
    pub gamma: f32,
}

/// KeyId-indexed owner of all threshold state
#[derive(Debug, Clone)]
pub struct ThresholdStore {
    keys: Vec<KeyThresholds>,
    max_reading: u16,
    min_swing: u16,
}

impl ThresholdStore {
    /// Create a store with every key at the built-in defaults
    pub fn new(key_count: u16, cfg: &CalibrationConfig, max_reading: u16) -> Self {
        let defaults = KeyThresholds {
            low: cfg.default_low.min(max_reading),
            high: cfg.default_high.min(max_reading),
            provenance: Provenance::Auto,
        };
        Self {
            keys: vec![defaults; key_count as usize],
            max_reading,
            min_swing: cfg.min_swing,
        }
    }

    pub fn key_count(&self) -> u16 {
        self.keys.len() as u16
    }

    pub fn max_reading(&self) -> u16 {
        self.max_reading
    }

    pub fn min_swing(&self) -> u16 {
        self.min_swing
    }

    pub fn get(&self, key: KeyId) -> Option<&KeyThresholds> {
        self.keys.get(key.raw() as usize)
    }

    /// Set a learned low and keep the key playable: if the remaining swing
    /// is under the minimum, high is pushed out to restore it
    pub fn set_low(&mut self, key: KeyId, low: u16) {
        let (max_reading, min_swing) = (self.max_reading, self.min_swing);
        let Some(entry) = self.keys.get_mut(key.raw() as usize) else {
            return;
        };
        if entry.provenance == Provenance::Manual {
            return;
        }
        entry.low = low.min(max_reading);
        // Polarity is re-derived against the surviving high, as the learned
        // rest level may sit on either side of it
        let dir = entry.direction();
        if dir.press_delta(entry.low, entry.high) < min_swing as i32 {
            entry.high = dir.advance(entry.low, min_swing as i32, max_reading);
        }
    }

    /// Set a learned high, clamped so the swing never shrinks below the
    /// minimum
    pub fn set_high(&mut self, key: KeyId, high: u16) {
        let (max_reading, min_swing) = (self.max_reading, self.min_swing);
        let Some(entry) = self.keys.get_mut(key.raw() as usize) else {
            return;
        };
        if entry.provenance == Provenance::Manual {
            return;
        }
        let dir = entry.direction();
        let floor = dir.advance(entry.low, min_swing as i32, max_reading);
        entry.high = if dir.press_delta(floor, high.min(max_reading)) < 0 {
            floor
        } else {
            high.min(max_reading)
        };
    }

    /// Operator override: clamp into the ADC range, force the minimum
    /// swing, and freeze the key against learned updates
    pub fn set_manual(&mut self, key: KeyId, low: u16, high: u16) {
        let (max_reading, min_swing) = (self.max_reading, self.min_swing);
        let Some(entry) = self.keys.get_mut(key.raw() as usize) else {
            return;
        };
        let low = low.min(max_reading);
        let high = high.min(max_reading);
        let dir = Direction::of(low, high);
        let high = if dir.press_delta(low, high) < min_swing as i32 {
            dir.advance(low, min_swing as i32, max_reading)
        } else {
            high
        };
        *entry = KeyThresholds {
            low,
            high,
            provenance: Provenance::Manual,
        };
    }

    /// Return the key to learned control without touching its levels
    pub fn clear_manual(&mut self, key: KeyId) {
        if let Some(entry) = self.keys.get_mut(key.raw() as usize) {
            entry.provenance = Provenance::Auto;
        }
    }

    /// Copy of every entry, provenance included; used by the guided
    /// procedure so an aborted run can put everything back
    pub fn snapshot(&self) -> Vec<KeyThresholds> {
        self.keys.clone()
    }

    /// Restore a snapshot taken from this store
    pub fn restore(&mut self, snapshot: &[KeyThresholds]) -> bool {
        if snapshot.len() != self.keys.len() {
            return false;
        }
        self.keys.copy_from_slice(snapshot);
        true
    }

    /// Snapshot the store into its persisted form
    pub fn to_table(&self, gamma: f32) -> ThresholdTable {
        ThresholdTable {
            lows: self.keys.iter().map(|k| k.low).collect(),
            highs: self.keys.iter().map(|k| k.high).collect(),
            gamma,
        }
    }

    /// Replace every key from a persisted table; rejects tables whose shape
    /// does not match this keyboard
    pub fn apply_table(&mut self, table: &ThresholdTable) -> bool {
        if table.lows.len() != self.keys.len() || table.highs.len() != self.keys.len() {
            log::warn!(
                "[Thresholds] table shape {}x{} does not match {} keys",
                table.lows.len(),
                table.highs.len(),
                self.keys.len()
            );
            return false;
        }
        for (entry, (&low, &high)) in self
            .keys
            .iter_mut()
            .zip(table.lows.iter().zip(table.highs.iter()))
        {
            entry.low = low.min(self.max_reading);
            entry.high = high.min(self.max_reading);
            entry.provenance = Provenance::Auto;
        }
        true
    }
}
