//! Configuration management for dynamic parameter tuning
//!
//! This module provides runtime configuration loading from JSON files,
//! enabling tuning of the key state machine, velocity curve, and calibration
//! margins without recompilation. Every threshold margin the guided procedure
//! uses is exposed here rather than hardcoded.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub keys: KeyboardConfig,
    pub machine: MachineConfig,
    pub velocity: VelocityConfig,
    pub calibration: CalibrationConfig,
    pub queue: QueueConfig,
}

/// Keyboard geometry and sensor scale
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyboardConfig {
    /// Number of scanned keys (groups x sensors per group)
    pub key_count: u16,
    /// Full-scale ADC reading (10-bit sensors: 1023)
    pub max_reading: u16,
    /// MIDI channel for emitted events (1-16)
    pub midi_channel: u8,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            key_count: 64,
            max_reading: 1023,
            midi_channel: 1,
        }
    }
}

/// Per-key state machine timing and hysteresis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Consecutive samples required before a threshold crossing is trusted
    pub stable_count: u8,
    /// Abort Tracking if the high threshold is not reached within this time
    pub tracking_timeout_us: u64,
    /// Rearmed returns to Idle once the reading is this far past low,
    /// opposite the press direction
    pub full_release_margin: u16,
    /// Rise above the rearm valley required to accept a re-strike
    pub rearm_hysteresis: u16,
    /// Fraction of the low-to-high swing the valley must give back
    /// before a re-strike is accepted
    pub min_return_fraction: f32,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            stable_count: 2,
            tracking_timeout_us: 500_000,
            full_release_margin: 10,
            rearm_hysteresis: 8,
            min_return_fraction: 0.25,
        }
    }
}

/// Speed-to-velocity mapping parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityConfig {
    /// Speed mapped to velocity 1, in ADC counts per second
    pub speed_min: f32,
    /// Speed mapped to velocity 127, in ADC counts per second
    pub speed_max: f32,
    /// Curve exponent applied to the normalized speed; 1.0 is linear,
    /// below 1.0 lifts slow strokes
    pub gamma: f32,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            // Empirical range from the 10-bit sensor prototypes:
            // 0.001..0.05 counts/us expressed per second
            speed_min: 1_000.0,
            speed_max: 50_000.0,
            gamma: 1.0,
        }
    }
}

/// Threshold defaults, margins, and guided-procedure gates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Low threshold for keys that have never been calibrated
    pub default_low: u16,
    /// High threshold for keys that have never been calibrated
    pub default_high: u16,
    /// Minimum |high - low| for a key to be considered playable
    pub min_swing: u16,
    /// Release backoff floor, in ADC counts below high
    pub release_margin_min: u16,
    /// Release backoff as a fraction of the swing
    pub release_pct: f32,
    /// Button hold required to arm the guided procedure (ms)
    pub arm_hold_ms: u32,
    /// Button must be released this long before collection starts (ms)
    pub arm_release_ms: u32,
    /// Button hold required to finalize the guided procedure (ms)
    pub finish_hold_ms: u32,
    /// Duration of the rest-level collection window (ms)
    pub collect_window_ms: u32,
    /// Low is placed this far past the learned median, in the press direction
    pub low_margin: u16,
    /// Peak pull-back floor when deriving high, in ADC counts
    pub high_margin_min: u16,
    /// Peak pull-back as a fraction of the swing
    pub high_margin_pct: f32,
    /// Fraction of min_swing a key must travel during capture to count
    /// as touched
    pub touch_fraction: f32,
    /// EMA blend factor for the first notes after calibration
    pub ema_fast: f32,
    /// EMA blend factor once a key has settled
    pub ema_slow: f32,
    /// Number of notes blended at the fast factor
    pub fast_note_count: u8,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            default_low: 745,
            default_high: 915,
            min_swing: 30,
            release_margin_min: 10,
            release_pct: 0.10,
            arm_hold_ms: 3000,
            arm_release_ms: 200,
            finish_hold_ms: 1000,
            collect_window_ms: 1000,
            low_margin: 10,
            high_margin_min: 10,
            high_margin_pct: 0.10,
            touch_fraction: 0.5,
            ema_fast: 0.5,
            ema_slow: 0.1,
            fast_note_count: 4,
        }
    }
}

/// Outgoing event queue sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Capacity of the event ring buffer
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 128 }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            keys: KeyboardConfig::default(),
            machine: MachineConfig::default(),
            velocity: VelocityConfig::default(),
            calibration: CalibrationConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    ///
    /// Returns the default configuration if the file is missing or invalid;
    /// a bad config file must never keep the scanner from starting.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }
}
