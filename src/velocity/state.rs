// Per-key runtime state
//
// One KeyRuntime per physical key, created at startup and never destroyed.
// Anything that ends a cycle abnormally resets the runtime to Idle; the
// diagnostic counters survive resets.

use serde::{Deserialize, Serialize};

/// Lifecycle of one key's stroke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyState {
    /// At rest, waiting for the low threshold
    Idle,
    /// Rising toward high, measuring velocity
    Tracking,
    /// Note active, waiting for release
    Held,
    /// Released but ready to re-trigger from the valley
    Rearmed,
}

impl KeyState {
    pub fn name(self) -> &'static str {
        match self {
            KeyState::Idle => "IDLE",
            KeyState::Tracking => "TRACK",
            KeyState::Held => "HELD",
            KeyState::Rearmed => "REARM",
        }
    }
}

/// Mutable per-key data owned exclusively by the state machine
#[derive(Debug, Clone)]
pub struct KeyRuntime {
    pub state: KeyState,

    // Velocity integration origin (low crossing, or the rearm valley)
    pub adc_start: u16,
    pub t_start_us: u64,

    /// Most extreme press-direction reading since tracking began
    pub peak: u16,

    // Valley tracking after release, for rapid re-strikes
    pub rearm_min: u16,
    pub rearm_min_t_us: u64,

    // Active note, needed to emit the matching note-off
    pub current_note: u8,
    pub current_velocity: u8,

    // Anti-bounce counters
    pub stable_up: u8,
    pub stable_down: u8,

    // Diagnostics; survive resets
    pub total_triggers: u32,
    pub false_starts: u32,
}

impl KeyRuntime {
    pub fn new() -> Self {
        Self {
            state: KeyState::Idle,
            adc_start: 0,
            t_start_us: 0,
            peak: 0,
            rearm_min: 0,
            rearm_min_t_us: 0,
            current_note: 0,
            current_velocity: 0,
            stable_up: 0,
            stable_down: 0,
            total_triggers: 0,
            false_starts: 0,
        }
    }

    /// Return to Idle, clearing everything but the diagnostic counters
    pub fn reset(&mut self) {
        self.state = KeyState::Idle;
        self.adc_start = 0;
        self.t_start_us = 0;
        self.peak = 0;
        self.rearm_min = 0;
        self.rearm_min_t_us = 0;
        self.current_note = 0;
        self.current_velocity = 0;
        self.stable_up = 0;
        self.stable_down = 0;
    }
}

impl Default for KeyRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_keeps_counters() {
        let mut rt = KeyRuntime::new();
        rt.state = KeyState::Held;
        rt.current_note = 60;
        rt.total_triggers = 7;
        rt.false_starts = 3;
        rt.reset();
        assert_eq!(rt.state, KeyState::Idle);
        assert_eq!(rt.current_note, 0);
        assert_eq!(rt.total_triggers, 7);
        assert_eq!(rt.false_starts, 3);
    }
}
