// Key state machine - one step per fresh sample
//
// Idle -> Tracking -> Held -> Rearmed, all comparisons polarity-aware and
// guarded by consecutive-sample counters. The step function is free of I/O;
// it reports what happened and the engine turns that into queued events and
// calibration feedback.
//
// A re-strike from Rearmed integrates velocity from the valley: adc_start
// and t_start are taken from the rearm minimum, so a rapid partial-travel
// stroke is timed over its true physical distance.

use crate::config::AppConfig;
use crate::thresholds::KeyThresholds;
use crate::velocity::curve::map_speed_to_velocity;
use crate::velocity::state::{KeyRuntime, KeyState};

/// Outcome of processing one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    None,
    NoteOn { note: u8, velocity: u8 },
    /// Carries the stroke's peak reading for threshold adaptation
    NoteOff { note: u8, peak: u16 },
}

/// Advance one key's state machine with a fresh sample
///
/// `note` is the key's current mapping, resolved by the caller; `None`
/// (disabled) silently cancels the cycle at trigger time.
pub fn step(
    rt: &mut KeyRuntime,
    th: &KeyThresholds,
    cfg: &AppConfig,
    note: Option<u8>,
    raw: u16,
    t_us: u64,
) -> StepEvent {
    let dir = th.direction();
    let stable_count = cfg.machine.stable_count;

    match rt.state {
        KeyState::Idle => {
            if dir.press_delta(th.low, raw) > 0 {
                rt.stable_up = rt.stable_up.saturating_add(1);
                if rt.stable_up >= stable_count {
                    rt.state = KeyState::Tracking;
                    rt.adc_start = raw;
                    rt.t_start_us = t_us;
                    rt.peak = raw;
                    rt.stable_up = 0;
                    rt.stable_down = 0;
                }
            } else {
                rt.stable_up = 0;
            }
            StepEvent::None
        }

        KeyState::Tracking => {
            // A key stalled mid-travel must not occupy Tracking forever
            if t_us.saturating_sub(rt.t_start_us) > cfg.machine.tracking_timeout_us {
                rt.false_starts += 1;
                rt.reset();
                return StepEvent::None;
            }

            if dir.press_delta(th.low, raw) < 0 {
                // Fell back below low before reaching high
                rt.false_starts += 1;
                rt.reset();
                return StepEvent::None;
            }

            if dir.press_delta(th.high, raw) >= 0 {
                rt.stable_up = rt.stable_up.saturating_add(1);
                if rt.stable_up >= stable_count {
                    let Some(note) = note else {
                        // Disabled mapping cancels the cycle without an event
                        rt.reset();
                        return StepEvent::None;
                    };
                    let delta = dir.press_delta(rt.adc_start, raw).max(1) as u32;
                    let dt_us = t_us.saturating_sub(rt.t_start_us).max(1);
                    let velocity = map_speed_to_velocity(delta, dt_us, &cfg.velocity);
                    rt.state = KeyState::Held;
                    rt.current_note = note;
                    rt.current_velocity = velocity;
                    rt.peak = raw;
                    rt.stable_up = 0;
                    rt.total_triggers += 1;
                    return StepEvent::NoteOn { note, velocity };
                }
            } else {
                rt.stable_up = 0;
            }
            StepEvent::None
        }

        KeyState::Held => {
            if dir.press_delta(rt.peak, raw) > 0 {
                rt.peak = raw;
            }
            let release = th.release(&cfg.calibration);
            if dir.press_delta(release, raw) < 0 {
                rt.stable_down = rt.stable_down.saturating_add(1);
                if rt.stable_down >= stable_count {
                    rt.state = KeyState::Rearmed;
                    rt.rearm_min = raw;
                    rt.rearm_min_t_us = t_us;
                    rt.stable_down = 0;
                    rt.stable_up = 0;
                    return StepEvent::NoteOff {
                        note: rt.current_note,
                        peak: rt.peak,
                    };
                }
            } else {
                rt.stable_down = 0;
            }
            StepEvent::None
        }

        KeyState::Rearmed => {
            // Follow the valley while the key keeps moving away
            if dir.press_delta(rt.rearm_min, raw) < 0 {
                rt.rearm_min = raw;
                rt.rearm_min_t_us = t_us;
                rt.stable_up = 0;
            }

            // Full release: a fixed margin past low, opposite the press
            if dir.press_delta(th.low, raw) <= -(cfg.machine.full_release_margin as i32) {
                rt.reset();
                return StepEvent::None;
            }

            let rise = dir.press_delta(rt.rearm_min, raw);
            if rise >= cfg.machine.rearm_hysteresis as i32 {
                rt.stable_up = rt.stable_up.saturating_add(1);
                // The valley must have given back enough of the swing;
                // noise riding just under release never re-triggers
                let ceiling =
                    (1.0 - cfg.machine.min_return_fraction) * th.swing() as f32;
                let valley_ok =
                    dir.press_delta(th.low, rt.rearm_min) as f32 <= ceiling;
                if rt.stable_up >= stable_count && valley_ok {
                    rt.state = KeyState::Tracking;
                    rt.adc_start = rt.rearm_min;
                    rt.t_start_us = rt.rearm_min_t_us;
                    rt.peak = raw;
                    rt.stable_up = 0;
                }
            } else {
                rt.stable_up = 0;
            }
            StepEvent::None
        }
    }
}
