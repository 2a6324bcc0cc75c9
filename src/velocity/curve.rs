// Speed-to-velocity mapping
//
// Onset speed in ADC counts per second is normalized against the configured
// min/max range, optionally reshaped by a gamma exponent, and mapped into
// the MIDI velocity range 1..=127.

use crate::config::VelocityConfig;

/// Map an onset measurement to a MIDI velocity
///
/// `delta_adc` is the press-direction distance covered and `dt_us` the time
/// it took. The degenerate zero-distance/zero-time cases mean the stroke was
/// faster than the scanner could resolve and map to the maximum velocity.
pub fn map_speed_to_velocity(delta_adc: u32, dt_us: u64, cfg: &VelocityConfig) -> u8 {
    if delta_adc == 0 || dt_us == 0 {
        return 127;
    }
    let speed = delta_adc as f32 * 1_000_000.0 / dt_us as f32;
    let mut norm = (speed - cfg.speed_min) / (cfg.speed_max - cfg.speed_min);
    norm = norm.clamp(0.0, 1.0);
    if cfg.gamma != 1.0 {
        norm = norm.powf(cfg.gamma);
    }
    1 + (norm * 126.0) as u8
}
