// Velocity module - per-key state machines and the velocity law
//
// Consumes raw samples plus current thresholds, emits note events with a
// measured onset speed, and reports stroke peaks back to calibration.

pub mod curve;
pub mod machine;
pub mod state;

pub use curve::map_speed_to_velocity;
pub use machine::{step, StepEvent};
pub use state::{KeyRuntime, KeyState};
