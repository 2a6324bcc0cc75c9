//! Engine module housing the scanning coordinator.
//!
//! This module exposes the `KeybedEngine` orchestration layer (`core`) plus
//! the identity and UI-input types shared with collaborators: the sample
//! source addresses keys by `KeyId`, and the debounced front-panel button
//! arrives as a `UiInput` once per loop pass.

use serde::{Deserialize, Serialize};

pub mod core;

pub use core::{EngineStats, KeyStats, KeybedEngine};

/// Sensors per scan group (16-channel multiplexers)
pub const KEYS_PER_GROUP: u16 = 16;

/// Identity of one physical key
///
/// Opaque to collaborators; internally a flat index equivalent to a
/// (group, channel) pair on the scan matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(u16);

impl KeyId {
    pub const fn new(raw: u16) -> Self {
        KeyId(raw)
    }

    /// Build a KeyId from a multiplexer group and its channel index
    pub fn from_parts(group: u8, channel: u8) -> Self {
        KeyId(group as u16 * KEYS_PER_GROUP + channel as u16)
    }

    pub fn raw(self) -> u16 {
        self.0
    }

    pub fn group(self) -> u8 {
        (self.0 / KEYS_PER_GROUP) as u8
    }

    pub fn channel(self) -> u8 {
        (self.0 % KEYS_PER_GROUP) as u8
    }
}

/// Debounced front-panel button state, polled once per loop pass
///
/// `hold_elapsed_ms` is how long the button has been in its current
/// position (down or up); the debouncing input layer owns that bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UiInput {
    pub is_down: bool,
    pub hold_elapsed_ms: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_id_parts() {
        let key = KeyId::from_parts(2, 5);
        assert_eq!(key.raw(), 37);
        assert_eq!(key.group(), 2);
        assert_eq!(key.channel(), 5);
    }
}
