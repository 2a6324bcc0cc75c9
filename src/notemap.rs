// Note mapping seam
//
// The physical key-to-note layout lives outside the core; the state machine
// only asks "what note is this key right now", and a None answer disables
// the key. TableNoteMap is the reference implementation used by the CLI and
// tests: a flat table plus an octave-step transpose.

use crate::engine::KeyId;

/// Resolve a key to its current MIDI note; None means disabled
pub trait NoteMap {
    fn resolve(&self, key: KeyId) -> Option<u8>;
}

/// Table-driven mapping with transpose
#[derive(Debug, Clone)]
pub struct TableNoteMap {
    notes: Vec<Option<u8>>,
    /// Semitone offset, typically -12/0/+12 from a rocker switch
    transpose: i8,
}

impl TableNoteMap {
    /// Chromatic run starting at `base_note` (key 0 = base_note)
    pub fn linear(key_count: u16, base_note: u8) -> Self {
        let notes = (0..key_count)
            .map(|idx| {
                let note = base_note as u16 + idx;
                (note <= 127).then_some(note as u8)
            })
            .collect();
        Self {
            notes,
            transpose: 0,
        }
    }

    /// Explicit table, one entry per key
    pub fn from_table(notes: Vec<Option<u8>>) -> Self {
        Self {
            notes,
            transpose: 0,
        }
    }

    pub fn set_transpose(&mut self, transpose: i8) {
        self.transpose = transpose;
    }

    pub fn transpose(&self) -> i8 {
        self.transpose
    }

    /// Disable one key
    pub fn disable(&mut self, key: KeyId) {
        if let Some(slot) = self.notes.get_mut(key.raw() as usize) {
            *slot = None;
        }
    }
}

impl NoteMap for TableNoteMap {
    fn resolve(&self, key: KeyId) -> Option<u8> {
        let note = (*self.notes.get(key.raw() as usize)?)?;
        let shifted = note as i16 + self.transpose as i16;
        (0..=127).contains(&shifted).then_some(shifted as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_map() {
        let map = TableNoteMap::linear(16, 60);
        assert_eq!(map.resolve(KeyId::new(0)), Some(60));
        assert_eq!(map.resolve(KeyId::new(15)), Some(75));
        assert_eq!(map.resolve(KeyId::new(16)), None);
    }

    #[test]
    fn test_transpose_shifts_and_clamps() {
        let mut map = TableNoteMap::linear(4, 120);
        map.set_transpose(12);
        // 120 + 12 > 127: out of MIDI range resolves as disabled
        assert_eq!(map.resolve(KeyId::new(0)), None);
        map.set_transpose(-12);
        assert_eq!(map.resolve(KeyId::new(0)), Some(108));
    }

    #[test]
    fn test_disable_key() {
        let mut map = TableNoteMap::linear(4, 60);
        map.disable(KeyId::new(2));
        assert_eq!(map.resolve(KeyId::new(2)), None);
        assert_eq!(map.resolve(KeyId::new(1)), Some(61));
    }

    #[test]
    fn test_linear_map_past_midi_range_disables() {
        let map = TableNoteMap::linear(16, 120);
        assert_eq!(map.resolve(KeyId::new(7)), Some(127));
        assert_eq!(map.resolve(KeyId::new(8)), None);
    }
}
