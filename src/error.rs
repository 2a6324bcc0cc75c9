// Storage error types
//
// The scanning core itself has no fatal errors: sensor noise is absorbed by
// hysteresis, bad key ids are ignored, and a full queue is a bool. The only
// operations that can genuinely fail are loading and saving the persisted
// threshold table, and those failures are recovered by falling back to
// built-in defaults.

use std::fmt;

/// Errors detected while loading or saving the persisted threshold table
#[derive(Debug)]
pub enum StorageError {
    /// Underlying I/O failure
    Io(std::io::Error),
    /// The blob does not carry the expected structural signature
    Signature { found: String },
    /// The blob was written by an incompatible layout version
    Version { found: u32, expected: u32 },
    /// The payload checksum does not match the recorded one
    Checksum { stored: u32, computed: u32 },
    /// The blob is not parseable at all
    Malformed(serde_json::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(err) => write!(f, "storage I/O error: {}", err),
            StorageError::Signature { found } => {
                write!(f, "bad storage signature: {:?}", found)
            }
            StorageError::Version { found, expected } => {
                write!(f, "storage version {} (expected {})", found, expected)
            }
            StorageError::Checksum { stored, computed } => {
                write!(
                    f,
                    "storage checksum mismatch: stored {:08x}, computed {:08x}",
                    stored, computed
                )
            }
            StorageError::Malformed(err) => write!(f, "malformed storage blob: {}", err),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(err) => Some(err),
            StorageError::Malformed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Malformed(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = StorageError::Checksum {
            stored: 0xdeadbeef,
            computed: 0x12345678,
        };
        let text = format!("{}", err);
        assert!(text.contains("deadbeef"));
        assert!(text.contains("12345678"));

        let err = StorageError::Version {
            found: 3,
            expected: 1,
        };
        assert!(format!("{}", err).contains("version 3"));
    }

    #[test]
    fn test_io_source_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = StorageError::from(io);
        assert!(std::error::Error::source(&err).is_some());
    }
}
