// Threshold persistence
//
// The core only requires load()/save() with integrity checking; the medium
// behind it is the storage collaborator's business. FileStore keeps the
// table in a JSON envelope carrying a structural signature, a layout
// version, and a CRC32 over the serialized table. A blob failing any of the
// three checks is rejected whole: callers fall back to built-in defaults
// rather than trusting partial data.
//
// load() and save() run at startup and at the end of the guided procedure
// only, never on the per-sample path.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::thresholds::ThresholdTable;

const SIGNATURE: &str = "keybed-thresholds";
const VERSION: u32 = 1;

/// Durable home of the threshold table
pub trait ThresholdStorage {
    /// Some only if the signature, version, and checksum all validate
    fn load(&mut self) -> Option<ThresholdTable>;
    /// Persist the table; failures are logged, never propagated
    fn save(&mut self, table: &ThresholdTable);
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    signature: String,
    version: u32,
    checksum: u32,
    table: ThresholdTable,
}

/// CRC32 (IEEE, reflected) over the serialized table payload
fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in bytes {
        crc ^= byte as u32;
        for _ in 0..8 {
            crc = (crc >> 1) ^ (0xEDB8_8320 & 0u32.wrapping_sub(crc & 1));
        }
    }
    !crc
}

fn table_checksum(table: &ThresholdTable) -> Result<u32, StorageError> {
    let payload = serde_json::to_vec(table)?;
    Ok(crc32(&payload))
}

/// File-backed store: one JSON blob per keyboard
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn try_load(&self) -> Result<ThresholdTable, StorageError> {
        let contents = fs::read_to_string(&self.path)?;
        let envelope: Envelope = serde_json::from_str(&contents)?;
        if envelope.signature != SIGNATURE {
            return Err(StorageError::Signature {
                found: envelope.signature,
            });
        }
        if envelope.version != VERSION {
            return Err(StorageError::Version {
                found: envelope.version,
                expected: VERSION,
            });
        }
        let computed = table_checksum(&envelope.table)?;
        if computed != envelope.checksum {
            return Err(StorageError::Checksum {
                stored: envelope.checksum,
                computed,
            });
        }
        Ok(envelope.table)
    }

    fn try_save(&self, table: &ThresholdTable) -> Result<(), StorageError> {
        let envelope = Envelope {
            signature: SIGNATURE.to_string(),
            version: VERSION,
            checksum: table_checksum(table)?,
            table: table.clone(),
        };
        let json = serde_json::to_string_pretty(&envelope)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

impl ThresholdStorage for FileStore {
    fn load(&mut self) -> Option<ThresholdTable> {
        match self.try_load() {
            Ok(table) => {
                log::info!(
                    "[Storage] loaded thresholds for {} keys from {:?}",
                    table.lows.len(),
                    self.path
                );
                Some(table)
            }
            Err(err) => {
                log::warn!(
                    "[Storage] load from {:?} failed ({}); using defaults",
                    self.path,
                    err
                );
                None
            }
        }
    }

    fn save(&mut self, table: &ThresholdTable) {
        match self.try_save(table) {
            Ok(()) => {
                log::info!("[Storage] saved thresholds to {:?}", self.path);
            }
            Err(err) => {
                log::error!("[Storage] save to {:?} failed: {}", self.path, err);
            }
        }
    }
}

/// In-memory store for tests and headless harnesses
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: Option<ThresholdTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(table: ThresholdTable) -> Self {
        Self { table: Some(table) }
    }
}

impl ThresholdStorage for MemoryStore {
    fn load(&mut self) -> Option<ThresholdTable> {
        self.table.clone()
    }

    fn save(&mut self, table: &ThresholdTable) {
        self.table = Some(table.clone());
    }
}
