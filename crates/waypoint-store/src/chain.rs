//! Hash-chain primitives for the run log.
//!
//! Every field that contributes to an entry's hash is listed explicitly so
//! nothing is accidentally omitted.
//!
//! Hash input layout (bytes, in order):
//!   1. sequence as 8-byte little-endian
//!   2. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   3. canonical JSON of the run (serde_json, no pretty-printing)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use waypoint_contracts::{
    error::{EngineError, EngineResult},
    run::Run,
};

/// One appended run, linked to the entry before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEntry {
    /// Position in the log, starting at 0.
    pub sequence: u64,
    pub run: Run,
    /// `this_hash` of the previous entry, or `GENESIS_HASH` for the first.
    pub prev_hash: String,
    pub this_hash: String,
}

impl RunEntry {
    /// `prev_hash` of the first entry in every log: 64 hex zeros.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";
}

/// A point-in-time export of the run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLog {
    pub entries: Vec<RunEntry>,
    pub exported_at: DateTime<Utc>,
    /// `this_hash` of the last entry; empty when the log is empty. A compact
    /// commitment to the whole log.
    pub terminal_hash: String,
}

/// SHA-256 over (sequence, prev_hash, run JSON) as lowercase hex.
pub fn hash_entry(sequence: u64, run: &Run, prev_hash: &str) -> EngineResult<String> {
    let run_json = serde_json::to_vec(run).map_err(|e| EngineError::Store {
        reason: format!("failed to serialize run {}: {}", run.id, e),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&run_json);

    Ok(hex::encode(hasher.finalize()))
}

/// Check prev-hash linkage and recompute every hash. An empty chain is valid.
pub fn verify_chain(entries: &[RunEntry]) -> bool {
    let mut expected_prev = RunEntry::GENESIS_HASH.to_string();

    for (position, entry) in entries.iter().enumerate() {
        if entry.sequence != position as u64 || entry.prev_hash != expected_prev {
            return false;
        }

        match hash_entry(entry.sequence, &entry.run, &entry.prev_hash) {
            Ok(recomputed) if recomputed == entry.this_hash => {}
            _ => return false,
        }

        expected_prev = entry.this_hash.clone();
    }

    true
}
