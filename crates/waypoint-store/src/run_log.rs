//! Append-only run sink backed by a SHA-256 hash chain.
//!
//! `HashChainRunSink` keeps every appended run in a `Vec` behind a `Mutex`.
//! Use `export_log()` to obtain a snapshot and `verify_integrity()` at any
//! time to confirm no stored run was altered after the fact.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use waypoint_contracts::{
    error::{EngineError, EngineResult},
    run::Run,
};
use waypoint_core::traits::RunSink;

use crate::chain::{hash_entry, verify_chain, RunEntry, RunLog};

// ── Internal mutable state ────────────────────────────────────────────────────

pub(crate) struct ChainState {
    pub(crate) entries: Vec<RunEntry>,
    pub(crate) last_hash: String,
}

// ── Public sink ───────────────────────────────────────────────────────────────

/// An in-memory, append-only run sink.
///
/// Cloning shares the underlying log, so a caller can keep a handle for
/// inspection while the runtime owns another.
#[derive(Clone)]
pub struct HashChainRunSink {
    pub(crate) state: Arc<Mutex<ChainState>>,
}

impl Default for HashChainRunSink {
    fn default() -> Self {
        Self::new()
    }
}

impl HashChainRunSink {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ChainState {
                entries: Vec::new(),
                last_hash: RunEntry::GENESIS_HASH.to_string(),
            })),
        }
    }

    /// Snapshot of every entry appended so far.
    pub fn export_log(&self) -> EngineResult<RunLog> {
        let state = self.lock()?;
        Ok(RunLog {
            entries: state.entries.clone(),
            exported_at: Utc::now(),
            terminal_hash: state
                .entries
                .last()
                .map(|e| e.this_hash.clone())
                .unwrap_or_default(),
        })
    }

    /// Runs in append order.
    pub fn runs(&self) -> EngineResult<Vec<Run>> {
        Ok(self.lock()?.entries.iter().map(|e| e.run.clone()).collect())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recompute the chain. False if the lock is poisoned or any entry was
    /// altered.
    pub fn verify_integrity(&self) -> bool {
        match self.lock() {
            Ok(state) => verify_chain(&state.entries),
            Err(_) => false,
        }
    }

    fn lock(&self) -> EngineResult<std::sync::MutexGuard<'_, ChainState>> {
        self.state.lock().map_err(|e| EngineError::Store {
            reason: format!("run log lock poisoned: {}", e),
        })
    }
}

#[async_trait]
impl RunSink for HashChainRunSink {
    async fn append(&self, run: &Run) -> EngineResult<()> {
        let mut state = self.lock()?;

        let sequence = state.entries.len() as u64;
        let prev_hash = state.last_hash.clone();
        let this_hash = hash_entry(sequence, run, &prev_hash)?;

        info!(
            run_id = %run.id,
            session_id = %run.session_id,
            status = ?run.status,
            sequence,
            hash = %this_hash,
            "run appended to log"
        );

        state.entries.push(RunEntry {
            sequence,
            run: run.clone(),
            prev_hash,
            this_hash: this_hash.clone(),
        });
        state.last_hash = this_hash;

        Ok(())
    }
}
