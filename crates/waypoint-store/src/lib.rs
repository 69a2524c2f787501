//! # waypoint-store
//!
//! Reference persistence collaborators for the Waypoint runtime.
//!
//! ## Overview
//!
//! - [`InMemoryMemoryStore`] keeps session state and TTL-bounded long-term
//!   memory behind a mutex.
//! - [`HashChainRunSink`] is an append-only run log. Each appended run links
//!   to the previous entry via its SHA-256 hash, so altering any stored run
//!   (even a single byte) breaks the chain and is caught by `verify_chain`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use waypoint_store::{HashChainRunSink, InMemoryMemoryStore};
//!
//! let memory = Arc::new(InMemoryMemoryStore::new());
//! let sink = HashChainRunSink::new();
//! // Pass both to `waypoint_core::Runtime::new(...)`, then later:
//! assert!(sink.verify_integrity());
//! let log = sink.export_log()?;
//! ```

pub mod chain;
pub mod memory;
pub mod run_log;

pub use chain::{hash_entry, verify_chain, RunEntry, RunLog};
pub use memory::InMemoryMemoryStore;
pub use run_log::HashChainRunSink;

// ── Tests ─────────────────────────────────────────────────────────────────────
