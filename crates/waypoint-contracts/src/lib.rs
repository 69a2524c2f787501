//! # waypoint-contracts
//!
//! Shared types for the Waypoint agent engine: the agent specification model,
//! conversation messages, session and run records, configuration, and errors.
//!
//! All crates in the workspace import from here. No engine logic lives in
//! this crate beyond the reference checks a specification carries about
//! itself.

pub mod config;
pub mod error;
pub mod internal;
pub mod message;
pub mod policy;
pub mod run;
pub mod session;
pub mod spec;
pub mod verify;
