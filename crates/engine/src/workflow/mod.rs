//! Blueprint loading, session state, and flow execution.
//!
//! `document` turns text into a validated [`hacksmith_types::BlueprintDocument`],
//! `session` holds the per-run state, and `runner` drives a session through
//! its flow.

pub mod document;
pub mod runner;
pub mod session;
