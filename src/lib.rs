//! SolGuard Library
//!
//! Core components of the SolGuard lending-position monitor: protocol
//! account decoders, risk classification, strategy selection, idempotent
//! execution, and the hash-chained activity ledger.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod task_runner;
