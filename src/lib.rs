//! Floodgate - Per-Identity Flood Control
//!
//! This crate implements a sliding-window flood-control gate keyed by caller
//! identity, plus a thin HTTP adapter that admits or rejects requests based
//! on the gate's decision. State is held in process memory; every instance
//! limits independently.

pub mod config;
pub mod error;
pub mod flood;
pub mod http;
