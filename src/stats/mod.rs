//! Statistics Module
//!
//! Exponentially smoothed round-trip and dispatch-latency aggregates, kept per
//! acking peer address and per message type. Entries are created on first
//! observation; the first sample seeds min, max and average.

pub mod collector;
pub mod types;
