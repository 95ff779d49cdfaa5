//! Real-time anomaly-detection and decision pipeline for a binary
//! prediction-market venue.
//!
//! Exposes every module so the binary and the integration tests can wire
//! them together; most of the interesting behavior lives behind the
//! `Store`/`Clock`/adapter trait seams rather than in `main.rs` itself.

pub mod adapters;
pub mod backoff;
pub mod clock;
pub mod collector;
pub mod config;
pub mod decision;
pub mod error;
pub mod estimator_state;
pub mod estimators;
pub mod features;
pub mod models;
pub mod paper;
pub mod queue;
pub mod risk;
pub mod scoring;
pub mod sizing;
pub mod store;
pub mod tape;
pub mod wallet;
pub mod windows;
