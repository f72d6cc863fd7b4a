//! Shared test utilities for lexkb integration tests.
//!
//! - `TestHarness`: in-memory store, blob store and pipeline wiring
//! - `fakes`: scripted collaborators and recorders

pub mod fakes;
pub mod harness;

pub use harness::TestHarness;
