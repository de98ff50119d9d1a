//! Shared test utilities for pagepack
//!
//! This module provides common helpers for integration tests:
//! - Deterministic clocks and session wiring
//! - Fixture pages and unpacking of captured archives

pub mod determinism;
pub mod fixtures;
