//! Shared utilities for the zone-chaos harness crates.

#![warn(clippy::pedantic)]

/// Module for the harness error taxonomy
pub mod error;

/// Module for harness configuration
pub mod config;

/// Module for randomized names and tags
pub mod naming;

/// Module for text cleanup of captured output
pub mod text;

/// Module for tracing initialization
pub mod telemetry;

pub use error::{HarnessError, Result};
