//! Error taxonomy for the zone-chaos harness.
//!
//! The split matters for callers: `Configuration` and `InvalidArgument` fail
//! before anything external runs, `Orchestration` aborts the current lifecycle
//! step (teardown still happens), `Probe` is recoverable and usually surfaces
//! as a poll outcome instead of an error, and `Assertion` is a test verdict
//! carrying the last observation.

use thiserror::Error;

/// Errors that can occur while driving an orchestrated environment.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Bad local setup: missing directory, unreadable template, unresolved
    /// template placeholder. The scenario never starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The orchestration CLI exited non-zero. Captured output is preserved
    /// verbatim so the failing command can be reproduced by hand.
    #[error("command `{command}` exited {code}\n+-- stdout\n{stdout}\n+-- stderr\n{stderr}")]
    Orchestration {
        command: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    /// Malformed input rejected before any external call is made.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Transport-level failure of an HTTP or resolver probe. Not fatal by
    /// default; the poller reports it as a first-class outcome.
    #[error("probe failed: {0}")]
    Probe(String),

    /// Observed state did not match the expected state within a bounded wait.
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// A config section or key that was expected to exist is absent.
    #[error("key not found: [{section}] {key}")]
    KeyNotFound { section: String, key: String },

    /// Filesystem error while preparing or snapshotting the environment.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using `HarnessError`
pub type Result<T> = std::result::Result<T, HarnessError>;
