//! Chaos Integration Test Harness
//!
//! This crate provisions a disposable multi-container deployment of the zone
//! control plane, disrupts it (pausing or killing a nameserver mid-operation)
//! and verifies that the system converges to a consistent state once the
//! fault clears. Tests drive the real orchestration CLI and the real REST
//! API; nothing is mocked below the scenario layer.
//!
//! # Features
//!
//! - `scenarios`: Full end-to-end chaos scenarios (10min+, needs a container
//!   engine and the deploy directory)
//! - `all`: Enable all test categories
//!
//! # Prerequisites
//!
//! 1. A container engine and the compose CLI in PATH (override the binary
//!    with `CHAOS_COMPOSE_BIN`)
//! 2. Deploy directory with descriptors, templates and base config
//!    (default `./deploy`, override with `CHAOS_DEPLOY_DIR`)
//! 3. `dig` in PATH for nameserver probes
//!
//! # Usage
//!
//! ```bash
//! # From repo root - runs unit tests only (no default features)
//! cargo test
//!
//! # Full chaos scenario suite
//! cargo test -p chaos-harness --features scenarios
//! ```

pub mod api;
pub mod compose;
pub mod ini;
pub mod locate;
pub mod oracle;
pub mod poll;
pub mod scenario;
pub mod template;

pub use api::{ApiResponse, ZoneApi};
pub use compose::{CmdOutput, ComposeDriver};
pub use ini::{ConfigOverride, IniFile};
pub use locate::{Protocol, ServiceEndpoint, ServiceLocator};
pub use oracle::{DigOracle, NameOracle, NameSighting, RecordType};
pub use poll::{PollOutcome, Poller};
pub use scenario::{
    FaultAction, ScenarioRunner, ScenarioSpec, ScenarioState, ServiceSpec, Zone,
};
