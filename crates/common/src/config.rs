//! Harness configuration.
//!
//! One `HarnessConfig` is constructed at process start and passed by reference
//! into every component that needs it. There is no global options object, so
//! scenarios running in parallel processes cannot observe each other's
//! settings.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{HarnessError, Result};

/// Environment variable naming the orchestration tool's working directory.
pub const DEPLOY_DIR_ENV: &str = "CHAOS_DEPLOY_DIR";

/// Environment variable pointing at a remote container engine
/// (`tcp://host:port`). When set, resolved service addresses use its host.
pub const DOCKER_HOST_ENV: &str = "DOCKER_HOST";

/// Tunables for one scenario run.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Delay between unsatisfied convergence probes.
    pub interval: Duration,
    /// Deadline for convergence waits.
    pub timeout: Duration,
    /// Fixed wait after `up` before services are assumed ready.
    pub startup_settle: Duration,
    /// Working directory of the orchestration tool (compose files live here).
    pub deploy_dir: PathBuf,
    /// Orchestration binary to invoke.
    pub compose_bin: String,
    /// Host override for "bind to all interfaces" normalization.
    pub docker_host: Option<String>,
    /// Where captured diagnostics are written at teardown.
    pub log_dir: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(120),
            startup_settle: Duration::from_secs(15),
            deploy_dir: PathBuf::from("./deploy"),
            compose_bin: "docker-compose".to_string(),
            docker_host: None,
            log_dir: PathBuf::from("./test-logs"),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from the environment, falling back to defaults.
    ///
    /// Recognized variables: `CHAOS_POLL_INTERVAL_SECS`, `CHAOS_TIMEOUT_SECS`,
    /// `CHAOS_STARTUP_SETTLE_SECS`, `CHAOS_DEPLOY_DIR`, `CHAOS_COMPOSE_BIN`,
    /// `CHAOS_LOG_DIR`, `DOCKER_HOST`.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Configuration` if a duration variable is set but
    /// not a non-negative integer number of seconds.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            interval: env_secs("CHAOS_POLL_INTERVAL_SECS", defaults.interval)?,
            timeout: env_secs("CHAOS_TIMEOUT_SECS", defaults.timeout)?,
            startup_settle: env_secs("CHAOS_STARTUP_SETTLE_SECS", defaults.startup_settle)?,
            deploy_dir: env::var(DEPLOY_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or(defaults.deploy_dir),
            compose_bin: env::var("CHAOS_COMPOSE_BIN").unwrap_or(defaults.compose_bin),
            docker_host: env::var(DOCKER_HOST_ENV).ok().filter(|v| !v.is_empty()),
            log_dir: env::var("CHAOS_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
        })
    }
}

fn env_secs(name: &str, default: Duration) -> Result<Duration> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| {
                HarnessError::Configuration(format!("{name} must be an integer number of seconds, got {raw:?}"))
            }),
        Err(_) => Ok(default),
    }
}
