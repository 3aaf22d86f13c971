//! Black-box observation of nameserver state.
//!
//! Convergence is judged from outside: a name either resolves on a given
//! nameserver or it does not, and an unreachable nameserver is its own
//! observation (the expected one, right after a fault). The trait keeps
//! scenarios independent of how the lookup is performed; the default
//! implementation shells out to `dig`.

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use common::error::{HarnessError, Result};

use crate::locate::ServiceEndpoint;
use crate::poll::{PollOutcome, Poller};

/// What one lookup saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSighting {
    /// The nameserver answered with at least one record.
    Present,
    /// The nameserver answered, and had no data for the name.
    Absent,
}

/// The nameserver did not answer at all.
#[derive(Debug, Error)]
#[error("nameserver {endpoint} did not answer: {detail}")]
pub struct OracleDown {
    pub endpoint: String,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    A,
    Soa,
    Any,
}

impl RecordType {
    fn as_str(self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Soa => "SOA",
            RecordType::Any => "ANY",
        }
    }
}

/// One-shot lookup against a single nameserver.
pub trait NameOracle: Send + Sync {
    /// Ask one nameserver about one name. Never retries; retry policy
    /// belongs to the poller driving this.
    fn query(
        &self,
        name: &str,
        record_type: RecordType,
    ) -> impl std::future::Future<Output = std::result::Result<NameSighting, OracleDown>> + Send;
}

/// `dig`-backed oracle, pinned to one nameserver endpoint.
///
/// Runs `dig +short +time=1 +tries=1` so a suspended nameserver turns into a
/// quick [`OracleDown`] instead of a multi-second stall per probe.
#[derive(Debug, Clone)]
pub struct DigOracle {
    host: String,
    port: u16,
}

impl DigOracle {
    pub fn new(endpoint: &ServiceEndpoint) -> Self {
        Self {
            host: endpoint.host.clone(),
            port: endpoint.port,
        }
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl NameOracle for DigOracle {
    async fn query(
        &self,
        name: &str,
        record_type: RecordType,
    ) -> std::result::Result<NameSighting, OracleDown> {
        let server = format!("@{}", self.host);
        let port = self.port.to_string();
        let output = tokio::process::Command::new("dig")
            .args([
                "+short",
                "+time=1",
                "+tries=1",
                &server,
                "-p",
                &port,
                name,
                record_type.as_str(),
            ])
            .output()
            .await
            .map_err(|e| OracleDown {
                endpoint: self.address(),
                detail: format!("failed to spawn dig: {e}"),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let code = output.status.code().unwrap_or(-1);

        // dig exits 9 when no server could be reached
        if code == 9 || stderr.contains("connection timed out") {
            return Err(OracleDown {
                endpoint: self.address(),
                detail: stderr.trim().to_string(),
            });
        }

        let sighting = if stdout.trim().is_empty() {
            NameSighting::Absent
        } else {
            NameSighting::Present
        };
        debug!(
            server = %self.address(),
            name,
            record_type = record_type.as_str(),
            ?sighting,
            "dig probe"
        );
        Ok(sighting)
    }
}

/// Window for confirming a fault took hold. Deliberately short next to the
/// convergence timeout; a paused nameserver stops answering within seconds.
pub const DOWN_CONFIRM_WINDOW: Duration = Duration::from_secs(15);

/// Verify a faulted nameserver has actually stopped answering.
///
/// Here the probe failing is the success condition, so the poll outcomes
/// invert: `ProbeFailed` is a pass and `TimedOut` means the fault did not
/// take hold.
///
/// # Errors
///
/// `HarnessError::Assertion` when the nameserver keeps answering for the
/// whole window.
pub async fn confirm_down<O: NameOracle>(
    oracle: &O,
    probe_name: &str,
    poller: &Poller,
) -> Result<()> {
    let outcome = poller
        .run(|| oracle.query(probe_name, RecordType::Soa), |_| false)
        .await;
    match outcome {
        PollOutcome::ProbeFailed { error, elapsed } => {
            debug!(%error, ?elapsed, "nameserver confirmed down");
            Ok(())
        }
        PollOutcome::TimedOut { elapsed, .. } | PollOutcome::Satisfied { elapsed, .. } => {
            Err(HarnessError::Assertion(format!(
                "nameserver still answering {probe_name} after {elapsed:?}"
            )))
        }
    }
}

/// Wait until `name` resolves on the oracle's nameserver.
///
/// # Errors
///
/// `Assertion` when the deadline passes without the name appearing, `Probe`
/// when the nameserver stops answering mid-wait.
pub async fn wait_for_name_on<O: NameOracle>(
    oracle: &O,
    name: &str,
    record_type: RecordType,
    poller: &Poller,
) -> Result<()> {
    let outcome = poller
        .run(
            || oracle.query(name, record_type),
            |s| *s == NameSighting::Present,
        )
        .await;
    match outcome {
        PollOutcome::Satisfied { elapsed, .. } => {
            debug!(name, ?elapsed, "name visible");
            Ok(())
        }
        PollOutcome::TimedOut { elapsed, .. } => Err(HarnessError::Assertion(format!(
            "{name} not visible after {elapsed:?}"
        ))),
        PollOutcome::ProbeFailed { error, .. } => Err(HarnessError::Probe(error.to_string())),
    }
}

/// Wait until `name` no longer resolves on the oracle's nameserver.
///
/// # Errors
///
/// `Assertion` on deadline, `Probe` when the nameserver stops answering.
pub async fn wait_for_name_removed<O: NameOracle>(
    oracle: &O,
    name: &str,
    record_type: RecordType,
    poller: &Poller,
) -> Result<()> {
    let outcome = poller
        .run(
            || oracle.query(name, record_type),
            |s| *s == NameSighting::Absent,
        )
        .await;
    match outcome {
        PollOutcome::Satisfied { elapsed, .. } => {
            debug!(name, ?elapsed, "name removed");
            Ok(())
        }
        PollOutcome::TimedOut { elapsed, .. } => Err(HarnessError::Assertion(format!(
            "{name} still visible after {elapsed:?}"
        ))),
        PollOutcome::ProbeFailed { error, .. } => Err(HarnessError::Probe(error.to_string())),
    }
}
