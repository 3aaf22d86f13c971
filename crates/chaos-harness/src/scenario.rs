//! Scenario lifecycle: provision, fault, verify, tear down.
//!
//! A scenario is data ([`ScenarioSpec`]) plus a runner that walks it through
//! a fixed lifecycle. Each run gets a unique project tag, its own generated
//! config and descriptor under the deploy directory's `tmp/`, and a teardown
//! that runs even when the test body fails (a consuming [`teardown`] on the
//! happy path, a drop guard otherwise).
//!
//! [`teardown`]: ScenarioRunner::teardown

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use common::config::HarnessConfig;
use common::error::{HarnessError, Result};
use common::{naming, text};

use crate::api::{self, ApiResponse, ZoneApi};
use crate::compose::ComposeDriver;
use crate::ini::{ConfigOverride, IniFile};
use crate::locate::{Protocol, ServiceEndpoint, ServiceLocator};
use crate::oracle::{self, NameOracle, RecordType, DOWN_CONFIRM_WINDOW};
use crate::poll::{PollOutcome, Poller};
use crate::template;

/// Where a scenario is in its lifecycle. Transitions are logged so a hung
/// run's last line says which phase it died in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioState {
    Init,
    Configured,
    Built,
    Running,
    FaultInjected,
    Recovering,
    Verified,
    TornDown,
    Failed,
}

impl fmt::Display for ScenarioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScenarioState::Init => "init",
            ScenarioState::Configured => "configured",
            ScenarioState::Built => "built",
            ScenarioState::Running => "running",
            ScenarioState::FaultInjected => "fault-injected",
            ScenarioState::Recovering => "recovering",
            ScenarioState::Verified => "verified",
            ScenarioState::TornDown => "torn-down",
            ScenarioState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Disruption applied to one unit, and its inverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultAction {
    /// Suspend every process in the unit; it stays allocated.
    Pause,
    /// Kill the unit outright.
    Kill,
    /// Undo a pause.
    Resume,
    /// Start a killed unit again. Published ports may change.
    Restart,
}

impl fmt::Display for FaultAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FaultAction::Pause => "pause",
            FaultAction::Kill => "kill",
            FaultAction::Resume => "resume",
            FaultAction::Restart => "restart",
        };
        f.write_str(s)
    }
}

/// One fault applied during a run, kept for the diagnostics timeline.
#[derive(Debug, Clone, Serialize)]
pub struct FaultRecord {
    pub unit: String,
    pub action: FaultAction,
    pub at: DateTime<Utc>,
}

/// One unit whose endpoint the runner resolves after startup.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub unit: String,
    pub internal_port: u16,
    pub protocol: Protocol,
}

impl ServiceSpec {
    pub fn new(unit: impl Into<String>, internal_port: u16, protocol: Protocol) -> Self {
        Self {
            unit: unit.into(),
            internal_port,
            protocol,
        }
    }
}

/// Everything that varies between scenarios, as plain data. Paths are
/// relative to the deploy directory.
#[derive(Debug, Clone)]
pub struct ScenarioSpec {
    pub name: String,
    /// Descriptor template with `{{project_tag}}` and `{{config_path}}`
    /// placeholders.
    pub descriptor_template: String,
    /// Descriptors stacked before the rendered one.
    pub descriptors_before: Vec<String>,
    /// Descriptors stacked after it (later files override earlier ones).
    pub descriptors_after: Vec<String>,
    /// Base application config, copied then edited per run.
    pub base_config: String,
    pub overrides: Vec<ConfigOverride>,
    /// Extra template params (version pins and the like) on top of the
    /// always-present `project_tag` and `config_path`.
    pub extra_params: Vec<(String, String)>,
    /// Units whose endpoints get resolved after startup.
    pub services: Vec<ServiceSpec>,
    /// Unit serving the REST API.
    pub api_unit: String,
    /// Units that are nameservers; each gets an oracle.
    pub nameserver_units: Vec<String>,
}

/// A zone created through the API during a run.
#[derive(Debug, Clone)]
pub struct Zone {
    pub name: String,
    pub id: String,
}

/// Name every down-confirmation probes for. Any name works; only
/// reachability is being judged.
const DOWN_PROBE_NAME: &str = "example.com.";

/// Drives one scenario from provisioning to teardown.
pub struct ScenarioRunner<O, F>
where
    O: NameOracle,
    F: Fn(&ServiceEndpoint) -> O,
{
    cfg: HarnessConfig,
    spec: ScenarioSpec,
    state: ScenarioState,
    project: String,
    driver: ComposeDriver,
    config_path: PathBuf,
    descriptor_path: PathBuf,
    endpoints: HashMap<String, ServiceEndpoint>,
    oracles: HashMap<String, O>,
    oracle_for: F,
    api: Option<ZoneApi>,
    poller: Poller,
    faults: Vec<FaultRecord>,
    torn_down: bool,
}

impl<O, F> ScenarioRunner<O, F>
where
    O: NameOracle,
    F: Fn(&ServiceEndpoint) -> O,
{
    /// Provision the full environment: generate per-run files, build and
    /// start the descriptor stack, resolve endpoints, run reachability
    /// prechecks.
    ///
    /// # Errors
    ///
    /// On any provisioning failure the partially started environment is
    /// taken down before the error is returned.
    pub async fn launch(cfg: HarnessConfig, spec: ScenarioSpec, oracle_for: F) -> Result<Self> {
        let mut runner = Self::prepare(cfg, spec, oracle_for)?;
        if let Err(e) = runner.deploy().await {
            runner.advance(ScenarioState::Failed);
            if let Err(down) = runner.driver.down().await {
                warn!(error = %down, "cleanup after failed launch also failed");
            }
            runner.torn_down = true;
            return Err(e);
        }
        Ok(runner)
    }

    /// Generate the per-run config and descriptor, and bind the compose
    /// driver to the full descriptor stack. No external commands run here.
    fn prepare(cfg: HarnessConfig, spec: ScenarioSpec, oracle_for: F) -> Result<Self> {
        let project = naming::project_name();
        let tag = project
            .rsplit('_')
            .next()
            .unwrap_or(project.as_str())
            .to_string();
        info!(scenario = %spec.name, %project, "preparing scenario");

        let tmp_dir = cfg.deploy_dir.join("tmp");
        std::fs::create_dir_all(&tmp_dir)?;

        // Copy the base config and layer the scenario's overrides on top.
        let config_rel = format!("tmp/zone-{tag}.conf");
        let config_path = cfg.deploy_dir.join(&config_rel);
        std::fs::copy(cfg.deploy_dir.join(&spec.base_config), &config_path)?;
        IniFile::new(&config_path).apply(&spec.overrides)?;

        // Render the descriptor that mounts the generated config.
        let template_text = std::fs::read_to_string(cfg.deploy_dir.join(&spec.descriptor_template))?;
        let mut params: Vec<(&str, &str)> =
            vec![("project_tag", project.as_str()), ("config_path", &config_rel)];
        params.extend(
            spec.extra_params
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );
        let rendered = template::render(&template_text, &params)?;
        let descriptor_path = tmp_dir.join(format!("zone-api-{tag}.yml"));
        std::fs::write(&descriptor_path, rendered)?;

        let mut files: Vec<PathBuf> = spec
            .descriptors_before
            .iter()
            .map(PathBuf::from)
            .collect();
        files.push(PathBuf::from(format!("tmp/zone-api-{tag}.yml")));
        files.extend(spec.descriptors_after.iter().map(PathBuf::from));

        let driver = ComposeDriver::new(&cfg, Some(project.clone()), files)?;
        let poller = Poller::new(cfg.interval, cfg.timeout)?;

        let mut runner = Self {
            cfg,
            spec,
            state: ScenarioState::Init,
            project,
            driver,
            config_path,
            descriptor_path,
            endpoints: HashMap::new(),
            oracles: HashMap::new(),
            oracle_for,
            api: None,
            poller,
            faults: Vec::new(),
            torn_down: false,
        };
        runner.advance(ScenarioState::Configured);
        Ok(runner)
    }

    async fn deploy(&mut self) -> Result<()> {
        self.driver.build().await?.require_success()?;
        self.advance(ScenarioState::Built);

        self.driver.up().await?.require_success()?;
        info!(settle = ?self.cfg.startup_settle, "waiting for services to settle");
        tokio::time::sleep(self.cfg.startup_settle).await;

        let locator = ServiceLocator::new(&self.driver, &self.cfg);
        for service in self.spec.services.clone() {
            let endpoint = locator
                .resolve(&service.unit, service.internal_port, service.protocol)
                .await?;
            info!(%endpoint, "resolved");
            self.endpoints.insert(service.unit.clone(), endpoint);
        }

        let api_endpoint = self.endpoint(&self.spec.api_unit)?.clone();
        self.api = Some(ZoneApi::new(api_endpoint.http_url()));

        for unit in self.spec.nameserver_units.clone() {
            let endpoint = self.endpoint(&unit)?.clone();
            let oracle = (self.oracle_for)(&endpoint);
            self.oracles.insert(unit, oracle);
        }

        self.precheck().await?;
        self.advance(ScenarioState::Running);
        Ok(())
    }

    /// Fail fast when a service came up but is not actually serving, so the
    /// first scenario assertion is not the thing that discovers a broken
    /// deployment.
    async fn precheck(&self) -> Result<()> {
        let listing = self
            .api()?
            .list_zones()
            .await
            .map_err(|e| HarnessError::Probe(format!("API precheck failed: {e}")))?;
        if !listing.is_success() {
            return Err(HarnessError::Probe(format!(
                "API precheck returned {}",
                listing.summary()
            )));
        }
        for (unit, oracle) in &self.oracles {
            oracle
                .query(DOWN_PROBE_NAME, RecordType::Soa)
                .await
                .map_err(|e| HarnessError::Probe(format!("{unit} precheck failed: {e}")))?;
        }
        Ok(())
    }

    fn advance(&mut self, next: ScenarioState) {
        info!(scenario = %self.spec.name, from = %self.state, to = %next, "state");
        self.state = next;
    }

    pub fn state(&self) -> ScenarioState {
        self.state
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// The REST API client. Available from `Running` onward.
    ///
    /// # Errors
    ///
    /// `Configuration` before deployment finishes.
    pub fn api(&self) -> Result<&ZoneApi> {
        self.api
            .as_ref()
            .ok_or_else(|| HarnessError::Configuration("API not deployed yet".to_string()))
    }

    /// # Errors
    ///
    /// `Configuration` for a unit that was never resolved.
    pub fn endpoint(&self, unit: &str) -> Result<&ServiceEndpoint> {
        self.endpoints.get(unit).ok_or_else(|| {
            HarnessError::Configuration(format!("no resolved endpoint for unit {unit:?}"))
        })
    }

    /// Apply a disruptive fault and confirm it took hold: the unit's
    /// nameserver must stop answering within a short window.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for `Resume`/`Restart` (those are recoveries),
    /// `Assertion` when the unit keeps answering after the fault.
    pub async fn inject_fault(&mut self, unit: &str, action: FaultAction) -> Result<()> {
        match action {
            FaultAction::Pause => self.driver.pause(unit).await?.require_success()?,
            FaultAction::Kill => self.driver.kill(unit).await?.require_success()?,
            FaultAction::Resume | FaultAction::Restart => {
                return Err(HarnessError::InvalidArgument(format!(
                    "{action} is a recovery, not a fault"
                )));
            }
        };
        self.faults.push(FaultRecord {
            unit: unit.to_string(),
            action,
            at: Utc::now(),
        });
        info!(unit, %action, "fault injected");

        if let Some(oracle) = self.oracles.get(unit) {
            let window = self.poller.with_timeout(DOWN_CONFIRM_WINDOW);
            oracle::confirm_down(oracle, DOWN_PROBE_NAME, &window).await?;
        }
        self.advance(ScenarioState::FaultInjected);
        Ok(())
    }

    /// Undo a fault. After `Restart` the unit's endpoint is re-resolved and
    /// its oracle rebuilt, since published ports can change.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for `Pause`/`Kill`.
    pub async fn recover(&mut self, unit: &str, action: FaultAction) -> Result<()> {
        match action {
            FaultAction::Resume => {
                self.driver.unpause(unit).await?.require_success()?;
            }
            FaultAction::Restart => {
                self.driver.start(unit).await?.require_success()?;
                if let Some(spec) = self
                    .spec
                    .services
                    .iter()
                    .find(|s| s.unit == unit)
                    .cloned()
                {
                    let locator = ServiceLocator::new(&self.driver, &self.cfg);
                    let endpoint = locator
                        .resolve(&spec.unit, spec.internal_port, spec.protocol)
                        .await?;
                    info!(%endpoint, "re-resolved after restart");
                    if self.oracles.contains_key(unit) {
                        self.oracles.insert(unit.to_string(), (self.oracle_for)(&endpoint));
                    }
                    self.endpoints.insert(unit.to_string(), endpoint);
                }
            }
            FaultAction::Pause | FaultAction::Kill => {
                return Err(HarnessError::InvalidArgument(format!(
                    "{action} is a fault, not a recovery"
                )));
            }
        }
        self.faults.push(FaultRecord {
            unit: unit.to_string(),
            action,
            at: Utc::now(),
        });
        info!(unit, %action, "recovery applied");
        self.advance(ScenarioState::Recovering);
        Ok(())
    }

    /// Create a zone with a random name.
    ///
    /// # Errors
    ///
    /// `Assertion` unless the API accepts with 202 and returns an id.
    pub async fn create_zone(&self) -> Result<Zone> {
        let name = naming::random_zone();
        let resp = self
            .api()?
            .create_zone(&name, "hostmaster@example.com")
            .await
            .map_err(|e| HarnessError::Probe(e.to_string()))?;
        if resp.status != 202 {
            return Err(HarnessError::Assertion(format!(
                "zone create for {name} not accepted: {}",
                resp.summary()
            )));
        }
        let id = resp.id().ok_or_else(|| {
            HarnessError::Assertion(format!("zone create response has no id: {}", resp.summary()))
        })?;
        info!(zone = %name, id, "zone created");
        Ok(Zone {
            name: resp.name().unwrap_or(&name).to_string(),
            id: id.to_string(),
        })
    }

    /// Delete a zone.
    ///
    /// # Errors
    ///
    /// `Assertion` unless the API accepts with 202.
    pub async fn delete_zone(&self, zone: &Zone) -> Result<()> {
        let resp = self
            .api()?
            .delete_zone(&zone.id)
            .await
            .map_err(|e| HarnessError::Probe(e.to_string()))?;
        if resp.status != 202 {
            return Err(HarnessError::Assertion(format!(
                "zone delete for {} not accepted: {}",
                zone.name,
                resp.summary()
            )));
        }
        info!(zone = %zone.name, "zone delete accepted");
        Ok(())
    }

    /// Create a random A recordset under `zone` and return its name.
    ///
    /// # Errors
    ///
    /// `Assertion` unless the API accepts with 202.
    pub async fn create_recordset(&self, zone: &Zone) -> Result<String> {
        let name = naming::random_record(&zone.name);
        let ip = naming::random_ipv4();
        let resp = self
            .api()?
            .create_recordset(&zone.id, &name, "A", &[ip.as_str()])
            .await
            .map_err(|e| HarnessError::Probe(e.to_string()))?;
        if resp.status != 202 {
            return Err(HarnessError::Assertion(format!(
                "recordset create for {name} not accepted: {}",
                resp.summary()
            )));
        }
        info!(recordset = %name, %ip, "recordset created");
        Ok(name)
    }

    /// Wait for the zone to settle in one of `stop_statuses`, then require
    /// that the settled status is `expected`.
    ///
    /// Stopping on a superset of the expected status catches a zone that
    /// lands in `ERROR` immediately, instead of polling a terminal state for
    /// the whole deadline.
    ///
    /// # Errors
    ///
    /// `Assertion` when the zone settles on the wrong status or never
    /// settles, `Probe` when the API stops answering.
    pub async fn await_zone_status(
        &mut self,
        zone: &Zone,
        stop_statuses: &[&str],
        expected: &str,
    ) -> Result<ApiResponse> {
        let api = self.api()?.clone();
        let outcome = api::wait_for_status(&api, &zone.id, stop_statuses, &self.poller).await;
        match outcome {
            PollOutcome::Satisfied { observation, elapsed } => {
                if observation.zone_status() == Some(expected) {
                    info!(zone = %zone.name, status = expected, ?elapsed, "zone settled");
                    if self.state == ScenarioState::Recovering {
                        self.advance(ScenarioState::Verified);
                    }
                    Ok(observation)
                } else {
                    Err(HarnessError::Assertion(format!(
                        "zone {} settled on the wrong state after {elapsed:?}, wanted {expected}: {}",
                        zone.name,
                        observation.summary()
                    )))
                }
            }
            PollOutcome::TimedOut { last, elapsed } => Err(HarnessError::Assertion(format!(
                "zone {} did not reach {expected} within {elapsed:?}: {}",
                zone.name,
                last.summary()
            ))),
            PollOutcome::ProbeFailed { error, elapsed } => Err(HarnessError::Probe(format!(
                "API stopped answering while waiting on zone {} ({elapsed:?}): {error}",
                zone.name
            ))),
        }
    }

    /// Wait for the zone to answer 404.
    ///
    /// # Errors
    ///
    /// `Assertion` on deadline, `Probe` when the API stops answering.
    pub async fn await_zone_gone(&mut self, zone: &Zone) -> Result<()> {
        let api = self.api()?.clone();
        let outcome = api::wait_for_gone(&api, &zone.id, &self.poller).await;
        match outcome {
            PollOutcome::Satisfied { elapsed, .. } => {
                info!(zone = %zone.name, ?elapsed, "zone gone");
                if self.state == ScenarioState::Recovering {
                    self.advance(ScenarioState::Verified);
                }
                Ok(())
            }
            PollOutcome::TimedOut { last, elapsed } => Err(HarnessError::Assertion(format!(
                "zone {} still present after {elapsed:?}: {}",
                zone.name,
                last.summary()
            ))),
            PollOutcome::ProbeFailed { error, elapsed } => Err(HarnessError::Probe(format!(
                "API stopped answering while waiting on zone {} ({elapsed:?}): {error}",
                zone.name
            ))),
        }
    }

    /// Wait until `name` resolves on one nameserver unit.
    ///
    /// # Errors
    ///
    /// `Configuration` for a unit with no oracle, otherwise as
    /// [`oracle::wait_for_name_on`].
    pub async fn await_name_on(
        &self,
        unit: &str,
        name: &str,
        record_type: RecordType,
    ) -> Result<()> {
        let oracle = self.oracle(unit)?;
        oracle::wait_for_name_on(oracle, name, record_type, &self.poller).await
    }

    /// Wait until `name` stops resolving on one nameserver unit.
    ///
    /// # Errors
    ///
    /// `Configuration` for a unit with no oracle, otherwise as
    /// [`oracle::wait_for_name_removed`].
    pub async fn await_name_removed(
        &self,
        unit: &str,
        name: &str,
        record_type: RecordType,
    ) -> Result<()> {
        let oracle = self.oracle(unit)?;
        oracle::wait_for_name_removed(oracle, name, record_type, &self.poller).await
    }

    fn oracle(&self, unit: &str) -> Result<&O> {
        self.oracles.get(unit).ok_or_else(|| {
            HarnessError::Configuration(format!("unit {unit:?} is not a nameserver"))
        })
    }

    /// Capture diagnostics, then stop and remove the environment. Always
    /// call this before asserting on results, so a failing assertion cannot
    /// leak a running environment.
    ///
    /// # Errors
    ///
    /// Fails when the final `down` fails; diagnostics capture is best-effort
    /// and only warns.
    pub async fn teardown(mut self) -> Result<()> {
        if let Err(e) = self.capture_diagnostics().await {
            warn!(error = %e, "diagnostics capture failed");
        }
        let result = self.driver.down().await?.require_success();
        self.torn_down = true;
        self.advance(ScenarioState::TornDown);
        result.map(|_| ())
    }

    /// Logs, generated files and the fault timeline, under
    /// `log_dir/<project>/`.
    async fn capture_diagnostics(&self) -> Result<()> {
        let dir = self.cfg.log_dir.join(&self.project);
        std::fs::create_dir_all(&dir)?;

        let logs = self.driver.logs().await?;
        std::fs::write(dir.join("compose.log"), text::strip_ansi(&logs.stdout))?;

        if self.config_path.exists() {
            std::fs::copy(&self.config_path, dir.join("zone.conf"))?;
        }
        if self.descriptor_path.exists() {
            std::fs::copy(&self.descriptor_path, dir.join("zone-api.yml"))?;
        }

        let timeline = serde_json::to_string_pretty(&self.faults)
            .map_err(|e| HarnessError::Configuration(format!("fault timeline: {e}")))?;
        std::fs::write(dir.join("faults.json"), timeline)?;
        info!(dir = %dir.display(), "diagnostics captured");
        Ok(())
    }
}

impl<O, F> Drop for ScenarioRunner<O, F>
where
    O: NameOracle,
    F: Fn(&ServiceEndpoint) -> O,
{
    /// Last-resort cleanup for panics and early returns that skipped
    /// [`teardown`](ScenarioRunner::teardown). Synchronous and best-effort.
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        warn!(
            project = %self.project,
            "scenario dropped without teardown, stopping environment"
        );
        if let Err(e) = self.driver.blocking_down() {
            warn!(error = %e, "emergency teardown failed");
        }
    }
}
