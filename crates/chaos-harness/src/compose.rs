//! Driver for the external container-orchestration CLI.
//!
//! Every operation is one synchronous invocation of the compose binary, run in
//! the deploy directory with the project tag and descriptor files injected as
//! flags. A non-zero exit code is an observation, not an error: callers that
//! require success go through [`CmdOutput::require_success`], which preserves
//! the captured output in the error so the failing command can be rerun by
//! hand.

use std::fmt;
use std::path::PathBuf;
use std::process::Output;
use std::str::FromStr;

use tokio::process::Command;
use tracing::{debug, warn};

use common::config::HarnessConfig;
use common::error::{HarnessError, Result};

/// Wire protocol accepted by the port-resolution verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireProtocol {
    Tcp,
    Udp,
}

impl fmt::Display for WireProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireProtocol::Tcp => f.write_str("tcp"),
            WireProtocol::Udp => f.write_str("udp"),
        }
    }
}

impl FromStr for WireProtocol {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tcp" => Ok(WireProtocol::Tcp),
            "udp" => Ok(WireProtocol::Udp),
            other => Err(HarnessError::InvalidArgument(format!(
                "invalid protocol {other:?} (expected tcp or udp)"
            ))),
        }
    }
}

/// Captured result of one orchestration command.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    /// The full command line, for diagnostics and reproduction.
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    /// Exit code; `-1` when the process was killed by a signal.
    pub code: i32,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Assert the command exited zero.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Orchestration` carrying the command line, exit
    /// code and captured stdout/stderr.
    pub fn require_success(self) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(HarnessError::Orchestration {
                command: self.command,
                code: self.code,
                stdout: self.stdout,
                stderr: self.stderr,
            })
        }
    }
}

/// Compose CLI bound to one project namespace and descriptor stack.
#[derive(Debug, Clone)]
pub struct ComposeDriver {
    bin: String,
    workdir: PathBuf,
    project: Option<String>,
    files: Vec<PathBuf>,
}

impl ComposeDriver {
    /// Bind a driver to the deploy directory from `cfg`, an optional project
    /// tag and an ordered list of descriptor files (later files override
    /// earlier ones; the order is passed through to the CLI exactly).
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Configuration` when the deploy directory is
    /// missing or not a directory.
    pub fn new(
        cfg: &HarnessConfig,
        project: Option<String>,
        files: Vec<PathBuf>,
    ) -> Result<Self> {
        if !cfg.deploy_dir.exists() {
            return Err(HarnessError::Configuration(format!(
                "deploy dir {} not found (set {})",
                cfg.deploy_dir.display(),
                common::config::DEPLOY_DIR_ENV,
            )));
        }
        if !cfg.deploy_dir.is_dir() {
            return Err(HarnessError::Configuration(format!(
                "deploy dir {} is not a directory",
                cfg.deploy_dir.display(),
            )));
        }
        Ok(Self {
            bin: cfg.compose_bin.clone(),
            workdir: cfg.deploy_dir.clone(),
            project: project.map(|p| p.to_lowercase()),
            files,
        })
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    /// Build every image in the descriptor stack.
    pub async fn build(&self) -> Result<CmdOutput> {
        self.run("build", &[]).await
    }

    /// Start the whole environment, detached.
    pub async fn up(&self) -> Result<CmdOutput> {
        self.run("up", &["-d"]).await
    }

    /// Stop and remove the whole environment.
    pub async fn down(&self) -> Result<CmdOutput> {
        self.run("down", &[]).await
    }

    /// Suspend every process in a unit (the unit stays allocated).
    pub async fn pause(&self, unit: &str) -> Result<CmdOutput> {
        self.run("pause", &[unit]).await
    }

    /// Resume a paused unit.
    pub async fn unpause(&self, unit: &str) -> Result<CmdOutput> {
        self.run("unpause", &[unit]).await
    }

    /// Kill a unit outright.
    pub async fn kill(&self, unit: &str) -> Result<CmdOutput> {
        self.run("kill", &[unit]).await
    }

    /// Start a stopped unit. Its published ports may change.
    pub async fn start(&self, unit: &str) -> Result<CmdOutput> {
        self.run("start", &[unit]).await
    }

    /// Restart a unit in place.
    pub async fn restart(&self, unit: &str) -> Result<CmdOutput> {
        self.run("restart", &[unit]).await
    }

    /// Run a command inside a unit.
    pub async fn exec(&self, unit: &str, command: &[&str]) -> Result<CmdOutput> {
        let mut args = vec!["-T", unit];
        args.extend_from_slice(command);
        self.run("exec", &args).await
    }

    /// Resolve the externally published address of a unit's internal port.
    /// Output is `host:port` on stdout.
    pub async fn port(
        &self,
        unit: &str,
        internal_port: u16,
        protocol: Option<WireProtocol>,
    ) -> Result<CmdOutput> {
        let port = internal_port.to_string();
        let proto;
        let mut args: Vec<&str> = Vec::new();
        if let Some(p) = protocol {
            proto = p.to_string();
            args.extend_from_slice(&["--protocol", &proto]);
        }
        args.extend_from_slice(&[unit, &port]);
        self.run("port", &args).await
    }

    /// Aggregate log text for the whole environment.
    pub async fn logs(&self) -> Result<CmdOutput> {
        self.run("logs", &["--no-color"]).await
    }

    /// Best-effort synchronous `down`, for drop/interrupt paths where no
    /// async runtime is available.
    pub fn blocking_down(&self) -> std::io::Result<Output> {
        std::process::Command::new(&self.bin)
            .args(self.args_for("down", &[]))
            .current_dir(&self.workdir)
            .output()
    }

    /// Flags in a fixed, documented order: project tag, descriptor files (in
    /// listed order, later overrides earlier), verb, verb arguments.
    fn args_for(&self, verb: &str, extra: &[&str]) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(project) = &self.project {
            args.push("-p".to_string());
            args.push(project.clone());
        }
        for file in &self.files {
            args.push("-f".to_string());
            args.push(file.display().to_string());
        }
        args.push(verb.to_string());
        args.extend(extra.iter().map(ToString::to_string));
        args
    }

    async fn run(&self, verb: &str, extra: &[&str]) -> Result<CmdOutput> {
        let args = self.args_for(verb, extra);
        let command = format!("{} {}", self.bin, args.join(" "));

        let output = Command::new(&self.bin)
            .args(&args)
            .current_dir(&self.workdir)
            .output()
            .await?;

        let result = CmdOutput {
            command,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            code: output.status.code().unwrap_or(-1),
        };

        if result.success() {
            debug!(
                command = %result.command,
                workdir = %self.workdir.display(),
                "command exited 0"
            );
        } else {
            warn!(
                command = %result.command,
                workdir = %self.workdir.display(),
                code = result.code,
                "command failed"
            );
            warn!("+-- stdout\n{}", result.stdout);
            warn!("+-- stderr\n{}", result.stderr);
        }
        Ok(result)
    }
}
