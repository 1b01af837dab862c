//! Single seam for running commands on this machine or on a remote host
//!
//! Local commands run as subprocesses, remote ones through the system `ssh`
//! client multiplexed over a per-host control connection ([`Session`]).
//! Mutating commands go through [`Gateway::act`], which only logs under
//! dry-run; read-only probes go through [`Gateway::run`] and execute on every
//! host that was actually contacted.

pub mod command;

pub use command::{CommandSpec, quote};

use crate::{
    config::SshOptions,
    endpoint,
    error::{Error, Result},
};
use std::{path::PathBuf, process::Stdio, sync::Arc};
use tempfile::TempDir;
use tracing::{debug, info};

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Last non-empty stderr line, or the exit code
    #[must_use]
    pub fn reason(&self) -> String {
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map_or_else(
                || match self.code {
                    Some(code) => format!("exit status {code}"),
                    None => "terminated by signal".to_string(),
                },
                ToString::to_string,
            )
    }
}

/// Executes a local process
#[async_trait::async_trait]
pub trait Runner: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned
    async fn exec(&self, command: &CommandSpec) -> std::io::Result<Output>;
}

/// Runs commands with `tokio::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait::async_trait]
impl Runner for ProcessRunner {
    async fn exec(&self, command: &CommandSpec) -> std::io::Result<Output> {
        let output = tokio::process::Command::new(command.program())
            .args(command.get_args())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;
        Ok(Output {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// An open connection to one host, local or remote
#[derive(Debug)]
pub struct Session {
    host: String,
    destination: String,
    control: Option<TempDir>,
}

impl Session {
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        endpoint::is_local(&self.host)
    }

    /// `user@host` used on the `ssh` command line
    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Local, or remote with an open control connection
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.is_local() || self.control.is_some()
    }

    #[must_use]
    pub fn control_path(&self) -> Option<PathBuf> {
        self.control.as_ref().map(|dir| dir.path().join("ctl"))
    }
}

pub struct Gateway {
    runner: Arc<dyn Runner>,
    ssh: SshOptions,
    dry_run: bool,
}

impl Gateway {
    #[must_use]
    pub fn new(runner: Arc<dyn Runner>, ssh: SshOptions, dry_run: bool) -> Self {
        Self {
            runner,
            ssh,
            dry_run,
        }
    }

    #[must_use]
    pub const fn dry_run(&self) -> bool {
        self.dry_run
    }

    #[must_use]
    pub const fn ssh(&self) -> &SshOptions {
        &self.ssh
    }

    /// Open a session to `host`; the caller must [`close`](Self::close) it
    ///
    /// Local hosts need no connection. Remote hosts get an `ssh` control
    /// master, except under dry-run where nothing is contacted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connectivity`] if the control connection fails
    pub async fn open(&self, host: &str) -> Result<Session> {
        let destination = self.ssh.destination(host);
        if endpoint::is_local(host) || self.dry_run {
            if !endpoint::is_local(host) {
                info!("[dry-run] would connect to {destination}");
            }
            return Ok(Session {
                host: host.to_string(),
                destination,
                control: None,
            });
        }

        let dir = tempfile::Builder::new().prefix("sitehop-ssh-").tempdir()?;
        let control = dir.path().join("ctl");
        let cmd = CommandSpec::new("ssh")
            .args(self.ssh.ssh_args())
            .args(["-o", "ControlMaster=yes", "-o", "ControlPersist=yes", "-o"])
            .arg(format!("ControlPath={}", control.display()))
            .args(["-f", "-N"])
            .arg(destination.as_str());

        let output = self
            .runner
            .exec(&cmd)
            .await
            .map_err(|e| Error::Connectivity {
                host: destination.clone(),
                reason: e.to_string(),
            })?;
        if !output.success() {
            return Err(Error::Connectivity {
                host: destination,
                reason: output.reason(),
            });
        }

        debug!("connected to {destination}");
        Ok(Session {
            host: host.to_string(),
            destination,
            control: Some(dir),
        })
    }

    /// Tear down a session's control connection
    pub async fn close(&self, session: Session) {
        let Some(control) = session.control_path() else {
            return;
        };
        let cmd = CommandSpec::new("ssh")
            .arg("-o")
            .arg(format!("ControlPath={}", control.display()))
            .args(["-O", "exit"])
            .arg(session.destination.as_str());
        match self.runner.exec(&cmd).await {
            Ok(output) if output.success() => debug!("closed session to {}", session.destination),
            Ok(output) => debug!("closing {}: {}", session.destination, output.reason()),
            Err(e) => debug!("closing {}: {e}", session.destination),
        }
    }

    /// The process that runs `command` on the session's host
    #[must_use]
    pub fn wrap(&self, session: &Session, command: &CommandSpec) -> CommandSpec {
        if session.is_local() {
            if command.redirect().is_some() {
                return CommandSpec::new("sh").arg("-c").arg(command.render());
            }
            return command.clone();
        }

        let mut ssh = CommandSpec::new("ssh").args(self.ssh.ssh_args());
        if let Some(control) = session.control_path() {
            ssh = ssh
                .arg("-o")
                .arg(format!("ControlPath={}", control.display()));
        }
        ssh.arg(session.destination.as_str())
            .arg("--")
            .arg(command.render())
    }

    /// `ssh` invocation for `rsync -e`, reusing the session when one is open
    #[must_use]
    pub fn rsync_shell(&self, session: Option<&Session>) -> String {
        let mut ssh = CommandSpec::new("ssh").args(self.ssh.ssh_args());
        if let Some(control) = session.and_then(Session::control_path) {
            ssh = ssh
                .arg("-o")
                .arg(format!("ControlPath={}", control.display()));
        }
        ssh.render()
    }

    /// Run a read-only command, also under dry-run
    ///
    /// Hosts that were not contacted because of dry-run report success
    /// without running anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] if the process cannot be spawned
    pub async fn run(&self, session: &Session, command: &CommandSpec) -> Result<Output> {
        if !session.is_connected() {
            info!("[dry-run] would check on {}: {command}", session.host_label());
            return Ok(Output {
                code: Some(0),
                ..Output::default()
            });
        }
        let process = self.wrap(session, command);
        debug!("{}: {}", session.host_label(), command);
        self.runner
            .exec(&process)
            .await
            .map_err(|e| Error::Command {
                host: session.host_label().to_string(),
                command: command.render(),
                reason: e.to_string(),
            })
    }

    /// True when `command` exits zero
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] if the process cannot be spawned
    pub async fn probe(&self, session: &Session, command: &CommandSpec) -> Result<bool> {
        Ok(self.run(session, command).await?.success())
    }

    /// Run a mutating command; under dry-run only log it
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] if the process fails or exits non-zero
    pub async fn act(&self, session: &Session, command: &CommandSpec) -> Result<Output> {
        if self.dry_run {
            info!("[dry-run] would run on {}: {command}", session.host_label());
            return Ok(Output {
                code: Some(0),
                ..Output::default()
            });
        }
        let output = self.run(session, command).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(Error::Command {
                host: session.host_label().to_string(),
                command: command.render(),
                reason: output.reason(),
            })
        }
    }

    /// Run a mutating process on this machine (e.g. `rsync`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] if the process fails or exits non-zero
    pub async fn act_local(&self, command: &CommandSpec) -> Result<Output> {
        if self.dry_run {
            info!("[dry-run] would run: {command}");
            return Ok(Output {
                code: Some(0),
                ..Output::default()
            });
        }
        debug!("local: {command}");
        let output = self
            .runner
            .exec(command)
            .await
            .map_err(|e| Error::Command {
                host: "local".to_string(),
                command: command.render(),
                reason: e.to_string(),
            })?;
        if output.success() {
            Ok(output)
        } else {
            Err(Error::Command {
                host: "local".to_string(),
                command: command.render(),
                reason: output.reason(),
            })
        }
    }
}

impl Session {
    fn host_label(&self) -> &str {
        if self.is_local() {
            "local"
        } else {
            &self.destination
        }
    }
}
