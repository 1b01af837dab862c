#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use sitehop::{
    config::{MigrateConfig, PlanSource},
    dns::{ARecord, DnsProvider},
    gateway::{CommandSpec, Gateway, Output, Runner},
    plan::{MigrationPlan, PlanEntry},
    steps::Confirm,
};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tempfile::TempDir;

/// Runner that emulates the commands a migration issues
///
/// Local `test`, `cat`, `mkdir -p` and `mv` act on the real filesystem so
/// preflight and archive behave as on a host; `ssh` and `rsync` succeed
/// unless told otherwise.
#[derive(Default)]
pub struct Scripted {
    pub calls: Mutex<Vec<CommandSpec>>,
    /// Domains whose shipping rsync exits 23
    pub fail_ship: Vec<String>,
    /// Hosts whose ssh control connection is refused
    pub unreachable: Vec<String>,
}

impl Scripted {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| c.program().to_string())
            .collect()
    }

    fn local(command: &CommandSpec) -> Output {
        let args = command.get_args();
        let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or_default();
        let code = match command.program() {
            "test" => {
                let path = Path::new(arg(1));
                let ok = match arg(0) {
                    "-d" => path.is_dir(),
                    "-f" => path.is_file(),
                    _ => path.exists(),
                };
                i32::from(!ok)
            }
            "cat" => {
                return match fs::read_to_string(arg(0)) {
                    Ok(stdout) => Output {
                        code: Some(0),
                        stdout,
                        stderr: String::new(),
                    },
                    Err(e) => failure(1, &format!("cat: {}: {e}", arg(0))),
                };
            }
            "mkdir" | "mv" => {
                let operands: Vec<&str> = args
                    .iter()
                    .map(String::as_str)
                    .filter(|a| !a.starts_with('-'))
                    .collect();
                let done = match (command.program(), operands.as_slice()) {
                    ("mkdir", [dir]) => fs::create_dir_all(dir).is_ok(),
                    ("mv", [from, to]) => fs::rename(from, to).is_ok(),
                    _ => false,
                };
                i32::from(!done)
            }
            // `sh -c '... > file'`: create the redirect target
            "sh" => {
                if let Some((_, target)) = arg(1).rsplit_once(" > ") {
                    fs::write(target.trim_matches('\''), "").unwrap();
                }
                0
            }
            _ => 0,
        };
        Output {
            code: Some(code),
            ..Output::default()
        }
    }
}

fn failure(code: i32, stderr: &str) -> Output {
    Output {
        code: Some(code),
        stdout: String::new(),
        stderr: format!("{stderr}\n"),
    }
}

#[async_trait::async_trait]
impl Runner for Scripted {
    async fn exec(&self, command: &CommandSpec) -> std::io::Result<Output> {
        self.calls.lock().unwrap().push(command.clone());
        let args = command.get_args();

        match command.program() {
            "rsync" => {
                let shipping = args.iter().any(|a| a == "--mkpath");
                let failing = self
                    .fail_ship
                    .iter()
                    .any(|domain| args.iter().any(|a| a.contains(domain.as_str())));
                if shipping && failing {
                    return Ok(failure(
                        23,
                        "rsync error: some files/attrs were not transferred (code 23)",
                    ));
                }
                Ok(Output {
                    code: Some(0),
                    ..Output::default()
                })
            }
            "ssh" => {
                let opening = args.iter().any(|a| a == "ControlMaster=yes");
                let host = args.last().map(String::as_str).unwrap_or_default();
                if opening && self.unreachable.iter().any(|h| h == host) {
                    return Ok(failure(
                        255,
                        &format!("ssh: connect to host {host} port 22: Connection refused"),
                    ));
                }
                Ok(Output {
                    code: Some(0),
                    ..Output::default()
                })
            }
            _ => Ok(Self::local(command)),
        }
    }
}

/// Records every update, answers for a fixed zone
#[derive(Default)]
pub struct FakeDns {
    pub updates: Mutex<Vec<ARecord>>,
}

#[async_trait::async_trait]
impl DnsProvider for FakeDns {
    async fn zone_id(&self, name: &str) -> sitehop::Result<Option<String>> {
        Ok((name == "example.com").then(|| "zone-1".to_string()))
    }

    async fn record_id(&self, _zone: &str, name: &str) -> sitehop::Result<Option<String>> {
        Ok(Some(format!("record-{name}")))
    }

    async fn update_a(&self, _zone: &str, _record: &str, update: &ARecord) -> sitehop::Result<()> {
        self.updates.lock().unwrap().push(update.clone());
        Ok(())
    }
}

pub struct Answer(pub bool);

#[async_trait::async_trait]
impl Confirm for Answer {
    async fn confirm(&self, _prompt: &str) -> bool {
        self.0
    }
}

/// A site root holding the given site directories, each with a compose file
pub fn site_root(domains: &[&str]) -> TempDir {
    let root = tempfile::tempdir().unwrap();
    for domain in domains {
        let dir = root.path().join(domain);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("docker-compose.yml"),
            "services:\n  db:\n    image: mariadb:11\n    environment:\n      MYSQL_DATABASE: wp\n",
        )
        .unwrap();
    }
    root
}

/// Config over `root` with DNS disabled
pub fn config(root: &Path, dry_run: bool) -> MigrateConfig {
    let mut config = MigrateConfig::new(PlanSource::Document(root.join("plan.json")));
    config.base_path = root.to_path_buf();
    config.target_path = PathBuf::from("/var/opt");
    config.dry_run = dry_run;
    config.dns.enabled = false;
    config
}

pub fn gateway(runner: &Arc<Scripted>, config: &MigrateConfig) -> Gateway {
    Gateway::new(runner.clone(), config.ssh.clone(), config.dry_run)
}

pub fn plan(entries: &[(&str, &str, &str)]) -> MigrationPlan {
    let mut plan = MigrationPlan::new();
    for (domain, from, to) in entries {
        plan.insert(
            *domain,
            PlanEntry {
                from: (*from).to_string(),
                to: (*to).to_string(),
                delay_until: None,
            },
        )
        .unwrap();
    }
    plan
}

pub fn sitehop_binary_path() -> PathBuf {
    env::var_os("CARGO_BIN_EXE_sitehop")
        .map_or_else(|| PathBuf::from("target/debug/sitehop"), PathBuf::from)
}
