use std::{path::PathBuf, str::FromStr, time::Duration};

/// Default root holding one directory per site
pub const DEFAULT_BASE_PATH: &str = "/var/opt";

/// Where the plan comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanSource {
    /// Structured plan document (JSON or YAML)
    Document(PathBuf),
    /// Directory-name glob under the base path, all going to `target`
    Glob { pattern: String, target: String },
}

/// Secure-shell connection parameters shared by every remote call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshOptions {
    pub user: Option<String>,
    pub port: u16,
    pub key: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            user: None,
            port: 22,
            key: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl SshOptions {
    /// Options common to `ssh` invocations and to `rsync -e`
    #[must_use]
    pub fn ssh_args(&self) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            self.port.to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.timeout.as_secs().max(1)),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
        ];
        if let Some(key) = &self.key {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        args
    }

    /// Prefix `host` with the configured user unless it already carries one
    #[must_use]
    pub fn destination(&self, host: &str) -> String {
        match &self.user {
            Some(user) if !host.contains('@') => format!("{user}@{host}"),
            _ => host.to_string(),
        }
    }
}

/// Compression used when archiving a site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionKind {
    #[default]
    Gzip,
    Zstd,
}

impl FromStr for CompressionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gzip" | "gz" | "tgz" => Ok(Self::Gzip),
            "zstd" | "zst" => Ok(Self::Zstd),
            _ => Err(format!("Unsupported compression kind: {s}")),
        }
    }
}

impl CompressionKind {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Gzip => "tar.gz",
            Self::Zstd => "tar.zst",
        }
    }

    /// `tar` flag selecting the compressor
    #[must_use]
    pub const fn tar_flag(self) -> &'static str {
        match self {
            Self::Gzip => "--gzip",
            Self::Zstd => "--zstd",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// Archive root; `None` disables the archive step
    pub dir: Option<PathBuf>,
    pub timestamp: bool,
    pub compress: bool,
    pub compression: CompressionKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    pub enabled: bool,
    pub force: bool,
}

/// DNS provider credentials
#[derive(Clone, PartialEq, Eq)]
pub enum DnsCredentials {
    Token(String),
    Key { email: String, key: String },
}

impl std::fmt::Debug for DnsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token(_) => f.write_str("Token(***)"),
            Self::Key { email, .. } => write!(f, "Key {{ email: {email}, key: *** }}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsOptions {
    pub enabled: bool,
    pub credentials: Option<DnsCredentials>,
    pub ttl: u32,
    pub proxied: bool,
    pub timeout: Duration,
}

impl Default for DnsOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            credentials: None,
            ttl: 120,
            proxied: true,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Everything a migration run needs, built once and passed down
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateConfig {
    pub source: PlanSource,
    /// Fallback target when a plan entry omits `to`
    pub default_target: Option<String>,
    pub base_path: PathBuf,
    /// Root on the target under which site directories land
    pub target_path: PathBuf,
    pub dry_run: bool,
    pub dump: bool,
    pub delay_until: Option<String>,
    pub archive: ArchiveOptions,
    pub delete: DeleteOptions,
    pub dns: DnsOptions,
    pub ssh: SshOptions,
}

impl MigrateConfig {
    #[must_use]
    pub fn new(source: PlanSource) -> Self {
        let default_target = match &source {
            PlanSource::Glob { target, .. } => Some(target.clone()),
            PlanSource::Document(_) => None,
        };
        Self {
            source,
            default_target,
            base_path: PathBuf::from(DEFAULT_BASE_PATH),
            target_path: PathBuf::from(DEFAULT_BASE_PATH),
            dry_run: false,
            dump: true,
            delay_until: None,
            archive: ArchiveOptions::default(),
            delete: DeleteOptions::default(),
            dns: DnsOptions::default(),
            ssh: SshOptions::default(),
        }
    }
}
