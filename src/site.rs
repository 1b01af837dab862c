use crate::{
    config::MigrateConfig,
    endpoint::{self, Endpoint},
    plan::PlanEntry,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A plan entry with hosts split out and paths resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSite {
    pub domain: String,
    pub source_host: String,
    /// Site directory on the source host
    pub source_path: PathBuf,
    pub target_host: String,
    /// Root on the target, or the site directory when given explicitly
    pub target_path: PathBuf,
}

impl ResolvedSite {
    #[must_use]
    pub fn resolve(domain: &str, entry: &PlanEntry, config: &MigrateConfig) -> Self {
        let from = Endpoint::parse(&entry.from);
        let to = Endpoint::parse(&entry.to);

        let target_path = if to.path.is_empty() {
            config.target_path.clone()
        } else {
            endpoint::resolve_site_path(&to.path, domain, &config.target_path)
        };

        Self {
            domain: domain.to_string(),
            source_host: from.host,
            source_path: endpoint::resolve_site_path(&from.path, domain, &config.base_path),
            target_host: to.host,
            target_path,
        }
    }

    /// Site directory on the target host
    #[must_use]
    pub fn target_site_path(&self) -> PathBuf {
        if self.target_path.file_name().is_some_and(|n| n == self.domain.as_str()) {
            self.target_path.clone()
        } else {
            self.target_path.join(&self.domain)
        }
    }

    #[must_use]
    pub fn source_is_local(&self) -> bool {
        endpoint::is_local(&self.source_host)
    }

    #[must_use]
    pub fn target_is_local(&self) -> bool {
        endpoint::is_local(&self.target_host)
    }

    /// Source and target are the same directory on the same host
    #[must_use]
    pub fn targets_source(&self) -> bool {
        let same_host = (self.source_is_local() && self.target_is_local())
            || endpoint::host_only(&self.source_host)
                .eq_ignore_ascii_case(endpoint::host_only(&self.target_host));
        same_host && self.source_path == self.target_site_path()
    }

    /// Host to look up for the DNS record, without any `user@`
    #[must_use]
    pub fn target_host_only(&self) -> &str {
        endpoint::host_only(&self.target_host)
    }
}

/// `host:path` as understood by rsync, or the bare path when local
#[must_use]
pub fn rsync_location(destination: &str, local: bool, path: &Path, trailing_slash: bool) -> String {
    let mut path = path.display().to_string();
    if trailing_slash && !path.ends_with('/') {
        path.push('/');
    }
    if local {
        path
    } else {
        format!("{destination}:{path}")
    }
}
