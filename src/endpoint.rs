//! `[user@]host[:path]` endpoint descriptors

use std::{
    env,
    path::{Component, Path, PathBuf},
};

/// Parsed endpoint descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Connection part, may carry a `user@` prefix
    pub host: String,
    /// Optional path, empty when the descriptor had none
    pub path: String,
}

impl Endpoint {
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let (host, path) = split(input);
        Self {
            host: host.to_string(),
            path: path.to_string(),
        }
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        is_local(&self.host)
    }
}

/// Split at the first `:`; no IPv6 literal handling
#[must_use]
pub fn split(input: &str) -> (&str, &str) {
    input.split_once(':').unwrap_or((input, ""))
}

/// Strip an optional `user@` prefix
#[must_use]
pub fn host_only(host: &str) -> &str {
    host.rsplit_once('@').map_or(host, |(_, h)| h)
}

/// Empty, `local`, `localhost` and `127.0.0.1` all mean this machine
///
/// A `user@` prefix makes the host remote: `root@localhost` goes through ssh.
#[must_use]
pub fn is_local(host: &str) -> bool {
    host.is_empty()
        || host.eq_ignore_ascii_case("local")
        || host.eq_ignore_ascii_case("localhost")
        || host == "127.0.0.1"
}

/// Directory of `domain` given an optional explicit path
///
/// An empty `path` yields `default_root/domain`. Otherwise `~` is expanded,
/// the path is cleaned and `domain` appended unless it is already the final
/// component.
#[must_use]
pub fn resolve_site_path(path: &str, domain: &str, default_root: &Path) -> PathBuf {
    if path.is_empty() {
        return clean(&default_root.join(domain));
    }

    let cleaned = clean(&expand_home(path));
    if cleaned.file_name().is_some_and(|name| name == domain) {
        cleaned
    } else {
        cleaned.join(domain)
    }
}

fn expand_home(path: &str) -> PathBuf {
    let home = || env::var_os("HOME").map(PathBuf::from);
    if path == "~" {
        if let Some(home) = home() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = home()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

/// Lexically normalize a path: drop `.`, fold `..`, collapse separators
#[must_use]
pub fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
