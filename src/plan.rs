//! Migration plans: which domain goes from where to where, and when

use crate::error::{Error, Result};
use globset::GlobBuilder;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, btree_map},
    fs,
    path::Path,
};
use tracing::{debug, warn};

/// Source descriptor used when a plan entry omits `from`
pub const LOCAL: &str = "local";

/// One domain's migration instructions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanEntry {
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_until: Option<String>,
}

/// Entry as written in a plan document, before defaults are applied
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntry {
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default, alias = "delayUntil", alias = "delay_until", alias = "delay-until")]
    delay: Option<String>,
}

/// Domain name → entry; iteration is in domain order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MigrationPlan {
    entries: BTreeMap<String, PlanEntry>,
}

impl MigrationPlan {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry for `domain`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `domain` cannot be used as a
    /// directory name
    pub fn insert(&mut self, domain: impl Into<String>, entry: PlanEntry) -> Result<()> {
        let domain = domain.into();
        validate_domain(&domain)?;
        self.entries.insert(domain, entry);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, domain: &str) -> Option<&PlanEntry> {
        self.entries.get(domain)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, PlanEntry> {
        self.entries.iter()
    }

    /// Fill `delay_until` where an entry has none; never overwrites
    #[must_use]
    pub fn with_default_delay(mut self, delay: Option<&str>) -> Self {
        if let Some(delay) = delay.filter(|d| !d.trim().is_empty()) {
            for entry in self.entries.values_mut() {
                if entry.delay_until.as_deref().is_none_or(|d| d.trim().is_empty()) {
                    entry.delay_until = Some(delay.to_string());
                }
            }
        }
        self
    }

    /// Parse a JSON or YAML plan document
    ///
    /// The format implied by the extension is tried first (`.json` → JSON,
    /// anything else → YAML), then the other one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PlanParse`] if the file cannot be read or neither
    /// format parses, and [`Error::Configuration`] if an entry has no
    /// target and `default_target` is `None`
    pub fn from_document(path: &Path, default_target: Option<&str>) -> Result<Self> {
        let parse_error = |reason: String| Error::PlanParse {
            path: path.display().to_string(),
            reason,
        };

        let content = fs::read_to_string(path).map_err(|e| parse_error(e.to_string()))?;

        let json_first = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let raw = if json_first {
            parse_json(&content).or_else(|json| {
                parse_yaml(&content).map_err(|yaml| format!("json: {json}; yaml: {yaml}"))
            })
        } else {
            parse_yaml(&content).or_else(|yaml| {
                parse_json(&content).map_err(|json| format!("yaml: {yaml}; json: {json}"))
            })
        }
        .map_err(parse_error)?;

        if raw.is_empty() {
            return Err(parse_error("plan has no entries".to_string()));
        }

        let mut plan = Self::new();
        for (domain, entry) in raw {
            let to = non_empty(entry.to)
                .or_else(|| default_target.map(ToString::to_string))
                .ok_or_else(|| {
                    Error::Configuration(format!(
                        "{domain}: no `to` in plan and no default target given"
                    ))
                })?;
            plan.insert(
                domain,
                PlanEntry {
                    from: non_empty(entry.from).unwrap_or_else(|| LOCAL.to_string()),
                    to,
                    delay_until: non_empty(entry.delay),
                },
            )?;
        }
        Ok(plan)
    }

    /// One entry per directory under `base` whose name matches `pattern`
    ///
    /// When nothing matches, `pattern` itself is taken as a single domain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the pattern is not a valid glob,
    /// or if it matched nothing and is not usable as a domain
    pub fn from_glob(pattern: &str, target: &str, base: &Path) -> Result<Self> {
        let matcher = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| Error::Configuration(format!("invalid glob {pattern:?}: {e}")))?
            .compile_matcher();

        let entry = || PlanEntry {
            from: LOCAL.to_string(),
            to: target.to_string(),
            delay_until: None,
        };

        let mut plan = Self::new();
        match fs::read_dir(base) {
            Ok(dir) => {
                for item in dir.flatten() {
                    let name = item.file_name();
                    let Some(name) = name.to_str() else {
                        continue;
                    };
                    if name.starts_with('.') && !pattern.starts_with('.') {
                        continue;
                    }
                    if matcher.is_match(name) && item.path().is_dir() {
                        plan.insert(name, entry())?;
                    }
                }
            }
            Err(e) => warn!("cannot read {}: {e}", base.display()),
        }

        if plan.is_empty() {
            debug!("{pattern} matched no directory under {}, using it as a domain", base.display());
            plan.insert(pattern, entry())?;
        }
        Ok(plan)
    }
}

impl<'a> IntoIterator for &'a MigrationPlan {
    type Item = (&'a String, &'a PlanEntry);
    type IntoIter = btree_map::Iter<'a, String, PlanEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn parse_json(content: &str) -> std::result::Result<BTreeMap<String, RawEntry>, String> {
    serde_json::from_str(content).map_err(|e| e.to_string())
}

fn parse_yaml(content: &str) -> std::result::Result<BTreeMap<String, RawEntry>, String> {
    serde_yaml::from_str::<Option<BTreeMap<String, RawEntry>>>(content)
        .map(Option::unwrap_or_default)
        .map_err(|e| e.to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_domain(domain: &str) -> Result<()> {
    if domain.is_empty() || domain == "." || domain == ".." || domain.contains('/') {
        return Err(Error::Configuration(format!(
            "invalid domain {domain:?}: must be a single directory name"
        )));
    }
    Ok(())
}
