use std::fmt;

/// Errors surfaced by the migration library
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or missing settings; aborts the run before any domain is touched
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid schedule format: {0:?}")]
    InvalidScheduleFormat(String),

    #[error("failed to parse plan {path}: {reason}")]
    PlanParse { path: String, reason: String },

    #[error("cannot connect to {host}: {reason}")]
    Connectivity { host: String, reason: String },

    #[error("transfer failed ({what}): {reason}")]
    Transfer { what: String, reason: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("command `{command}` failed on {host}: {reason}")]
    Command {
        host: String,
        command: String,
        reason: String,
    },

    #[error("dns: {0}")]
    Dns(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The step a domain was in when something went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Schedule,
    Preflight,
    Connect,
    Dump,
    Stage,
    Ship,
    Dns,
    Archive,
    Delete,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Schedule => "schedule",
            Self::Preflight => "preflight",
            Self::Connect => "connect",
            Self::Dump => "dump",
            Self::Stage => "stage",
            Self::Ship => "ship",
            Self::Dns => "dns",
            Self::Archive => "archive",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// An error tagged with the stage that produced it
#[derive(Debug)]
pub struct StageError {
    pub stage: Stage,
    pub source: Error,
}

impl StageError {
    #[must_use]
    pub const fn new(stage: Stage, source: Error) -> Self {
        Self { stage, source }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.source)
    }
}

impl std::error::Error for StageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Attach a stage to a library result
pub trait StageExt<T> {
    /// # Errors
    ///
    /// Returns the original error wrapped with `stage`
    fn at(self, stage: Stage) -> std::result::Result<T, StageError>;
}

impl<T> StageExt<T> for Result<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageError> {
        self.map_err(|e| StageError::new(stage, e))
    }
}
