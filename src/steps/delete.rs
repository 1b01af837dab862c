use crate::{
    error::{Error, Result},
    gateway::{CommandSpec, Gateway, Session},
};
use serde::Serialize;
use std::path::{Component, Path};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::info;

/// Asks the operator a yes/no question
#[async_trait::async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, prompt: &str) -> bool;
}

/// Prompts on stderr, reads the answer from stdin; anything but `y`/`yes` declines
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirm;

#[async_trait::async_trait]
impl Confirm for StdinConfirm {
    async fn confirm(&self, prompt: &str) -> bool {
        ask(BufReader::new(io::stdin()), io::stderr(), prompt).await
    }
}

async fn ask<R, W>(mut reader: R, mut writer: W, prompt: &str) -> bool
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let written = writer.write_all(format!("{prompt} [y/N]: ").as_bytes()).await;
    if written.is_err() || writer.flush().await.is_err() {
        return false;
    }

    let mut answer = String::new();
    if reader.read_line(&mut answer).await.is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// What happened to the source directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteOutcome {
    Deleted,
    /// Dry-run: nothing removed
    Skipped,
    /// The operator answered no
    Declined,
}

/// Remove `path` on the session's host, asking first unless `force`
///
/// # Errors
///
/// Returns an error if `path` is less than two levels deep or `rm` fails
pub async fn delete(
    gateway: &Gateway,
    session: &Session,
    path: &Path,
    force: bool,
    confirm: &dyn Confirm,
) -> Result<DeleteOutcome> {
    let depth = path
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count();
    if depth < 2 || path.file_name().is_none() {
        return Err(Error::Configuration(format!(
            "refusing to delete {}",
            path.display()
        )));
    }

    let command = CommandSpec::new("rm")
        .args(["-rf", "--"])
        .arg(path.display().to_string());

    if gateway.dry_run() {
        info!("[dry-run] would delete {} on {}", path.display(), session.destination());
        return Ok(DeleteOutcome::Skipped);
    }

    if !force {
        let prompt = format!("Delete {} on {}?", path.display(), session.destination());
        if !confirm.confirm(&prompt).await {
            info!("kept {} on {}", path.display(), session.destination());
            return Ok(DeleteOutcome::Declined);
        }
    }

    info!("deleting {} on {}", path.display(), session.destination());
    gateway.act(session, &command).await?;
    Ok(DeleteOutcome::Deleted)
}
