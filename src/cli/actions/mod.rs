mod run;

use crate::config::MigrateConfig;

/// Action enum representing each possible command
#[derive(Debug)]
pub enum Action {
    Migrate { config: MigrateConfig, json: bool },
}

impl Action {
    /// Execute the action
    ///
    /// # Errors
    ///
    /// Returns an error if the action cannot start, e.g. the plan cannot be
    /// built; failures of single domains are reported, not returned
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
