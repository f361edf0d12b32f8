// ABOUTME: Read-only commands over the configured deployment store.
// ABOUTME: Lists deployments and prints a deployment's log history.

use shipwright::config::Config;
use shipwright::error::{Error, Result};
use shipwright::output::Output;
use shipwright::store::open_store;
use shipwright::types::{DeploymentId, ProjectId};

/// List deployments, oldest first.
pub async fn list(config: &Config, project: Option<String>, output: Output) -> Result<()> {
    let store = open_store(&config.store).await?;
    let project = project.map(ProjectId::new);
    let records = store.list_deployments(project.as_ref()).await?;

    if records.is_empty() {
        output.progress("No deployments recorded");
        return Ok(());
    }

    for record in &records {
        let line = format!(
            "{}  {}  {}  {}  {}",
            record.id,
            record.project_id,
            record.target.name,
            record.version,
            record.status
        );
        output.item(&line, record);
    }
    Ok(())
}

/// Print the log history of one deployment.
pub async fn history(config: &Config, id: String, output: Output) -> Result<()> {
    let store = open_store(&config.store).await?;
    let id = DeploymentId::new(id);

    if store.get_deployment(&id).await?.is_none() {
        return Err(Error::DeploymentNotFound(id.into_inner()));
    }

    for entry in store.get_deployment_history(&id).await? {
        let line = format!(
            "{} [{}] {}",
            entry.timestamp.to_rfc3339(),
            entry.level,
            entry.message
        );
        output.item(&line, &entry);
    }
    Ok(())
}
