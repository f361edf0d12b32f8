// ABOUTME: Deployment engine driving records through the lifecycle state machine.
// ABOUTME: Persists every transition, delegates provisioning to providers, and emits events.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

use crate::diagnostics::{Diagnostics, Warning};
use crate::events::{EventBus, Subscriber};
use crate::store::DeploymentStore;
use crate::types::DeploymentId;

use super::error::DeployError;
use super::events::DeploymentEvent;
use super::provider::{Builder, Provider, ProviderRegistry};
use super::record::{DeploymentRecord, DeploymentTarget, LogEntry, LogLevel, Project};
use super::status::DeploymentStatus;

/// Result of [`DeploymentEngine::deploy`]. A failed deployment still hands
/// back the record so callers can inspect its status and logs.
pub type DeployResult = Result<DeploymentRecord, (DeploymentRecord, DeployError)>;

const LOG_SOURCE: &str = "engine";

/// Drives deployments from submission to a terminal outcome.
///
/// Persistence failures never surface through the public operations: each
/// save is attempted, failures are logged and collected as diagnostics, and
/// the operation carries on. Only the causal error (build, provider, illegal
/// state) is returned.
pub struct DeploymentEngine {
    store: Arc<dyn DeploymentStore>,
    builder: Arc<dyn Builder>,
    providers: ProviderRegistry,
    events: EventBus<DeploymentEvent>,
    active: Mutex<HashSet<DeploymentId>>,
    diagnostics: Mutex<Diagnostics>,
}

impl std::fmt::Debug for DeploymentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentEngine")
            .field("store", &self.store.kind())
            .field("providers", &self.providers)
            .field("events", &self.events)
            .finish()
    }
}

impl DeploymentEngine {
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        builder: Arc<dyn Builder>,
        providers: ProviderRegistry,
    ) -> Self {
        Self {
            store,
            builder,
            providers,
            events: EventBus::default(),
            active: Mutex::new(HashSet::new()),
            diagnostics: Mutex::new(Diagnostics::default()),
        }
    }

    /// Register an event subscriber. Subscribers run synchronously, in
    /// registration order, after each state mutation.
    pub fn subscribe(&mut self, subscriber: Arc<dyn Subscriber<DeploymentEvent>>) {
        self.events.subscribe(subscriber);
    }

    pub fn store(&self) -> &Arc<dyn DeploymentStore> {
        &self.store
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Whether a deploy or rollback for `id` is currently running.
    pub fn is_active(&self, id: &DeploymentId) -> bool {
        self.active.lock().contains(id)
    }

    pub fn active_deployments(&self) -> Vec<DeploymentId> {
        self.active.lock().iter().cloned().collect()
    }

    /// Non-fatal warnings collected so far (mostly persistence failures).
    pub fn warnings(&self) -> Vec<Warning> {
        self.diagnostics.lock().warnings().to_vec()
    }

    /// Drain the collected warnings.
    pub fn take_warnings(&self) -> Vec<Warning> {
        self.diagnostics.lock().take()
    }

    /// Build and deploy `project` to `target`.
    ///
    /// The returned record is always `success` or `failed` (a concurrent
    /// cancel also ends in `failed`). Its latest state is persisted one final
    /// time regardless of outcome.
    pub async fn deploy(&self, project: &Project, target: DeploymentTarget) -> DeployResult {
        let mut record = DeploymentRecord::new(project, target);
        self.active.lock().insert(record.id.clone());
        self.emit(DeploymentEvent::DeploymentStarted {
            id: record.id.clone(),
        });

        let requested = format!(
            "Deployment of {} {} to {} requested",
            project.name, project.version, record.target.name
        );
        self.log(&mut record, LogLevel::Info, requested);
        self.persist(&record).await;

        let outcome = self.run_pipeline(project, &mut record).await;

        self.active.lock().remove(&record.id);
        self.persist(&record).await;

        match outcome {
            Ok(()) => Ok(record),
            Err(e) => Err((record, e)),
        }
    }

    async fn run_pipeline(
        &self,
        project: &Project,
        record: &mut DeploymentRecord,
    ) -> Result<(), DeployError> {
        self.transition(record, DeploymentStatus::Building).await?;

        let build = self.builder.build(project, &record.target).await;
        self.ensure_not_cancelled(record).await?;
        record.build_result = Some(build.clone());

        if !build.success {
            let message = build
                .error
                .unwrap_or_else(|| "build reported failure".to_string());
            return Err(self.fail(record, DeployError::BuildFailed(message)).await);
        }
        self.log(
            record,
            LogLevel::Info,
            format!(
                "Build completed in {:.2}s ({} artifact(s))",
                build.duration.as_secs_f64(),
                build.artifacts.len()
            ),
        );

        self.transition(record, DeploymentStatus::Deploying).await?;

        let Some(provider) = self.providers.get(record.target.target_type) else {
            let err = DeployError::ProviderNotFound(record.target.target_type);
            return Err(self.fail(record, err).await);
        };

        let result = provider.deploy(record).await;
        self.ensure_not_cancelled(record).await?;

        match result {
            Ok(deployment) if deployment.success => {
                let from = self.apply_status(record, DeploymentStatus::Success)?;
                self.log(record, LogLevel::Info, "Deployment successful");
                if let Some(url) = &deployment.url {
                    self.log(record, LogLevel::Info, format!("Available at {url}"));
                }
                self.persist(record).await;
                self.emit_status(record, from);
                self.emit(DeploymentEvent::DeploymentCompleted {
                    id: record.id.clone(),
                    url: deployment.url,
                });
                Ok(())
            }
            Ok(deployment) => {
                let message = deployment
                    .error
                    .unwrap_or_else(|| "provider reported failure".to_string());
                Err(self.fail(record, DeployError::DeployFailed(message)).await)
            }
            Err(e) => Err(self.fail(record, DeployError::DeployFailed(e.to_string())).await),
        }
    }

    /// Roll `record` back to `target_version`.
    ///
    /// On provider failure the record is left in `rolling_back`; an incomplete
    /// rollback needs operator attention and is not reset automatically.
    pub async fn rollback(
        &self,
        record: &mut DeploymentRecord,
        target_version: &str,
    ) -> Result<(), DeployError> {
        if self.is_active(&record.id) || !record.status.can_roll_back() {
            return Err(DeployError::invalid_state(
                &record.id,
                record.status,
                "roll back",
            ));
        }
        let provider = self.provider_for(record)?;

        self.active.lock().insert(record.id.clone());
        let outcome = self.run_rollback(provider.as_ref(), record, target_version).await;
        self.active.lock().remove(&record.id);
        outcome
    }

    async fn run_rollback(
        &self,
        provider: &dyn Provider,
        record: &mut DeploymentRecord,
        target_version: &str,
    ) -> Result<(), DeployError> {
        self.transition(record, DeploymentStatus::RollingBack).await?;
        let message = format!("Rolling back from {} to {}", record.version, target_version);
        self.log(record, LogLevel::Info, message);

        let result = provider.rollback(&record.id, target_version).await;
        self.ensure_not_cancelled(record).await?;

        match result {
            Ok(()) => {
                let from_version = std::mem::replace(&mut record.version, target_version.to_string());
                record.rollback_from = Some(from_version.clone());
                let from = self.apply_status(record, DeploymentStatus::RolledBack)?;
                self.log(
                    record,
                    LogLevel::Info,
                    format!("Rolled back to {target_version}"),
                );
                self.persist(record).await;
                self.emit_status(record, from);
                self.emit(DeploymentEvent::RollbackCompleted {
                    id: record.id.clone(),
                    from_version,
                    to_version: target_version.to_string(),
                });
                Ok(())
            }
            Err(e) => {
                let err = DeployError::RollbackFailed(e.to_string());
                self.log(record, LogLevel::Error, format!("Rollback failed: {e}"));
                self.persist(record).await;
                self.emit(DeploymentEvent::RollbackFailed {
                    id: record.id.clone(),
                    error: e.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Refresh `record` from its provider and return the local status.
    ///
    /// Best effort: provider errors are swallowed and the last known status
    /// is returned. A remote report never moves a terminal record back into a
    /// non-terminal status.
    pub async fn get_status(&self, record: &mut DeploymentRecord) -> DeploymentStatus {
        let Some(provider) = self.providers.get(record.target.target_type) else {
            return record.status;
        };

        match provider.status(&record.id).await {
            Ok(remote) if remote != record.status => {
                if record.status.is_terminal() && !remote.is_terminal() {
                    tracing::warn!(
                        "ignoring remote status {} for terminal deployment {} ({})",
                        remote,
                        record.id,
                        record.status
                    );
                } else {
                    let from = record.status;
                    record.status = remote;
                    if remote.is_terminal() && record.completed_at.is_none() {
                        record.completed_at = Some(Utc::now());
                    }
                    self.persist(record).await;
                    self.emit_status(record, from);
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("status query for {} failed: {}", record.id, e);
            }
        }
        record.status
    }

    /// Force a non-terminal deployment to `failed`.
    ///
    /// Cooperative: an in-flight provider call is not interrupted, but the
    /// deploy driving it stops transitioning once it notices the cancel. The
    /// record stays in the store.
    pub async fn cancel_deployment(&self, record: &mut DeploymentRecord) -> Result<(), DeployError> {
        if record.status.is_terminal() {
            return Err(DeployError::invalid_state(&record.id, record.status, "cancel"));
        }

        let from = record.status;
        record.status = DeploymentStatus::Failed;
        record.completed_at = Some(Utc::now());
        self.log(record, LogLevel::Warn, "Deployment cancelled");
        self.active.lock().remove(&record.id);

        self.persist(record).await;
        self.emit_status(record, from);
        self.emit(DeploymentEvent::DeploymentCancelled {
            id: record.id.clone(),
        });
        Ok(())
    }

    fn provider_for(&self, record: &DeploymentRecord) -> Result<Arc<dyn Provider>, DeployError> {
        self.providers
            .get(record.target.target_type)
            .ok_or(DeployError::ProviderNotFound(record.target.target_type))
    }

    /// Check for a cancel issued while we were suspended. When one happened,
    /// adopt the cancelled state so the final save does not resurrect it.
    async fn ensure_not_cancelled(&self, record: &mut DeploymentRecord) -> Result<(), DeployError> {
        if self.is_active(&record.id) {
            return Ok(());
        }

        match self.store.get_deployment(&record.id).await {
            Ok(Some(stored)) if stored.is_terminal() => *record = stored,
            Ok(_) | Err(_) => {
                if !record.status.is_terminal() {
                    record.status = DeploymentStatus::Failed;
                    record.completed_at.get_or_insert_with(Utc::now);
                    self.log(record, LogLevel::Warn, "Deployment cancelled");
                }
            }
        }
        Err(DeployError::Cancelled(record.id.clone()))
    }

    /// Mark `record` failed because of `err`, persist, and hand `err` back.
    async fn fail(&self, record: &mut DeploymentRecord, err: DeployError) -> DeployError {
        let from = record.status;
        record.status = DeploymentStatus::Failed;
        record.completed_at.get_or_insert_with(Utc::now);
        let message = match &err {
            DeployError::BuildFailed(msg) => format!("Build failed: {msg}"),
            other => format!("Deployment failed: {other}"),
        };
        self.log(record, LogLevel::Error, message);

        self.persist(record).await;
        self.emit_status(record, from);
        self.emit(DeploymentEvent::DeploymentFailed {
            id: record.id.clone(),
            error: err.to_string(),
        });
        err
    }

    /// Change status in memory after checking the transition table.
    fn apply_status(
        &self,
        record: &mut DeploymentRecord,
        next: DeploymentStatus,
    ) -> Result<DeploymentStatus, DeployError> {
        let from = record.status;
        if !from.can_transition_to(next) {
            return Err(DeployError::invalid_state(&record.id, from, "transition"));
        }

        record.status = next;
        let now = Utc::now();
        if next == DeploymentStatus::Building {
            record.started_at.get_or_insert(now);
        }
        if next.is_terminal() {
            record.completed_at.get_or_insert(now);
        }
        Ok(from)
    }

    /// Apply, persist, and announce a status change.
    async fn transition(
        &self,
        record: &mut DeploymentRecord,
        next: DeploymentStatus,
    ) -> Result<(), DeployError> {
        let from = self.apply_status(record, next)?;
        tracing::debug!("deployment {}: {} -> {}", record.id, from, next);
        self.persist(record).await;
        self.emit_status(record, from);
        Ok(())
    }

    fn log(&self, record: &mut DeploymentRecord, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry::new(level, message, record.next_log_timestamp()).with_source(LOG_SOURCE);
        match level {
            LogLevel::Error => tracing::error!("deployment {}: {}", record.id, entry.message),
            LogLevel::Warn => tracing::warn!("deployment {}: {}", record.id, entry.message),
            LogLevel::Info => tracing::info!("deployment {}: {}", record.id, entry.message),
            LogLevel::Debug => tracing::debug!("deployment {}: {}", record.id, entry.message),
        }
        record.logs.push(entry.clone());
        self.emit(DeploymentEvent::LogAdded {
            id: record.id.clone(),
            entry,
        });
    }

    /// Save `record`, recording a warning on failure. Returns whether it stuck.
    async fn persist(&self, record: &DeploymentRecord) -> bool {
        match self.store.save_deployment(record).await {
            Ok(()) => true,
            Err(e) => {
                self.diagnostics.lock().warn(Warning::persistence(format!(
                    "failed to persist deployment {} ({}): {}",
                    record.id, record.status, e
                )));
                false
            }
        }
    }

    fn emit_status(&self, record: &DeploymentRecord, from: DeploymentStatus) {
        self.emit(DeploymentEvent::StatusUpdated {
            id: record.id.clone(),
            from,
            to: record.status,
        });
    }

    fn emit(&self, event: DeploymentEvent) {
        self.events.publish(&event);
    }
}
