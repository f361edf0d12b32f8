// ABOUTME: Behavior tests for the deployment engine against mock collaborators.
// ABOUTME: Covers the deploy pipeline, cancel, rollback, status refresh, and event isolation.

use async_trait::async_trait;
use parking_lot::Mutex;
use shipwright::deploy::{
    BuildResult, Builder, DeployErrorKind, DeploymentEngine, DeploymentEvent, DeploymentRecord,
    DeploymentStatus, DeploymentTarget, LogEntry, LogLevel, Project, Provider, ProviderDeployment,
    ProviderError, ProviderRegistry, TargetType,
};
use shipwright::diagnostics::WarningKind;
use shipwright::events::SubscriberError;
use shipwright::store::{DeploymentStore, FileStore, StoreError, StoreKind};
use shipwright::types::{DeploymentId, ProjectId};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

fn project() -> Project {
    Project {
        id: ProjectId::new("web"),
        name: "web".to_string(),
        path: PathBuf::from("/srv/web"),
        version: "1.0.0".to_string(),
    }
}

fn docker_target() -> DeploymentTarget {
    DeploymentTarget::new("prod", TargetType::Docker)
}

struct StaticBuilder {
    result: BuildResult,
}

impl StaticBuilder {
    fn ok() -> Arc<Self> {
        Arc::new(Self {
            result: BuildResult::succeeded(vec!["dist/app".into()], Duration::from_millis(40)),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            result: BuildResult::failed(message, Duration::from_millis(5)),
        })
    }
}

#[async_trait]
impl Builder for StaticBuilder {
    async fn build(&self, _: &Project, _: &DeploymentTarget) -> BuildResult {
        self.result.clone()
    }
}

/// Holds the build until the test releases it.
struct GatedBuilder {
    gate: Arc<Notify>,
}

#[async_trait]
impl Builder for GatedBuilder {
    async fn build(&self, _: &Project, _: &DeploymentTarget) -> BuildResult {
        self.gate.notified().await;
        BuildResult::succeeded(Vec::new(), Duration::ZERO)
    }
}

struct MockProvider {
    deploy: ProviderDeployment,
    remote_status: Option<DeploymentStatus>,
    rollback_ok: bool,
}

impl MockProvider {
    fn ok() -> Self {
        Self {
            deploy: ProviderDeployment::succeeded(Some("https://web.example.com".into())),
            remote_status: Some(DeploymentStatus::Success),
            rollback_ok: true,
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn deploy(&self, _: &DeploymentRecord) -> Result<ProviderDeployment, ProviderError> {
        Ok(self.deploy.clone())
    }

    async fn status(&self, id: &DeploymentId) -> Result<DeploymentStatus, ProviderError> {
        self.remote_status
            .ok_or_else(|| ProviderError::Unreachable(format!("no route to {id}")))
    }

    async fn rollback(&self, _: &DeploymentId, version: &str) -> Result<(), ProviderError> {
        if self.rollback_ok {
            Ok(())
        } else {
            Err(ProviderError::Failed(format!("image for {version} is gone")))
        }
    }
}

/// Store whose writes always fail.
struct BrokenStore;

#[async_trait]
impl DeploymentStore for BrokenStore {
    fn kind(&self) -> StoreKind {
        StoreKind::File
    }

    async fn save_deployment(&self, _: &DeploymentRecord) -> Result<(), StoreError> {
        Err(StoreError::Task("disk full".into()))
    }

    async fn get_deployment(&self, _: &DeploymentId) -> Result<Option<DeploymentRecord>, StoreError> {
        Ok(None)
    }

    async fn list_deployments(&self, _: Option<&ProjectId>) -> Result<Vec<DeploymentRecord>, StoreError> {
        Ok(Vec::new())
    }

    async fn append_log(&self, id: &DeploymentId, _: &LogEntry) -> Result<(), StoreError> {
        Err(StoreError::NotFound(id.clone()))
    }

    async fn get_deployment_history(&self, _: &DeploymentId) -> Result<Vec<LogEntry>, StoreError> {
        Ok(Vec::new())
    }
}

struct Harness {
    _dir: TempDir,
    store: Arc<dyn DeploymentStore>,
    engine: DeploymentEngine,
    events: Arc<Mutex<Vec<DeploymentEvent>>>,
}

async fn harness(builder: Arc<dyn Builder>, provider: Option<MockProvider>) -> Harness {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn DeploymentStore> = Arc::new(FileStore::open(dir.path()).await.unwrap());
    let mut providers = ProviderRegistry::new();
    if let Some(provider) = provider {
        providers.register(TargetType::Docker, Arc::new(provider));
    }

    let mut engine = DeploymentEngine::new(store.clone(), builder, providers);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    engine.subscribe(Arc::new(
        move |event: &DeploymentEvent| -> Result<(), SubscriberError> {
            sink.lock().push(event.clone());
            Ok(())
        },
    ));

    Harness {
        _dir: dir,
        store,
        engine,
        events,
    }
}

fn status_changes(events: &[DeploymentEvent]) -> Vec<(DeploymentStatus, DeploymentStatus)> {
    events
        .iter()
        .filter_map(|e| match e {
            DeploymentEvent::StatusUpdated { from, to, .. } => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn successful_deploy_walks_the_pipeline() {
    let h = harness(StaticBuilder::ok(), Some(MockProvider::ok())).await;

    let record = h.engine.deploy(&project(), docker_target()).await.unwrap();

    assert_eq!(record.status, DeploymentStatus::Success);
    assert!(record.started_at.is_some());
    assert!(record.completed_at.is_some());
    assert!(record.build_result.as_ref().is_some_and(|b| b.success));
    assert_eq!(record.logs[0].message, "Deployment of web 1.0.0 to prod requested");
    assert!(record.logs.iter().any(|l| l.message.contains("https://web.example.com")));
    assert!(!h.engine.is_active(&record.id));

    use DeploymentStatus::*;
    assert_eq!(
        status_changes(&h.events.lock()),
        vec![(Pending, Building), (Building, Deploying), (Deploying, Success)]
    );

    let stored = h.store.get_deployment(&record.id).await.unwrap().unwrap();
    assert_eq!(stored, record);
}

#[tokio::test]
async fn deploy_events_start_and_complete() {
    let h = harness(StaticBuilder::ok(), Some(MockProvider::ok())).await;

    let record = h.engine.deploy(&project(), docker_target()).await.unwrap();

    let events = h.events.lock();
    assert_eq!(
        events.first(),
        Some(&DeploymentEvent::DeploymentStarted { id: record.id.clone() })
    );
    assert!(events.contains(&DeploymentEvent::DeploymentCompleted {
        id: record.id.clone(),
        url: Some("https://web.example.com".into()),
    }));
    assert!(events.iter().all(|e| e.deployment_id() == &record.id));
}

#[tokio::test]
async fn build_failure_marks_record_failed() {
    let h = harness(StaticBuilder::failing("missing semicolon"), Some(MockProvider::ok())).await;

    let (record, err) = h.engine.deploy(&project(), docker_target()).await.unwrap_err();

    assert_eq!(err.kind(), DeployErrorKind::BuildFailed);
    assert_eq!(record.status, DeploymentStatus::Failed);
    assert!(record.completed_at.is_some());
    assert!(
        record
            .logs
            .iter()
            .any(|l| l.level == LogLevel::Error && l.message.contains("missing semicolon"))
    );

    let stored = h.store.get_deployment(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DeploymentStatus::Failed);
}

#[tokio::test]
async fn provider_failure_marks_record_failed() {
    let provider = MockProvider {
        deploy: ProviderDeployment::failed("quota exceeded"),
        ..MockProvider::ok()
    };
    let h = harness(StaticBuilder::ok(), Some(provider)).await;

    let (record, err) = h.engine.deploy(&project(), docker_target()).await.unwrap_err();

    assert_eq!(err.kind(), DeployErrorKind::DeployFailed);
    assert!(err.to_string().contains("quota exceeded"));
    assert_eq!(record.status, DeploymentStatus::Failed);
    assert!(
        h.events
            .lock()
            .iter()
            .any(|e| matches!(e, DeploymentEvent::DeploymentFailed { .. }))
    );
}

#[tokio::test]
async fn unknown_target_type_fails_without_leaving_record_in_flight() {
    let h = harness(StaticBuilder::ok(), None).await;

    let (record, err) = h.engine.deploy(&project(), docker_target()).await.unwrap_err();

    assert_eq!(err.kind(), DeployErrorKind::ProviderNotFound);
    assert_eq!(record.status, DeploymentStatus::Failed);
    let stored = h.store.get_deployment(&record.id).await.unwrap().unwrap();
    assert!(!stored.status.is_in_flight());
}

#[tokio::test]
async fn cancel_of_finished_deployment_is_rejected() {
    let h = harness(StaticBuilder::ok(), Some(MockProvider::ok())).await;
    let mut record = h.engine.deploy(&project(), docker_target()).await.unwrap();
    let before = record.clone();

    let err = h.engine.cancel_deployment(&mut record).await.unwrap_err();

    assert_eq!(err.kind(), DeployErrorKind::InvalidState);
    assert_eq!(record, before);
}

#[tokio::test]
async fn cancel_of_pending_deployment_fails_it() {
    let h = harness(StaticBuilder::ok(), Some(MockProvider::ok())).await;
    let mut record = DeploymentRecord::new(&project(), docker_target());
    h.store.save_deployment(&record).await.unwrap();

    h.engine.cancel_deployment(&mut record).await.unwrap();

    assert_eq!(record.status, DeploymentStatus::Failed);
    assert!(record.completed_at.is_some());
    assert_eq!(record.logs.last().map(|l| l.level), Some(LogLevel::Warn));
    let stored = h.store.get_deployment(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DeploymentStatus::Failed);
    assert!(
        h.events
            .lock()
            .contains(&DeploymentEvent::DeploymentCancelled { id: record.id.clone() })
    );
}

#[tokio::test]
async fn cancel_during_build_stops_the_pipeline() {
    let gate = Arc::new(Notify::new());
    let h = harness(
        Arc::new(GatedBuilder { gate: gate.clone() }),
        Some(MockProvider::ok()),
    )
    .await;
    let engine = Arc::new(h.engine);

    let running = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.deploy(&project(), docker_target()).await })
    };

    let id = loop {
        if let Some(id) = engine.active_deployments().pop() {
            break id;
        }
        tokio::task::yield_now().await;
    };
    let mut record = loop {
        if let Some(rec) = h.store.get_deployment(&id).await.unwrap()
            && rec.status == DeploymentStatus::Building
        {
            break rec;
        }
        tokio::task::yield_now().await;
    };

    engine.cancel_deployment(&mut record).await.unwrap();
    gate.notify_one();

    let (finished, err) = running.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), DeployErrorKind::Cancelled);
    assert_eq!(finished.status, DeploymentStatus::Failed);
    let stored = h.store.get_deployment(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, DeploymentStatus::Failed);
    assert!(!engine.is_active(&id));
}

#[tokio::test]
async fn rollback_restores_previous_version() {
    let h = harness(StaticBuilder::ok(), Some(MockProvider::ok())).await;
    let mut record = h.engine.deploy(&project(), docker_target()).await.unwrap();

    h.engine.rollback(&mut record, "0.9.0").await.unwrap();

    assert_eq!(record.status, DeploymentStatus::RolledBack);
    assert_eq!(record.version, "0.9.0");
    assert_eq!(record.rollback_from.as_deref(), Some("1.0.0"));
    assert!(h.events.lock().contains(&DeploymentEvent::RollbackCompleted {
        id: record.id.clone(),
        from_version: "1.0.0".into(),
        to_version: "0.9.0".into(),
    }));

    let stored = h.store.get_deployment(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DeploymentStatus::RolledBack);
}

#[tokio::test]
async fn failed_rollback_stays_rolling_back() {
    let provider = MockProvider {
        rollback_ok: false,
        ..MockProvider::ok()
    };
    let h = harness(StaticBuilder::ok(), Some(provider)).await;
    let mut record = h.engine.deploy(&project(), docker_target()).await.unwrap();

    let err = h.engine.rollback(&mut record, "0.9.0").await.unwrap_err();

    assert_eq!(err.kind(), DeployErrorKind::RollbackFailed);
    assert_eq!(record.status, DeploymentStatus::RollingBack);
    assert_eq!(record.version, "1.0.0");
    assert_eq!(record.logs.last().map(|l| l.level), Some(LogLevel::Error));
}

#[tokio::test]
async fn rollback_of_in_flight_record_is_rejected() {
    let h = harness(StaticBuilder::ok(), Some(MockProvider::ok())).await;
    let mut record = DeploymentRecord::new(&project(), docker_target());

    let err = h.engine.rollback(&mut record, "0.9.0").await.unwrap_err();

    assert_eq!(err.kind(), DeployErrorKind::InvalidState);
    assert_eq!(record.status, DeploymentStatus::Pending);
}

#[tokio::test]
async fn get_status_adopts_remote_status() {
    let provider = MockProvider {
        remote_status: Some(DeploymentStatus::Failed),
        ..MockProvider::ok()
    };
    let h = harness(StaticBuilder::ok(), Some(provider)).await;
    let mut record = DeploymentRecord::new(&project(), docker_target());
    record.status = DeploymentStatus::Deploying;

    let status = h.engine.get_status(&mut record).await;

    assert_eq!(status, DeploymentStatus::Failed);
    assert_eq!(record.status, DeploymentStatus::Failed);
    assert!(record.completed_at.is_some());
    let stored = h.store.get_deployment(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DeploymentStatus::Failed);
}

#[tokio::test]
async fn get_status_never_reopens_a_finished_record() {
    let provider = MockProvider {
        remote_status: Some(DeploymentStatus::Building),
        ..MockProvider::ok()
    };
    let h = harness(StaticBuilder::ok(), Some(provider)).await;
    let mut record = h.engine.deploy(&project(), docker_target()).await.unwrap();

    assert_eq!(h.engine.get_status(&mut record).await, DeploymentStatus::Success);
}

#[tokio::test]
async fn get_status_swallows_provider_errors() {
    let provider = MockProvider {
        remote_status: None,
        ..MockProvider::ok()
    };
    let h = harness(StaticBuilder::ok(), Some(provider)).await;
    let mut record = DeploymentRecord::new(&project(), docker_target());
    record.status = DeploymentStatus::Deploying;

    assert_eq!(h.engine.get_status(&mut record).await, DeploymentStatus::Deploying);
}

#[tokio::test]
async fn failing_subscribers_do_not_disturb_others() {
    let mut h = harness(StaticBuilder::ok(), Some(MockProvider::ok())).await;
    h.engine.subscribe(Arc::new(
        |_: &DeploymentEvent| -> Result<(), SubscriberError> { Err(SubscriberError::new("nope")) },
    ));
    h.engine.subscribe(Arc::new(
        |_: &DeploymentEvent| -> Result<(), SubscriberError> { panic!("subscriber blew up") },
    ));

    let record = h.engine.deploy(&project(), docker_target()).await.unwrap();

    assert_eq!(record.status, DeploymentStatus::Success);
    assert_eq!(status_changes(&h.events.lock()).len(), 3);
}

#[tokio::test]
async fn persistence_failures_become_warnings() {
    let providers = ProviderRegistry::new().with(TargetType::Docker, Arc::new(MockProvider::ok()));
    let engine = DeploymentEngine::new(Arc::new(BrokenStore), StaticBuilder::ok(), providers);

    let record = engine.deploy(&project(), docker_target()).await.unwrap();

    assert_eq!(record.status, DeploymentStatus::Success);
    let warnings = engine.warnings();
    assert!(!warnings.is_empty());
    assert!(warnings.iter().all(|w| w.kind == WarningKind::Persistence));
}

fn broken_store_engine(builder: Arc<dyn Builder>, provider: MockProvider) -> DeploymentEngine {
    let providers = ProviderRegistry::new().with(TargetType::Docker, Arc::new(provider));
    DeploymentEngine::new(Arc::new(BrokenStore), builder, providers)
}

#[tokio::test]
async fn taking_warnings_drains_them() {
    let engine = broken_store_engine(StaticBuilder::ok(), MockProvider::ok());
    engine.deploy(&project(), docker_target()).await.unwrap();

    let taken = engine.take_warnings();

    assert!(!taken.is_empty());
    assert!(engine.warnings().is_empty());
    assert!(engine.take_warnings().is_empty());
}

#[tokio::test]
async fn build_error_survives_a_broken_store() {
    let engine = broken_store_engine(StaticBuilder::failing("linker crashed"), MockProvider::ok());

    let (record, err) = engine.deploy(&project(), docker_target()).await.unwrap_err();

    assert_eq!(err.kind(), DeployErrorKind::BuildFailed);
    assert!(err.to_string().contains("linker crashed"));
    assert_eq!(record.status, DeploymentStatus::Failed);
    assert!(!engine.warnings().is_empty());
}

#[tokio::test]
async fn provider_error_survives_a_broken_store() {
    let provider = MockProvider {
        deploy: ProviderDeployment::failed("quota exceeded"),
        ..MockProvider::ok()
    };
    let engine = broken_store_engine(StaticBuilder::ok(), provider);

    let (record, err) = engine.deploy(&project(), docker_target()).await.unwrap_err();

    assert_eq!(err.kind(), DeployErrorKind::DeployFailed);
    assert_eq!(record.status, DeploymentStatus::Failed);
}

#[tokio::test]
async fn rollback_error_survives_a_broken_store() {
    let provider = MockProvider {
        rollback_ok: false,
        ..MockProvider::ok()
    };
    let engine = broken_store_engine(StaticBuilder::ok(), provider);
    let mut record = engine.deploy(&project(), docker_target()).await.unwrap();
    engine.take_warnings();

    let err = engine.rollback(&mut record, "0.9.0").await.unwrap_err();

    assert_eq!(err.kind(), DeployErrorKind::RollbackFailed);
    assert_eq!(record.status, DeploymentStatus::RollingBack);
    assert!(
        engine
            .warnings()
            .iter()
            .all(|w| w.kind == WarningKind::Persistence)
    );
    assert!(!engine.warnings().is_empty());
}

#[tokio::test]
async fn stale_in_flight_record_rolls_back_after_cancel() {
    let h = harness(StaticBuilder::ok(), Some(MockProvider::ok())).await;
    let mut record = DeploymentRecord::new(&project(), docker_target());
    record.status = DeploymentStatus::Deploying;
    h.store.save_deployment(&record).await.unwrap();

    assert!(h.engine.rollback(&mut record, "0.9.0").await.is_err());
    h.engine.cancel_deployment(&mut record).await.unwrap();
    h.engine.rollback(&mut record, "0.9.0").await.unwrap();

    assert_eq!(record.status, DeploymentStatus::RolledBack);
    assert_eq!(record.version, "0.9.0");
}
