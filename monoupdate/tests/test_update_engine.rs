use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use bytes::Bytes;
use futures::{stream, stream::BoxStream, StreamExt};
use monoupdate::{
    config::{EngineConfig, Schedule, ScheduleMode},
    management::{ConfigStore, MemoryConfigStore},
    oci::{AuthToken, ManifestResponse, RegistryClient, RegistryTarget},
    runtime::{ContainerRuntime, LocalContainer, LocalImage, PullProgress, StackOrchestrator},
    update::{
        ExecuteOptions, Notifier, ProgressEvent, RestartKind, UpdateCandidate, UpdateRecord,
        UpdateStatus, UpdateType,
    },
    EngineServices, MonoupdateError, MonoupdateResult, UpdateEngine,
};
use tokio::sync::mpsc;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const VERSION_LABEL: &str = "org.opencontainers.image.version";

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_scan_reports_registry_candidate_with_short_digests() -> anyhow::Result<()> {
    let registry = FakeRegistry::default().serve("library/nginx", "latest", digest('b'), None);
    let runtime = FakeRuntime::default().with_image(pulled_image("nginx", "latest", digest('a')));

    let engine = Harness::new(registry, runtime).build().await?;
    let candidates = engine.scan().await?;

    assert_eq!(candidates.len(), 1);
    let candidate = &candidates[0];
    assert_eq!(candidate.key(), "nginx:latest");
    assert_eq!(*candidate.get_update_type(), UpdateType::Registry);
    assert_eq!(candidate.get_current_digest(), &"a".repeat(12));
    assert_eq!(candidate.get_latest_digest(), &"b".repeat(12));

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_scan_skips_up_to_date_image() -> anyhow::Result<()> {
    let registry = FakeRegistry::default().serve("library/nginx", "latest", digest('a'), None);
    let runtime = FakeRuntime::default().with_image(pulled_image("nginx", "latest", digest('a')));

    let engine = Harness::new(registry, runtime).build().await?;
    assert!(engine.scan().await?.is_empty());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_scan_skips_locally_built_and_untagged_images() -> anyhow::Result<()> {
    let registry = FakeRegistry::default();
    let runtime = FakeRuntime::default()
        .with_image(
            LocalImage::builder()
                .repository("my-app")
                .tag("dev")
                .id(digest('1'))
                .build(),
        )
        .with_image(
            LocalImage::builder()
                .repository("<none>")
                .tag("<none>")
                .id(digest('2'))
                .repo_digests(vec![format!("nginx@{}", digest('a'))])
                .build(),
        );

    let engine = Harness::new(registry, runtime).build().await?;
    assert!(engine.scan().await?.is_empty());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_scan_skips_failed_checks_and_keeps_others() -> anyhow::Result<()> {
    let registry = FakeRegistry::default().serve("library/redis", "7", digest('d'), None);
    let runtime = FakeRuntime::default()
        .with_image(pulled_image("nginx", "latest", digest('a')))
        .with_image(pulled_image("redis", "7", digest('c')));

    let engine = Harness::new(registry, runtime).build().await?;
    let candidates = engine.scan().await?;

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].key(), "redis:7");

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_scan_reads_versions_from_labels() -> anyhow::Result<()> {
    let registry =
        FakeRegistry::default().serve("library/postgres", "16", digest('b'), Some("16.4"));
    let runtime = FakeRuntime::default().with_image(labelled_image("postgres", "16", "16.3"));

    let engine = Harness::new(registry, runtime).build().await?;
    let candidates = engine.scan().await?;

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].get_current_version().as_deref(), Some("16.3"));
    assert_eq!(candidates[0].get_new_version().as_deref(), Some("16.4"));

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_scan_prefers_registry_candidate_over_container_candidate() -> anyhow::Result<()> {
    let registry = FakeRegistry::default().serve("library/nginx", "latest", digest('b'), None);
    let runtime = FakeRuntime::default()
        .with_image(pulled_image("nginx", "latest", digest('a')))
        .with_container(container("c1", "proxy", "nginx:latest", digest('9'), None, None))
        .with_image_id("nginx:latest", digest('8'));

    let engine = Harness::new(registry, runtime).build().await?;
    let candidates = engine.scan().await?;

    assert_eq!(candidates.len(), 1);
    assert_eq!(*candidates[0].get_update_type(), UpdateType::Registry);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_tick_applies_image_once_across_reference_spellings() -> anyhow::Result<()> {
    let registry = FakeRegistry::default().serve("library/nginx", "latest", digest('b'), None);
    let runtime = FakeRuntime::default()
        .with_image(pulled_image("nginx", "latest", digest('a')))
        .with_container(container(
            "c1",
            "web-proxy",
            "docker.io/library/nginx:latest",
            digest('9'),
            Some("web"),
            Some("proxy"),
        ))
        .with_image_id("docker.io/library/nginx:latest", digest('8'));

    let harness =
        Harness::new(registry, runtime).schedule(schedule("all", ScheduleMode::All, vec![]));
    let orchestrator = harness.orchestrator.clone();
    let engine = harness.build().await?;

    let candidates = engine.scan().await?;
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].key(), "nginx:latest");
    assert_eq!(*candidates[0].get_update_type(), UpdateType::Registry);

    let report = engine.tick("all").await?;
    assert_eq!(report.applied.len(), 1);
    assert_eq!(
        *orchestrator.calls.lock().unwrap(),
        vec![("web".to_string(), Some("proxy".to_string()))]
    );

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_scan_reports_outdated_container() -> anyhow::Result<()> {
    let registry = FakeRegistry::default();
    let runtime = FakeRuntime::default()
        .with_container(container("c1", "worker", digest('9'), digest('9'), None, None))
        .with_creation_ref("c1", "ghcr.io/acme/worker:2")
        .with_container(container("c2", "pinned", format!("nginx@{}", digest('7')), digest('7'), None, None))
        .with_image_id("ghcr.io/acme/worker:2", digest('8'));

    let engine = Harness::new(registry, runtime).build().await?;
    let candidates = engine.scan().await?;

    assert_eq!(candidates.len(), 1);
    let candidate = &candidates[0];
    assert_eq!(candidate.key(), "ghcr.io/acme/worker:2");
    assert_eq!(*candidate.get_update_type(), UpdateType::Container);
    assert_eq!(candidate.get_container_name().as_deref(), Some("worker"));
    assert_eq!(candidate.get_current_digest(), &"9".repeat(12));
    assert_eq!(candidate.get_latest_digest(), &"8".repeat(12));

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_scan_bounds_registry_concurrency() -> anyhow::Result<()> {
    const CONCURRENCY: usize = 3;
    const IMAGES: usize = 12;

    let mut registry = FakeRegistry::default().with_delay(Duration::from_millis(25));
    let mut runtime = FakeRuntime::default();
    for i in 0..IMAGES {
        let repository = format!("app{i}");
        registry = registry.serve(&format!("library/{repository}"), "latest", digest('b'), None);
        runtime = runtime.with_image(pulled_image(&repository, "latest", digest('a')));
    }

    let harness = Harness::new(registry, runtime);
    let registry = harness.registry.clone();
    let engine = harness.concurrency(CONCURRENCY).build().await?;

    let candidates = engine.scan().await?;
    assert_eq!(candidates.len(), IMAGES);

    let max = registry.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= CONCURRENCY, "max in flight {max} exceeded {CONCURRENCY}");
    assert!(max > 1, "checks did not run concurrently");

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_execute_recreates_application_group_once() -> anyhow::Result<()> {
    let runtime = FakeRuntime::default()
        .with_container(container("a", "web-a", "nginx:latest", digest('1'), Some("web"), Some("frontend")))
        .with_container(container("b", "web-b", "nginx:latest", digest('1'), Some("web"), Some("proxy")))
        .with_container(container("c", "db", "postgres:16", digest('2'), Some("web"), Some("db")));

    let harness = Harness::new(FakeRegistry::default(), runtime);
    let orchestrator = harness.orchestrator.clone();
    let runtime = harness.runtime.clone();
    let engine = harness.build().await?;

    let record = engine
        .execute(&registry_candidate("nginx", "latest"), ExecuteOptions::default())
        .await;

    assert_eq!(record.status, UpdateStatus::Completed);
    assert_eq!(record.affected_containers, 2);
    assert_eq!(record.restarted_containers.len(), 2);
    assert!(record
        .restarted_containers
        .iter()
        .all(|c| c.kind == RestartKind::Recreated && c.application.as_deref() == Some("web")));
    assert_eq!(
        *orchestrator.calls.lock().unwrap(),
        vec![("web".to_string(), None)]
    );
    assert_eq!(*runtime.pulls.lock().unwrap(), vec!["nginx:latest".to_string()]);

    let history = engine.history(10).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, record.id);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_execute_scopes_recreate_to_single_service() -> anyhow::Result<()> {
    let runtime = FakeRuntime::default()
        .with_container(container("a", "web-1", "nginx:latest", digest('1'), Some("web"), Some("proxy")))
        .with_container(container("b", "web-2", "nginx:latest", digest('1'), Some("web"), Some("proxy")));

    let harness = Harness::new(FakeRegistry::default(), runtime);
    let orchestrator = harness.orchestrator.clone();
    let engine = harness.build().await?;

    engine
        .execute(&registry_candidate("nginx", "latest"), ExecuteOptions::default())
        .await;

    assert_eq!(
        *orchestrator.calls.lock().unwrap(),
        vec![("web".to_string(), Some("proxy".to_string()))]
    );

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_execute_recreates_whole_group_when_a_member_has_no_service() -> anyhow::Result<()> {
    let runtime = FakeRuntime::default()
        .with_container(container("a", "web-1", "nginx:latest", digest('1'), Some("web"), Some("proxy")))
        .with_container(container("b", "web-2", "nginx:latest", digest('1'), Some("web"), None));

    let harness = Harness::new(FakeRegistry::default(), runtime);
    let orchestrator = harness.orchestrator.clone();
    let engine = harness.build().await?;

    let record = engine
        .execute(&registry_candidate("nginx", "latest"), ExecuteOptions::default())
        .await;

    assert_eq!(record.restarted_containers.len(), 2);
    assert_eq!(
        *orchestrator.calls.lock().unwrap(),
        vec![("web".to_string(), None)]
    );

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_execute_restarts_standalone_container_with_warning() -> anyhow::Result<()> {
    let runtime = FakeRuntime::default().with_container(container(
        "s1",
        "solo",
        "docker.io/library/nginx:latest",
        digest('1'),
        None,
        None,
    ));

    let harness = Harness::new(FakeRegistry::default(), runtime);
    let runtime = harness.runtime.clone();
    let orchestrator = harness.orchestrator.clone();
    let engine = harness.build().await?;

    let record = engine
        .execute(&registry_candidate("nginx", "latest"), ExecuteOptions::default())
        .await;

    assert_eq!(record.status, UpdateStatus::Completed);
    assert_eq!(record.warnings.len(), 1);
    assert_eq!(record.restarted_containers[0].kind, RestartKind::Restarted);
    assert_eq!(*runtime.restarts.lock().unwrap(), vec!["s1".to_string()]);
    assert!(orchestrator.calls.lock().unwrap().is_empty());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_execute_records_failed_pull_without_recreating() -> anyhow::Result<()> {
    let mut runtime = FakeRuntime::default().with_container(container(
        "a",
        "web-a",
        "nginx:latest",
        digest('1'),
        Some("web"),
        None,
    ));
    runtime.fail_pull = true;

    let harness = Harness::new(FakeRegistry::default(), runtime);
    let orchestrator = harness.orchestrator.clone();
    let engine = harness.build().await?;

    let record = engine
        .execute(&registry_candidate("nginx", "latest"), ExecuteOptions::default())
        .await;

    assert_eq!(record.status, UpdateStatus::Failed);
    assert!(record.error.as_deref().is_some_and(|e| e.contains("manifest unknown")));
    assert!(orchestrator.calls.lock().unwrap().is_empty());
    assert_eq!(engine.history(10).await.len(), 1);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_execute_failed_group_does_not_block_others() -> anyhow::Result<()> {
    let runtime = FakeRuntime::default()
        .with_container(container("a", "api-1", "nginx:latest", digest('1'), Some("api"), None))
        .with_container(container("b", "web-1", "nginx:latest", digest('1'), Some("web"), None));

    let mut harness = Harness::new(FakeRegistry::default(), runtime);
    harness.orchestrator = Arc::new(FakeOrchestrator {
        failing: vec!["api".to_string()],
        ..Default::default()
    });
    let orchestrator = harness.orchestrator.clone();
    let engine = harness.build().await?;

    let record = engine
        .execute(&registry_candidate("nginx", "latest"), ExecuteOptions::default())
        .await;

    assert_eq!(record.status, UpdateStatus::Failed);
    assert_eq!(orchestrator.calls.lock().unwrap().len(), 2);
    assert_eq!(record.failed_containers().count(), 1);
    assert!(record.error.as_deref().is_some_and(|e| e.starts_with("api:")));

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_execute_without_restart_only_pulls() -> anyhow::Result<()> {
    let runtime = FakeRuntime::default().with_container(container(
        "a",
        "web-a",
        "nginx:latest",
        digest('1'),
        Some("web"),
        None,
    ));

    let harness = Harness::new(FakeRegistry::default(), runtime);
    let orchestrator = harness.orchestrator.clone();
    let engine = harness.build().await?;

    let record = engine
        .execute(
            &registry_candidate("nginx", "latest"),
            ExecuteOptions { restart: false },
        )
        .await;

    assert_eq!(record.status, UpdateStatus::Completed);
    assert!(record.restarted_containers.is_empty());
    assert!(orchestrator.calls.lock().unwrap().is_empty());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_execute_with_progress_streams_events() -> anyhow::Result<()> {
    let runtime = FakeRuntime::default().with_container(container(
        "a",
        "web-a",
        "nginx:latest",
        digest('1'),
        Some("web"),
        None,
    ));
    let engine = Harness::new(FakeRegistry::default(), runtime).build().await?;

    let (tx, mut rx) = mpsc::channel(32);
    let record = engine
        .execute_with_progress(
            &registry_candidate("nginx", "latest"),
            ExecuteOptions::default(),
            tx,
        )
        .await;

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert_eq!(record.status, UpdateStatus::Completed);
    assert!(events.contains(&ProgressEvent::Downloading {
        layer: "layer1".into(),
        current: 50,
        total: Some(100),
    }));
    assert!(events.contains(&ProgressEvent::Pulled));
    assert!(events.contains(&ProgressEvent::Recreating {
        target: "web".into()
    }));
    assert_eq!(
        events.last(),
        Some(&ProgressEvent::Completed {
            status: UpdateStatus::Completed
        })
    );

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_tick_check_only_notifies_without_applying() -> anyhow::Result<()> {
    let registry = FakeRegistry::default().serve("library/nginx", "latest", digest('b'), None);
    let runtime = FakeRuntime::default().with_image(pulled_image("nginx", "latest", digest('a')));

    let harness = Harness::new(registry, runtime).schedule(schedule("nightly", ScheduleMode::CheckOnly, vec![]));
    let notifier = harness.notifier.clone();
    let runtime = harness.runtime.clone();
    let engine = harness.build().await?;

    let report = engine.tick("nightly").await?;

    assert_eq!(report.notified.len(), 1);
    assert!(report.applied.is_empty());
    assert!(runtime.pulls.lock().unwrap().is_empty());
    assert_eq!(*notifier.available.lock().unwrap(), vec!["nginx:latest".to_string()]);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_tick_all_applies_except_excluded_and_self() -> anyhow::Result<()> {
    let registry = FakeRegistry::default()
        .serve("library/nginx", "latest", digest('b'), None)
        .serve("library/redis", "7", digest('b'), None)
        .serve("acme/monoupdate", "latest", digest('b'), None);
    let runtime = FakeRuntime::default()
        .with_image(pulled_image("nginx", "latest", digest('a')))
        .with_image(pulled_image("redis", "7", digest('a')))
        .with_image(pulled_image("acme/monoupdate", "latest", digest('a')));

    let harness = Harness::new(registry, runtime)
        .schedule(schedule("all", ScheduleMode::All, vec!["redis".to_string()]));
    let runtime = harness.runtime.clone();
    let notifier = harness.notifier.clone();
    let engine = harness.build().await?;

    let report = engine.tick("all").await?;

    assert_eq!(report.candidates.len(), 1);
    assert_eq!(report.applied.len(), 1);
    assert_eq!(report.applied[0].image, "nginx:latest");
    assert_eq!(*runtime.pulls.lock().unwrap(), vec!["nginx:latest".to_string()]);
    assert_eq!(*notifier.applied.lock().unwrap(), vec!["nginx:latest".to_string()]);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_tick_minor_applies_only_same_major() -> anyhow::Result<()> {
    let registry = FakeRegistry::default()
        .serve("library/postgres", "16", digest('b'), Some("16.4"))
        .serve("library/node", "lts", digest('b'), Some("22.1.0"));
    let runtime = FakeRuntime::default()
        .with_image(labelled_image("postgres", "16", "16.3"))
        .with_image(labelled_image("node", "lts", "20.11.0"));

    let harness =
        Harness::new(registry, runtime).schedule(schedule("minor", ScheduleMode::Minor, vec![]));
    let engine = harness.build().await?;

    let report = engine.tick("minor").await?;

    assert_eq!(report.applied.len(), 1);
    assert_eq!(report.applied[0].image, "postgres:16");
    assert_eq!(report.notified.len(), 1);
    assert_eq!(report.notified[0].key(), "node:lts");

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_tick_disabled_and_missing_schedules() -> anyhow::Result<()> {
    let disabled = Schedule::builder()
        .id("off")
        .name("off")
        .cron_expression("0 3 * * *")
        .enabled(false)
        .mode(ScheduleMode::All)
        .build();

    let registry = FakeRegistry::default().serve("library/nginx", "latest", digest('b'), None);
    let runtime = FakeRuntime::default().with_image(pulled_image("nginx", "latest", digest('a')));
    let harness = Harness::new(registry, runtime).schedule(disabled);
    let registry = harness.registry.clone();
    let engine = harness.build().await?;

    let report = engine.tick("off").await?;
    assert!(report.candidates.is_empty());
    assert_eq!(registry.manifest_calls.load(Ordering::SeqCst), 0);

    let result = engine.tick("unknown").await;
    assert!(matches!(result, Err(MonoupdateError::ScheduleNotFound(id)) if id == "unknown"));

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_update_self_applies_own_image() -> anyhow::Result<()> {
    let registry = FakeRegistry::default().serve("acme/monoupdate", "latest", digest('b'), None);
    let runtime = FakeRuntime::default().with_image(pulled_image("acme/monoupdate", "latest", digest('a')));

    let harness = Harness::new(registry, runtime);
    let runtime = harness.runtime.clone();
    let engine = harness.build().await?;

    let record = engine.update_self().await?;
    assert_eq!(record.map(|r| r.status), Some(UpdateStatus::Completed));
    assert_eq!(*runtime.pulls.lock().unwrap(), vec!["acme/monoupdate:latest".to_string()]);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_history_survives_engine_restart() -> anyhow::Result<()> {
    let store: Arc<dyn ConfigStore> = Arc::new(MemoryConfigStore::default());

    let mut harness = Harness::new(FakeRegistry::default(), FakeRuntime::default());
    harness.store = store.clone();
    let engine = harness.build().await?;
    engine
        .execute(&registry_candidate("nginx", "latest"), ExecuteOptions::default())
        .await;

    let mut harness = Harness::new(FakeRegistry::default(), FakeRuntime::default());
    harness.store = store;
    let restarted = harness.build().await?;

    let history = restarted.history(10).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].image, "nginx:latest");

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn digest(fill: char) -> String {
    format!("sha256:{}", fill.to_string().repeat(64))
}

fn pulled_image(repository: &str, tag: &str, digest: String) -> LocalImage {
    LocalImage::builder()
        .repository(repository)
        .tag(tag)
        .id(format!("sha256:{}", "f".repeat(64)))
        .repo_digests(vec![format!("{repository}@{digest}")])
        .build()
}

fn labelled_image(repository: &str, tag: &str, version: &str) -> LocalImage {
    LocalImage::builder()
        .repository(repository)
        .tag(tag)
        .id(format!("sha256:{}", "f".repeat(64)))
        .repo_digests(vec![format!("{repository}@{}", digest('a'))])
        .labels(HashMap::from([(VERSION_LABEL.to_string(), version.to_string())]))
        .build()
}

fn container(
    id: &str,
    name: &str,
    image_ref: impl Into<String>,
    image_id: impl Into<String>,
    application: Option<&str>,
    service: Option<&str>,
) -> LocalContainer {
    LocalContainer::builder()
        .id(id)
        .name(name)
        .bound_image_ref(image_ref)
        .bound_image_id(image_id)
        .application_name(application.map(str::to_string))
        .service_name(service.map(str::to_string))
        .running(true)
        .build()
}

fn registry_candidate(repository: &str, tag: &str) -> UpdateCandidate {
    UpdateCandidate::builder()
        .repository(repository)
        .tag(tag)
        .current_digest("a".repeat(12))
        .latest_digest("b".repeat(12))
        .update_type(UpdateType::Registry)
        .build()
}

fn schedule(id: &str, mode: ScheduleMode, excluded: Vec<String>) -> Schedule {
    Schedule::builder()
        .id(id)
        .name(id)
        .cron_expression("0 3 * * *")
        .mode(mode)
        .excluded_images(excluded)
        .build()
}

//--------------------------------------------------------------------------------------------------
// Types: Harness
//--------------------------------------------------------------------------------------------------

struct Harness {
    registry: Arc<FakeRegistry>,
    runtime: Arc<FakeRuntime>,
    orchestrator: Arc<FakeOrchestrator>,
    notifier: Arc<RecordingNotifier>,
    store: Arc<dyn ConfigStore>,
    schedules: Vec<Schedule>,
    concurrency: usize,
}

impl Harness {
    fn new(registry: FakeRegistry, runtime: FakeRuntime) -> Self {
        Self {
            registry: Arc::new(registry),
            runtime: Arc::new(runtime),
            orchestrator: Arc::default(),
            notifier: Arc::default(),
            store: Arc::new(MemoryConfigStore::default()),
            schedules: Vec::new(),
            concurrency: 4,
        }
    }

    fn schedule(mut self, schedule: Schedule) -> Self {
        self.schedules.push(schedule);
        self
    }

    fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    async fn build(self) -> MonoupdateResult<UpdateEngine> {
        if !self.schedules.is_empty() {
            self.store.set_update_schedules(&self.schedules).await?;
        }

        let config = EngineConfig::builder()
            .scan_concurrency(self.concurrency)
            .pull_timeout(Duration::from_secs(5))
            .self_image("acme/monoupdate:latest".to_string())
            .host_arch("amd64")
            .build();

        let services = EngineServices::builder()
            .runtime(self.runtime)
            .orchestrator(self.orchestrator)
            .store(self.store)
            .registry(self.registry)
            .notifier(self.notifier)
            .build();

        UpdateEngine::new(config, services).await
    }
}

//--------------------------------------------------------------------------------------------------
// Types: Fakes
//--------------------------------------------------------------------------------------------------

/// Serves single-platform manifests per `image_path:tag` and tracks concurrent manifest calls.
#[derive(Default)]
struct FakeRegistry {
    digests: HashMap<String, String>,
    versions: HashMap<String, String>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    manifest_calls: AtomicUsize,
}

impl FakeRegistry {
    fn serve(mut self, image_path: &str, tag: &str, digest: String, version: Option<&str>) -> Self {
        self.digests.insert(format!("{image_path}:{tag}"), digest);
        if let Some(version) = version {
            self.versions
                .insert(image_path.to_string(), version.to_string());
        }
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait::async_trait]
impl RegistryClient for FakeRegistry {
    async fn get_auth_token(&self, _target: &RegistryTarget) -> Option<AuthToken> {
        Some(AuthToken::new("token"))
    }

    async fn fetch_manifest(
        &self,
        target: &RegistryTarget,
        reference: &str,
        _accept: &[&str],
        _token: Option<&AuthToken>,
    ) -> MonoupdateResult<ManifestResponse> {
        self.manifest_calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let key = format!("{}:{reference}", target.get_image_path());
        let digest = self
            .digests
            .get(&key)
            .ok_or_else(|| MonoupdateError::ManifestNotFound(key.clone()))?;

        let body = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
            "config": {
                "mediaType": "application/vnd.docker.container.image.v1+json",
                "digest": format!("sha256:{}", "c".repeat(64)),
                "size": 100
            },
            "layers": []
        });

        Ok(ManifestResponse {
            body: Bytes::from(serde_json::to_vec(&body)?),
            content_digest: Some(digest.clone()),
            content_type: None,
        })
    }

    async fn fetch_blob(
        &self,
        target: &RegistryTarget,
        _digest: &str,
        _token: Option<&AuthToken>,
    ) -> MonoupdateResult<Bytes> {
        let labels = match self.versions.get(target.get_image_path()) {
            Some(version) => serde_json::json!({ "org.opencontainers.image.version": version }),
            None => serde_json::json!({}),
        };

        let config = serde_json::json!({
            "architecture": "amd64",
            "os": "linux",
            "config": { "Labels": labels },
            "rootfs": { "type": "layers", "diff_ids": [] }
        });

        Ok(Bytes::from(serde_json::to_vec(&config)?))
    }
}

/// An in-memory container runtime that records pulls and restarts.
#[derive(Default)]
struct FakeRuntime {
    images: Vec<LocalImage>,
    containers: Vec<LocalContainer>,
    creation_refs: HashMap<String, String>,
    image_ids: HashMap<String, String>,
    fail_pull: bool,
    pulls: Mutex<Vec<String>>,
    restarts: Mutex<Vec<String>>,
}

impl FakeRuntime {
    fn with_image(mut self, image: LocalImage) -> Self {
        self.images.push(image);
        self
    }

    fn with_container(mut self, container: LocalContainer) -> Self {
        self.containers.push(container);
        self
    }

    fn with_creation_ref(mut self, container_id: &str, reference: &str) -> Self {
        self.creation_refs
            .insert(container_id.to_string(), reference.to_string());
        self
    }

    fn with_image_id(mut self, reference: &str, id: String) -> Self {
        self.image_ids.insert(reference.to_string(), id);
        self
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_images(&self) -> MonoupdateResult<Vec<LocalImage>> {
        Ok(self.images.clone())
    }

    async fn list_containers(&self) -> MonoupdateResult<Vec<LocalContainer>> {
        Ok(self.containers.clone())
    }

    async fn container_creation_ref(&self, container_id: &str) -> MonoupdateResult<String> {
        self.creation_refs
            .get(container_id)
            .cloned()
            .ok_or_else(|| MonoupdateError::RuntimeNotFound(container_id.to_string()))
    }

    async fn image_id(&self, reference: &str) -> MonoupdateResult<Option<String>> {
        Ok(self.image_ids.get(reference).cloned())
    }

    fn pull_image(
        &self,
        repository: &str,
        tag: &str,
    ) -> BoxStream<'static, MonoupdateResult<PullProgress>> {
        let image = format!("{repository}:{tag}");
        self.pulls.lock().unwrap().push(image.clone());

        if self.fail_pull {
            return stream::iter(vec![Err(MonoupdateError::PullFailed {
                image,
                message: "manifest unknown".into(),
            })])
            .boxed();
        }

        stream::iter(vec![
            Ok(PullProgress {
                layer: Some("layer1".into()),
                status: Some("Downloading".into()),
                current: Some(50),
                total: Some(100),
            }),
            Ok(PullProgress {
                layer: Some("layer1".into()),
                status: Some("Pull complete".into()),
                ..Default::default()
            }),
        ])
        .boxed()
    }

    async fn restart_container(&self, container_id: &str) -> MonoupdateResult<()> {
        self.restarts.lock().unwrap().push(container_id.to_string());
        Ok(())
    }
}

/// Records every recreate call; applications in `failing` fail.
#[derive(Default)]
struct FakeOrchestrator {
    failing: Vec<String>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

#[async_trait::async_trait]
impl StackOrchestrator for FakeOrchestrator {
    async fn recreate(&self, application: &str, service: Option<&str>) -> MonoupdateResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push((application.to_string(), service.map(str::to_string)));

        if self.failing.iter().any(|a| a == application) {
            return Err(MonoupdateError::RecreateFailed {
                application: application.to_string(),
                message: "exit status 1".into(),
            });
        }

        Ok(())
    }
}

/// Records the image keys it is notified about.
#[derive(Default)]
struct RecordingNotifier {
    available: Mutex<Vec<String>>,
    applied: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn updates_available(&self, _schedule: &Schedule, candidates: &[UpdateCandidate]) {
        self.available
            .lock()
            .unwrap()
            .extend(candidates.iter().map(UpdateCandidate::key));
    }

    async fn updates_applied(&self, _schedule: &Schedule, records: &[UpdateRecord]) {
        self.applied
            .lock()
            .unwrap()
            .extend(records.iter().map(|r| r.image.clone()));
    }
}
