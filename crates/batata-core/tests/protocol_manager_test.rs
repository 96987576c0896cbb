// Integration tests for ProtocolManager
// Drives the AP/CP lifecycle against a real ServerMemberManager with
// instrumented protocols

use std::{
    collections::HashSet,
    marker::PhantomData,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use batata_api::model::MemberBuilder;
use batata_common::BatataError;
use batata_consistency::{
    ApProtocol, ConsistencyError, ConsistencyProtocol, CpProtocol, DistroConfig, Log,
    LogProcessor, MetaDataChange, ProtocolConfig, ProtocolKind, ProtocolMetaData,
    ProtocolRegistry, RaftConfig, ReadRequest, Response, Result,
};
use batata_core::{
    Configuration, ProtocolManager, ProtocolManagerConfig, cluster::ServerMemberManager,
};

#[derive(Clone, Debug, PartialEq)]
struct InitRecord {
    self_member: String,
    members: HashSet<String>,
    groups: Vec<String>,
}

/// Protocol double recording every call, with injectable faults
struct MockProtocol<C> {
    fail_init: bool,
    panic_init: bool,
    fail_shutdown: bool,
    gate: Option<Arc<Semaphore>>,
    change_delay: Duration,
    init: Mutex<Option<InitRecord>>,
    changes: Mutex<Vec<HashSet<String>>>,
    shutdowns: AtomicUsize,
    meta: ProtocolMetaData,
    _config: PhantomData<fn() -> C>,
}

impl<C: ProtocolConfig> MockProtocol<C> {
    fn new() -> Self {
        Self {
            fail_init: false,
            panic_init: false,
            fail_shutdown: false,
            gate: None,
            change_delay: Duration::ZERO,
            init: Mutex::new(None),
            changes: Mutex::new(Vec::new()),
            shutdowns: AtomicUsize::new(0),
            meta: ProtocolMetaData::new(),
            _config: PhantomData,
        }
    }

    fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    fn panicking_init(mut self) -> Self {
        self.panic_init = true;
        self
    }

    fn failing_shutdown(mut self) -> Self {
        self.fail_shutdown = true;
        self
    }

    fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn slow_changes(mut self, delay: Duration) -> Self {
        self.change_delay = delay;
        self
    }

    fn init_record(&self) -> Option<InitRecord> {
        self.init.lock().clone()
    }

    fn changes(&self) -> Vec<HashSet<String>> {
        self.changes.lock().clone()
    }

    fn change_count(&self) -> usize {
        self.changes.lock().len()
    }

    fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<C: ProtocolConfig> ConsistencyProtocol for MockProtocol<C> {
    type Config = C;

    async fn init(&self, config: C) -> Result<()> {
        assert!(!self.panic_init, "injected init panic");
        if self.fail_init {
            return Err(ConsistencyError::Internal("injected init failure".to_string()));
        }

        // Metadata written while bootstrapping stays buffered
        self.meta.put("mock", "leader", config.self_member());
        *self.init.lock() = Some(InitRecord {
            self_member: config.self_member().to_string(),
            members: config.members().clone(),
            groups: config
                .log_processors()
                .iter()
                .map(|p| p.group().to_string())
                .collect(),
        });
        Ok(())
    }

    async fn member_change(&self, addresses: HashSet<String>) -> Result<()> {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| ConsistencyError::Internal(e.to_string()))?
                .forget();
        }
        if !self.change_delay.is_zero() {
            tokio::time::sleep(self.change_delay).await;
        }
        self.changes.lock().push(addresses);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        if self.fail_shutdown {
            return Err(ConsistencyError::Internal("injected shutdown failure".to_string()));
        }
        Ok(())
    }

    fn protocol_meta_data(&self) -> &ProtocolMetaData {
        &self.meta
    }
}

impl ApProtocol for MockProtocol<DistroConfig> {}

impl CpProtocol for MockProtocol<RaftConfig> {
    fn is_leader(&self, _group: &str) -> bool {
        false
    }
}

type MockAp = MockProtocol<DistroConfig>;
type MockCp = MockProtocol<RaftConfig>;

struct GroupProcessor(&'static str);

#[async_trait]
impl LogProcessor for GroupProcessor {
    fn group(&self) -> &str {
        self.0
    }

    async fn on_request(&self, request: &ReadRequest) -> Result<Response> {
        Ok(Response::ok(request.data.clone()))
    }

    async fn on_apply(&self, log: &Log) -> Result<Response> {
        Ok(Response::ok(log.data.clone()))
    }
}

/// Self 10.0.0.1 with peers 10.0.0.2 and 10.0.0.3, raft ports 7848
async fn cluster() -> ServerMemberManager {
    let config = config::Config::builder()
        .set_default("batata.standalone", false)
        .unwrap()
        .set_default("batata.server.ip", "10.0.0.1")
        .unwrap()
        .set_default("batata.member.list", "10.0.0.2:8848,10.0.0.3:8848")
        .unwrap()
        .build()
        .unwrap();
    let members = ServerMemberManager::new(&Configuration::from_config(config));
    members.start().await;
    members
}

fn registry(ap: Option<Arc<MockAp>>, cp: Option<Arc<MockCp>>) -> ProtocolRegistry {
    let mut registry = ProtocolRegistry::new();
    registry
        .provide_config(DistroConfig::default)
        .provide_config(RaftConfig::default)
        .add_log_processor(ProtocolKind::Ap, Arc::new(GroupProcessor("ephemeral")))
        .add_log_processor(ProtocolKind::Cp, Arc::new(GroupProcessor("config")))
        .add_log_processor(ProtocolKind::Cp, Arc::new(GroupProcessor("naming")));
    if let Some(ap) = ap {
        registry.register_ap(ap);
    }
    if let Some(cp) = cp {
        registry.register_cp(cp);
    }
    registry
}

async fn start(members: &ServerMemberManager, registry: &ProtocolRegistry) -> Arc<ProtocolManager> {
    start_with(members, registry, ProtocolManagerConfig::default()).await
}

async fn start_with(
    members: &ServerMemberManager,
    registry: &ProtocolRegistry,
    config: ProtocolManagerConfig,
) -> Arc<ProtocolManager> {
    ProtocolManager::start(Arc::new(members.clone()), registry, config).await
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

fn set(addresses: &[&str]) -> HashSet<String> {
    addresses.iter().map(|a| a.to_string()).collect()
}

fn peer(ip: &str) -> batata_api::model::Member {
    MemberBuilder::new(ip.to_string(), 8848).raft_port(7848).build()
}

// ============== Startup ==============

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_end_to_end_membership() {
    let members = cluster().await;
    let ap = Arc::new(MockAp::new());
    let cp = Arc::new(MockCp::new());
    let manager = start(&members, &registry(Some(ap.clone()), Some(cp.clone()))).await;

    assert_eq!(manager.active_kinds(), vec![ProtocolKind::Ap, ProtocolKind::Cp]);
    assert!(manager.startup_errors().is_empty());
    assert!(manager.check_startup().is_ok());

    assert_eq!(
        cp.init_record().unwrap(),
        InitRecord {
            self_member: "10.0.0.1:7848".to_string(),
            members: set(&["10.0.0.2:7848", "10.0.0.3:7848"]),
            groups: vec!["config".to_string(), "naming".to_string()],
        }
    );
    assert_eq!(
        ap.init_record().unwrap(),
        InitRecord {
            self_member: "10.0.0.1:8848".to_string(),
            members: set(&["10.0.0.2:8848", "10.0.0.3:8848"]),
            groups: vec!["ephemeral".to_string()],
        }
    );

    // No member change is delivered for the membership seen at init
    assert_eq!(ap.change_count(), 0);
    assert_eq!(cp.change_count(), 0);

    members.member_leave("10.0.0.3:8848").await;
    wait_until(|| ap.change_count() == 1 && cp.change_count() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(cp.changes(), vec![set(&["10.0.0.1:7848", "10.0.0.2:7848"])]);
    assert_eq!(ap.changes(), vec![set(&["10.0.0.1:8848", "10.0.0.2:8848"])]);

    manager.destroy().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cp_init_failure_does_not_affect_ap() {
    let members = cluster().await;
    let ap = Arc::new(MockAp::new());
    let cp = Arc::new(MockCp::new().failing_init());
    let manager = start(&members, &registry(Some(ap.clone()), Some(cp.clone()))).await;

    assert!(manager.is_active(ProtocolKind::Ap));
    assert!(!manager.is_active(ProtocolKind::Cp));
    assert!(ap.init_record().is_some());
    assert!(matches!(
        manager.startup_errors().get(&ProtocolKind::Cp),
        Some(ConsistencyError::InitFailed { kind: ProtocolKind::Cp, .. })
    ));
    assert!(matches!(
        manager.check_startup(),
        Err(BatataError::ProtocolStartup(kind, _)) if kind == "CP"
    ));

    // The failed kind never sees member changes or shutdown
    members.member_join(peer("10.0.0.4")).await;
    wait_until(|| ap.change_count() == 1).await;
    assert_eq!(cp.change_count(), 0);

    manager.destroy().await.unwrap();
    assert_eq!(ap.shutdown_count(), 1);
    assert_eq!(cp.shutdown_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ap_init_panic_does_not_affect_cp() {
    let members = cluster().await;
    let ap = Arc::new(MockAp::new().panicking_init());
    let cp = Arc::new(MockCp::new());
    let manager = start(&members, &registry(Some(ap.clone()), Some(cp.clone()))).await;

    assert_eq!(manager.active_kinds(), vec![ProtocolKind::Cp]);
    assert!(cp.init_record().is_some());
    assert!(manager.startup_errors().contains_key(&ProtocolKind::Ap));

    manager.destroy().await.unwrap();
}

#[tokio::test]
async fn test_absent_kind_is_skipped() {
    let members = cluster().await;
    let ap = Arc::new(MockAp::new());
    let manager = start(&members, &registry(Some(ap.clone()), None)).await;

    assert_eq!(manager.active_kinds(), vec![ProtocolKind::Ap]);
    assert!(manager.protocol(ProtocolKind::Cp).is_none());
    assert!(manager.startup_errors().is_empty());

    members.member_leave("10.0.0.2:8848").await;
    wait_until(|| ap.change_count() == 1).await;

    manager.destroy().await.unwrap();
}

#[tokio::test]
async fn test_missing_config_is_fatal_for_that_kind_only() {
    let members = cluster().await;
    let ap = Arc::new(MockAp::new());
    let cp = Arc::new(MockCp::new());

    let mut registry = ProtocolRegistry::new();
    registry
        .provide_config(DistroConfig::default)
        .register_ap(ap.clone())
        .register_cp(cp.clone());

    let manager = start(&members, &registry).await;
    assert_eq!(manager.active_kinds(), vec![ProtocolKind::Ap]);
    assert!(matches!(
        manager.startup_errors().get(&ProtocolKind::Cp),
        Some(ConsistencyError::ConfigNotFound(_))
    ));
    assert!(cp.init_record().is_none());
}

// ============== Deferred publish ==============

#[tokio::test]
async fn test_metadata_released_only_after_context_started() {
    let members = cluster().await;
    let ap = Arc::new(MockAp::new());
    let cp = Arc::new(MockCp::new());

    let seen: Arc<Mutex<Vec<MetaDataChange>>> = Arc::new(Mutex::new(Vec::new()));
    for meta in [&ap.meta, &cp.meta] {
        let sink = seen.clone();
        meta.subscribe(
            "mock",
            "leader",
            Arc::new(move |change: &MetaDataChange| sink.lock().push(change.clone())),
        );
    }

    let manager = start(&members, &registry(Some(ap.clone()), Some(cp.clone()))).await;
    assert!(seen.lock().is_empty());
    assert!(cp.meta.is_defer_publish());

    manager.on_context_started();
    assert_eq!(seen.lock().len(), 2);
    assert!(!ap.meta.is_defer_publish());
    assert!(!cp.meta.is_defer_publish());

    // Idempotent
    manager.stop_defer_publish();
    assert_eq!(seen.lock().len(), 2);
}

// ============== Member change fan-out ==============

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_member_changes_keep_order_per_kind() {
    let members = cluster().await;
    let ap = Arc::new(MockAp::new().slow_changes(Duration::from_millis(3)));
    let cp = Arc::new(MockCp::new());
    let manager = start(&members, &registry(Some(ap.clone()), Some(cp.clone()))).await;

    let mut expected_ap = Vec::new();
    let mut expected_cp = Vec::new();
    for i in 4..14 {
        members.member_join(peer(&format!("10.0.0.{}", i))).await;
        let snapshot = members.all_members();
        expected_ap.push(ProtocolKind::Ap.member_addresses(&snapshot).unwrap());
        expected_cp.push(ProtocolKind::Cp.member_addresses(&snapshot).unwrap());
    }

    wait_until(|| ap.change_count() == 10 && cp.change_count() == 10).await;
    assert_eq!(ap.changes(), expected_ap);
    assert_eq!(cp.changes(), expected_cp);

    manager.destroy().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocked_ap_does_not_block_cp() {
    let members = cluster().await;
    let gate = Arc::new(Semaphore::new(0));
    let ap = Arc::new(MockAp::new().gated(gate.clone()));
    let cp = Arc::new(MockCp::new());
    let manager = start(&members, &registry(Some(ap.clone()), Some(cp.clone()))).await;

    members.member_join(peer("10.0.0.4")).await;
    members.member_join(peer("10.0.0.5")).await;
    members.member_leave("10.0.0.2:8848").await;

    wait_until(|| cp.change_count() == 3).await;
    assert_eq!(ap.change_count(), 0);

    gate.add_permits(3);
    wait_until(|| ap.change_count() == 3).await;
    assert_eq!(
        ap.changes().last().unwrap(),
        &set(&["10.0.0.1:8848", "10.0.0.3:8848", "10.0.0.4:8848", "10.0.0.5:8848"])
    );

    manager.destroy().await.unwrap();
}

#[tokio::test]
async fn test_untranslatable_member_skips_cp_only() {
    let members = cluster().await;
    let ap = Arc::new(MockAp::new());
    let cp = Arc::new(MockCp::new());
    let manager = start(&members, &registry(Some(ap.clone()), Some(cp.clone()))).await;

    // No raft port in extended info
    members
        .member_join(MemberBuilder::new("10.0.0.9".to_string(), 8848).build())
        .await;
    wait_until(|| ap.change_count() == 1).await;
    assert!(ap.changes()[0].contains("10.0.0.9:8848"));

    members.member_leave("10.0.0.9:8848").await;
    wait_until(|| ap.change_count() == 2 && cp.change_count() == 1).await;
    assert_eq!(
        cp.changes()[0],
        set(&["10.0.0.1:7848", "10.0.0.2:7848", "10.0.0.3:7848"])
    );

    manager.destroy().await.unwrap();
}

// ============== Shutdown ==============

#[tokio::test]
async fn test_destroy_is_idempotent() {
    let members = cluster().await;
    let ap = Arc::new(MockAp::new());
    let cp = Arc::new(MockCp::new());
    let manager = start(&members, &registry(Some(ap.clone()), Some(cp.clone()))).await;

    manager.destroy().await.unwrap();
    manager.destroy().await.unwrap();

    assert!(manager.is_shutdown());
    assert_eq!(ap.shutdown_count(), 1);
    assert_eq!(cp.shutdown_count(), 1);
}

#[tokio::test]
async fn test_shutdown_failures_are_collected() {
    let members = cluster().await;
    let ap = Arc::new(MockAp::new().failing_shutdown());
    let cp = Arc::new(MockCp::new().failing_shutdown());
    let manager = start(&members, &registry(Some(ap.clone()), Some(cp.clone()))).await;

    let err = manager.destroy().await.unwrap_err();
    match err {
        BatataError::ProtocolShutdown(failures) => {
            assert_eq!(failures.len(), 2);
            assert!(failures[0].starts_with("AP protocol shutdown failed"));
            assert!(failures[1].starts_with("CP protocol shutdown failed"));
        }
        other => panic!("unexpected error: {other}"),
    }

    // Both were attempted exactly once, and a retry is a no-op
    assert_eq!(ap.shutdown_count(), 1);
    assert_eq!(cp.shutdown_count(), 1);
    assert!(manager.destroy().await.is_ok());
    assert_eq!(cp.shutdown_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queued_changes_drain_before_shutdown() {
    let members = cluster().await;
    let ap = Arc::new(MockAp::new());
    let cp = Arc::new(MockCp::new().slow_changes(Duration::from_millis(30)));
    let manager = start(&members, &registry(Some(ap.clone()), Some(cp.clone()))).await;

    members.member_join(peer("10.0.0.4")).await;
    members.member_join(peer("10.0.0.5")).await;
    members.member_join(peer("10.0.0.6")).await;

    manager.destroy().await.unwrap();
    assert_eq!(cp.change_count(), 3);
    assert_eq!(cp.shutdown_count(), 1);

    // Changes raised after shutdown are not dispatched
    members.member_join(peer("10.0.0.7")).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ap.change_count(), 3);
    assert_eq!(cp.change_count(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queued_changes_dropped_after_drain_timeout() {
    let members = cluster().await;
    let gate = Arc::new(Semaphore::new(0));
    let ap = Arc::new(MockAp::new().gated(gate.clone()));
    let cp = Arc::new(MockCp::new());
    let manager = start_with(
        &members,
        &registry(Some(ap.clone()), Some(cp.clone())),
        ProtocolManagerConfig {
            drain_timeout: Duration::from_millis(100),
        },
    )
    .await;

    members.member_join(peer("10.0.0.4")).await;
    members.member_join(peer("10.0.0.5")).await;
    wait_until(|| cp.change_count() == 2).await;

    manager.destroy().await.unwrap();
    assert_eq!(ap.shutdown_count(), 1);

    gate.add_permits(2);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ap.change_count(), 0);
}
