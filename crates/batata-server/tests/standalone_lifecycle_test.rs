//! Full lifecycle of a standalone node: membership, protocol startup,
//! metadata release, member changes and shutdown.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::json;

use batata_api::model::MemberBuilder;
use batata_consistency::{
    ConsistencyError, Log, LogProcessor, MetaDataChange, MetaDataObserver, ProtocolKind,
    ReadRequest, Response,
};
use batata_core::{Configuration, ProtocolManager, cluster::ServerMemberManager};
use batata_server::startup::protocol_registry;

const GROUP: &str = "naming_persistent";

struct NoopProcessor;

#[async_trait]
impl LogProcessor for NoopProcessor {
    fn group(&self) -> &str {
        GROUP
    }

    async fn on_request(&self, _request: &ReadRequest) -> Result<Response, ConsistencyError> {
        Ok(Response::ok(Vec::new()))
    }

    async fn on_apply(&self, _log: &Log) -> Result<Response, ConsistencyError> {
        Ok(Response::ok(Vec::new()))
    }
}

fn configuration() -> Configuration {
    Configuration::from_config(
        config::Config::builder()
            .set_default("batata.standalone", true)
            .unwrap()
            .set_default("batata.server.ip", "127.0.0.1")
            .unwrap()
            .set_default("batata.server.main.port", 8848)
            .unwrap()
            .set_default("batata.core.protocol.drain-timeout", 500)
            .unwrap()
            .build()
            .unwrap(),
    )
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn standalone_node_lifecycle() {
    let configuration = configuration();

    let member_manager = Arc::new(ServerMemberManager::new(&configuration));
    member_manager.start().await;

    let mut registry = protocol_registry(&configuration);
    registry.add_log_processor(ProtocolKind::Ap, Arc::new(NoopProcessor));
    registry.add_log_processor(ProtocolKind::Cp, Arc::new(NoopProcessor));

    let manager = ProtocolManager::start(
        member_manager.clone(),
        &registry,
        configuration.protocol_manager_config(),
    )
    .await;
    assert!(manager.check_startup().is_ok());
    assert_eq!(manager.active_kinds(), vec![ProtocolKind::Ap, ProtocolKind::Cp]);

    let cp = manager.protocol(ProtocolKind::Cp).unwrap();
    let ap = manager.protocol(ProtocolKind::Ap).unwrap();
    assert_eq!(
        cp.protocol_meta_data().get(GROUP, "leader"),
        Some(json!("127.0.0.1:7848"))
    );
    assert_eq!(
        ap.protocol_meta_data().get(GROUP, "members"),
        Some(json!(["127.0.0.1:8848"]))
    );

    // Metadata changes stay buffered until the server reports it has started
    let seen: Arc<Mutex<Vec<MetaDataChange>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let observer: MetaDataObserver = Arc::new(move |change: &MetaDataChange| {
        sink.lock().unwrap().push(change.clone());
    });
    cp.protocol_meta_data().subscribe(GROUP, "leader", observer);
    assert!(seen.lock().unwrap().is_empty());

    manager.on_context_started();
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(seen.lock().unwrap()[0].value, json!("127.0.0.1:7848"));

    // A joining member reaches both protocols in their own address encoding
    member_manager
        .member_join(MemberBuilder::new("127.0.0.2".to_string(), 8848).raft_port(7848).build())
        .await;
    wait_until(|| {
        cp.protocol_meta_data().get(GROUP, "members")
            == Some(json!(["127.0.0.1:7848", "127.0.0.2:7848"]))
    })
    .await;
    wait_until(|| {
        ap.protocol_meta_data().get(GROUP, "members")
            == Some(json!(["127.0.0.1:8848", "127.0.0.2:8848"]))
    })
    .await;

    assert!(manager.destroy().await.is_ok());
    assert!(manager.is_shutdown());
    assert!(manager.destroy().await.is_ok());
    member_manager.stop().await;
}
