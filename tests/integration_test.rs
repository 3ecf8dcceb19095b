use bytes::Bytes;
use cluster_roles::{
    mocked_clock, spawn_replica, BootstrapOutcome, BootstrapState, HandleMessageError, InMemoryLeaseStore,
    InMemoryLockProvider, InMemoryTransport, MessageHandler, MessagingTransport, RealClock, ReceivedMessage,
    ReplicaConfig, ReplicaOptions, RoleAcquirer, RoleLeaseCoordinator,
};
use std::error::Error;
use std::sync::{Arc, Mutex};
use tokio::time::Duration;

#[tokio::test]
async fn expired_lease_passes_to_another_replica() -> Result<(), Box<dyn Error>> {
    let (clock, controller) = mocked_clock();
    let store = Arc::new(InMemoryLeaseStore::new());
    let locks = Arc::new(InMemoryLockProvider::new());
    let coordinator = |replica_id: &'static str| {
        RoleLeaseCoordinator::with_clock(
            test_logger().new(slog::o!("ReplicaId" => replica_id)),
            store.clone(),
            locks.clone(),
            Duration::from_millis(500),
            clock.clone(),
        )
    };
    let replica_a = coordinator("a");
    let replica_b = coordinator("b");
    let lease = Duration::from_secs(15);

    assert!(replica_a.try_acquire_or_renew("topology-manager", lease, false).await?);
    assert!(!replica_b.try_acquire_or_renew("topology-manager", lease, false).await?);

    controller.advance(Duration::from_secs(10));
    assert!(!replica_b.try_acquire_or_renew("topology-manager", lease, false).await?);

    controller.advance(Duration::from_secs(6));
    assert!(replica_b.try_acquire_or_renew("topology-manager", lease, false).await?);

    let row = store.snapshot("topology-manager").ok_or("lease row missing")?;
    let expected = controller.current_time() + chrono::Duration::milliseconds(15_500);
    assert_eq!(row.lease_expires_at, expected);
    assert_eq!(store.row_count(), 1);

    Ok(())
}

#[tokio::test]
async fn replicas_share_topology_and_consume_each_message_once() -> Result<(), Box<dyn Error>> {
    let store = Arc::new(InMemoryLeaseStore::new());
    let locks = Arc::new(InMemoryLockProvider::new());
    let transport = Arc::new(InMemoryTransport::new());
    let handler = Arc::new(RecordingHandler::default());

    let mut replicas = Vec::new();
    for replica_id in &["replica-1", "replica-2"] {
        let replica = spawn_replica(ReplicaConfig {
            replica_id: replica_id.to_string(),
            logger: test_logger(),
            options: fast_options(),
            lease_store: store.clone(),
            lock_provider: locks.clone(),
            transport: transport.clone(),
            message_handler: handler.clone(),
            clock: RealClock,
        })?;
        replicas.push(replica);
    }

    for replica in &replicas {
        tokio::time::timeout(Duration::from_secs(5), replica.readiness().wait()).await?;
        assert!(matches!(
            replica.bootstrap_state().current(),
            BootstrapState::Ready { .. }
        ));
    }
    assert_eq!(transport.topic_creations(), 1);
    assert_eq!(transport.subscription_creations(), 1);

    transport.publish("messages", Bytes::from("Hello, World!")).await?;
    wait_until(|| handler.seen().len() == 1 && transport.unacknowledged("message-consumers") == 0).await;

    let mut leaders = 0;
    let mut acknowledged = 0;
    for replica in replicas {
        let report = tokio::time::timeout(Duration::from_secs(5), replica.shutdown()).await??;
        match report.bootstrap? {
            BootstrapOutcome::Ready { acquired } => leaders += acquired as usize,
            BootstrapOutcome::Cancelled => panic!("replica was cancelled after becoming ready"),
        }
        acknowledged += report.consumer.acknowledged;
    }

    assert_eq!(leaders, 1);
    assert_eq!(acknowledged, 1);
    assert_eq!(handler.seen(), vec!["Hello, World!".to_string()]);

    Ok(())
}

#[tokio::test]
async fn replica_without_topology_role_waits_for_creation() -> Result<(), Box<dyn Error>> {
    let store = Arc::new(InMemoryLeaseStore::new());
    let locks = Arc::new(InMemoryLockProvider::new());
    let transport = Arc::new(InMemoryTransport::new());

    // Another process holds the topology role but never creates anything.
    let foreign = RoleLeaseCoordinator::new(test_logger(), store.clone(), locks.clone(), Duration::ZERO);
    assert!(foreign
        .try_acquire_or_renew("topology-manager", Duration::from_secs(3600), false)
        .await?);

    let replica = spawn_replica(ReplicaConfig {
        replica_id: "replica-1".to_string(),
        logger: test_logger(),
        options: fast_options(),
        lease_store: store.clone(),
        lock_provider: locks.clone(),
        transport: transport.clone(),
        message_handler: Arc::new(RecordingHandler::default()),
        clock: RealClock,
    })?;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!replica.readiness().is_set());
    assert_eq!(
        replica.bootstrap_state().current(),
        BootstrapState::Polling { acquired: false }
    );

    transport.create_topic("messages").await?;
    transport
        .create_subscription("messages", "message-consumers", Duration::from_secs(60))
        .await?;
    tokio::time::timeout(Duration::from_secs(5), replica.readiness().wait()).await?;

    let report = replica.shutdown().await?;
    assert_eq!(report.bootstrap?, BootstrapOutcome::Ready { acquired: false });
    assert_eq!(transport.topic_creations(), 1);

    Ok(())
}

#[derive(Default)]
struct RecordingHandler {
    seen: Mutex<Vec<String>>,
}

impl RecordingHandler {
    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, message: &ReceivedMessage) -> Result<(), HandleMessageError> {
        let text = std::str::from_utf8(&message.payload)?;
        self.seen.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

fn fast_options() -> ReplicaOptions {
    ReplicaOptions {
        poll_interval: Some(Duration::from_millis(10)),
        consumer_idle_delay: Some(Duration::from_millis(10)),
        monitor_period: Some(Duration::from_millis(200)),
        lease_buffer: Some(Duration::from_millis(50)),
        ..Default::default()
    }
}

fn test_logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("Timed out waiting for condition");
}
