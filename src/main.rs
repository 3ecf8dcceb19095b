use bytes::Bytes;
use cluster_roles::{
    spawn_replica, InMemoryLeaseStore, InMemoryLockProvider, InMemoryTransport, LoggingHandler, MessagingTransport,
    RealClock, ReplicaConfig, ReplicaOptions,
};
use slog::Drain;
use std::sync::Arc;
use std::time::Duration;

const NUM_REPLICAS: usize = 4;

#[tokio::main]
async fn main() {
    let root_logger = create_root_logger_for_stdout();

    // Every replica shares the same backends, as they would share one database and one broker.
    let lease_store = Arc::new(InMemoryLeaseStore::new());
    let lock_provider = Arc::new(InMemoryLockProvider::new());
    let transport = Arc::new(InMemoryTransport::new());

    let mut replicas = Vec::with_capacity(NUM_REPLICAS);
    for i in 1..=NUM_REPLICAS {
        let config = ReplicaConfig {
            replica_id: format!("replica-{}", i),
            logger: root_logger.clone(),
            options: ReplicaOptions::default(),
            lease_store: lease_store.clone(),
            lock_provider: lock_provider.clone(),
            transport: transport.clone(),
            message_handler: Arc::new(LoggingHandler::new(root_logger.clone())),
            clock: RealClock,
        };
        match spawn_replica(config) {
            Ok(replica) => replicas.push(replica),
            Err(e) => {
                slog::error!(root_logger, "Failed to start replica-{}: {}", i, e);
                return;
            }
        }
    }

    let publisher = tokio::spawn(publish_greetings(root_logger.clone(), transport));

    if let Err(e) = tokio::signal::ctrl_c().await {
        slog::error!(root_logger, "Failed to listen for Ctrl-C: {}", e);
    }
    publisher.abort();

    for replica in replicas {
        let replica_id = replica.replica_id().to_string();
        match replica.shutdown().await {
            Ok(report) => slog::info!(
                root_logger,
                "{} stopped: bootstrap {:?}, {} message(s) acknowledged",
                replica_id,
                report.bootstrap,
                report.consumer.acknowledged
            ),
            Err(e) => slog::warn!(root_logger, "{} did not stop cleanly: {}", replica_id, e),
        }
    }
}

async fn publish_greetings(logger: slog::Logger, transport: Arc<InMemoryTransport>) {
    let mut counter: u64 = 0;
    loop {
        tokio::time::sleep(Duration::from_secs(3)).await;
        counter += 1;

        let payload = Bytes::from(format!("Hello, World! #{}", counter));
        match transport.publish("messages", payload).await {
            Ok(message_id) => slog::debug!(logger, "Published message {}", message_id.as_str()),
            // The topic doesn't exist until a replica has bootstrapped it.
            Err(e) => slog::info!(logger, "Publish skipped: {}", e),
        }
    }
}

fn create_root_logger_for_stdout() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!())
}
