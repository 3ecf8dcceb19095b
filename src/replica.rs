use crate::consumer::{ConsumerConfig, ConsumerLoop, ConsumerStats, MessageHandler};
use crate::lease::{LeaseStore, LockProvider, RoleLeaseCoordinator};
use crate::monitor::{MonitorConfig, MonitorLoop};
use crate::options::{ReplicaOptions, ReplicaOptionsValidated};
use crate::shutdown::{self, ShutdownHandle};
use crate::time::{Clock, RealClock};
use crate::topology::{
    BootstrapError, BootstrapOutcome, BootstrapStateListener, Bootstrapper, ReadinessSignal, TopologyConfig,
};
use crate::transport::MessagingTransport;
use std::convert::TryFrom;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct ReplicaConfig<S, L, T, H, C = RealClock> {
    pub replica_id: String,
    pub logger: slog::Logger,
    pub options: ReplicaOptions,
    pub lease_store: Arc<S>,
    pub lock_provider: Arc<L>,
    pub transport: Arc<T>,
    pub message_handler: Arc<H>,
    pub clock: C,
}

#[derive(Debug, thiserror::Error)]
pub enum ReplicaCreationError {
    #[error("Replica ID must not be empty")]
    EmptyReplicaId,
    #[error("Illegal options for configuring replica: {0}")]
    IllegalOptions(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ReplicaTaskError {
    #[error("Replica task did not run to completion")]
    Join(#[from] tokio::task::JoinError),
}

/// What a replica's tasks reported when they stopped.
#[derive(Debug)]
pub struct ReplicaReport {
    pub bootstrap: Result<BootstrapOutcome, BootstrapError>,
    pub consumer: ConsumerStats,
}

/// Handle to the tasks of one running replica: topology bootstrap, lease monitor and consumer.
pub struct Replica {
    replica_id: String,
    logger: slog::Logger,
    readiness: ReadinessSignal,
    bootstrap_state: BootstrapStateListener,
    shutdown_handle: ShutdownHandle,
    bootstrap_task: JoinHandle<Result<BootstrapOutcome, BootstrapError>>,
    monitor_task: JoinHandle<()>,
    consumer_task: JoinHandle<ConsumerStats>,
}

impl Replica {
    pub fn replica_id(&self) -> &str {
        &self.replica_id
    }

    pub fn readiness(&self) -> ReadinessSignal {
        self.readiness.clone()
    }

    pub fn bootstrap_state(&self) -> BootstrapStateListener {
        self.bootstrap_state.clone()
    }

    /// Stops all tasks and waits for them to exit.
    pub async fn shutdown(self) -> Result<ReplicaReport, ReplicaTaskError> {
        slog::info!(self.logger, "Shutting down replica...");
        self.shutdown_handle.trigger();

        let bootstrap = self.bootstrap_task.await?;
        self.monitor_task.await?;
        let consumer = self.consumer_task.await?;

        slog::info!(self.logger, "Replica stopped");
        Ok(ReplicaReport { bootstrap, consumer })
    }
}

/// Validates the options and spawns the replica's tasks onto the current tokio runtime.
pub fn spawn_replica<S, L, T, H, C>(config: ReplicaConfig<S, L, T, H, C>) -> Result<Replica, ReplicaCreationError>
where
    S: LeaseStore,
    L: LockProvider,
    T: MessagingTransport,
    H: MessageHandler,
    C: Clock,
{
    if config.replica_id.is_empty() {
        return Err(ReplicaCreationError::EmptyReplicaId);
    }
    let options = ReplicaOptionsValidated::try_from(config.options)
        .map_err(|e| ReplicaCreationError::IllegalOptions(e.to_string()))?;

    let logger = config.logger.new(slog::o!("ReplicaId" => config.replica_id.clone()));

    let roles = Arc::new(RoleLeaseCoordinator::with_clock(
        logger.new(slog::o!("Component" => "Lease")),
        config.lease_store,
        config.lock_provider,
        options.lease_buffer,
        config.clock.clone(),
    ));
    let readiness = ReadinessSignal::new();
    let (shutdown_handle, shutdown_signal) = shutdown::shutdown_signal();

    let bootstrapper = Bootstrapper::new(
        logger.new(slog::o!("Component" => "Topology")),
        TopologyConfig {
            role_name: options.topology_role_name.clone(),
            lease_duration: options.topology_lease_duration,
            topic_id: options.topic_id.clone(),
            subscription_id: options.subscription_id.clone(),
            ack_deadline: options.ack_deadline,
            poll_interval: options.poll_interval,
        },
        roles.clone(),
        config.transport.clone(),
        config.clock.clone(),
        readiness.clone(),
    );
    let bootstrap_state = bootstrapper.state_listener();

    let monitor = MonitorLoop::new(
        logger.new(slog::o!("Component" => "Monitor")),
        MonitorConfig {
            role_name: options.monitor_role_name.clone(),
            period: options.monitor_period,
        },
        roles,
        config.clock.clone(),
    );

    let consumer = ConsumerLoop::new(
        logger.new(slog::o!("Component" => "Consumer")),
        ConsumerConfig {
            subscription_id: options.subscription_id.clone(),
            batch_size: options.consumer_batch_size,
            idle_delay: options.consumer_idle_delay,
        },
        config.transport,
        config.message_handler,
        config.clock,
    );

    let bootstrap_task = tokio::spawn(bootstrapper.run(shutdown_signal.clone()));
    let monitor_task = tokio::spawn(monitor.run(shutdown_signal.clone()));
    let consumer_task = tokio::spawn(consumer.run(readiness.clone(), shutdown_signal));

    slog::info!(logger, "Replica started");

    Ok(Replica {
        replica_id: config.replica_id,
        logger,
        readiness,
        bootstrap_state,
        shutdown_handle,
        bootstrap_task,
        monitor_task,
        consumer_task,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::LoggingHandler;
    use crate::lease::{InMemoryLeaseStore, InMemoryLockProvider};
    use crate::transport::InMemoryTransport;
    use std::time::Duration;

    type InMemoryReplicaConfig =
        ReplicaConfig<InMemoryLeaseStore, InMemoryLockProvider, InMemoryTransport, LoggingHandler>;

    fn config(replica_id: &str, options: ReplicaOptions) -> InMemoryReplicaConfig {
        let logger = slog::Logger::root(slog::Discard, slog::o!());
        ReplicaConfig {
            replica_id: replica_id.to_string(),
            logger: logger.clone(),
            options,
            lease_store: Arc::new(InMemoryLeaseStore::new()),
            lock_provider: Arc::new(InMemoryLockProvider::new()),
            transport: Arc::new(InMemoryTransport::new()),
            message_handler: Arc::new(LoggingHandler::new(logger)),
            clock: RealClock,
        }
    }

    #[tokio::test]
    async fn illegal_options_are_rejected() {
        let result = spawn_replica(config(
            "replica-1",
            ReplicaOptions {
                consumer_batch_size: Some(0),
                ..Default::default()
            },
        ));

        assert!(matches!(result, Err(ReplicaCreationError::IllegalOptions(_))));
    }

    #[tokio::test]
    async fn empty_replica_id_is_rejected() {
        let result = spawn_replica(config("", ReplicaOptions::default()));

        assert!(matches!(result, Err(ReplicaCreationError::EmptyReplicaId)));
    }

    #[tokio::test]
    async fn lone_replica_becomes_ready_and_shuts_down() {
        let replica = spawn_replica(config(
            "replica-1",
            ReplicaOptions {
                poll_interval: Some(Duration::from_millis(10)),
                consumer_idle_delay: Some(Duration::from_millis(10)),
                ..Default::default()
            },
        ))
        .unwrap();

        tokio::time::timeout(Duration::from_secs(5), replica.readiness().wait())
            .await
            .expect("replica should become ready");

        let report = tokio::time::timeout(Duration::from_secs(5), replica.shutdown())
            .await
            .expect("replica should stop promptly")
            .unwrap();
        assert_eq!(report.bootstrap.unwrap(), BootstrapOutcome::Ready { acquired: true });
    }
}
