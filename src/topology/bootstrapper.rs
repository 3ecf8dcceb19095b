use crate::errors::error_chain;
use crate::lease::{AcquireRoleError, RoleAcquirer};
use crate::shutdown::ShutdownSignal;
use crate::time::{Clock, RealClock};
use crate::topology::readiness::ReadinessSignal;
use crate::topology::resources::{verify_subscription_exists, verify_topic_exists};
use crate::topology::state::{self, BootstrapState, BootstrapStateListener, BootstrapStateNotifier};
use crate::transport::{MessagingTransport, ResourceKind, TransportError};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct TopologyConfig {
    pub role_name: String,
    pub lease_duration: Duration,
    pub topic_id: String,
    pub subscription_id: String,
    pub ack_deadline: Duration,
    pub poll_interval: Duration,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BootstrapOutcome {
    Ready { acquired: bool },
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Topology election cannot succeed")]
    Election(#[source] AcquireRoleError),
}

/// Bootstrapper elects at most one replica to create the shared topic and subscription, then has
/// every replica poll until both exist before setting the [`ReadinessSignal`].
///
/// The election happens once per run. If the elected replica dies between creating the topic and
/// creating the subscription, the remaining replicas keep polling.
pub struct Bootstrapper<R, T, C = RealClock>
where
    R: RoleAcquirer,
    T: MessagingTransport,
    C: Clock,
{
    logger: slog::Logger,
    config: TopologyConfig,
    roles: Arc<R>,
    transport: Arc<T>,
    clock: C,
    readiness: ReadinessSignal,
    state_notifier: BootstrapStateNotifier,
    state_listener: BootstrapStateListener,
}

impl<R, T, C> Bootstrapper<R, T, C>
where
    R: RoleAcquirer,
    T: MessagingTransport,
    C: Clock,
{
    pub fn new(
        logger: slog::Logger,
        config: TopologyConfig,
        roles: Arc<R>,
        transport: Arc<T>,
        clock: C,
        readiness: ReadinessSignal,
    ) -> Self {
        let (state_notifier, state_listener) = state::new();

        Bootstrapper {
            logger,
            config,
            roles,
            transport,
            clock,
            readiness,
            state_notifier,
            state_listener,
        }
    }

    pub fn state_listener(&self) -> BootstrapStateListener {
        self.state_listener.clone()
    }

    pub async fn run(self, shutdown: ShutdownSignal) -> Result<BootstrapOutcome, BootstrapError> {
        slog::info!(self.logger, "Initializing topology...");

        self.transition(BootstrapState::Electing);
        let acquired = match self.elect(&shutdown).await? {
            Some(acquired) => acquired,
            None => return Ok(self.cancel()),
        };

        self.transition(BootstrapState::Polling { acquired });
        if !self.poll_until_ready(acquired, &shutdown).await {
            return Ok(self.cancel());
        }

        slog::info!(self.logger, "Topology initialized; acquired ownership? {}", acquired);
        self.transition(BootstrapState::Ready { acquired });
        self.readiness.set();

        Ok(BootstrapOutcome::Ready { acquired })
    }

    /// Returns `None` if shutdown arrived before an election result was obtained.
    async fn elect(&self, shutdown: &ShutdownSignal) -> Result<Option<bool>, BootstrapError> {
        loop {
            if shutdown.is_triggered() {
                return Ok(None);
            }

            match self
                .roles
                .try_acquire_or_renew(&self.config.role_name, self.config.lease_duration, false)
                .await
            {
                Ok(acquired) => {
                    slog::info!(
                        self.logger,
                        "Election for role '{}' finished; acquired? {}",
                        self.config.role_name,
                        acquired
                    );
                    return Ok(Some(acquired));
                }
                Err(e) if e.is_retryable() => {
                    slog::warn!(
                        self.logger,
                        "Election for role '{}' failed, will retry: {}",
                        self.config.role_name,
                        error_chain(&e)
                    );
                }
                Err(e) => return Err(BootstrapError::Election(e)),
            }

            if !shutdown
                .sleep_unless_triggered(&self.clock, self.config.poll_interval)
                .await
            {
                return Ok(None);
            }
        }
    }

    /// Returns false if interrupted by shutdown.
    async fn poll_until_ready(&self, acquired: bool, shutdown: &ShutdownSignal) -> bool {
        let mut topic_ready = false;
        let mut subscription_ready = false;

        loop {
            if shutdown.is_triggered() {
                return false;
            }

            if !topic_ready {
                let result = verify_topic_exists(&*self.transport, &self.config.topic_id, acquired).await;
                topic_ready = self.observe(ResourceKind::Topic, &self.config.topic_id, result);
            }

            if !subscription_ready {
                let result = verify_subscription_exists(
                    &*self.transport,
                    &self.config.topic_id,
                    &self.config.subscription_id,
                    self.config.ack_deadline,
                    acquired,
                )
                .await;
                subscription_ready = self.observe(ResourceKind::Subscription, &self.config.subscription_id, result);
            }

            if topic_ready && subscription_ready {
                return true;
            }

            if !shutdown
                .sleep_unless_triggered(&self.clock, self.config.poll_interval)
                .await
            {
                return false;
            }
        }
    }

    fn observe(&self, kind: ResourceKind, id: &str, result: Result<bool, TransportError>) -> bool {
        match result {
            Ok(true) => {
                slog::debug!(self.logger, "{} '{}' is ready", kind, id);
                true
            }
            Ok(false) => {
                slog::info!(self.logger, "Waiting for {} '{}' to be created...", kind, id);
                false
            }
            Err(e) => {
                slog::warn!(self.logger, "Checking {} '{}' failed: {}", kind, id, e);
                false
            }
        }
    }

    fn transition(&self, new_state: BootstrapState) {
        slog::debug!(self.logger, "Bootstrap state -> {:?}", new_state);
        self.state_notifier.notify_new_state(new_state);
    }

    fn cancel(&self) -> BootstrapOutcome {
        slog::info!(self.logger, "Topology initialization cancelled");
        self.transition(BootstrapState::Cancelled);
        BootstrapOutcome::Cancelled
    }
}
