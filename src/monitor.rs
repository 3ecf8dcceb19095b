use crate::errors::error_chain;
use crate::lease::RoleAcquirer;
use crate::shutdown::ShutdownSignal;
use crate::time::{Clock, RealClock};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub role_name: String,
    /// Tick period while owning the role, and the lease duration requested on each tick. Ticks
    /// that don't end up owning the role wait twice as long.
    pub period: Duration,
}

/// MonitorLoop keeps contesting (or, once owned, renewing) a heartbeat role until shutdown.
pub struct MonitorLoop<R, C = RealClock>
where
    R: RoleAcquirer,
    C: Clock,
{
    logger: slog::Logger,
    config: MonitorConfig,
    roles: Arc<R>,
    clock: C,
}

impl<R, C> MonitorLoop<R, C>
where
    R: RoleAcquirer,
    C: Clock,
{
    pub fn new(logger: slog::Logger, config: MonitorConfig, roles: Arc<R>, clock: C) -> Self {
        MonitorLoop {
            logger,
            config,
            roles,
            clock,
        }
    }

    pub async fn run(self, shutdown: ShutdownSignal) {
        let mut currently_owned = false;

        while !shutdown.is_triggered() {
            // The lease write is allowed to finish; shutdown is only observed between ticks.
            let result = self
                .roles
                .try_acquire_or_renew(&self.config.role_name, self.config.period, currently_owned)
                .await;

            currently_owned = match result {
                Ok(true) => {
                    slog::info!(self.logger, "[Monitoring] Acquired or renewed lease");
                    true
                }
                Ok(false) => {
                    slog::debug!(self.logger, "[Monitoring] Role '{}' owned elsewhere", self.config.role_name);
                    false
                }
                Err(e) => {
                    slog::warn!(self.logger, "[Monitoring] Lease check failed: {}", error_chain(&e));
                    false
                }
            };

            let delay = if currently_owned {
                self.config.period
            } else {
                self.config.period.checked_mul(2).unwrap_or(Duration::MAX)
            };
            if !shutdown.sleep_unless_triggered(&self.clock, delay).await {
                break;
            }
        }

        slog::info!(self.logger, "[Monitoring] Stopped");
    }
}
