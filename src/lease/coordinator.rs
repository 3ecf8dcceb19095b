use crate::lease::lock::{LockError, LockProvider};
use crate::lease::store::{LeaseStore, LeaseStoreError, RoleLease};
use crate::time::{Clock, RealClock};
use std::sync::Arc;
use std::time::Duration;

const MAX_ROLE_NAME_LEN: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum AcquireRoleError {
    #[error("Invalid role name {0:?}: {1}")]
    InvalidRoleName(String, &'static str),
    #[error("Lease duration must be positive")]
    NonPositiveLeaseDuration,
    #[error("Lease duration {0:?} is out of range")]
    LeaseDurationOutOfRange(Duration),
    #[error("Lease store failure")]
    Store(#[from] LeaseStoreError),
    #[error("Lock provider failure")]
    Lock(#[from] LockError),
}

impl AcquireRoleError {
    /// Infrastructure failures are worth retrying on the caller's cadence. Bad input is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            AcquireRoleError::Store(_) | AcquireRoleError::Lock(_) => true,
            AcquireRoleError::InvalidRoleName(..)
            | AcquireRoleError::NonPositiveLeaseDuration
            | AcquireRoleError::LeaseDurationOutOfRange(_) => false,
        }
    }
}

/// RoleAcquirer grants or denies time-bounded ownership of a named cluster role.
///
/// A `true` result only promises exclusivity until the lease expires. Nothing about the caller's
/// identity is recorded, so ownership means "some replica renewed before expiry".
#[async_trait::async_trait]
pub trait RoleAcquirer: Send + Sync + 'static {
    /// Contention (lock busy, or lease held and unexpired without `renew_existing`) is `Ok(false)`.
    async fn try_acquire_or_renew(
        &self,
        role_name: &str,
        lease_duration: Duration,
        renew_existing: bool,
    ) -> Result<bool, AcquireRoleError>;
}

/// RoleLeaseCoordinator implements [`RoleAcquirer`] as a check-and-set on a [`LeaseStore`] row,
/// serialized per role through a [`LockProvider`].
pub struct RoleLeaseCoordinator<S, L, C = RealClock>
where
    S: LeaseStore,
    L: LockProvider,
    C: Clock,
{
    logger: slog::Logger,
    store: Arc<S>,
    locks: Arc<L>,
    clock: C,
    lease_buffer: Duration,
}

impl<S, L> RoleLeaseCoordinator<S, L>
where
    S: LeaseStore,
    L: LockProvider,
{
    pub fn new(logger: slog::Logger, store: Arc<S>, locks: Arc<L>, lease_buffer: Duration) -> Self {
        Self::with_clock(logger, store, locks, lease_buffer, RealClock)
    }
}

impl<S, L, C> RoleLeaseCoordinator<S, L, C>
where
    S: LeaseStore,
    L: LockProvider,
    C: Clock,
{
    pub fn with_clock(logger: slog::Logger, store: Arc<S>, locks: Arc<L>, lease_buffer: Duration, clock: C) -> Self {
        RoleLeaseCoordinator {
            logger,
            store,
            locks,
            clock,
            lease_buffer,
        }
    }

    fn lock_name(role_name: &str) -> String {
        format!("cluster-role:{}", role_name)
    }

    async fn check_and_set(
        &self,
        role_name: &str,
        lease_duration: Duration,
        lease_extension: chrono::Duration,
        renew_existing: bool,
    ) -> Result<bool, AcquireRoleError> {
        let existing_lease = self.store.get(role_name).await?;
        let now = self.clock.now();
        let new_expiry = now
            .checked_add_signed(lease_extension)
            .ok_or(AcquireRoleError::LeaseDurationOutOfRange(lease_duration))?;

        match existing_lease {
            None => match self.store.insert(RoleLease::new(role_name, new_expiry)).await {
                Ok(()) => {
                    slog::debug!(self.logger, "Created lease for role '{}' until {}", role_name, new_expiry);
                    Ok(true)
                }
                // Someone outside our lock won the insert; their row stands.
                Err(LeaseStoreError::AlreadyExists(_)) => Ok(false),
                Err(e) => Err(e.into()),
            },
            Some(mut lease) if lease.is_expired_at(now) || renew_existing => {
                slog::debug!(
                    self.logger,
                    "{} lease for role '{}' until {}",
                    if renew_existing { "Renewing existing" } else { "Acquiring expired" },
                    role_name,
                    new_expiry
                );
                lease.lease_expires_at = new_expiry;
                self.store.update(lease).await?;
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }
}

#[async_trait::async_trait]
impl<S, L, C> RoleAcquirer for RoleLeaseCoordinator<S, L, C>
where
    S: LeaseStore,
    L: LockProvider,
    C: Clock,
{
    async fn try_acquire_or_renew(
        &self,
        role_name: &str,
        lease_duration: Duration,
        renew_existing: bool,
    ) -> Result<bool, AcquireRoleError> {
        validate_role_name(role_name)?;
        if lease_duration.is_zero() {
            return Err(AcquireRoleError::NonPositiveLeaseDuration);
        }
        let lease_extension = lease_duration
            .checked_add(self.lease_buffer)
            .and_then(|extension| chrono::Duration::from_std(extension).ok())
            .ok_or(AcquireRoleError::LeaseDurationOutOfRange(lease_duration))?;

        // Held until this function returns, whichever way it returns.
        let _guard = match self.locks.try_acquire(&Self::lock_name(role_name)).await? {
            Some(guard) => guard,
            None => {
                slog::debug!(self.logger, "Lock for role '{}' is busy", role_name);
                return Ok(false);
            }
        };

        self.check_and_set(role_name, lease_duration, lease_extension, renew_existing)
            .await
    }
}

fn validate_role_name(role_name: &str) -> Result<(), AcquireRoleError> {
    let invalid = |reason| Err(AcquireRoleError::InvalidRoleName(role_name.to_string(), reason));

    if role_name.is_empty() {
        return invalid("must not be empty");
    }
    if role_name.len() > MAX_ROLE_NAME_LEN {
        return invalid("must be at most 128 bytes");
    }
    if !role_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return invalid("may only contain ASCII letters, digits, '-', '_' and '.'");
    }

    Ok(())
}
