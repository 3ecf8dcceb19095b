use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// RoleLease is the single persisted record for a role. A row whose `lease_expires_at` is in the
/// past is valid and means nobody currently owns the role.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RoleLease {
    pub role_name: String,
    pub lease_expires_at: DateTime<Utc>,
}

impl RoleLease {
    pub fn new(role_name: impl Into<String>, lease_expires_at: DateTime<Utc>) -> Self {
        RoleLease {
            role_name: role_name.into(),
            lease_expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.lease_expires_at < now
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LeaseStoreError {
    #[error("Lease for role '{0}' already exists")]
    AlreadyExists(String),
    #[error("Lease for role '{0}' does not exist")]
    NotFound(String),
    #[error("Lease store unavailable: {0}")]
    Unavailable(String),
}

/// LeaseStore holds at most one [`RoleLease`] per role name. Rows are never deleted.
#[async_trait::async_trait]
pub trait LeaseStore: Send + Sync + 'static {
    async fn get(&self, role_name: &str) -> Result<Option<RoleLease>, LeaseStoreError>;

    /// Insert a new row. Fails with `AlreadyExists` if the role already has one.
    async fn insert(&self, lease: RoleLease) -> Result<(), LeaseStoreError>;

    /// Overwrite an existing row. Fails with `NotFound` if the role has none.
    async fn update(&self, lease: RoleLease) -> Result<(), LeaseStoreError>;
}

/// In-process lease table. Shared between replicas of one process by wrapping it in an `Arc`.
#[derive(Default)]
pub struct InMemoryLeaseStore {
    rows: Mutex<HashMap<String, RoleLease>>,
    unavailable: AtomicBool,
    latency: Option<Duration>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl InMemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation awaits `latency` before touching the table, as a networked store would.
    pub fn with_latency(latency: Duration) -> Self {
        InMemoryLeaseStore {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// While unavailable, every operation fails with `LeaseStoreError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::Release);
    }

    pub fn snapshot(&self, role_name: &str) -> Option<RoleLease> {
        self.rows().get(role_name).cloned()
    }

    pub fn row_count(&self) -> usize {
        self.rows().len()
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Acquire)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Acquire)
    }

    fn rows(&self) -> std::sync::MutexGuard<'_, HashMap<String, RoleLease>> {
        self.rows.lock().expect("InMemoryLeaseStore mutex guard poison")
    }

    async fn simulate_io(&self) -> Result<(), LeaseStoreError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::Acquire) {
            return Err(LeaseStoreError::Unavailable("connection refused".to_string()));
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn get(&self, role_name: &str) -> Result<Option<RoleLease>, LeaseStoreError> {
        self.simulate_io().await?;
        self.reads.fetch_add(1, Ordering::AcqRel);

        Ok(self.rows().get(role_name).cloned())
    }

    async fn insert(&self, lease: RoleLease) -> Result<(), LeaseStoreError> {
        self.simulate_io().await?;

        let mut rows = self.rows();
        if rows.contains_key(&lease.role_name) {
            return Err(LeaseStoreError::AlreadyExists(lease.role_name));
        }
        rows.insert(lease.role_name.clone(), lease);
        self.writes.fetch_add(1, Ordering::AcqRel);

        Ok(())
    }

    async fn update(&self, lease: RoleLease) -> Result<(), LeaseStoreError> {
        self.simulate_io().await?;

        let mut rows = self.rows();
        match rows.get_mut(&lease.role_name) {
            Some(row) => {
                *row = lease;
                self.writes.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
            None => Err(LeaseStoreError::NotFound(lease.role_name)),
        }
    }
}
