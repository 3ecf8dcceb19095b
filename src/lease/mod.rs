mod coordinator;
mod lock;
mod store;

pub use coordinator::AcquireRoleError;
pub use coordinator::RoleAcquirer;
pub use coordinator::RoleLeaseCoordinator;
pub use lock::InMemoryLockGuard;
pub use lock::InMemoryLockProvider;
pub use lock::LockError;
pub use lock::LockProvider;
pub use store::InMemoryLeaseStore;
pub use store::LeaseStore;
pub use store::LeaseStoreError;
pub use store::RoleLease;
