mod consumer;
mod errors;
mod lease;
mod monitor;
mod options;
mod replica;
mod shutdown;
mod time;
mod topology;
mod transport;

pub use consumer::ConsumerConfig;
pub use consumer::ConsumerLoop;
pub use consumer::ConsumerStats;
pub use consumer::HandleMessageError;
pub use consumer::LoggingHandler;
pub use consumer::MessageHandler;
pub use lease::AcquireRoleError;
pub use lease::InMemoryLeaseStore;
pub use lease::InMemoryLockGuard;
pub use lease::InMemoryLockProvider;
pub use lease::LeaseStore;
pub use lease::LeaseStoreError;
pub use lease::LockError;
pub use lease::LockProvider;
pub use lease::RoleAcquirer;
pub use lease::RoleLease;
pub use lease::RoleLeaseCoordinator;
pub use monitor::MonitorConfig;
pub use monitor::MonitorLoop;
pub use options::ReplicaOptions;
pub use replica::spawn_replica;
pub use replica::Replica;
pub use replica::ReplicaConfig;
pub use replica::ReplicaCreationError;
pub use replica::ReplicaReport;
pub use replica::ReplicaTaskError;
pub use shutdown::shutdown_signal;
pub use shutdown::ShutdownHandle;
pub use shutdown::ShutdownSignal;
pub use time::mocked_clock;
pub use time::Clock;
pub use time::MockClock;
pub use time::MockClockController;
pub use time::RealClock;
pub use topology::BootstrapError;
pub use topology::BootstrapOutcome;
pub use topology::BootstrapState;
pub use topology::BootstrapStateListener;
pub use topology::Bootstrapper;
pub use topology::ReadinessSignal;
pub use topology::TopologyConfig;
pub use transport::AckId;
pub use transport::InMemoryTransport;
pub use transport::MessageId;
pub use transport::MessagingTransport;
pub use transport::ReceivedMessage;
pub use transport::ResourceKind;
pub use transport::TransportError;

// `crate::{root_mod}` holds no code, only `mod` and `pub use` statements. No `mod` is `pub`; types
// are exported through individual use statements.
