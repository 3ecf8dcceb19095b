mod bootstrapper;
mod readiness;
mod resources;
mod state;

pub use bootstrapper::BootstrapError;
pub use bootstrapper::BootstrapOutcome;
pub use bootstrapper::Bootstrapper;
pub use bootstrapper::TopologyConfig;
pub use readiness::ReadinessSignal;
pub use state::BootstrapState;
pub use state::BootstrapStateListener;
