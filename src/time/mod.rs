mod clock;

pub use clock::mocked_clock;
pub use clock::Clock;
pub use clock::MockClock;
pub use clock::MockClockController;
pub use clock::RealClock;
