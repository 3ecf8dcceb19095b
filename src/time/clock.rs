use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;

/// Clock is the source of wall-clock time for lease timestamps and the sleeper for every polling
/// loop. Lease expiry is compared across replicas, so `now()` is UTC wall time rather than a
/// process-local monotonic instant.
#[async_trait::async_trait]
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

#[derive(Copy, Clone, Debug, Default)]
pub struct RealClock;

#[async_trait::async_trait]
impl Clock for RealClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Creates a clock whose time only moves when the returned controller advances it.
pub fn mocked_clock() -> (MockClock, MockClockController) {
    let now = Utc::now();
    let (tx, rx) = watch::channel(now);
    let clock = MockClock { current_time: rx };
    let controller = MockClockController {
        current_time: tx,
        time_of_instantiation: now,
    };

    (clock, controller)
}

#[derive(Clone)]
pub struct MockClock {
    current_time: watch::Receiver<DateTime<Utc>>,
}

#[async_trait::async_trait]
impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current_time.borrow()
    }

    async fn sleep(&self, duration: Duration) {
        let deadline = self.now() + to_signed(duration);
        let mut current_time = self.current_time.clone();

        loop {
            if *current_time.borrow() >= deadline {
                return;
            }

            if current_time.changed().await.is_err() {
                // Controller dropped, time will never move again.
                std::future::pending::<()>().await;
            }
        }
    }
}

pub struct MockClockController {
    current_time: watch::Sender<DateTime<Utc>>,
    time_of_instantiation: DateTime<Utc>,
}

impl MockClockController {
    pub fn current_time(&self) -> DateTime<Utc> {
        *self.current_time.borrow()
    }

    pub fn elapsed_time(&self) -> Duration {
        (self.current_time() - self.time_of_instantiation)
            .to_std()
            .expect("MockClock never moves backwards")
    }

    /// Advancing by large steps of time can cause surprising behavior in `sleep()` usage.
    /// The only promise of mock `sleep` is that it will return when `now` is at or past the
    /// deadline computed when it was called. For example, if you call...
    ///
    /// - sleep(1ms), then
    /// - advance(5 min)
    ///
    /// ...then `sleep` returns to its caller when `now` is roughly 5 minutes past its deadline.
    /// Advance the mock clock at smaller increments than the granularity you wish to observe.
    pub fn advance(&self, duration: Duration) {
        let new_now = self.current_time() + to_signed(duration);
        self.current_time.send_replace(new_now);
    }
}

fn to_signed(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).expect("MockClock duration out of range")
}
