use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Lock provider unavailable: {0}")]
    Unavailable(String),
}

/// LockProvider hands out named mutual-exclusion tokens. A token is released when its guard is
/// dropped, on every exit path of the scope that holds it.
#[async_trait::async_trait]
pub trait LockProvider: Send + Sync + 'static {
    type Guard: Send;

    /// Non-blocking. Returns `Ok(None)` when someone else holds `name`.
    async fn try_acquire(&self, name: &str) -> Result<Option<Self::Guard>, LockError>;
}

#[derive(Clone, Default)]
pub struct InMemoryLockProvider {
    held: Arc<Mutex<HashSet<String>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryLockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::Release);
    }

    pub fn is_held(&self, name: &str) -> bool {
        lock_set(&self.held).contains(name)
    }
}

#[async_trait::async_trait]
impl LockProvider for InMemoryLockProvider {
    type Guard = InMemoryLockGuard;

    async fn try_acquire(&self, name: &str) -> Result<Option<InMemoryLockGuard>, LockError> {
        if self.unavailable.load(Ordering::Acquire) {
            return Err(LockError::Unavailable("connection refused".to_string()));
        }

        if !lock_set(&self.held).insert(name.to_string()) {
            return Ok(None);
        }

        Ok(Some(InMemoryLockGuard {
            name: name.to_string(),
            held: self.held.clone(),
        }))
    }
}

#[derive(Debug)]
pub struct InMemoryLockGuard {
    name: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl Drop for InMemoryLockGuard {
    fn drop(&mut self) {
        lock_set(&self.held).remove(&self.name);
    }
}

fn lock_set(held: &Mutex<HashSet<String>>) -> std::sync::MutexGuard<'_, HashSet<String>> {
    held.lock().expect("InMemoryLockProvider mutex guard poison")
}
