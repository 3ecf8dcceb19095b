use crate::time::{Clock, RealClock};
use crate::transport::{AckId, MessageId, MessagingTransport, ReceivedMessage, ResourceKind, TransportError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

// This models the semantics the loops rely on (idempotent topology, fan-out, ack deadlines),
// not a real broker. Every subscription has its own queue of pending messages and a table of
// messages that were delivered but not acknowledged yet.
pub struct InMemoryTransport<C: Clock = RealClock> {
    state: Mutex<State>,
    clock: C,
    unavailable: AtomicBool,
    topic_creations: AtomicUsize,
    subscription_creations: AtomicUsize,
    pulls: AtomicUsize,
}

#[derive(Default)]
struct State {
    topics: HashSet<String>,
    subscriptions: HashMap<String, Subscription>,
    next_message_id: u64,
    next_ack_id: u64,
}

struct Subscription {
    topic_id: String,
    ack_deadline: chrono::Duration,
    pending: VecDeque<PendingMessage>,
    outstanding: HashMap<AckId, OutstandingMessage>,
}

#[derive(Clone)]
struct PendingMessage {
    message_id: MessageId,
    payload: Bytes,
    delivery_attempt: u32,
}

struct OutstandingMessage {
    message: PendingMessage,
    redeliver_at: DateTime<Utc>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::with_clock(RealClock)
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> InMemoryTransport<C> {
    pub fn with_clock(clock: C) -> Self {
        InMemoryTransport {
            state: Mutex::new(State::default()),
            clock,
            unavailable: AtomicBool::new(false),
            topic_creations: AtomicUsize::new(0),
            subscription_creations: AtomicUsize::new(0),
            pulls: AtomicUsize::new(0),
        }
    }

    /// While unavailable, every operation fails with `TransportError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::Release);
    }

    /// Number of successful `create_topic` calls.
    pub fn topic_creations(&self) -> usize {
        self.topic_creations.load(Ordering::Acquire)
    }

    /// Number of successful `create_subscription` calls.
    pub fn subscription_creations(&self) -> usize {
        self.subscription_creations.load(Ordering::Acquire)
    }

    /// Number of `pull` calls that reached an existing subscription.
    pub fn pull_count(&self) -> usize {
        self.pulls.load(Ordering::Acquire)
    }

    /// Messages not yet acknowledged on `subscription_id`, whether delivered or not.
    pub fn unacknowledged(&self, subscription_id: &str) -> usize {
        self.state()
            .subscriptions
            .get(subscription_id)
            .map(|s| s.pending.len() + s.outstanding.len())
            .unwrap_or(0)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("InMemoryTransport mutex guard poison")
    }

    fn check_available(&self) -> Result<(), TransportError> {
        if self.unavailable.load(Ordering::Acquire) {
            return Err(TransportError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

impl Subscription {
    fn requeue_expired(&mut self, now: DateTime<Utc>) {
        let expired: Vec<AckId> = self
            .outstanding
            .iter()
            .filter(|(_, m)| m.redeliver_at <= now)
            .map(|(ack_id, _)| ack_id.clone())
            .collect();

        for ack_id in expired {
            if let Some(outstanding) = self.outstanding.remove(&ack_id) {
                let mut message = outstanding.message;
                message.delivery_attempt += 1;
                self.pending.push_back(message);
            }
        }
    }
}

fn not_found(kind: ResourceKind, id: &str) -> TransportError {
    TransportError::NotFound {
        kind,
        id: id.to_string(),
    }
}

#[async_trait::async_trait]
impl<C: Clock> MessagingTransport for InMemoryTransport<C> {
    async fn topic_exists(&self, topic_id: &str) -> Result<bool, TransportError> {
        self.check_available()?;
        Ok(self.state().topics.contains(topic_id))
    }

    async fn create_topic(&self, topic_id: &str) -> Result<(), TransportError> {
        self.check_available()?;
        if !self.state().topics.insert(topic_id.to_string()) {
            return Err(TransportError::AlreadyExists {
                kind: ResourceKind::Topic,
                id: topic_id.to_string(),
            });
        }
        self.topic_creations.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn subscription_exists(&self, topic_id: &str, subscription_id: &str) -> Result<bool, TransportError> {
        self.check_available()?;
        let exists = self
            .state()
            .subscriptions
            .get(subscription_id)
            .map(|s| s.topic_id == topic_id)
            .unwrap_or(false);
        Ok(exists)
    }

    async fn create_subscription(
        &self,
        topic_id: &str,
        subscription_id: &str,
        ack_deadline: Duration,
    ) -> Result<(), TransportError> {
        self.check_available()?;
        let ack_deadline = chrono::Duration::from_std(ack_deadline)
            .map_err(|_| TransportError::InvalidArgument(format!("ack deadline {:?} out of range", ack_deadline)))?;

        let mut state = self.state();
        if !state.topics.contains(topic_id) {
            return Err(not_found(ResourceKind::Topic, topic_id));
        }
        if let Some(existing) = state.subscriptions.get(subscription_id) {
            if existing.topic_id != topic_id {
                return Err(TransportError::SubscriptionOnOtherTopic {
                    subscription_id: subscription_id.to_string(),
                    topic_id: existing.topic_id.clone(),
                });
            }
            return Err(TransportError::AlreadyExists {
                kind: ResourceKind::Subscription,
                id: subscription_id.to_string(),
            });
        }
        state.subscriptions.insert(
            subscription_id.to_string(),
            Subscription {
                topic_id: topic_id.to_string(),
                ack_deadline,
                pending: VecDeque::new(),
                outstanding: HashMap::new(),
            },
        );
        self.subscription_creations.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn pull(&self, subscription_id: &str, max_messages: usize) -> Result<Vec<ReceivedMessage>, TransportError> {
        self.check_available()?;
        let now = self.clock.now();

        let mut state = self.state();
        let State {
            subscriptions,
            next_ack_id,
            ..
        } = &mut *state;
        let subscription = subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| not_found(ResourceKind::Subscription, subscription_id))?;
        self.pulls.fetch_add(1, Ordering::AcqRel);

        subscription.requeue_expired(now);

        let mut received = Vec::with_capacity(max_messages.min(subscription.pending.len()));
        while received.len() < max_messages {
            let message = match subscription.pending.pop_front() {
                Some(message) => message,
                None => break,
            };
            *next_ack_id += 1;
            let ack_id = AckId::new(format!("{}-{}", subscription_id, next_ack_id));

            received.push(ReceivedMessage {
                message_id: message.message_id.clone(),
                ack_id: ack_id.clone(),
                payload: message.payload.clone(),
                delivery_attempt: message.delivery_attempt,
            });
            subscription.outstanding.insert(
                ack_id,
                OutstandingMessage {
                    message,
                    redeliver_at: now + subscription.ack_deadline,
                },
            );
        }

        Ok(received)
    }

    async fn acknowledge(&self, subscription_id: &str, ack_ids: &[AckId]) -> Result<(), TransportError> {
        self.check_available()?;
        let mut state = self.state();
        let subscription = state
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| not_found(ResourceKind::Subscription, subscription_id))?;

        // Acks for unknown or expired handles are ignored, like a real broker does.
        for ack_id in ack_ids {
            subscription.outstanding.remove(ack_id);
        }
        Ok(())
    }

    async fn publish(&self, topic_id: &str, payload: Bytes) -> Result<MessageId, TransportError> {
        self.check_available()?;
        let mut state = self.state();
        if !state.topics.contains(topic_id) {
            return Err(not_found(ResourceKind::Topic, topic_id));
        }

        state.next_message_id += 1;
        let message = PendingMessage {
            message_id: MessageId::new(state.next_message_id.to_string()),
            payload,
            delivery_attempt: 1,
        };
        for subscription in state.subscriptions.values_mut().filter(|s| s.topic_id == topic_id) {
            subscription.pending.push_back(message.clone());
        }

        Ok(message.message_id)
    }
}
