use bytes::Bytes;
use std::fmt;
use std::time::Duration;

/// Opaque delivery handle, valid for acknowledging one delivery of one message.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct AckId(String);

impl AckId {
    pub fn new(ack_id: impl Into<String>) -> Self {
        AckId(ack_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(message_id: impl Into<String>) -> Self {
        MessageId(message_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub ack_id: AckId,
    pub payload: Bytes,
    /// 1 on first delivery, incremented on every redelivery after a missed ack deadline.
    pub delivery_attempt: u32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ResourceKind {
    Topic,
    Subscription,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Topic => write!(f, "topic"),
            ResourceKind::Subscription => write!(f, "subscription"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("{kind} '{id}' already exists")]
    AlreadyExists { kind: ResourceKind, id: String },
    #[error("{kind} '{id}' not found")]
    NotFound { kind: ResourceKind, id: String },
    #[error("subscription '{subscription_id}' is attached to topic '{topic_id}'")]
    SubscriptionOnOtherTopic { subscription_id: String, topic_id: String },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Messaging transport unavailable: {0}")]
    Unavailable(String),
}

#[async_trait::async_trait]
pub trait MessagingTransport: Send + Sync + 'static {
    async fn topic_exists(&self, topic_id: &str) -> Result<bool, TransportError>;

    /// Fails with `AlreadyExists` if the topic exists.
    async fn create_topic(&self, topic_id: &str) -> Result<(), TransportError>;

    /// True only if the subscription exists and is attached to `topic_id`.
    async fn subscription_exists(&self, topic_id: &str, subscription_id: &str) -> Result<bool, TransportError>;

    /// Fails with `AlreadyExists` if the subscription exists on `topic_id`,
    /// `SubscriptionOnOtherTopic` if it exists on a different topic, `NotFound` if the topic doesn't.
    async fn create_subscription(
        &self,
        topic_id: &str,
        subscription_id: &str,
        ack_deadline: Duration,
    ) -> Result<(), TransportError>;

    /// Returns at most `max_messages`. An empty result means nothing is pending right now.
    async fn pull(&self, subscription_id: &str, max_messages: usize) -> Result<Vec<ReceivedMessage>, TransportError>;

    async fn acknowledge(&self, subscription_id: &str, ack_ids: &[AckId]) -> Result<(), TransportError>;

    async fn publish(&self, topic_id: &str, payload: Bytes) -> Result<MessageId, TransportError>;
}
