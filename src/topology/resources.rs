use crate::transport::{MessagingTransport, TransportError};
use std::time::Duration;

/// Returns whether the topic exists after this call. With `create_if_missing`, a missing topic is
/// created, and losing a creation race to another process still counts as existing.
pub(crate) async fn verify_topic_exists<T: MessagingTransport>(
    transport: &T,
    topic_id: &str,
    create_if_missing: bool,
) -> Result<bool, TransportError> {
    if transport.topic_exists(topic_id).await? {
        return Ok(true);
    }
    if !create_if_missing {
        return Ok(false);
    }

    match transport.create_topic(topic_id).await {
        Ok(()) | Err(TransportError::AlreadyExists { .. }) => Ok(true),
        Err(e) => Err(e),
    }
}

/// Subscription counterpart of [`verify_topic_exists`].
pub(crate) async fn verify_subscription_exists<T: MessagingTransport>(
    transport: &T,
    topic_id: &str,
    subscription_id: &str,
    ack_deadline: Duration,
    create_if_missing: bool,
) -> Result<bool, TransportError> {
    if transport.subscription_exists(topic_id, subscription_id).await? {
        return Ok(true);
    }
    if !create_if_missing {
        return Ok(false);
    }

    match transport
        .create_subscription(topic_id, subscription_id, ack_deadline)
        .await
    {
        Ok(()) | Err(TransportError::AlreadyExists { .. }) => Ok(true),
        Err(e) => Err(e),
    }
}
