use crate::errors::error_chain;
use crate::shutdown::ShutdownSignal;
use crate::time::{Clock, RealClock};
use crate::topology::ReadinessSignal;
use crate::transport::{MessagingTransport, ReceivedMessage};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ConsumerConfig {
    pub subscription_id: String,
    pub batch_size: usize,
    /// How long to wait after an empty or failed pull before pulling again.
    pub idle_delay: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum HandleMessageError {
    #[error("Payload is not valid UTF-8")]
    Decode(#[from] std::str::Utf8Error),
    #[error("Processing failed: {0}")]
    Processing(String),
}

/// MessageHandler processes one delivered message. Delivery is at-least-once, so handlers must
/// tolerate seeing the same message more than once.
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, message: &ReceivedMessage) -> Result<(), HandleMessageError>;
}

/// Decodes UTF-8 payloads and logs them.
pub struct LoggingHandler {
    logger: slog::Logger,
}

impl LoggingHandler {
    pub fn new(logger: slog::Logger) -> Self {
        LoggingHandler { logger }
    }
}

#[async_trait::async_trait]
impl MessageHandler for LoggingHandler {
    async fn handle(&self, message: &ReceivedMessage) -> Result<(), HandleMessageError> {
        let text = std::str::from_utf8(&message.payload)?;
        slog::info!(self.logger, "Received message: {}", text; "MessageId" => message.message_id.as_str());
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ConsumerStats {
    pub acknowledged: u64,
    pub failed: u64,
}

/// ConsumerLoop waits for the topology to be ready, then pulls, handles and acknowledges messages
/// one at a time until shutdown.
pub struct ConsumerLoop<T, H, C = RealClock>
where
    T: MessagingTransport,
    H: MessageHandler,
    C: Clock,
{
    logger: slog::Logger,
    config: ConsumerConfig,
    transport: Arc<T>,
    handler: Arc<H>,
    clock: C,
}

impl<T, H, C> ConsumerLoop<T, H, C>
where
    T: MessagingTransport,
    H: MessageHandler,
    C: Clock,
{
    pub fn new(logger: slog::Logger, config: ConsumerConfig, transport: Arc<T>, handler: Arc<H>, clock: C) -> Self {
        ConsumerLoop {
            logger,
            config,
            transport,
            handler,
            clock,
        }
    }

    pub async fn run(self, readiness: ReadinessSignal, shutdown: ShutdownSignal) -> ConsumerStats {
        let mut stats = ConsumerStats::default();

        tokio::select! {
            _ = readiness.wait() => {}
            _ = shutdown.triggered() => {
                slog::info!(self.logger, "Consumer stopped before topology was ready");
                return stats;
            }
        }
        slog::info!(self.logger, "Topology ready; starting message consumer...");

        'consume: while !shutdown.is_triggered() {
            let pulled = tokio::select! {
                pulled = self.transport.pull(&self.config.subscription_id, self.config.batch_size) => pulled,
                _ = shutdown.triggered() => break 'consume,
            };

            let messages = match pulled {
                Ok(messages) => messages,
                Err(e) => {
                    slog::warn!(self.logger, "Pull from '{}' failed: {}", self.config.subscription_id, e);
                    Vec::new()
                }
            };

            if messages.is_empty() {
                if !shutdown
                    .sleep_unless_triggered(&self.clock, self.config.idle_delay)
                    .await
                {
                    break;
                }
                continue;
            }

            for message in messages {
                // Whatever is left of the batch is redelivered after its ack deadline.
                if shutdown.is_triggered() {
                    break 'consume;
                }
                if self.process(message).await {
                    stats.acknowledged += 1;
                } else {
                    stats.failed += 1;
                }
            }
        }

        slog::info!(
            self.logger,
            "Consumer stopped; acknowledged {} message(s), {} failure(s)",
            stats.acknowledged,
            stats.failed
        );
        stats
    }

    /// Returns true if the message was handled and acknowledged.
    async fn process(&self, message: ReceivedMessage) -> bool {
        if let Err(e) = self.handler.handle(&message).await {
            slog::warn!(
                self.logger,
                "Handling message {} failed, leaving it for redelivery: {}",
                message.message_id.as_str(),
                error_chain(&e)
            );
            return false;
        }

        match self
            .transport
            .acknowledge(&self.config.subscription_id, &[message.ack_id.clone()])
            .await
        {
            Ok(()) => true,
            Err(e) => {
                slog::warn!(
                    self.logger,
                    "Acknowledging message {} failed: {}",
                    message.message_id.as_str(),
                    e
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::{self, ShutdownHandle};
    use crate::time::{self, MockClock, MockClockController};
    use crate::transport::InMemoryTransport;
    use bytes::Bytes;
    use std::sync::Mutex;
    use tokio::task::JoinHandle;

    const IDLE: Duration = Duration::from_millis(250);

    /// Records every payload it sees and rejects payloads equal to "poison".
    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<String>>,
    }

    impl RecordingHandler {
        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl MessageHandler for RecordingHandler {
        async fn handle(&self, message: &ReceivedMessage) -> Result<(), HandleMessageError> {
            let text = std::str::from_utf8(&message.payload)?.to_string();
            self.seen.lock().unwrap().push(text.clone());
            if text == "poison" {
                return Err(HandleMessageError::Processing("poison pill".to_string()));
            }
            Ok(())
        }
    }

    struct Fixture {
        transport: Arc<InMemoryTransport<MockClock>>,
        handler: Arc<RecordingHandler>,
        controller: MockClockController,
        readiness: ReadinessSignal,
        shutdown: ShutdownHandle,
        task: JoinHandle<ConsumerStats>,
    }

    async fn spawn_consumer() -> Fixture {
        let (clock, controller) = time::mocked_clock();
        let transport = Arc::new(InMemoryTransport::with_clock(clock.clone()));
        transport.create_topic("messages").await.unwrap();
        transport
            .create_subscription("messages", "message-consumers", Duration::from_secs(60))
            .await
            .unwrap();
        let handler = Arc::new(RecordingHandler::default());
        let readiness = ReadinessSignal::new();
        let (shutdown, signal) = shutdown::shutdown_signal();

        let consumer = ConsumerLoop::new(
            slog::Logger::root(slog::Discard, slog::o!()),
            ConsumerConfig {
                subscription_id: "message-consumers".to_string(),
                batch_size: 10,
                idle_delay: IDLE,
            },
            transport.clone(),
            handler.clone(),
            clock,
        );
        let task = tokio::spawn(consumer.run(readiness.clone(), signal));

        Fixture {
            transport,
            handler,
            controller,
            readiness,
            shutdown,
            task,
        }
    }

    async fn publish(f: &Fixture, payload: &'static str) {
        f.transport.publish("messages", Bytes::from(payload)).await.unwrap();
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("Timed out waiting for condition");
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    async fn stop(f: Fixture) -> ConsumerStats {
        f.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), f.task)
            .await
            .expect("consumer should stop promptly")
            .unwrap()
    }

    #[tokio::test]
    async fn nothing_is_pulled_before_readiness() {
        let f = spawn_consumer().await;
        publish(&f, "hello").await;

        settle().await;
        assert_eq!(f.transport.pull_count(), 0);
        assert!(f.handler.seen().is_empty());

        f.readiness.set();
        wait_until(|| f.transport.unacknowledged("message-consumers") == 0).await;

        assert_eq!(f.handler.seen(), vec!["hello".to_string()]);
        assert_eq!(
            stop(f).await,
            ConsumerStats {
                acknowledged: 1,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn failed_message_is_left_unacknowledged_and_loop_continues() {
        let f = spawn_consumer().await;
        publish(&f, "first").await;
        publish(&f, "poison").await;
        publish(&f, "last").await;

        f.readiness.set();
        wait_until(|| f.handler.seen().len() == 3).await;
        settle().await;

        assert_eq!(f.handler.seen(), vec!["first", "poison", "last"]);
        // Only the poison message is still outstanding.
        assert_eq!(f.transport.unacknowledged("message-consumers"), 1);
        assert_eq!(
            stop(f).await,
            ConsumerStats {
                acknowledged: 2,
                failed: 1
            }
        );
    }

    #[tokio::test]
    async fn empty_pull_waits_idle_delay() {
        let f = spawn_consumer().await;
        f.readiness.set();

        wait_until(|| f.transport.pull_count() == 1).await;
        settle().await;
        assert_eq!(f.transport.pull_count(), 1);

        f.controller.advance(IDLE);
        wait_until(|| f.transport.pull_count() == 2).await;
        settle().await;
        assert_eq!(f.transport.pull_count(), 2);

        stop(f).await;
    }

    #[tokio::test]
    async fn pull_failures_are_retried() {
        let f = spawn_consumer().await;
        publish(&f, "hello").await;
        f.transport.set_available(false);
        f.readiness.set();

        settle().await;
        assert!(f.handler.seen().is_empty());

        f.transport.set_available(true);
        while f.handler.seen().is_empty() {
            f.controller.advance(IDLE);
            settle().await;
        }

        assert_eq!(f.handler.seen(), vec!["hello".to_string()]);
        stop(f).await;
    }

    #[tokio::test]
    async fn shutdown_before_readiness_exits_promptly() {
        let f = spawn_consumer().await;
        settle().await;

        assert_eq!(stop(f).await, ConsumerStats::default());
    }

    #[tokio::test]
    async fn logging_handler_rejects_invalid_utf8() {
        let handler = LoggingHandler::new(slog::Logger::root(slog::Discard, slog::o!()));
        let mut message = ReceivedMessage {
            message_id: crate::transport::MessageId::new("1"),
            ack_id: crate::transport::AckId::new("a-1"),
            payload: Bytes::from_static(b"Hello, World!"),
            delivery_attempt: 1,
        };
        handler.handle(&message).await.unwrap();

        message.payload = Bytes::from_static(&[0xff, 0xfe]);
        assert!(matches!(
            handler.handle(&message).await,
            Err(HandleMessageError::Decode(_))
        ));
    }
}
