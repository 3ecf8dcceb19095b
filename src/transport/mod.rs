//! The messaging transport the topology and consumer loops run against: topics, subscriptions,
//! pull-based delivery with per-message acknowledgement.
mod api;
mod in_memory;

pub use api::AckId;
pub use api::MessageId;
pub use api::MessagingTransport;
pub use api::ReceivedMessage;
pub use api::ResourceKind;
pub use api::TransportError;
pub use in_memory::InMemoryTransport;
