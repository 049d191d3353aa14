//! The asynchronous vote pipeline
//!
//! Votes flow publisher → queue → consumer → counter store; the tally
//! reader serves the read side.

pub mod amqp;
pub mod codec;
pub mod consumer;
pub mod publisher;
pub mod store;
pub mod tally;
pub mod transport;

pub use amqp::AmqpTransport;
pub use codec::{DecodedVote, VoteCodec};
pub use consumer::{ConsumerState, DeliveryOutcome, DeliveryReport, ReconnectPolicy, VoteConsumer};
pub use publisher::VotePublisher;
pub use store::{CounterStore, InMemoryCounterStore, RedisCounterStore};
pub use tally::TallyReader;
pub use transport::{
    Delivery, HeaderValue, InMemoryTransport, MessageHeaders, OutgoingMessage, QueueSpec,
    QueueTransport, Subscription,
};
