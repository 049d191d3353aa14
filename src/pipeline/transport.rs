//! Queue transport contract and an in-process implementation
//!
//! The transport is at-least-once with a single consumer per queue. Messages
//! carry an opaque binary payload plus a header map; trace context lives in
//! the headers.

use crate::telemetry::{Extractor, Injector};
use crate::{Error, Result, transport_error};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Queue declaration parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSpec {
    pub name: String,
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
}

impl QueueSpec {
    /// Non-durable, non-exclusive, non-auto-delete queue
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: false,
            exclusive: false,
            auto_delete: false,
        }
    }
}

/// A single header value; brokers may hand text back as raw bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Text(String),
    Bytes(Vec<u8>),
}

impl HeaderValue {
    /// Value as UTF-8 text, `None` for non-UTF-8 bytes
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(s) => Some(s),
            HeaderValue::Bytes(b) => std::str::from_utf8(b).ok(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            HeaderValue::Text(s) => s.as_bytes(),
            HeaderValue::Bytes(b) => b,
        }
    }
}

/// Message header map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeaders(BTreeMap<String, HeaderValue>);

impl MessageHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: HeaderValue) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Injector for MessageHeaders {
    fn set(&mut self, key: &str, value: String) {
        self.insert(key, HeaderValue::Text(value));
    }
}

impl Extractor for MessageHeaders {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(HeaderValue::as_str)
    }
}

/// A message handed to [`QueueTransport::publish`]
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub payload: Vec<u8>,
    pub headers: MessageHeaders,
    pub message_id: Option<String>,
    /// Unix timestamp in seconds
    pub timestamp: Option<u64>,
}

/// A message received from a subscription
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub payload: Vec<u8>,
    pub headers: MessageHeaders,
    pub message_id: Option<String>,
    pub timestamp: Option<u64>,
    pub redelivered: bool,
}

/// Stream of deliveries for one subscription
///
/// The stream ending, or yielding an error, means the connection was lost
/// and the subscriber has to subscribe again.
pub type Subscription = BoxStream<'static, Result<Delivery>>;

/// Publish/subscribe contract of the queue broker
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Declare a queue; repeating an identical declaration is a no-op
    async fn declare_queue(&self, spec: &QueueSpec) -> Result<()>;

    /// Publish to the named queue, returning once the broker accepted it
    async fn publish(&self, queue: &str, message: &OutgoingMessage) -> Result<()>;

    /// Start consuming the named queue
    ///
    /// With `auto_ack` the broker considers a message handled as soon as it
    /// is delivered. Manual acknowledgement is not part of this contract and
    /// is rejected.
    async fn subscribe(&self, queue: &str, auto_ack: bool) -> Result<Subscription>;
}

struct QueueState {
    spec: QueueSpec,
    backlog: VecDeque<Delivery>,
    subscriber: Option<mpsc::UnboundedSender<Result<Delivery>>>,
}

/// In-process transport used by tests and local runs
///
/// Messages published while nobody is subscribed wait in a backlog and are
/// handed to the next subscriber. Outages and disconnects can be simulated.
pub struct InMemoryTransport {
    queues: Mutex<HashMap<String, QueueState>>,
    available: AtomicBool,
    next_tag: AtomicU64,
    declarations: AtomicU64,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            next_tag: AtomicU64::new(1),
            declarations: AtomicU64::new(0),
        }
    }

    /// Simulate the broker going down or coming back
    ///
    /// Going down also disconnects the current subscribers.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        if !available {
            self.disconnect();
        }
    }

    /// Drop every active subscription with a connection-lost error
    pub fn disconnect(&self) {
        let Ok(mut queues) = self.queues.lock() else {
            return;
        };

        for (name, state) in queues.iter_mut() {
            if let Some(subscriber) = state.subscriber.take() {
                let _ = subscriber.send(Err(Error::connection_lost(format!(
                    "Connection to queue '{name}' closed"
                ))));
            }
        }
    }

    /// Messages waiting for a subscriber
    pub fn queue_depth(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .ok()
            .and_then(|queues| queues.get(queue).map(|q| q.backlog.len()))
            .unwrap_or(0)
    }

    pub fn is_declared(&self, queue: &str) -> bool {
        self.queues
            .lock()
            .map(|queues| queues.contains_key(queue))
            .unwrap_or(false)
    }

    /// Total number of declare calls, including repeats
    pub fn declaration_count(&self) -> u64 {
        self.declarations.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(transport_error!("In-memory broker is unavailable"))
        }
    }
}

#[async_trait]
impl QueueTransport for InMemoryTransport {
    async fn declare_queue(&self, spec: &QueueSpec) -> Result<()> {
        self.ensure_available()?;
        self.declarations.fetch_add(1, Ordering::SeqCst);

        let mut queues = self
            .queues
            .lock()
            .map_err(|_| Error::internal("Queue registry lock poisoned"))?;

        match queues.get(&spec.name) {
            Some(existing) if existing.spec != *spec => Err(transport_error!(
                "Queue '{}' already declared with different arguments",
                spec.name
            )),
            Some(_) => Ok(()),
            None => {
                queues.insert(
                    spec.name.clone(),
                    QueueState {
                        spec: spec.clone(),
                        backlog: VecDeque::new(),
                        subscriber: None,
                    },
                );
                Ok(())
            }
        }
    }

    async fn publish(&self, queue: &str, message: &OutgoingMessage) -> Result<()> {
        self.ensure_available()?;

        let mut queues = self
            .queues
            .lock()
            .map_err(|_| Error::internal("Queue registry lock poisoned"))?;

        // Like the AMQP default exchange, unroutable messages are discarded
        let Some(state) = queues.get_mut(queue) else {
            tracing::warn!("⚠️  Discarding message for undeclared queue '{}'", queue);
            return Ok(());
        };

        let delivery = Delivery {
            delivery_tag: self.next_tag.fetch_add(1, Ordering::SeqCst),
            payload: message.payload.clone(),
            headers: message.headers.clone(),
            message_id: message.message_id.clone(),
            timestamp: message.timestamp,
            redelivered: false,
        };

        let undelivered = match &state.subscriber {
            Some(subscriber) => subscriber.send(Ok(delivery)).err().map(|e| e.0),
            None => Some(Ok(delivery)),
        };

        // Subscriber went away; keep the message for the next one
        if let Some(Ok(delivery)) = undelivered {
            state.subscriber = None;
            state.backlog.push_back(delivery);
        }

        Ok(())
    }

    async fn subscribe(&self, queue: &str, auto_ack: bool) -> Result<Subscription> {
        self.ensure_available()?;

        if !auto_ack {
            return Err(Error::validation("manual acknowledgement is not supported"));
        }

        let mut queues = self
            .queues
            .lock()
            .map_err(|_| Error::internal("Queue registry lock poisoned"))?;

        let state = queues
            .get_mut(queue)
            .ok_or_else(|| transport_error!("Queue '{}' not found", queue))?;

        let (tx, rx) = mpsc::unbounded_channel();
        while let Some(delivery) = state.backlog.pop_front() {
            let _ = tx.send(Ok(delivery));
        }
        state.subscriber = Some(tx);

        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(payload: &[u8]) -> OutgoingMessage {
        OutgoingMessage {
            payload: payload.to_vec(),
            headers: MessageHeaders::new(),
            message_id: None,
            timestamp: None,
        }
    }

    #[test]
    fn test_header_values() {
        let mut headers = MessageHeaders::new();
        headers.insert("text", HeaderValue::Text("a".to_string()));
        headers.insert("bytes", HeaderValue::Bytes(b"b".to_vec()));
        headers.insert("binary", HeaderValue::Bytes(vec![0xff, 0xfe]));

        assert_eq!(Extractor::get(&headers, "text"), Some("a"));
        assert_eq!(Extractor::get(&headers, "bytes"), Some("b"));
        assert_eq!(Extractor::get(&headers, "binary"), None);
        assert_eq!(Extractor::get(&headers, "missing"), None);
    }

    #[tokio::test]
    async fn test_declare_is_idempotent() {
        let transport = InMemoryTransport::new();
        let spec = QueueSpec::new("votes");

        transport.declare_queue(&spec).await.unwrap();
        transport.declare_queue(&spec).await.unwrap();
        assert!(transport.is_declared("votes"));
        assert_eq!(transport.declaration_count(), 2);

        let mut durable = spec.clone();
        durable.durable = true;
        assert!(transport.declare_queue(&durable).await.is_err());
    }

    #[tokio::test]
    async fn test_backlog_is_delivered_to_subscriber() {
        let transport = InMemoryTransport::new();
        transport.declare_queue(&QueueSpec::new("votes")).await.unwrap();

        transport.publish("votes", &message(b"one")).await.unwrap();
        transport.publish("votes", &message(b"two")).await.unwrap();
        assert_eq!(transport.queue_depth("votes"), 2);

        let mut subscription = transport.subscribe("votes", true).await.unwrap();
        assert_eq!(transport.queue_depth("votes"), 0);

        let first = subscription.next().await.unwrap().unwrap();
        let second = subscription.next().await.unwrap().unwrap();
        assert_eq!(first.payload, b"one");
        assert_eq!(second.payload, b"two");
        assert!(first.delivery_tag < second.delivery_tag);
    }

    #[tokio::test]
    async fn test_outage_and_disconnect() {
        let transport = InMemoryTransport::new();
        transport.declare_queue(&QueueSpec::new("votes")).await.unwrap();
        let mut subscription = transport.subscribe("votes", true).await.unwrap();

        transport.set_available(false);
        assert!(matches!(
            transport.publish("votes", &message(b"x")).await,
            Err(Error::TransportUnavailable { .. })
        ));
        assert!(matches!(
            subscription.next().await,
            Some(Err(Error::ConnectionLost { .. }))
        ));
        assert!(subscription.next().await.is_none());

        transport.set_available(true);
        assert!(transport.subscribe("votes", true).await.is_ok());
    }

    #[tokio::test]
    async fn test_subscribe_rules() {
        let transport = InMemoryTransport::new();
        assert!(transport.subscribe("missing", true).await.is_err());

        transport.declare_queue(&QueueSpec::new("votes")).await.unwrap();
        assert!(matches!(
            transport.subscribe("votes", false).await,
            Err(Error::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_publish_to_undeclared_queue_is_discarded() {
        let transport = InMemoryTransport::new();
        transport.publish("nowhere", &message(b"x")).await.unwrap();
        assert_eq!(transport.queue_depth("nowhere"), 0);
    }
}
