// Transport trait for broker connections
use super::endpoint::BrokerEndpoint;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use tokio::sync::mpsc;

/// Identifies one transport connection for its whole life
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Events a broker connection reports back to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Message { topic: String, payload: String },
    Error(String),
    Closed,
    Reconnecting,
    Offline,
    Ended,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportEnvelope {
    pub handle: HandleId,
    pub event: TransportEvent,
}

/// Where a transport delivers its events
pub type EventSender = mpsc::Sender<TransportEnvelope>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Start connecting. Progress is reported through `events`; the returned
    /// client is usable immediately and queues requests until connected.
    async fn connect(
        &self,
        handle: HandleId,
        endpoint: &BrokerEndpoint,
        events: EventSender,
    ) -> anyhow::Result<Box<dyn TransportClient>>;
}

#[async_trait]
pub trait TransportClient: Send {
    /// Subscribe at the weakest delivery guarantee (at most once)
    async fn subscribe(&mut self, topic: &str) -> anyhow::Result<()>;

    async fn publish(&mut self, topic: &str, payload: Bytes) -> anyhow::Result<()>;

    /// Disconnect and stop delivering events
    async fn end(&mut self) -> anyhow::Result<()>;
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Connect { handle: HandleId, url: String },
        Subscribe { handle: HandleId, topic: String },
        Publish { handle: HandleId, topic: String, payload: String },
        End { handle: HandleId },
    }

    /// In-process transport recording every call; events are injected by
    /// the test through the captured sender.
    #[derive(Clone, Default)]
    pub struct FakeTransport {
        pub calls: Arc<Mutex<Vec<Call>>>,
        pub senders: Arc<Mutex<Vec<(HandleId, EventSender)>>>,
        pub fail_connect: Arc<Mutex<bool>>,
        pub failing_topics: Arc<Mutex<Vec<String>>>,
    }

    impl FakeTransport {
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn sender(&self, handle: HandleId) -> Option<EventSender> {
            self.senders
                .lock()
                .unwrap()
                .iter()
                .find(|(h, _)| *h == handle)
                .map(|(_, s)| s.clone())
        }

        pub fn live_handles(&self) -> Vec<HandleId> {
            let calls = self.calls();
            let mut live = Vec::new();
            for call in calls {
                match call {
                    Call::Connect { handle, .. } => live.push(handle),
                    Call::End { handle } => live.retain(|h| *h != handle),
                    _ => {}
                }
            }
            live
        }

        pub fn published(&self) -> Vec<(String, String)> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Publish { topic, payload, .. } => Some((topic, payload)),
                    _ => None,
                })
                .collect()
        }
    }

    struct FakeClient {
        handle: HandleId,
        transport: FakeTransport,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn connect(
            &self,
            handle: HandleId,
            endpoint: &BrokerEndpoint,
            events: EventSender,
        ) -> anyhow::Result<Box<dyn TransportClient>> {
            if *self.fail_connect.lock().unwrap() {
                anyhow::bail!("connection refused");
            }
            self.calls.lock().unwrap().push(Call::Connect {
                handle,
                url: endpoint.url(),
            });
            self.senders.lock().unwrap().push((handle, events));
            Ok(Box::new(FakeClient {
                handle,
                transport: self.clone(),
            }))
        }
    }

    #[async_trait]
    impl TransportClient for FakeClient {
        async fn subscribe(&mut self, topic: &str) -> anyhow::Result<()> {
            if self
                .transport
                .failing_topics
                .lock()
                .unwrap()
                .iter()
                .any(|t| t == topic)
            {
                anyhow::bail!("not authorized for {}", topic);
            }
            self.transport.calls.lock().unwrap().push(Call::Subscribe {
                handle: self.handle,
                topic: topic.to_string(),
            });
            Ok(())
        }

        async fn publish(&mut self, topic: &str, payload: Bytes) -> anyhow::Result<()> {
            self.transport.calls.lock().unwrap().push(Call::Publish {
                handle: self.handle,
                topic: topic.to_string(),
                payload: String::from_utf8_lossy(&payload).into_owned(),
            });
            Ok(())
        }

        async fn end(&mut self) -> anyhow::Result<()> {
            self.transport
                .calls
                .lock()
                .unwrap()
                .push(Call::End { handle: self.handle });
            Ok(())
        }
    }
}
