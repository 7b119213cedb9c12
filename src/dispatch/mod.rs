//! Dispatch Channel: fire-and-forget broadcast from coordinator to runtimes
//!
//! Two logical topics, each a `tokio::sync::broadcast` channel. Publishing
//! never waits and never fails: with no subscribers the message is dropped,
//! and a subscriber that falls behind loses messages (it sees `Lagged`).
//! Messages carry only the transaction id; receivers re-read the store.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Fanned out to every registered worker
    Workers,
    /// Consumed by the single agent stage
    Agent,
}

impl Topic {
    pub fn channel_name(&self) -> &'static str {
        match self {
            Topic::Workers => "sentinels:input",
            Topic::Agent => "agent:input",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.channel_name())
    }
}

/// Wire message for both topics: `{"transaction_id": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchMessage {
    pub transaction_id: String,
}

impl DispatchMessage {
    pub fn new(transaction_id: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Debug, Clone)]
pub struct DispatchChannel {
    workers_tx: broadcast::Sender<DispatchMessage>,
    agent_tx: broadcast::Sender<DispatchMessage>,
}

impl DispatchChannel {
    pub fn new(capacity: usize) -> Self {
        let (workers_tx, _) = broadcast::channel(capacity);
        let (agent_tx, _) = broadcast::channel(capacity);
        Self {
            workers_tx,
            agent_tx,
        }
    }

    fn sender(&self, topic: Topic) -> &broadcast::Sender<DispatchMessage> {
        match topic {
            Topic::Workers => &self.workers_tx,
            Topic::Agent => &self.agent_tx,
        }
    }

    /// At-most-once broadcast. Returns how many subscribers were handed the
    /// message at send time; delivery is still not guaranteed.
    pub fn publish(&self, topic: Topic, message: DispatchMessage) -> usize {
        let transaction_id = message.transaction_id.clone();
        match self.sender(topic).send(message) {
            Ok(receivers) => {
                debug!(
                    topic = %topic,
                    transaction_id = %transaction_id,
                    receivers,
                    "dispatch published"
                );
                receivers
            }
            Err(_) => {
                warn!(
                    topic = %topic,
                    transaction_id = %transaction_id,
                    "dispatch dropped: no subscribers"
                );
                0
            }
        }
    }

    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<DispatchMessage> {
        self.sender(topic).subscribe()
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.sender(topic).receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let msg = DispatchMessage::new("tx-1");
        assert_eq!(msg.encode().unwrap(), r#"{"transaction_id":"tx-1"}"#);
        assert_eq!(DispatchMessage::decode(r#"{"transaction_id":"tx-1"}"#).unwrap(), msg);
        assert!(DispatchMessage::decode(r#"{"id":"tx-1"}"#).is_err());
    }

    #[test]
    fn test_publish_without_subscribers_is_dropped() {
        let channel = DispatchChannel::new(8);
        assert_eq!(channel.publish(Topic::Workers, DispatchMessage::new("tx")), 0);
    }

    #[tokio::test]
    async fn test_workers_topic_fans_out_to_every_subscriber() {
        let channel = DispatchChannel::new(8);
        let mut a = channel.subscribe(Topic::Workers);
        let mut b = channel.subscribe(Topic::Workers);
        let mut agent = channel.subscribe(Topic::Agent);

        assert_eq!(channel.publish(Topic::Workers, DispatchMessage::new("tx")), 2);

        assert_eq!(a.recv().await.unwrap().transaction_id, "tx");
        assert_eq!(b.recv().await.unwrap().transaction_id, "tx");
        assert!(matches!(
            agent.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags() {
        let channel = DispatchChannel::new(2);
        let mut rx = channel.subscribe(Topic::Agent);
        for i in 0..4 {
            channel.publish(Topic::Agent, DispatchMessage::new(format!("tx-{i}")));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(2))
        ));
        assert_eq!(rx.recv().await.unwrap().transaction_id, "tx-2");
    }
}
