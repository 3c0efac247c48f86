use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::HubError;
use crate::ws::connections::{Connection, ConnectionManager};
use crate::ws::messages::{event_frame, Topic};

/// Topic-scoped fan-out over live connections.
///
/// The topic index holds connection ids, not handles; delivery resolves
/// each id against the manager so a half-removed connection is just
/// skipped. A failed send evicts the connection everywhere, which keeps a
/// dead client from being retried on every publish.
pub struct BroadcastHub {
    manager: Arc<ConnectionManager>,
    topics: RwLock<HashMap<Topic, HashSet<String>>>,
}

impl BroadcastHub {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self {
            manager,
            topics: RwLock::new(HashMap::new()),
        }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Subscribe a connection to a topic by name. Unknown names are
    /// rejected; subscribing twice is a no-op.
    pub async fn subscribe(&self, conn: &Arc<Connection>, topic_name: &str) -> Result<Topic, HubError> {
        let topic =
            Topic::parse(topic_name).ok_or_else(|| HubError::UnknownTopic(topic_name.to_string()))?;
        self.topics
            .write()
            .await
            .entry(topic)
            .or_default()
            .insert(conn.id.clone());
        conn.add_topic(topic);
        debug!(connection_id = %conn.id, topic = %topic, "subscribed");
        Ok(topic)
    }

    /// Remove a subscription. Absent subscriptions and unknown topic names
    /// are both no-ops; the caller still confirms.
    pub async fn unsubscribe(&self, conn: &Arc<Connection>, topic_name: &str) -> Option<Topic> {
        let topic = Topic::parse(topic_name)?;
        if let Some(subscribers) = self.topics.write().await.get_mut(&topic) {
            subscribers.remove(&conn.id);
        }
        conn.remove_topic(topic);
        Some(topic)
    }

    /// Fan an event out to every subscriber of `topic`. Returns how many
    /// connections received the frame. Sends happen outside the topic
    /// lock; a send failure drops the connection entirely.
    pub async fn publish(&self, topic: Topic, event: &str, data: Value) -> usize {
        let subscribers: Vec<String> = match self.topics.read().await.get(&topic) {
            Some(ids) => ids.iter().cloned().collect(),
            None => return 0,
        };
        if subscribers.is_empty() {
            return 0;
        }

        let frame = event_frame(event, topic, data);
        let mut delivered = 0;
        for id in subscribers {
            let Some(conn) = self.manager.get(&id).await else {
                continue;
            };
            match conn.send_raw(frame.clone()).await {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(connection_id = %id, error = %err, "send failed, dropping connection");
                    self.disconnect(&id).await;
                }
            }
        }
        delivered
    }

    /// Full cleanup for one connection: out of the manager, out of every
    /// topic set, transport closed. Safe to call twice.
    pub async fn disconnect(&self, id: &str) {
        let removed = self.manager.remove(id).await;
        {
            let mut topics = self.topics.write().await;
            for subscribers in topics.values_mut() {
                subscribers.remove(id);
            }
        }
        if let Some(conn) = removed {
            conn.close().await;
            debug!(connection_id = %id, "connection cleaned up");
        }
    }

    pub async fn subscriber_count(&self, topic: Topic) -> usize {
        self.topics
            .read()
            .await
            .get(&topic)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    pub async fn stats(&self) -> Value {
        let topics = self.topics.read().await;
        let by_topic: serde_json::Map<String, Value> = topics
            .iter()
            .map(|(topic, subs)| (topic.as_str().to_string(), json!(subs.len())))
            .collect();
        let total: usize = topics.values().map(|s| s.len()).sum();
        json!({
            "active_connections": self.manager.len().await,
            "total_subscriptions": total,
            "subscriptions_by_topic": by_topic,
            "available_topics": Topic::ALL.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
        })
    }

    /// Drop every connection whose heartbeat is older than `stale_after`.
    pub async fn sweep_stale(&self, stale_after: Duration) -> usize {
        let stale = self.manager.stale_ids(stale_after).await;
        let count = stale.len();
        for id in stale {
            info!(connection_id = %id, "dropping stale connection");
            self.disconnect(&id).await;
        }
        count
    }

    pub async fn shutdown(&self) {
        for conn in self.manager.all().await {
            self.disconnect(&conn.id).await;
        }
    }
}

/// Periodic stale-connection sweep, cancellation-aware.
pub async fn run_sweeper(
    hub: Arc<BroadcastHub>,
    interval: Duration,
    stale_after: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let dropped = hub.sweep_stale(stale_after).await;
                if dropped > 0 {
                    debug!(dropped, "stale connection sweep");
                }
            }
        }
    }
}
