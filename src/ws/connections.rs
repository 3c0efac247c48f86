use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::HubError;
use crate::ws::messages::{ServerMessage, Topic};

/// Transport half of a client connection. The hub only needs to push text
/// frames and close; the concrete type is the axum socket in production
/// and a recording mock in tests.
#[async_trait]
pub trait ConnectionSink: Send + Sync {
    async fn send_text(&self, text: String) -> Result<()>;
    async fn close(&self);
}

/// One live client: identity, heartbeat bookkeeping and its side of the
/// topic index.
pub struct Connection {
    pub id: String,
    pub connected_at: DateTime<Utc>,
    last_heartbeat: StdRwLock<DateTime<Utc>>,
    topics: StdRwLock<HashSet<Topic>>,
    sink: Arc<dyn ConnectionSink>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("connected_at", &self.connected_at)
            .finish_non_exhaustive()
    }
}

impl Connection {
    fn new(sink: Arc<dyn ConnectionSink>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            connected_at: now,
            last_heartbeat: StdRwLock::new(now),
            topics: StdRwLock::new(HashSet::new()),
            sink,
        }
    }

    pub async fn send(&self, message: &ServerMessage) -> Result<()> {
        self.sink.send_text(message.to_json()).await
    }

    pub async fn send_raw(&self, frame: String) -> Result<()> {
        self.sink.send_text(frame).await
    }

    pub async fn close(&self) {
        self.sink.close().await;
    }

    /// Record a heartbeat (client ping or protocol-level ping).
    pub fn touch(&self) {
        *self.last_heartbeat.write().unwrap() = Utc::now();
    }

    pub fn last_heartbeat(&self) -> DateTime<Utc> {
        *self.last_heartbeat.read().unwrap()
    }

    pub fn add_topic(&self, topic: Topic) {
        self.topics.write().unwrap().insert(topic);
    }

    pub fn remove_topic(&self, topic: Topic) {
        self.topics.write().unwrap().remove(&topic);
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.topics.read().unwrap().iter().copied().collect()
    }

    #[cfg(test)]
    pub(crate) fn backdate_heartbeat(&self, age: Duration) {
        *self.last_heartbeat.write().unwrap() =
            Utc::now() - ChronoDuration::from_std(age).unwrap();
    }
}

/// Roster of live connections with a capacity cap and staleness queries.
pub struct ConnectionManager {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
    max_connections: usize,
}

impl ConnectionManager {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            max_connections,
        }
    }

    pub async fn register(&self, sink: Arc<dyn ConnectionSink>) -> Result<Arc<Connection>, HubError> {
        let mut connections = self.connections.write().await;
        if connections.len() >= self.max_connections {
            return Err(HubError::TooManyConnections(self.max_connections));
        }
        let connection = Arc::new(Connection::new(sink));
        connections.insert(connection.id.clone(), connection.clone());
        Ok(connection)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn all(&self) -> Vec<Arc<Connection>> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Connections whose last heartbeat is older than `cutoff`.
    pub async fn stale_ids(&self, cutoff: Duration) -> Vec<String> {
        let cutoff = match ChronoDuration::from_std(cutoff) {
            Ok(d) => d,
            Err(_) => return Vec::new(),
        };
        let now = Utc::now();
        self.connections
            .read()
            .await
            .values()
            .filter(|c| now - c.last_heartbeat() > cutoff)
            .map(|c| c.id.clone())
            .collect()
    }
}
