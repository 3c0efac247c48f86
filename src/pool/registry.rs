use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::agent::PoolAgent;
use crate::error::PoolError;
use crate::model::{AgentSnapshot, AgentStatus};

/// Concurrency-safe roster of live agents, keyed by agent id.
///
/// Agents are handed out as `Arc<PoolAgent>` so dispatches that are already
/// in flight keep a valid handle after eviction.
pub struct ExecutorRegistry {
    agents: RwLock<HashMap<String, Arc<PoolAgent>>>,
    max_agents: usize,
}

impl ExecutorRegistry {
    pub fn new(max_agents: usize) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            max_agents,
        }
    }

    /// Admit a new agent. Rejects duplicates by name and enforces the
    /// capacity cap.
    pub async fn insert(&self, agent: Arc<PoolAgent>) -> Result<(), PoolError> {
        let mut agents = self.agents.write().await;
        if agents.len() >= self.max_agents {
            return Err(PoolError::AtCapacity(self.max_agents));
        }
        if agents.values().any(|a| a.name == agent.name) {
            return Err(PoolError::DuplicateName(agent.name.clone()));
        }
        agents.insert(agent.id.clone(), agent);
        Ok(())
    }

    pub async fn get(&self, agent_id: &str) -> Option<Arc<PoolAgent>> {
        self.agents.read().await.get(agent_id).cloned()
    }

    /// Begin graceful removal: flip the agent to `ShuttingDown` so it stops
    /// appearing in selection snapshots, then evict it from the roster.
    /// Returns the handle so the caller can finish persistence and logging.
    pub async fn remove(&self, agent_id: &str) -> Result<Arc<PoolAgent>, PoolError> {
        let agent = self
            .get(agent_id)
            .await
            .ok_or_else(|| PoolError::AgentNotFound(agent_id.to_string()))?;
        agent.set_status(AgentStatus::ShuttingDown).await;

        let mut agents = self.agents.write().await;
        agents.remove(agent_id);
        Ok(agent)
    }

    pub async fn list(&self) -> Vec<Arc<PoolAgent>> {
        self.agents.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    /// Snapshot of every agent currently eligible for selection.
    pub async fn active_snapshot(&self) -> Vec<AgentSnapshot> {
        let agents = self.list().await;
        let mut out = Vec::with_capacity(agents.len());
        for agent in agents {
            if agent.status().await == AgentStatus::Active {
                out.push(agent.snapshot().await);
            }
        }
        out
    }

    pub async fn active_count(&self) -> usize {
        let mut count = 0;
        for agent in self.list().await {
            if agent.status().await == AgentStatus::Active {
                count += 1;
            }
        }
        count
    }

    pub async fn workloads(&self) -> HashMap<String, usize> {
        self.list()
            .await
            .into_iter()
            .map(|a| (a.name.clone(), a.workload()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::SimulatedProcessor;

    fn agent(name: &str) -> Arc<PoolAgent> {
        Arc::new(PoolAgent::new(name, "worker", Arc::new(SimulatedProcessor)))
    }

    #[tokio::test]
    async fn rejects_duplicate_names() {
        let registry = ExecutorRegistry::new(10);
        registry.insert(agent("Alpha")).await.unwrap();
        let err = registry.insert(agent("Alpha")).await.unwrap_err();
        assert_eq!(err, PoolError::DuplicateName("Alpha".to_string()));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn enforces_capacity() {
        let registry = ExecutorRegistry::new(2);
        registry.insert(agent("Alpha")).await.unwrap();
        registry.insert(agent("Beta")).await.unwrap();
        let err = registry.insert(agent("Gamma")).await.unwrap_err();
        assert_eq!(err, PoolError::AtCapacity(2));
    }

    #[tokio::test]
    async fn remove_unknown_agent_leaves_roster_unchanged() {
        let registry = ExecutorRegistry::new(10);
        registry.insert(agent("Alpha")).await.unwrap();

        let err = registry.remove("no-such-id").await.unwrap_err();
        assert!(matches!(err, PoolError::AgentNotFound(_)));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn removed_agent_disappears_from_snapshots() {
        let registry = ExecutorRegistry::new(10);
        let alpha = agent("Alpha");
        let id = alpha.id.clone();
        registry.insert(alpha).await.unwrap();
        registry.insert(agent("Beta")).await.unwrap();

        let removed = registry.remove(&id).await.unwrap();
        assert_eq!(removed.status().await, AgentStatus::ShuttingDown);

        let snapshot = registry.active_snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "Beta");
    }
}
