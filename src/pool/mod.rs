pub mod autoscaler;
pub mod metrics;
pub mod queue;
pub mod registry;
pub mod select;
pub mod worker;

use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::{PoolAgent, Processor, SimulatedProcessor};
use crate::config::Settings;
use crate::db::{AgentCreate, Db, LogCreate, QueryBuilder, TaskCreate};
use crate::error::PoolError;
use crate::model::{AgentStatus, PerformanceSnapshot, PoolMetrics, TaskSpec};
use crate::pool::queue::TaskQueue;
use crate::pool::registry::ExecutorRegistry;
use crate::pool::select::SelectionPolicy;
use crate::ws::hub::{run_sweeper, BroadcastHub};
use crate::ws::messages::Topic;

/// State shared by the pool facade and its background loops.
pub(crate) struct PoolShared {
    pub(crate) settings: Settings,
    pub(crate) db: Db,
    pub(crate) registry: ExecutorRegistry,
    pub(crate) queue: TaskQueue,
    pub(crate) policy: SelectionPolicy,
    pub(crate) hub: Arc<BroadcastHub>,
    pub(crate) processor: Arc<dyn Processor>,
    pub(crate) tasks_completed: AtomicU64,
    pub(crate) optimization_cycles: AtomicU64,
    pub(crate) history: StdMutex<VecDeque<PerformanceSnapshot>>,
    pub(crate) running: AtomicBool,
}

impl PoolShared {
    pub(crate) fn new(
        settings: Settings,
        db: Db,
        hub: Arc<BroadcastHub>,
        processor: Arc<dyn Processor>,
    ) -> Self {
        let max_agents = settings.pool.max_agents;
        Self {
            settings,
            db,
            registry: ExecutorRegistry::new(max_agents),
            queue: TaskQueue::new(),
            policy: SelectionPolicy::new(),
            hub,
            processor,
            tasks_completed: AtomicU64::new(0),
            optimization_cycles: AtomicU64::new(0),
            history: StdMutex::new(VecDeque::new()),
            running: AtomicBool::new(false),
        }
    }

    pub(crate) async fn compute_metrics(&self) -> PoolMetrics {
        let agents = self.registry.list().await;
        let total_agents = agents.len();
        let mut active_agents = 0;
        let mut success_sum = 0.0;
        for agent in &agents {
            if agent.status().await == AgentStatus::Active {
                active_agents += 1;
            }
            success_sum += agent.success_rate();
        }
        let average_success_rate = if total_agents > 0 {
            success_sum / total_agents as f64
        } else {
            0.0
        };
        PoolMetrics {
            total_agents,
            active_agents,
            tasks_in_queue: self.queue.len(),
            tasks_completed: self.tasks_completed.load(Ordering::SeqCst),
            average_success_rate,
        }
    }

    /// Admit a new agent, persist it and announce it on `pool_updates`.
    pub(crate) async fn create_agent(
        &self,
        name: &str,
        agent_type: &str,
    ) -> Result<String, PoolError> {
        let agent = Arc::new(PoolAgent::new(name, agent_type, self.processor.clone()));
        let agent_id = agent.id.clone();
        self.registry.insert(agent.clone()).await?;

        let capabilities: serde_json::Map<String, Value> = agent
            .capabilities()
            .await
            .into_iter()
            .map(|c| (c.name, json!(c.level)))
            .collect();
        let record = AgentCreate {
            agent_id: agent_id.clone(),
            name: name.to_string(),
            agent_type: agent_type.to_string(),
            status: AgentStatus::Active.as_str().to_string(),
            capabilities: Value::Object(capabilities),
            metadata: Some(json!({ "learning_rate": agent.learning_rate() })),
        };
        if let Err(err) = QueryBuilder::create_agent(&self.db, &record).await {
            // Keep the roster and the database consistent.
            let _ = self.registry.remove(&agent_id).await;
            return Err(PoolError::Internal(err.to_string()));
        }

        self.log(
            LogCreate::info(format!("Agent '{name}' created and added to pool"), "AgentPool")
                .with_agent(&agent_id)
                .with_metadata(json!({ "pool_size": self.registry.len().await })),
        )
        .await;
        self.broadcast_pool_update(
            "agent_created",
            json!({
                "agent_id": agent_id,
                "agent_name": name,
                "agent_type": agent_type,
            }),
        )
        .await;

        Ok(agent_id)
    }

    /// Graceful removal: the agent leaves selection immediately, in-flight
    /// work on it finishes through the retained handle.
    pub(crate) async fn remove_agent(&self, agent_id: &str) -> Result<(), PoolError> {
        let agent = self.registry.remove(agent_id).await?;
        agent.set_status(AgentStatus::Inactive).await;

        if let Err(err) =
            QueryBuilder::set_agent_status(&self.db, agent_id, AgentStatus::Inactive.as_str()).await
        {
            warn!(agent_id, error = %err, "failed to persist agent removal");
        }

        self.log(
            LogCreate::info(format!("Agent '{}' removed from pool", agent.name), "AgentPool")
                .with_agent(agent_id)
                .with_metadata(json!({ "pool_size": self.registry.len().await })),
        )
        .await;
        self.broadcast_pool_update(
            "agent_removed",
            json!({
                "agent_id": agent_id,
                "agent_name": agent.name,
            }),
        )
        .await;

        Ok(())
    }

    pub(crate) async fn submit_task(&self, task: TaskSpec) -> Result<String, PoolError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(PoolError::PoolStopped);
        }

        let record = TaskCreate {
            task_id: task.id.clone(),
            task_type: task.task_type.clone(),
            priority: task.priority as i64,
            complexity: task.complexity,
            payload: Some(task.payload.clone()),
        };
        QueryBuilder::create_task(&self.db, &record)
            .await
            .map_err(|err| PoolError::Internal(err.to_string()))?;

        let task_id = task.id.clone();
        let task_type = task.task_type.clone();
        self.queue.enqueue(task);

        self.broadcast_pool_update(
            "task_submitted",
            json!({
                "task_id": task_id,
                "task_type": task_type,
                "queue_size": self.queue.len(),
            }),
        )
        .await;

        Ok(task_id)
    }

    /// Write a log record and mirror it to `system_logs` subscribers.
    pub(crate) async fn log(&self, entry: LogCreate) {
        self.hub
            .publish(
                Topic::SystemLogs,
                "log_entry",
                json!({
                    "level": entry.level,
                    "message": entry.message,
                    "module": entry.module,
                    "agent_id": entry.agent_id,
                }),
            )
            .await;
        if let Err(err) = QueryBuilder::insert_log(&self.db, &entry).await {
            warn!(error = %err, "failed to persist log entry");
        }
    }

    pub(crate) async fn broadcast_pool_update(&self, update_type: &str, data: Value) {
        let metrics = self.compute_metrics().await;
        self.hub
            .publish(
                Topic::PoolUpdates,
                "pool_update",
                json!({
                    "update_type": update_type,
                    "data": data,
                    "pool_metrics": {
                        "total_agents": metrics.total_agents,
                        "active_agents": metrics.active_agents,
                        "tasks_in_queue": metrics.tasks_in_queue,
                        "tasks_completed": metrics.tasks_completed,
                    },
                }),
            )
            .await;
    }

    pub(crate) async fn pool_status(&self) -> Value {
        let metrics = self.compute_metrics().await;
        let mut agents = serde_json::Map::new();
        for agent in self.registry.list().await {
            agents.insert(agent.id.clone(), agent.status_report().await);
        }
        json!({
            "metrics": metrics,
            "agents": agents,
            "workloads": self.registry.workloads().await,
            "optimization_cycles": self.optimization_cycles.load(Ordering::SeqCst),
            "is_running": self.running.load(Ordering::SeqCst),
        })
    }
}

/// The scheduler facade: owns the shared state, the cancellation token and
/// every background loop (workers, autoscaler, metrics reporter, stale
/// connection sweeper).
pub struct AgentPool {
    shared: Arc<PoolShared>,
    token: CancellationToken,
    workers: Mutex<JoinSet<()>>,
    loops: Mutex<JoinSet<()>>,
}

impl AgentPool {
    pub fn new(settings: Settings, db: Db, hub: Arc<BroadcastHub>) -> Self {
        Self::with_processor(settings, db, hub, Arc::new(SimulatedProcessor))
    }

    pub fn with_processor(
        settings: Settings,
        db: Db,
        hub: Arc<BroadcastHub>,
        processor: Arc<dyn Processor>,
    ) -> Self {
        Self {
            shared: Arc::new(PoolShared::new(settings, db, hub, processor)),
            token: CancellationToken::new(),
            workers: Mutex::new(JoinSet::new()),
            loops: Mutex::new(JoinSet::new()),
        }
    }

    /// Spawn all background loops. Idempotent.
    pub async fn start(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut workers = self.workers.lock().await;
        for worker_id in 0..self.shared.settings.pool.workers {
            workers.spawn(worker::run_worker(
                self.shared.clone(),
                worker_id,
                self.token.child_token(),
            ));
        }
        drop(workers);
        let mut loops = self.loops.lock().await;
        loops.spawn(autoscaler::run_autoscaler(
            self.shared.clone(),
            self.token.child_token(),
        ));
        loops.spawn(metrics::run_metrics_reporter(
            self.shared.clone(),
            self.token.child_token(),
        ));
        loops.spawn(run_sweeper(
            self.shared.hub.clone(),
            self.shared.settings.ws.sweep_interval,
            self.shared.settings.ws.stale_after(),
            self.token.child_token(),
        ));
        info!(workers = self.shared.settings.pool.workers, "agent pool started");
        self.shared
            .log(LogCreate::info("AgentPool initialized with worker tasks", "AgentPool"))
            .await;
    }

    pub async fn create_agent(&self, name: &str, agent_type: &str) -> Result<String, PoolError> {
        self.shared.create_agent(name, agent_type).await
    }

    pub async fn remove_agent(&self, agent_id: &str) -> Result<(), PoolError> {
        self.shared.remove_agent(agent_id).await
    }

    pub async fn submit_task(
        &self,
        task_type: &str,
        priority: u8,
        complexity: f64,
        payload: Value,
    ) -> Result<String, PoolError> {
        self.shared
            .submit_task(TaskSpec::new(task_type, priority, complexity, payload))
            .await
    }

    pub async fn agent_status(&self, agent_id: &str) -> Option<Value> {
        let agent = self.shared.registry.get(agent_id).await?;
        Some(agent.status_report().await)
    }

    pub async fn pool_status(&self) -> Value {
        self.shared.pool_status().await
    }

    pub async fn metrics(&self) -> PoolMetrics {
        self.shared.compute_metrics().await
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn tasks_completed(&self) -> u64 {
        self.shared.tasks_completed.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.shared.hub
    }

    pub fn db(&self) -> &Db {
        &self.shared.db
    }

    /// Stop intake, cancel every loop, wait for workers to drain and for
    /// the periodic loops to stop within the grace period, then mark all
    /// agents inactive.
    pub async fn shutdown(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("shutting down agent pool");
        self.token.cancel();

        // Workers stop dequeuing on cancellation but the dispatch each one
        // holds runs to completion, so they are joined without a deadline.
        let mut workers = self.workers.lock().await;
        while workers.join_next().await.is_some() {}
        drop(workers);

        let mut loops = self.loops.lock().await;
        let grace = self.shared.settings.pool.shutdown_grace;
        let drained = tokio::time::timeout(grace, async {
            while loops.join_next().await.is_some() {}
        })
        .await
        .is_ok();
        if !drained {
            warn!("periodic loops exceeded shutdown grace, aborting");
            loops.abort_all();
            while loops.join_next().await.is_some() {}
        }
        drop(loops);

        for agent in self.shared.registry.list().await {
            agent.set_status(AgentStatus::Inactive).await;
            if let Err(err) = QueryBuilder::set_agent_status(
                &self.shared.db,
                &agent.id,
                AgentStatus::Inactive.as_str(),
            )
            .await
            {
                warn!(agent_id = %agent.id, error = %err, "failed to persist agent shutdown");
            }
        }

        self.shared
            .log(LogCreate::info("AgentPool shutdown completed", "AgentPool"))
            .await;
        info!("agent pool shutdown complete");
    }
}
