use serde::{Deserialize, Serialize};
use serde_json::Value;
use surrealdb::{sql::Datetime, RecordId};

/// Persisted representation of a pooled agent (table: `agent`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: RecordId,
    /// The pool-side uuid; stable across the agent's lifetime.
    pub agent_id: String,
    pub name: String,
    pub agent_type: String,
    pub status: String,
    /// Capability name -> level map.
    pub capabilities: Value,
    pub success_rate: f64,
    pub tasks_completed: i64,
    pub metadata: Option<Value>,
    pub created_at: Option<Datetime>,
    pub updated_at: Option<Datetime>,
}

/// Payload used when inserting a new agent record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCreate {
    pub agent_id: String,
    pub name: String,
    pub agent_type: String,
    pub status: String,
    pub capabilities: Value,
    pub metadata: Option<Value>,
}

/// Persisted representation of a submitted task (table: `task`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: RecordId,
    pub task_id: String,
    /// Set once the task is handed to an agent.
    pub agent_id: Option<String>,
    pub task_type: String,
    pub status: String,
    pub priority: i64,
    pub complexity: f64,
    pub payload: Option<Value>,
    pub result: Option<Value>,
    pub created_at: Option<Datetime>,
    pub completed_at: Option<Datetime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCreate {
    pub task_id: String,
    pub task_type: String,
    pub priority: i64,
    pub complexity: f64,
    pub payload: Option<Value>,
}

/// One structured log line (table: `system_log`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: RecordId,
    pub level: String,
    pub message: String,
    pub module: String,
    pub agent_id: Option<String>,
    pub metadata: Option<Value>,
    pub created_at: Option<Datetime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogCreate {
    pub level: String,
    pub message: String,
    pub module: String,
    pub agent_id: Option<String>,
    pub metadata: Option<Value>,
}

impl LogCreate {
    pub fn info(message: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            level: "INFO".to_string(),
            message: message.into(),
            module: module.into(),
            agent_id: None,
            metadata: None,
        }
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Component-keyed system state document (table: `system_state`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStateRecord {
    pub id: RecordId,
    pub component: String,
    pub state: Value,
    pub last_updated: Option<Datetime>,
}
