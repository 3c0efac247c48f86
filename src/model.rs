use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Capability levels are clamped to this range wherever they are adjusted.
pub const CAPABILITY_MIN: f64 = 0.1;
pub const CAPABILITY_MAX: f64 = 10.0;

/// Lifecycle state of a pooled agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    ShuttingDown,
    Inactive,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::ShuttingDown => "shutting_down",
            AgentStatus::Inactive => "inactive",
        }
    }
}

/// A named skill with a proficiency level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub level: f64,
}

impl Capability {
    pub fn new(name: impl Into<String>, level: f64) -> Self {
        Self {
            name: name.into(),
            level: level.clamp(CAPABILITY_MIN, CAPABILITY_MAX),
        }
    }
}

/// The capability set every new agent starts with.
pub fn default_capabilities() -> Vec<Capability> {
    vec![
        Capability::new("quantum_processing", 1.0),
        Capability::new("pattern_recognition", 1.0),
        Capability::new("adaptive_learning", 1.0),
        Capability::new("memory_optimization", 1.0),
        Capability::new("task_execution", 1.0),
        Capability::new("communication", 1.0),
        Capability::new("self_modification", 0.5),
        Capability::new("predictive_analysis", 0.8),
    ]
}

/// Which capabilities matter for a given task type.
pub fn relevant_capability_names(task_type: &str) -> &'static [&'static str] {
    match task_type {
        "data_analysis" => &["pattern_recognition", "adaptive_learning", "quantum_processing"],
        "pattern_recognition" => &["pattern_recognition", "memory_optimization"],
        "optimization" => &["quantum_processing", "adaptive_learning", "predictive_analysis"],
        "communication" => &["communication", "memory_optimization"],
        "learning" => &["adaptive_learning", "memory_optimization", "self_modification"],
        _ => &["task_execution"],
    }
}

/// Processing state of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

/// A unit of work flowing through the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    pub task_type: String,
    pub priority: u8,
    pub complexity: f64,
    pub payload: Value,
    pub submitted_at: DateTime<Utc>,
}

impl TaskSpec {
    pub fn new(task_type: impl Into<String>, priority: u8, complexity: f64, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_type: task_type.into(),
            priority,
            complexity,
            payload,
            submitted_at: Utc::now(),
        }
    }
}

/// What an agent produced for a task. Failures are data, not `Err`:
/// the dispatch path records them and moves on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub success: bool,
    pub output: Value,
    pub error: Option<String>,
    /// Simulated wall time in seconds.
    pub processing_time: f64,
}

impl ProcessOutcome {
    pub fn ok(output: Value, processing_time: f64) -> Self {
        Self {
            success: true,
            output,
            error: None,
            processing_time,
        }
    }

    pub fn fail(error: impl Into<String>, processing_time: f64) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(error.into()),
            processing_time,
        }
    }
}

/// Point-in-time view of one agent, used by the selection policy.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSnapshot {
    pub id: String,
    pub name: String,
    pub workload: usize,
    pub success_rate: f64,
    pub capabilities: Vec<Capability>,
}

/// Aggregate pool health, broadcast by the metrics reporter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolMetrics {
    pub total_agents: usize,
    pub active_agents: usize,
    pub tasks_in_queue: usize,
    pub tasks_completed: u64,
    pub average_success_rate: f64,
}

/// One metrics sample retained in the bounded history.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub metrics: PoolMetrics,
    pub agent_workloads: HashMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_levels_are_clamped() {
        assert_eq!(Capability::new("reasoning", 50.0).level, CAPABILITY_MAX);
        assert_eq!(Capability::new("reasoning", 0.0).level, CAPABILITY_MIN);
        assert_eq!(Capability::new("reasoning", 2.5).level, 2.5);
    }

    #[test]
    fn default_capability_set_has_eight_skills() {
        let caps = default_capabilities();
        assert_eq!(caps.len(), 8);
        assert!(caps.iter().any(|c| c.name == "quantum_processing" && c.level == 1.0));
        assert!(caps.iter().any(|c| c.name == "self_modification" && c.level == 0.5));
    }

    #[test]
    fn unknown_task_type_falls_back_to_task_execution() {
        assert_eq!(relevant_capability_names("something_else"), &["task_execution"]);
        assert_eq!(
            relevant_capability_names("optimization"),
            &["quantum_processing", "adaptive_learning", "predictive_analysis"]
        );
    }
}
