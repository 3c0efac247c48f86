use std::sync::atomic::{AtomicUsize, Ordering};

use crate::model::{relevant_capability_names, AgentSnapshot, Capability, TaskSpec};

/// Picks an executor for a dequeued task based on its priority tier.
///
/// The round-robin cursor is shared across worker loops and advanced
/// atomically, so concurrent low-priority dispatches fan out instead of
/// piling onto one agent.
pub struct SelectionPolicy {
    rr_cursor: AtomicUsize,
}

impl SelectionPolicy {
    pub fn new() -> Self {
        Self {
            rr_cursor: AtomicUsize::new(0),
        }
    }

    /// `None` only when the slice is empty; the caller re-enqueues the task
    /// and backs off in that case.
    pub fn select<'a>(
        &self,
        agents: &'a [AgentSnapshot],
        task: &TaskSpec,
    ) -> Option<&'a AgentSnapshot> {
        if agents.is_empty() {
            return None;
        }
        let picked = if task.priority >= 5 {
            best_score(agents, &task.task_type)
        } else if task.priority >= 3 {
            least_loaded_capable(agents, &task.task_type)
        } else {
            self.round_robin(agents)
        };
        Some(picked)
    }

    fn round_robin<'a>(&self, agents: &'a [AgentSnapshot]) -> &'a AgentSnapshot {
        let index = self.rr_cursor.fetch_add(1, Ordering::SeqCst);
        &agents[index % agents.len()]
    }
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self::new()
    }
}

fn relevant<'a>(capabilities: &'a [Capability], task_type: &str) -> Vec<&'a Capability> {
    let names = relevant_capability_names(task_type);
    capabilities
        .iter()
        .filter(|c| names.contains(&c.name.as_str()))
        .collect()
}

/// Highest `Σ relevant levels × success_rate`. Ties and an all-zero field
/// both resolve to the first agent in the slice.
fn best_score<'a>(agents: &'a [AgentSnapshot], task_type: &str) -> &'a AgentSnapshot {
    let mut best: Option<&AgentSnapshot> = None;
    let mut best_score = 0.0_f64;
    for agent in agents {
        let score: f64 = relevant(&agent.capabilities, task_type)
            .iter()
            .map(|c| c.level)
            .sum::<f64>()
            * agent.success_rate;
        if score > best_score {
            best_score = score;
            best = Some(agent);
        }
    }
    best.unwrap_or(&agents[0])
}

/// Lowest workload among agents whose mean relevant capability clears 0.7.
/// When nobody clears the bar, all agents compete on workload alone.
fn least_loaded_capable<'a>(agents: &'a [AgentSnapshot], task_type: &str) -> &'a AgentSnapshot {
    let capable: Vec<&AgentSnapshot> = agents
        .iter()
        .filter(|agent| {
            let caps = relevant(&agent.capabilities, task_type);
            let avg = if caps.is_empty() {
                0.5
            } else {
                caps.iter().map(|c| c.level).sum::<f64>() / caps.len() as f64
            };
            avg >= 0.7
        })
        .collect();

    let pool: Vec<&AgentSnapshot> = if capable.is_empty() {
        agents.iter().collect()
    } else {
        capable
    };
    pool.into_iter()
        .min_by_key(|agent| agent.workload)
        .expect("non-empty agent slice")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::default_capabilities;
    use serde_json::json;
    use std::collections::HashSet;

    fn snapshot(name: &str, workload: usize, success_rate: f64) -> AgentSnapshot {
        AgentSnapshot {
            id: format!("id-{name}"),
            name: name.to_string(),
            workload,
            success_rate,
            capabilities: default_capabilities(),
        }
    }

    fn with_level(mut snap: AgentSnapshot, cap: &str, level: f64) -> AgentSnapshot {
        for c in &mut snap.capabilities {
            if c.name == cap {
                c.level = level;
            }
        }
        snap
    }

    fn task(priority: u8, task_type: &str) -> TaskSpec {
        TaskSpec::new(task_type, priority, 1.0, json!({}))
    }

    #[test]
    fn empty_pool_selects_nobody() {
        let policy = SelectionPolicy::new();
        assert!(policy.select(&[], &task(5, "optimization")).is_none());
    }

    #[test]
    fn high_priority_picks_highest_scoring_agent() {
        let policy = SelectionPolicy::new();
        let strong = with_level(snapshot("strong", 9, 1.0), "quantum_processing", 5.0);
        let weak = snapshot("weak", 0, 1.0);
        // Workload must not matter at this tier.
        let agents = vec![weak, strong];

        let picked = policy.select(&agents, &task(5, "optimization")).unwrap();
        assert_eq!(picked.name, "strong");
    }

    #[test]
    fn high_priority_score_is_weighted_by_success_rate() {
        let policy = SelectionPolicy::new();
        let unreliable = with_level(snapshot("unreliable", 0, 0.1), "quantum_processing", 5.0);
        let steady = snapshot("steady", 0, 1.0);
        let agents = vec![unreliable, steady];

        // 6.8 * 0.1 = 0.68 versus 2.8 * 1.0 = 2.8.
        let picked = policy.select(&agents, &task(7, "optimization")).unwrap();
        assert_eq!(picked.name, "steady");
    }

    #[test]
    fn medium_priority_prefers_least_loaded_capable_agent() {
        let policy = SelectionPolicy::new();
        let busy = snapshot("busy", 4, 1.0);
        let idle = snapshot("idle", 0, 1.0);
        let agents = vec![busy, idle];

        let picked = policy.select(&agents, &task(3, "data_analysis")).unwrap();
        assert_eq!(picked.name, "idle");
    }

    #[test]
    fn medium_priority_capability_filter_falls_back_to_everyone() {
        let policy = SelectionPolicy::new();
        // Both agents fall below the 0.7 mean for the relevant capabilities,
        // so workload decides.
        let mut dull_a = snapshot("dull_a", 2, 1.0);
        let mut dull_b = snapshot("dull_b", 1, 1.0);
        for snap in [&mut dull_a, &mut dull_b] {
            for c in &mut snap.capabilities {
                c.level = 0.1;
            }
        }
        let agents = vec![dull_a, dull_b];

        let picked = policy.select(&agents, &task(4, "learning")).unwrap();
        assert_eq!(picked.name, "dull_b");
    }

    #[test]
    fn low_priority_round_robin_cycles_through_all_agents() {
        let policy = SelectionPolicy::new();
        let agents = vec![
            snapshot("a", 0, 1.0),
            snapshot("b", 0, 1.0),
            snapshot("c", 0, 1.0),
        ];

        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(policy.select(&agents, &task(1, "general")).unwrap().name.clone());
        }
        assert_eq!(seen[..3], ["a", "b", "c"]);
        assert_eq!(seen[3..], ["a", "b", "c"]);

        let distinct: HashSet<_> = seen.into_iter().collect();
        assert_eq!(distinct.len(), 3);
    }
}
