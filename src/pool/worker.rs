use anyhow::Result;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::agent::PoolAgent;
use crate::db::QueryBuilder;
use crate::model::{TaskSpec, TaskStatus};
use crate::pool::PoolShared;
use crate::ws::messages::Topic;

/// One worker loop: dequeue, select, dispatch, repeat until cancelled.
///
/// A scheduler-internal fault (persistence down, agent gone mid-flight)
/// is logged and followed by a cooldown; it never takes the loop down.
pub(crate) async fn run_worker(shared: Arc<PoolShared>, worker_id: usize, token: CancellationToken) {
    debug!(worker_id, "worker started");
    loop {
        let dequeued = tokio::select! {
            _ = token.cancelled() => break,
            task = shared.queue.dequeue(shared.settings.pool.dequeue_timeout) => task,
        };
        let Some(task) = dequeued else {
            continue;
        };

        let snapshots = shared.registry.active_snapshot().await;
        let selected = shared.policy.select(&snapshots, &task).map(|s| s.id.clone());

        match selected {
            Some(agent_id) => {
                if let Err(err) = dispatch(&shared, &agent_id, task).await {
                    error!(worker_id, error = %err, "worker dispatch fault");
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = sleep(shared.settings.pool.fault_cooldown) => {}
                    }
                }
            }
            None => {
                // Nobody to run it right now; park the task and back off.
                shared.queue.enqueue(task);
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = sleep(shared.settings.pool.no_agent_backoff) => {}
                }
            }
        }
    }
    debug!(worker_id, "worker stopped");
}

async fn dispatch(shared: &Arc<PoolShared>, agent_id: &str, task: TaskSpec) -> Result<()> {
    let Some(agent) = shared.registry.get(agent_id).await else {
        // Evicted between snapshot and dispatch; the task goes back.
        shared.queue.enqueue(task);
        return Ok(());
    };

    agent.begin_task();
    let result = process(shared, &agent, &task).await;
    agent.finish_task();
    result
}

async fn process(shared: &Arc<PoolShared>, agent: &Arc<PoolAgent>, task: &TaskSpec) -> Result<()> {
    QueryBuilder::mark_task_processing(&shared.db, &task.id, &agent.id).await?;

    let outcome = agent.execute(task).await;
    shared.tasks_completed.fetch_add(1, Ordering::SeqCst);

    let status = if outcome.success {
        TaskStatus::Completed
    } else {
        TaskStatus::Failed
    };
    QueryBuilder::finish_task(
        &shared.db,
        &task.id,
        status.as_str(),
        serde_json::to_value(&outcome)?,
    )
    .await?;

    let capabilities: serde_json::Map<String, serde_json::Value> = agent
        .capabilities()
        .await
        .into_iter()
        .map(|c| (c.name, json!(c.level)))
        .collect();
    QueryBuilder::update_agent_stats(
        &shared.db,
        &agent.id,
        agent.success_rate(),
        agent.tasks_completed(),
        serde_json::Value::Object(capabilities),
    )
    .await?;

    let success = outcome.success;
    let completion = json!({
        "task_id": task.id,
        "task_type": task.task_type,
        "agent_id": agent.id,
        "agent_name": agent.name,
        "result": outcome,
        "success": success,
    });
    shared
        .hub
        .publish(Topic::TaskUpdates, "task_completed", completion.clone())
        .await;
    shared.broadcast_pool_update("task_completed", completion).await;

    Ok(())
}
