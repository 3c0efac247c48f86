use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::db::QueryBuilder;
use crate::model::PerformanceSnapshot;
use crate::pool::PoolShared;
use crate::ws::messages::Topic;

/// Samples pool health on a fixed cadence, appends to the bounded history
/// and broadcasts the snapshot to `performance_metrics` subscribers.
pub(crate) async fn run_metrics_reporter(shared: Arc<PoolShared>, token: CancellationToken) {
    let mut ticker = interval(shared.settings.pool.metrics_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => report_once(&shared).await,
        }
    }
}

pub(crate) async fn report_once(shared: &Arc<PoolShared>) {
    let snapshot = record_sample(shared).await;

    shared
        .hub
        .publish(
            Topic::PerformanceMetrics,
            "performance_update",
            json!(snapshot),
        )
        .await;

    if let Err(err) = QueryBuilder::upsert_system_state(
        &shared.db,
        "agents",
        json!({
            "active_count": snapshot.metrics.active_agents,
            "total_count": snapshot.metrics.total_agents,
            "max_agents": shared.settings.pool.max_agents,
            "tasks_in_queue": snapshot.metrics.tasks_in_queue,
            "tasks_completed": snapshot.metrics.tasks_completed,
            "average_success_rate": snapshot.metrics.average_success_rate,
        }),
    )
    .await
    {
        warn!(error = %err, "failed to persist system state");
    }
}

/// Take one sample and fold it into the history, trimming back to half the
/// limit once the limit is crossed.
pub(crate) async fn record_sample(shared: &Arc<PoolShared>) -> PerformanceSnapshot {
    let snapshot = PerformanceSnapshot {
        timestamp: Utc::now(),
        metrics: shared.compute_metrics().await,
        agent_workloads: shared.registry.workloads().await,
    };

    let mut history = shared.history.lock().unwrap();
    history.push_back(snapshot.clone());
    let limit = shared.settings.pool.history_limit;
    if history.len() > limit {
        let keep = limit / 2;
        while history.len() > keep {
            history.pop_front();
        }
    }
    snapshot
}
