use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::pool::PoolShared;

/// Periodic pool optimization: grow on backlog, shed chronic
/// underperformers, and speed up learning for struggling agents.
pub(crate) async fn run_autoscaler(shared: Arc<PoolShared>, token: CancellationToken) {
    let mut ticker = interval(shared.settings.pool.autoscale_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => autoscale_once(&shared).await,
        }
    }
}

/// One evaluation cycle. Decisions use point-in-time reads; slight skew
/// against concurrent create/remove calls is fine because every rule
/// re-checks its own bound.
pub(crate) async fn autoscale_once(shared: &Arc<PoolShared>) {
    let cycle = shared.optimization_cycles.fetch_add(1, Ordering::SeqCst) + 1;
    let cfg = &shared.settings.pool;

    let agents = shared.registry.len().await;
    let queued = shared.queue.len();
    if queued > agents * cfg.backlog_factor && agents < cfg.max_agents {
        let name = format!("auto_agent_{cycle}");
        match shared.create_agent(&name, "HyperAgent").await {
            Ok(agent_id) => {
                info!(agent_id = %agent_id, name = %name, queued, "scaled up: auto-created agent")
            }
            Err(err) => warn!(error = %err, "failed to auto-create agent"),
        }
    }

    if shared.registry.len().await > cfg.min_agents {
        remove_underperformers(shared).await;
    }

    for agent in shared.registry.list().await {
        if agent.success_rate() < 0.7 {
            agent.boost_learning_rate();
        }
    }
}

async fn remove_underperformers(shared: &Arc<PoolShared>) {
    let cfg = &shared.settings.pool;
    for agent in shared.registry.list().await {
        if agent.success_rate() < cfg.removal_success_floor
            && agent.tasks_completed() > cfg.removal_min_completed
            && shared.registry.len().await > cfg.min_agents
        {
            info!(
                agent_id = %agent.id,
                name = %agent.name,
                success_rate = agent.success_rate(),
                "removing underperforming agent"
            );
            if let Err(err) = shared.remove_agent(&agent.id).await {
                warn!(agent_id = %agent.id, error = %err, "failed to remove underperformer");
            }
        }
    }
}
