use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Top-level runtime settings, assembled from defaults plus environment
/// overrides (`HIVEPOOL_*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub app_name: String,
    pub version: String,
    pub server: ServerConfig,
    pub pool: PoolConfig,
    pub ws: WsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Tunables for the worker pool, selection policy and autoscaler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of task worker loops.
    pub workers: usize,
    /// Hard cap on registered agents.
    pub max_agents: usize,
    /// Autoscaler never shrinks the pool below this.
    pub min_agents: usize,
    /// How long a worker waits on an empty queue before re-checking.
    pub dequeue_timeout: Duration,
    /// Pause after a task had to be re-enqueued because no agent was available.
    pub no_agent_backoff: Duration,
    /// Pause after an internal fault in a worker iteration.
    pub fault_cooldown: Duration,
    /// How often the autoscaler evaluates the pool.
    pub autoscale_interval: Duration,
    /// Scale up when queue depth exceeds `agents * backlog_factor`.
    pub backlog_factor: usize,
    /// Agents below this success rate are candidates for removal.
    pub removal_success_floor: f64,
    /// Removal only considers agents with at least this many completed tasks.
    pub removal_min_completed: u64,
    /// How often the metrics reporter samples and broadcasts.
    pub metrics_interval: Duration,
    /// Performance history is trimmed back to half once it reaches this size.
    pub history_limit: usize,
    /// How long shutdown waits for loops to finish before aborting them.
    pub shutdown_grace: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    /// Expected interval between client heartbeats.
    pub heartbeat_interval: Duration,
    /// How often the stale-connection sweep runs.
    pub sweep_interval: Duration,
    /// Connections idle longer than `heartbeat_interval * stale_multiplier`
    /// are dropped by the sweep.
    pub stale_multiplier: u32,
    pub max_connections: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "hivepool".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            server: ServerConfig {
                host: env_or("HIVEPOOL_HOST", "0.0.0.0".to_string()),
                port: env_or("HIVEPOOL_PORT", 8000),
            },
            pool: PoolConfig::default(),
            ws: WsConfig::default(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: env_or("HIVEPOOL_WORKERS", 3),
            max_agents: env_or("HIVEPOOL_MAX_AGENTS", 100),
            min_agents: env_or("HIVEPOOL_MIN_AGENTS", 3),
            dequeue_timeout: Duration::from_secs(1),
            no_agent_backoff: Duration::from_millis(500),
            fault_cooldown: Duration::from_secs(1),
            autoscale_interval: Duration::from_secs(30),
            backlog_factor: 5,
            removal_success_floor: 0.3,
            removal_min_completed: 10,
            metrics_interval: Duration::from_secs(5),
            history_limit: 1000,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(env_or("HIVEPOOL_WS_HEARTBEAT", 30)),
            sweep_interval: Duration::from_secs(30),
            stale_multiplier: 3,
            max_connections: env_or("HIVEPOOL_WS_MAX_CONNECTIONS", 1000),
        }
    }
}

impl WsConfig {
    /// Cutoff after which a silent connection counts as stale.
    pub fn stale_after(&self) -> Duration {
        self.heartbeat_interval * self.stale_multiplier
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert_eq!(settings.pool.workers, 3);
        assert_eq!(settings.pool.max_agents, 100);
        assert!(settings.pool.min_agents <= settings.pool.max_agents);
        assert_eq!(settings.pool.backlog_factor, 5);
    }

    #[test]
    fn stale_cutoff_is_multiple_of_heartbeat() {
        let ws = WsConfig {
            heartbeat_interval: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(30),
            stale_multiplier: 3,
            max_connections: 1000,
        };
        assert_eq!(ws.stale_after(), Duration::from_secs(90));
    }
}
