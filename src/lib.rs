// Core modules
pub mod agent;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod pool;
pub mod ws;

// Re-export key types and functions
pub use agent::{PoolAgent, Processor, SimulatedProcessor};
pub use config::Settings;
pub use db::{create_connection, ensure_schema, DatabaseConfig, Db};
pub use error::{HubError, PoolError};
pub use model::{AgentStatus, Capability, PoolMetrics, ProcessOutcome, TaskSpec, TaskStatus};
pub use pool::AgentPool;
pub use ws::hub::BroadcastHub;
pub use ws::messages::Topic;

use crate::ws::connections::ConnectionManager;
use anyhow::Result;
use std::sync::Arc;

/// Convenience function wiring a pool against a fresh database connection.
///
/// Connects, ensures the schema, builds the broadcast hub and returns the
/// pool ready to `start()`.
pub async fn create_pool(settings: Settings, db_config: DatabaseConfig) -> Result<Arc<AgentPool>> {
    let db = create_connection(db_config).await?;
    ensure_schema(&db).await?;

    let manager = Arc::new(ConnectionManager::new(settings.ws.max_connections));
    let hub = Arc::new(BroadcastHub::new(manager));

    Ok(Arc::new(AgentPool::new(settings, db, hub)))
}
