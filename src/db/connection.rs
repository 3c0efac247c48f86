use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("SURREALDB_URL").unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("SURREALDB_NAMESPACE").unwrap_or_else(|_| "hivepool".to_string()),
            database: env::var("SURREALDB_DATABASE").unwrap_or_else(|_| "pool".to_string()),
            username: env::var("SURREALDB_USERNAME").ok(),
            password: env::var("SURREALDB_PASSWORD").ok(),
        }
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema_queries = vec![
        // Agents
        "DEFINE TABLE agent SCHEMALESS;
         DEFINE FIELD agent_id ON TABLE agent TYPE string;
         DEFINE FIELD name ON TABLE agent TYPE string;
         DEFINE FIELD agent_type ON TABLE agent TYPE string;
         DEFINE FIELD status ON TABLE agent TYPE string;
         DEFINE FIELD capabilities ON TABLE agent TYPE object;
         DEFINE FIELD success_rate ON TABLE agent TYPE float DEFAULT 1.0;
         DEFINE FIELD tasks_completed ON TABLE agent TYPE number DEFAULT 0;
         DEFINE FIELD metadata ON TABLE agent TYPE option<object>;
         DEFINE FIELD created_at ON TABLE agent VALUE time::now();
         DEFINE FIELD updated_at ON TABLE agent VALUE time::now();",
        // Tasks
        "DEFINE TABLE task SCHEMALESS;
         DEFINE FIELD task_id ON TABLE task TYPE string;
         DEFINE FIELD agent_id ON TABLE task TYPE option<string>;
         DEFINE FIELD task_type ON TABLE task TYPE string;
         DEFINE FIELD status ON TABLE task TYPE string;
         DEFINE FIELD priority ON TABLE task TYPE number DEFAULT 1;
         DEFINE FIELD complexity ON TABLE task TYPE float DEFAULT 1.0;
         DEFINE FIELD payload ON TABLE task TYPE option<object>;
         DEFINE FIELD result ON TABLE task TYPE option<object>;
         DEFINE FIELD created_at ON TABLE task VALUE time::now();
         DEFINE FIELD completed_at ON TABLE task TYPE option<datetime>;",
        // System logs
        "DEFINE TABLE system_log SCHEMALESS;
         DEFINE FIELD level ON TABLE system_log TYPE string;
         DEFINE FIELD message ON TABLE system_log TYPE string;
         DEFINE FIELD module ON TABLE system_log TYPE string;
         DEFINE FIELD agent_id ON TABLE system_log TYPE option<string>;
         DEFINE FIELD metadata ON TABLE system_log TYPE option<object>;
         DEFINE FIELD created_at ON TABLE system_log VALUE time::now();",
        // Per-component system state
        "DEFINE TABLE system_state SCHEMALESS;
         DEFINE FIELD component ON TABLE system_state TYPE string;
         DEFINE FIELD state ON TABLE system_state TYPE object;
         DEFINE FIELD last_updated ON TABLE system_state VALUE time::now();",
    ];

    for query in schema_queries {
        db.query(query).await?;
    }

    Ok(())
}
