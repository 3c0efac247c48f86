// Database query helpers for SurrealDB.
//
// Thin, string-query based accessors over the four tables. The pool treats
// persistence as best-effort bookkeeping: callers decide whether a failed
// write is fatal.

use crate::db::connection::Db;
use crate::db::schema::*;
use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::Value;

pub struct QueryBuilder;

impl QueryBuilder {
    pub async fn create_agent(db: &Db, data: &AgentCreate) -> Result<AgentRecord> {
        let mut res = db
            .query(
                r#"
                CREATE agent SET
                    agent_id = $agent_id,
                    name = $name,
                    agent_type = $agent_type,
                    status = $status,
                    capabilities = $capabilities,
                    success_rate = 1.0,
                    tasks_completed = 0,
                    metadata = $metadata,
                    created_at = time::now(),
                    updated_at = time::now()
                "#,
            )
            .bind(("agent_id", data.agent_id.clone()))
            .bind(("name", data.name.clone()))
            .bind(("agent_type", data.agent_type.clone()))
            .bind(("status", data.status.clone()))
            .bind(("capabilities", data.capabilities.clone()))
            .bind(("metadata", data.metadata.clone()))
            .await?;

        let created: Option<AgentRecord> = res.take(0)?;
        created.ok_or_else(|| anyhow!("failed to create agent record"))
    }

    pub async fn set_agent_status(db: &Db, agent_id: &str, status: &str) -> Result<()> {
        db.query(
            r#"
            UPDATE agent SET
                status = $status,
                updated_at = time::now()
            WHERE agent_id = $agent_id
            "#,
        )
        .bind(("agent_id", agent_id.to_string()))
        .bind(("status", status.to_string()))
        .await?;
        Ok(())
    }

    pub async fn update_agent_stats(
        db: &Db,
        agent_id: &str,
        success_rate: f64,
        tasks_completed: u64,
        capabilities: Value,
    ) -> Result<()> {
        db.query(
            r#"
            UPDATE agent SET
                success_rate = $success_rate,
                tasks_completed = $tasks_completed,
                capabilities = $capabilities,
                updated_at = time::now()
            WHERE agent_id = $agent_id
            "#,
        )
        .bind(("agent_id", agent_id.to_string()))
        .bind(("success_rate", success_rate))
        .bind(("tasks_completed", tasks_completed as i64))
        .bind(("capabilities", capabilities))
        .await?;
        Ok(())
    }

    pub async fn create_task(db: &Db, data: &TaskCreate) -> Result<TaskRecord> {
        let mut res = db
            .query(
                r#"
                CREATE task SET
                    task_id = $task_id,
                    task_type = $task_type,
                    status = 'queued',
                    priority = $priority,
                    complexity = $complexity,
                    payload = $payload,
                    created_at = time::now()
                "#,
            )
            .bind(("task_id", data.task_id.clone()))
            .bind(("task_type", data.task_type.clone()))
            .bind(("priority", data.priority))
            .bind(("complexity", data.complexity))
            .bind(("payload", data.payload.clone()))
            .await?;

        let created: Option<TaskRecord> = res.take(0)?;
        created.ok_or_else(|| anyhow!("failed to create task record"))
    }

    pub async fn mark_task_processing(db: &Db, task_id: &str, agent_id: &str) -> Result<()> {
        db.query(
            r#"
            UPDATE task SET
                status = 'processing',
                agent_id = $agent_id
            WHERE task_id = $task_id
            "#,
        )
        .bind(("task_id", task_id.to_string()))
        .bind(("agent_id", agent_id.to_string()))
        .await?;
        Ok(())
    }

    pub async fn finish_task(db: &Db, task_id: &str, status: &str, result: Value) -> Result<()> {
        db.query(
            r#"
            UPDATE task SET
                status = $status,
                result = $result,
                completed_at = time::now()
            WHERE task_id = $task_id
            "#,
        )
        .bind(("task_id", task_id.to_string()))
        .bind(("status", status.to_string()))
        .bind(("result", result))
        .await?;
        Ok(())
    }

    pub async fn list_tasks(db: &Db, limit: usize, status: Option<&str>) -> Result<Vec<TaskRecord>> {
        let mut res = match status {
            Some(status) => {
                db.query(
                    r#"
                    SELECT * FROM task
                    WHERE status = $status
                    ORDER BY created_at DESC
                    LIMIT $limit
                    "#,
                )
                .bind(("status", status.to_string()))
                .bind(("limit", limit as i64))
                .await?
            }
            None => {
                db.query(
                    r#"
                    SELECT * FROM task
                    ORDER BY created_at DESC
                    LIMIT $limit
                    "#,
                )
                .bind(("limit", limit as i64))
                .await?
            }
        };

        let tasks: Vec<TaskRecord> = res.take(0)?;
        Ok(tasks)
    }

    pub async fn count_tasks(db: &Db, status: Option<&str>) -> Result<usize> {
        #[derive(Deserialize)]
        struct CountRow {
            total: i64,
        }

        let mut res = match status {
            Some(status) => {
                db.query("SELECT count() AS total FROM task WHERE status = $status GROUP ALL")
                    .bind(("status", status.to_string()))
                    .await?
            }
            None => db.query("SELECT count() AS total FROM task GROUP ALL").await?,
        };

        let row: Option<CountRow> = res.take(0)?;
        Ok(row.map(|r| r.total as usize).unwrap_or(0))
    }

    pub async fn insert_log(db: &Db, entry: &LogCreate) -> Result<()> {
        db.query(
            r#"
            CREATE system_log SET
                level = $level,
                message = $message,
                module = $module,
                agent_id = $agent_id,
                metadata = $metadata,
                created_at = time::now()
            "#,
        )
        .bind(("level", entry.level.clone()))
        .bind(("message", entry.message.clone()))
        .bind(("module", entry.module.clone()))
        .bind(("agent_id", entry.agent_id.clone()))
        .bind(("metadata", entry.metadata.clone()))
        .await?;
        Ok(())
    }

    pub async fn list_logs(db: &Db, limit: usize, level: Option<&str>) -> Result<Vec<LogRecord>> {
        let mut res = match level {
            Some(level) => {
                db.query(
                    r#"
                    SELECT * FROM system_log
                    WHERE level = $level
                    ORDER BY created_at DESC
                    LIMIT $limit
                    "#,
                )
                .bind(("level", level.to_string()))
                .bind(("limit", limit as i64))
                .await?
            }
            None => {
                db.query(
                    r#"
                    SELECT * FROM system_log
                    ORDER BY created_at DESC
                    LIMIT $limit
                    "#,
                )
                .bind(("limit", limit as i64))
                .await?
            }
        };

        let logs: Vec<LogRecord> = res.take(0)?;
        Ok(logs)
    }

    /// Replace the state document for a component, creating it on first use.
    pub async fn upsert_system_state(db: &Db, component: &str, state: Value) -> Result<()> {
        db.query(
            r#"
            DELETE system_state WHERE component = $component;
            CREATE system_state SET
                component = $component,
                state = $state,
                last_updated = time::now();
            "#,
        )
        .bind(("component", component.to_string()))
        .bind(("state", state))
        .await?;
        Ok(())
    }

    pub async fn get_system_state(db: &Db, component: &str) -> Result<Option<SystemStateRecord>> {
        let mut res = db
            .query(
                r#"
                SELECT * FROM system_state
                WHERE component = $component
                LIMIT 1
                "#,
            )
            .bind(("component", component.to_string()))
            .await?;

        let state: Option<SystemStateRecord> = res.take(0)?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::{create_connection, ensure_schema, DatabaseConfig};
    use serde_json::json;

    async fn memory_db() -> Db {
        let db = create_connection(DatabaseConfig {
            url: "memory".to_string(),
            namespace: "test".to_string(),
            database: "test".to_string(),
            username: None,
            password: None,
        })
        .await
        .unwrap();
        ensure_schema(&db).await.unwrap();
        db
    }

    #[tokio::test]
    async fn agent_records_round_trip_through_status_changes() {
        let db = memory_db().await;
        let created = QueryBuilder::create_agent(
            &db,
            &AgentCreate {
                agent_id: "a-1".to_string(),
                name: "Alpha".to_string(),
                agent_type: "worker".to_string(),
                status: "active".to_string(),
                capabilities: json!({"task_execution": 1.0}),
                metadata: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(created.status, "active");

        QueryBuilder::set_agent_status(&db, "a-1", "inactive").await.unwrap();
    }

    #[tokio::test]
    async fn task_lifecycle_is_persisted() {
        let db = memory_db().await;
        let task = QueryBuilder::create_task(
            &db,
            &TaskCreate {
                task_id: "t-1".to_string(),
                task_type: "optimization".to_string(),
                priority: 5,
                complexity: 2.0,
                payload: Some(json!({"target": "latency"})),
            },
        )
        .await
        .unwrap();
        assert_eq!(task.status, "queued");

        QueryBuilder::mark_task_processing(&db, "t-1", "a-1").await.unwrap();
        QueryBuilder::finish_task(&db, "t-1", "completed", json!({"success": true}))
            .await
            .unwrap();

        let completed = QueryBuilder::list_tasks(&db, 10, Some("completed")).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].agent_id.as_deref(), Some("a-1"));
        assert_eq!(QueryBuilder::count_tasks(&db, Some("completed")).await.unwrap(), 1);
        assert_eq!(QueryBuilder::count_tasks(&db, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn logs_filter_by_level() {
        let db = memory_db().await;
        QueryBuilder::insert_log(&db, &LogCreate::info("pool started", "AgentPool"))
            .await
            .unwrap();
        let mut warn = LogCreate::info("slow agent", "AgentPool");
        warn.level = "WARN".to_string();
        QueryBuilder::insert_log(&db, &warn).await.unwrap();

        let warns = QueryBuilder::list_logs(&db, 10, Some("WARN")).await.unwrap();
        assert_eq!(warns.len(), 1);
        assert_eq!(warns[0].message, "slow agent");
        assert_eq!(QueryBuilder::list_logs(&db, 10, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn system_state_upsert_replaces_the_document() {
        let db = memory_db().await;
        QueryBuilder::upsert_system_state(&db, "agents", json!({"active_count": 1}))
            .await
            .unwrap();
        QueryBuilder::upsert_system_state(&db, "agents", json!({"active_count": 4}))
            .await
            .unwrap();

        let state = QueryBuilder::get_system_state(&db, "agents").await.unwrap().unwrap();
        assert_eq!(state.state["active_count"], 4);
    }
}
