// REST and WebSocket endpoints for the pool

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Settings;
use crate::db::QueryBuilder;
use crate::error::PoolError;
use crate::pool::AgentPool;
use crate::ws::messages::ServerInfo;
use crate::ws::serve_socket;

#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<AgentPool>,
    pub settings: Arc<Settings>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/status", get(get_system_status))
        .route("/api/agents", get(list_agents).post(create_agent))
        .route("/api/agents/{agent_id}", get(get_agent).delete(remove_agent))
        .route("/api/tasks", get(list_tasks).post(submit_task))
        .route("/api/logs", get(list_logs))
        .route("/ws", get(ws_upgrade))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn pool_error_status(err: &PoolError) -> StatusCode {
    match err {
        PoolError::AgentNotFound(_) => StatusCode::NOT_FOUND,
        PoolError::DuplicateName(_) | PoolError::AtCapacity(_) => StatusCode::BAD_REQUEST,
        PoolError::PoolStopped => StatusCode::SERVICE_UNAVAILABLE,
        PoolError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

async fn get_system_status(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let pool_status = state.pool.pool_status().await;
    let ws_stats = state.pool.hub().stats().await;

    let total_tasks = QueryBuilder::count_tasks(state.pool.db(), None)
        .await
        .map_err(|_e| StatusCode::INTERNAL_SERVER_ERROR)?;
    let completed_tasks = QueryBuilder::count_tasks(state.pool.db(), Some("completed"))
        .await
        .map_err(|_e| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(json!({
        "status": "online",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "agents": pool_status["metrics"],
        "websockets": ws_stats,
        "database": {
            "total_tasks": total_tasks,
            "completed_tasks": completed_tasks,
        },
    })))
}

#[derive(Debug, Deserialize)]
struct AgentCreateRequest {
    name: String,
    #[serde(default = "default_agent_type")]
    agent_type: String,
}

fn default_agent_type() -> String {
    "HyperAgent".to_string()
}

async fn create_agent(
    State(state): State<AppState>,
    Json(request): Json<AgentCreateRequest>,
) -> Result<Json<Value>, StatusCode> {
    let agent_id = state
        .pool
        .create_agent(&request.name, &request.agent_type)
        .await
        .map_err(|err| pool_error_status(&err))?;

    Ok(Json(json!({
        "success": true,
        "agent_id": agent_id,
        "message": format!("Agent '{}' created", request.name),
    })))
}

async fn list_agents(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let pool_status = state.pool.pool_status().await;
    Ok(Json(json!({
        "agents": pool_status["agents"],
        "metrics": pool_status["metrics"],
    })))
}

async fn get_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let status = state
        .pool
        .agent_status(&agent_id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(status))
}

async fn remove_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    state
        .pool
        .remove_agent(&agent_id)
        .await
        .map_err(|err| pool_error_status(&err))?;

    Ok(Json(json!({
        "success": true,
        "message": "Agent removed",
    })))
}

#[derive(Debug, Deserialize)]
struct TaskSubmitRequest {
    #[serde(rename = "type")]
    task_type: String,
    #[serde(default)]
    data: Value,
    #[serde(default = "default_priority")]
    priority: u8,
    #[serde(default = "default_complexity")]
    complexity: f64,
}

fn default_priority() -> u8 {
    1
}

fn default_complexity() -> f64 {
    1.0
}

async fn submit_task(
    State(state): State<AppState>,
    Json(request): Json<TaskSubmitRequest>,
) -> Result<Json<Value>, StatusCode> {
    let task_id = state
        .pool
        .submit_task(
            &request.task_type,
            request.priority,
            request.complexity,
            request.data,
        )
        .await
        .map_err(|err| pool_error_status(&err))?;

    Ok(Json(json!({
        "success": true,
        "task_id": task_id,
        "message": "Task submitted",
        "queue_size": state.pool.queue_len(),
    })))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default = "default_limit")]
    limit: usize,
    status: Option<String>,
    level: Option<String>,
}

fn default_limit() -> usize {
    50
}

async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, StatusCode> {
    let tasks = QueryBuilder::list_tasks(state.pool.db(), query.limit, query.status.as_deref())
        .await
        .map_err(|_e| StatusCode::INTERNAL_SERVER_ERROR)?;
    let tasks = serde_json::to_value(tasks).map_err(|_e| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(json!({ "tasks": tasks })))
}

async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, StatusCode> {
    let logs = QueryBuilder::list_logs(state.pool.db(), query.limit, query.level.as_deref())
        .await
        .map_err(|_e| StatusCode::INTERNAL_SERVER_ERROR)?;
    let logs = serde_json::to_value(logs).map_err(|_e| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(json!({ "logs": logs })))
}

async fn ws_upgrade(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> impl IntoResponse {
    let hub = state.pool.hub().clone();
    let server_info = ServerInfo::new(
        state.settings.app_name.clone(),
        state.settings.version.clone(),
    );
    upgrade.on_upgrade(move |socket| serve_socket(socket, hub, server_info))
}
