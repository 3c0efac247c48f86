pub mod connections;
pub mod hub;
pub mod messages;

use anyhow::Result;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::ws::connections::{Connection, ConnectionSink};
use crate::ws::hub::BroadcastHub;
use crate::ws::messages::{parse_client_message, ClientMessage, ServerInfo, ServerMessage};

struct SocketSink {
    tx: Mutex<SplitSink<WebSocket, Message>>,
}

#[async_trait]
impl ConnectionSink for SocketSink {
    async fn send_text(&self, text: String) -> Result<()> {
        self.tx
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await?;
        Ok(())
    }

    async fn close(&self) {
        let _ = self.tx.lock().await.send(Message::Close(None)).await;
    }
}

/// Drive one upgraded socket: register, welcome, then pump inbound frames
/// until the client goes away. Cleanup runs on every exit path.
pub async fn serve_socket(socket: WebSocket, hub: Arc<BroadcastHub>, server_info: ServerInfo) {
    let (tx, mut rx) = socket.split();
    let sink = Arc::new(SocketSink { tx: Mutex::new(tx) });

    let conn = match hub.manager().register(sink.clone()).await {
        Ok(conn) => conn,
        Err(err) => {
            warn!(error = %err, "rejecting websocket connection");
            let _ = sink
                .send_text(ServerMessage::error(err.to_string()).to_json())
                .await;
            sink.close().await;
            return;
        }
    };
    info!(connection_id = %conn.id, "new websocket connection");

    if conn
        .send(&ServerMessage::welcome(conn.id.clone(), server_info))
        .await
        .is_err()
    {
        hub.disconnect(&conn.id).await;
        return;
    }

    while let Some(frame) = rx.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if handle_text(&hub, &conn, text.as_str()).await.is_err() {
                    break;
                }
            }
            // axum answers protocol pings itself; both directions count as
            // liveness.
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => conn.touch(),
            Ok(Message::Binary(_)) => {
                if conn
                    .send(&ServerMessage::error("Invalid JSON message"))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                debug!(connection_id = %conn.id, "websocket closed by client");
                break;
            }
            Err(err) => {
                debug!(connection_id = %conn.id, error = %err, "websocket read error");
                break;
            }
        }
    }

    hub.disconnect(&conn.id).await;
}

/// Dispatch one inbound text frame. `Err` means the reply could not be
/// sent, which is the caller's cue to drop the connection.
pub(crate) async fn handle_text(
    hub: &Arc<BroadcastHub>,
    conn: &Arc<Connection>,
    text: &str,
) -> Result<()> {
    let message = match parse_client_message(text) {
        Ok(message) => message,
        Err(_) => {
            return conn.send(&ServerMessage::error("Invalid JSON message")).await;
        }
    };

    match message {
        ClientMessage::Subscribe { topic } => match hub.subscribe(conn, &topic).await {
            Ok(topic) => conn.send(&ServerMessage::subscription_confirmed(topic)).await,
            Err(err) => conn.send(&ServerMessage::error(err.to_string())).await,
        },
        ClientMessage::Unsubscribe { topic } => {
            hub.unsubscribe(conn, &topic).await;
            conn.send(&ServerMessage::unsubscription_confirmed(topic)).await
        }
        ClientMessage::Ping => {
            conn.touch();
            conn.send(&ServerMessage::pong()).await
        }
        ClientMessage::GetStatus => {
            let data = json!({ "websocket_server": hub.stats().await });
            conn.send(&ServerMessage::status_response(data)).await
        }
        // Commands are routed by an external controller; the hub only
        // acknowledges receipt.
        ClientMessage::AgentCommand { command, agent_id } => {
            conn.send(&ServerMessage::command_response(command, agent_id)).await
        }
        ClientMessage::SystemCommand { command } => {
            conn.send(&ServerMessage::system_response(command)).await
        }
        ClientMessage::Unknown(message_type) => {
            conn.send(&ServerMessage::error(format!(
                "Unknown message type: {message_type}"
            )))
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::connections::test_support::RecordingSink;
    use crate::ws::connections::ConnectionManager;
    use crate::ws::messages::Topic;
    use serde_json::Value;

    async fn setup() -> (Arc<BroadcastHub>, Arc<Connection>, Arc<RecordingSink>) {
        let manager = Arc::new(ConnectionManager::new(10));
        let hub = Arc::new(BroadcastHub::new(manager.clone()));
        let sink = RecordingSink::new();
        let conn = manager.register(sink.clone()).await.unwrap();
        (hub, conn, sink)
    }

    fn last_frame(sink: &RecordingSink) -> Value {
        let frames = sink.frames();
        serde_json::from_str(frames.last().expect("a reply frame")).unwrap()
    }

    #[tokio::test]
    async fn ping_gets_a_pong_and_refreshes_the_heartbeat() {
        let (hub, conn, sink) = setup().await;
        conn.backdate_heartbeat(std::time::Duration::from_secs(120));

        handle_text(&hub, &conn, r#"{"type": "ping"}"#).await.unwrap();

        assert_eq!(last_frame(&sink)["type"], "pong");
        assert!(hub
            .manager()
            .stale_ids(std::time::Duration::from_secs(90))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn subscribe_confirms_and_registers_with_the_hub() {
        let (hub, conn, sink) = setup().await;

        handle_text(&hub, &conn, r#"{"type": "subscribe", "topic": "task_updates"}"#)
            .await
            .unwrap();

        let frame = last_frame(&sink);
        assert_eq!(frame["type"], "subscription_confirmed");
        assert_eq!(frame["topic"], "task_updates");
        assert_eq!(hub.subscriber_count(Topic::TaskUpdates).await, 1);
    }

    #[tokio::test]
    async fn invalid_topic_yields_an_error_frame() {
        let (hub, conn, sink) = setup().await;

        handle_text(&hub, &conn, r#"{"type": "subscribe", "topic": "nonsense"}"#)
            .await
            .unwrap();

        let frame = last_frame(&sink);
        assert_eq!(frame["type"], "error");
        assert_eq!(frame["message"], "Invalid topic: nonsense");
    }

    #[tokio::test]
    async fn unknown_message_type_is_echoed_in_the_error() {
        let (hub, conn, sink) = setup().await;

        handle_text(&hub, &conn, r#"{"type": "teleport"}"#).await.unwrap();
        assert_eq!(
            last_frame(&sink)["message"],
            "Unknown message type: teleport"
        );
    }

    #[tokio::test]
    async fn agent_command_is_acknowledged() {
        let (hub, conn, sink) = setup().await;

        handle_text(
            &hub,
            &conn,
            r#"{"type": "agent_command", "command": "restart", "agent_id": "a-1"}"#,
        )
        .await
        .unwrap();

        let frame = last_frame(&sink);
        assert_eq!(frame["type"], "command_response");
        assert_eq!(frame["command"], "restart");
        assert_eq!(frame["agent_id"], "a-1");
        assert_eq!(frame["status"], "received");
    }

    #[tokio::test]
    async fn system_command_is_acknowledged_even_without_a_command() {
        let (hub, conn, sink) = setup().await;

        handle_text(&hub, &conn, r#"{"type": "system_command"}"#).await.unwrap();

        let frame = last_frame(&sink);
        assert_eq!(frame["type"], "system_response");
        assert_eq!(frame["command"], Value::Null);
        assert_eq!(frame["status"], "received");
    }

    #[tokio::test]
    async fn malformed_json_yields_the_canonical_error() {
        let (hub, conn, sink) = setup().await;

        handle_text(&hub, &conn, "this is not json").await.unwrap();
        assert_eq!(last_frame(&sink)["message"], "Invalid JSON message");
    }

    #[tokio::test]
    async fn unsubscribe_always_confirms() {
        let (hub, conn, sink) = setup().await;
        handle_text(&hub, &conn, r#"{"type": "subscribe", "topic": "system_logs"}"#)
            .await
            .unwrap();

        for _ in 0..2 {
            handle_text(&hub, &conn, r#"{"type": "unsubscribe", "topic": "system_logs"}"#)
                .await
                .unwrap();
            let frame = last_frame(&sink);
            assert_eq!(frame["type"], "unsubscription_confirmed");
            assert_eq!(frame["topic"], "system_logs");
        }
        assert_eq!(hub.subscriber_count(Topic::SystemLogs).await, 0);
    }

    #[tokio::test]
    async fn get_status_reports_connection_stats() {
        let (hub, conn, sink) = setup().await;
        handle_text(&hub, &conn, r#"{"type": "subscribe", "topic": "pool_updates"}"#)
            .await
            .unwrap();

        handle_text(&hub, &conn, r#"{"type": "get_status"}"#).await.unwrap();

        let frame = last_frame(&sink);
        assert_eq!(frame["type"], "status_response");
        assert_eq!(frame["data"]["websocket_server"]["active_connections"], 1);
        assert_eq!(frame["data"]["websocket_server"]["total_subscriptions"], 1);
    }
}
