use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// The fixed set of broadcast topics clients can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    AgentUpdates,
    PoolUpdates,
    SystemLogs,
    PerformanceMetrics,
    TaskUpdates,
    OptimizationMetrics,
}

impl Topic {
    pub const ALL: [Topic; 6] = [
        Topic::AgentUpdates,
        Topic::PoolUpdates,
        Topic::SystemLogs,
        Topic::PerformanceMetrics,
        Topic::TaskUpdates,
        Topic::OptimizationMetrics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::AgentUpdates => "agent_updates",
            Topic::PoolUpdates => "pool_updates",
            Topic::SystemLogs => "system_logs",
            Topic::PerformanceMetrics => "performance_metrics",
            Topic::TaskUpdates => "task_updates",
            Topic::OptimizationMetrics => "optimization_metrics",
        }
    }

    pub fn parse(s: &str) -> Option<Topic> {
        Topic::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a client can legitimately send. Unrecognized type tags are
/// preserved so the error reply can echo them; they never close the
/// connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Subscribe {
        topic: String,
    },
    Unsubscribe {
        topic: String,
    },
    Ping,
    GetStatus,
    /// Pass-through command aimed at one agent; acknowledged, not executed
    /// here.
    AgentCommand {
        command: Option<String>,
        agent_id: Option<String>,
    },
    /// Pass-through system-level command; acknowledged, not executed here.
    SystemCommand {
        command: Option<String>,
    },
    Unknown(String),
}

/// The text frame was not a JSON object we can dispatch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MalformedMessage;

pub fn parse_client_message(text: &str) -> Result<ClientMessage, MalformedMessage> {
    let value: Value = serde_json::from_str(text).map_err(|_| MalformedMessage)?;
    let message_type = value
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or("none")
        .to_string();
    let field = |key: &str| {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    };
    let topic = || field("topic").unwrap_or_else(|| "none".to_string());

    let parsed = match message_type.as_str() {
        "subscribe" => ClientMessage::Subscribe { topic: topic() },
        "unsubscribe" => ClientMessage::Unsubscribe { topic: topic() },
        "ping" => ClientMessage::Ping,
        "get_status" => ClientMessage::GetStatus,
        "agent_command" => ClientMessage::AgentCommand {
            command: field("command"),
            agent_id: field("agent_id"),
        },
        "system_command" => ClientMessage::SystemCommand {
            command: field("command"),
        },
        _ => ClientMessage::Unknown(message_type),
    };
    Ok(parsed)
}

/// Control frames the server sends to a single connection. Broadcast
/// frames are built separately by the hub (`event_frame`) because their
/// type tag varies by event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        connection_id: String,
        server_info: ServerInfo,
        timestamp: String,
    },
    SubscriptionConfirmed {
        topic: Topic,
        timestamp: String,
    },
    UnsubscriptionConfirmed {
        topic: String,
        timestamp: String,
    },
    Pong {
        timestamp: String,
    },
    StatusResponse {
        data: Value,
        timestamp: String,
    },
    CommandResponse {
        command: Option<String>,
        agent_id: Option<String>,
        status: String,
        timestamp: String,
    },
    SystemResponse {
        command: Option<String>,
        status: String,
        timestamp: String,
    },
    Error {
        message: String,
        timestamp: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub available_topics: Vec<&'static str>,
}

impl ServerInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            available_topics: Topic::ALL.iter().map(|t| t.as_str()).collect(),
        }
    }
}

impl ServerMessage {
    pub fn welcome(connection_id: String, server_info: ServerInfo) -> Self {
        ServerMessage::Welcome {
            connection_id,
            server_info,
            timestamp: now(),
        }
    }

    pub fn subscription_confirmed(topic: Topic) -> Self {
        ServerMessage::SubscriptionConfirmed {
            topic,
            timestamp: now(),
        }
    }

    pub fn unsubscription_confirmed(topic: impl Into<String>) -> Self {
        ServerMessage::UnsubscriptionConfirmed {
            topic: topic.into(),
            timestamp: now(),
        }
    }

    pub fn pong() -> Self {
        ServerMessage::Pong { timestamp: now() }
    }

    pub fn status_response(data: Value) -> Self {
        ServerMessage::StatusResponse {
            data,
            timestamp: now(),
        }
    }

    pub fn command_response(command: Option<String>, agent_id: Option<String>) -> Self {
        ServerMessage::CommandResponse {
            command,
            agent_id,
            status: "received".to_string(),
            timestamp: now(),
        }
    }

    pub fn system_response(command: Option<String>) -> Self {
        ServerMessage::SystemResponse {
            command,
            status: "received".to_string(),
            timestamp: now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
            timestamp: now(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Broadcast frame for a topic: the event name becomes the type tag.
pub fn event_frame(event: &str, topic: Topic, mut data: Value) -> String {
    if let Some(obj) = data.as_object_mut() {
        obj.insert("type".to_string(), json!(event));
        obj.insert("topic".to_string(), json!(topic.as_str()));
        obj.entry("timestamp").or_insert_with(|| json!(now()));
        return data.to_string();
    }
    json!({
        "type": event,
        "topic": topic.as_str(),
        "data": data,
        "timestamp": now(),
    })
    .to_string()
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_parsing_covers_the_advertised_set() {
        for topic in Topic::ALL {
            assert_eq!(Topic::parse(topic.as_str()), Some(topic));
        }
        assert_eq!(Topic::parse("bogus"), None);
    }

    #[test]
    fn subscribe_message_carries_its_topic() {
        let msg = parse_client_message(r#"{"type": "subscribe", "topic": "pool_updates"}"#);
        assert_eq!(
            msg,
            Ok(ClientMessage::Subscribe {
                topic: "pool_updates".to_string()
            })
        );
    }

    #[test]
    fn unknown_type_is_preserved_for_the_error_reply() {
        let msg = parse_client_message(r#"{"type": "teleport"}"#);
        assert_eq!(msg, Ok(ClientMessage::Unknown("teleport".to_string())));

        let msg = parse_client_message(r#"{"topic": "pool_updates"}"#);
        assert_eq!(msg, Ok(ClientMessage::Unknown("none".to_string())));
    }

    #[test]
    fn command_messages_carry_their_optional_fields() {
        let msg = parse_client_message(
            r#"{"type": "agent_command", "command": "restart", "agent_id": "a-1"}"#,
        );
        assert_eq!(
            msg,
            Ok(ClientMessage::AgentCommand {
                command: Some("restart".to_string()),
                agent_id: Some("a-1".to_string()),
            })
        );

        let msg = parse_client_message(r#"{"type": "system_command"}"#);
        assert_eq!(msg, Ok(ClientMessage::SystemCommand { command: None }));
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert_eq!(parse_client_message("not json"), Err(MalformedMessage));
        assert_eq!(parse_client_message("{\"type\": "), Err(MalformedMessage));
    }

    #[test]
    fn server_frames_serialize_with_snake_case_type_tags() {
        let frame = ServerMessage::subscription_confirmed(Topic::TaskUpdates).to_json();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "subscription_confirmed");
        assert_eq!(value["topic"], "task_updates");
        assert!(value["timestamp"].is_string());

        let frame = ServerMessage::error("Invalid JSON message").to_json();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["message"], "Invalid JSON message");
    }

    #[test]
    fn command_acknowledgments_echo_the_command() {
        let frame =
            ServerMessage::command_response(Some("restart".to_string()), Some("a-1".to_string()))
                .to_json();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "command_response");
        assert_eq!(value["command"], "restart");
        assert_eq!(value["agent_id"], "a-1");
        assert_eq!(value["status"], "received");

        let frame = ServerMessage::system_response(None).to_json();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "system_response");
        assert_eq!(value["command"], Value::Null);
        assert_eq!(value["status"], "received");
    }

    #[test]
    fn event_frames_tag_topic_and_event() {
        let frame = event_frame(
            "pool_update",
            Topic::PoolUpdates,
            json!({"update_type": "agent_created", "data": {}}),
        );
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "pool_update");
        assert_eq!(value["topic"], "pool_updates");
        assert_eq!(value["update_type"], "agent_created");
        assert!(value["timestamp"].is_string());
    }
}
