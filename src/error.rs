use std::fmt;

/// Errors surfaced by pool operations (agent admission, removal, task intake).
#[derive(Debug, Clone, PartialEq)]
pub enum PoolError {
    /// No agent with the given id is registered.
    AgentNotFound(String),
    /// An agent with the same name already exists.
    DuplicateName(String),
    /// The pool already holds the configured maximum number of agents.
    AtCapacity(usize),
    /// The pool has been shut down and no longer accepts work.
    PoolStopped,
    /// A persistence or internal failure that the caller cannot act on.
    Internal(String),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::AgentNotFound(id) => write!(f, "agent not found: {}", id),
            PoolError::DuplicateName(name) => {
                write!(f, "agent with name '{}' already exists", name)
            }
            PoolError::AtCapacity(max) => {
                write!(f, "maximum number of agents ({}) reached", max)
            }
            PoolError::PoolStopped => write!(f, "agent pool is not running"),
            PoolError::Internal(msg) => write!(f, "internal pool error: {}", msg),
        }
    }
}

impl std::error::Error for PoolError {}

/// Errors surfaced by the broadcast hub and connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum HubError {
    /// The requested topic is not one of the advertised topics.
    UnknownTopic(String),
    /// The connection manager already holds the configured maximum.
    TooManyConnections(usize),
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubError::UnknownTopic(topic) => write!(f, "Invalid topic: {}", topic),
            HubError::TooManyConnections(max) => {
                write!(f, "maximum number of connections ({}) reached", max)
            }
        }
    }
}

impl std::error::Error for HubError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_error_display_includes_context() {
        let err = PoolError::DuplicateName("Alpha".to_string());
        assert!(err.to_string().contains("Alpha"));

        let err = PoolError::AtCapacity(100);
        assert!(err.to_string().contains("100"));
    }

    #[test]
    fn unknown_topic_display_matches_wire_error() {
        let err = HubError::UnknownTopic("bogus".to_string());
        assert_eq!(err.to_string(), "Invalid topic: bogus");
    }
}
