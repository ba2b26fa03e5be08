use thiserror::Error;

/// Errors surfaced by the cluster driver.
///
/// Reply errors coming back from a node (`MOVED`, `ASK`, `CLUSTERDOWN`,
/// `ERR …`) are carried verbatim in [`ClusterError::Reply`]; the router
/// recovers the redirection kinds internally and only the rest reach the
/// caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    #[error("Cluster is ended.")]
    Ended,

    #[error("Connection is closed.")]
    ConnectionClosed,

    #[error("Cluster is disconnected.")]
    Disconnected,

    #[error("Cluster isn't ready and enableOfflineQueue options is false")]
    OfflineQueueDisabled,

    #[error("None of startup nodes is available")]
    NoStartupNode,

    #[error("Redis is already connecting/connected")]
    AlreadyConnecting,

    #[error("Too many Cluster redirections. Last error: {last}")]
    TooManyRedirections { last: Box<ClusterError> },

    #[error("Failed to refresh slots cache.")]
    RefreshFailed {
        #[source]
        last_node_error: Box<ClusterError>,
    },

    /// An error reply received from a node, message verbatim.
    #[error("{0}")]
    Reply(String),

    /// A transport-level failure reported by a node client.
    #[error("{0}")]
    Transport(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClusterError {
    /// The last per-node error behind a refresh failure, when present.
    pub fn last_node_error(&self) -> Option<&ClusterError> {
        match self {
            ClusterError::RefreshFailed { last_node_error } => Some(last_node_error),
            _ => None,
        }
    }
}
