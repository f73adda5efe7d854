use thiserror::Error;

/// Failure reported by a [`ClusterClient`](super::ClusterClient) for a single request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ClientError {
    #[error("request timed out")]
    Timeout,

    #[error("unknown topic or partition: {0}")]
    UnknownTopic(String),

    #[error("group id not found: {0}")]
    UnknownGroup(String),

    #[error("topic '{0}' already exists")]
    TopicAlreadyExists(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("server error {code} with message \"{message}\"")]
    Server { code: i16, message: String },
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
