use std::fmt::{Display, Formatter};
use std::time::Duration;

use thiserror::Error;

use crate::client::error::ClientError;

/// The kind of entity an [`Error::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Topic,
    Broker,
    ConsumerGroup,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Topic => write!(f, "topic"),
            Self::Broker => write!(f, "broker"),
            Self::ConsumerGroup => write!(f, "consumer group"),
        }
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("{kind} \"{name}\" not found")]
    NotFound { kind: EntityKind, name: String },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Upstream(ClientError),
}

impl Error {
    /// Classifies an error reported by the cluster client for `operation`.
    pub(crate) fn from_client(
        operation: &'static str,
        timeout: Duration,
        error: ClientError,
    ) -> Self {
        match error {
            ClientError::Timeout => Self::Timeout { operation, timeout },
            ClientError::UnknownTopic(name) => Self::NotFound {
                kind: EntityKind::Topic,
                name,
            },
            ClientError::UnknownGroup(name) => Self::NotFound {
                kind: EntityKind::ConsumerGroup,
                name,
            },
            error => Self::Upstream(error),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        let timeout = Duration::from_secs(3);

        let err = Error::from_client("describe", timeout, ClientError::Timeout);
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "describe timed out after 3s");

        let err = Error::from_client("describe", timeout, ClientError::UnknownGroup("g".into()));
        assert_eq!(err.to_string(), "consumer group \"g\" not found");

        let err = Error::from_client(
            "describe",
            timeout,
            ClientError::Server {
                code: 87,
                message: "unknown resource type".to_owned(),
            },
        );
        assert!(matches!(err, Error::Upstream(_)));
        assert!(err.to_string().contains("unknown resource type"));
    }
}
