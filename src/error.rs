// Error taxonomy seen by the dashboard and the Q&A session
//
// Channel-level errors are folded into these four conditions at the UI
// boundary so call sites match on what happened, not on how it was carried.

use crate::messaging::{ChannelError, RemoteError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Q&A was used before an analysis was bound to the session
    #[error("no analysis context: analyze a page before asking questions")]
    NoContext,

    /// The history store could not be read or written
    #[error("history store unavailable: {0}")]
    StorageUnavailable(String),

    /// The request never completed (channel closed, timeout, malformed reply)
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// The AI collaborator answered with an explicit error
    #[error("AI provider failure: {0}")]
    ProviderFailure(String),
}

impl From<ChannelError> for CoreError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Transport(msg) => CoreError::TransportFailure(msg),
            ChannelError::Remote(RemoteError::StorageUnavailable(msg)) => {
                CoreError::StorageUnavailable(msg)
            }
            ChannelError::Remote(RemoteError::Provider(msg)) => CoreError::ProviderFailure(msg),
            // The background refused the request outright: a protocol problem
            ChannelError::Remote(RemoteError::InvalidRequest(msg)) => {
                CoreError::TransportFailure(format!("request rejected: {}", msg))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_errors_map_onto_taxonomy() {
        assert_eq!(
            CoreError::from(ChannelError::Transport("closed".into())),
            CoreError::TransportFailure("closed".into())
        );
        assert_eq!(
            CoreError::from(ChannelError::Remote(RemoteError::StorageUnavailable(
                "disk".into()
            ))),
            CoreError::StorageUnavailable("disk".into())
        );
        assert_eq!(
            CoreError::from(ChannelError::Remote(RemoteError::Provider("quota".into()))),
            CoreError::ProviderFailure("quota".into())
        );
        assert!(matches!(
            CoreError::from(ChannelError::Remote(RemoteError::InvalidRequest("bad".into()))),
            CoreError::TransportFailure(msg) if msg.contains("bad")
        ));
    }
}
