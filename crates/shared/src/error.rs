//! Failure type reported by every backend call.

/// Outcome of a failed gateway call.
///
/// `Transport` covers everything below HTTP semantics (refused connection,
/// timeout, truncated or undecodable body). `Server` is a non-success status
/// carrying the backend's own message when it supplied one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },
}

impl GatewayError {
    /// HTTP status, if the backend answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Transport(_) => None,
            GatewayError::Server { status, .. } => Some(*status),
        }
    }

    /// Short human-readable description suitable for showing next to a form.
    pub fn server_message(&self) -> &str {
        match self {
            GatewayError::Transport(description) => description,
            GatewayError::Server { message, .. } => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_has_no_status() {
        let err = GatewayError::Transport("could not connect to backend".into());
        assert_eq!(err.status(), None);
        assert_eq!(err.server_message(), "could not connect to backend");
    }

    #[test]
    fn test_server_error_display() {
        let err = GatewayError::Server {
            status: 404,
            message: "Video not found or API request failed".into(),
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(
            err.to_string(),
            "server error 404: Video not found or API request failed"
        );
    }
}
