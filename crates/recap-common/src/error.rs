use std::time::Duration;

/// Errors shared across the recap crates.
///
/// The first four variants are per-attempt upstream failures; the
/// orchestrator recovers from them by retrying or moving to the next model.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("upstream timed out after {0:?} without data")]
    Timeout(Duration),

    #[error("upstream connection error: {0}")]
    Connection(String),

    #[error("upstream returned status={status}: {body}")]
    UpstreamHttp { status: u16, body: String },

    #[error("upstream protocol error: {0}")]
    Protocol(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("caller disconnected")]
    Cancelled,
}

impl Error {
    /// Whether the same model is worth another attempt after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::Connection(_) | Error::UpstreamHttp { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_retryable() {
        assert!(Error::Timeout(Duration::from_secs(60)).is_retryable());
        assert!(Error::Connection("reset".into()).is_retryable());
        assert!(
            Error::UpstreamHttp {
                status: 503,
                body: "overloaded".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn protocol_and_local_errors_are_not_retryable() {
        assert!(!Error::Protocol("stream ended early".into()).is_retryable());
        assert!(!Error::Persistence("locked".into()).is_retryable());
        assert!(!Error::Template("bad".into()).is_retryable());
        assert!(!Error::Cancelled.is_retryable());
    }

    #[test]
    fn upstream_http_message_carries_status() {
        let err = Error::UpstreamHttp {
            status: 429,
            body: "slow down".into(),
        };
        assert!(err.to_string().contains("status=429"));
    }
}
