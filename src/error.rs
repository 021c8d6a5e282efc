//! Error types.
//!
//! Only structural problems surface as [`EngineError`]. Everything that goes
//! wrong while talking to a server is folded into the condition/action model
//! by the executor and never reaches the caller as an `Err`.

use thiserror::Error;

/// Failures that abort an orchestration run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("step `{step}` uses unsupported method `{method}`")]
    UnsupportedMethod { step: String, method: String },

    #[error("failed to compile helper script: {0}")]
    HelperScript(String),

    #[error("helper `{name}` cannot be bound into expressions: {reason}")]
    HelperBinding { name: String, reason: String },

    #[error("invalid base url `{url}`: {reason}")]
    BaseUrl { url: String, reason: String },

    #[error("failed to build HTTP client")]
    Client(#[from] reqwest::Error),
}

/// Failures while shaping a request out of resolved step values.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("headers do not resolve to a JSON object: {0}")]
    Headers(String),
}

/// Failures reported by a [`Transport`](crate::Transport).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid request url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header `{0}`")]
    InvalidHeader(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_method_message() {
        let err = EngineError::UnsupportedMethod {
            step: "login".into(),
            method: "HEAD".into(),
        };
        assert_eq!(err.to_string(), "step `login` uses unsupported method `HEAD`");
    }

    #[test]
    fn test_transport_other_message() {
        let err = TransportError::Other("connection reset".into());
        assert_eq!(err.to_string(), "connection reset");
    }
}
