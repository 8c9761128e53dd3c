use thiserror::Error;

/// Failure taxonomy for the chat backends. Configuration problems are
/// detected before any I/O; transport and protocol failures stay
/// distinguishable so callers can report them differently. Tool-level
/// failures never appear here; they are returned inside the conversation
/// as structured tool results.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl BackendError {
    pub fn config(message: impl Into<String>) -> Self {
        BackendError::Config(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        BackendError::Transport(message.into())
    }

    /// Transport failure carrying the server's request-correlation id when
    /// one was available.
    pub fn transport_with_request_id(message: impl Into<String>, request_id: Option<&str>) -> Self {
        let message = message.into();
        match request_id {
            Some(id) if !id.trim().is_empty() => {
                BackendError::Transport(format!("{message} (request_id={id})"))
            }
            _ => BackendError::Transport(message),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        BackendError::Protocol(message.into())
    }

    pub fn is_config(&self) -> bool {
        matches!(self, BackendError::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_appends_request_id_when_present() {
        let error = BackendError::transport_with_request_id("HTTP 500: boom", Some("req_42"));
        assert_eq!(
            error.to_string(),
            "transport error: HTTP 500: boom (request_id=req_42)"
        );

        let error = BackendError::transport_with_request_id("HTTP 500: boom", None);
        assert_eq!(error.to_string(), "transport error: HTTP 500: boom");
    }

    #[test]
    fn test_variants_render_distinct_prefixes() {
        assert!(BackendError::config("x").to_string().starts_with("configuration error"));
        assert!(BackendError::protocol("x").to_string().starts_with("protocol error"));
        assert!(BackendError::config("x").is_config());
        assert!(!BackendError::protocol("x").is_config());
    }
}
