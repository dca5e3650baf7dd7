use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while assembling the agent.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Terminal is not registered: no credentials at {}", path.display())]
    NotRegistered { path: PathBuf },

    #[error("Invalid backend URL '{url}': {reason}")]
    InvalidBackendUrl { url: String, reason: String },
}

pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = AgentError::NotRegistered {
            path: PathBuf::from("/tmp/credentials.json"),
        };
        assert_eq!(
            error.to_string(),
            "Terminal is not registered: no credentials at /tmp/credentials.json"
        );

        let error = AgentError::InvalidBackendUrl {
            url: "http://".to_string(),
            reason: "missing host".to_string(),
        };
        assert_eq!(error.to_string(), "Invalid backend URL 'http://': missing host");
    }
}
