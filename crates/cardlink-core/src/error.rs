use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Identity errors
    #[error("Invalid scan id: {0}")]
    InvalidScanId(String),

    #[error("Invalid card id: {0}")]
    InvalidCardId(String),


    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = Error::Config("Cannot determine home directory".to_string());
        assert_eq!(
            error.to_string(),
            "Configuration error: Cannot determine home directory"
        );

        let error = Error::InvalidScanId("empty".to_string());
        assert_eq!(error.to_string(), "Invalid scan id: empty");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let error: Error = io.into();
        assert!(matches!(error, Error::Io(_)));
    }
}
