use thiserror::Error;

/// Errors that can occur while talking to the broker.
#[derive(Debug, Error)]
pub enum QueueError {
    /// AMQP connection, channel or protocol failure.
    #[error("Broker error: {0}")]
    Broker(#[from] lapin::Error),

    /// A publish did not finish within the allotted time.
    #[error("Publish timeout after {0}ms")]
    PublishTimeout(u64),

    /// The outbound message could not be encoded.
    #[error("Message encoding error: {0}")]
    Encode(#[from] cardlink_core::Error),

    /// The broker ended the delivery stream.
    #[error("Consumer stream ended for queue {0}")]
    StreamEnded(String),
}

pub type Result<T> = std::result::Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            QueueError::PublishTimeout(10_000).to_string(),
            "Publish timeout after 10000ms"
        );
        assert_eq!(
            QueueError::StreamEnded("terminal_7".to_string()).to_string(),
            "Consumer stream ended for queue terminal_7"
        );
    }

    #[test]
    fn test_core_error_conversion() {
        let error: QueueError = cardlink_core::Error::InvalidScanId("empty".to_string()).into();
        assert!(matches!(error, QueueError::Encode(_)));
    }
}
