//! Queue tap error types

use thiserror::Error;

use contracts::IngestError;

/// Queue tap errors
#[derive(Debug, Error)]
pub enum QueueTapError {
    /// Broker connection failure
    #[error("amqp connect error: {message}")]
    Connect { message: String },

    /// Exchange/queue/binding declaration failure
    #[error("amqp provision error for '{object}': {message}")]
    Provision { object: String, message: String },

    /// Consumer stream failure
    #[error("amqp consume error: {message}")]
    Consume { message: String },

    /// Acknowledgement failure
    #[error("amqp acknowledge error: {message}")]
    Acknowledge { message: String },

    /// Contract error
    #[error(transparent)]
    Contract(#[from] IngestError),
}

impl QueueTapError {
    /// Create a connection error
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    /// Create a provisioning error
    pub fn provision(object: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provision {
            object: object.into(),
            message: message.into(),
        }
    }

    /// Create a consume error
    pub fn consume(message: impl Into<String>) -> Self {
        Self::Consume {
            message: message.into(),
        }
    }

    /// Create an acknowledgement error
    pub fn acknowledge(message: impl Into<String>) -> Self {
        Self::Acknowledge {
            message: message.into(),
        }
    }
}

impl From<QueueTapError> for IngestError {
    fn from(e: QueueTapError) -> Self {
        match e {
            QueueTapError::Contract(inner) => inner,
            other => IngestError::transport(other.to_string()),
        }
    }
}

/// Queue tap result alias
pub type Result<T> = std::result::Result<T, QueueTapError>;
