//! Error types for the document store client

use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur when reading or writing documents
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP request failed (connection, timeout, protocol)
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Document or attachment does not exist
    #[error("Document not found: {0}")]
    NotFound(String),

    /// Write presented a stale revision
    ///
    /// The retry-update engine and the attachment uploader consume this; it
    /// only reaches callers of the raw [`crate::DocumentStore::save`].
    #[error("Document update conflict: {0}")]
    Conflict(String),

    /// Write did not succeed within the attempt ceiling
    #[error("Gave up writing document {id} after {attempts} attempt(s)")]
    RetryExhausted {
        /// Document id
        id: String,
        /// Number of writes sent to the store
        attempts: u32,
    },

    /// Attachment PUT answered with a status that is neither success nor conflict
    #[error("Unable to upload attachment {attachment} from {source_path}: unexpected status {status}")]
    UnexpectedStatus {
        /// Attachment name
        attachment: String,
        /// Where the payload was read from
        source_path: String,
        /// HTTP status code
        status: u16,
    },

    /// Store returned an error status on a document endpoint
    #[error("Store error (status {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the store
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Database URL cannot address documents
    #[error("Invalid store URL: {0}")]
    InvalidUrl(String),

    /// Mutation refused by its own precondition
    #[error("Change to {field} of {id} rejected: {reason}")]
    Rejected {
        /// Document id
        id: String,
        /// Field the mutation targets
        field: &'static str,
        /// Why the mutation refused to apply
        reason: String,
    },

    /// Reading an attachment source failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_)) || matches!(self, Self::Api { status: 404, .. })
    }

    /// Check if this error is a revision conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Check if the attempt ceiling was reached
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Self::RetryExhausted { .. })
    }

    /// Check if a request timed out
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }
}
