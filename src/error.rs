//! Error types shared across the relay.

use thiserror::Error;

/// Configuration failure. Always fatal: raised before any chat is possible.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required credential is absent or blank.
    #[error("Missing required credential: {0}")]
    MissingCredential(&'static str),

    /// A value is present but unusable.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// The layered configuration could not be read or deserialized.
    #[error(transparent)]
    Load(#[from] config::ConfigError),
}

/// Failure talking to the remote assistant service.
///
/// Shown to the user in place of an assistant reply; never retried.
#[derive(Error, Debug)]
pub enum RemoteServiceError {
    /// Connection, TLS, or timeout failure.
    #[error("Request to the assistant service failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("Assistant service returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error message extracted from the response body.
        message: String,
    },

    /// An assistant run ended in a non-completed state.
    #[error("Assistant run {status}: {message}")]
    Run {
        /// Terminal run status (`failed`, `expired`, ...).
        status: String,
        /// Reason reported by the service.
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("Unexpected response from assistant service: {0}")]
    Protocol(String),

    /// JSON decoding failed.
    #[error("Malformed JSON from assistant service: {0}")]
    Decode(#[from] serde_json::Error),

    /// A local file meant for upload could not be read.
    #[error("Could not read {path}: {source}")]
    LocalFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl RemoteServiceError {
    /// Whether the service reported the resource as missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

/// Knowledge sync failure.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The assistant profile has no `llm_txt_url`.
    #[error("No llm.txt URL configured for assistant '{0}'")]
    MissingSource(String),

    /// The index lists no markdown documents.
    #[error("No markdown documents listed in {0}")]
    NoDocuments(String),

    /// Downloading the index or a linked file failed.
    #[error("Download of {url} failed: {source}")]
    Download {
        /// URL being fetched.
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// Local filesystem failure in the work directory.
    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),

    /// A vector store operation failed.
    #[error(transparent)]
    Remote(#[from] RemoteServiceError),

    /// A file batch finished in a state other than `completed`.
    #[error("File batch {batch} ended with status '{status}'")]
    BatchFailed {
        /// One-based batch number.
        batch: usize,
        /// Terminal batch status.
        status: String,
    },

    /// Files still failed after every attempt.
    #[error("{failed} of {total} files failed to upload after {attempts} attempts")]
    UploadIncomplete {
        /// Files that never reached `completed`.
        failed: usize,
        /// Files submitted.
        total: usize,
        /// Attempts made.
        attempts: usize,
    },
}

/// Feedback that does not refer to an assistant reply.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FeedbackError {
    #[error("Message {0} does not exist")]
    NoSuchMessage(usize),

    #[error("Message {0} is not an assistant reply")]
    NotAssistant(usize),
}
