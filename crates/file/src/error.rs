//! Error types for urifetch-file.

use thiserror::Error;

/// Errors returned by [`crate::Reader`] and its configuration types.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed URI '{uri}': {reason}")]
    MalformedUri { uri: String, reason: String },

    #[error("File not found: {uri}")]
    NotFound {
        uri: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Access denied reading file: {uri}")]
    AccessDenied {
        uri: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file: {uri}")]
    Io {
        uri: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No embedded filesystem configured to resolve: {uri}")]
    UnsupportedSource { uri: String },

    #[error("HTTP request failed with status {status} for URL: {uri}")]
    RemoteFetchFailed {
        uri: String,
        status: reqwest::StatusCode,
    },

    #[error("Failed to fetch URL: {uri}")]
    Transport {
        uri: String,
        #[source]
        source: reqwest::Error,
    },

    /// The proxy variable that applies to this request is unusable. Reported
    /// as [`ErrorKind::Transport`].
    #[error("Failed to fetch URL: {uri}")]
    Proxy {
        uri: String,
        #[source]
        source: crate::proxy::InvalidProxy,
    },

    #[error("Invalid configuration: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Flat classification of [`Error`], for callers that only need to branch
/// on what went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedUri,
    NotFound,
    AccessDenied,
    Io,
    UnsupportedSource,
    RemoteFetchFailed,
    Transport,
    Configuration,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedUri { .. } => ErrorKind::MalformedUri,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::AccessDenied { .. } => ErrorKind::AccessDenied,
            Error::Io { .. } => ErrorKind::Io,
            Error::UnsupportedSource { .. } => ErrorKind::UnsupportedSource,
            Error::RemoteFetchFailed { .. } => ErrorKind::RemoteFetchFailed,
            Error::Transport { .. } | Error::Proxy { .. } => ErrorKind::Transport,
            Error::Configuration { .. } => ErrorKind::Configuration,
        }
    }

    /// HTTP status of a [`Error::RemoteFetchFailed`], if that is what this is.
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Error::RemoteFetchFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn malformed(uri: &str, reason: impl Into<String>) -> Self {
        Error::MalformedUri {
            uri: uri.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn configuration(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Configuration {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type alias for urifetch-file operations.
pub type Result<T> = std::result::Result<T, Error>;
