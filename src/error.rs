//! Error taxonomy for registry calls.

use std::fmt;
use thiserror::Error;

/// How a single HTTP exchange with a registry failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpFailure {
    /// The request never produced a response (connection refused, DNS, TLS...)
    Network(String),
    /// The request was cancelled by its timeout
    TimedOut,
    /// 404
    NotFound,
    /// Any other 4xx, usually configuration or credentials
    Client(u16),
    /// 5xx
    Server(u16),
    /// A non-success status outside 4xx/5xx (e.g. an unfollowed redirect)
    Unexpected(u16),
}

impl HttpFailure {
    pub fn from_status(status: u16) -> Self {
        match status {
            404 => HttpFailure::NotFound,
            400..=499 => HttpFailure::Client(status),
            500..=599 => HttpFailure::Server(status),
            other => HttpFailure::Unexpected(other),
        }
    }

    /// Status code as the registry reported it; 0 when no response arrived.
    pub fn status_code(&self) -> u16 {
        match self {
            HttpFailure::Network(_) | HttpFailure::TimedOut => 0,
            HttpFailure::NotFound => 404,
            HttpFailure::Client(code) | HttpFailure::Server(code) | HttpFailure::Unexpected(code) => {
                *code
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, HttpFailure::NotFound)
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, HttpFailure::Network(_) | HttpFailure::TimedOut)
    }
}

impl fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpFailure::Network(reason) => write!(f, "registry unreachable: {}", reason),
            HttpFailure::TimedOut => write!(f, "request timed out"),
            HttpFailure::NotFound => write!(f, "HTTP 404 Not Found"),
            HttpFailure::Client(code) => write!(f, "HTTP {} (client error)", code),
            HttpFailure::Server(code) => write!(f, "HTTP {} (server error)", code),
            HttpFailure::Unexpected(code) => write!(f, "unexpected HTTP {}", code),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to fetch catalog from {registry}: {failure}")]
    CatalogFetch { registry: String, failure: HttpFailure },

    #[error("failed to fetch tags for {repository}: {failure}")]
    TagsFetch {
        repository: String,
        failure: HttpFailure,
    },

    #[error("failed to fetch manifest {repository}:{reference}: {failure}")]
    ManifestFetch {
        repository: String,
        reference: String,
        failure: HttpFailure,
    },

    #[error("failed to fetch blob {digest}: {failure}")]
    BlobFetch { digest: String, failure: HttpFailure },

    #[error("blob {digest} is not JSON (mediaType: {media_type})")]
    NotJson { digest: String, media_type: String },

    #[error("failed to decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{url}: {failure}")]
    Request { url: String, failure: HttpFailure },

    #[error("GitHub source {registry} has no username configured")]
    MissingUsername { registry: String },

    #[error("no package version of {package} carries tag {tag}")]
    VersionNotFound { package: String, tag: String },
}

impl RegistryError {
    /// The HTTP-level failure behind this error, if there is one.
    pub fn failure(&self) -> Option<&HttpFailure> {
        match self {
            RegistryError::CatalogFetch { failure, .. }
            | RegistryError::TagsFetch { failure, .. }
            | RegistryError::ManifestFetch { failure, .. }
            | RegistryError::BlobFetch { failure, .. }
            | RegistryError::Request { failure, .. } => Some(failure),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.failure().map(HttpFailure::is_not_found).unwrap_or(false)
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
