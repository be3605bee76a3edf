//! Error types shared across the crate

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure modes surfaced to callers of the repository and store.
#[derive(Debug, Error)]
pub enum Error {
    /// Network unreachable, timeout, or another transport-level failure.
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status code.
    #[error("server returned HTTP {status}")]
    Status { status: u16 },

    /// A response body did not match the expected wire shape. Fatal for the
    /// request that produced it; never applied to the cache.
    #[error("failed to decode {context}: {message}")]
    Decode {
        context: &'static str,
        message: String,
    },

    /// The local cache store failed; the surrounding transaction rolled back.
    #[error("cache error: {0}")]
    Cache(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    /// The short-page sentinel never fired; treated like a transport failure.
    #[error("pagination did not terminate after {pages} pages")]
    Pagination { pages: u32 },

    /// Cooperative cancellation marker for superseded requests.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn decode(context: &'static str, message: impl std::fmt::Display) -> Self {
        Self::Decode {
            context,
            message: message.to_string(),
        }
    }

    /// Whether this error is the cooperative-cancellation marker.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
