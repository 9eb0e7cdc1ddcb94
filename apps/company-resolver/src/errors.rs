use thiserror::Error;

/// Errors surfaced to callers of the resolver.
///
/// I/O failures never reach this type: directory and cache outages are absorbed
/// inside the resolver and turned into tier misses or cache bypasses.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Failures from the external company directory.
#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    #[error("Directory rate limited")]
    RateLimited,

    #[error("Directory returned an unexpected response: {0}")]
    Malformed(String),
}

impl DirectoryError {
    /// Whether a retry policy may try the call again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DirectoryError::Unavailable(_) | DirectoryError::RateLimited)
    }
}

impl From<reqwest::Error> for DirectoryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DirectoryError::Unavailable(format!("request timed out: {e}"))
        } else if e.is_decode() {
            DirectoryError::Malformed(e.to_string())
        } else {
            DirectoryError::Unavailable(e.to_string())
        }
    }
}

/// Failures from the resolution cache's backing store.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache store unavailable: {0}")]
    Unavailable(String),

    #[error("Cache store returned an unexpected response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for CacheError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            CacheError::Malformed(e.to_string())
        } else {
            CacheError::Unavailable(e.to_string())
        }
    }
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                CacheError::Malformed(e.to_string())
            }
            other => CacheError::Unavailable(other.to_string()),
        }
    }
}
