//! One retry policy for every directory call.
//!
//! Rate limits back off exponentially (1s, 2s, 4s ...) up to `rate_limit_max_attempts`
//! total attempts; other unavailability is retried `unavailable_max_retries` times
//! after a fixed delay. Anything else is returned immediately.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::directory::DirectoryClient;
use crate::errors::DirectoryError;
use crate::models::company::{CompanyId, DirectoryRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub rate_limit_max_attempts: u32,
    pub base_delay: Duration,
    pub unavailable_max_retries: u32,
    pub unavailable_retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit_max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            unavailable_max_retries: 1,
            unavailable_retry_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            rate_limit_max_attempts: 1,
            base_delay: Duration::ZERO,
            unavailable_max_retries: 0,
            unavailable_retry_delay: Duration::ZERO,
        }
    }

    /// Delay before the next attempt, or `None` when the error is final.
    ///
    /// `rate_limited_so_far` and `unavailable_so_far` count failures already
    /// seen of each kind, including `err`.
    fn next_delay(
        &self,
        err: &DirectoryError,
        rate_limited_so_far: u32,
        unavailable_so_far: u32,
    ) -> Option<Duration> {
        if !err.is_retryable() {
            return None;
        }
        match err {
            DirectoryError::RateLimited if rate_limited_so_far < self.rate_limit_max_attempts => {
                let exponent = rate_limited_so_far.saturating_sub(1).min(16);
                Some(
                    self.base_delay
                        .checked_mul(1u32 << exponent)
                        .unwrap_or(Duration::MAX),
                )
            }
            DirectoryError::Unavailable(_) if unavailable_so_far <= self.unavailable_max_retries => {
                Some(self.unavailable_retry_delay)
            }
            _ => None,
        }
    }

    /// Runs `call` until it succeeds or the policy gives up, returning the last error.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, DirectoryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DirectoryError>>,
    {
        let mut rate_limited = 0u32;
        let mut unavailable = 0u32;

        loop {
            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match &err {
                DirectoryError::RateLimited => rate_limited += 1,
                DirectoryError::Unavailable(_) => unavailable += 1,
                DirectoryError::Malformed(_) => {}
            }

            let Some(delay) = self.next_delay(&err, rate_limited, unavailable) else {
                return Err(err);
            };

            warn!(
                "Directory {} failed ({}), retrying after {}ms...",
                operation,
                err,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Wraps a [`DirectoryClient`] so every call goes through a [`RetryPolicy`].
pub struct RetryingDirectoryClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: DirectoryClient> RetryingDirectoryClient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<C: DirectoryClient> DirectoryClient for RetryingDirectoryClient<C> {
    async fn search_by_website(&self, website: &str) -> Result<Vec<CompanyId>, DirectoryError> {
        self.policy
            .run("website search", || self.inner.search_by_website(website))
            .await
    }

    async fn search_by_name(
        &self,
        name: &str,
        limit: usize,
    ) -> Result<Vec<DirectoryRecord>, DirectoryError> {
        self.policy
            .run("name search", || self.inner.search_by_name(name, limit))
            .await
    }

    async fn fetch_by_id(&self, id: CompanyId) -> Result<Option<DirectoryRecord>, DirectoryError> {
        self.policy
            .run("collect", || self.inner.fetch_by_id(id))
            .await
    }

    async fn search_fallback(
        &self,
        normalized_name: &str,
    ) -> Result<Vec<DirectoryRecord>, DirectoryError> {
        self.policy
            .run("fallback search", || self.inner.search_fallback(normalized_name))
            .await
    }
}
