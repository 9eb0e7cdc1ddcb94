//! Directory client. The only path from the resolver to the external company directory.
//!
//! `TieredResolver` holds an `Arc<dyn DirectoryClient>`; production wires
//! `RetryingDirectoryClient<HttpDirectoryClient>`, tests wire fakes.

use async_trait::async_trait;

use crate::errors::DirectoryError;
use crate::models::company::{CompanyId, DirectoryRecord};

pub mod http;
pub mod query;
pub mod retry;

pub use http::HttpDirectoryClient;
pub use retry::{RetryPolicy, RetryingDirectoryClient};

/// Read-only operations against the company directory. Implementations do not retry.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Exact match on the directory's website field, most relevant first.
    async fn search_by_website(&self, website: &str) -> Result<Vec<CompanyId>, DirectoryError>;

    /// Exact, wildcard and tokenized name match; at most `limit` hits.
    async fn search_by_name(
        &self,
        name: &str,
        limit: usize,
    ) -> Result<Vec<DirectoryRecord>, DirectoryError>;

    /// Full record, or `None` when the id does not exist.
    async fn fetch_by_id(&self, id: CompanyId) -> Result<Option<DirectoryRecord>, DirectoryError>;

    /// Looser secondary index used as a last resort. Empty when no such index is configured.
    async fn search_fallback(
        &self,
        normalized_name: &str,
    ) -> Result<Vec<DirectoryRecord>, DirectoryError>;
}
