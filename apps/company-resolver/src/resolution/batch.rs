//! Batch enrichment over one discovery run.
//!
//! Dedup state lives in a [`BatchContext`] owned by the caller for the duration
//! of the run, so nothing leaks between unrelated runs.

use std::collections::HashSet;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::matching::{normalize_name, normalize_website};
use crate::models::cache::CacheKey;
use crate::models::company::ResolvedCompany;
use crate::resolution::orchestrator::ResolutionOrchestrator;

/// A company as discovered upstream (job posting, search result, analyst input).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyQuery {
    pub name: String,
    #[serde(default)]
    pub website: Option<String>,
}

impl CompanyQuery {
    pub fn new(name: impl Into<String>, website: Option<&str>) -> Self {
        Self {
            name: name.into(),
            website: website.map(str::to_string),
        }
    }

    /// The cache key this query resolves under, or `None` if the name is unusable.
    fn key(&self) -> Option<CacheKey> {
        let normalized = normalize_name(&self.name);
        if normalized.is_empty() {
            return None;
        }
        let website_key = self.website.as_deref().and_then(normalize_website);
        Some(CacheKey::for_lookup(&normalized, website_key.as_deref()))
    }
}

/// Request-scoped state for one enrichment run.
#[derive(Debug, Default)]
pub struct BatchContext {
    seen: HashSet<CacheKey>,
}

impl BatchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub query: CompanyQuery,
    pub resolution: Option<ResolvedCompany>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub resolved: usize,
    pub unresolved: usize,
    pub from_cache: usize,
    pub duplicates_skipped: usize,
    pub invalid_skipped: usize,
}

/// Resolves every not-yet-seen company in `queries` with at most `concurrency`
/// lookups in flight. Outcomes keep the input order of the first occurrence.
pub async fn enrich_companies(
    orchestrator: &ResolutionOrchestrator,
    queries: Vec<CompanyQuery>,
    ctx: &mut BatchContext,
    concurrency: usize,
) -> (Vec<BatchOutcome>, BatchSummary) {
    let mut summary = BatchSummary::default();
    let mut pending = Vec::new();

    for query in queries {
        let Some(key) = query.key() else {
            summary.invalid_skipped += 1;
            continue;
        };
        if ctx.seen.insert(key) {
            pending.push(query);
        } else {
            summary.duplicates_skipped += 1;
        }
    }

    let outcomes: Vec<BatchOutcome> = stream::iter(pending)
        .map(move |query| async move {
            let resolution = match orchestrator
                .resolve_company(&query.name, query.website.as_deref(), None)
                .await
            {
                Ok(resolution) => resolution,
                Err(e) => {
                    warn!("Could not resolve '{}': {e}", query.name);
                    None
                }
            };
            BatchOutcome { query, resolution }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    for outcome in &outcomes {
        match &outcome.resolution {
            Some(resolved) => {
                summary.resolved += 1;
                if resolved.from_cache {
                    summary.from_cache += 1;
                }
            }
            None => summary.unresolved += 1,
        }
    }

    info!(
        "Batch enrichment finished: {} resolved ({} from cache), {} unresolved, {} duplicates skipped",
        summary.resolved, summary.from_cache, summary.unresolved, summary.duplicates_skipped
    );
    (outcomes, summary)
}
