//! Tiered resolver. Tries the website, then the exact name, then a fuzzy name, then the fallback index.
//!
//! Tiers run in that order and the first accepted match wins. A tier whose
//! directory call fails (after the client's retries) counts as "no candidates"
//! and resolution moves on to the next tier.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::ResolutionSettings;
use crate::directory::DirectoryClient;
use crate::errors::DirectoryError;
use crate::matching::{combined_confidence, normalize_name, normalize_website};
use crate::models::company::{DirectoryRecord, MatchTier, Resolution};

pub struct TieredResolver {
    directory: Arc<dyn DirectoryClient>,
    settings: ResolutionSettings,
}

impl TieredResolver {
    pub fn new(directory: Arc<dyn DirectoryClient>, settings: ResolutionSettings) -> Self {
        Self {
            directory,
            settings,
        }
    }

    /// Resolves a company to a directory id, or `None` when no tier accepts a match.
    pub async fn resolve(
        &self,
        name: &str,
        website: Option<&str>,
        confidence_threshold: f64,
        allow_fallback_tier: bool,
    ) -> Option<Resolution> {
        if let Some(website_key) = website.and_then(normalize_website) {
            if let Some(resolution) = self.website_tier(&website_key).await {
                return Some(resolution);
            }
        }

        let normalized = normalize_name(name);
        if normalized.is_empty() {
            debug!("Name '{name}' normalizes to nothing; skipping name tiers");
            return None;
        }

        let candidates = self.name_candidates(name).await;
        if let Some(resolution) = self.name_exact_tier(name, &candidates, confidence_threshold) {
            return Some(resolution);
        }
        if let Some(resolution) = self.fuzzy_tier(&normalized, &candidates, confidence_threshold) {
            return Some(resolution);
        }

        if allow_fallback_tier {
            if let Some(resolution) = self.fallback_tier(&normalized).await {
                return Some(resolution);
            }
        }

        info!("No directory match for '{name}'");
        None
    }

    /// Authoritative: any id returned for the website is accepted at confidence 1.0.
    async fn website_tier(&self, website_key: &str) -> Option<Resolution> {
        let ids = tier_result(
            MatchTier::Website,
            self.directory.search_by_website(website_key).await,
        );
        let id = *ids.first()?;

        let mut metadata = match self.directory.fetch_by_id(id).await {
            Ok(Some(record)) => record.metadata(),
            Ok(None) => {
                warn!("Directory returned id {id} for {website_key} but has no record for it");
                Map::new()
            }
            Err(e) => {
                warn!("Could not fetch record {id} for {website_key}: {e}");
                Map::new()
            }
        };
        metadata
            .entry("website".to_string())
            .or_insert_with(|| Value::from(website_key));

        info!("Resolved website {website_key} to {id} (tier: website)");
        Some(Resolution {
            company_id: id,
            tier: MatchTier::Website,
            confidence: 1.0,
            metadata,
        })
    }

    async fn name_candidates(&self, name: &str) -> Vec<DirectoryRecord> {
        tier_result(
            MatchTier::NameExact,
            self.directory
                .search_by_name(name.trim(), self.settings.name_search_limit)
                .await,
        )
    }

    /// Scores candidates against the case-folded query as given.
    fn name_exact_tier(
        &self,
        name: &str,
        candidates: &[DirectoryRecord],
        threshold: f64,
    ) -> Option<Resolution> {
        let query = name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        let (record, confidence) = best_candidate(candidates, |record| {
            combined_confidence(&query, &record.name.to_lowercase(), record.relevance_score)
        })?;

        debug!(
            "Best name_exact candidate for '{name}': {} ({}) at {confidence}",
            record.name, record.id
        );
        accept(record, confidence, threshold, MatchTier::NameExact)
    }

    /// Re-scores the same candidates with both sides normalized, under a relaxed threshold.
    fn fuzzy_tier(
        &self,
        normalized: &str,
        candidates: &[DirectoryRecord],
        threshold: f64,
    ) -> Option<Resolution> {
        let (record, confidence) = best_candidate(candidates, |record| {
            combined_confidence(normalized, &normalize_name(&record.name), record.relevance_score)
        })?;

        let relaxed = self.settings.relaxed_threshold(threshold);
        debug!(
            "Best fuzzy candidate for '{normalized}': {} ({}) at {confidence} (needs {relaxed})",
            record.name, record.id
        );
        accept(record, confidence, relaxed, MatchTier::Fuzzy)
    }

    /// Last resort: the first hit from the looser index, accepted unconditionally.
    async fn fallback_tier(&self, normalized: &str) -> Option<Resolution> {
        let hits = tier_result(
            MatchTier::Fallback,
            self.directory.search_fallback(normalized).await,
        );
        let record = hits.into_iter().next()?;
        let confidence = combined_confidence(
            normalized,
            &normalize_name(&record.name),
            record.relevance_score,
        );

        info!(
            "Resolved '{normalized}' to {} via fallback index (confidence {confidence})",
            record.id
        );
        Some(Resolution {
            company_id: record.id,
            tier: MatchTier::Fallback,
            confidence,
            metadata: record.metadata(),
        })
    }
}

/// A failed tier contributes no candidates.
fn tier_result<T>(tier: MatchTier, result: Result<Vec<T>, DirectoryError>) -> Vec<T> {
    match result {
        Ok(items) => items,
        Err(e) => {
            warn!("Tier {tier} failed, moving on: {e}");
            Vec::new()
        }
    }
}

/// Highest-scoring candidate; the directory's order breaks ties.
fn best_candidate<F>(candidates: &[DirectoryRecord], score: F) -> Option<(&DirectoryRecord, f64)>
where
    F: Fn(&DirectoryRecord) -> f64,
{
    candidates
        .iter()
        .map(|record| (record, score(record)))
        .fold(None, |best, (record, confidence)| match best {
            Some((_, best_confidence)) if best_confidence >= confidence => best,
            _ => Some((record, confidence)),
        })
}

fn accept(
    record: &DirectoryRecord,
    confidence: f64,
    threshold: f64,
    tier: MatchTier,
) -> Option<Resolution> {
    if confidence < threshold {
        return None;
    }
    info!(
        "Resolved to {} '{}' (tier: {tier}, confidence: {confidence})",
        record.id, record.name
    );
    Some(Resolution {
        company_id: record.id,
        tier,
        confidence,
        metadata: record.metadata(),
    })
}
