use chrono::Utc;
use tracing::{debug, info};

use crate::cache::ResolutionCache;
use crate::config::ResolutionSettings;
use crate::errors::ResolveError;
use crate::matching::{normalize_name, normalize_website};
use crate::models::cache::{CacheEntry, CacheKey, CacheStats};
use crate::models::company::ResolvedCompany;
use crate::resolution::single_flight::KeyedSingleFlight;
use crate::resolution::tiered::TieredResolver;

/// Cache-first company resolution used by enrichment pipelines.
///
/// Per call: one cache read, at most one cache write, and at most one tiered
/// directory lookup (only on a miss or an expired negative entry).
pub struct ResolutionOrchestrator {
    cache: ResolutionCache,
    resolver: TieredResolver,
    settings: ResolutionSettings,
    flights: KeyedSingleFlight,
}

impl ResolutionOrchestrator {
    pub fn new(
        cache: ResolutionCache,
        resolver: TieredResolver,
        settings: ResolutionSettings,
    ) -> Self {
        Self {
            cache,
            resolver,
            settings,
            flights: KeyedSingleFlight::new(),
        }
    }

    /// Resolves `name` (and optional `website`) to a directory id.
    ///
    /// `Ok(None)` means the company could not be matched, either now or by a
    /// still-fresh negative cache entry. The only error is an invalid threshold.
    pub async fn resolve_company(
        &self,
        name: &str,
        website: Option<&str>,
        confidence_threshold: Option<f64>,
    ) -> Result<Option<ResolvedCompany>, ResolveError> {
        let threshold = confidence_threshold.unwrap_or(self.settings.confidence_threshold);
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(ResolveError::InvalidInput(format!(
                "confidence threshold must be within 0.0..=1.0 (got {threshold})"
            )));
        }

        let normalized = normalize_name(name);
        if normalized.is_empty() {
            debug!("Skipping unresolvable company name '{name}'");
            return Ok(None);
        }
        let website_key = website.and_then(normalize_website);
        let key = CacheKey::for_lookup(&normalized, website_key.as_deref());

        let _flight = self.flights.acquire(&key).await;

        if let Some(entry) = self.cache.get(&normalized, website_key.as_deref()).await {
            if entry.is_positive() {
                match entry.to_resolved() {
                    Some(resolved) => {
                        debug!("Resolved '{name}' from cache ({key})");
                        return Ok(Some(resolved));
                    }
                    None => debug!("Cached entry for {key} is unusable; resolving live"),
                }
            } else if self.cache.is_negative_and_fresh(&entry) {
                debug!("Negative cache entry for {key} is still fresh; not retrying");
                return Ok(None);
            } else {
                info!("Negative cache entry for {key} expired; retrying live lookup");
            }
        }

        let resolution = self
            .resolver
            .resolve(
                name,
                website_key.as_deref(),
                threshold,
                self.settings.allow_fallback_tier,
            )
            .await;

        let now = Utc::now();
        match resolution {
            Some(resolution) => {
                let entry = CacheEntry::from_resolution(
                    &normalized,
                    website_key.as_deref(),
                    name,
                    &resolution,
                    now,
                );
                self.cache.put(&entry).await;
                Ok(Some(ResolvedCompany::live(resolution)))
            }
            None => {
                info!("Recording negative resolution for {key}");
                let entry = CacheEntry::negative(&normalized, website_key.as_deref(), name, now);
                self.cache.put(&entry).await;
                Ok(None)
            }
        }
    }

    /// Entry totals, total hits and per-tier counts. No side effects.
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::errors::DirectoryError;
    use crate::models::cache::LookupTier;
    use crate::models::company::{CompanyId, MatchTier};
    use crate::testing::{record, FakeDirectory, Operation, UnreachableStore};
    use std::sync::Arc;

    fn orchestrator(
        fake: &FakeDirectory,
        store: Arc<dyn crate::cache::CacheStore>,
    ) -> ResolutionOrchestrator {
        let settings = ResolutionSettings::default();
        ResolutionOrchestrator::new(
            ResolutionCache::new(store, settings.negative_ttl),
            TieredResolver::new(Arc::new(fake.clone()), settings.clone()),
            settings,
        )
    }

    fn acme_directory() -> FakeDirectory {
        FakeDirectory::new()
            .with_website("acme.com", CompanyId(42))
            .with_record(record(42, "Acme Corporation", 0.0))
            .with_name_hits("Acme Corp", vec![record(42, "Acme Corporation", 8.0)])
    }

    #[tokio::test]
    async fn test_website_resolution_then_cache_hit() {
        let fake = acme_directory();
        let store = Arc::new(MemoryCacheStore::new());
        let orch = orchestrator(&fake, store.clone());

        let first = orch
            .resolve_company("Acme Corp", Some("acme.com"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.company_id, CompanyId(42));
        assert_eq!(first.tier, MatchTier::Website);
        assert_eq!(first.confidence, 1.0);
        assert!(!first.from_cache);
        let calls_after_first = fake.calls();

        let second = orch
            .resolve_company("Acme Corp", Some("acme.com"), None)
            .await
            .unwrap()
            .unwrap();
        assert!(second.from_cache);
        assert_eq!(second.company_id, CompanyId(42));
        assert_eq!(fake.calls(), calls_after_first);

        let stored = store
            .snapshot(&CacheKey::Website("acme.com".to_string()))
            .await
            .unwrap();
        assert_eq!(stored.hit_count, 1);
        assert_eq!(stored.original_name, "Acme Corp");
    }

    #[tokio::test]
    async fn test_name_resolution_without_website() {
        let fake = acme_directory();
        let orch = orchestrator(&fake, Arc::new(MemoryCacheStore::new()));

        let resolved = orch
            .resolve_company("Acme Corp", None, Some(0.75))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.tier, MatchTier::NameExact);
        assert_eq!(resolved.confidence, 0.87);
        assert_eq!(fake.calls().website, 0);
    }

    #[tokio::test]
    async fn test_no_match_persists_negative_entry() {
        let fake = FakeDirectory::new();
        let store = Arc::new(MemoryCacheStore::new());
        let orch = orchestrator(&fake, store.clone());

        let resolved = orch.resolve_company("Nobody Ltd", None, None).await.unwrap();
        assert!(resolved.is_none());

        let entry = store
            .snapshot(&CacheKey::Name("nobody".to_string()))
            .await
            .unwrap();
        assert!(!entry.lookup_successful);
        assert_eq!(entry.lookup_tier, LookupTier::None);
        assert_eq!(entry.resolved_id, None);
    }

    #[tokio::test]
    async fn test_fresh_negative_suppresses_lookup() {
        let fake = FakeDirectory::new();
        let store = Arc::new(MemoryCacheStore::new());
        let ttl = ResolutionSettings::default().negative_ttl;
        let created = Utc::now() - ttl + chrono::Duration::seconds(1);
        store
            .seed(CacheEntry::negative("nobody", None, "Nobody", created))
            .await;
        let orch = orchestrator(&fake, store);

        assert!(orch.resolve_company("Nobody", None, None).await.unwrap().is_none());
        assert_eq!(fake.calls().total(), 0);
    }

    #[tokio::test]
    async fn test_expired_negative_is_retried() {
        let fake = FakeDirectory::new()
            .with_name_hits("Nobody", vec![record(77, "Nobody", 9.0)]);
        let store = Arc::new(MemoryCacheStore::new());
        let ttl = ResolutionSettings::default().negative_ttl;
        let created = Utc::now() - ttl - chrono::Duration::seconds(1);
        store
            .seed(CacheEntry::negative("nobody", None, "Nobody", created))
            .await;
        let orch = orchestrator(&fake, store.clone());

        let resolved = orch.resolve_company("Nobody", None, None).await.unwrap().unwrap();
        assert_eq!(resolved.company_id, CompanyId(77));
        assert!(!resolved.from_cache);
        assert_eq!(fake.calls().name, 1);

        let entry = store
            .snapshot(&CacheKey::Name("nobody".to_string()))
            .await
            .unwrap();
        assert!(entry.is_positive());
    }

    #[tokio::test]
    async fn test_expired_negative_still_missing_refreshes_timestamp() {
        let fake = FakeDirectory::new();
        let store = Arc::new(MemoryCacheStore::new());
        let ttl = ResolutionSettings::default().negative_ttl;
        let created = Utc::now() - ttl - chrono::Duration::hours(1);
        store
            .seed(CacheEntry::negative("nobody", None, "Nobody", created))
            .await;
        let orch = orchestrator(&fake, store.clone());

        assert!(orch.resolve_company("Nobody", None, None).await.unwrap().is_none());
        let entry = store
            .snapshot(&CacheKey::Name("nobody".to_string()))
            .await
            .unwrap();
        assert!(entry.created_at > created);
    }

    #[tokio::test]
    async fn test_failed_retry_never_downgrades_positive() {
        let fake = acme_directory();
        let store = Arc::new(MemoryCacheStore::new());
        let orch = orchestrator(&fake, store.clone());
        orch.resolve_company("Acme Corp", None, None).await.unwrap();

        // a racing writer that found nothing must not clobber the positive row
        let cache = ResolutionCache::new(store.clone(), chrono::Duration::days(7));
        cache
            .put(&CacheEntry::negative("acme", None, "Acme Corp", Utc::now()))
            .await;

        let entry = store
            .snapshot(&CacheKey::Name("acme".to_string()))
            .await
            .unwrap();
        assert!(entry.is_positive());
        assert_eq!(entry.resolved_id, Some(CompanyId(42)));
    }

    #[tokio::test]
    async fn test_cache_outage_still_resolves_live() {
        let fake = acme_directory();
        let orch = orchestrator(&fake, Arc::new(UnreachableStore));

        let resolved = orch
            .resolve_company("Acme Corp", Some("acme.com"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.company_id, CompanyId(42));
        assert!(!resolved.from_cache);
        assert_eq!(orch.cache_stats().await, CacheStats::default());
    }

    #[tokio::test]
    async fn test_blank_name_touches_nothing() {
        let fake = acme_directory();
        let store = Arc::new(MemoryCacheStore::new());
        let orch = orchestrator(&fake, store.clone());

        assert!(orch.resolve_company(" ,. ", Some("acme.com"), None).await.unwrap().is_none());
        assert_eq!(fake.calls().total(), 0);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_threshold_is_rejected() {
        let orch = orchestrator(&acme_directory(), Arc::new(MemoryCacheStore::new()));
        for bad in [-0.1, 1.5, f64::NAN] {
            let err = orch.resolve_company("Acme", None, Some(bad)).await.unwrap_err();
            assert!(matches!(err, ResolveError::InvalidInput(_)));
        }
    }

    #[tokio::test]
    async fn test_directory_outage_records_negative() {
        let fake = acme_directory();
        fake.break_operation(Operation::Website, DirectoryError::Unavailable("down".to_string()));
        fake.break_operation(Operation::Name, DirectoryError::Unavailable("down".to_string()));
        fake.break_operation(Operation::Fallback, DirectoryError::Unavailable("down".to_string()));
        let store = Arc::new(MemoryCacheStore::new());
        let orch = orchestrator(&fake, store.clone());

        assert!(orch
            .resolve_company("Acme Corp", Some("acme.com"), None)
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_cold_lookups_share_one_directory_sequence() {
        let fake = acme_directory();
        let orch = Arc::new(orchestrator(&fake, Arc::new(MemoryCacheStore::new())));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let orch = orch.clone();
                tokio::spawn(async move {
                    orch.resolve_company("Acme Corp", Some("acme.com"), None)
                        .await
                        .unwrap()
                        .unwrap()
                })
            })
            .collect();

        let mut from_cache = 0;
        for handle in handles {
            if handle.await.unwrap().from_cache {
                from_cache += 1;
            }
        }
        assert_eq!(from_cache, 4);
        assert_eq!(fake.calls().website, 1);
    }

    #[tokio::test]
    async fn test_stats_reflect_tiers_and_hits() {
        let fake = acme_directory();
        let orch = orchestrator(&fake, Arc::new(MemoryCacheStore::new()));
        orch.resolve_company("Acme Corp", Some("acme.com"), None).await.unwrap();
        orch.resolve_company("Acme Corp", Some("acme.com"), None).await.unwrap();
        orch.resolve_company("Nobody", None, None).await.unwrap();

        let stats = orch.cache_stats().await;
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.total_hits, 1);
        assert_eq!(stats.tier_distribution[&LookupTier::Website], 1);
        assert_eq!(stats.tier_distribution[&LookupTier::None], 1);
    }
}
