use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::company::{CompanyId, MatchTier, Resolution, ResolvedCompany};

/// Persisted tier vocabulary. `None` marks a negative entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupTier {
    Website,
    NameExact,
    Fuzzy,
    Fallback,
    None,
}

impl LookupTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupTier::Website => "website",
            LookupTier::NameExact => "name_exact",
            LookupTier::Fuzzy => "fuzzy",
            LookupTier::Fallback => "fallback",
            LookupTier::None => "none",
        }
    }

    pub fn match_tier(&self) -> Option<MatchTier> {
        match self {
            LookupTier::Website => Some(MatchTier::Website),
            LookupTier::NameExact => Some(MatchTier::NameExact),
            LookupTier::Fuzzy => Some(MatchTier::Fuzzy),
            LookupTier::Fallback => Some(MatchTier::Fallback),
            LookupTier::None => None,
        }
    }
}

impl From<MatchTier> for LookupTier {
    fn from(tier: MatchTier) -> Self {
        match tier {
            MatchTier::Website => LookupTier::Website,
            MatchTier::NameExact => LookupTier::NameExact,
            MatchTier::Fuzzy => LookupTier::Fuzzy,
            MatchTier::Fallback => LookupTier::Fallback,
        }
    }
}

impl fmt::Display for LookupTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LookupTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "website" => Ok(LookupTier::Website),
            "name_exact" => Ok(LookupTier::NameExact),
            "fuzzy" => Ok(LookupTier::Fuzzy),
            "fallback" => Ok(LookupTier::Fallback),
            "none" => Ok(LookupTier::None),
            other => Err(format!("unknown lookup tier '{other}'")),
        }
    }
}

/// The unique key a cache entry is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Website(String),
    Name(String),
}

impl CacheKey {
    pub fn for_lookup(normalized_name: &str, website_key: Option<&str>) -> Self {
        match website_key {
            Some(website) => CacheKey::Website(website.to_string()),
            None => CacheKey::Name(normalized_name.to_string()),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Website(w) => write!(f, "website:{w}"),
            CacheKey::Name(n) => write!(f, "name:{n}"),
        }
    }
}

/// One persisted resolution, positive or negative.
///
/// Field names follow the cache table's columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub normalized_name: String,
    #[serde(rename = "website", default)]
    pub website_key: Option<String>,
    pub original_name: String,
    #[serde(rename = "company_id", default)]
    pub resolved_id: Option<CompanyId>,
    pub lookup_tier: LookupTier,
    pub confidence: f64,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub hit_count: i64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub lookup_successful: bool,
}

impl CacheEntry {
    /// Maps a resolver result onto the persisted schema.
    pub fn from_resolution(
        normalized_name: &str,
        website_key: Option<&str>,
        original_name: &str,
        resolution: &Resolution,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            normalized_name: normalized_name.to_string(),
            website_key: website_key.map(str::to_string),
            original_name: original_name.to_string(),
            resolved_id: Some(resolution.company_id),
            lookup_tier: resolution.tier.into(),
            confidence: resolution.confidence,
            metadata: Value::Object(resolution.metadata.clone()),
            hit_count: 0,
            created_at: now,
            last_accessed_at: now,
            lookup_successful: true,
        }
    }

    /// A record that every tier came up empty for this key.
    pub fn negative(
        normalized_name: &str,
        website_key: Option<&str>,
        original_name: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            normalized_name: normalized_name.to_string(),
            website_key: website_key.map(str::to_string),
            original_name: original_name.to_string(),
            resolved_id: None,
            lookup_tier: LookupTier::None,
            confidence: 0.0,
            metadata: Value::Object(Map::new()),
            hit_count: 0,
            created_at: now,
            last_accessed_at: now,
            lookup_successful: false,
        }
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::for_lookup(&self.normalized_name, self.website_key.as_deref())
    }

    pub fn is_positive(&self) -> bool {
        self.lookup_successful && self.resolved_id.is_some()
    }

    /// Maps a positive entry back to the caller-facing shape.
    /// Returns `None` for negative entries or rows with an unusable tier.
    pub fn to_resolved(&self) -> Option<ResolvedCompany> {
        if !self.is_positive() {
            return None;
        }
        Some(ResolvedCompany {
            company_id: self.resolved_id?,
            confidence: self.confidence,
            tier: self.lookup_tier.match_tier()?,
            from_cache: true,
            metadata: match &self.metadata {
                Value::Object(map) => map.clone(),
                _ => Map::new(),
            },
        })
    }
}

/// Aggregate view over the cache for observability.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_entries: u64,
    pub total_hits: u64,
    pub tier_distribution: BTreeMap<LookupTier, u64>,
}

impl CacheStats {
    pub fn record(&mut self, tier: LookupTier, hit_count: i64) {
        self.total_entries += 1;
        self.total_hits += hit_count.max(0) as u64;
        *self.tier_distribution.entry(tier).or_insert(0) += 1;
    }
}
