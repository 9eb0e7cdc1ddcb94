use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// The directory's canonical company identifier.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CompanyId(pub i64);

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A company record as returned by the directory, either from a search hit
/// (id, name, website, score) or a full collect call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    pub id: CompanyId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub website: Option<String>,
    /// The directory's own relevance score for the query that produced this hit.
    #[serde(
        default,
        rename = "_score",
        alias = "score",
        deserialize_with = "null_as_default"
    )]
    pub relevance_score: f64,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub employee_count: Option<i64>,
    #[serde(default)]
    pub founded: Option<i32>,
    #[serde(default)]
    pub location: Option<String>,
}

/// Search engines send `null` scores for sorted results; treat `null` like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl DirectoryRecord {
    /// Auxiliary fields worth keeping alongside a cached resolution.
    pub fn metadata(&self) -> Map<String, Value> {
        let mut meta = Map::new();
        if !self.name.is_empty() {
            meta.insert("matched_name".to_string(), Value::from(self.name.clone()));
        }
        if let Some(website) = &self.website {
            meta.insert("website".to_string(), Value::from(website.clone()));
        }
        if let Some(industry) = &self.industry {
            meta.insert("industry".to_string(), Value::from(industry.clone()));
        }
        if let Some(count) = self.employee_count {
            meta.insert("employee_count".to_string(), Value::from(count));
            meta.insert(
                "employee_bucket".to_string(),
                Value::from(employee_bucket(count)),
            );
        }
        if let Some(founded) = self.founded {
            meta.insert("founded".to_string(), Value::from(founded));
        }
        if let Some(location) = &self.location {
            meta.insert("location".to_string(), Value::from(location.clone()));
        }
        meta
    }
}

/// Coarse head-count band used by downstream filters.
pub fn employee_bucket(count: i64) -> &'static str {
    match count {
        i64::MIN..=10 => "1-10",
        11..=50 => "11-50",
        51..=200 => "51-200",
        201..=500 => "201-500",
        501..=1000 => "501-1000",
        1001..=5000 => "1001-5000",
        5001..=10000 => "5001-10000",
        _ => "10001+",
    }
}

/// The strategy that produced a match, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Website,
    NameExact,
    Fuzzy,
    Fallback,
}

impl MatchTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchTier::Website => "website",
            MatchTier::NameExact => "name_exact",
            MatchTier::Fuzzy => "fuzzy",
            MatchTier::Fallback => "fallback",
        }
    }
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the tiered resolver produces for an accepted match.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub company_id: CompanyId,
    pub tier: MatchTier,
    pub confidence: f64,
    pub metadata: Map<String, Value>,
}

/// The uniform answer handed back to enrichment callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedCompany {
    pub company_id: CompanyId,
    pub confidence: f64,
    pub tier: MatchTier,
    pub from_cache: bool,
    pub metadata: Map<String, Value>,
}

impl ResolvedCompany {
    pub fn live(resolution: Resolution) -> Self {
        Self {
            company_id: resolution.company_id,
            confidence: resolution.confidence,
            tier: resolution.tier,
            from_cache: false,
            metadata: resolution.metadata,
        }
    }
}
