//! String similarity and candidate confidence.
//!
//! The `[0.8, 1.0]` band is reserved for exact and substring matches; plain edit
//! distance similarity is capped at [`EDIT_DISTANCE_CAP`].

/// Score for one name fully containing the other.
pub const SUBSTRING_SCORE: f64 = 0.9;
/// Upper bound for edit-distance-only similarity.
pub const EDIT_DISTANCE_CAP: f64 = 0.8;

const NAME_WEIGHT: f64 = 0.7;
const RELEVANCE_WEIGHT: f64 = 0.3;
/// Directory relevance scores at or above this saturate the relevance component.
const RELEVANCE_SCALE: f64 = 10.0;

/// Similarity in `0.0..=1.0` between two pre-lowercased strings.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    if !a.is_empty() && !b.is_empty() && (a.contains(b) || b.contains(a)) {
        return SUBSTRING_SCORE;
    }

    let longest = a.chars().count().max(b.chars().count());
    let distance = strsim::levenshtein(a, b);
    let ratio = 1.0 - distance as f64 / longest as f64;
    ratio.clamp(0.0, EDIT_DISTANCE_CAP)
}

/// Confidence that a directory hit named `candidate_name` is the queried company.
///
/// `0.7 * similarity + 0.3 * min(relevance / 10, 1)`, rounded to two decimals.
pub fn combined_confidence(query: &str, candidate_name: &str, relevance_score: f64) -> f64 {
    let name_score = similarity(query, candidate_name);
    let relevance = (relevance_score.max(0.0) / RELEVANCE_SCALE).min(1.0);
    round2(name_score * NAME_WEIGHT + relevance * RELEVANCE_WEIGHT)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
