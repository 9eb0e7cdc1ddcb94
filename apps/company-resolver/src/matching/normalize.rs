//! Canonical forms used as cache keys.

/// Legal-entity suffixes dropped from the end of a company name.
const LEGAL_SUFFIXES: &[&str] = &[
    "inc",
    "incorporated",
    "llc",
    "ltd",
    "limited",
    "corp",
    "corporation",
    "co",
    "company",
    "gmbh",
    "ag",
    "pte",
    "pty",
];

/// Canonicalizes a company name for use as a cache key.
///
/// Lowercases, removes punctuation other than hyphens, collapses whitespace and
/// strips trailing legal suffixes ("Acme Co. Ltd." -> "acme"). A name that is
/// nothing but a suffix is kept as-is. Empty output means unresolvable.
pub fn normalize_name(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-')
        .collect();

    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    while tokens.len() > 1 && tokens.last().is_some_and(|t| LEGAL_SUFFIXES.contains(t)) {
        tokens.pop();
    }
    tokens.join(" ")
}

/// Canonical website key: lowercase, no scheme, no `www.`, no trailing slash.
/// Returns `None` when nothing is left.
pub fn normalize_website(website: &str) -> Option<String> {
    let lowered = website.trim().to_lowercase();
    let without_scheme = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"))
        .unwrap_or(&lowered);
    let without_www = without_scheme
        .strip_prefix("www.")
        .unwrap_or(without_scheme);
    let key = without_www.trim_end_matches('/');

    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}
