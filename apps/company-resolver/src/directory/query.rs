//! Search bodies for the directory's boolean query endpoint.

use serde_json::{json, Value};

/// `must` exact-term clause on the website field.
pub fn website_query(website_key: &str) -> Value {
    json!({
        "query": {
            "bool": {
                "must": [
                    { "term": { "website.domain_only": website_key } }
                ]
            }
        }
    })
}

/// Disjunction of exact, wildcard and tokenized clauses on the name field.
pub fn name_query(name: &str, limit: usize) -> Value {
    let name = name.trim();
    json!({
        "size": limit,
        "query": {
            "bool": {
                "should": [
                    { "term": { "name.exact": name } },
                    {
                        "wildcard": {
                            "name.exact": {
                                "value": wildcard_pattern(name),
                                "case_insensitive": true
                            }
                        }
                    },
                    { "match": { "name": { "query": name, "operator": "and" } } }
                ],
                "minimum_should_match": 1
            }
        }
    })
}

/// Tokenized match against the secondary index.
pub fn fallback_query(normalized_name: &str) -> Value {
    json!({
        "size": 1,
        "query": {
            "match": { "name": { "query": normalized_name } }
        }
    })
}

/// `"acme  corp"` -> `"*acme*corp*"`.
fn wildcard_pattern(name: &str) -> String {
    let inner = name.split_whitespace().collect::<Vec<_>>().join("*");
    format!("*{inner}*")
}
