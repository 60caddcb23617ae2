//! Ranked free-text matching for the in-memory driver.
//!
//! Records are flattened into the text of their string fields (the id excluded), tokenized,
//! and scored with a small BM25 variant against the query.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

const K1: f32 = 1.2;
const B: f32 = 0.75;

/// Lowercase, split on non-alphanumeric characters, drop single-character tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.chars().count() >= 2)
        .map(String::from)
        .collect()
}

/// Query terms without repeats, in first-seen order.
pub fn tokenize_unique(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

pub(crate) fn searchable_text(record: &Value, id_field: &str) -> String {
    let mut parts = Vec::new();
    if let Value::Object(map) = record {
        for (key, value) in map {
            if key != id_field {
                collect_strings(value, &mut parts);
            }
        }
    }
    parts.join(" ")
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|item| collect_strings(item, out)),
        Value::Object(map) => map.values().for_each(|item| collect_strings(item, out)),
        _ => {}
    }
}

/// Indices of `docs` that match `query`, best first. `docs` must be in insertion order; equal
/// scores keep that order.
pub(crate) fn rank(docs: &[String], query: &str) -> Vec<usize> {
    let terms = tokenize_unique(query);
    if terms.is_empty() || docs.is_empty() {
        return Vec::new();
    }

    let tokenized: Vec<Vec<String>> = docs.iter().map(|doc| tokenize(doc)).collect();
    let total_docs = tokenized.len() as f32;
    let total_len: usize = tokenized.iter().map(Vec::len).sum();
    let avg_len = (total_len as f32 / total_docs).max(1.0);

    let mut doc_freqs: HashMap<&str, usize> = HashMap::new();
    for tokens in &tokenized {
        let unique: HashSet<&str> = tokens.iter().map(String::as_str).collect();
        for term in &terms {
            if unique.contains(term.as_str()) {
                *doc_freqs.entry(term.as_str()).or_default() += 1;
            }
        }
    }

    let mut scored: Vec<(usize, f32)> = tokenized
        .iter()
        .enumerate()
        .filter_map(|(index, tokens)| {
            let doc_len = tokens.len() as f32;
            let mut score = 0.0f32;
            for term in &terms {
                let tf = tokens.iter().filter(|t| *t == term).count() as f32;
                if tf == 0.0 {
                    continue;
                }
                let df = doc_freqs.get(term.as_str()).copied().unwrap_or(0) as f32;
                let idf = ((total_docs - df + 0.5) / (df + 0.5) + 1.0).ln();
                let norm = tf + K1 * (1.0 - B + B * doc_len / avg_len);
                score += idf * (tf * (K1 + 1.0)) / norm;
            }
            (score > 0.0).then_some((index, score))
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().map(|(index, _)| index).collect()
}
