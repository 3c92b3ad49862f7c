//! Score ranking and Mean Average Precision against ground truth.
//!
//! Scores arrive keyed by `(package_index, sequence_index, joined calls)`;
//! ground truth is the set of keys tagged anomalous in the input corpus.
//! MAP walks the score-descending ranking and averages the precision at each
//! correctly retrieved key.

use std::collections::{HashMap, HashSet};

use crate::corpus::{Corpus, Sequence};

/// Name tag marking a package as synthetic ground truth.
pub const ANOMALOUS_TAG: &str = "anomalous";

/// Stable key for one scored sequence: package index, sequence index, and the
/// concatenated call names (which disambiguates reordered corpora).
pub fn sequence_key(package_index: usize, sequence_index: usize, sequence: &Sequence) -> String {
    let calls: String = sequence.call_events().map(|e| e.call.as_str()).collect();
    format!("{}_{}_{}", package_index, sequence_index, calls)
}

/// Ground-truth keys: for each package tagged [`ANOMALOUS_TAG`], the key of
/// its final sequence (the seeded anomaly is appended last by convention).
pub fn anomalous_keys(corpus: &Corpus) -> HashSet<String> {
    let mut keys = HashSet::new();
    for (k, package) in corpus.packages.iter().enumerate() {
        if package.name != ANOMALOUS_TAG {
            continue;
        }
        if let Some(j) = package.sequences.len().checked_sub(1) {
            keys.insert(sequence_key(k, j, &package.sequences[j]));
        }
    }
    keys
}

/// Rank scores descending. Ties are broken by key so the ranking is
/// deterministic across runs and hash-map iteration orders.
pub fn rank_descending(scores: &HashMap<String, f64>) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = scores
        .iter()
        .map(|(k, &v)| (k.clone(), v))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

/// Mean Average Precision of `scores` against `anomalous`.
///
/// Positions are 0-based in the score-descending ranking; the precision at
/// the `i`-th correctly retrieved key (rank `r`) is `(i + 1) / (r + 1)`, and
/// MAP is the mean over all ground-truth keys. Returns `None` when the
/// ground-truth set is empty or contains a key absent from the scored set,
/// rather than reporting a misleading number.
pub fn mean_average_precision(
    scores: &HashMap<String, f64>,
    anomalous: &HashSet<String>,
) -> Option<f64> {
    if anomalous.is_empty() || anomalous.iter().any(|k| !scores.contains_key(k)) {
        return None;
    }
    let ranked = rank_descending(scores);
    let mut hits = 0usize;
    let mut total = 0.0;
    for (rank, (key, _)) in ranked.iter().enumerate() {
        if anomalous.contains(key) {
            hits += 1;
            total += hits as f64 / (rank + 1) as f64;
        }
    }
    Some(total / anomalous.len() as f64)
}
