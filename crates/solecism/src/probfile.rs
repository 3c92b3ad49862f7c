//! Raw-probability files and forward/backward combination.
//!
//! A probability file maps `unit → sequence → {position: value}` where
//! positions are stringified integers. Call-level files carry one probability
//! per call position; state-level files carry, per call position, a map of
//! state tokens (`"{slot}#{value}"`) to probabilities.
//!
//! When both a forward-trained and a reverse-trained model produced files,
//! the per-position vectors are combined by elementwise product after the
//! backward vector is re-indexed into forward order. The product rule is
//! fixed; switching to a min combination would change rankings materially.
//! The first entry of every call vector is dropped before aggregation (it
//! scores the unconditioned start symbol, which carries no anomaly signal).

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use solecism_core::aggregate::Metric;
use solecism_core::constants::{DEFAULT_PROB_FLOOR, STOP};
use solecism_core::corpus::Corpus;
use thiserror::Error;

/// Call-level file: `unit → sequence → {position: probability}`.
pub type CallProbFile = BTreeMap<String, BTreeMap<String, BTreeMap<String, f64>>>;

/// State-level file: `unit → sequence → {position: {state token: probability}}`.
pub type StateProbFile =
    BTreeMap<String, BTreeMap<String, BTreeMap<String, BTreeMap<String, f64>>>>;

/// Errors from probability-file parsing and combination.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Underlying I/O failure.
    #[error("probability file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Not valid JSON in the expected shape.
    #[error("probability file JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Forward and backward files do not cover the same sequence keys.
    #[error("incompatible datasets: forward and backward keys differ")]
    IncompatibleDatasets,

    /// A position or state key is not indexable.
    #[error("bad index key {key:?} in probability file")]
    BadIndex {
        /// The offending key.
        key: String,
    },
}

fn read_json<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> Result<T, ReportError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Load a call-level probability file.
pub fn load_call_probs<P: AsRef<Path>>(path: P) -> Result<CallProbFile, ReportError> {
    read_json(path)
}

/// Load a state-level probability file.
pub fn load_state_probs<P: AsRef<Path>>(path: P) -> Result<StateProbFile, ReportError> {
    read_json(path)
}

/// Parse a call-level file from a reader.
pub fn call_probs_from_reader<R: Read>(reader: R) -> Result<CallProbFile, ReportError> {
    Ok(serde_json::from_reader(reader)?)
}

/// Order a `{position: value}` map into a dense vector.
fn ordered_vector<T: Clone>(entries: &BTreeMap<String, T>, fill: T) -> Result<Vec<T>, ReportError> {
    let mut out = vec![fill; entries.len()];
    for (key, value) in entries {
        let index: usize = key.parse().map_err(|_| ReportError::BadIndex {
            key: key.clone(),
        })?;
        if index >= out.len() {
            return Err(ReportError::BadIndex { key: key.clone() });
        }
        out[index] = value.clone();
    }
    Ok(out)
}

/// Slot index of a `"{slot}#{value}"` state token.
fn state_slot(token: &str) -> Result<usize, ReportError> {
    token
        .split('#')
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ReportError::BadIndex {
            key: token.to_string(),
        })
}

/// Per-sequence probability vectors plus the event token labels aligned with
/// them (labels are only populated for state-level data).
#[derive(Debug, Default)]
pub struct ProbVectors {
    /// Sequence key → per-position probabilities.
    pub probs: BTreeMap<String, Vec<f64>>,
    /// Sequence key → per-position event labels.
    pub events: BTreeMap<String, Vec<String>>,
}

/// Extract call vectors, keyed `"{unit}--{sequence}"`, dropping the first
/// entry of each. With a backward file, its vectors are index-reversed,
/// first-dropped, and combined with the forward ones by product.
pub fn call_vectors(
    forward: &CallProbFile,
    backward: Option<&CallProbFile>,
) -> Result<ProbVectors, ReportError> {
    let mut result = ProbVectors::default();
    for (unit, sequences) in forward {
        for (seq, entries) in sequences {
            let vector = ordered_vector(entries, 0.0)?;
            let key = format!("{}--{}", unit, seq);
            result.events.insert(key.clone(), Vec::new());
            result.probs.insert(key, vector.into_iter().skip(1).collect());
        }
    }

    if let Some(backward) = backward {
        let mut reverse: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for (unit, sequences) in backward {
            for (seq, entries) in sequences {
                let mut vector = ordered_vector(entries, 0.0)?;
                vector.reverse();
                reverse.insert(
                    format!("{}--{}", unit, seq),
                    vector.into_iter().skip(1).collect(),
                );
            }
        }
        combine_product(&mut result.probs, &reverse)?;
    }
    Ok(result)
}

/// Extract state vectors, keyed `"{unit}--{sequence}--{call position}"`, the
/// vector indexed by state slot. A backward file has its call positions
/// reversed (position `i` of a length-`n` sequence maps to `n−1−i`) and each
/// state vector reversed before the product combination.
pub fn state_vectors(
    forward: &StateProbFile,
    backward: Option<&StateProbFile>,
) -> Result<ProbVectors, ReportError> {
    let mut result = ProbVectors::default();
    for (unit, sequences) in forward {
        for (seq, positions) in sequences {
            for (pos, state_data) in positions {
                let key = format!("{}--{}--{}", unit, seq, pos);
                let mut probs = vec![0.0; state_data.len()];
                let mut events = vec![String::new(); state_data.len()];
                for (token, &value) in state_data {
                    let slot = state_slot(token)?;
                    if slot >= probs.len() {
                        return Err(ReportError::BadIndex { key: token.clone() });
                    }
                    probs[slot] = value;
                    events[slot] = token.clone();
                }
                result.probs.insert(key.clone(), probs);
                result.events.insert(key, events);
            }
        }
    }

    if let Some(backward) = backward {
        let mut reverse: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for (unit, sequences) in backward {
            for (seq, positions) in sequences {
                let ordered = ordered_vector(positions, BTreeMap::new())?;
                let len = ordered.len();
                for (i, state_data) in ordered.iter().enumerate() {
                    let key = format!("{}--{}--{}", unit, seq, len - 1 - i);
                    let mut probs = vec![0.0; state_data.len()];
                    for (token, &value) in state_data {
                        let slot = state_slot(token)?;
                        if slot >= probs.len() {
                            return Err(ReportError::BadIndex { key: token.clone() });
                        }
                        probs[slot] = value;
                    }
                    probs.reverse();
                    reverse.insert(key, probs);
                }
            }
        }
        combine_product(&mut result.probs, &reverse)?;
    }
    Ok(result)
}

fn combine_product(
    forward: &mut BTreeMap<String, Vec<f64>>,
    backward: &BTreeMap<String, Vec<f64>>,
) -> Result<(), ReportError> {
    if forward.len() != backward.len() || forward.keys().any(|k| !backward.contains_key(k)) {
        return Err(ReportError::IncompatibleDatasets);
    }
    for (key, probs) in forward.iter_mut() {
        let reverse = &backward[key];
        for (p, &r) in probs.iter_mut().zip(reverse) {
            *p *= r;
        }
    }
    Ok(())
}

/// One aggregated report row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecord {
    /// The aggregated metric score.
    #[serde(rename = "Anomaly Score")]
    pub anomaly_score: f64,
    /// Positions achieving the extremal value (empty for sum metrics).
    #[serde(rename = "Index List")]
    pub index_list: Vec<usize>,
    /// Event labels aligned with the probability vector.
    #[serde(rename = "Events")]
    pub events: Vec<String>,
    /// The combined per-position probabilities the metric was applied to.
    #[serde(rename = "Probability")]
    pub probability: Vec<f64>,
    /// Source locations aligned with the events, when a corpus was supplied.
    #[serde(rename = "Location", default)]
    pub locations: Vec<String>,
}

/// Apply a metric to every sequence vector, producing report rows keyed by
/// sequence key.
pub fn apply_metric(vectors: &ProbVectors, metric: Metric) -> BTreeMap<String, ScoredRecord> {
    let mut out = BTreeMap::new();
    for (key, probs) in &vectors.probs {
        let score = metric.apply(probs, DEFAULT_PROB_FLOOR);
        out.insert(
            key.clone(),
            ScoredRecord {
                anomaly_score: score.score,
                index_list: score.indices,
                events: vectors.events.get(key).cloned().unwrap_or_default(),
                probability: probs.clone(),
                locations: Vec::new(),
            },
        );
    }
    out
}

/// Attach call names and locations from the originating corpus to call-level
/// rows (keyed `"{package}--{sequence}"`). The terminal STOP is appended with
/// the last call's location.
pub fn annotate_call_rows(records: &mut BTreeMap<String, ScoredRecord>, corpus: &Corpus) {
    for (k, package) in corpus.packages.iter().enumerate() {
        for (j, sequence) in package.sequences.iter().enumerate() {
            let key = format!("{}--{}", k, j);
            let Some(record) = records.get_mut(&key) else {
                continue;
            };
            let mut calls: Vec<String> =
                sequence.call_events().map(|e| e.call.clone()).collect();
            let mut locations: Vec<String> =
                sequence.call_events().map(|e| e.location.clone()).collect();
            if let Some(last) = locations.last().cloned() {
                calls.push(STOP.to_string());
                locations.push(last);
            }
            record.events = calls;
            record.locations = locations;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_file(entries: &[(&str, &str, &[f64])]) -> CallProbFile {
        let mut file = CallProbFile::new();
        for (unit, seq, probs) in entries {
            let positions: BTreeMap<String, f64> = probs
                .iter()
                .enumerate()
                .map(|(i, &p)| (i.to_string(), p))
                .collect();
            file.entry(unit.to_string())
                .or_default()
                .insert(seq.to_string(), positions);
        }
        file
    }

    #[test]
    fn test_call_vectors_skip_first() {
        let forward = call_file(&[("0", "0", &[0.9, 0.5, 0.7])]);
        let vectors = call_vectors(&forward, None).unwrap();
        assert_eq!(vectors.probs["0--0"], vec![0.5, 0.7]);
    }

    #[test]
    fn test_backward_reversed_and_combined() {
        let forward = call_file(&[("0", "0", &[0.9, 0.5, 0.7])]);
        // Backward order c,b,a: reversing gives [0.2, 0.4, 0.8]; the first
        // entry is then dropped, aligning [0.4, 0.8] with the forward tail.
        let backward = call_file(&[("0", "0", &[0.8, 0.4, 0.2])]);
        let vectors = call_vectors(&forward, Some(&backward)).unwrap();
        let combined = &vectors.probs["0--0"];
        assert!((combined[0] - 0.5 * 0.4).abs() < 1e-12);
        assert!((combined[1] - 0.7 * 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_mismatched_keys_rejected() {
        let forward = call_file(&[("0", "0", &[0.9, 0.5])]);
        let backward = call_file(&[("0", "1", &[0.5, 0.9])]);
        let err = call_vectors(&forward, Some(&backward)).unwrap_err();
        assert!(matches!(err, ReportError::IncompatibleDatasets));
    }

    #[test]
    fn test_bad_position_key() {
        let mut forward = CallProbFile::new();
        let mut positions = BTreeMap::new();
        positions.insert("zero".to_string(), 0.5);
        forward
            .entry("0".to_string())
            .or_default()
            .insert("0".to_string(), positions);
        let err = call_vectors(&forward, None).unwrap_err();
        assert!(matches!(err, ReportError::BadIndex { .. }));
    }

    fn state_file(positions: &[&[(&str, f64)]]) -> StateProbFile {
        let mut file = StateProbFile::new();
        let seq: BTreeMap<String, BTreeMap<String, f64>> = positions
            .iter()
            .enumerate()
            .map(|(i, states)| {
                (
                    i.to_string(),
                    states
                        .iter()
                        .map(|(t, p)| (t.to_string(), *p))
                        .collect(),
                )
            })
            .collect();
        file.entry("0".to_string())
            .or_default()
            .insert("0".to_string(), seq);
        file
    }

    #[test]
    fn test_state_vectors_indexed_by_slot() {
        let forward = state_file(&[&[("1#5", 0.3), ("0#2", 0.6)]]);
        let vectors = state_vectors(&forward, None).unwrap();
        assert_eq!(vectors.probs["0--0--0"], vec![0.6, 0.3]);
        assert_eq!(
            vectors.events["0--0--0"],
            vec!["0#2".to_string(), "1#5".to_string()]
        );
    }

    #[test]
    fn test_state_backward_position_reversal() {
        let forward = state_file(&[&[("0#1", 0.5)], &[("0#2", 0.7)]]);
        // Backward call positions are reversed: its position 0 corresponds
        // to forward position 1.
        let backward = state_file(&[&[("0#2", 0.5)], &[("0#1", 0.2)]]);
        let vectors = state_vectors(&forward, Some(&backward)).unwrap();
        assert!((vectors.probs["0--0--0"][0] - 0.5 * 0.2).abs() < 1e-12);
        assert!((vectors.probs["0--0--1"][0] - 0.7 * 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_annotate_call_rows_appends_stop_location() {
        use solecism_core::corpus::{CallEvent, Corpus, Event, Package, Sequence};

        let forward = call_file(&[("0", "0", &[0.9, 0.5, 0.7])]);
        let vectors = call_vectors(&forward, None).unwrap();
        let mut records = apply_metric(&vectors, Metric::MinRaw);

        let corpus = Corpus {
            packages: vec![Package {
                name: "p".to_string(),
                sequences: vec![Sequence::new(vec![
                    Event::Call(CallEvent {
                        call: "open".to_string(),
                        states: Vec::new(),
                        location: "a.c:1".to_string(),
                    }),
                    Event::Call(CallEvent {
                        call: "close".to_string(),
                        states: Vec::new(),
                        location: "a.c:9".to_string(),
                    }),
                ])],
                topic: None,
            }],
        };
        annotate_call_rows(&mut records, &corpus);

        let record = &records["0--0"];
        assert_eq!(record.events, vec!["open", "close", "STOP"]);
        // The terminal STOP inherits the last call's location.
        assert_eq!(record.locations, vec!["a.c:1", "a.c:9", "a.c:9"]);
    }

    #[test]
    fn test_annotate_call_rows_skips_unscored_sequences() {
        use solecism_core::corpus::{CallEvent, Corpus, Event, Package, Sequence};

        let forward = call_file(&[("0", "0", &[0.9, 0.5])]);
        let vectors = call_vectors(&forward, None).unwrap();
        let mut records = apply_metric(&vectors, Metric::SumRaw);

        // A second sequence with no matching record must be ignored.
        let sequence = |loc: &str| {
            Sequence::new(vec![Event::Call(CallEvent {
                call: "open".to_string(),
                states: Vec::new(),
                location: loc.to_string(),
            })])
        };
        let corpus = Corpus {
            packages: vec![Package {
                name: "p".to_string(),
                sequences: vec![sequence("a.c:1"), sequence("b.c:2")],
                topic: None,
            }],
        };
        annotate_call_rows(&mut records, &corpus);

        assert_eq!(records.len(), 1);
        assert_eq!(records["0--0"].locations, vec!["a.c:1", "a.c:1"]);
    }

    #[test]
    fn test_apply_metric_produces_records() {
        let forward = call_file(&[("0", "0", &[0.9, 0.5, 0.1])]);
        let vectors = call_vectors(&forward, None).unwrap();
        let records = apply_metric(&vectors, Metric::MinRaw);
        let record = &records["0--0"];
        assert_eq!(record.anomaly_score, 0.1);
        assert_eq!(record.index_list, vec![1]);
        assert_eq!(record.probability, vec![0.5, 0.1]);
    }
}
