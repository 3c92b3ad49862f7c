//! Probability-stream reduction: log-likelihoods and the metric table.
//!
//! These are pure reductions over predictor-derived probability vectors. The
//! only stateful collaborator is the [`QueryCache`], which keeps the walk
//! incremental.
//!
//! Probabilities of exactly zero are clamped to a caller-supplied floor
//! before `ln` (default [`crate::constants::DEFAULT_PROB_FLOOR`]); see
//! DESIGN.md for why the floor exists.

use serde::{Deserialize, Serialize};

use crate::cache::QueryCache;
use crate::constants::STOP;
use crate::corpus::CallEvent;
use crate::math::ln_floored;
use crate::predictor::{LatentSpec, QueryError, SequencePredictor};

fn prob_of_term(
    row: &crate::distribution::ProbabilityRow,
    term: &str,
) -> Result<f64, QueryError> {
    row.prob_of(term).ok_or_else(|| QueryError::UnknownToken {
        term: term.to_string(),
    })
}

/// Per-position probability of each actual next call, including the terminal
/// STOP. Position `i`'s entry is `P(events[i].call | events[..i])`; the last
/// entry is `P(STOP | events)`.
pub fn call_probabilities<P: SequencePredictor>(
    predictor: &P,
    cache: &mut QueryCache,
    spec: &LatentSpec,
    events: &[CallEvent],
) -> Result<Vec<f64>, QueryError> {
    let mut probs = Vec::with_capacity(events.len() + 1);
    for i in 0..=events.len() {
        let row = cache.next_call(predictor, spec, &events[..i])?;
        let term = events.get(i).map(|e| e.call.as_str()).unwrap_or(STOP);
        probs.push(prob_of_term(&row, term)?);
    }
    Ok(probs)
}

/// Log-likelihood of the call-only projection of a sequence (states are
/// ignored), including the terminal STOP factor.
pub fn call_log_likelihood<P: SequencePredictor>(
    predictor: &P,
    cache: &mut QueryCache,
    spec: &LatentSpec,
    events: &[CallEvent],
    prob_floor: f64,
) -> Result<f64, QueryError> {
    let probs = call_probabilities(predictor, cache, spec, events)?;
    Ok(probs.iter().map(|&p| ln_floored(p, prob_floor)).sum())
}

/// Full log-likelihood of a sequence: for each call, the call factor, one
/// factor per state slot, and the STOP factor closing the slots; plus the
/// terminal STOP factor over the call vocabulary.
pub fn sequence_log_likelihood<P: SequencePredictor>(
    predictor: &P,
    cache: &mut QueryCache,
    spec: &LatentSpec,
    events: &[CallEvent],
    prob_floor: f64,
) -> Result<f64, QueryError> {
    let mut llh = 0.0;
    for i in 0..=events.len() {
        let row = cache.next_call(predictor, spec, &events[..i])?;
        let term = events.get(i).map(|e| e.call.as_str()).unwrap_or(STOP);
        llh += ln_floored(prob_of_term(&row, term)?, prob_floor);

        if let Some(event) = events.get(i) {
            let prefix = &events[..=i];
            for (slot, value) in event.states.iter().enumerate() {
                let state_row = cache.next_state(predictor, spec, prefix, slot)?;
                let state_term = format!("{}#{}", slot, value);
                llh += ln_floored(prob_of_term(&state_row, &state_term)?, prob_floor);
            }
            // The model closes each call's state slots with STOP.
            let closing = cache.next_state(predictor, spec, prefix, event.states.len())?;
            llh += ln_floored(prob_of_term(&closing, STOP)?, prob_floor);
        }
    }
    Ok(llh)
}

/// Reduction applied to a per-position probability vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Sum of raw probabilities.
    SumRaw,
    /// Minimum raw probability, with all tied positions.
    MinRaw,
    /// Negative sum of log probabilities.
    SumLlh,
    /// Negative minimum log probability, with all tied positions.
    MinLlh,
}

impl Metric {
    /// Parse a metric name (`sum_raw`, `min_raw`, `sum_llh`, `min_llh`).
    pub fn from_name(name: &str) -> Option<Metric> {
        match name {
            "sum_raw" => Some(Metric::SumRaw),
            "min_raw" => Some(Metric::MinRaw),
            "sum_llh" => Some(Metric::SumLlh),
            "min_llh" => Some(Metric::MinLlh),
            _ => None,
        }
    }

    /// The canonical name of this metric.
    pub fn name(&self) -> &'static str {
        match self {
            Metric::SumRaw => "sum_raw",
            Metric::MinRaw => "min_raw",
            Metric::SumLlh => "sum_llh",
            Metric::MinLlh => "min_llh",
        }
    }

    /// Apply the reduction. The index list holds every position achieving
    /// the extremal value for the min variants, and is empty for the sums.
    pub fn apply(&self, probs: &[f64], prob_floor: f64) -> MetricScore {
        match self {
            Metric::SumRaw => MetricScore {
                score: probs.iter().sum(),
                indices: Vec::new(),
            },
            Metric::MinRaw => {
                let (indices, min) = extremal_min(probs);
                MetricScore { score: min, indices }
            }
            Metric::SumLlh => MetricScore {
                score: -probs.iter().map(|&p| ln_floored(p, prob_floor)).sum::<f64>(),
                indices: Vec::new(),
            },
            Metric::MinLlh => {
                let logs: Vec<f64> = probs.iter().map(|&p| ln_floored(p, prob_floor)).collect();
                let (indices, min) = extremal_min(&logs);
                MetricScore {
                    score: -min,
                    indices,
                }
            }
        }
    }
}

/// A metric's scalar score plus the positions achieving the extremal value
/// (which token was anomalous).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricScore {
    /// The reduced score.
    pub score: f64,
    /// Tie-preserving extremal positions (empty for sum metrics).
    pub indices: Vec<usize>,
}

fn extremal_min(values: &[f64]) -> (Vec<usize>, f64) {
    let Some(min) = values.iter().copied().min_by(f64::total_cmp) else {
        return (Vec::new(), 0.0);
    };
    let indices = values
        .iter()
        .enumerate()
        .filter(|(_, &v)| v == min)
        .map(|(i, _)| i)
        .collect();
    (indices, min)
}
