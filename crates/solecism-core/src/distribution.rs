//! Vocabulary-indexed probability rows.
//!
//! One predictor query produces one [`ProbabilityRow`]: a probability per
//! vocabulary term, summing to ≈1 over the query's domain (the call
//! vocabulary, or the state values of one slot). Rows are transient: the
//! query cache produces them, the aggregator consumes them.

use std::sync::Arc;

use rand::Rng;

use crate::vocab::{TokenId, Vocabulary};

/// A probability distribution over the vocabulary, produced by one predictor
/// query.
#[derive(Debug, Clone)]
pub struct ProbabilityRow {
    vocab: Arc<Vocabulary>,
    probs: Vec<f64>,
}

impl ProbabilityRow {
    /// Build a row from per-id probabilities. `probs` must have one entry per
    /// vocabulary term.
    ///
    /// # Panics
    ///
    /// Panics if `probs.len() != vocab.len()`.
    pub fn new(vocab: Arc<Vocabulary>, probs: Vec<f64>) -> Self {
        assert_eq!(
            probs.len(),
            vocab.len(),
            "probability row length must match vocabulary size"
        );
        Self { vocab, probs }
    }

    /// The vocabulary this row is indexed by.
    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.vocab
    }

    /// Probability of a token id.
    #[inline]
    pub fn prob(&self, id: TokenId) -> f64 {
        self.probs[id.index()]
    }

    /// Probability of a term, or `None` if the term is not in the vocabulary.
    pub fn prob_of(&self, term: &str) -> Option<f64> {
        self.vocab.id(term).map(|id| self.prob(id))
    }

    /// Sum of all probabilities (≈1 for a well-formed row).
    pub fn total(&self) -> f64 {
        self.probs.iter().sum()
    }

    /// Iterate `(id, probability)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (TokenId, f64)> + '_ {
        self.probs
            .iter()
            .enumerate()
            .map(|(i, &p)| (TokenId(i as u32), p))
    }

    /// The id with the highest probability. `None` for an empty vocabulary.
    pub fn argmax(&self) -> Option<TokenId> {
        self.probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| TokenId(i as u32))
    }

    /// Draw a token from the distribution by inverse-CDF over the cumulative
    /// scan. Falls back to the last positive entry if rounding leaves the
    /// roll above the total.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Option<TokenId> {
        let total = self.total();
        if total <= 0.0 {
            return None;
        }
        let roll: f64 = rng.random::<f64>() * total;
        let mut acc = 0.0;
        let mut last_positive = None;
        for (i, &p) in self.probs.iter().enumerate() {
            if p > 0.0 {
                last_positive = Some(TokenId(i as u32));
            }
            acc += p;
            if acc >= roll {
                return Some(TokenId(i as u32));
            }
        }
        last_positive
    }
}
