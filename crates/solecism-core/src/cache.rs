//! Prefix-trie memoization of predictor queries.
//!
//! Predictor queries dominate runtime, and sequences within a package share
//! long prefixes. The cache stores one trie per `(psi)` session, keyed by
//! token edges (call names, then state tokens under the final call), so two
//! sequences sharing a prefix of length L reuse the first L rows. The cache
//! is an explicit owned object scoped to one session, not a process-wide
//! singleton; when packages are processed in parallel, each package task
//! owns an independent cache.

use std::collections::HashMap;

use rand::Rng;

use crate::corpus::CallEvent;
use crate::distribution::ProbabilityRow;
use crate::predictor::{LatentSpec, QueryError, SequencePredictor};

#[derive(Debug, Default)]
struct Node {
    /// Distribution over the next call, given the call path to this node.
    call_row: Option<ProbabilityRow>,
    /// Distribution over the next state slot, given the call path plus the
    /// state edges walked under the final call.
    state_row: Option<ProbabilityRow>,
    children: HashMap<String, Node>,
}

impl Node {
    fn child(&mut self, edge: &str) -> &mut Node {
        self.children.entry(edge.to_string()).or_default()
    }
}

/// Session-scoped memo of predictor responses.
///
/// Querying the same `(psi, prefix)` twice returns bit-identical rows and
/// does not re-invoke the predictor; the `misses` counter makes that
/// observable in tests.
#[derive(Debug, Default)]
pub struct QueryCache {
    root: Node,
    lookups: u64,
    misses: u64,
}

impl QueryCache {
    /// Create an empty cache for one predictor session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total queries answered (hits + misses).
    pub fn lookups(&self) -> u64 {
        self.lookups
    }

    /// Queries that had to invoke the underlying predictor.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Memoized [`SequencePredictor::next_call`].
    pub fn next_call<P: SequencePredictor>(
        &mut self,
        predictor: &P,
        spec: &LatentSpec,
        prefix: &[CallEvent],
    ) -> Result<ProbabilityRow, QueryError> {
        self.lookups += 1;
        let mut node = &mut self.root;
        for event in prefix {
            node = node.child(&event.call);
        }
        if node.call_row.is_none() {
            self.misses += 1;
            node.call_row = Some(predictor.next_call(spec, prefix)?);
        }
        Ok(node.call_row.as_ref().cloned().unwrap())
    }

    /// Memoized [`SequencePredictor::next_state`] for slot `slot` of the last
    /// call in `prefix`.
    pub fn next_state<P: SequencePredictor>(
        &mut self,
        predictor: &P,
        spec: &LatentSpec,
        prefix: &[CallEvent],
        slot: usize,
    ) -> Result<ProbabilityRow, QueryError> {
        let last = prefix.last().ok_or(QueryError::EmptySequence)?;
        self.lookups += 1;
        let mut node = &mut self.root;
        for event in prefix {
            node = node.child(&event.call);
        }
        // Descend the state edges already fixed for this call.
        for (s, value) in last.states.iter().take(slot).enumerate() {
            node = node.child(&format!("{}#{}", s, value));
        }
        if node.state_row.is_none() {
            self.misses += 1;
            node.state_row = Some(predictor.next_state(spec, prefix, slot)?);
        }
        Ok(node.state_row.as_ref().cloned().unwrap())
    }

    /// Lazily iterate call distributions for every position of `events`,
    /// positions `0..=len` inclusive; the final row is the distribution the
    /// STOP marker is scored against.
    pub fn call_distributions<'a, P: SequencePredictor>(
        &'a mut self,
        predictor: &'a P,
        spec: &'a LatentSpec,
        events: &'a [CallEvent],
    ) -> CallDistributions<'a, P> {
        CallDistributions {
            cache: self,
            predictor,
            spec,
            events,
            position: 0,
        }
    }

    /// Draw the next call token from the model. A state-shaped prediction is
    /// a vocabulary mismatch and fails with [`QueryError::PredictionShape`].
    pub fn sample_next_call<P: SequencePredictor, R: Rng>(
        &mut self,
        predictor: &P,
        spec: &LatentSpec,
        prefix: &[CallEvent],
        rng: &mut R,
    ) -> Result<String, QueryError> {
        let row = self.next_call(predictor, spec, prefix)?;
        let vocab = row.vocabulary().clone();
        let id = row.sample(rng).ok_or(QueryError::PredictionShape {
            expected: "call",
            got: "<empty distribution>".to_string(),
        })?;
        if !vocab.kind(id).is_call_like() {
            return Err(QueryError::PredictionShape {
                expected: "call",
                got: vocab.term(id).to_string(),
            });
        }
        Ok(vocab.term(id).to_string())
    }

    /// Draw the next state token for slot `slot` of the last call in
    /// `prefix`. A call-shaped prediction fails with
    /// [`QueryError::PredictionShape`].
    pub fn sample_next_state<P: SequencePredictor, R: Rng>(
        &mut self,
        predictor: &P,
        spec: &LatentSpec,
        prefix: &[CallEvent],
        slot: usize,
        rng: &mut R,
    ) -> Result<String, QueryError> {
        let row = self.next_state(predictor, spec, prefix, slot)?;
        let vocab = row.vocabulary().clone();
        let id = row.sample(rng).ok_or(QueryError::PredictionShape {
            expected: "state",
            got: "<empty distribution>".to_string(),
        })?;
        if !vocab.kind(id).is_state_like() {
            return Err(QueryError::PredictionShape {
                expected: "state",
                got: vocab.term(id).to_string(),
            });
        }
        Ok(vocab.term(id).to_string())
    }
}

/// Iterator over `(position, row)` produced by
/// [`QueryCache::call_distributions`]. Extends the cached prefix one token at
/// a time rather than recomputing each position from scratch.
pub struct CallDistributions<'a, P: SequencePredictor> {
    cache: &'a mut QueryCache,
    predictor: &'a P,
    spec: &'a LatentSpec,
    events: &'a [CallEvent],
    position: usize,
}

impl<'a, P: SequencePredictor> Iterator for CallDistributions<'a, P> {
    type Item = Result<(usize, ProbabilityRow), QueryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position > self.events.len() {
            return None;
        }
        let pos = self.position;
        self.position += 1;
        let row = self
            .cache
            .next_call(self.predictor, self.spec, &self.events[..pos]);
        Some(row.map(|r| (pos, r)))
    }
}
