//! Token vocabulary: term string ↔ dense id, with one-time classification.
//!
//! The trained model's alphabet mixes call identifiers, `"{slot}#{value}"`
//! state tokens, and the START/STOP markers. Downstream code never re-parses
//! those strings; each term is classified once when it enters the vocabulary
//! and the structured form is looked up by id.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constants::{START, STOP};

/// Dense token id into a [`Vocabulary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId(pub u32);

impl TokenId {
    /// The id as a usize index.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Structured classification of a vocabulary term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A call identifier.
    Call,
    /// A state observation `{slot}#{value}`.
    State {
        /// Zero-based state slot index.
        slot: usize,
        /// Discretized observation value.
        value: i64,
    },
    /// The START or STOP marker.
    Marker,
}

impl TokenKind {
    /// Classify a raw term. `"{slot}#{value}"` terms (both halves integers)
    /// are state tokens; START/STOP are markers; everything else is a call.
    pub fn classify(term: &str) -> TokenKind {
        if term == START || term == STOP {
            return TokenKind::Marker;
        }
        if let Some((slot, value)) = term.split_once('#') {
            if let (Ok(slot), Ok(value)) = (slot.parse::<usize>(), value.parse::<i64>()) {
                return TokenKind::State { slot, value };
            }
        }
        TokenKind::Call
    }

    /// Whether this token may appear where a call is expected.
    pub fn is_call_like(self) -> bool {
        matches!(self, TokenKind::Call | TokenKind::Marker)
    }

    /// Whether this token may appear where a state is expected (STOP closes
    /// the state slots of a call, so markers qualify).
    pub fn is_state_like(self) -> bool {
        matches!(self, TokenKind::State { .. } | TokenKind::Marker)
    }
}

/// Immutable term ↔ id table, built once at model-training time.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Vocabulary {
    terms: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, TokenId>,
    #[serde(skip)]
    kinds: Vec<TokenKind>,
}

// Only the term list is persisted; the index and kind tables are derived, so
// deserialization rebuilds them instead of leaving the instance half-formed.
impl<'de> Deserialize<'de> for Vocabulary {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Persisted {
            terms: Vec<String>,
        }
        let persisted = Persisted::deserialize(deserializer)?;
        let mut vocab = Vocabulary {
            terms: persisted.terms,
            index: HashMap::new(),
            kinds: Vec::new(),
        };
        vocab.rebuild_index();
        Ok(vocab)
    }
}

impl Vocabulary {
    /// Build a vocabulary from an ordered list of terms. Duplicate terms keep
    /// their first id.
    pub fn from_terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocab = Vocabulary::default();
        for term in terms {
            vocab.intern(&term.into());
        }
        vocab
    }

    fn intern(&mut self, term: &str) -> TokenId {
        if let Some(&id) = self.index.get(term) {
            return id;
        }
        let id = TokenId(self.terms.len() as u32);
        self.terms.push(term.to_string());
        self.kinds.push(TokenKind::classify(term));
        self.index.insert(term.to_string(), id);
        id
    }

    /// Rebuild the derived tables after deserialization.
    pub fn rebuild_index(&mut self) {
        self.index = self
            .terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), TokenId(i as u32)))
            .collect();
        self.kinds = self.terms.iter().map(|t| TokenKind::classify(t)).collect();
    }

    /// Number of terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Whether the vocabulary is empty.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Look up a term's id.
    pub fn id(&self, term: &str) -> Option<TokenId> {
        self.index.get(term).copied()
    }

    /// The term for an id.
    pub fn term(&self, id: TokenId) -> &str {
        &self.terms[id.index()]
    }

    /// The classification of an id.
    pub fn kind(&self, id: TokenId) -> TokenKind {
        self.kinds[id.index()]
    }

    /// All terms in id order.
    pub fn terms(&self) -> &[String] {
        &self.terms
    }
}
