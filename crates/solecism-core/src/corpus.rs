//! Normalized in-memory trace model: packages → sequences → events.
//!
//! A [`Corpus`] is an ordered list of [`Package`]s; order is preserved so
//! downstream scores can be keyed by `(package_index, sequence_index)`. A
//! [`Sequence`] is one observed execution trace through an API; it is
//! immutable once constructed. Events are a tagged union of API calls
//! (with state vectors and source locations) and branch markers used only by
//! early estimator variants.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::constants::{START, STOP};

/// One API call observation: the call identifier, a vector of discretized
/// side-effect observations, and the source location it was observed at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallEvent {
    /// Fully qualified call identifier.
    pub call: String,
    /// Discretized side-effect observations, one per state slot.
    pub states: Vec<i64>,
    /// Source location string (file:line or similar).
    pub location: String,
}

/// One event in a trace. Calls and branches never carry both attribute sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Event {
    /// An observed API call.
    Call(CallEvent),
    /// A branch point with the given branch factor (early estimator input).
    Branch {
        /// Number of branch alternatives at this point.
        factor: u32,
    },
}

impl Event {
    /// The call event, if this is one.
    pub fn as_call(&self) -> Option<&CallEvent> {
        match self {
            Event::Call(c) => Some(c),
            Event::Branch { .. } => None,
        }
    }
}

/// One observed execution trace. Immutable once read from input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Sequence {
    /// Ordered events of the trace.
    pub events: Vec<Event>,
}

impl Sequence {
    /// Construct from a list of events.
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    /// Iterate over the call events, skipping branch markers.
    pub fn call_events(&self) -> impl Iterator<Item = &CallEvent> {
        self.events.iter().filter_map(Event::as_call)
    }

    /// The location of the last call event, if any.
    pub fn terminal_location(&self) -> Option<&str> {
        self.call_events().last().map(|c| c.location.as_str())
    }

    /// Flatten into the predictor's token stream: each call identifier
    /// followed by one `"{slot}#{value}"` token per state entry, optionally
    /// wrapped in START/STOP markers.
    pub fn tokens(&self, markers: bool) -> Vec<String> {
        let mut out = Vec::new();
        if markers {
            out.push(START.to_string());
        }
        for event in self.call_events() {
            out.push(event.call.clone());
            for (slot, value) in event.states.iter().enumerate() {
                out.push(format!("{}#{}", slot, value));
            }
        }
        if markers {
            out.push(STOP.to_string());
        }
        out
    }
}

/// A named bag of sequences sharing a context (a source file or procedure),
/// optionally annotated with a topic vector from the topic engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Package {
    /// Package name; `"anomalous"` tags synthetic ground truth.
    pub name: String,
    /// Observed traces of this package, in input order.
    pub sequences: Vec<Sequence>,
    /// Probability distribution over K topics, if topic inference has run.
    pub topic: Option<Vec<f64>>,
}

impl Package {
    /// Distinct locations across all call events, in first-seen order.
    pub fn locations(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for seq in &self.sequences {
            for event in seq.call_events() {
                if seen.insert(event.location.as_str()) {
                    out.push(event.location.as_str());
                }
            }
        }
        out
    }

    /// All prefixes of this package's sequences that end at `location`.
    ///
    /// Every call event observed at `location` contributes the prefix of its
    /// sequence up to and including that event, so one sequence can yield
    /// several entries. The result is what the KLD estimator counts over.
    pub fn sequences_ending_at(&self, location: &str) -> Vec<Sequence> {
        let mut out = Vec::new();
        for seq in &self.sequences {
            for (i, event) in seq.events.iter().enumerate() {
                if let Event::Call(c) = event {
                    if c.location == location {
                        out.push(Sequence::new(seq.events[..=i].to_vec()));
                    }
                }
            }
        }
        out
    }

    /// The distinct calls of this package (a bag-of-calls), in first-seen
    /// order. This is the evidence the topic engine vectorizes.
    pub fn call_bag(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for seq in &self.sequences {
            for event in seq.call_events() {
                if seen.insert(event.call.as_str()) {
                    out.push(event.call.as_str());
                }
            }
        }
        out
    }
}

/// Ordered collection of packages. Package order is meaningful: scores are
/// keyed by position.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Corpus {
    /// Packages in input order.
    pub packages: Vec<Package>,
}

impl Corpus {
    /// Total number of sequences across all packages.
    pub fn sequence_count(&self) -> usize {
        self.packages.iter().map(|p| p.sequences.len()).sum()
    }
}
