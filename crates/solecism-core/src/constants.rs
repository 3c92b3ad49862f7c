//! Markers and default constants used throughout the crate.

/// Start-of-sequence marker consumed by the predictor.
pub const START: &str = "START";

/// End-of-sequence marker; also terminates each call's state slots.
pub const STOP: &str = "STOP";

/// Sentinel call name excluded from topic-model vocabularies.
pub const TERMINAL: &str = "TERMINAL";

/// Default deterministic seed for RNG operations.
///
/// Same seed + same data = same result. The value `0x63616C6C73` is "calls"
/// encoded in ASCII.
pub const DEFAULT_SEED: u64 = 0x63616C6C73;

/// Default floor applied to probabilities before taking logarithms.
///
/// The model can emit probabilities that round to exactly zero; `ln(0)` is
/// undefined, so likelihood paths clamp to this floor. See DESIGN.md for the
/// policy discussion.
pub const DEFAULT_PROB_FLOOR: f64 = 1e-50;

// =============================================================================
// Default bootstrap-estimator configuration
// =============================================================================

/// Default number of outer Monte-Carlo samples for the bootstrap KLD mode.
pub const DEFAULT_OUTER_SAMPLES: usize = 100;

/// Default resample-set size per outer sample.
pub const DEFAULT_NSAMPLES: usize = 1000;

/// Default number of repeated resamples used for the bias estimate.
pub const DEFAULT_NITERS: usize = 50;

// =============================================================================
// Default topic-inference configuration
// =============================================================================

/// Default Dirichlet document-topic prior (α) for LDA training.
pub const DEFAULT_DOC_TOPIC_PRIOR: f64 = 0.1;

/// Default maximum number of variational EM iterations.
pub const DEFAULT_LDA_MAX_ITER: usize = 100;

/// Default per-document update iterations in the E-step.
pub const DEFAULT_DOC_UPDATE_ITER: usize = 100;

/// Default mean-change tolerance for E-step convergence.
pub const DEFAULT_MEAN_CHANGE_TOL: f64 = 1e-5;
