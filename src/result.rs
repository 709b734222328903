//! Result types for ISA training.

/// How a call to `Isa::train` terminated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrainingOutcome {
    /// The change in bits per dimension between rounds fell below tolerance.
    Converged,
    /// All requested rounds were run.
    MaxIterReached,
}

/// Summary of a call to `Isa::train`.
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    /// Number of outer rounds performed.
    pub n_iterations: usize,

    /// Terminal state of the training loop.
    pub outcome: TrainingOutcome,

    /// Average code length of the training data after each round, in bits
    /// per dimension.
    pub bits_per_dim: Vec<f64>,

    /// Rounds in which SGD hit a numerical failure and the pocketed basis
    /// was restored.
    pub n_restored: usize,

    /// Step width in effect at the end of training. Differs from the
    /// configured value only when `adaptive` is set.
    pub step_width: f64,
}

impl TrainingSummary {
    /// Whether training stopped because it converged.
    pub fn converged(&self) -> bool {
        self.outcome == TrainingOutcome::Converged
    }

    /// Code length after the last round, if any round ran.
    pub fn final_bits_per_dim(&self) -> Option<f64> {
        self.bits_per_dim.last().copied()
    }
}
