// src/lib.rs

//! # ISA
//!
//! Independent Subspace Analysis with Gaussian scale mixture priors.
//!
//! The model explains data as `x = A s`, where the latent vector `s` is split
//! into independent subspaces and each subspace follows an isotropic
//! Gaussian scale mixture (GSM). The basis `A` may be square (complete) or
//! have more columns than rows (overcomplete).
//!
//! Training alternates between inferring latent states, refitting the GSM
//! priors by expectation maximization and improving the basis by natural
//! gradient SGD. Overcomplete models infer their states by Gibbs sampling.
//!
//! ## Example
//!
//! ```rust,no_run
//! use isa::{Distribution, Isa, Parameters};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! # fn main() -> Result<(), isa::IsaError> {
//! let mut rng = StdRng::seed_from_u64(42);
//!
//! // Data: one sample per column
//! let truth = Isa::new(4, None, 2, 10)?;
//! let data = truth.sample(5000, &mut rng)?;
//!
//! // Fit an overcomplete model with custom parameters
//! let mut model = Isa::new(4, Some(6), 2, 10)?;
//! let params = Parameters::builder()
//!     .max_iter(20)
//!     .step_width(0.005)
//!     .gibbs_num_iter(5)
//!     .random_state(0)
//!     .build();
//! let summary = model.train(&data, &params)?;
//!
//! // Inspect the result
//! let bits = model.evaluate(&data)?;
//! let states = model.sample_posterior(&data, &mut rng)?;
//! # Ok(())
//! # }
//! ```

mod config;
mod distribution;
mod error;
mod gibbs;
mod gsm;
mod isa;
mod math;
mod result;
mod sgd;

pub use config::{
    GibbsParameters, GsmParameters, Parameters, ParametersBuilder, SamplingMethod,
    SgdParameters, TrainingMethod,
};
pub use distribution::Distribution;
pub use error::{IsaError, Result};
pub use gsm::Gsm;
pub use isa::Isa;
pub use result::{TrainingOutcome, TrainingSummary};

// Utility functions
pub mod utils;

// Re-export ndarray for convenience
pub use ndarray;
