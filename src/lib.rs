//! biotag — trainable linear-chain sequence tagging for biomedical text.
//!
//! The crate turns a sequence of text units into a sequence of labels with
//! a trainable probabilistic model, optionally reporting a confidence score
//! per predicted segment. Three pieces compose:
//!
//! * a deterministic [feature pipeline](features) mapping units (plus
//!   optional per-unit metadata) to sparse binary feature sets, driven by a
//!   flat [`FeatureConfig`];
//! * a [sequence model](crate::ModelKind) — a linear-chain CRF decoded with
//!   Viterbi, or a per-unit maximum-entropy classifier — behind the single
//!   [`Tagger`] train/predict contract;
//! * a constrained forward-lattice confidence estimator and a versioned,
//!   compressed model store.
//!
//! ```no_run
//! use biotag::{Alphabet, FeatureConfig, Tagger, TrainOpts};
//!
//! # fn main() -> Result<(), biotag::Error> {
//! let config = FeatureConfig::from_reader(std::fs::File::open("feature.conf")?)?;
//! let sentences = biotag::read_piped(std::fs::File::open("train.ppd")?, &config)?;
//! let tagger = Tagger::train(&sentences, Alphabet::new(), config, &TrainOpts::default())?;
//! tagger.save_to_path("genes.mod".as_ref())?;
//! # Ok(())
//! # }
//! ```

pub mod alphabet;
pub mod config;
pub(crate) mod crf;
pub mod dataset;
pub mod evaluation;
pub mod features;
pub(crate) mod model;
pub mod sentence;
pub(crate) mod store;
pub mod tagger;

pub use alphabet::{Alphabet, FrozenAlphabet};
pub use config::{ConfigError, FeatureConfig};
pub use dataset::read_piped;
pub use evaluation::Evaluation;
pub use features::{FeatureGenerator, Lexicon};
pub use model::{ModelKind, OUTSIDE};
pub use sentence::{Sentence, Unit};
pub use tagger::{Stopping, Tagger, TrainOpts};

use thiserror::Error as ThisError;

/// All the ways the engine can fail. Configuration problems are fatal at
/// pipeline-construction time; a decode whose output length disagrees with
/// its input is an internal-consistency error and is reported distinctly.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid model data: {0}")]
    InvalidModel(String),
    #[error("feature configuration does not match the one embedded in the model")]
    ConfigMismatch,
    #[error("wrong number of labels predicted: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("training data contains a unit without a gold label")]
    UnlabeledUnit,
    #[error("internal consistency error: {0}")]
    Inconsistency(String),
    #[error("failed to encode model: {0}")]
    Encode(#[from] bson::ser::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
