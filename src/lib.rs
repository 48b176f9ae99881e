
pub mod config;
pub mod error;
pub mod tokenizer;
pub mod vocab;
pub mod model;
pub mod train;
pub mod infer;
pub mod similarity;
pub mod validate;
pub mod pipeline;

pub use config::files_handling;
pub use config::{Config, Params, TrainParams};
pub use error::{Doc2VecError, Result, Warning};
pub use tokenizer::{Document, Tokenizer, WordTokenizer};
pub use vocab::Vocabulary;
pub use model::{Model, ModelSnapshot};
pub use train::{train, Train};
pub use infer::{infer, InferenceEngine, Inferred};
pub use similarity::{cosine, rank, ExactIndex, NeighborIndex};
pub use validate::{validate, validate_with, RankDistribution, ValidationReport};
pub use pipeline::Pipeline;
