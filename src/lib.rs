//! # WarpLDA Topic Modeling
//!
//! This library learns latent topics from a sparse document-term matrix
//! using the WarpLDA sampler: a collapsed Metropolis-Hastings scheme that
//! alternates document-ordered and word-ordered passes over the corpus,
//! drawing each proposal in O(1) time.
//!
//! ## Modules
//!
//! - `corpus` - Sparse input matrix, token store, and topic count tables
//! - `sampler` - Proposal draws, sweep engine, and the trainer loop
//! - `models` - The `WarpLda` model facade (fit, transform, distributions)
//! - `distributed` - Shard-parallel training across worker-local models
//! - `preprocessing` - Tokenization and count vectorization
//! - `utils` - Persistence, evaluation metrics, and numeric helpers

pub mod corpus;
pub mod distributed;
pub mod models;
pub mod preprocessing;
pub mod sampler;
pub mod utils;

pub use corpus::sparse::DocTermMatrix;
pub use distributed::DistributedLda;
pub use models::lda::{LdaConfig, LdaError, WarpLda};
pub use preprocessing::tokenizer::Tokenizer;
pub use preprocessing::vectorizer::CountVectorizer;
