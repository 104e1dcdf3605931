//! Topic model facade
//!
//! This module exposes the `WarpLda` model: configuration, fitting,
//! inference on new documents, and the derived distribution matrices.

pub mod lda;

pub use lda::{LdaConfig, LdaError, LdaTopic, VisualizationData, WarpLda};
