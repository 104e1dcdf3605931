//! Corpus representation
//!
//! This module provides the data the sampler runs over:
//! - Sparse document-term input matrix with vocabulary labels
//! - Token store with document-ordered and word-ordered views
//! - Topic count tables shared by training and inference

pub mod counts;
pub mod sparse;
pub mod tokens;
