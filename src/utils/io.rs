//! Model persistence
//!
//! A fitted topic model is fully determined, for inference purposes,
//! by its vocabulary, hyperparameters, and the word-side count tables.
//! This module serializes exactly that, in a compact binary form for
//! storage and JSON for interop, such that a round trip reproduces
//! distributions bit for bit.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;

use crate::corpus::counts::GlobalCounts;

/// IO and serialization errors
#[derive(Error, Debug)]
pub enum IoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("binary serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("saved model is inconsistent: {0}")]
    Corrupt(String),
}

/// Everything a model needs to transform new documents later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedModel {
    /// Vocabulary, in column order
    pub terms: Vec<String>,
    /// Number of topics K
    pub n_topics: usize,
    /// Document-topic prior α
    pub doc_topic_prior: f64,
    /// Topic-word prior β
    pub topic_word_prior: f64,
    /// Word-by-topic counts, word-major
    pub n_wk: Vec<u32>,
    /// Topic totals
    pub n_k: Vec<u32>,
}

impl SavedModel {
    /// Validate internal consistency (table shapes and totals)
    pub fn validate(&self) -> Result<(), IoError> {
        if self.n_wk.len() != self.terms.len() * self.n_topics {
            return Err(IoError::Corrupt(format!(
                "n_wk has {} entries, expected {} terms x {} topics",
                self.n_wk.len(),
                self.terms.len(),
                self.n_topics
            )));
        }
        if self.n_k.len() != self.n_topics {
            return Err(IoError::Corrupt(format!(
                "n_k has {} entries for {} topics",
                self.n_k.len(),
                self.n_topics
            )));
        }
        for k in 0..self.n_topics {
            let total: u64 = (0..self.terms.len())
                .map(|w| self.n_wk[w * self.n_topics + k] as u64)
                .sum();
            if total != self.n_k[k] as u64 {
                return Err(IoError::Corrupt(format!(
                    "topic {k} totals {total} in n_wk but {} in n_k",
                    self.n_k[k]
                )));
            }
        }
        Ok(())
    }

    /// View the saved word-side tables as broadcastable global counts
    pub fn global_counts(&self) -> GlobalCounts {
        GlobalCounts {
            n_topics: self.n_topics,
            n_terms: self.terms.len(),
            n_wk: self.n_wk.clone(),
            n_k: self.n_k.clone(),
        }
    }

    /// Serialize to a compact binary buffer
    pub fn to_bytes(&self) -> Result<Vec<u8>, IoError> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from a binary buffer and validate
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IoError> {
        let model: SavedModel = bincode::deserialize(bytes)?;
        model.validate()?;
        Ok(model)
    }

    /// Save in binary form
    pub fn save_binary<P: AsRef<Path>>(&self, path: P) -> Result<(), IoError> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        bincode::serialize_into(writer, self)?;
        Ok(())
    }

    /// Load from binary form and validate
    pub fn load_binary<P: AsRef<Path>>(path: P) -> Result<Self, IoError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let model: SavedModel = bincode::deserialize_from(reader)?;
        model.validate()?;
        Ok(model)
    }

    /// Save as pretty-printed JSON
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), IoError> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Load from JSON and validate
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, IoError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let model: SavedModel = serde_json::from_reader(reader)?;
        model.validate()?;
        Ok(model)
    }
}
