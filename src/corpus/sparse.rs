//! Sparse document-term matrix
//!
//! Topic models consume a compressed sparse row matrix of term counts.
//! Columns carry string labels (the vocabulary) and rows carry optional
//! document identifiers that are passed through to model outputs.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building a document-term matrix
#[derive(Error, Debug)]
pub enum MatrixError {
    #[error("CSR structure is inconsistent: {0}")]
    BadStructure(String),

    #[error("column index {index} out of bounds for {n_terms} terms")]
    ColumnOutOfBounds { index: usize, n_terms: usize },

    #[error("expected {expected} column labels, got {got}")]
    BadTermLabels { expected: usize, got: usize },

    #[error("expected {expected} row labels, got {got}")]
    BadDocLabels { expected: usize, got: usize },

    #[error("cell ({row}, {col}) is not a non-negative integer count")]
    NonIntegerCell { row: usize, col: usize },

    #[error("cell ({row}, {col}) exceeds the 32-bit count range")]
    CountOverflow { row: usize, col: usize },
}

/// Document-term matrix in compressed sparse row form.
///
/// Cell `(d, w)` holds the number of occurrences of term `w` in document
/// `d` as an unsigned 32-bit count. Column labels double as the model
/// vocabulary; row labels are free-form document ids (possibly empty).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocTermMatrix {
    n_docs: usize,
    n_terms: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<u32>,
    terms: Vec<String>,
    doc_ids: Vec<String>,
}

impl DocTermMatrix {
    /// Build a matrix from raw CSR parts.
    ///
    /// `terms` must either label every column or be empty (an unlabeled
    /// matrix); `doc_ids` follows the same rule for rows. Structural
    /// consistency of the CSR arrays is validated eagerly.
    pub fn new(
        n_docs: usize,
        n_terms: usize,
        indptr: Vec<usize>,
        indices: Vec<usize>,
        data: Vec<u32>,
        terms: Vec<String>,
        doc_ids: Vec<String>,
    ) -> Result<Self, MatrixError> {
        if indptr.len() != n_docs + 1 {
            return Err(MatrixError::BadStructure(format!(
                "indptr length {} does not match {} rows",
                indptr.len(),
                n_docs
            )));
        }
        if indptr[0] != 0 || indptr[n_docs] != indices.len() {
            return Err(MatrixError::BadStructure(
                "indptr endpoints do not bracket the index array".to_string(),
            ));
        }
        if indptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(MatrixError::BadStructure(
                "indptr is not monotonically non-decreasing".to_string(),
            ));
        }
        if indices.len() != data.len() {
            return Err(MatrixError::BadStructure(format!(
                "{} column indices vs {} data cells",
                indices.len(),
                data.len()
            )));
        }
        if let Some(&bad) = indices.iter().find(|&&c| c >= n_terms) {
            return Err(MatrixError::ColumnOutOfBounds {
                index: bad,
                n_terms,
            });
        }
        if !terms.is_empty() && terms.len() != n_terms {
            return Err(MatrixError::BadTermLabels {
                expected: n_terms,
                got: terms.len(),
            });
        }
        if !doc_ids.is_empty() && doc_ids.len() != n_docs {
            return Err(MatrixError::BadDocLabels {
                expected: n_docs,
                got: doc_ids.len(),
            });
        }

        Ok(Self {
            n_docs,
            n_terms,
            indptr,
            indices,
            data,
            terms,
            doc_ids,
        })
    }

    /// Build from a dense count matrix.
    ///
    /// Rejects cells that are negative, non-integral, or outside the
    /// 32-bit count range. Zero cells are dropped.
    pub fn from_dense(
        dense: &Array2<f64>,
        terms: Vec<String>,
        doc_ids: Vec<String>,
    ) -> Result<Self, MatrixError> {
        let (n_docs, n_terms) = dense.dim();
        let mut indptr = Vec::with_capacity(n_docs + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();

        indptr.push(0);
        for row in 0..n_docs {
            for col in 0..n_terms {
                let v = dense[[row, col]];
                if v == 0.0 {
                    continue;
                }
                if v < 0.0 || v.fract() != 0.0 || !v.is_finite() {
                    return Err(MatrixError::NonIntegerCell { row, col });
                }
                if v > u32::MAX as f64 {
                    return Err(MatrixError::CountOverflow { row, col });
                }
                indices.push(col);
                data.push(v as u32);
            }
            indptr.push(indices.len());
        }

        Self::new(n_docs, n_terms, indptr, indices, data, terms, doc_ids)
    }

    /// Matrix dimensions as `(documents, terms)`
    pub fn shape(&self) -> (usize, usize) {
        (self.n_docs, self.n_terms)
    }

    /// Number of documents (rows)
    pub fn n_docs(&self) -> usize {
        self.n_docs
    }

    /// Number of vocabulary terms (columns)
    pub fn n_terms(&self) -> usize {
        self.n_terms
    }

    /// Column labels; empty when the matrix is unlabeled
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Row labels; empty when no document ids were supplied
    pub fn doc_ids(&self) -> &[String] {
        &self.doc_ids
    }

    /// Non-zero cells of row `d` as `(column, count)` pairs
    pub fn row(&self, d: usize) -> impl Iterator<Item = (usize, u32)> + '_ {
        let range = self.indptr[d]..self.indptr[d + 1];
        self.indices[range.clone()]
            .iter()
            .copied()
            .zip(self.data[range].iter().copied())
    }

    /// Total token count, i.e. the sum of all cells
    pub fn n_tokens(&self) -> u64 {
        self.data.iter().map(|&c| c as u64).sum()
    }

    /// Number of tokens in document `d`
    pub fn doc_len(&self, d: usize) -> u64 {
        self.data[self.indptr[d]..self.indptr[d + 1]]
            .iter()
            .map(|&c| c as u64)
            .sum()
    }

    /// Per-term total counts across the corpus
    pub fn term_frequency(&self) -> Vec<u64> {
        let mut freq = vec![0u64; self.n_terms];
        for (&col, &count) in self.indices.iter().zip(self.data.iter()) {
            freq[col] += count as u64;
        }
        freq
    }

    /// Copy a contiguous range of rows into a new matrix.
    ///
    /// Column labels are shared verbatim; row labels are subset when
    /// present. Used to shard a corpus across workers.
    pub fn slice_rows(&self, start: usize, end: usize) -> Self {
        debug_assert!(start <= end && end <= self.n_docs);
        let lo = self.indptr[start];
        let hi = self.indptr[end];
        let indptr = self.indptr[start..=end].iter().map(|&p| p - lo).collect();
        let doc_ids = if self.doc_ids.is_empty() {
            Vec::new()
        } else {
            self.doc_ids[start..end].to_vec()
        };

        Self {
            n_docs: end - start,
            n_terms: self.n_terms,
            indptr,
            indices: self.indices[lo..hi].to_vec(),
            data: self.data[lo..hi].to_vec(),
            terms: self.terms.clone(),
            doc_ids,
        }
    }
}
