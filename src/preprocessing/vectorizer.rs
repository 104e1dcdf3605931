//! Count vectorization
//!
//! Builds a frequency-filtered vocabulary over tokenized documents and
//! emits the labelled sparse count matrix the topic model consumes.

use hashbrown::HashMap;
use std::collections::HashSet;

use crate::corpus::sparse::{DocTermMatrix, MatrixError};

/// Count vectorizer (bag of words).
///
/// Converts tokenized documents into a sparse document-term matrix
/// whose column labels are the fitted vocabulary in sorted order.
#[derive(Debug, Clone)]
pub struct CountVectorizer {
    /// Vocabulary: term -> column index
    vocabulary: HashMap<String, usize>,
    /// Inverse vocabulary: column index -> term
    inverse_vocabulary: Vec<String>,
    /// Minimum document frequency for term inclusion
    min_df: usize,
    /// Maximum document frequency ratio for term inclusion
    max_df_ratio: f64,
    /// Maximum vocabulary size
    max_features: Option<usize>,
    /// Whether the vectorizer has been fitted
    is_fitted: bool,
}

impl CountVectorizer {
    /// Create a new count vectorizer
    pub fn new() -> Self {
        Self {
            vocabulary: HashMap::new(),
            inverse_vocabulary: Vec::new(),
            min_df: 1,
            max_df_ratio: 1.0,
            max_features: None,
            is_fitted: false,
        }
    }

    /// Set the minimum document frequency
    pub fn min_df(mut self, min_df: usize) -> Self {
        self.min_df = min_df;
        self
    }

    /// Set the maximum document frequency ratio
    pub fn max_df_ratio(mut self, ratio: f64) -> Self {
        self.max_df_ratio = ratio;
        self
    }

    /// Set the maximum vocabulary size
    pub fn max_features(mut self, max: usize) -> Self {
        self.max_features = Some(max);
        self
    }

    /// Fit the vocabulary on tokenized documents
    pub fn fit(&mut self, tokenized_docs: &[Vec<String>]) {
        let n_docs = tokenized_docs.len();

        // Document and total frequencies per term.
        let mut term_doc_freq: HashMap<String, usize> = HashMap::new();
        let mut term_total_freq: HashMap<String, usize> = HashMap::new();
        for doc in tokenized_docs {
            let unique_terms: HashSet<&String> = doc.iter().collect();
            for term in unique_terms {
                *term_doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            for term in doc {
                *term_total_freq.entry(term.clone()).or_insert(0) += 1;
            }
        }

        // Filter by document frequency.
        let max_df = (n_docs as f64 * self.max_df_ratio) as usize;
        let mut filtered_terms: Vec<(String, usize)> = term_doc_freq
            .into_iter()
            .filter(|(_, df)| *df >= self.min_df && *df <= max_df)
            .map(|(term, _)| {
                let total = term_total_freq.get(&term).copied().unwrap_or(0);
                (term, total)
            })
            .collect();

        // Most frequent terms win when a vocabulary cap is set.
        filtered_terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        if let Some(max) = self.max_features {
            filtered_terms.truncate(max);
        }

        // Alphabetical column order for a stable vocabulary.
        filtered_terms.sort_by(|a, b| a.0.cmp(&b.0));

        self.vocabulary.clear();
        self.inverse_vocabulary.clear();
        for (idx, (term, _)) in filtered_terms.into_iter().enumerate() {
            self.vocabulary.insert(term.clone(), idx);
            self.inverse_vocabulary.push(term);
        }

        self.is_fitted = true;
    }

    /// Transform tokenized documents into a sparse count matrix.
    ///
    /// Out-of-vocabulary tokens are dropped. Row labels are generated
    /// positional ids (`doc0`, `doc1`, ...).
    pub fn transform(&self, tokenized_docs: &[Vec<String>]) -> Result<DocTermMatrix, MatrixError> {
        assert!(self.is_fitted, "vectorizer must be fitted before transform");

        let n_docs = tokenized_docs.len();
        let n_terms = self.vocabulary.len();

        let mut indptr = Vec::with_capacity(n_docs + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();

        indptr.push(0);
        let mut row_counts: HashMap<usize, u32> = HashMap::new();
        for doc in tokenized_docs {
            row_counts.clear();
            for term in doc {
                if let Some(&idx) = self.vocabulary.get(term) {
                    *row_counts.entry(idx).or_insert(0) += 1;
                }
            }
            let mut cells: Vec<(usize, u32)> = row_counts.iter().map(|(&c, &n)| (c, n)).collect();
            cells.sort_by_key(|&(c, _)| c);
            for (col, count) in cells {
                indices.push(col);
                data.push(count);
            }
            indptr.push(indices.len());
        }

        let doc_ids = (0..n_docs).map(|i| format!("doc{i}")).collect();
        DocTermMatrix::new(
            n_docs,
            n_terms,
            indptr,
            indices,
            data,
            self.inverse_vocabulary.clone(),
            doc_ids,
        )
    }

    /// Fit and transform in one step
    pub fn fit_transform(
        &mut self,
        tokenized_docs: &[Vec<String>],
    ) -> Result<DocTermMatrix, MatrixError> {
        self.fit(tokenized_docs);
        self.transform(tokenized_docs)
    }

    /// The fitted term -> column mapping
    pub fn get_vocabulary(&self) -> &HashMap<String, usize> {
        &self.vocabulary
    }

    /// Term label of a column
    pub fn get_term(&self, index: usize) -> Option<&String> {
        self.inverse_vocabulary.get(index)
    }

    /// Fitted vocabulary size
    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }
}

impl Default for CountVectorizer {
    fn default() -> Self {
        Self::new()
    }
}
