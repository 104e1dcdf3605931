//! Token store
//!
//! Every occurrence of a word in a document is one token record. The
//! sampler needs two iteration orders over the same records (grouped by
//! document and grouped by word) without re-sorting between sweeps, so
//! the store keeps the records once in document-major order plus an index
//! permutation that groups them by word.

use rand::rngs::StdRng;
use rand::Rng;

use crate::corpus::sparse::DocTermMatrix;

/// Flat token records with document-ordered and word-ordered views.
///
/// A token's topic updated through one view is immediately visible
/// through the other: the word-ordered view holds indices into the same
/// record arrays, never copies.
#[derive(Debug, Clone)]
pub struct TokenStore {
    n_topics: usize,
    n_terms: usize,
    /// Word id of each token, document-major order
    pub(crate) words: Vec<u32>,
    /// Document id of each token
    pub(crate) docs: Vec<u32>,
    /// Topic each token held before the current sweep touched it
    pub(crate) z_old: Vec<u32>,
    /// Current topic assignment
    pub(crate) z_new: Vec<u32>,
    /// `doc_offsets[d]..doc_offsets[d + 1]` brackets document `d`'s tokens
    pub(crate) doc_offsets: Vec<usize>,
    /// `word_offsets[w]..word_offsets[w + 1]` brackets word `w`'s entries
    /// in `word_tokens`
    pub(crate) word_offsets: Vec<usize>,
    /// Token indices grouped by word
    pub(crate) word_tokens: Vec<u32>,
}

impl TokenStore {
    /// Expand a document-term matrix into token records with uniformly
    /// random initial topics.
    ///
    /// Cell `(d, w, c)` becomes `c` records. Both assignment slots start
    /// at the same random topic; sweeps rotate `z_old` forward as they
    /// resample `z_new`.
    pub fn build(dtm: &DocTermMatrix, n_topics: usize, rng: &mut StdRng) -> Self {
        let n_docs = dtm.n_docs();
        let n_terms = dtm.n_terms();
        let n_tokens = dtm.n_tokens() as usize;

        let mut words = Vec::with_capacity(n_tokens);
        let mut docs = Vec::with_capacity(n_tokens);
        let mut z_new = Vec::with_capacity(n_tokens);
        let mut doc_offsets = Vec::with_capacity(n_docs + 1);

        doc_offsets.push(0);
        for d in 0..n_docs {
            for (w, count) in dtm.row(d) {
                for _ in 0..count {
                    words.push(w as u32);
                    docs.push(d as u32);
                    z_new.push(rng.gen_range(0..n_topics) as u32);
                }
            }
            doc_offsets.push(words.len());
        }
        let z_old = z_new.clone();

        // Counting sort of token indices by word id.
        let mut word_offsets = vec![0usize; n_terms + 1];
        for &w in &words {
            word_offsets[w as usize + 1] += 1;
        }
        for w in 0..n_terms {
            word_offsets[w + 1] += word_offsets[w];
        }
        let mut cursor = word_offsets[..n_terms].to_vec();
        let mut word_tokens = vec![0u32; n_tokens];
        for (t, &w) in words.iter().enumerate() {
            word_tokens[cursor[w as usize]] = t as u32;
            cursor[w as usize] += 1;
        }

        Self {
            n_topics,
            n_terms,
            words,
            docs,
            z_old,
            z_new,
            doc_offsets,
            word_offsets,
            word_tokens,
        }
    }

    /// An empty store over the given vocabulary, used by models restored
    /// from persisted counts (no training corpus attached).
    pub fn empty(n_terms: usize, n_topics: usize) -> Self {
        Self {
            n_topics,
            n_terms,
            words: Vec::new(),
            docs: Vec::new(),
            z_old: Vec::new(),
            z_new: Vec::new(),
            doc_offsets: vec![0],
            word_offsets: vec![0; n_terms + 1],
            word_tokens: Vec::new(),
        }
    }

    /// Total number of tokens
    pub fn n_tokens(&self) -> usize {
        self.words.len()
    }

    /// Number of documents
    pub fn n_docs(&self) -> usize {
        self.doc_offsets.len() - 1
    }

    /// Vocabulary size the store was built against
    pub fn n_terms(&self) -> usize {
        self.n_terms
    }

    /// Number of topics assignments are drawn from
    pub fn n_topics(&self) -> usize {
        self.n_topics
    }

    /// Token index range of document `d`
    pub fn doc_range(&self, d: usize) -> std::ops::Range<usize> {
        self.doc_offsets[d]..self.doc_offsets[d + 1]
    }

    /// Number of tokens in document `d`
    pub fn doc_len(&self, d: usize) -> usize {
        self.doc_offsets[d + 1] - self.doc_offsets[d]
    }

    /// Token indices of word `w`, in document-major order
    pub fn word_token_ids(&self, w: usize) -> &[u32] {
        &self.word_tokens[self.word_offsets[w]..self.word_offsets[w + 1]]
    }

    /// Current topic of token `t`
    pub fn z(&self, t: usize) -> u32 {
        self.z_new[t]
    }

    /// Reassign token `t` to topic `k`
    pub fn set_z(&mut self, t: usize, k: u32) {
        debug_assert!((k as usize) < self.n_topics);
        self.z_new[t] = k;
    }
}
