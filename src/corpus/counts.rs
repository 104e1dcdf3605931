//! Topic count tables
//!
//! Three tables track the sampler state: `n_dk` (document by topic),
//! `n_wk` (word by topic), and `n_k` (topic totals). All counts are
//! 32-bit. For shard-parallel training the word-side tables also keep a
//! baseline so the net change since the last synchronization can be
//! extracted as a signed delta and merged additively elsewhere.

use serde::{Deserialize, Serialize};

use crate::corpus::tokens::TokenStore;

/// The shared word-side state broadcast to workers: `n_wk` and `n_k`.
///
/// `n_k` is derivable from `n_wk`; shipping it avoids a reduction on
/// every broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalCounts {
    pub n_topics: usize,
    pub n_terms: usize,
    pub n_wk: Vec<u32>,
    pub n_k: Vec<u32>,
}

impl GlobalCounts {
    /// All-zero global counts for a vocabulary of `n_terms` words
    pub fn zeros(n_terms: usize, n_topics: usize) -> Self {
        Self {
            n_topics,
            n_terms,
            n_wk: vec![0; n_terms * n_topics],
            n_k: vec![0; n_topics],
        }
    }

    /// Element-wise accumulate another table into this one
    pub fn accumulate(&mut self, other: &GlobalCounts) {
        for (a, b) in self.n_wk.iter_mut().zip(other.n_wk.iter()) {
            *a += b;
        }
        for (a, b) in self.n_k.iter_mut().zip(other.n_k.iter()) {
            *a += b;
        }
    }

    /// Apply a signed delta produced by a worker shard
    pub fn apply_delta(&mut self, delta: &CountDelta) {
        for (a, d) in self.n_wk.iter_mut().zip(delta.d_wk.iter()) {
            *a = (*a as i64 + d) as u32;
        }
        for (a, d) in self.n_k.iter_mut().zip(delta.d_k.iter()) {
            *a = (*a as i64 + d) as u32;
        }
    }
}

/// Net word-side change of one shard since its last synchronization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountDelta {
    pub d_wk: Vec<i64>,
    pub d_k: Vec<i64>,
}

impl CountDelta {
    /// True when the delta moves no counts at all
    pub fn is_zero(&self) -> bool {
        self.d_wk.iter().all(|&d| d == 0) && self.d_k.iter().all(|&d| d == 0)
    }
}

/// Dense count tables backing one model (or one worker shard).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountTables {
    n_topics: usize,
    n_docs: usize,
    n_terms: usize,
    pub(crate) n_dk: Vec<u32>,
    pub(crate) n_wk: Vec<u32>,
    pub(crate) n_k: Vec<u32>,
    base_wk: Vec<u32>,
    base_k: Vec<u32>,
}

impl CountTables {
    /// Zeroed tables for `n_docs` documents over `n_terms` words
    pub fn new(n_docs: usize, n_terms: usize, n_topics: usize) -> Self {
        Self {
            n_topics,
            n_docs,
            n_terms,
            n_dk: vec![0; n_docs * n_topics],
            n_wk: vec![0; n_terms * n_topics],
            n_k: vec![0; n_topics],
            base_wk: vec![0; n_terms * n_topics],
            base_k: vec![0; n_topics],
        }
    }

    #[inline]
    pub(crate) fn dk(&self, d: usize, k: usize) -> usize {
        d * self.n_topics + k
    }

    #[inline]
    pub(crate) fn wk(&self, w: usize, k: usize) -> usize {
        w * self.n_topics + k
    }

    /// Number of topics
    pub fn n_topics(&self) -> usize {
        self.n_topics
    }

    /// Number of documents covered by `n_dk`
    pub fn n_docs(&self) -> usize {
        self.n_docs
    }

    /// Vocabulary size covered by `n_wk`
    pub fn n_terms(&self) -> usize {
        self.n_terms
    }

    /// Rebuild all three tables from the store's current assignments
    pub fn init_from_store(&mut self, store: &TokenStore) {
        self.n_dk.iter_mut().for_each(|c| *c = 0);
        self.n_wk.iter_mut().for_each(|c| *c = 0);
        self.n_k.iter_mut().for_each(|c| *c = 0);
        for t in 0..store.n_tokens() {
            let d = store.docs[t] as usize;
            let w = store.words[t] as usize;
            let k = store.z_new[t] as usize;
            let dk = self.dk(d, k);
            let wk = self.wk(w, k);
            self.n_dk[dk] += 1;
            self.n_wk[wk] += 1;
            self.n_k[k] += 1;
        }
    }

    /// Rebuild only `n_dk` from the store, leaving the word side alone.
    /// Inference runs against frozen word counts from a fitted model.
    pub fn init_docs_from_store(&mut self, store: &TokenStore) {
        self.n_dk.iter_mut().for_each(|c| *c = 0);
        for t in 0..store.n_tokens() {
            let d = store.docs[t] as usize;
            let k = store.z_new[t] as usize;
            let dk = self.dk(d, k);
            self.n_dk[dk] += 1;
        }
    }

    /// Record one token of word `w` in document `d` joining topic `k`
    pub fn add(&mut self, d: usize, w: usize, k: usize) {
        let dk = self.dk(d, k);
        let wk = self.wk(w, k);
        self.n_dk[dk] += 1;
        self.n_wk[wk] += 1;
        self.n_k[k] += 1;
    }

    /// Record one token of word `w` in document `d` leaving topic `k`
    pub fn remove(&mut self, d: usize, w: usize, k: usize) {
        let dk = self.dk(d, k);
        let wk = self.wk(w, k);
        self.n_dk[dk] -= 1;
        self.n_wk[wk] -= 1;
        self.n_k[k] -= 1;
    }

    /// Copy of the current word-side tables
    pub fn snapshot_global(&self) -> GlobalCounts {
        GlobalCounts {
            n_topics: self.n_topics,
            n_terms: self.n_terms,
            n_wk: self.n_wk.clone(),
            n_k: self.n_k.clone(),
        }
    }

    /// Install broadcast word-side counts and re-baseline the delta
    pub fn set_global(&mut self, global: &GlobalCounts) {
        self.n_wk.copy_from_slice(&global.n_wk);
        self.n_k.copy_from_slice(&global.n_k);
        self.reset_local();
    }

    /// Make the current word-side state the delta baseline
    pub fn reset_local(&mut self) {
        self.base_wk.copy_from_slice(&self.n_wk);
        self.base_k.copy_from_slice(&self.n_k);
    }

    /// Signed word-side change since the last baseline
    pub fn local_delta(&self) -> CountDelta {
        let d_wk = self
            .n_wk
            .iter()
            .zip(self.base_wk.iter())
            .map(|(&c, &b)| c as i64 - b as i64)
            .collect();
        let d_k = self
            .n_k
            .iter()
            .zip(self.base_k.iter())
            .map(|(&c, &b)| c as i64 - b as i64)
            .collect();
        CountDelta { d_wk, d_k }
    }

    /// Merge a shard delta into these tables
    pub fn apply_delta(&mut self, delta: &CountDelta) {
        for (a, d) in self.n_wk.iter_mut().zip(delta.d_wk.iter()) {
            *a = (*a as i64 + d) as u32;
        }
        for (a, d) in self.n_k.iter_mut().zip(delta.d_k.iter()) {
            *a = (*a as i64 + d) as u32;
        }
    }

    /// Check the cross-table sum invariant: per topic, word-side and
    /// document-side counts must both total `n_k`.
    pub fn sums_consistent(&self) -> bool {
        for k in 0..self.n_topics {
            let from_words: u64 = (0..self.n_terms)
                .map(|w| self.n_wk[self.wk(w, k)] as u64)
                .sum();
            let from_docs: u64 = (0..self.n_docs)
                .map(|d| self.n_dk[self.dk(d, k)] as u64)
                .sum();
            if from_words != self.n_k[k] as u64 || from_docs != self.n_k[k] as u64 {
                return false;
            }
        }
        true
    }

    /// Per-document token totals implied by `n_dk`
    pub fn doc_lengths(&self) -> Vec<u64> {
        (0..self.n_docs)
            .map(|d| {
                (0..self.n_topics)
                    .map(|k| self.n_dk[self.dk(d, k)] as u64)
                    .sum()
            })
            .collect()
    }
}

/// Frozen per-word topic multiset, expanded from a fitted `n_wk`.
///
/// Inference draws the empirical branch of the word proposal from this
/// list: picking a uniform entry for word `w` is a draw proportional to
/// `n_wk[w][k]`. Rebuilding it from the count table (rather than from the
/// training token store) makes a model loaded from disk behave exactly
/// like the in-memory model that saved it.
#[derive(Debug, Clone)]
pub struct WordTopicList {
    offsets: Vec<usize>,
    topics: Vec<u32>,
}

impl WordTopicList {
    /// Expand `n_wk` into per-word topic lists
    pub fn from_global(global: &GlobalCounts) -> Self {
        let (v, k) = (global.n_terms, global.n_topics);
        let mut offsets = Vec::with_capacity(v + 1);
        let mut topics = Vec::new();
        offsets.push(0);
        for w in 0..v {
            for topic in 0..k {
                let count = global.n_wk[w * k + topic];
                for _ in 0..count {
                    topics.push(topic as u32);
                }
            }
            offsets.push(topics.len());
        }
        Self { offsets, topics }
    }

    /// Topic entries of word `w`, one per fitted token of `w`
    pub fn topics_of(&self, w: usize) -> &[u32] {
        &self.topics[self.offsets[w]..self.offsets[w + 1]]
    }
}
