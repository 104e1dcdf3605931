//! Evaluation metrics for topic models

use hashbrown::HashMap;
use std::collections::HashSet;

use crate::corpus::sparse::DocTermMatrix;

/// Topic quality metrics computed against the training corpus
pub struct Evaluator {
    dtm: Option<DocTermMatrix>,
}

impl Evaluator {
    /// Create a new evaluator
    pub fn new() -> Self {
        Self { dtm: None }
    }

    /// Attach the document-term matrix used for co-occurrence metrics
    pub fn with_dtm(mut self, dtm: DocTermMatrix) -> Self {
        self.dtm = Some(dtm);
        self
    }

    /// UMass coherence of a topic's top words.
    ///
    /// Uses document co-occurrence; higher (less negative) values mean
    /// more coherent topics. Returns `None` without an attached matrix
    /// or with fewer than two resolvable words.
    pub fn umass_coherence(&self, top_words: &[String]) -> Option<f64> {
        let dtm = self.dtm.as_ref()?;

        let vocab_map: HashMap<&str, usize> = dtm
            .terms()
            .iter()
            .enumerate()
            .map(|(i, w)| (w.as_str(), i))
            .collect();
        let word_indices: Vec<usize> = top_words
            .iter()
            .filter_map(|w| vocab_map.get(w.as_str()).copied())
            .collect();
        if word_indices.len() < 2 {
            return None;
        }

        // Per-word sets of documents that contain the word.
        let doc_sets: Vec<HashSet<usize>> = word_indices
            .iter()
            .map(|&w| {
                (0..dtm.n_docs())
                    .filter(|&d| dtm.row(d).any(|(col, _)| col == w))
                    .collect()
            })
            .collect();

        let epsilon = 1.0;
        let mut coherence = 0.0;
        let mut pair_count = 0;
        for i in 0..doc_sets.len() {
            for j in (i + 1)..doc_sets.len() {
                let d_second = doc_sets[j].len() as f64;
                if d_second == 0.0 {
                    continue;
                }
                let both = doc_sets[i].intersection(&doc_sets[j]).count() as f64;
                coherence += ((both + epsilon) / d_second).ln();
                pair_count += 1;
            }
        }

        if pair_count > 0 {
            Some(coherence / pair_count as f64)
        } else {
            None
        }
    }

    /// Fraction of unique words across all topics' top-word lists.
    /// Higher values indicate more diverse topics.
    pub fn topic_diversity(topics: &[Vec<String>]) -> f64 {
        let all_words: Vec<&str> = topics.iter().flatten().map(|s| s.as_str()).collect();
        if all_words.is_empty() {
            return 0.0;
        }
        let unique_words: HashSet<&str> = all_words.iter().copied().collect();
        unique_words.len() as f64 / all_words.len() as f64
    }

    /// Jaccard similarity between two topics' word sets
    pub fn topic_overlap(topic1: &[String], topic2: &[String]) -> f64 {
        let set1: HashSet<&str> = topic1.iter().map(|s| s.as_str()).collect();
        let set2: HashSet<&str> = topic2.iter().map(|s| s.as_str()).collect();

        let union = set1.union(&set2).count();
        if union == 0 {
            return 0.0;
        }
        set1.intersection(&set2).count() as f64 / union as f64
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}
