//! Text tokenization
//!
//! Splits raw text into lowercase alphabetic tokens, dropping stop
//! words and tokens outside the configured length bounds.

use std::collections::HashSet;

fn default_stop_words() -> HashSet<String> {
    [
        "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be",
        "because", "been", "before", "being", "between", "both", "but", "by", "can", "could",
        "did", "do", "does", "each", "for", "from", "had", "has", "have", "he", "her", "here",
        "him", "his", "how", "i", "if", "in", "into", "is", "it", "its", "just", "may", "more",
        "most", "no", "not", "now", "of", "on", "only", "or", "other", "our", "out", "over",
        "she", "should", "so", "some", "such", "than", "that", "the", "their", "them", "then",
        "there", "these", "they", "this", "those", "through", "to", "under", "up", "was", "we",
        "were", "what", "when", "where", "which", "while", "who", "will", "with", "would", "you",
        "your",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Tokenizer configuration and functionality
#[derive(Debug, Clone)]
pub struct Tokenizer {
    stop_words: HashSet<String>,
    min_length: usize,
    max_length: usize,
    lowercase: bool,
}

impl Tokenizer {
    /// Create a tokenizer with the default English stop-word list
    pub fn new() -> Self {
        Self {
            stop_words: default_stop_words(),
            min_length: 2,
            max_length: 50,
            lowercase: true,
        }
    }

    /// Add custom stop words
    pub fn add_stop_words(&mut self, words: &[&str]) {
        for word in words {
            self.stop_words.insert(word.to_lowercase());
        }
    }

    /// Set the minimum token length
    pub fn min_length(mut self, len: usize) -> Self {
        self.min_length = len;
        self
    }

    /// Set the maximum token length
    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = len;
        self
    }

    /// Enable or disable lowercase folding
    pub fn lowercase(mut self, enable: bool) -> Self {
        self.lowercase = enable;
        self
    }

    /// Split text into filtered tokens
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let folded;
        let text = if self.lowercase {
            folded = text.to_lowercase();
            &folded
        } else {
            text
        };

        text.chars()
            .map(|c| if c.is_alphabetic() { c } else { ' ' })
            .collect::<String>()
            .split_whitespace()
            .filter(|tok| {
                let len = tok.chars().count();
                len >= self.min_length && len <= self.max_length && !self.stop_words.contains(*tok)
            })
            .map(String::from)
            .collect()
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}
