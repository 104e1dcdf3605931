//! WarpLDA model
//!
//! `WarpLda` owns the sampler state and exposes the scikit-style
//! surface: configure, `fit_transform` a labelled document-term matrix,
//! `transform` new documents against the frozen topics, and read the
//! normalized distribution matrices.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::corpus::counts::{CountTables, WordTopicList};
use crate::corpus::sparse::{DocTermMatrix, MatrixError};
use crate::corpus::tokens::TokenStore;
use crate::sampler::trainer::{
    LogProgress, NumericalError, ProgressSink, TrainReport, Trainer,
};
use crate::sampler::{SamplerParams, SweepMode};
use crate::utils::io::{IoError, SavedModel};
use thiserror::Error;

/// Errors surfaced by the model facade
#[derive(Error, Debug)]
pub enum LdaError {
    #[error("invalid hyperparameter: {0}")]
    InvalidHyperparameter(String),

    #[error("corpus has no documents, no vocabulary, or no tokens")]
    EmptyCorpus,

    #[error("document-term matrix has no column labels")]
    MissingVocabulary,

    #[error("vocabulary mismatch: {0}")]
    VocabularyMismatch(String),

    #[error("model not fitted yet")]
    NotFitted,

    #[error("pseudo-log-likelihood became non-finite at iteration {iter}")]
    Numerical { iter: usize },

    #[error("matrix error: {0}")]
    Matrix(#[from] MatrixError),

    #[error("io error: {0}")]
    Io(#[from] IoError),
}

impl From<NumericalError> for LdaError {
    fn from(e: NumericalError) -> Self {
        LdaError::Numerical { iter: e.iter }
    }
}

/// Model configuration
#[derive(Debug, Clone)]
pub struct LdaConfig {
    /// Number of topics K
    pub n_topics: usize,
    /// Symmetric document-topic prior α
    pub doc_topic_prior: f64,
    /// Symmetric topic-word prior β
    pub topic_word_prior: f64,
    /// Number of doc-sweep/word-sweep iterations
    pub n_iter: usize,
    /// Relative-change threshold for early stopping; negative disables
    pub convergence_tol: f64,
    /// Check convergence every this many iterations
    pub n_check_convergence: usize,
    /// Emit a progress message at every convergence check
    pub verbose: bool,
    /// RNG seed; `None` seeds from entropy
    pub seed: Option<u64>,
}

impl Default for LdaConfig {
    fn default() -> Self {
        Self {
            n_topics: 10,
            doc_topic_prior: 0.1,
            topic_word_prior: 0.01,
            n_iter: 500,
            convergence_tol: 1e-3,
            n_check_convergence: 10,
            verbose: false,
            seed: None,
        }
    }
}

impl LdaConfig {
    /// Create a configuration with the given number of topics
    pub fn new(n_topics: usize) -> Self {
        Self {
            n_topics,
            ..Default::default()
        }
    }

    /// Set the document-topic prior α
    pub fn doc_topic_prior(mut self, alpha: f64) -> Self {
        self.doc_topic_prior = alpha;
        self
    }

    /// Set the topic-word prior β
    pub fn topic_word_prior(mut self, beta: f64) -> Self {
        self.topic_word_prior = beta;
        self
    }

    /// Set the iteration budget
    pub fn n_iter(mut self, n: usize) -> Self {
        self.n_iter = n;
        self
    }

    /// Set the early-stopping tolerance (negative disables)
    pub fn convergence_tol(mut self, tol: f64) -> Self {
        self.convergence_tol = tol;
        self
    }

    /// Set the convergence check cadence
    pub fn n_check_convergence(mut self, n: usize) -> Self {
        self.n_check_convergence = n;
        self
    }

    /// Enable per-check progress messages
    pub fn verbose(mut self, on: bool) -> Self {
        self.verbose = on;
        self
    }

    /// Set the RNG seed for reproducible runs
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), LdaError> {
        if self.n_topics < 1 {
            return Err(LdaError::InvalidHyperparameter(
                "n_topics must be at least 1".to_string(),
            ));
        }
        if !(self.doc_topic_prior > 0.0) || !self.doc_topic_prior.is_finite() {
            return Err(LdaError::InvalidHyperparameter(
                "doc_topic_prior must be positive and finite".to_string(),
            ));
        }
        if !(self.topic_word_prior > 0.0) || !self.topic_word_prior.is_finite() {
            return Err(LdaError::InvalidHyperparameter(
                "topic_word_prior must be positive and finite".to_string(),
            ));
        }
        if self.n_iter < 1 {
            return Err(LdaError::InvalidHyperparameter(
                "n_iter must be at least 1".to_string(),
            ));
        }
        if self.n_check_convergence < 1 {
            return Err(LdaError::InvalidHyperparameter(
                "n_check_convergence must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// One discovered topic with its strongest words
#[derive(Debug, Clone)]
pub struct LdaTopic {
    /// Topic index
    pub index: usize,
    /// Top words with their probabilities under `P(w|k)`
    pub top_words: Vec<(String, f64)>,
    /// Share of all corpus tokens assigned to this topic
    pub prevalence: f64,
}

impl std::fmt::Display for LdaTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Topic {}: (prevalence: {:.2}%) [",
            self.index,
            self.prevalence * 100.0
        )?;
        for (i, (word, prob)) in self.top_words.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {:.3}", word, prob)?;
        }
        write!(f, "]")
    }
}

/// Bundle consumed by visualization exporters
#[derive(Debug, Clone, serde::Serialize)]
pub struct VisualizationData {
    /// K×V topic-word distribution, row-stochastic
    pub topic_word: Vec<Vec<f64>>,
    /// D×K document-topic distribution, row-stochastic
    pub doc_topic: Vec<Vec<f64>>,
    /// Token count of each training document
    pub doc_lengths: Vec<u64>,
    /// Vocabulary, in column order
    pub vocab: Vec<String>,
    /// Corpus-wide count of each term
    pub term_frequency: Vec<u64>,
}

/// State of a model that has been fitted to a corpus
struct FittedModel {
    terms: Vec<String>,
    doc_ids: Vec<String>,
    store: TokenStore,
    counts: CountTables,
    /// Frozen per-word topic lists the inference word proposal draws from
    word_topics: WordTopicList,
}

enum ModelState {
    Uninitialized,
    Fitted(Box<FittedModel>),
}

/// WarpLDA topic model.
///
/// Created uninitialized with hyperparameters only; `fit_transform`
/// binds a corpus and trains, after which the distribution accessors
/// and `transform` become available.
pub struct WarpLda {
    config: LdaConfig,
    state: ModelState,
    report: Option<TrainReport>,
    cancel: Option<Arc<AtomicBool>>,
}

impl WarpLda {
    /// Create an unfitted model, validating hyperparameters eagerly
    pub fn new(config: LdaConfig) -> Result<Self, LdaError> {
        config.validate()?;
        Ok(Self {
            config,
            state: ModelState::Uninitialized,
            report: None,
            cancel: None,
        })
    }

    /// Shorthand for a default-configured model with `n_topics` topics
    pub fn with_topics(n_topics: usize) -> Result<Self, LdaError> {
        Self::new(LdaConfig::new(n_topics))
    }

    /// Install a cooperative cancellation flag. The trainer checks it
    /// between sweeps; a raised flag ends training with the partial
    /// (still consistent) state rather than an error.
    pub fn cancel_flag(&mut self, flag: Arc<AtomicBool>) {
        self.cancel = Some(flag);
    }

    /// Model configuration
    pub fn config(&self) -> &LdaConfig {
        &self.config
    }

    /// True once `fit_transform` has bound a corpus
    pub fn is_fitted(&self) -> bool {
        matches!(self.state, ModelState::Fitted(_))
    }

    /// `(iteration, pseudo-log-likelihood)` trace of the last fit
    pub fn log_likelihood_history(&self) -> &[(usize, f64)] {
        self.report.as_ref().map_or(&[], |r| &r.history)
    }

    /// Report of the last fit (iterations run, convergence, cancellation)
    pub fn fit_report(&self) -> Option<&TrainReport> {
        self.report.as_ref()
    }

    /// Vocabulary the model was fitted on
    pub fn vocabulary(&self) -> Result<&[String], LdaError> {
        Ok(&self.fitted()?.terms)
    }

    /// Number of tokens in the training corpus
    pub fn n_tokens(&self) -> Result<usize, LdaError> {
        Ok(self.fitted()?.store.n_tokens())
    }

    fn fitted(&self) -> Result<&FittedModel, LdaError> {
        match &self.state {
            ModelState::Fitted(f) => Ok(f),
            ModelState::Uninitialized => Err(LdaError::NotFitted),
        }
    }

    fn params(&self, n_terms: usize) -> SamplerParams {
        SamplerParams::new(
            self.config.n_topics,
            self.config.doc_topic_prior,
            self.config.topic_word_prior,
            n_terms,
        )
    }

    fn rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Fit the model to a labelled corpus and return the D×K
    /// document-topic distribution.
    pub fn fit_transform(&mut self, dtm: &DocTermMatrix) -> Result<Array2<f64>, LdaError> {
        validate_corpus(dtm)?;

        let k = self.config.n_topics;
        let mut rng = self.rng();
        let mut store = TokenStore::build(dtm, k, &mut rng);
        let mut counts = CountTables::new(dtm.n_docs(), dtm.n_terms(), k);
        counts.init_from_store(&store);
        let params = self.params(dtm.n_terms());

        let mut progress = LogProgress;
        let sink: Option<&mut dyn ProgressSink> = if self.config.verbose {
            Some(&mut progress)
        } else {
            None
        };
        let mut trainer = Trainer {
            n_iter: self.config.n_iter,
            convergence_tol: self.config.convergence_tol,
            n_check_convergence: self.config.n_check_convergence,
            cancel: self.cancel.as_deref(),
            sink,
        };
        let report = trainer.run(&mut store, &mut counts, &params, SweepMode::Train, &mut rng)?;

        let word_topics = WordTopicList::from_global(&counts.snapshot_global());
        self.report = Some(report);
        self.state = ModelState::Fitted(Box::new(FittedModel {
            terms: dtm.terms().to_vec(),
            doc_ids: dtm.doc_ids().to_vec(),
            store,
            counts,
            word_topics,
        }));

        self.doc_topic_distribution()
    }

    /// Infer topic mixtures for new documents against the frozen topics.
    ///
    /// The columns must match the fit vocabulary exactly and in order.
    /// Deterministic for a fixed configured seed.
    pub fn transform(&self, dtm: &DocTermMatrix) -> Result<Array2<f64>, LdaError> {
        let fitted = self.fitted()?;
        if dtm.terms().is_empty() {
            return Err(LdaError::MissingVocabulary);
        }
        check_vocabulary(&fitted.terms, dtm.terms())?;

        let k = self.config.n_topics;
        let mut rng = self.rng();
        let mut store = TokenStore::build(dtm, k, &mut rng);
        let mut counts = CountTables::new(dtm.n_docs(), dtm.n_terms(), k);
        counts.set_global(&fitted.counts.snapshot_global());
        counts.init_docs_from_store(&store);
        let params = self.params(dtm.n_terms());

        let mut trainer = Trainer {
            n_iter: self.config.n_iter,
            convergence_tol: self.config.convergence_tol,
            n_check_convergence: self.config.n_check_convergence,
            cancel: self.cancel.as_deref(),
            sink: None,
        };
        trainer.run(
            &mut store,
            &mut counts,
            &params,
            SweepMode::Infer(&fitted.word_topics),
            &mut rng,
        )?;

        Ok(doc_topic_matrix(&counts, self.config.doc_topic_prior))
    }

    /// K×V topic-word distribution, each row summing to 1
    pub fn topic_word_distribution(&self) -> Result<Array2<f64>, LdaError> {
        let fitted = self.fitted()?;
        Ok(topic_word_matrix(
            &fitted.counts.n_wk,
            &fitted.counts.n_k,
            fitted.counts.n_terms(),
            self.config.n_topics,
            self.config.topic_word_prior,
        ))
    }

    /// D×K document-topic distribution, each row summing to 1
    pub fn doc_topic_distribution(&self) -> Result<Array2<f64>, LdaError> {
        let fitted = self.fitted()?;
        Ok(doc_topic_matrix(&fitted.counts, self.config.doc_topic_prior))
    }

    /// Ids of the training documents, in row order (may be empty)
    pub fn doc_ids(&self) -> Result<&[String], LdaError> {
        Ok(&self.fitted()?.doc_ids)
    }

    /// Topics with their `n_words` most probable words
    pub fn topics(&self, n_words: usize) -> Result<Vec<LdaTopic>, LdaError> {
        let fitted = self.fitted()?;
        let topic_word = self.topic_word_distribution()?;
        let total_tokens: f64 = fitted
            .counts
            .n_k
            .iter()
            .map(|&c| c as f64)
            .sum::<f64>()
            .max(1.0);

        let mut topics = Vec::with_capacity(self.config.n_topics);
        for k in 0..self.config.n_topics {
            let mut word_probs: Vec<(usize, f64)> = topic_word
                .row(k)
                .iter()
                .enumerate()
                .map(|(w, &p)| (w, p))
                .collect();
            word_probs.sort_by(|a, b| b.1.total_cmp(&a.1));
            word_probs.truncate(n_words);

            let top_words = word_probs
                .into_iter()
                .map(|(w, p)| (fitted.terms[w].clone(), p))
                .collect();

            topics.push(LdaTopic {
                index: k,
                top_words,
                prevalence: fitted.counts.n_k[k] as f64 / total_tokens,
            });
        }
        Ok(topics)
    }

    /// Perplexity of a corpus with the training shape under the fitted
    /// mixture; lower is better.
    pub fn perplexity(&self, dtm: &DocTermMatrix) -> Result<f64, LdaError> {
        let fitted = self.fitted()?;
        check_vocabulary(&fitted.terms, dtm.terms())?;
        if dtm.n_docs() != fitted.counts.n_docs() {
            return Err(LdaError::VocabularyMismatch(format!(
                "{} documents, but the model was fitted on {}",
                dtm.n_docs(),
                fitted.counts.n_docs()
            )));
        }

        let doc_topic = self.doc_topic_distribution()?;
        let topic_word = self.topic_word_distribution()?;

        let mut log_likelihood = 0.0;
        let mut total = 0.0;
        for d in 0..dtm.n_docs() {
            for (w, count) in dtm.row(d) {
                let mut p = 0.0;
                for k in 0..self.config.n_topics {
                    p += doc_topic[[d, k]] * topic_word[[k, w]];
                }
                log_likelihood += count as f64 * p.ln();
                total += count as f64;
            }
        }
        Ok((-log_likelihood / total.max(1.0)).exp())
    }

    /// Bundle of everything a visualization exporter consumes
    pub fn visualization_data(&self) -> Result<VisualizationData, LdaError> {
        let fitted = self.fitted()?;
        let topic_word = self.topic_word_distribution()?;
        let doc_topic = self.doc_topic_distribution()?;

        let k = self.config.n_topics;
        let mut term_frequency = vec![0u64; fitted.counts.n_terms()];
        for (w, freq) in term_frequency.iter_mut().enumerate() {
            *freq = (0..k)
                .map(|topic| fitted.counts.n_wk[fitted.counts.wk(w, topic)] as u64)
                .sum();
        }

        Ok(VisualizationData {
            topic_word: topic_word.outer_iter().map(|r| r.to_vec()).collect(),
            doc_topic: doc_topic.outer_iter().map(|r| r.to_vec()).collect(),
            doc_lengths: fitted.counts.doc_lengths(),
            vocab: fitted.terms.clone(),
            term_frequency,
        })
    }

    /// Persist the fitted state needed for later `transform` calls
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), LdaError> {
        let fitted = self.fitted()?;
        let global = fitted.counts.snapshot_global();
        let saved = SavedModel {
            terms: fitted.terms.clone(),
            n_topics: self.config.n_topics,
            doc_topic_prior: self.config.doc_topic_prior,
            topic_word_prior: self.config.topic_word_prior,
            n_wk: global.n_wk,
            n_k: global.n_k,
        };
        saved.save_binary(path)?;
        Ok(())
    }

    /// Restore a model saved with [`WarpLda::save`].
    ///
    /// The restored model carries no training corpus: it transforms new
    /// documents (bit-identically to the model that saved it, given the
    /// same seed) but has an empty document-topic matrix of its own.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LdaError> {
        let saved = SavedModel::load_binary(path)?;
        Self::from_saved(saved)
    }

    /// Rebuild a model from its persisted state
    pub fn from_saved(saved: SavedModel) -> Result<Self, LdaError> {
        saved.validate()?;
        let config = LdaConfig::new(saved.n_topics)
            .doc_topic_prior(saved.doc_topic_prior)
            .topic_word_prior(saved.topic_word_prior);
        config.validate()?;

        let n_terms = saved.terms.len();
        let global = saved.global_counts();
        let word_topics = WordTopicList::from_global(&global);
        let mut counts = CountTables::new(0, n_terms, saved.n_topics);
        counts.set_global(&global);

        Ok(Self {
            config,
            state: ModelState::Fitted(Box::new(FittedModel {
                terms: saved.terms,
                doc_ids: Vec::new(),
                store: TokenStore::empty(n_terms, saved.n_topics),
                counts,
                word_topics,
            })),
            report: None,
            cancel: None,
        })
    }
}

/// Reject corpora the sampler cannot run on
pub(crate) fn validate_corpus(dtm: &DocTermMatrix) -> Result<(), LdaError> {
    if dtm.n_docs() == 0 || dtm.n_terms() == 0 || dtm.n_tokens() == 0 {
        return Err(LdaError::EmptyCorpus);
    }
    if dtm.terms().is_empty() {
        return Err(LdaError::MissingVocabulary);
    }
    Ok(())
}

/// Require an exact, order-preserving vocabulary match
pub(crate) fn check_vocabulary(expected: &[String], got: &[String]) -> Result<(), LdaError> {
    if expected.len() != got.len() {
        return Err(LdaError::VocabularyMismatch(format!(
            "{} columns, but the model was fitted on {}",
            got.len(),
            expected.len()
        )));
    }
    for (i, (a, b)) in expected.iter().zip(got.iter()).enumerate() {
        if a != b {
            return Err(LdaError::VocabularyMismatch(format!(
                "column {i} is {b:?}, but the model was fitted with {a:?}"
            )));
        }
    }
    Ok(())
}

/// Normalize `n_dk` into the row-stochastic D×K doc-topic matrix
pub(crate) fn doc_topic_matrix(counts: &CountTables, alpha: f64) -> Array2<f64> {
    let (d_total, k) = (counts.n_docs(), counts.n_topics());
    let k_alpha = k as f64 * alpha;
    let mut out = Array2::zeros((d_total, k));
    for d in 0..d_total {
        let len: u64 = (0..k).map(|t| counts.n_dk[counts.dk(d, t)] as u64).sum();
        let denom = len as f64 + k_alpha;
        for t in 0..k {
            out[[d, t]] = (counts.n_dk[counts.dk(d, t)] as f64 + alpha) / denom;
        }
    }
    out
}

/// Normalize `n_wk` into the row-stochastic K×V topic-word matrix
pub(crate) fn topic_word_matrix(
    n_wk: &[u32],
    n_k: &[u32],
    n_terms: usize,
    n_topics: usize,
    beta: f64,
) -> Array2<f64> {
    let v_beta = n_terms as f64 * beta;
    let mut out = Array2::zeros((n_topics, n_terms));
    for k in 0..n_topics {
        let denom = n_k[k] as f64 + v_beta;
        for w in 0..n_terms {
            out[[k, w]] = (n_wk[w * n_topics + k] as f64 + beta) / denom;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use rand::Rng;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn tiny_two_topic_corpus() -> DocTermMatrix {
        // Doc 0 uses only {a, b}; doc 1 uses only {c, d}.
        let dense = array![[10.0, 10.0, 0.0, 0.0], [0.0, 0.0, 10.0, 10.0]];
        DocTermMatrix::from_dense(&dense, labels(&["a", "b", "c", "d"]), vec![]).unwrap()
    }

    fn random_corpus(n_docs: usize, n_terms: usize, seed: u64) -> DocTermMatrix {
        let mut rng = StdRng::seed_from_u64(seed);
        let dense = Array2::from_shape_fn((n_docs, n_terms), |_| {
            if rng.gen::<f64>() < 0.15 {
                rng.gen_range(1..4) as f64
            } else {
                0.0
            }
        });
        let terms = (0..n_terms).map(|i| format!("w{i}")).collect();
        DocTermMatrix::from_dense(&dense, terms, vec![]).unwrap()
    }

    /// Two blocks of documents over two disjoint word ranges
    fn block_corpus(docs_per_block: usize, words_per_block: usize, seed: u64) -> DocTermMatrix {
        let n_terms = 2 * words_per_block;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut dense = Array2::zeros((2 * docs_per_block, n_terms));
        for d in 0..2 * docs_per_block {
            let base = if d < docs_per_block { 0 } else { words_per_block };
            for _ in 0..6 {
                let w = base + rng.gen_range(0..words_per_block);
                dense[[d, w]] += 1.0;
            }
        }
        let terms = (0..n_terms).map(|i| format!("w{i}")).collect();
        DocTermMatrix::from_dense(&dense, terms, vec![]).unwrap()
    }

    fn assert_rows_stochastic(m: &Array2<f64>) {
        for row in m.outer_iter() {
            let sum: f64 = row.sum();
            assert!((sum - 1.0).abs() < 1e-9, "row sums to {sum}");
            assert!(row.iter().all(|&p| p >= 0.0));
        }
    }

    #[test]
    fn test_new_rejects_bad_hyperparameters() {
        assert!(matches!(
            WarpLda::new(LdaConfig::new(0)),
            Err(LdaError::InvalidHyperparameter(_))
        ));
        assert!(matches!(
            WarpLda::new(LdaConfig::new(2).doc_topic_prior(0.0)),
            Err(LdaError::InvalidHyperparameter(_))
        ));
        assert!(matches!(
            WarpLda::new(LdaConfig::new(2).topic_word_prior(-0.5)),
            Err(LdaError::InvalidHyperparameter(_))
        ));
        assert!(WarpLda::new(LdaConfig::new(2)).is_ok());
    }

    #[test]
    fn test_accessors_before_fit_fail() {
        let model = WarpLda::with_topics(3).unwrap();
        assert!(matches!(
            model.topic_word_distribution(),
            Err(LdaError::NotFitted)
        ));
        assert!(matches!(
            model.doc_topic_distribution(),
            Err(LdaError::NotFitted)
        ));
        assert!(matches!(
            model.transform(&tiny_two_topic_corpus()),
            Err(LdaError::NotFitted)
        ));
        assert!(!model.is_fitted());
    }

    #[test]
    fn test_fit_rejects_empty_and_unlabeled_corpora() {
        let mut model = WarpLda::with_topics(2).unwrap();

        let empty = DocTermMatrix::from_dense(&Array2::zeros((3, 4)), vec![], vec![]).unwrap();
        assert!(matches!(
            model.fit_transform(&empty),
            Err(LdaError::EmptyCorpus)
        ));

        let unlabeled =
            DocTermMatrix::from_dense(&array![[1.0, 2.0], [0.0, 1.0]], vec![], vec![]).unwrap();
        assert!(matches!(
            model.fit_transform(&unlabeled),
            Err(LdaError::MissingVocabulary)
        ));
    }

    #[test]
    fn test_tiny_corpus_separates_into_two_topics() {
        let dtm = tiny_two_topic_corpus();
        let config = LdaConfig::new(2)
            .doc_topic_prior(0.1)
            .topic_word_prior(0.1)
            .n_iter(300)
            .convergence_tol(-1.0)
            .seed(42);
        let mut model = WarpLda::new(config).unwrap();
        let doc_topic = model.fit_transform(&dtm).unwrap();

        assert_rows_stochastic(&doc_topic);
        assert_eq!(model.n_tokens().unwrap(), 40);

        let dominant0 = if doc_topic[[0, 0]] > doc_topic[[0, 1]] { 0 } else { 1 };
        let dominant1 = if doc_topic[[1, 0]] > doc_topic[[1, 1]] { 0 } else { 1 };
        assert_ne!(dominant0, dominant1, "documents share a dominant topic");
        assert!(doc_topic[[0, dominant0]] > 0.7, "{doc_topic:?}");
        assert!(doc_topic[[1, dominant1]] > 0.7, "{doc_topic:?}");
    }

    #[test]
    fn test_output_rows_sum_to_one() {
        let dtm = random_corpus(50, 100, 31);
        let config = LdaConfig::new(5)
            .n_iter(20)
            .convergence_tol(-1.0)
            .seed(7);
        let mut model = WarpLda::new(config).unwrap();
        let doc_topic = model.fit_transform(&dtm).unwrap();

        assert_rows_stochastic(&doc_topic);
        assert_rows_stochastic(&model.topic_word_distribution().unwrap());

        let topic_word = model.topic_word_distribution().unwrap();
        assert_eq!(topic_word.dim(), (5, 100));
        assert_eq!(doc_topic.dim(), (50, 5));
    }

    #[test]
    fn test_single_topic_is_trivially_stochastic() {
        let dtm = tiny_two_topic_corpus();
        let config = LdaConfig::new(1).n_iter(5).seed(1);
        let mut model = WarpLda::new(config).unwrap();
        let doc_topic = model.fit_transform(&dtm).unwrap();

        for d in 0..2 {
            assert!((doc_topic[[d, 0]] - 1.0).abs() < 1e-12);
        }
        assert_rows_stochastic(&model.topic_word_distribution().unwrap());
    }

    #[test]
    fn test_empty_document_gets_uniform_mixture() {
        let dense = array![[2.0, 1.0], [0.0, 0.0], [1.0, 2.0]];
        let dtm = DocTermMatrix::from_dense(&dense, labels(&["x", "y"]), vec![]).unwrap();
        let config = LdaConfig::new(4).n_iter(10).seed(3);
        let mut model = WarpLda::new(config).unwrap();
        let doc_topic = model.fit_transform(&dtm).unwrap();

        for k in 0..4 {
            assert!((doc_topic[[1, k]] - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn test_transform_requires_exact_vocabulary() {
        let dtm = tiny_two_topic_corpus();
        let mut model = WarpLda::new(LdaConfig::new(2).n_iter(20).seed(5)).unwrap();
        model.fit_transform(&dtm).unwrap();

        // Different label
        let drifted = DocTermMatrix::from_dense(
            &array![[1.0, 0.0, 0.0, 1.0]],
            labels(&["a", "b", "c", "e"]),
            vec![],
        )
        .unwrap();
        assert!(matches!(
            model.transform(&drifted),
            Err(LdaError::VocabularyMismatch(_))
        ));

        // Reordered labels
        let reordered = DocTermMatrix::from_dense(
            &array![[1.0, 0.0, 0.0, 1.0]],
            labels(&["b", "a", "c", "d"]),
            vec![],
        )
        .unwrap();
        assert!(matches!(
            model.transform(&reordered),
            Err(LdaError::VocabularyMismatch(_))
        ));

        // Missing column
        let narrow = DocTermMatrix::from_dense(
            &array![[1.0, 0.0, 0.0]],
            labels(&["a", "b", "c"]),
            vec![],
        )
        .unwrap();
        assert!(matches!(
            model.transform(&narrow),
            Err(LdaError::VocabularyMismatch(_))
        ));
    }

    #[test]
    fn test_transform_is_deterministic_for_fixed_seed() {
        let dtm = block_corpus(15, 10, 23);
        let config = LdaConfig::new(2)
            .n_iter(60)
            .convergence_tol(-1.0)
            .seed(17);
        let mut model = WarpLda::new(config).unwrap();
        model.fit_transform(&dtm).unwrap();

        let a = model.transform(&dtm).unwrap();
        let b = model.transform(&dtm).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_transform_stays_close_to_fit_output() {
        let dtm = block_corpus(30, 10, 41);
        let config = LdaConfig::new(2)
            .doc_topic_prior(0.1)
            .topic_word_prior(0.05)
            .n_iter(150)
            .convergence_tol(-1.0)
            .seed(11);
        let mut model = WarpLda::new(config).unwrap();
        let fit_output = model.fit_transform(&dtm).unwrap();
        let inferred = model.transform(&dtm).unwrap();

        assert_rows_stochastic(&inferred);
        let n_docs = dtm.n_docs();
        let mut total_l1 = 0.0;
        for d in 0..n_docs {
            for k in 0..2 {
                total_l1 += (fit_output[[d, k]] - inferred[[d, k]]).abs();
            }
        }
        let avg_l1 = total_l1 / n_docs as f64;
        assert!(avg_l1 < 0.35, "average row L1 distance {avg_l1}");
    }

    #[test]
    fn test_huge_word_prior_flattens_topic_word_rows() {
        // With β far above any count, P(w|k) approaches 1/V.
        let dtm = random_corpus(20, 25, 61);
        let config = LdaConfig::new(3)
            .topic_word_prior(1e6)
            .n_iter(10)
            .seed(8);
        let mut model = WarpLda::new(config).unwrap();
        model.fit_transform(&dtm).unwrap();

        let topic_word = model.topic_word_distribution().unwrap();
        for row in topic_word.outer_iter() {
            for &p in row {
                assert!((p - 1.0 / 25.0).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn test_huge_doc_prior_flattens_doc_topic_rows() {
        // With α far above any document length, P(k|d) approaches 1/K.
        let dtm = random_corpus(20, 25, 62);
        let config = LdaConfig::new(4)
            .doc_topic_prior(1e6)
            .n_iter(10)
            .seed(9);
        let mut model = WarpLda::new(config).unwrap();
        let doc_topic = model.fit_transform(&dtm).unwrap();

        for row in doc_topic.outer_iter() {
            for &p in row {
                assert!((p - 0.25).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn test_convergence_stops_training_early() {
        let dtm = random_corpus(30, 40, 13);
        let config = LdaConfig::new(3)
            .n_iter(1000)
            .convergence_tol(0.05)
            .n_check_convergence(10)
            .seed(29);
        let mut model = WarpLda::new(config).unwrap();
        model.fit_transform(&dtm).unwrap();

        let report = model.fit_report().unwrap();
        assert!(report.converged);
        assert!(report.iterations < 1000);
    }

    #[test]
    fn test_cancellation_returns_partial_model() {
        let dtm = random_corpus(20, 30, 3);
        let mut model = WarpLda::new(LdaConfig::new(3).n_iter(100).seed(2)).unwrap();

        let flag = Arc::new(AtomicBool::new(true));
        model.cancel_flag(flag);
        let doc_topic = model.fit_transform(&dtm).unwrap();

        assert!(model.is_fitted());
        assert_rows_stochastic(&doc_topic);
        let report = model.fit_report().unwrap();
        assert!(report.cancelled);
        assert_eq!(report.iterations, 0);
    }

    #[test]
    fn test_topics_report_top_words() {
        let dtm = tiny_two_topic_corpus();
        let config = LdaConfig::new(2)
            .doc_topic_prior(0.1)
            .topic_word_prior(0.1)
            .n_iter(300)
            .convergence_tol(-1.0)
            .seed(42);
        let mut model = WarpLda::new(config).unwrap();
        model.fit_transform(&dtm).unwrap();

        let topics = model.topics(2).unwrap();
        assert_eq!(topics.len(), 2);
        for topic in &topics {
            assert_eq!(topic.top_words.len(), 2);
            assert!(topic.prevalence > 0.0);
        }
        // The two topics' top pairs cover disjoint halves of the vocabulary.
        let pair: Vec<&str> = topics[0]
            .top_words
            .iter()
            .map(|(w, _)| w.as_str())
            .collect();
        assert!(
            pair == ["a", "b"] || pair == ["b", "a"] || pair == ["c", "d"] || pair == ["d", "c"],
            "unexpected top words {pair:?}"
        );
    }

    #[test]
    fn test_visualization_bundle_shapes() {
        let dtm = random_corpus(12, 18, 77);
        let mut model = WarpLda::new(LdaConfig::new(3).n_iter(15).seed(4)).unwrap();
        model.fit_transform(&dtm).unwrap();

        let viz = model.visualization_data().unwrap();
        assert_eq!(viz.topic_word.len(), 3);
        assert_eq!(viz.topic_word[0].len(), 18);
        assert_eq!(viz.doc_topic.len(), 12);
        assert_eq!(viz.vocab.len(), 18);
        assert_eq!(viz.term_frequency.len(), 18);
        let tokens: u64 = viz.doc_lengths.iter().sum();
        assert_eq!(tokens, dtm.n_tokens());
    }

    #[test]
    fn test_save_load_roundtrip_preserves_distributions() {
        let dtm = block_corpus(10, 8, 19);
        let config = LdaConfig::new(2).n_iter(80).convergence_tol(-1.0).seed(33);
        let mut model = WarpLda::new(config).unwrap();
        model.fit_transform(&dtm).unwrap();

        let path = std::env::temp_dir().join("warplda_roundtrip_test.bin");
        model.save(&path).unwrap();
        let restored = WarpLda::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        // Topic-word distributions are identical bit for bit.
        assert_eq!(
            model.topic_word_distribution().unwrap(),
            restored.topic_word_distribution().unwrap()
        );

        // Inference through the restored model matches exactly when the
        // seed matches.
        let mut original = model;
        original.config.seed = Some(55);
        let mut restored = restored;
        restored.config.seed = Some(55);
        restored.config.n_iter = original.config.n_iter;
        restored.config.convergence_tol = original.config.convergence_tol;
        restored.config.n_check_convergence = original.config.n_check_convergence;
        assert_eq!(
            original.transform(&dtm).unwrap(),
            restored.transform(&dtm).unwrap()
        );
    }

    #[test]
    fn test_perplexity_is_finite_and_positive() {
        let dtm = block_corpus(10, 8, 3);
        let mut model = WarpLda::new(LdaConfig::new(2).n_iter(50).seed(9)).unwrap();
        model.fit_transform(&dtm).unwrap();

        let perplexity = model.perplexity(&dtm).unwrap();
        assert!(perplexity.is_finite());
        assert!(perplexity > 0.0);
    }
}
