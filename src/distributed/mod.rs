//! Shard-parallel training
//!
//! Documents are partitioned into contiguous shards, one per worker.
//! Each outer iteration broadcasts the global word-side counts to every
//! worker; workers install the broadcast, run one doc sweep and one word
//! sweep over their own shard, and hand back the signed count delta
//! their moves produced plus (on check iterations) their local
//! pseudo-log-likelihood. The coordinator folds the deltas into the
//! global tables by element-wise addition, which is exact because shards
//! own disjoint token sets, and sums the per-shard scores.
//!
//! Document-topic counts are never shared between workers; the
//! coordinator gathers them into one global matrix after the last
//! round. A single-worker run is bit-identical to `WarpLda` with the
//! same seed.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::corpus::counts::{CountDelta, CountTables, GlobalCounts};
use crate::corpus::sparse::DocTermMatrix;
use crate::corpus::tokens::TokenStore;
use crate::models::lda::{
    check_vocabulary, doc_topic_matrix, topic_word_matrix, validate_corpus, LdaConfig, LdaError,
};
use crate::sampler::sweep::{doc_sweep, word_sweep};
use crate::sampler::trainer::{has_converged, word_side_log_likelihood, ProgressSink};
use crate::sampler::{SamplerParams, SweepMode};

/// One worker's private state: a document shard, its token store, and
/// count tables whose word side mirrors the last broadcast.
struct ShardWorker {
    store: TokenStore,
    counts: CountTables,
    rng: StdRng,
}

impl ShardWorker {
    /// One outer round: install the broadcast, sweep both directions
    /// over the shard, and report the resulting delta (and score when
    /// asked). The coordinator only ever observes the shard between
    /// rounds, never mid-sweep.
    fn run_round(
        &mut self,
        global: &GlobalCounts,
        params: &SamplerParams,
        compute_score: bool,
    ) -> (CountDelta, Option<f64>) {
        self.counts.set_global(global);
        doc_sweep(
            &mut self.store,
            &mut self.counts,
            params,
            SweepMode::Train,
            &mut self.rng,
        );
        word_sweep(
            &mut self.store,
            &mut self.counts,
            params,
            SweepMode::Train,
            &mut self.rng,
        );
        let score = if compute_score {
            Some(word_side_log_likelihood(&self.counts, params))
        } else {
            None
        };
        (self.counts.local_delta(), score)
    }
}

/// Contiguous shard boundaries: the first `n_docs % n_shards` shards
/// take one extra document.
fn shard_bounds(n_docs: usize, n_shards: usize) -> Vec<(usize, usize)> {
    let base = n_docs / n_shards;
    let extra = n_docs % n_shards;
    let mut bounds = Vec::with_capacity(n_shards);
    let mut start = 0;
    for i in 0..n_shards {
        let len = base + usize::from(i < extra);
        bounds.push((start, start + len));
        start += len;
    }
    bounds
}

/// Fitted state gathered from all shards after the last round
struct DistributedFit {
    terms: Vec<String>,
    counts: CountTables,
    history: Vec<(usize, f64)>,
    converged: bool,
    cancelled: bool,
    iterations: usize,
}

/// Data-parallel WarpLDA over disjoint document shards.
///
/// Shares `LdaConfig` with the single-model facade; `n_workers` picks
/// the shard count. Workers run concurrently via a rayon pool, each
/// with its own deterministically derived RNG stream.
pub struct DistributedLda {
    config: LdaConfig,
    n_workers: usize,
    fitted: Option<DistributedFit>,
    cancel: Option<Arc<AtomicBool>>,
}

impl DistributedLda {
    /// Create an unfitted distributed model
    pub fn new(config: LdaConfig, n_workers: usize) -> Result<Self, LdaError> {
        config.validate()?;
        if n_workers < 1 {
            return Err(LdaError::InvalidHyperparameter(
                "n_workers must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            config,
            n_workers,
            fitted: None,
            cancel: None,
        })
    }

    /// Install a cooperative cancellation flag, checked between rounds
    pub fn cancel_flag(&mut self, flag: Arc<AtomicBool>) {
        self.cancel = Some(flag);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map_or(false, |f| f.load(Ordering::Relaxed))
    }

    /// Fit across shards and return the gathered D×K document-topic
    /// distribution.
    pub fn fit_transform(&mut self, dtm: &DocTermMatrix) -> Result<Array2<f64>, LdaError> {
        validate_corpus(dtm)?;

        let k = self.config.n_topics;
        let n_terms = dtm.n_terms();
        let n_docs = dtm.n_docs();
        let n_shards = self.n_workers.min(n_docs);
        let params = SamplerParams::new(
            k,
            self.config.doc_topic_prior,
            self.config.topic_word_prior,
            n_terms,
        );
        let base_seed = match self.config.seed {
            Some(seed) => seed,
            None => StdRng::from_entropy().gen(),
        };

        let mut workers: Vec<ShardWorker> = shard_bounds(n_docs, n_shards)
            .into_iter()
            .enumerate()
            .map(|(i, (lo, hi))| {
                let shard = dtm.slice_rows(lo, hi);
                let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(i as u64));
                let store = TokenStore::build(&shard, k, &mut rng);
                let mut counts = CountTables::new(shard.n_docs(), n_terms, k);
                counts.init_from_store(&store);
                ShardWorker { store, counts, rng }
            })
            .collect();

        // Initial global word-side counts: the sum of shard counts.
        let mut global = GlobalCounts::zeros(n_terms, k);
        for worker in &workers {
            global.accumulate(&worker.counts.snapshot_global());
        }

        let start = Instant::now();
        let mut progress = crate::sampler::trainer::LogProgress;
        let mut history = Vec::new();
        let mut prev: Option<f64> = None;
        let mut converged = false;
        let mut cancelled = false;
        let mut iterations = 0;

        for i in 1..=self.config.n_iter {
            if self.is_cancelled() {
                cancelled = true;
                break;
            }
            let compute_score = i % self.config.n_check_convergence == 0;

            let results: Vec<(CountDelta, Option<f64>)> = workers
                .par_iter_mut()
                .map(|worker| worker.run_round(&global, &params, compute_score))
                .collect();
            for (delta, _) in &results {
                global.apply_delta(delta);
            }
            iterations = i;

            if compute_score {
                let score: f64 = results.iter().filter_map(|(_, s)| *s).sum();
                if !score.is_finite() {
                    return Err(LdaError::Numerical { iter: i });
                }
                log::debug!(
                    "round {i}/{}: summed shard pseudo-log-likelihood {score:.4}",
                    self.config.n_iter
                );
                if self.config.verbose {
                    progress.report(i, score, start.elapsed());
                }
                history.push((i, score));

                if let Some(p) = prev {
                    if has_converged(p, score, self.config.convergence_tol) {
                        converged = true;
                        break;
                    }
                }
                prev = Some(score);
            }
        }

        // Gather the never-shared document-side counts into one table.
        let mut counts = CountTables::new(n_docs, n_terms, k);
        counts.n_wk.copy_from_slice(&global.n_wk);
        counts.n_k.copy_from_slice(&global.n_k);
        let mut offset = 0;
        for worker in &workers {
            let len = worker.counts.n_dk.len();
            counts.n_dk[offset..offset + len].copy_from_slice(&worker.counts.n_dk);
            offset += len;
        }

        self.fitted = Some(DistributedFit {
            terms: dtm.terms().to_vec(),
            counts,
            history,
            converged,
            cancelled,
            iterations,
        });

        self.doc_topic_distribution()
    }

    fn fitted(&self) -> Result<&DistributedFit, LdaError> {
        self.fitted.as_ref().ok_or(LdaError::NotFitted)
    }

    /// D×K document-topic distribution gathered across shards
    pub fn doc_topic_distribution(&self) -> Result<Array2<f64>, LdaError> {
        let fitted = self.fitted()?;
        Ok(doc_topic_matrix(
            &fitted.counts,
            self.config.doc_topic_prior,
        ))
    }

    /// K×V topic-word distribution from the merged global counts
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

    /// `(round, summed shard score)` at each convergence check
    pub fn log_likelihood_history(&self) -> &[(usize, f64)] {
        self.fitted.as_ref().map_or(&[], |f| &f.history)
    }

    /// Completed rounds of the last fit
    pub fn iterations_run(&self) -> Option<usize> {
        self.fitted.as_ref().map(|f| f.iterations)
    }

    /// Whether the last fit stopped on the convergence test
    pub fn converged(&self) -> Option<bool> {
        self.fitted.as_ref().map(|f| f.converged)
    }

    /// Whether the last fit was cancelled
    pub fn cancelled(&self) -> Option<bool> {
        self.fitted.as_ref().map(|f| f.cancelled)
    }

    /// Vocabulary the model was fitted on
    pub fn vocabulary(&self) -> Result<&[String], LdaError> {
        Ok(&self.fitted()?.terms)
    }

    /// Check a matrix against the fitted vocabulary
    pub fn check_input(&self, dtm: &DocTermMatrix) -> Result<(), LdaError> {
        check_vocabulary(&self.fitted()?.terms, dtm.terms())
    }
}
