//! Trainer loop
//!
//! Alternates doc and word sweeps for a configured number of iterations,
//! periodically probing a pseudo-log-likelihood to decide whether the
//! chain has settled. The probe is the collapsed log-marginal of the
//! side the run is actually moving: the topic-word tables during
//! training, the document-topic tables during inference (where the word
//! side is frozen and its marginal would be constant).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use thiserror::Error;

use super::sweep::{doc_sweep, word_sweep};
use super::{SamplerParams, SweepMode};
use crate::corpus::counts::CountTables;
use crate::corpus::tokens::TokenStore;
use crate::utils::math::ln_gamma;

/// The likelihood probe left the representable range
#[derive(Error, Debug, Clone, Copy)]
#[error("pseudo-log-likelihood became non-finite at iteration {iter}")]
pub struct NumericalError {
    pub iter: usize,
}

/// Receives `(iteration, pseudo-log-likelihood, elapsed)` after each
/// convergence check.
pub trait ProgressSink {
    fn report(&mut self, iter: usize, log_likelihood: f64, elapsed: Duration);
}

/// Progress sink that routes checks to the `log` facade at info level
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&mut self, iter: usize, log_likelihood: f64, elapsed: Duration) {
        log::info!(
            "iteration {iter}: pseudo-log-likelihood {log_likelihood:.4} ({:.2}s elapsed)",
            elapsed.as_secs_f64()
        );
    }
}

/// What a training run did and saw.
#[derive(Debug, Clone, Default)]
pub struct TrainReport {
    /// Completed iterations (may be short of the request on early stop)
    pub iterations: usize,
    /// `(iteration, pseudo-log-likelihood)` at each convergence check
    pub history: Vec<(usize, f64)>,
    /// True when the relative-change test stopped the run
    pub converged: bool,
    /// True when a cancellation flag stopped the run
    pub cancelled: bool,
}

/// Relative-change convergence test on two consecutive probe values.
/// Both values are negative; a negative tolerance disables the test.
pub(crate) fn has_converged(prev: f64, curr: f64, tol: f64) -> bool {
    tol >= 0.0 && prev / curr - 1.0 < tol
}

/// Collapsed log-marginal of the topic-word tables (training probe)
pub fn word_side_log_likelihood(counts: &CountTables, params: &SamplerParams) -> f64 {
    let k = params.n_topics;
    let lg_beta = ln_gamma(params.beta);

    let mut ll = k as f64 * ln_gamma(params.v_beta);
    for topic in 0..k {
        ll -= ln_gamma(counts.n_k[topic] as f64 + params.v_beta);
    }
    for w in 0..counts.n_terms() {
        for topic in 0..k {
            let c = counts.n_wk[counts.wk(w, topic)];
            if c > 0 {
                ll += ln_gamma(c as f64 + params.beta) - lg_beta;
            }
        }
    }
    ll
}

/// Collapsed log-marginal of the document-topic tables (inference probe)
pub fn doc_side_log_likelihood(counts: &CountTables, params: &SamplerParams) -> f64 {
    let k = params.n_topics;
    let k_alpha = k as f64 * params.alpha;
    let lg_alpha = ln_gamma(params.alpha);

    let mut ll = counts.n_docs() as f64 * ln_gamma(k_alpha);
    for d in 0..counts.n_docs() {
        let mut len = 0u64;
        for topic in 0..k {
            let c = counts.n_dk[counts.dk(d, topic)];
            len += c as u64;
            if c > 0 {
                ll += ln_gamma(c as f64 + params.alpha) - lg_alpha;
            }
        }
        ll -= ln_gamma(len as f64 + k_alpha);
    }
    ll
}

/// Probe appropriate to the sweep mode
pub fn pseudo_log_likelihood(
    counts: &CountTables,
    params: &SamplerParams,
    mode: SweepMode,
) -> f64 {
    match mode {
        SweepMode::Train => word_side_log_likelihood(counts, params),
        SweepMode::Infer(_) => doc_side_log_likelihood(counts, params),
    }
}

/// Drives sweeps over one token store until the iteration budget runs
/// out, the chain converges, or a cancellation flag is raised.
pub struct Trainer<'a> {
    pub n_iter: usize,
    pub convergence_tol: f64,
    pub n_check_convergence: usize,
    pub cancel: Option<&'a AtomicBool>,
    pub sink: Option<&'a mut dyn ProgressSink>,
}

impl Trainer<'_> {
    fn is_cancelled(&self) -> bool {
        self.cancel.map_or(false, |f| f.load(Ordering::Relaxed))
    }

    /// Run the sweep schedule. Cancellation is not an error: the report
    /// flags it and the tables are left in a consistent state (sweeps
    /// restore all count invariants at their boundaries).
    pub fn run(
        &mut self,
        store: &mut TokenStore,
        counts: &mut CountTables,
        params: &SamplerParams,
        mode: SweepMode,
        rng: &mut StdRng,
    ) -> Result<TrainReport, NumericalError> {
        let start = Instant::now();
        let mut report = TrainReport::default();
        let mut prev: Option<f64> = None;

        for i in 1..=self.n_iter {
            if self.is_cancelled() {
                report.cancelled = true;
                break;
            }
            doc_sweep(store, counts, params, mode, rng);

            if self.is_cancelled() {
                report.cancelled = true;
                break;
            }
            word_sweep(store, counts, params, mode, rng);
            report.iterations = i;

            if i % self.n_check_convergence == 0 {
                let ll = pseudo_log_likelihood(counts, params, mode);
                if !ll.is_finite() {
                    return Err(NumericalError { iter: i });
                }
                log::debug!("iteration {i}/{}: pseudo-log-likelihood {ll:.4}", self.n_iter);
                if let Some(sink) = self.sink.as_deref_mut() {
                    sink.report(i, ll, start.elapsed());
                }
                report.history.push((i, ll));

                if let Some(p) = prev {
                    if has_converged(p, ll, self.convergence_tol) {
                        report.converged = true;
                        break;
                    }
                }
                prev = Some(ll);
            }
        }

        Ok(report)
    }
}
