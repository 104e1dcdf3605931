//! Doc and word sweeps
//!
//! A sweep visits every token once. The doc sweep walks documents in
//! order and resamples with the document proposal; the word sweep walks
//! words in order and resamples with the word proposal. Only the active
//! side's count table moves during a sweep; the other side is a stale
//! snapshot, which is what lets the passes run with perfect memory
//! locality and lets shards run them concurrently. Once the pass is
//! done, the recorded `(z_old, z_new)` transitions are replayed into the
//! stale table so every table reflects the current assignments again at
//! sweep boundaries.

use rand::rngs::StdRng;

use super::proposal::{
    doc_accept_ratio, draw_doc_proposal, draw_word_proposal, mh_accept, word_accept_ratio,
};
use super::{SamplerParams, SweepMode};
use crate::corpus::counts::CountTables;
use crate::corpus::tokens::TokenStore;

/// Resample every token with the document proposal.
///
/// Updates `n_dk` in place as tokens move; `n_wk`/`n_k` stay frozen for
/// the whole pass and are reconciled afterwards (training mode only).
pub fn doc_sweep(
    store: &mut TokenStore,
    counts: &mut CountTables,
    params: &SamplerParams,
    mode: SweepMode,
    rng: &mut StdRng,
) {
    for d in 0..store.n_docs() {
        let range = store.doc_range(d);
        if range.is_empty() {
            continue;
        }
        for t in range.clone() {
            let s = store.z_new[t];
            let w = store.words[t] as usize;

            let proposed = {
                let z_doc = &store.z_new[range.clone()];
                draw_doc_proposal(z_doc, params, rng)
            };

            let ws = counts.wk(w, s as usize);
            let wt = counts.wk(w, proposed as usize);
            let ratio = doc_accept_ratio(
                params,
                counts.n_wk[ws],
                counts.n_wk[wt],
                counts.n_k[s as usize],
                counts.n_k[proposed as usize],
            );
            let accepted = if mh_accept(ratio, rng) { proposed } else { s };

            store.z_old[t] = s;
            store.z_new[t] = accepted;
            if accepted != s {
                let from = counts.dk(d, s as usize);
                let to = counts.dk(d, accepted as usize);
                counts.n_dk[from] -= 1;
                counts.n_dk[to] += 1;
            }
        }
    }

    if mode.update_topics() {
        reconcile_word_counts(store, counts);
    }
}

/// Resample every token with the word proposal.
///
/// Updates `n_wk`/`n_k` in place (training mode; inference keeps them
/// frozen); `n_dk` stays a stale snapshot for the pass and is
/// reconciled afterwards.
pub fn word_sweep(
    store: &mut TokenStore,
    counts: &mut CountTables,
    params: &SamplerParams,
    mode: SweepMode,
    rng: &mut StdRng,
) {
    for w in 0..store.n_terms() {
        let idx_range = store.word_offsets[w]..store.word_offsets[w + 1];
        if idx_range.is_empty() {
            continue;
        }
        for idx in idx_range.clone() {
            let t = store.word_tokens[idx] as usize;
            let s = store.z_new[t];
            let d = store.docs[t] as usize;

            let proposed = match mode {
                SweepMode::Train => {
                    let z = &store.z_new;
                    let toks = &store.word_tokens[idx_range.clone()];
                    draw_word_proposal(toks.len(), |i| z[toks[i] as usize], params, rng)
                }
                SweepMode::Infer(frozen) => {
                    let topics = frozen.topics_of(w);
                    draw_word_proposal(topics.len(), |i| topics[i], params, rng)
                }
            };

            let ds = counts.dk(d, s as usize);
            let dt = counts.dk(d, proposed as usize);
            let ratio = word_accept_ratio(
                params,
                counts.n_dk[ds],
                counts.n_dk[dt],
                counts.n_k[s as usize],
                counts.n_k[proposed as usize],
            );
            let accepted = if mh_accept(ratio, rng) { proposed } else { s };

            store.z_old[t] = s;
            store.z_new[t] = accepted;
            if accepted != s && mode.update_topics() {
                let from = counts.wk(w, s as usize);
                let to = counts.wk(w, accepted as usize);
                counts.n_wk[from] -= 1;
                counts.n_wk[to] += 1;
                counts.n_k[s as usize] -= 1;
                counts.n_k[accepted as usize] += 1;
            }
        }
    }

    reconcile_doc_counts(store, counts);
}

/// Replay this sweep's topic transitions into the word-side tables
fn reconcile_word_counts(store: &TokenStore, counts: &mut CountTables) {
    for t in 0..store.n_tokens() {
        let old = store.z_old[t];
        let new = store.z_new[t];
        if old != new {
            let w = store.words[t] as usize;
            let from = counts.wk(w, old as usize);
            let to = counts.wk(w, new as usize);
            counts.n_wk[from] -= 1;
            counts.n_wk[to] += 1;
            counts.n_k[old as usize] -= 1;
            counts.n_k[new as usize] += 1;
        }
    }
}

/// Replay this sweep's topic transitions into `n_dk`
fn reconcile_doc_counts(store: &TokenStore, counts: &mut CountTables) {
    for t in 0..store.n_tokens() {
        let old = store.z_old[t];
        let new = store.z_new[t];
        if old != new {
            let d = store.docs[t] as usize;
            let from = counts.dk(d, old as usize);
            let to = counts.dk(d, new as usize);
            counts.n_dk[from] -= 1;
            counts.n_dk[to] += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::counts::WordTopicList;
    use crate::corpus::sparse::DocTermMatrix;
    use ndarray::Array2;
    use rand::Rng;
    use rand::SeedableRng;

    fn random_corpus(n_docs: usize, n_terms: usize, seed: u64) -> DocTermMatrix {
        let mut rng = StdRng::seed_from_u64(seed);
        let dense = Array2::from_shape_fn((n_docs, n_terms), |_| {
            if rng.gen::<f64>() < 0.2 {
                rng.gen_range(1..4) as f64
            } else {
                0.0
            }
        });
        DocTermMatrix::from_dense(&dense, vec![], vec![]).unwrap()
    }

    fn doc_lengths_match(store: &TokenStore, counts: &CountTables) -> bool {
        (0..store.n_docs())
            .all(|d| counts.doc_lengths()[d] == store.doc_len(d) as u64)
    }

    #[test]
    fn test_sweeps_preserve_count_invariants() {
        let dtm = random_corpus(40, 60, 3);
        let mut rng = StdRng::seed_from_u64(17);
        let mut store = TokenStore::build(&dtm, 5, &mut rng);
        let mut counts = CountTables::new(40, 60, 5);
        counts.init_from_store(&store);
        let params = SamplerParams::new(5, 0.1, 0.05, 60);

        for _ in 0..50 {
            doc_sweep(&mut store, &mut counts, &params, SweepMode::Train, &mut rng);
            assert!(counts.sums_consistent());
            assert!(doc_lengths_match(&store, &counts));

            word_sweep(&mut store, &mut counts, &params, SweepMode::Train, &mut rng);
            assert!(counts.sums_consistent());
            assert!(doc_lengths_match(&store, &counts));
        }
    }

    #[test]
    fn test_counts_reflect_assignments_after_each_sweep() {
        let dtm = random_corpus(15, 25, 9);
        let mut rng = StdRng::seed_from_u64(2);
        let mut store = TokenStore::build(&dtm, 3, &mut rng);
        let mut counts = CountTables::new(15, 25, 3);
        counts.init_from_store(&store);
        let params = SamplerParams::new(3, 0.2, 0.1, 25);

        for _ in 0..10 {
            doc_sweep(&mut store, &mut counts, &params, SweepMode::Train, &mut rng);
            let mut rebuilt = CountTables::new(15, 25, 3);
            rebuilt.init_from_store(&store);
            assert_eq!(rebuilt.n_wk, counts.n_wk);
            assert_eq!(rebuilt.n_dk, counts.n_dk);
            assert_eq!(rebuilt.n_k, counts.n_k);

            word_sweep(&mut store, &mut counts, &params, SweepMode::Train, &mut rng);
            let mut rebuilt = CountTables::new(15, 25, 3);
            rebuilt.init_from_store(&store);
            assert_eq!(rebuilt.n_wk, counts.n_wk);
            assert_eq!(rebuilt.n_dk, counts.n_dk);
            assert_eq!(rebuilt.n_k, counts.n_k);
        }
    }

    #[test]
    fn test_inference_never_touches_word_counts() {
        let dtm = random_corpus(20, 30, 5);
        let mut rng = StdRng::seed_from_u64(8);

        // Pretend these are fitted global counts.
        let mut fitted_store = TokenStore::build(&dtm, 4, &mut rng);
        let mut fitted = CountTables::new(20, 30, 4);
        fitted.init_from_store(&fitted_store);
        let params = SamplerParams::new(4, 0.1, 0.1, 30);
        doc_sweep(
            &mut fitted_store,
            &mut fitted,
            &params,
            SweepMode::Train,
            &mut rng,
        );
        let global = fitted.snapshot_global();
        let frozen = WordTopicList::from_global(&global);

        // New documents against the frozen word side.
        let new_dtm = random_corpus(10, 30, 6);
        let mut store = TokenStore::build(&new_dtm, 4, &mut rng);
        let mut counts = CountTables::new(10, 30, 4);
        counts.set_global(&global);
        counts.init_docs_from_store(&store);

        for _ in 0..5 {
            doc_sweep(
                &mut store,
                &mut counts,
                &params,
                SweepMode::Infer(&frozen),
                &mut rng,
            );
            word_sweep(
                &mut store,
                &mut counts,
                &params,
                SweepMode::Infer(&frozen),
                &mut rng,
            );
            assert_eq!(counts.n_wk, global.n_wk);
            assert_eq!(counts.n_k, global.n_k);
            assert!(doc_lengths_match(&store, &counts));
        }
    }

    #[test]
    fn test_empty_corpus_sweeps_are_noops() {
        let dense = Array2::zeros((3, 4));
        let dtm = DocTermMatrix::from_dense(&dense, vec![], vec![]).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let mut store = TokenStore::build(&dtm, 2, &mut rng);
        let mut counts = CountTables::new(3, 4, 2);
        counts.init_from_store(&store);
        let params = SamplerParams::new(2, 0.1, 0.1, 4);

        doc_sweep(&mut store, &mut counts, &params, SweepMode::Train, &mut rng);
        word_sweep(&mut store, &mut counts, &params, SweepMode::Train, &mut rng);
        assert!(counts.n_k.iter().all(|&c| c == 0));
    }
}
