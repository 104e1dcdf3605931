//! Proposal distributions and acceptance ratios
//!
//! WarpLDA replaces the O(K) categorical draw of collapsed Gibbs with
//! two proposal distributions that each take O(1) to sample:
//!
//! - document proposal `q_d(k) ∝ n_dk[d][k] + α`
//! - word proposal     `q_w(k) ∝ n_wk[w][k] + β`
//!
//! Both are mixtures of an empirical part (the topic of a uniformly
//! chosen existing token) and a uniform smoothing part, so a single
//! uniform variate picks the branch and the sample. A Metropolis-
//! Hastings correction then targets the collapsed posterior
//! `p(k) ∝ (n_dk+α)(n_wk+β)/(n_k+Vβ)`; the proposal's own factor
//! cancels out of the ratio, leaving two multiplies and a divide.

use rand::rngs::StdRng;
use rand::Rng;

use super::SamplerParams;

/// Draw from the document proposal given the current topics of the
/// document's tokens (`z_doc` mirrors the live `n_dk` row).
#[inline]
pub(crate) fn draw_doc_proposal(
    z_doc: &[u32],
    params: &SamplerParams,
    rng: &mut StdRng,
) -> u32 {
    let len = z_doc.len() as f64;
    let r = rng.gen::<f64>() * (len + params.n_topics as f64 * params.alpha);
    if r < len {
        // Reuse the variate as the token index.
        z_doc[(r as usize).min(z_doc.len() - 1)]
    } else {
        rng.gen_range(0..params.n_topics) as u32
    }
}

/// Draw from the word proposal given the topics currently held by the
/// word's `cnt` tokens. `topic_at` resolves the i-th token's topic,
/// through the live store during training or a frozen list during
/// inference.
#[inline]
pub(crate) fn draw_word_proposal(
    cnt: usize,
    topic_at: impl Fn(usize) -> u32,
    params: &SamplerParams,
    rng: &mut StdRng,
) -> u32 {
    let cnt_f = cnt as f64;
    let r = rng.gen::<f64>() * (cnt_f + params.n_topics as f64 * params.beta);
    if r < cnt_f {
        topic_at((r as usize).min(cnt - 1))
    } else {
        rng.gen_range(0..params.n_topics) as u32
    }
}

/// Acceptance ratio for a document-proposal move `s -> t`.
///
/// The `n_dk` factors of target and proposal cancel; what remains reads
/// only the (stale) word-side counts.
#[inline]
pub(crate) fn doc_accept_ratio(
    params: &SamplerParams,
    n_wk_ws: u32,
    n_wk_wt: u32,
    n_k_s: u32,
    n_k_t: u32,
) -> f64 {
    ((n_wk_wt as f64 + params.beta) * (n_k_s as f64 + params.v_beta))
        / ((n_wk_ws as f64 + params.beta) * (n_k_t as f64 + params.v_beta))
}

/// Acceptance ratio for a word-proposal move `s -> t`.
///
/// The `n_wk` factors cancel; what remains reads the (stale) document
/// row and the topic totals.
#[inline]
pub(crate) fn word_accept_ratio(
    params: &SamplerParams,
    n_dk_ds: u32,
    n_dk_dt: u32,
    n_k_s: u32,
    n_k_t: u32,
) -> f64 {
    ((n_dk_dt as f64 + params.alpha) * (n_k_s as f64 + params.v_beta))
        / ((n_dk_ds as f64 + params.alpha) * (n_k_t as f64 + params.v_beta))
}

/// One Metropolis-Hastings accept/reject step
#[inline]
pub(crate) fn mh_accept(ratio: f64, rng: &mut StdRng) -> bool {
    ratio >= 1.0 || rng.gen::<f64>() < ratio
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn params(k: usize, alpha: f64, beta: f64, v: usize) -> SamplerParams {
        SamplerParams::new(k, alpha, beta, v)
    }

    #[test]
    fn test_doc_proposal_matches_smoothed_counts() {
        // Document with topics [0, 0, 0, 1]; q_d(k) ∝ n_dk + α.
        let z_doc = [0u32, 0, 0, 1];
        let p = params(2, 0.5, 0.1, 10);
        let mut rng = StdRng::seed_from_u64(99);

        let draws = 200_000;
        let mut hits = [0usize; 2];
        for _ in 0..draws {
            hits[draw_doc_proposal(&z_doc, &p, &mut rng) as usize] += 1;
        }

        // Expected: (3 + 0.5) / 5 = 0.7 and (1 + 0.5) / 5 = 0.3.
        let p0 = hits[0] as f64 / draws as f64;
        assert!((p0 - 0.7).abs() < 0.01, "p0 = {p0}");
    }

    #[test]
    fn test_word_proposal_smoothing_only_for_unseen_word() {
        // A word with no tokens draws uniformly from the smoothing mass.
        let p = params(4, 0.1, 0.25, 10);
        let mut rng = StdRng::seed_from_u64(5);

        let draws = 100_000;
        let mut hits = [0usize; 4];
        for _ in 0..draws {
            hits[draw_word_proposal(0, |_| unreachable!(), &p, &mut rng) as usize] += 1;
        }
        for &h in &hits {
            let frac = h as f64 / draws as f64;
            assert!((frac - 0.25).abs() < 0.01, "frac = {frac}");
        }
    }

    #[test]
    fn test_word_proposal_matches_smoothed_counts() {
        // Word with topics [1, 1, 2]; q_w(k) ∝ n_wk + β with Kβ = 1,
        // so expected masses are (0.25, 2.25, 1.25, 0.25) / 4.
        let topics = [1u32, 1, 2];
        let p = params(4, 0.1, 0.25, 10);
        let mut rng = StdRng::seed_from_u64(21);

        let draws = 200_000;
        let mut hits = [0usize; 4];
        for _ in 0..draws {
            hits[draw_word_proposal(3, |i| topics[i], &p, &mut rng) as usize] += 1;
        }
        let p1 = hits[1] as f64 / draws as f64;
        let p2 = hits[2] as f64 / draws as f64;
        assert!((p1 - 2.25 / 4.0).abs() < 0.01, "p1 = {p1}");
        assert!((p2 - 1.25 / 4.0).abs() < 0.01, "p2 = {p2}");
    }

    #[test]
    fn test_accept_ratio_is_one_for_self_move() {
        let p = params(3, 0.1, 0.1, 20);
        assert!((doc_accept_ratio(&p, 4, 4, 9, 9) - 1.0).abs() < 1e-12);
        assert!((word_accept_ratio(&p, 4, 4, 9, 9) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_doc_ratio_favors_better_word_fit() {
        // Moving to a topic where the word is common and the topic is
        // not crowded must have ratio > 1.
        let p = params(2, 0.1, 0.1, 20);
        let ratio = doc_accept_ratio(&p, 0, 10, 50, 50);
        assert!(ratio > 1.0);
    }

    #[test]
    fn test_mh_accept_always_takes_ratio_above_one() {
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..100 {
            assert!(mh_accept(1.5, &mut rng));
        }
    }
}
