//! Numeric helpers

/// Natural log of the gamma function, Lanczos approximation (g = 7).
///
/// Accurate to ~1e-13 over the positive reals, which is far below the
/// tolerance the likelihood probe needs. Arguments below 0.5 go through
/// the reflection formula.
pub fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 8] = [
        676.5203681218851,
        -1259.1392167224028,
        771.32342877765313,
        -176.61502916214059,
        12.507343278686905,
        -0.13857109526572012,
        9.9843695780195716e-6,
        1.5056327351493116e-7,
    ];
    const SQRT_TWO_PI: f64 = 2.5066282746310002;

    if x < 0.5 {
        // lnGamma(x) = ln(pi / sin(pi x)) - lnGamma(1 - x)
        let sin_term = (std::f64::consts::PI * x).sin();
        return (std::f64::consts::PI / sin_term).ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let mut acc = 0.99999999999980993;
    for (i, &c) in COEFFS.iter().enumerate() {
        acc += c / (x + i as f64 + 1.0);
    }
    let t = x + 7.5;
    (SQRT_TWO_PI * acc).ln() + (x + 0.5) * t.ln() - t
}
