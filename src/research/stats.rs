//! Shared statistics: multiple-testing correction, correlation machinery,
//! AUC, bootstrap intervals.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// Standard normal CDF.
pub fn normal_cdf(x: f64) -> f64 {
    // Parameters are fixed and valid; construction cannot fail.
    let normal = Normal::new(0.0, 1.0).unwrap();
    normal.cdf(x)
}

/// Two-tailed p-value from a t statistic with `df` degrees of freedom.
pub fn t_two_tailed_p(t: f64, df: f64) -> f64 {
    if df < 1.0 || !t.is_finite() {
        return 1.0;
    }
    let dist = StudentsT::new(0.0, 1.0, df).unwrap();
    (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0)
}

/// Two-tailed binomial test against `p0` via the normal approximation.
pub fn binomial_test_p(wins: usize, n: usize, p0: f64) -> f64 {
    if n == 0 {
        return 1.0;
    }
    let p_hat = wins as f64 / n as f64;
    let se = (p0 * (1.0 - p0) / n as f64).sqrt();
    if se <= 0.0 {
        return 1.0;
    }
    let z = (p_hat - p0) / se;
    (2.0 * (1.0 - normal_cdf(z.abs()))).clamp(0.0, 1.0)
}

/// Benjamini-Hochberg step-up correction.
///
/// Returns, in the input order, the adjusted p-value and whether the
/// hypothesis survives at `alpha`. A single p-value passes through
/// unchanged. Sorted adjusted values are non-decreasing by construction.
pub fn benjamini_hochberg(p_values: &[f64], alpha: f64) -> Vec<(f64, bool)> {
    let n = p_values.len();
    if n == 0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        p_values[a]
            .partial_cmp(&p_values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Raw step-up values, then enforce monotonicity from the largest down.
    let mut adjusted_sorted: Vec<f64> = order
        .iter()
        .enumerate()
        .map(|(k, &idx)| (p_values[idx] * n as f64 / (k + 1) as f64).min(1.0))
        .collect();
    for k in (0..n.saturating_sub(1)).rev() {
        adjusted_sorted[k] = adjusted_sorted[k].min(adjusted_sorted[k + 1]);
    }

    let mut out = vec![(1.0, false); n];
    for (k, &idx) in order.iter().enumerate() {
        let adj = adjusted_sorted[k];
        out[idx] = (adj, adj <= alpha);
    }
    out
}

/// Point-biserial correlation of a binary predictor with a binary outcome,
/// plus its t-distribution p-value.
///
/// r is always within [-1, 1]; degenerate inputs (single class) return 0
/// with p = 1.
pub fn point_biserial(predictor: &[bool], outcome: &[bool]) -> (f64, f64) {
    let n = predictor.len();
    if n < 3 || n != outcome.len() {
        return (0.0, 1.0);
    }
    let n1 = predictor.iter().filter(|&&p| p).count();
    let n0 = n - n1;
    if n1 == 0 || n0 == 0 {
        return (0.0, 1.0);
    }

    let ys: Vec<f64> = outcome.iter().map(|&o| if o { 1.0 } else { 0.0 }).collect();
    let mean_all = ys.iter().sum::<f64>() / n as f64;
    let var = ys.iter().map(|y| (y - mean_all).powi(2)).sum::<f64>() / n as f64;
    let sd = var.sqrt();
    if sd <= 0.0 {
        return (0.0, 1.0);
    }

    let mean1 = ys
        .iter()
        .zip(predictor)
        .filter(|(_, &p)| p)
        .map(|(y, _)| y)
        .sum::<f64>()
        / n1 as f64;
    let mean0 = ys
        .iter()
        .zip(predictor)
        .filter(|(_, &p)| !p)
        .map(|(y, _)| y)
        .sum::<f64>()
        / n0 as f64;

    let r = ((mean1 - mean0) / sd) * ((n1 as f64 * n0 as f64) / (n as f64 * n as f64)).sqrt();
    let r = r.clamp(-1.0, 1.0);

    if r.abs() >= 1.0 {
        return (r, 0.0);
    }
    let df = (n - 2) as f64;
    let t = r * (df / (1.0 - r * r)).sqrt();
    (r, t_two_tailed_p(t, df))
}

/// Fisher-z 95% confidence interval for a correlation at sample size `n`.
/// The bracket always contains r.
pub fn fisher_ci(r: f64, n: usize) -> (f64, f64) {
    if n <= 3 || r.abs() >= 1.0 {
        return (-1.0_f64.min(r), 1.0_f64.max(r));
    }
    let z = r.atanh();
    let se = 1.0 / ((n - 3) as f64).sqrt();
    let lo = (z - 1.96 * se).tanh();
    let hi = (z + 1.96 * se).tanh();
    (lo, hi)
}

/// Trapezoidal AUC over (score, label) pairs. All-identical labels answer
/// the uninformative 0.5.
pub fn auc(scores: &[f64], labels: &[bool]) -> f64 {
    let n = scores.len();
    if n == 0 || n != labels.len() {
        return 0.5;
    }
    let pos = labels.iter().filter(|&&l| l).count();
    let neg = n - pos;
    if pos == 0 || neg == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Sweep descending thresholds, accumulating the ROC curve. Ties move as
    // one block so tied scores contribute a diagonal segment.
    let mut auc_acc = 0.0;
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut prev_tpr = 0.0;
    let mut prev_fpr = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j < n && scores[order[j]] == scores[order[i]] {
            if labels[order[j]] {
                tp += 1;
            } else {
                fp += 1;
            }
            j += 1;
        }
        let tpr = tp as f64 / pos as f64;
        let fpr = fp as f64 / neg as f64;
        auc_acc += (fpr - prev_fpr) * (tpr + prev_tpr) / 2.0;
        prev_tpr = tpr;
        prev_fpr = fpr;
        i = j;
    }
    auc_acc.clamp(0.0, 1.0)
}

/// Bootstrap 95% CI of the mean, seeded for reproducibility.
/// Empty input answers [0, 0].
pub fn bootstrap_ci(values: &[f64], n_samples: usize, seed: u64) -> (f64, f64) {
    if values.is_empty() || n_samples == 0 {
        return (0.0, 0.0);
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n = values.len();
    let mut means: Vec<f64> = (0..n_samples)
        .map(|_| {
            let sum: f64 = (0..n).map(|_| values[rng.gen_range(0..n)]).sum();
            sum / n as f64
        })
        .collect();
    means.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    (
        percentile_sorted(&means, 2.5),
        percentile_sorted(&means, 97.5),
    )
}

pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Annualized Sharpe from per-trade returns.
pub fn sharpe_annualized(returns: &[f64]) -> f64 {
    let sd = std_dev(returns);
    if sd <= 1e-12 {
        return 0.0;
    }
    mean(returns) / sd * 252.0_f64.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bh_single_p_unchanged() {
        let out = benjamini_hochberg(&[0.03], 0.05);
        assert!((out[0].0 - 0.03).abs() < 1e-12);
        assert!(out[0].1);
    }

    #[test]
    fn bh_reference_example() {
        // Sorted: [0.005, 0.01, 0.03, 0.04] -> adjusted [0.02, 0.02, 0.04, 0.04].
        let out = benjamini_hochberg(&[0.01, 0.04, 0.03, 0.005], 0.05);
        assert!((out[3].0 - 0.02).abs() < 1e-9, "adjusted[3] = {}", out[3].0);
        assert!((out[0].0 - 0.02).abs() < 1e-9);
        assert!((out[1].0 - 0.04).abs() < 1e-9);
        assert!((out[2].0 - 0.04).abs() < 1e-9);
        assert!(out.iter().all(|&(_, sig)| sig));
    }

    #[test]
    fn bh_sorted_adjusted_non_decreasing() {
        let ps = [0.001, 0.2, 0.04, 0.9, 0.03, 0.015, 0.5];
        let out = benjamini_hochberg(&ps, 0.05);
        let mut pairs: Vec<(f64, f64)> =
            ps.iter().zip(&out).map(|(&p, &(adj, _))| (p, adj)).collect();
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        for w in pairs.windows(2) {
            assert!(w[0].1 <= w[1].1 + 1e-12);
        }
    }

    #[test]
    fn point_biserial_bounds_and_signal() {
        // Predictor perfectly aligned with outcome.
        let predictor: Vec<bool> = (0..40).map(|i| i % 2 == 0).collect();
        let (r, p) = point_biserial(&predictor, &predictor);
        assert!(r > 0.99);
        assert!(p < 1e-6);

        // Inverted.
        let inverted: Vec<bool> = predictor.iter().map(|&b| !b).collect();
        let (r, _) = point_biserial(&predictor, &inverted);
        assert!(r < -0.99);

        // Uninformative.
        let outcome = vec![true; 40];
        let (r, p) = point_biserial(&predictor, &outcome);
        assert_eq!(r, 0.0);
        assert_eq!(p, 1.0);
    }

    #[test]
    fn fisher_ci_contains_r() {
        for &(r, n) in &[(0.3, 50usize), (-0.7, 20), (0.0, 100)] {
            let (lo, hi) = fisher_ci(r, n);
            assert!(lo <= r && r <= hi, "({}, {}) should bracket {}", lo, hi, r);
        }
    }

    #[test]
    fn auc_reference_cases() {
        // Perfect separation.
        let scores = [0.9, 0.8, 0.2, 0.1];
        let labels = [true, true, false, false];
        assert!((auc(&scores, &labels) - 1.0).abs() < 1e-12);

        // Perfect inversion.
        let labels_inv = [false, false, true, true];
        assert!((auc(&scores, &labels_inv) - 0.0).abs() < 1e-12);

        // Identical labels.
        assert_eq!(auc(&scores, &[true; 4]), 0.5);

        // Identical scores: no ranking information.
        assert!((auc(&[0.5; 4], &labels) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn bootstrap_ci_boundaries() {
        assert_eq!(bootstrap_ci(&[], 100, 7), (0.0, 0.0));
        let (lo, hi) = bootstrap_ci(&[1.0; 50], 200, 7);
        assert!((lo - 1.0).abs() < 1e-12 && (hi - 1.0).abs() < 1e-12);
        let values: Vec<f64> = (0..100).map(|i| (i % 2) as f64).collect();
        let (lo, hi) = bootstrap_ci(&values, 500, 7);
        assert!(lo > 0.3 && hi < 0.7 && lo < hi);
    }

    #[test]
    fn binomial_test_sanity() {
        assert!(binomial_test_p(50, 100, 0.5) > 0.9);
        assert!(binomial_test_p(80, 100, 0.5) < 1e-6);
        assert_eq!(binomial_test_p(0, 0, 0.5), 1.0);
    }

    #[test]
    fn sharpe_flat_returns_zero() {
        assert_eq!(sharpe_annualized(&[0.01; 30]), 0.0);
        assert!(sharpe_annualized(&[0.02, -0.01, 0.03, 0.01, -0.02, 0.04]) > 0.0);
    }
}
