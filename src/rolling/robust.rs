//! Robust location/scale over a window: median, MAD and the robust z-score.

/// Consistency constant relating MAD to the normal standard deviation.
pub const MAD_SCALE: f64 = 1.4826;

/// Median of a sample. Returns 0.0 on empty input.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Median absolute deviation around `center`.
pub fn mad(values: &[f64], center: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

/// Robust z-score `(x - median) / (1.4826 * MAD)`.
///
/// When MAD collapses to zero (all-equal window): 0 if x equals the median,
/// otherwise signed infinity.
pub fn robust_z(x: f64, med: f64, mad_value: f64) -> f64 {
    if mad_value <= 0.0 {
        return if (x - med).abs() < f64::EPSILON {
            0.0
        } else if x > med {
            f64::INFINITY
        } else {
            f64::NEG_INFINITY
        };
    }
    (x - med) / (MAD_SCALE * mad_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_odd_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn mad_of_symmetric_sample() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        let m = median(&v);
        assert_eq!(mad(&v, m), 1.0);
    }

    #[test]
    fn robust_z_all_equal_window_is_zero() {
        let v = [7.0; 20];
        let m = median(&v);
        let d = mad(&v, m);
        assert_eq!(robust_z(7.0, m, d), 0.0);
        assert!(robust_z(8.0, m, d).is_infinite());
        assert!(robust_z(6.0, m, d) == f64::NEG_INFINITY);
    }

    #[test]
    fn robust_z_matches_normal_sigma() {
        // For a window whose MAD equals 1/1.4826, robust z equals (x - med).
        let m = 0.0;
        let d = 1.0 / MAD_SCALE;
        assert!((robust_z(3.0, m, d) - 3.0).abs() < 1e-9);
    }
}
