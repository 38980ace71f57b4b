//! Streaming quantile sketch (merging t-digest).
//!
//! Behavioral contract: `percentile(p)` is monotone non-decreasing in p,
//! `percentile_rank(x)` lies in [0, 100] and is monotone in x, memory is
//! O(compression), and two digests merge losslessly enough for sharding.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Centroid {
    mean: f64,
    weight: f64,
}

/// Merging t-digest over trade notionals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TDigest {
    compression: f64,
    /// Sorted by mean after every merge.
    centroids: Vec<Centroid>,
    /// Unmerged inserts, folded in when full.
    buffer: Vec<f64>,
    count: f64,
    min: f64,
    max: f64,
}

impl Default for TDigest {
    fn default() -> Self {
        Self::new(100.0)
    }
}

impl TDigest {
    pub fn new(compression: f64) -> Self {
        let compression = compression.max(20.0);
        Self {
            compression,
            centroids: Vec::new(),
            buffer: Vec::with_capacity((compression * 4.0) as usize),
            count: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn count(&self) -> u64 {
        (self.count + self.buffer.len() as f64) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn insert(&mut self, x: f64) {
        if !x.is_finite() {
            return;
        }
        self.buffer.push(x);
        if self.buffer.len() >= self.buffer.capacity().max(32) {
            self.flush();
        }
    }

    /// Merge another digest into this one (sharded ingestion).
    pub fn merge(&mut self, other: &TDigest) {
        for c in &other.centroids {
            // Re-inserting centroid means weight times keeps the sketch honest
            // without a special weighted-merge path for the sizes we run at.
            self.merge_weighted(c.mean, c.weight);
        }
        for &x in &other.buffer {
            self.insert(x);
        }
        self.flush();
    }

    fn merge_weighted(&mut self, mean: f64, weight: f64) {
        self.flush();
        self.centroids.push(Centroid { mean, weight });
        self.centroids
            .sort_by(|a, b| a.mean.partial_cmp(&b.mean).unwrap());
        self.count += weight;
        self.min = self.min.min(mean);
        self.max = self.max.max(mean);
        self.compress();
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let mut incoming = std::mem::take(&mut self.buffer);
        incoming.sort_by(|a, b| a.partial_cmp(b).unwrap());
        self.min = self.min.min(incoming[0]);
        self.max = self.max.max(*incoming.last().unwrap());
        for x in incoming {
            self.centroids.push(Centroid {
                mean: x,
                weight: 1.0,
            });
            self.count += 1.0;
        }
        self.centroids
            .sort_by(|a, b| a.mean.partial_cmp(&b.mean).unwrap());
        self.compress();
    }

    /// Merge adjacent centroids while the size bound
    /// `w <= 4 n q(1-q) / compression` holds.
    fn compress(&mut self) {
        if self.centroids.len() <= 1 {
            return;
        }
        let n = self.count;
        let mut merged: Vec<Centroid> = Vec::with_capacity(self.centroids.len());
        let mut acc = self.centroids[0];
        let mut cum = 0.0;
        for c in self.centroids.iter().skip(1) {
            let q = (cum + (acc.weight + c.weight) / 2.0) / n;
            let limit = 4.0 * n * q * (1.0 - q) / self.compression;
            if acc.weight + c.weight <= limit.max(1.0) {
                let w = acc.weight + c.weight;
                acc.mean = (acc.mean * acc.weight + c.mean * c.weight) / w;
                acc.weight = w;
            } else {
                cum += acc.weight;
                merged.push(acc);
                acc = *c;
            }
        }
        merged.push(acc);
        self.centroids = merged;
    }

    /// Value at percentile `p` in [0, 100]. Returns 0.0 on an empty digest.
    ///
    /// Interpolates between cumulative centroid midpoints, so the result is
    /// continuous and monotone in p.
    pub fn percentile(&mut self, p: f64) -> f64 {
        self.flush();
        if self.centroids.is_empty() {
            return 0.0;
        }
        let p = (p / 100.0).clamp(0.0, 1.0);
        let target = p * self.count;

        // Cumulative midpoint of each centroid.
        let mut cum = 0.0;
        let mut prev_mid = 0.0;
        let mut prev_mean = self.min;
        for c in &self.centroids {
            let mid = cum + c.weight / 2.0;
            if target <= mid {
                let span = (mid - prev_mid).max(f64::EPSILON);
                let t = ((target - prev_mid) / span).clamp(0.0, 1.0);
                return prev_mean + (c.mean - prev_mean) * t;
            }
            prev_mid = mid;
            prev_mean = c.mean;
            cum += c.weight;
        }
        // Tail: last midpoint to the maximum.
        let span = (self.count - prev_mid).max(f64::EPSILON);
        let t = ((target - prev_mid) / span).clamp(0.0, 1.0);
        prev_mean + (self.max - prev_mean) * t
    }

    /// Percentile rank of `x` in [0, 100]. Empty digest answers 50 so that
    /// degraded callers fall back to a neutral mid-rank.
    pub fn percentile_rank(&mut self, x: f64) -> f64 {
        self.flush();
        if self.centroids.is_empty() {
            return 50.0;
        }
        if x <= self.min {
            return 0.0;
        }
        if x >= self.max {
            return 100.0;
        }

        let mut cum = 0.0;
        for (i, c) in self.centroids.iter().enumerate() {
            if x < c.mean {
                let prev_mean = if i == 0 {
                    self.min
                } else {
                    self.centroids[i - 1].mean
                };
                let prev_half = if i == 0 {
                    0.0
                } else {
                    self.centroids[i - 1].weight / 2.0
                };
                let lower_rank = cum - prev_half;
                let upper_rank = cum + c.weight / 2.0;
                let span = (c.mean - prev_mean).max(f64::EPSILON);
                let t = ((x - prev_mean) / span).clamp(0.0, 1.0);
                let rank = lower_rank + (upper_rank - lower_rank) * t;
                return (rank / self.count * 100.0).clamp(0.0, 100.0);
            }
            cum += c.weight;
        }
        100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(n: usize) -> TDigest {
        let mut d = TDigest::new(100.0);
        for i in 0..n {
            d.insert(i as f64);
        }
        d
    }

    #[test]
    fn empty_rank_is_50() {
        let mut d = TDigest::default();
        assert_eq!(d.percentile_rank(123.0), 50.0);
        assert_eq!(d.percentile(95.0), 0.0);
    }

    #[test]
    fn percentile_monotone_in_p() {
        let mut d = filled(10_000);
        let mut last = f64::NEG_INFINITY;
        for p in 0..=100 {
            let v = d.percentile(p as f64);
            assert!(
                v >= last - 1e-9,
                "percentile({}) = {} < previous {}",
                p,
                v,
                last
            );
            last = v;
        }
    }

    #[test]
    fn rank_monotone_in_x_and_bounded() {
        let mut d = filled(5_000);
        let mut last = -1.0;
        for x in (0..5_000).step_by(37) {
            let r = d.percentile_rank(x as f64);
            assert!((0.0..=100.0).contains(&r));
            assert!(r >= last - 1e-9);
            last = r;
        }
    }

    #[test]
    fn median_of_uniform_is_centered() {
        let mut d = filled(10_000);
        let p50 = d.percentile(50.0);
        assert!((p50 - 5_000.0).abs() < 250.0, "p50 = {}", p50);
    }

    #[test]
    fn extremes_rank_at_bounds() {
        let mut d = filled(1_000);
        assert_eq!(d.percentile_rank(-1.0), 0.0);
        assert_eq!(d.percentile_rank(10_000.0), 100.0);
    }

    #[test]
    fn merge_approximates_union() {
        let mut a = TDigest::new(100.0);
        let mut b = TDigest::new(100.0);
        for i in 0..2_000 {
            a.insert(i as f64);
            b.insert((2_000 + i) as f64);
        }
        a.merge(&b);
        assert_eq!(a.count(), 4_000);
        let p50 = a.percentile(50.0);
        assert!((p50 - 2_000.0).abs() < 200.0, "p50 = {}", p50);
    }

    #[test]
    fn memory_stays_bounded() {
        let d = filled(100_000);
        assert!(d.centroids.len() < 400, "centroids = {}", d.centroids.len());
    }
}
