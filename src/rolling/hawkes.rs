//! Self-exciting intensity proxy.
//!
//! A full Hawkes fit is overkill for burst detection; the proxy keeps one
//! exponentially-decayed excitation term:
//!
//!   on event at t:  state <- alpha + state * exp(-beta * (t - last))
//!   intensity(t)  = mu + state * exp(-beta * (t - last))
//!
//! Burst when intensity >= 2 * mu.

use crate::config::HawkesConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HawkesState {
    pub mu: f64,
    pub alpha: f64,
    pub beta: f64,
    /// Decayed excitation sum as of `last_event_ms`.
    state: f64,
    last_event_ms: Option<i64>,
    event_count: u64,
}

impl HawkesState {
    pub fn new(cfg: HawkesConfig) -> Self {
        Self {
            mu: cfg.baseline_mu,
            alpha: cfg.excitation_alpha,
            beta: cfg.decay_beta,
            state: 0.0,
            last_event_ms: None,
            event_count: 0,
        }
    }

    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Record an event at `t_ms`. Out-of-order events are tolerated: a
    /// negative gap decays nothing.
    pub fn record(&mut self, t_ms: i64) {
        let decayed = match self.last_event_ms {
            Some(last) => {
                let dt_secs = ((t_ms - last).max(0)) as f64 / 1000.0;
                self.state * (-self.beta * dt_secs).exp()
            }
            None => 0.0,
        };
        self.state = self.alpha + decayed;
        self.last_event_ms = Some(self.last_event_ms.map_or(t_ms, |last| last.max(t_ms)));
        self.event_count += 1;
    }

    /// Intensity (events/second) at `t_ms`.
    pub fn intensity_at(&self, t_ms: i64) -> f64 {
        match self.last_event_ms {
            Some(last) => {
                let dt_secs = ((t_ms - last).max(0)) as f64 / 1000.0;
                self.mu + self.state * (-self.beta * dt_secs).exp()
            }
            None => self.mu,
        }
    }

    pub fn is_burst(&self, t_ms: i64) -> bool {
        self.intensity_at(t_ms) >= 2.0 * self.mu
    }
}

impl Default for HawkesState {
    fn default() -> Self {
        Self::new(HawkesConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_token_sits_at_baseline() {
        let h = HawkesState::default();
        assert!((h.intensity_at(1_000_000) - 0.1).abs() < 1e-12);
        assert!(!h.is_burst(1_000_000));
    }

    #[test]
    fn single_event_excites_then_decays() {
        let mut h = HawkesState::default();
        h.record(0);
        // Right after the event: mu + alpha = 0.6 >= 2 mu.
        assert!(h.is_burst(0));
        // One minute later: 0.5 * exp(-6) is tiny.
        assert!(!h.is_burst(60_000));
        assert!(h.intensity_at(60_000) > h.mu);
    }

    #[test]
    fn rapid_fire_accumulates_excitation() {
        let mut h = HawkesState::default();
        for i in 0..10 {
            h.record(i * 100); // one event every 100ms
        }
        let burst_intensity = h.intensity_at(900);
        assert!(burst_intensity > 2.0 * h.mu);

        let mut slow = HawkesState::default();
        slow.record(0);
        slow.record(600_000);
        assert!(slow.intensity_at(600_000) < burst_intensity);
    }

    #[test]
    fn out_of_order_event_does_not_panic_or_rewind() {
        let mut h = HawkesState::default();
        h.record(10_000);
        h.record(5_000); // late arrival
        assert_eq!(h.event_count(), 2);
        assert!(h.intensity_at(10_000) > h.mu);
    }
}
