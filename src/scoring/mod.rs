//! Scoring: anomaly / execution / edge / composite, the triple-signal
//! conjunction, and triggering-trade extraction.

pub mod engine;

pub use engine::{triple_signal, Score, ScoreEngine};
