//! End-to-end research scenarios over the public crate surface.

use sentinel_backend::config::TripleSignalThresholds;
use sentinel_backend::models::{Outcome, Side, SignalStrength};
use sentinel_backend::research::backfill::{BackfillConfig, BackfillEngine, JobStatus};
use sentinel_backend::research::events::{parse_outcome_prices, winning_outcome, HistoricalTrade};
use sentinel_backend::research::events::{AnalysisConfig, ContrarianEvent, ResolvedMarket};
use sentinel_backend::research::pnl::compute_pnl;
use sentinel_backend::research::stats::benjamini_hochberg;
use sentinel_backend::scoring::triple_signal;
use sentinel_backend::storage::Warehouse;
use serde_json::json;

fn event(price: f64, notional: f64, won: bool) -> ContrarianEvent {
    ContrarianEvent {
        id: None,
        condition_id: "cond".into(),
        token_id: "tok".into(),
        trade_timestamp: 0,
        minutes_before_close: 20.0,
        trade_side: Side::Buy,
        trade_price: price,
        trade_size: notional / price,
        trade_notional: notional,
        taker_address: "0xabc".into(),
        size_percentile: 50.0,
        size_z_score: 0.0,
        is_tail_trade: false,
        is_price_contrarian: price < 0.5,
        price_trend_30m: 0.0,
        is_against_trend: false,
        ofi_30m: 0.0,
        is_against_ofi: false,
        is_contrarian: false,
        book_imbalance: 0.0,
        thin_opposite_ratio: 1.0,
        spread_bps: 50.0,
        is_asymmetric_book: false,
        wallet_age_days: None,
        wallet_trade_count: None,
        is_new_wallet: false,
        traded_outcome: Outcome::Yes,
        outcome_won: won,
        drift_30m: None,
        drift_60m: None,
    }
}

/// S1: a 50% win rate at an average price of 0.90 is unprofitable.
#[test]
fn coin_flip_at_high_price_loses() {
    let events = [event(0.90, 100.0, true), event(0.90, 100.0, false)];
    let refs: Vec<&ContrarianEvent> = events.iter().collect();
    let m = compute_pnl(&refs);

    assert!((m.total_win_pnl - 10.0).abs() < 1e-9);
    assert!((m.total_loss_pnl + 90.0).abs() < 1e-9);
    assert!((m.pnl + 80.0).abs() < 1e-9);
    assert!((m.roi + 0.40).abs() < 1e-9);
    assert!((m.break_even_rate - 0.90).abs() < 1e-9);
    assert!((m.edge_points + 40.0).abs() < 1e-9);
    assert!(!m.is_profitable);
    assert!(m.warnings.iter().any(|w| w.contains("below break-even")));
}

/// S2: the same coin flip at 0.35 is profitable with positive Kelly.
#[test]
fn coin_flip_at_low_price_profits() {
    let events = [event(0.35, 100.0, true), event(0.35, 100.0, false)];
    let refs: Vec<&ContrarianEvent> = events.iter().collect();
    let m = compute_pnl(&refs);

    assert!((m.pnl - 30.0).abs() < 1e-9);
    assert!((m.roi - 0.15).abs() < 1e-9);
    assert!((m.edge_points - 15.0).abs() < 1e-9);
    assert!(m.kelly_fraction > 0.0);
    assert!(m.is_profitable);
}

/// S3: the triple-signal conjunction at default thresholds.
#[test]
fn triple_signal_reference_inputs() {
    let t = TripleSignalThresholds::default();
    assert!(triple_signal(0.95, 0.80, 0.75, 0.85, 0.00, &t));
    assert!(!triple_signal(0.899, 0.80, 0.75, 0.85, 0.80, &t));
}

/// S4: market resolution detection across payload shapes.
#[test]
fn market_resolution_detection() {
    let yes = parse_outcome_prices(&json!("[\"1\", \"0\"]")).unwrap();
    assert_eq!(winning_outcome(yes.0, yes.1), Some(Outcome::Yes));

    let numeric = parse_outcome_prices(&json!([1, 0])).unwrap();
    assert_eq!(winning_outcome(numeric.0, numeric.1), Some(Outcome::Yes));

    let fractional = parse_outcome_prices(&json!("[\"0.9\", \"0.1\"]")).unwrap();
    assert_eq!(winning_outcome(fractional.0, fractional.1), None);

    assert!(parse_outcome_prices(&json!("not valid json")).is_none());
    assert!(parse_outcome_prices(&json!(null)).is_none());
}

/// S5: ramp multiplier boundary behavior.
#[test]
fn ramp_multiplier_boundaries() {
    use sentinel_backend::config::RampConfig;
    use sentinel_backend::features::time_to_close::ramp_multiplier;

    let cfg = RampConfig::default();
    let at_close = ramp_multiplier(0.0, &cfg);
    assert!((at_close - (1.0 + cfg.alpha).min(cfg.max_multiplier)).abs() < 1e-12);
    assert!((ramp_multiplier(10_000.0, &cfg) - 1.0).abs() < 1e-9);
}

/// S6: the Benjamini-Hochberg worked example.
#[test]
fn bh_worked_example() {
    let out = benjamini_hochberg(&[0.01, 0.04, 0.03, 0.005], 0.05);
    assert!((out[3].0 - 0.02).abs() < 1e-9);
    assert!(out.iter().all(|&(_, sig)| sig));

    // Sorted adjusted values are non-decreasing.
    let mut adjusted: Vec<f64> = out.iter().map(|&(a, _)| a).collect();
    adjusted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    for w in adjusted.windows(2) {
        assert!(w[0] <= w[1] + 1e-12);
    }
}

/// Backfill idempotence: the same window twice adds zero rows, and the
/// scoring path downstream still sees a consistent event set.
#[tokio::test]
async fn backfill_twice_adds_nothing() {
    let warehouse = Warehouse::in_memory().unwrap();
    let end_ms = 48 * 3_600_000i64;
    warehouse
        .upsert_resolved_market(&ResolvedMarket {
            condition_id: "cond".into(),
            question: "resolves yes?".into(),
            end_date_iso: None,
            end_date_ms: Some(end_ms),
            category: Some("politics".into()),
            winning_outcome: Some(Outcome::Yes),
            final_yes_price: 1.0,
            final_no_price: 0.0,
        })
        .unwrap();

    let trades: Vec<HistoricalTrade> = (0..25)
        .map(|i| HistoricalTrade {
            condition_id: "cond".into(),
            token_id: "tok-yes".into(),
            trade_id: format!("t{}", i),
            timestamp_ms: end_ms - (i + 1) * 3 * 60_000,
            taker_address: "0x1234567890abcdef1234567890abcdef12345678".into(),
            maker_address: None,
            side: if i % 3 == 0 { Side::Sell } else { Side::Buy },
            price: 0.35 + (i % 5) as f64 * 0.01,
            size: 100.0 + i as f64 * 10.0,
            outcome: Some("Yes".into()),
            tx_hash: None,
        })
        .collect();
    warehouse.insert_historical_trades(&trades).unwrap();

    let engine = BackfillEngine::new(warehouse.clone(), None, None);
    let now_ms = end_ms + 86_400_000;

    let job = engine.run(BackfillConfig::default(), now_ms).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let first_count = warehouse.event_count().unwrap();
    assert!(first_count > 0);

    let again = engine.run(BackfillConfig::default(), now_ms).await.unwrap();
    assert_eq!(again.status, JobStatus::Completed);
    assert_eq!(warehouse.event_count().unwrap(), first_count);

    // The filter surface sees them.
    let rows = warehouse
        .query_events(&AnalysisConfig { lookback_days: 30, ..Default::default() }, now_ms)
        .unwrap();
    assert_eq!(rows.len() as i64, first_count);
    assert!(rows.iter().all(|r| r.category.as_deref() == Some("politics")));
}

/// Composite scoring stays bounded and bucketing matches the thresholds on
/// a full streaming pass.
#[tokio::test]
async fn streaming_scores_bounded_and_bucketed() {
    use sentinel_backend::config::Config;
    use sentinel_backend::models::Trade;
    use sentinel_backend::pipeline::IngestPipeline;
    use sentinel_backend::rolling::RollingStateEngine;
    use sentinel_backend::storage::KvCache;
    use sentinel_backend::wallet::WalletEnricher;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    std::env::set_var("DATABASE_PATH", ":memory:");
    let config = Config::from_env().unwrap();
    let rolling = Arc::new(RollingStateEngine::default());
    let cache = KvCache::new(&Warehouse::in_memory().unwrap());
    let enricher = Arc::new(WalletEnricher::new(cache.clone(), None, 30 * 24 * 3600));
    let (tx, _rx) = mpsc::channel(64);
    let pipeline = IngestPipeline::new(&config, rolling, enricher, Some(cache), tx);

    for i in 0..120 {
        let score = pipeline
            .handle_trade(Trade {
                trade_id: format!("t{}", i),
                token_id: "tok".into(),
                timestamp_ms: 1_000_000 + i * 5_000,
                taker_address: "0x1234567890abcdef1234567890abcdef12345678".into(),
                side: Side::Buy,
                price: 0.5,
                size: 200.0 + (i % 11) as f64 * 50.0,
                tx_hash: None,
            })
            .await
            .expect("valid trade scores");

        for v in [score.anomaly, score.execution, score.edge_score, score.composite] {
            assert!((0.0..=1.0).contains(&v));
        }
        let expected = SignalStrength::from_composite(score.composite);
        assert_eq!(score.signal_strength, expected);
    }
}
