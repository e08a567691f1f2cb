/// Portfolio aggregation scenario tests: the mixed long/short/option book,
/// the exposure identities, and the delta-adjusted view.

use riskbatch::config::DeltaAdjustMode;
use riskbatch::models::{GreeksValues, PositionView};
use riskbatch::services::aggregation_service::{
    delta_adjusted_exposure, exposures, greeks, TagFilterMode,
};
use uuid::Uuid;

fn view(position_type: &str, quantity: f64, market_value: f64, exposure: f64) -> PositionView {
    PositionView {
        position_id: Uuid::new_v4(),
        symbol: "TEST".to_string(),
        position_type: position_type.to_string(),
        quantity: Some(quantity),
        market_value: Some(market_value),
        exposure: Some(exposure),
        greeks: None,
        tags: vec![],
        underlying_symbol: None,
    }
}

fn with_delta(mut v: PositionView, delta: f64) -> PositionView {
    v.greeks = Some(GreeksValues {
        delta,
        gamma: 0.0,
        theta: 0.0,
        vega: 0.0,
        rho: 0.0,
    });
    v
}

/// LONG 100 @ 150, SHORT -50 @ 200, LC 10 contracts @ 5 premium (x100).
fn mixed_book() -> Vec<PositionView> {
    vec![
        view("LONG", 100.0, 15_000.0, 15_000.0),
        view("SHORT", -50.0, 10_000.0, -10_000.0),
        view("LC", 10.0, 5_000.0, 5_000.0),
    ]
}

// ---------------------------------------------------------------------------
// Exposure rollup
// ---------------------------------------------------------------------------

#[test]
fn mixed_portfolio_exposures_match_expected_values() {
    let result = exposures(&mixed_book());

    assert_eq!(result.gross, 30_000.00);
    assert_eq!(result.net, 10_000.00);
    assert_eq!(result.long, 20_000.00);
    assert_eq!(result.short, -10_000.00);
    assert_eq!(result.long_count, 2);
    assert_eq!(result.short_count, 1);
    assert_eq!(result.options_exposure, 5_000.00);
    assert_eq!(result.stock_exposure, 25_000.00);
    assert_eq!(result.notional, 30_000.00);
}

#[test]
fn gross_equals_long_plus_absolute_short() {
    let result = exposures(&mixed_book());
    assert_eq!(result.gross, result.long + result.short.abs());
}

#[test]
fn net_equals_long_plus_short() {
    let result = exposures(&mixed_book());
    assert_eq!(result.net, result.long + result.short);
}

#[test]
fn empty_portfolio_aggregates_to_zeros() {
    let result = exposures(&[]);
    assert_eq!(result.gross, 0.0);
    assert_eq!(result.net, 0.0);
    assert_eq!(result.long_count, 0);
    assert_eq!(result.short_count, 0);
    assert_eq!(result.notional, 0.0);
}

#[test]
fn positions_missing_valuation_are_excluded_and_warned() {
    let mut missing = view("LONG", 100.0, 0.0, 0.0);
    missing.market_value = None;
    missing.exposure = None;

    let result = exposures(&[missing, view("LC", 10.0, 5_000.0, 5_000.0)]);
    assert_eq!(result.metadata.excluded_positions, 1);
    assert_eq!(result.gross, 5_000.00);
    assert!(result
        .metadata
        .warnings
        .iter()
        .any(|w| w.contains("missing valuation")));
}

#[test]
fn serialized_output_uses_notional_not_notional_exposure() {
    let result = exposures(&mixed_book());
    let json = serde_json::to_string(&result).unwrap();
    assert!(json.contains("\"notional\":"));
    assert!(!json.contains("notional_exposure"));
}

// ---------------------------------------------------------------------------
// Greeks aggregation
// ---------------------------------------------------------------------------

#[test]
fn null_greeks_rows_are_skipped_and_counted() {
    let book = vec![
        with_delta(view("LONG", 100.0, 15_000.0, 15_000.0), 1.0),
        view("LC", 10.0, 5_000.0, 5_000.0), // failed greeks upstream
    ];
    let result = greeks(&book);
    assert_eq!(result.delta, 1.0);
    assert_eq!(result.metadata.skipped_greeks, 1);
    assert!(!result.metadata.warnings.is_empty());
}

#[test]
fn stock_deltas_contribute_their_sign() {
    let book = vec![
        with_delta(view("LONG", 100.0, 15_000.0, 15_000.0), 1.0),
        with_delta(view("SHORT", -50.0, 10_000.0, -10_000.0), -1.0),
    ];
    let result = greeks(&book);
    assert_eq!(result.delta, 0.0);
    assert_eq!(result.metadata.skipped_greeks, 0);
}

// ---------------------------------------------------------------------------
// Delta-adjusted exposure
// ---------------------------------------------------------------------------

#[test]
fn delta_adjusted_applies_per_share_delta_to_options() {
    // LC with 0.65 per-share delta: engine delta = 0.65 * 10 contracts * 100
    let book = vec![
        with_delta(view("LONG", 100.0, 15_000.0, 15_000.0), 1.0),
        with_delta(view("SHORT", -50.0, 10_000.0, -10_000.0), -1.0),
        with_delta(view("LC", 10.0, 5_000.0, 5_000.0), 650.0),
    ];

    let result = delta_adjusted_exposure(&book, DeltaAdjustMode::Absolute);
    assert_eq!(result.raw_exposure, 30_000.00);
    // stocks at full magnitude (25000) plus the option leg at 0.65 x 5000
    assert_eq!(result.delta_adjusted_exposure, 25_000.0 + 0.65 * 5_000.0);
}

#[test]
fn delta_adjusted_option_term_is_exposure_times_abs_delta() {
    let option_only = vec![with_delta(view("LC", 10.0, 5_000.0, 5_000.0), 650.0)];
    let result = delta_adjusted_exposure(&option_only, DeltaAdjustMode::Absolute);
    assert_eq!(result.delta_adjusted_exposure, 3_250.00);

    let short_option = vec![with_delta(view("SC", 10.0, 5_000.0, -5_000.0), -650.0)];
    let result = delta_adjusted_exposure(&short_option, DeltaAdjustMode::Absolute);
    // magnitude view: |exposure| x |delta|
    assert_eq!(result.delta_adjusted_exposure, 3_250.00);
}

#[test]
fn directional_mode_keeps_delta_sign() {
    let book = vec![
        with_delta(view("LONG", 100.0, 15_000.0, 15_000.0), 1.0),
        with_delta(view("SC", 10.0, 5_000.0, -5_000.0), -650.0),
    ];
    let result = delta_adjusted_exposure(&book, DeltaAdjustMode::Directional);
    // 15000 * 1 + 5000 * (-0.65)
    assert_eq!(result.delta_adjusted_exposure, 11_750.00);
}

// ---------------------------------------------------------------------------
// Grouped views
// ---------------------------------------------------------------------------

#[test]
fn tag_groups_cover_every_distinct_tag() {
    use riskbatch::services::aggregation_service::by_tags;

    let mut a = view("LONG", 100.0, 15_000.0, 15_000.0);
    a.tags = vec!["tech".to_string(), "growth".to_string()];
    let mut b = view("SHORT", -50.0, 10_000.0, -10_000.0);
    b.tags = vec!["tech".to_string()];

    let groups = by_tags(&[a, b], None, TagFilterMode::Any);
    assert_eq!(groups.len(), 2);
    assert_eq!(groups["tech"].net, 5_000.00);
    assert_eq!(groups["growth"].net, 15_000.00);
}

#[test]
fn underlying_groups_combine_stock_and_options() {
    use riskbatch::services::aggregation_service::by_underlying;

    let mut stock = view("LONG", 100.0, 15_000.0, 15_000.0);
    stock.symbol = "AAPL".to_string();
    let mut call = with_delta(view("LC", 10.0, 5_000.0, 5_000.0), 650.0);
    call.symbol = "AAPL260116C00150000".to_string();
    call.underlying_symbol = Some("AAPL".to_string());
    let mut other = view("LONG", 10.0, 4_000.0, 4_000.0);
    other.symbol = "MSFT".to_string();

    let groups = by_underlying(&[stock, call, other]);
    assert_eq!(groups.len(), 2);
    assert_eq!(groups["AAPL"].count, 2);
    assert_eq!(groups["AAPL"].exposure, 20_000.00);
    assert_eq!(groups["MSFT"].count, 1);
}
