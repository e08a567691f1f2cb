use chrono::NaiveDate;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::warn;
use uuid::Uuid;

use crate::config::DeltaAdjustMode;
use crate::models::PositionView;
use crate::numeric::round_to;

/// Portfolio exposure rollup. All monetary figures rounded to 2 decimals;
/// `notional` is the canonical name for gross economic exposure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExposureBreakdown {
    pub gross: f64,
    pub net: f64,
    pub long: f64,
    pub short: f64,
    pub long_count: usize,
    pub short_count: usize,
    pub options_exposure: f64,
    pub stock_exposure: f64,
    pub notional: f64,
    pub metadata: AggregationMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationMetadata {
    pub excluded_positions: usize,
    pub skipped_greeks: usize,
    pub warnings: Vec<String>,
}

/// Summed portfolio Greeks, rounded to 4 decimals. Rho is carried here even
/// though snapshots drop it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GreeksTotals {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
    pub metadata: AggregationMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeltaAdjusted {
    pub raw_exposure: f64,
    pub delta_adjusted_exposure: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagFilterMode {
    Any,
    All,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UnderlyingGroup {
    pub count: usize,
    pub exposure: f64,
    pub greeks: GreeksTotals,
}

/// Sum signed exposures into the portfolio rollup. Positions missing a type,
/// market value or exposure are excluded and counted, never guessed at.
pub fn exposures(positions: &[PositionView]) -> ExposureBreakdown {
    let mut out = ExposureBreakdown::default();

    for view in positions {
        let Some(kind) = view.kind() else {
            out.metadata.excluded_positions += 1;
            out.metadata.warnings.push(format!(
                "position {} excluded: unknown type '{}'",
                view.position_id, view.position_type
            ));
            continue;
        };
        let (Some(market_value), Some(exposure)) = (view.market_value, view.exposure) else {
            out.metadata.excluded_positions += 1;
            out.metadata.warnings.push(format!(
                "position {} ({}) excluded: missing valuation",
                view.position_id, view.symbol
            ));
            continue;
        };
        if market_value < 0.0 {
            out.metadata.excluded_positions += 1;
            out.metadata.warnings.push(format!(
                "position {} ({}) excluded: negative market value",
                view.position_id, view.symbol
            ));
            continue;
        }

        out.gross += exposure.abs();
        out.net += exposure;
        if exposure > 0.0 {
            out.long += exposure;
            out.long_count += 1;
        } else if exposure < 0.0 {
            out.short += exposure;
            out.short_count += 1;
        }
        // Zero exposure is neither long nor short; no counter moves

        if kind.is_option() {
            out.options_exposure += exposure.abs();
        } else {
            out.stock_exposure += exposure.abs();
        }
    }

    out.gross = round_to(out.gross, 2);
    out.net = round_to(out.net, 2);
    out.long = round_to(out.long, 2);
    out.short = round_to(out.short, 2);
    out.options_exposure = round_to(out.options_exposure, 2);
    out.stock_exposure = round_to(out.stock_exposure, 2);
    out.notional = out.gross;
    out
}

/// Sum Greeks across positions that have them. All-null Greeks rows (failed
/// calculations) are skipped and counted; they are never zero-filled.
pub fn greeks(positions: &[PositionView]) -> GreeksTotals {
    let mut out = GreeksTotals::default();

    for view in positions {
        match &view.greeks {
            Some(g) => {
                out.delta += g.delta;
                out.gamma += g.gamma;
                out.theta += g.theta;
                out.vega += g.vega;
                out.rho += g.rho;
            }
            None => {
                out.metadata.skipped_greeks += 1;
                out.metadata.warnings.push(format!(
                    "position {} ({}) has no greeks, skipped in aggregation",
                    view.position_id, view.symbol
                ));
            }
        }
    }

    out.delta = round_to(out.delta, 4);
    out.gamma = round_to(out.gamma, 4);
    out.theta = round_to(out.theta, 4);
    out.vega = round_to(out.vega, 4);
    out.rho = round_to(out.rho, 4);
    out
}

/// Exposure with option legs weighted by their per-share delta. Raw exposure
/// is the gross figure. Stocks carry full weight; an option's weight is its
/// engine delta divided back down by contracts x 100, absolute or signed per
/// the configured mode.
pub fn delta_adjusted_exposure(positions: &[PositionView], mode: DeltaAdjustMode) -> DeltaAdjusted {
    let mut raw = 0.0;
    let mut adjusted = 0.0;

    for view in positions {
        let Some(kind) = view.kind() else { continue };
        let Some(exposure) = view.exposure else {
            continue;
        };
        raw += exposure.abs();

        let weight = if kind.is_stock() {
            match mode {
                DeltaAdjustMode::Absolute => 1.0,
                DeltaAdjustMode::Directional => kind.sign(),
            }
        } else {
            let Some(per_share) = per_share_delta(view) else {
                warn!(
                    "position {} has no usable delta, omitted from delta-adjusted view",
                    view.position_id
                );
                continue;
            };
            match mode {
                DeltaAdjustMode::Absolute => per_share.abs(),
                DeltaAdjustMode::Directional => per_share,
            }
        };

        adjusted += exposure.abs() * weight;
    }

    DeltaAdjusted {
        raw_exposure: round_to(raw, 2),
        delta_adjusted_exposure: round_to(adjusted, 2),
    }
}

/// Engine delta is scaled by signed contracts x 100; divide it back out to
/// recover the per-share figure.
fn per_share_delta(view: &PositionView) -> Option<f64> {
    let greeks = view.greeks.as_ref()?;
    let quantity = view.quantity?;
    let contracts = quantity.abs();
    if contracts == 0.0 {
        return None;
    }
    let kind = view.kind()?;
    Some(greeks.delta / (kind.sign() * contracts * 100.0))
}

/// Group exposures by tag. With no filter, every distinct tag gets a group.
/// With a filter, only the filter tags appear: `Any` selects positions
/// carrying at least one of them, `All` positions carrying every one.
pub fn by_tags(
    positions: &[PositionView],
    filter: Option<&[String]>,
    mode: TagFilterMode,
) -> HashMap<String, ExposureBreakdown> {
    let mut groups: HashMap<String, Vec<PositionView>> = HashMap::new();

    match filter {
        None => {
            for view in positions {
                for tag in &view.tags {
                    groups.entry(tag.clone()).or_default().push(view.clone());
                }
            }
        }
        Some(filter_tags) => {
            let wanted: BTreeSet<&str> = filter_tags.iter().map(String::as_str).collect();
            for view in positions {
                let have: BTreeSet<&str> = view.tags.iter().map(String::as_str).collect();
                let selected = match mode {
                    TagFilterMode::Any => wanted.iter().any(|t| have.contains(t)),
                    TagFilterMode::All => wanted.iter().all(|t| have.contains(t)),
                };
                if selected {
                    for tag in &wanted {
                        if have.contains(tag) || mode == TagFilterMode::All {
                            groups
                                .entry((*tag).to_string())
                                .or_default()
                                .push(view.clone());
                        }
                    }
                }
            }
        }
    }

    groups
        .into_iter()
        .map(|(tag, views)| (tag, exposures(&views)))
        .collect()
}

/// Group a stock and its options under the shared underlying symbol.
pub fn by_underlying(positions: &[PositionView]) -> HashMap<String, UnderlyingGroup> {
    let mut groups: HashMap<String, Vec<PositionView>> = HashMap::new();

    for view in positions {
        let underlying = view
            .underlying_symbol
            .clone()
            .unwrap_or_else(|| view.symbol.clone());
        groups.entry(underlying).or_default().push(view.clone());
    }

    groups
        .into_iter()
        .map(|(underlying, views)| {
            let exp = exposures(&views);
            let summed = greeks(&views);
            (
                underlying,
                UnderlyingGroup {
                    count: views.len(),
                    exposure: exp.net,
                    greeks: summed,
                },
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

const CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Clone)]
struct CacheEntry {
    at: Instant,
    exposures: ExposureBreakdown,
    greeks: GreeksTotals,
    delta_adjusted: DeltaAdjusted,
}

fn cache() -> &'static DashMap<(Uuid, NaiveDate, u64), CacheEntry> {
    static CACHE: OnceLock<DashMap<(Uuid, NaiveDate, u64), CacheEntry>> = OnceLock::new();
    CACHE.get_or_init(DashMap::new)
}

fn positions_fingerprint(positions: &[PositionView]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for view in positions {
        view.position_id.hash(&mut hasher);
        view.position_type.hash(&mut hasher);
        view.exposure.map(f64::to_bits).hash(&mut hasher);
        view.market_value.map(f64::to_bits).hash(&mut hasher);
        if let Some(g) = &view.greeks {
            g.delta.to_bits().hash(&mut hasher);
            g.gamma.to_bits().hash(&mut hasher);
        }
    }
    hasher.finish()
}

/// Cached full aggregation for one (portfolio, date, positions) triple.
/// Entries live for 60 seconds; any write that touches positions or their
/// Greeks must call [`clear_cache`].
pub fn aggregate_cached(
    portfolio_id: Uuid,
    date: NaiveDate,
    positions: &[PositionView],
    mode: DeltaAdjustMode,
) -> (ExposureBreakdown, GreeksTotals, DeltaAdjusted) {
    let mode_bit = match mode {
        DeltaAdjustMode::Absolute => 0u64,
        DeltaAdjustMode::Directional => 1u64,
    };
    let key = (portfolio_id, date, positions_fingerprint(positions) ^ mode_bit);

    if let Some(entry) = cache().get(&key) {
        if entry.at.elapsed() < CACHE_TTL {
            let e = entry.value().clone();
            return (e.exposures, e.greeks, e.delta_adjusted);
        }
    }

    let exposures_result = exposures(positions);
    let greeks_result = greeks(positions);
    let delta_result = delta_adjusted_exposure(positions, mode);

    cache().insert(
        key,
        CacheEntry {
            at: Instant::now(),
            exposures: exposures_result.clone(),
            greeks: greeks_result.clone(),
            delta_adjusted: delta_result,
        },
    );

    (exposures_result, greeks_result, delta_result)
}

/// Drop every cached aggregation.
pub fn clear_cache() {
    cache().clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GreeksValues;

    fn view(
        position_type: &str,
        quantity: f64,
        market_value: f64,
        exposure: f64,
    ) -> PositionView {
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

    fn with_greeks(mut v: PositionView, delta: f64) -> PositionView {
        v.greeks = Some(GreeksValues {
            delta,
            gamma: 0.0,
            theta: 0.0,
            vega: 0.0,
            rho: 0.0,
        });
        v
    }

    /// The mixed long/short/option book from the exposure contract:
    /// LONG 100 @ 150, SHORT -50 @ 200, LC 10 @ 5 (x100).
    fn mixed_book() -> Vec<PositionView> {
        vec![
            view("LONG", 100.0, 15_000.0, 15_000.0),
            view("SHORT", -50.0, 10_000.0, -10_000.0),
            view("LC", 10.0, 5_000.0, 5_000.0),
        ]
    }

    #[test]
    fn mixed_book_exposures() {
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
        assert_eq!(result.metadata.excluded_positions, 0);
    }

    #[test]
    fn gross_is_long_plus_abs_short() {
        let result = exposures(&mixed_book());
        assert_eq!(result.gross, result.long + result.short.abs());
        assert_eq!(result.net, result.long + result.short);
    }

    #[test]
    fn zero_exposure_counts_neither_long_nor_short() {
        let result = exposures(&[view("LONG", 0.0, 0.0, 0.0)]);
        assert_eq!(result.long_count, 0);
        assert_eq!(result.short_count, 0);
        assert_eq!(result.gross, 0.0);
        assert_eq!(result.metadata.excluded_positions, 0);
    }

    #[test]
    fn empty_input_is_all_zeros() {
        let result = exposures(&[]);
        assert_eq!(result, ExposureBreakdown::default());
    }

    #[test]
    fn missing_valuation_is_excluded_with_warning() {
        let mut broken = view("LONG", 100.0, 15_000.0, 15_000.0);
        broken.market_value = None;
        let result = exposures(&[broken, view("LC", 10.0, 5_000.0, 5_000.0)]);
        assert_eq!(result.metadata.excluded_positions, 1);
        assert_eq!(result.gross, 5_000.00);
        assert!(!result.metadata.warnings.is_empty());
    }

    #[test]
    fn unknown_type_is_excluded() {
        let result = exposures(&[view("STRADDLE", 1.0, 100.0, 100.0)]);
        assert_eq!(result.metadata.excluded_positions, 1);
        assert_eq!(result.gross, 0.0);
    }

    #[test]
    fn greeks_skip_null_rows_with_count() {
        let positions = vec![
            with_greeks(view("LONG", 100.0, 15_000.0, 15_000.0), 1.0),
            with_greeks(view("LC", 10.0, 5_000.0, 5_000.0), 650.0),
            view("LP", 5.0, 1_000.0, 1_000.0), // greeks failed upstream
        ];
        let result = greeks(&positions);
        assert_eq!(result.delta, 651.0);
        assert_eq!(result.metadata.skipped_greeks, 1);
    }

    #[test]
    fn delta_adjusted_absolute_mode() {
        // LC delta 0.65/share -> engine delta = 0.65 * 10 * 100 = 650
        let positions = vec![
            with_greeks(view("LONG", 100.0, 15_000.0, 15_000.0), 1.0),
            with_greeks(view("SHORT", -50.0, 10_000.0, -10_000.0), -1.0),
            with_greeks(view("LC", 10.0, 5_000.0, 5_000.0), 650.0),
        ];
        let result = delta_adjusted_exposure(&positions, DeltaAdjustMode::Absolute);
        assert_eq!(result.raw_exposure, 30_000.00);
        // stocks at full weight, option at |0.65|: 25000 + 3250
        assert_eq!(result.delta_adjusted_exposure, 28_250.00);
    }

    #[test]
    fn delta_adjusted_directional_mode() {
        let positions = vec![
            with_greeks(view("LONG", 100.0, 15_000.0, 15_000.0), 1.0),
            with_greeks(view("SHORT", -50.0, 10_000.0, -10_000.0), -1.0),
            with_greeks(view("SC", 10.0, 5_000.0, -5_000.0), -650.0),
        ];
        let result = delta_adjusted_exposure(&positions, DeltaAdjustMode::Directional);
        // 15000*1 + 10000*(-1) + 5000*(-0.65) = 1750
        assert_eq!(result.delta_adjusted_exposure, 1_750.00);
    }

    #[test]
    fn option_without_delta_drops_out_of_adjusted_view() {
        let positions = vec![view("LC", 10.0, 5_000.0, 5_000.0)];
        let result = delta_adjusted_exposure(&positions, DeltaAdjustMode::Absolute);
        assert_eq!(result.raw_exposure, 5_000.00);
        assert_eq!(result.delta_adjusted_exposure, 0.0);
    }

    #[test]
    fn by_tags_without_filter_groups_each_tag() {
        let mut a = view("LONG", 100.0, 15_000.0, 15_000.0);
        a.tags = vec!["tech".to_string(), "core".to_string()];
        let mut b = view("SHORT", -50.0, 10_000.0, -10_000.0);
        b.tags = vec!["tech".to_string()];

        let groups = by_tags(&[a, b], None, TagFilterMode::Any);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["tech"].gross, 25_000.00);
        assert_eq!(groups["core"].gross, 15_000.00);
    }

    #[test]
    fn by_tags_all_mode_requires_every_tag() {
        let mut a = view("LONG", 100.0, 15_000.0, 15_000.0);
        a.tags = vec!["tech".to_string(), "core".to_string()];
        let mut b = view("LONG", 10.0, 1_000.0, 1_000.0);
        b.tags = vec!["tech".to_string()];

        let filter = vec!["tech".to_string(), "core".to_string()];
        let groups = by_tags(&[a, b], Some(&filter), TagFilterMode::All);
        assert_eq!(groups["tech"].gross, 15_000.00);
        assert_eq!(groups["core"].gross, 15_000.00);
    }

    #[test]
    fn by_underlying_groups_stock_with_its_options() {
        let mut stock = view("LONG", 100.0, 15_000.0, 15_000.0);
        stock.symbol = "AAPL".to_string();
        let mut option = with_greeks(view("LC", 10.0, 5_000.0, 5_000.0), 650.0);
        option.symbol = "AAPL260116C00150000".to_string();
        option.underlying_symbol = Some("AAPL".to_string());

        let groups = by_underlying(&[stock, option]);
        assert_eq!(groups.len(), 1);
        let group = &groups["AAPL"];
        assert_eq!(group.count, 2);
        assert_eq!(group.exposure, 20_000.00);
    }

    #[test]
    fn cache_round_trip_and_clear() {
        clear_cache();
        let id = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let book = mixed_book();

        let (first, _, _) = aggregate_cached(id, date, &book, DeltaAdjustMode::Absolute);
        let (second, _, _) = aggregate_cached(id, date, &book, DeltaAdjustMode::Absolute);
        assert_eq!(first, second);

        clear_cache();
        let (third, _, _) = aggregate_cached(id, date, &book, DeltaAdjustMode::Absolute);
        assert_eq!(first, third);
    }

    #[test]
    fn no_field_is_named_notional_exposure() {
        let result = exposures(&mixed_book());
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"notional\""));
        assert!(!json.contains("notional_exposure"));
    }
}
