use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use crate::db::{correlation_queries, market_data_queries, position_queries};
use crate::errors::AppError;
use crate::models::{CorrelationMatrix, CorrelationPair, CorrelationPayload, FactorType, MarketDataPoint};
use crate::services::factor_service::aligned_returns;
use crate::state::EngineContext;

#[derive(Debug, Default)]
pub struct CorrelationOutcome {
    pub payload: Option<CorrelationPayload>,
    pub warnings: Vec<String>,
}

/// Engine H: pairwise correlations across the portfolio's position return
/// series plus the factor-proxy matrix, one payload row per (portfolio,
/// date). The weekday gate lives in the orchestrator; invoking this directly
/// always computes.
pub async fn run_correlation_engine(
    ctx: &EngineContext,
    portfolio_id: Uuid,
    date: NaiveDate,
) -> Result<CorrelationOutcome, AppError> {
    let mut outcome = CorrelationOutcome::default();

    let mut symbols = position_queries::fetch_symbols(&ctx.pool, portfolio_id).await?;
    symbols.sort();
    symbols.dedup();

    if symbols.len() < 2 {
        outcome.warnings.push(format!(
            "correlation needs at least 2 symbols, portfolio has {}",
            symbols.len()
        ));
        return Ok(outcome);
    }

    let windows =
        market_data_queries::fetch_window_batch(&ctx.pool, &symbols, ctx.config.rolling_window_days)
            .await?;

    // Keep only symbols with enough history, preserving order
    let usable: Vec<String> = symbols
        .iter()
        .filter(|s| windows.get(*s).map(|w| w.len() >= 2).unwrap_or(false))
        .cloned()
        .collect();
    for missing in symbols.iter().filter(|s| !usable.contains(s)) {
        outcome
            .warnings
            .push(format!("no return history for {}, dropped from matrix", missing));
    }

    if usable.len() < 2 {
        outcome.warnings.push(format!(
            "only {} symbol(s) with price history, correlation skipped",
            usable.len()
        ));
        return Ok(outcome);
    }

    let positions_matrix = build_matrix(&usable, &windows);

    // Factor-proxy matrix alongside the position matrix
    let proxy_symbols: Vec<String> = FactorType::all()
        .iter()
        .map(|f| f.proxy_symbol().to_string())
        .collect();
    let proxy_windows = market_data_queries::fetch_window_batch(
        &ctx.pool,
        &proxy_symbols,
        ctx.config.rolling_window_days,
    )
    .await?;
    let usable_proxies: Vec<String> = proxy_symbols
        .iter()
        .filter(|s| proxy_windows.get(*s).map(|w| w.len() >= 2).unwrap_or(false))
        .cloned()
        .collect();
    let factors_matrix = if usable_proxies.len() >= 2 {
        Some(build_matrix(&usable_proxies, &proxy_windows))
    } else {
        outcome
            .warnings
            .push("factor proxy history too thin, factor matrix omitted".to_string());
        None
    };

    let payload = CorrelationPayload {
        positions: positions_matrix,
        factors: factors_matrix,
        window_days: ctx.config.rolling_window_days,
    };

    let json = serde_json::to_value(&payload)
        .map_err(|e| AppError::External(format!("correlation serialization: {}", e)))?;
    correlation_queries::upsert(
        &ctx.pool,
        portfolio_id,
        date,
        ctx.config.rolling_window_days as i32,
        &json,
    )
    .await?;

    info!(
        "Correlation engine stored {}x{} matrix for portfolio {}",
        payload.positions.symbols.len(),
        payload.positions.symbols.len(),
        portfolio_id
    );

    outcome.payload = Some(payload);
    Ok(outcome)
}

/// Upper-triangle pairwise correlations expanded into the full symmetric
/// matrix with a unit diagonal.
pub fn build_matrix(
    symbols: &[String],
    windows: &HashMap<String, Vec<MarketDataPoint>>,
) -> CorrelationMatrix {
    let n = symbols.len();
    let mut pairs = Vec::new();
    let mut matrix_2d = vec![vec![0.0; n]; n];

    for (i, row) in matrix_2d.iter_mut().enumerate().take(n) {
        row[i] = 1.0;
    }

    for i in 0..n {
        for j in (i + 1)..n {
            let (Some(wi), Some(wj)) = (windows.get(&symbols[i]), windows.get(&symbols[j])) else {
                continue;
            };
            let (ri, rj) = aligned_returns(wi, wj);
            if let Some(corr) = pearson(&ri, &rj) {
                pairs.push(CorrelationPair {
                    symbol1: symbols[i].clone(),
                    symbol2: symbols[j].clone(),
                    correlation: corr,
                });
                matrix_2d[i][j] = corr;
                matrix_2d[j][i] = corr;
            }
        }
    }

    CorrelationMatrix {
        symbols: symbols.to_vec(),
        pairs,
        matrix_2d,
    }
}

/// Pearson correlation of two return series.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (xi, yi) in x.iter().zip(y.iter()) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let std_x = var_x.sqrt();
    let std_y = var_y.sqrt();
    if std_x < f64::EPSILON || std_y < f64::EPSILON {
        return None;
    }

    Some(cov / (std_x * std_y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::{BigDecimal, FromPrimitive};
    use chrono::{Duration, Utc};

    fn window(symbol: &str, closes: &[f64]) -> Vec<MarketDataPoint> {
        let start = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| MarketDataPoint {
                id: Uuid::new_v4(),
                symbol: symbol.to_string(),
                date: start + Duration::days(i as i64),
                open: None,
                high: None,
                low: None,
                close: BigDecimal::from_f64(*c).unwrap(),
                volume: None,
                sector: None,
                industry: None,
                created_at: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn identical_series_correlate_perfectly() {
        let a = vec![0.01, -0.02, 0.015, 0.005, -0.01];
        let corr = pearson(&a, &a).unwrap();
        assert!((corr - 1.0).abs() < 1e-12);
    }

    #[test]
    fn opposite_series_correlate_negatively() {
        let a = vec![0.01, -0.02, 0.015, 0.005, -0.01];
        let b: Vec<f64> = a.iter().map(|r| -r).collect();
        let corr = pearson(&a, &b).unwrap();
        assert!((corr + 1.0).abs() < 1e-12);
    }

    #[test]
    fn constant_series_has_no_correlation() {
        let a = vec![0.01, -0.02, 0.015];
        let b = vec![0.0, 0.0, 0.0];
        assert!(pearson(&a, &b).is_none());
    }

    #[test]
    fn matrix_is_symmetric_with_unit_diagonal() {
        let mut windows = HashMap::new();
        windows.insert("A".to_string(), window("A", &[100.0, 102.0, 101.0, 104.0, 103.0]));
        windows.insert("B".to_string(), window("B", &[50.0, 51.5, 50.2, 52.0, 51.4]));
        windows.insert("C".to_string(), window("C", &[10.0, 9.8, 10.1, 9.9, 10.2]));

        let symbols: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        let matrix = build_matrix(&symbols, &windows);

        assert_eq!(matrix.symbols.len(), 3);
        assert_eq!(matrix.pairs.len(), 3);
        for i in 0..3 {
            assert_eq!(matrix.matrix_2d[i][i], 1.0);
            for j in 0..3 {
                assert_eq!(matrix.matrix_2d[i][j], matrix.matrix_2d[j][i]);
            }
        }
    }
}
