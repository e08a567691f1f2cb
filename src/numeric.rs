use bigdecimal::{BigDecimal, ToPrimitive};

/// Monetary amounts persist at 2 decimal places.
pub fn money(value: f64) -> BigDecimal {
    decimal(value, 2)
}

/// Per-position Greeks persist at 4 decimal places.
pub fn greek(value: f64) -> BigDecimal {
    decimal(value, 4)
}

/// Greeks stored on portfolio snapshots use the monetary scale.
pub fn snapshot_greek(value: f64) -> BigDecimal {
    decimal(value, 2)
}

fn decimal(value: f64, scale: usize) -> BigDecimal {
    // Fixed-point formatting does the rounding; non-finite input degrades to
    // zero rather than poisoning a row
    format!("{:.*}", scale, value).parse().unwrap_or_default()
}

/// Round an f64 to the given number of decimal places; aggregation results
/// are rounded before leaving the pure functions.
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

pub fn to_f64(value: &BigDecimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}
