//! Serialization-boundary rounding.
//!
//! Baselines and live states keep full `f64` precision in memory. Rounding is
//! applied only when they are serialized: factors to 2 decimals, minute values
//! to 1 decimal.

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::Serializer;

/// Decimal places for multiplicative factors.
pub const FACTOR_DECIMALS: u32 = 2;

/// Decimal places for minute values.
pub const MINUTE_DECIMALS: u32 = 1;

/// Round `value` to `decimals` places. Non-finite values serialize as 0.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

pub(crate) fn serialize_minutes<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_to(*value, MINUTE_DECIMALS))
}

pub(crate) fn serialize_factor<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_to(*value, FACTOR_DECIMALS))
}

pub(crate) fn serialize_factor_map<S: Serializer>(
    factors: &BTreeMap<String, f64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(factors.len()))?;
    for (player, factor) in factors {
        map.serialize_entry(player, &round_to(*factor, FACTOR_DECIMALS))?;
    }
    map.end()
}
