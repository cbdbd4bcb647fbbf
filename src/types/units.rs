//! Unit Conversion Utilities
//!
//! Helpers for converting between satoshis, BTC and currency units at the
//! configured exchange rate. Rate math runs on `Decimal` so amounts survive
//! the conversion without float drift; results are truncated to whole units.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Satoshis per Bitcoin
pub const SATS_PER_BTC: u64 = 100_000_000;

/// Convert a BTC float (as reported by the wallet node) to satoshis
pub fn btc_to_sats(btc: f64) -> u64 {
    (btc * SATS_PER_BTC as f64).round() as u64
}

/// Convert satoshis to a BTC string (e.g., "0.00100000")
pub fn sats_to_btc_string(sats: u64) -> String {
    format_units(sats, 8)
}

/// Format an integer amount of smallest units at the given decimal count
/// e.g., 15_000_000 units at 4 decimals -> "1500.0000"
pub fn format_units(units: u64, decimals: u8) -> String {
    if decimals == 0 {
        return units.to_string();
    }
    let decimals = decimals.min(18);
    let scale = 10u64.pow(decimals as u32);
    format!(
        "{}.{:0width$}",
        units / scale,
        units % scale,
        width = decimals as usize
    )
}

/// Currency units (at `decimals`) bought by `sats` at `rate` tokens per BTC.
///
/// Truncates toward zero. Returns `None` when the result does not fit in a
/// u64 or the inputs are out of range.
pub fn token_units_from_sats(sats: u64, rate: Decimal, decimals: u8) -> Option<u64> {
    if decimals > 18 {
        return None;
    }
    let btc = Decimal::from(sats) / Decimal::from(SATS_PER_BTC);
    let scale = Decimal::from(10u64.pow(decimals as u32));
    btc.checked_mul(rate)?.checked_mul(scale)?.trunc().to_u64()
}

/// Satoshis owed for `units` currency units (at `decimals`) at `rate` tokens
/// per BTC. Truncates toward zero; `None` for a non-positive rate or overflow.
pub fn sats_from_token_units(units: u64, rate: Decimal, decimals: u8) -> Option<u64> {
    if decimals > 18 || rate <= Decimal::ZERO {
        return None;
    }
    let scale = Decimal::from(10u64.pow(decimals as u32));
    let tokens = Decimal::from(units) / scale;
    tokens
        .checked_div(rate)?
        .checked_mul(Decimal::from(SATS_PER_BTC))?
        .trunc()
        .to_u64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_btc_to_sats() {
        assert_eq!(btc_to_sats(0.0), 0);
        assert_eq!(btc_to_sats(0.00000001), 1);
        assert_eq!(btc_to_sats(1.0), 100_000_000);
        assert_eq!(btc_to_sats(1.5), 150_000_000);
    }

    #[test]
    fn test_sats_to_btc_string() {
        assert_eq!(sats_to_btc_string(0), "0.00000000");
        assert_eq!(sats_to_btc_string(1), "0.00000001");
        assert_eq!(sats_to_btc_string(100_000_000), "1.00000000");
        assert_eq!(sats_to_btc_string(123_456_789), "1.23456789");
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(15_000_000, 4), "1500.0000");
        assert_eq!(format_units(42, 0), "42");
        assert_eq!(format_units(7, 4), "0.0007");
    }

    #[test]
    fn test_token_units_from_sats() {
        // 1.5 BTC at 1000 tokens/BTC with 4 decimals
        assert_eq!(
            token_units_from_sats(150_000_000, Decimal::from(1000), 4),
            Some(15_000_000)
        );
        // 0.001 BTC at 1000 tokens/BTC = 1 token
        assert_eq!(
            token_units_from_sats(100_000, Decimal::from(1000), 4),
            Some(10_000)
        );
        assert_eq!(token_units_from_sats(0, Decimal::from(1000), 4), Some(0));
    }

    #[test]
    fn test_sats_from_token_units() {
        assert_eq!(
            sats_from_token_units(15_000_000, Decimal::from(1000), 4),
            Some(150_000_000)
        );
        // Sub-satoshi remainders truncate
        assert_eq!(sats_from_token_units(1, Decimal::from(3), 4), Some(3333));
        // Rate of zero has no inverse
        assert_eq!(sats_from_token_units(1, Decimal::ZERO, 4), None);
    }

    #[test]
    fn test_round_trip_whole_amounts() {
        let rate = Decimal::from(1000);
        let units = token_units_from_sats(200_000_000, rate, 4).unwrap();
        assert_eq!(sats_from_token_units(units, rate, 4), Some(200_000_000));
    }
}
