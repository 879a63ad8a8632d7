//! Multiplier curve and payout arithmetic
//!
//! The multiplier grows as `exp(rate * elapsed_ms)` and is truncated to two
//! decimal places so the house never pays out a rounded-up figure. Money is
//! always exact decimal; only the curve itself is evaluated in `f64`.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::time::Duration;

/// Default growth rate per elapsed millisecond
pub const DEFAULT_GROWTH_RATE: f64 = 6e-5;

/// Upper bound on the lookahead performed when correcting a delay for
/// floating point error
const DELAY_CORRECTION_STEPS: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthCurve {
    rate: f64,
}

impl Default for GrowthCurve {
    fn default() -> Self {
        Self::new(DEFAULT_GROWTH_RATE)
    }
}

impl GrowthCurve {
    pub fn new(rate: f64) -> Self {
        Self { rate }
    }

    /// Multiplier after `elapsed`, counted in whole milliseconds and
    /// truncated to 2dp. Never below 1.00.
    pub fn multiplier_for_elapsed(&self, elapsed: Duration) -> Decimal {
        self.multiplier_for_millis(elapsed.as_millis() as u64)
    }

    fn multiplier_for_millis(&self, millis: u64) -> Decimal {
        let raw = (self.rate * millis as f64).exp();
        let exact = Decimal::from_f64(raw).unwrap_or(Decimal::MAX);
        let mut truncated = exact
            .checked_mul(Decimal::ONE_HUNDRED)
            .map(|scaled| scaled.trunc() / Decimal::ONE_HUNDRED)
            .unwrap_or_else(|| exact.trunc())
            .max(Decimal::ONE);
        truncated.rescale(2);
        truncated
    }

    /// Time from round start until the curve reaches `threshold`.
    ///
    /// Returns `None` for thresholds at or below 1.00, which mean manual
    /// cash-out only. The delay is rounded up to whole milliseconds, so the
    /// multiplier observed when it elapses is never below the threshold.
    pub fn auto_cash_out_delay(&self, threshold: Decimal) -> Option<Duration> {
        if threshold <= Decimal::ONE {
            return None;
        }

        let target = threshold.to_f64()?;
        let millis = (target.ln() / self.rate).ceil();
        if !millis.is_finite() || millis < 0.0 || millis > u64::MAX as f64 {
            return None;
        }

        let mut millis = millis as u64;
        for _ in 0..DELAY_CORRECTION_STEPS {
            if self.multiplier_for_millis(millis) >= threshold {
                break;
            }
            millis += 1;
        }

        Some(Duration::from_millis(millis))
    }
}

/// Exact payout for a stake at the given multiplier
pub fn payout(stake: Decimal, multiplier: Decimal) -> Decimal {
    stake.saturating_mul(multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_multiplier_starts_at_one() {
        let curve = GrowthCurve::default();
        let m = curve.multiplier_for_elapsed(Duration::ZERO);
        assert_eq!(m, Decimal::ONE);
        assert_eq!(m.to_string(), "1.00");
    }

    #[test]
    fn test_multiplier_is_monotonic() {
        let curve = GrowthCurve::default();
        let mut previous = Decimal::ONE;
        for ms in (0..60_000).step_by(37) {
            let m = curve.multiplier_for_elapsed(Duration::from_millis(ms));
            assert!(m >= previous, "multiplier dropped at {}ms", ms);
            previous = m;
        }
    }

    #[test]
    fn test_multiplier_truncates_instead_of_rounding() {
        let curve = GrowthCurve::default();
        // exp(6e-5 * 11552) = 1.99993.. which would round to 2.00
        assert_eq!(curve.multiplier_for_elapsed(Duration::from_millis(11_552)), dec("1.99"));
        assert_eq!(curve.multiplier_for_elapsed(Duration::from_millis(11_553)), dec("2.00"));
    }

    #[test]
    fn test_sub_millisecond_elapsed_is_ignored() {
        let curve = GrowthCurve::default();
        assert_eq!(
            curve.multiplier_for_elapsed(Duration::from_micros(11_552_999)),
            dec("1.99")
        );
    }

    #[test]
    fn test_auto_cash_out_delay_for_double() {
        let curve = GrowthCurve::default();
        let delay = curve.auto_cash_out_delay(dec("2.00")).unwrap();

        // ln(2) / 6e-5 = 11552.45, rounded up
        assert_eq!(delay, Duration::from_millis(11_553));
        assert_eq!(curve.multiplier_for_elapsed(delay), dec("2.00"));
        assert_eq!(payout(dec("100"), curve.multiplier_for_elapsed(delay)), dec("200"));
    }

    #[test]
    fn test_auto_cash_out_delay_never_undershoots() {
        let curve = GrowthCurve::default();
        for threshold in ["1.01", "1.10", "1.37", "1.50", "1.75", "2.33"] {
            let threshold = dec(threshold);
            let delay = curve.auto_cash_out_delay(threshold).unwrap();
            assert!(curve.multiplier_for_elapsed(delay) >= threshold);
        }
    }

    #[test]
    fn test_threshold_at_or_below_one_is_manual() {
        let curve = GrowthCurve::default();
        assert_eq!(curve.auto_cash_out_delay(Decimal::ONE), None);
        assert_eq!(curve.auto_cash_out_delay(Decimal::ZERO), None);
        assert_eq!(curve.auto_cash_out_delay(dec("-3")), None);
    }

    #[test]
    fn test_payout_is_exact() {
        assert_eq!(payout(dec("0.1"), dec("3.00")), dec("0.3"));
        assert_eq!(payout(dec("33.33"), dec("1.07")), dec("35.6631"));
        assert_eq!(payout(Decimal::ZERO, dec("9.99")), Decimal::ZERO);
    }
}
