//! Liquidity gate.
//!
//! Admission check run before any signal evaluation: the venue must quote
//! a tight enough spread and recent bars must carry enough notional
//! volume. A missing spread is a reject, never a pass.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing::debug;

use crate::exchanges::Venue;
use crate::types::Bar;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiquidityConfig {
    /// Spread ceiling in percent of mid price.
    pub max_spread_pct: Decimal,
    /// Notional floor over the most recent fast bars.
    pub min_notional_fast: Decimal,
    /// Notional floor over the most recent slow bars.
    pub min_notional_slow: Decimal,
    /// How many trailing bars count towards the notional estimate.
    pub notional_bars: usize,
}

impl Default for LiquidityConfig {
    fn default() -> Self {
        Self {
            max_spread_pct: dec!(1.0),
            min_notional_fast: dec!(50000),
            min_notional_slow: dec!(150000),
            notional_bars: 1,
        }
    }
}

/// Gate outcome with the metrics it was based on.
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidityDecision {
    pub passed: bool,
    pub reason: String,
    pub spread_pct: Option<Decimal>,
    pub notional_fast: Decimal,
    pub notional_slow: Decimal,
}

/// Σ(volume × close) over the last `last_n` bars (all bars if fewer).
pub fn recent_notional(bars: &[Bar], last_n: usize) -> Decimal {
    let start = bars.len().saturating_sub(last_n.max(1));
    bars[start..].iter().map(Bar::notional).sum()
}

pub struct LiquidityGate {
    config: LiquidityConfig,
}

impl LiquidityGate {
    pub fn new(config: LiquidityConfig) -> Self {
        Self { config }
    }

    /// Pure decision from an already-fetched spread.
    pub fn evaluate(&self, spread_pct: Option<Decimal>, fast: &[Bar], slow: &[Bar]) -> LiquidityDecision {
        let cfg = &self.config;
        let notional_fast = recent_notional(fast, cfg.notional_bars);
        let notional_slow = recent_notional(slow, cfg.notional_bars);

        let reject = |reason: String| LiquidityDecision {
            passed: false,
            reason,
            spread_pct,
            notional_fast,
            notional_slow,
        };

        let Some(spread) = spread_pct else {
            return reject("no bid/ask data (spread unavailable)".to_string());
        };
        if spread > cfg.max_spread_pct {
            return reject(format!("spread too wide: {}%", spread.round_dp(2)));
        }
        if notional_fast < cfg.min_notional_fast && notional_slow < cfg.min_notional_slow {
            return reject(format!(
                "thin liquidity: fast=${}, slow=${}",
                notional_fast.round_dp(0),
                notional_slow.round_dp(0)
            ));
        }

        LiquidityDecision {
            passed: true,
            reason: "OK".to_string(),
            spread_pct,
            notional_fast,
            notional_slow,
        }
    }

    /// Fetch the current spread from `venue` and decide.
    pub async fn assess(&self, venue: &dyn Venue, symbol: &str, fast: &[Bar], slow: &[Bar]) -> LiquidityDecision {
        let spread = venue.spread_pct(symbol).await;
        let decision = self.evaluate(spread, fast, slow);
        debug!(
            symbol,
            venue = %venue.id(),
            passed = decision.passed,
            reason = %decision.reason,
            "Liquidity gate"
        );
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::fixtures::{ascending_breakout_window, bar};

    fn gate() -> LiquidityGate {
        LiquidityGate::new(LiquidityConfig::default())
    }

    fn liquid_bar() -> Bar {
        // 1000 × 100 = 100k notional
        bar(dec!(100), dec!(101), dec!(99), dec!(100), dec!(1000))
    }

    fn thin_bar() -> Bar {
        bar(dec!(1), dec!(1), dec!(1), dec!(1), dec!(10))
    }

    #[test]
    fn test_missing_spread_rejects_regardless_of_volume() {
        let windows: Vec<Vec<Bar>> = vec![
            vec![],
            vec![thin_bar()],
            vec![liquid_bar(), liquid_bar()],
            ascending_breakout_window(),
        ];
        for fast in &windows {
            for slow in &windows {
                let d = gate().evaluate(None, fast, slow);
                assert!(!d.passed);
                assert!(d.reason.contains("spread"));
            }
        }
    }

    #[test]
    fn test_wide_spread_rejects() {
        let d = gate().evaluate(Some(dec!(1.5)), &[liquid_bar()], &[liquid_bar()]);
        assert!(!d.passed);
        assert!(d.reason.contains("spread too wide"));
    }

    #[test]
    fn test_both_notionals_below_floor_reject() {
        let d = gate().evaluate(Some(dec!(0.2)), &[thin_bar()], &[thin_bar()]);
        assert!(!d.passed);
        assert!(d.reason.contains("thin liquidity"));
    }

    #[test]
    fn test_one_notional_above_floor_passes() {
        // Fast 100k ≥ 50k floor, slow thin
        let d = gate().evaluate(Some(dec!(0.2)), &[liquid_bar()], &[thin_bar()]);
        assert!(d.passed);
        assert_eq!(d.notional_fast, dec!(100000));
        assert_eq!(d.reason, "OK");
    }

    #[test]
    fn test_recent_notional_counts_trailing_bars() {
        let bars = vec![thin_bar(), liquid_bar(), liquid_bar()];
        assert_eq!(recent_notional(&bars, 1), dec!(100000));
        assert_eq!(recent_notional(&bars, 2), dec!(200000));
        assert_eq!(recent_notional(&bars, 10), dec!(200010));
        assert_eq!(recent_notional(&[], 1), Decimal::ZERO);
    }
}
