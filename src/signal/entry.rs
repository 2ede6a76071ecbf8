//! Entry planner.
//!
//! Turns a bar window into a BREAKOUT / PULLBACK / WAIT entry window with
//! ATR-scaled stop and invalidation levels. Prices are rounded to a
//! magnitude tier because listed assets span many orders of magnitude.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing::debug;

use crate::types::{Bar, EntryMode, EntryPlan, Timeframe};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EntryConfig {
    /// Fewer bars → WAIT.
    pub min_bars: usize,
    pub fast_lookback: usize,
    pub slow_lookback: usize,
    pub fast_stop_atr_mult: Decimal,
    pub slow_stop_atr_mult: Decimal,
    pub atr_period: usize,
    /// ATR substitute (fraction of swing) for flat windows.
    pub atr_fallback_swing_frac: Decimal,
    pub buffer_atr_frac: Decimal,
    pub buffer_swing_frac: Decimal,
    /// Close within this fraction of the range high opens a breakout window.
    pub breakout_proximity: Decimal,
    /// Breakout trigger sits this fraction above the range high.
    pub breakout_trigger: Decimal,
    /// Pullback entry as a fraction of the swing above the range low.
    pub pullback_retrace: Decimal,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            min_bars: 20,
            fast_lookback: 8,
            slow_lookback: 10,
            fast_stop_atr_mult: dec!(1.2),
            slow_stop_atr_mult: dec!(1.0),
            atr_period: 14,
            atr_fallback_swing_frac: dec!(0.15),
            buffer_atr_frac: dec!(0.25),
            buffer_swing_frac: dec!(0.05),
            breakout_proximity: dec!(0.005),
            breakout_trigger: dec!(0.002),
            pullback_retrace: dec!(0.5),
        }
    }
}

impl EntryConfig {
    fn lookback(&self, tf: Timeframe) -> usize {
        match tf {
            Timeframe::Fast => self.fast_lookback,
            Timeframe::Slow => self.slow_lookback,
        }
    }

    fn stop_atr_mult(&self, tf: Timeframe) -> Decimal {
        match tf {
            Timeframe::Fast => self.fast_stop_atr_mult,
            Timeframe::Slow => self.slow_stop_atr_mult,
        }
    }
}

/// Round a price to its magnitude tier: 2 decimals from 1000, 6 decimals
/// from 1, 10 decimals below. Ties round to even.
pub fn round_price(x: Decimal) -> Decimal {
    if x >= dec!(1000) {
        x.round_dp(2)
    } else if x >= Decimal::ONE {
        x.round_dp(6)
    } else {
        x.round_dp(10)
    }
}

/// Mean true range over the last `period` bars (each needs a previous
/// close, so at most `len - 1` ranges). Zero for fewer than two bars.
pub fn average_true_range(bars: &[Bar], period: usize) -> Decimal {
    if bars.len() < 2 || period == 0 {
        return Decimal::ZERO;
    }
    let start = bars.len().saturating_sub(period).max(1);
    let ranges: Vec<Decimal> = (start..bars.len())
        .map(|i| {
            let (bar, prev_close) = (&bars[i], bars[i - 1].close);
            bar.range()
                .max((bar.high - prev_close).abs())
                .max((bar.low - prev_close).abs())
        })
        .collect();
    ranges.iter().copied().sum::<Decimal>() / Decimal::from(ranges.len() as u64)
}

pub struct EntryPlanner {
    config: EntryConfig,
}

impl EntryPlanner {
    pub fn new(config: EntryConfig) -> Self {
        Self { config }
    }

    /// Build the entry window for a bar window on timeframe `tf`.
    pub fn plan(&self, bars: &[Bar], tf: Timeframe) -> EntryPlan {
        let cfg = &self.config;
        let lookback = cfg.lookback(tf).max(1);

        if bars.len() < cfg.min_bars.max(lookback) {
            return EntryPlan::wait(vec![format!(
                "insufficient bars for entry (have {}, need {})",
                bars.len(),
                cfg.min_bars.max(lookback)
            )]);
        }
        let Some(last) = bars.last() else {
            return EntryPlan::wait(vec!["empty window".to_string()]);
        };

        let window = &bars[bars.len() - lookback..];
        let range_high = window.iter().map(|b| b.high).max().unwrap_or(last.high);
        let range_low = window.iter().map(|b| b.low).min().unwrap_or(last.low);
        let swing = (range_high - range_low).max(Decimal::ZERO);

        let mut atr = average_true_range(bars, cfg.atr_period);
        if atr <= Decimal::ZERO {
            atr = swing * cfg.atr_fallback_swing_frac;
        }
        let buffer = (atr * cfg.buffer_atr_frac).max(swing * cfg.buffer_swing_frac);
        let structural_stop = range_low - buffer;
        let stop_mult = cfg.stop_atr_mult(tf);

        let mut notes = vec![
            format!("TF={tf}"),
            format!("range_high={range_high}, range_low={range_low}, swing={swing}"),
            format!("ATR≈{}, buffer≈{}", round_price(atr), round_price(buffer)),
        ];

        let mode_and_entry = if last.close >= range_high * (Decimal::ONE - cfg.breakout_proximity) {
            notes.push(format!(
                "breakout window open: trigger +{}% above range high",
                cfg.breakout_trigger * dec!(100)
            ));
            Some((EntryMode::Breakout, range_high * (Decimal::ONE + cfg.breakout_trigger)))
        } else {
            let pullback_level = range_low + cfg.pullback_retrace * swing;
            if swing > Decimal::ZERO && last.close > pullback_level {
                notes.push(format!(
                    "pullback window open: entry at {}% retrace of swing",
                    cfg.pullback_retrace * dec!(100)
                ));
                Some((EntryMode::Pullback, pullback_level))
            } else {
                None
            }
        };

        let Some((mode, entry)) = mode_and_entry else {
            notes.push("no clean entry window".to_string());
            debug!(%tf, close = %last.close, %range_high, %range_low, "Entry: WAIT");
            return EntryPlan::wait(notes);
        };

        let stop = structural_stop.min(entry - stop_mult * atr);
        debug!(%tf, %mode, %entry, %stop, %atr, "Entry window");

        EntryPlan {
            mode,
            entry: Some(round_price(entry)),
            stop: Some(round_price(stop)),
            invalidation: Some(round_price(structural_stop)),
            range_high: Some(range_high),
            range_low: Some(range_low),
            notes,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::fixtures::{ascending_breakout_window, bar, flat_window};

    fn planner() -> EntryPlanner {
        EntryPlanner::new(EntryConfig::default())
    }

    #[test]
    fn test_round_price_tiers() {
        assert_eq!(round_price(dec!(65432.12345)), dec!(65432.12));
        assert_eq!(round_price(dec!(1.23456789)), dec!(1.234568));
        assert_eq!(round_price(dec!(0.000012345678912)), dec!(0.0000123457));
        // Banker's rounding on exact ties
        assert_eq!(round_price(dec!(1000.125)), dec!(1000.12));
    }

    #[test]
    fn test_atr_uses_trailing_true_ranges() {
        // Two bars: TR = max(1, |12 - 10|, |11 - 10|) = 2
        let bars = vec![
            bar(dec!(10), dec!(10), dec!(10), dec!(10), dec!(1)),
            bar(dec!(11), dec!(12), dec!(11), dec!(11.5), dec!(1)),
        ];
        assert_eq!(average_true_range(&bars, 14), dec!(2));
        assert_eq!(average_true_range(&bars[..1], 14), Decimal::ZERO);
    }

    #[test]
    fn test_short_window_waits_with_null_prices() {
        let plan = planner().plan(&flat_window(19), Timeframe::Fast);
        assert_eq!(plan.mode, EntryMode::Wait);
        assert!(plan.entry.is_none() && plan.stop.is_none() && plan.invalidation.is_none());
    }

    #[test]
    fn test_breakout_entry_above_range_high() {
        let bars = ascending_breakout_window();
        let plan = planner().plan(&bars, Timeframe::Fast);
        assert_eq!(plan.mode, EntryMode::Breakout);

        let range_high = plan.range_high.unwrap();
        assert_eq!(range_high, dec!(122));
        assert_eq!(plan.entry, Some(dec!(122.244)));
        assert!(plan.entry.unwrap() > range_high);
        // Structural stop is the lower of the two candidates here
        assert_eq!(plan.stop, Some(dec!(110.975)));
        assert_eq!(plan.invalidation, Some(dec!(110.975)));
        assert!(plan.risk().unwrap() > Decimal::ZERO);
    }

    #[test]
    fn test_pullback_entry_inside_range() {
        let mut bars = ascending_breakout_window();
        // Last bar retreats from the high but stays above mid-range
        let last = bars.len() - 1;
        bars[last] = bar(dec!(119), dec!(120), dec!(117.9), dec!(118), dec!(1000));

        let plan = planner().plan(&bars, Timeframe::Fast);
        assert_eq!(plan.mode, EntryMode::Pullback);
        let (lo, hi, entry) = (plan.range_low.unwrap(), plan.range_high.unwrap(), plan.entry.unwrap());
        assert!(lo < entry && entry < hi, "{lo} < {entry} < {hi}");
        assert_eq!(entry, dec!(115.75));
        assert!(plan.stop.unwrap() < entry);
    }

    #[test]
    fn test_close_at_low_waits() {
        let mut bars = ascending_breakout_window();
        let last = bars.len() - 1;
        bars[last] = bar(dec!(119), dec!(122), dec!(110), dec!(110), dec!(5000));

        let plan = planner().plan(&bars, Timeframe::Fast);
        assert_eq!(plan.mode, EntryMode::Wait);
        assert!(plan.entry.is_none() && plan.stop.is_none() && plan.invalidation.is_none());
    }

    #[test]
    fn test_flat_window_uses_swing_fallback() {
        // Perfectly flat bars: ATR and swing are zero, close sits on the high
        let bars: Vec<Bar> = (0..20)
            .map(|_| bar(dec!(2), dec!(2), dec!(2), dec!(2), dec!(10)))
            .collect();
        let plan = planner().plan(&bars, Timeframe::Slow);
        assert_eq!(plan.mode, EntryMode::Breakout);
        assert_eq!(plan.entry, Some(dec!(2.004)));
        assert_eq!(plan.stop, Some(dec!(2)));
    }

    #[test]
    fn test_slow_timeframe_uses_longer_lookback() {
        let bars = ascending_breakout_window();
        let fast = planner().plan(&bars, Timeframe::Fast);
        let slow = planner().plan(&bars, Timeframe::Slow);
        // Ten-bar lookback reaches two bars further back
        assert_eq!(fast.range_low, Some(dec!(111.5)));
        assert_eq!(slow.range_low, Some(dec!(109.5)));
    }
}
