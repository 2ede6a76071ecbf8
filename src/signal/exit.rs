//! Exit planner: risk-multiple targets from an entry plan.
//!
//! R = entry − stop (long only). TP1 = entry + R × mult, TP2 = entry + 2R.
//! Targets are informational; the radar never places orders.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::types::{ExitPlan, Grade, Timeframe};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExitConfig {
    pub tp1_mult: Decimal,
    /// TP1 multiple for B-grade setups on the slow timeframe.
    pub conservative_tp1_mult: Decimal,
    pub tp2_mult: Decimal,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            tp1_mult: dec!(1.0),
            conservative_tp1_mult: dec!(0.8),
            tp2_mult: dec!(2.0),
        }
    }
}

pub struct ExitPlanner {
    config: ExitConfig,
}

impl ExitPlanner {
    pub fn new(config: ExitConfig) -> Self {
        Self { config }
    }

    /// TP1 multiple: weaker confirmations lock in faster.
    pub fn tp1_multiplier(&self, grade: Grade, tf: Timeframe) -> Decimal {
        if grade == Grade::B && tf == Timeframe::Slow {
            self.config.conservative_tp1_mult
        } else {
            self.config.tp1_mult
        }
    }

    pub fn plan(
        &self,
        entry: Option<Decimal>,
        stop: Option<Decimal>,
        grade: Grade,
        tf: Timeframe,
    ) -> ExitPlan {
        let (Some(entry), Some(stop)) = (entry, stop) else {
            return ExitPlan::empty("no entry/stop to build an exit plan");
        };

        let r = entry - stop;
        if r <= Decimal::ZERO {
            return ExitPlan::empty("invalid R (entry <= stop)");
        }

        let tp1 = entry + r * self.tp1_multiplier(grade, tf);
        let tp2 = entry + r * self.config.tp2_mult;

        let trail_hint = match tf {
            Timeframe::Fast => "trail stop under higher lows (move only after candle close)",
            Timeframe::Slow => "trail stop under 15m higher lows / structure (after close)",
        };
        let notes = if grade == Grade::B {
            "conservative: take TP1 faster, protect break-even early"
        } else {
            "TP1 -> partial (30-50%) + stop to break-even; remainder -> TP2 or trail"
        };

        ExitPlan {
            tp1: Some(tp1),
            tp2: Some(tp2),
            breakeven_after_tp1: true,
            trail_hint: trail_hint.to_string(),
            notes: notes.to_string(),
        }
    }
}
