//! Scoring engine.
//!
//! Grades the last bar of a window with four independent checks against
//! the bars before it. Any weak dimension caps the grade, so a volume
//! spike alone never reaches A.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing::debug;

use crate::types::{Bar, Grade, Score};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoreConfig {
    /// Shorter windows grade C with zero points.
    pub min_bars: usize,
    /// Last volume must reach this multiple of the prior mean volume.
    pub volume_spike_mult: Decimal,
    /// Last range must reach this multiple of the prior mean range.
    pub range_expansion_mult: Decimal,
    /// Close must sit above this fraction of the last bar's range.
    pub close_strength_frac: Decimal,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            min_bars: 6,
            volume_spike_mult: dec!(1.5),
            range_expansion_mult: dec!(1.2),
            close_strength_frac: dec!(0.5),
        }
    }
}

/// Outcome of each individual check, for logging and alert texts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScoreChecks {
    pub volume_spike: bool,
    pub range_expansion: bool,
    pub close_strength: bool,
    pub higher_low: bool,
}

impl ScoreChecks {
    pub fn points(&self) -> u8 {
        [self.volume_spike, self.range_expansion, self.close_strength, self.higher_low]
            .iter()
            .filter(|&&passed| passed)
            .count() as u8
    }
}

pub struct ScoringEngine {
    config: ScoreConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoreConfig) -> Self {
        Self { config }
    }

    /// Run the four checks. `None` when the window is too short.
    pub fn checks(&self, bars: &[Bar]) -> Option<ScoreChecks> {
        if bars.len() < self.config.min_bars.max(2) {
            return None;
        }
        let (last, prior) = bars.split_last()?;
        let prev = prior.last()?;

        let n = Decimal::from(prior.len() as u64);
        let avg_volume = prior.iter().map(|b| b.volume).sum::<Decimal>() / n;
        let avg_range = prior.iter().map(Bar::range).sum::<Decimal>() / n;

        Some(ScoreChecks {
            volume_spike: last.volume >= self.config.volume_spike_mult * avg_volume,
            range_expansion: last.range() >= self.config.range_expansion_mult * avg_range,
            close_strength: last.close > last.low + self.config.close_strength_frac * last.range(),
            higher_low: last.low > prev.low,
        })
    }

    /// Grade a bar window (oldest → newest).
    pub fn score(&self, bars: &[Bar]) -> Score {
        let Some(checks) = self.checks(bars) else {
            return Score {
                grade: Grade::C,
                points: 0,
                reason: "insufficient bars".to_string(),
            };
        };

        let points = checks.points();
        let grade = Grade::from_points(points);
        debug!(bars = bars.len(), ?checks, points, %grade, "Window scored");

        let reason = match grade {
            Grade::A => "impulse + volume + structure",
            Grade::B => "solid impulse, moderate risk",
            Grade::C => "weak setup",
        };

        Score {
            grade,
            points,
            reason: reason.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
