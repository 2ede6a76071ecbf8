//! Signal pipeline.
//!
//! Pure evaluation of one bar window: score → entry plan → exit plan →
//! verdict. The liquidity gate lives here too but is driven separately by
//! the lifecycle, since it needs a venue round-trip.

pub mod entry;
pub mod exit;
pub mod liquidity;
pub mod score;
pub mod verdict;

use crate::types::{Action, Bar, EntryPlan, ExitPlan, Score, Timeframe, Verdict};

use self::entry::{EntryConfig, EntryPlanner};
use self::exit::{ExitConfig, ExitPlanner};
use self::score::{ScoreConfig, ScoringEngine};
use self::verdict::decide_verdict;

/// Everything computed for one (asset, timeframe) window in one cycle.
#[derive(Debug, Clone)]
pub struct SignalReport {
    pub timeframe: Timeframe,
    pub score: Score,
    pub entry: EntryPlan,
    pub exit: ExitPlan,
    pub verdict: Verdict,
}

impl SignalReport {
    pub fn action(&self) -> Action {
        self.verdict.action
    }
}

/// Scoring, entry and exit planners wired together.
pub struct SignalPipeline {
    scoring: ScoringEngine,
    entry: EntryPlanner,
    exit: ExitPlanner,
}

impl SignalPipeline {
    pub fn new(score: ScoreConfig, entry: EntryConfig, exit: ExitConfig) -> Self {
        Self {
            scoring: ScoringEngine::new(score),
            entry: EntryPlanner::new(entry),
            exit: ExitPlanner::new(exit),
        }
    }

    /// Evaluate a bar window (oldest → newest) on timeframe `tf`.
    pub fn evaluate(&self, bars: &[Bar], tf: Timeframe) -> SignalReport {
        let score = self.scoring.score(bars);
        let entry = self.entry.plan(bars, tf);
        let exit = self.exit.plan(entry.entry, entry.stop, score.grade, tf);
        let verdict = decide_verdict(score.grade, entry.mode, exit.is_usable());

        SignalReport {
            timeframe: tf,
            score,
            entry,
            exit,
            verdict,
        }
    }
}

impl Default for SignalPipeline {
    fn default() -> Self {
        Self::new(ScoreConfig::default(), EntryConfig::default(), ExitConfig::default())
    }
}
