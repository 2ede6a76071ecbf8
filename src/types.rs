//! Shared types for the RADAR pipeline.
//!
//! These types form the data model used across all modules: listed
//! assets, candles, the transient signal outputs (score, entry/exit plans,
//! verdict) and the persisted `PipelineState`. Exchange, signal and engine
//! modules all depend on this file, never on each other's internals.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// A newly listed token candidate, normalized from the listings source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// Immutable CoinMarketCap identifier.
    pub cid: u64,
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    /// When the listings source first added the asset.
    pub listed_at: DateTime<Utc>,
    /// Last USD price reported by the listings source.
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Rolling 24-hour volume in USD.
    #[serde(default)]
    pub volume_24h: Decimal,
    #[serde(default)]
    pub market_cap: Decimal,
    #[serde(default)]
    pub market_pairs: u32,
}

impl Asset {
    /// Whole days since listing (never negative).
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.listed_at).num_days().max(0)
    }

    /// CoinMarketCap page for this asset.
    pub fn cmc_url(&self) -> String {
        format!("https://coinmarketcap.com/currencies/{}/", self.slug)
    }

    /// CoinMarketCap "markets" tab (where the asset trades).
    pub fn markets_url(&self) -> String {
        format!("{}markets/", self.cmc_url())
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) #{} | vol24h: ${} | mcap: ${}",
            self.name,
            self.symbol,
            self.cid,
            self.volume_24h.round_dp(0),
            self.market_cap.round_dp(0),
        )
    }
}

// ---------------------------------------------------------------------------
// Candles
// ---------------------------------------------------------------------------

/// One OHLCV candle. Every exchange response is normalized into this
/// shape at the client boundary; nothing downstream sees raw rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Bar {
    /// High minus low.
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }

    /// Quote-currency volume estimate (volume × close).
    pub fn notional(&self) -> Decimal {
        self.volume * self.close
    }
}

/// Candle timeframe. The fast timeframe drives "first move" alerts, the
/// slow one drives confirmations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    /// 5-minute candles.
    Fast,
    /// 15-minute candles.
    Slow,
}

impl Timeframe {
    pub fn minutes(&self) -> u32 {
        match self {
            Timeframe::Fast => 5,
            Timeframe::Slow => 15,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.minutes())
    }
}

/// A trading venue an asset can be listed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueId {
    Binance,
    BybitSpot,
    BybitLinear,
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VenueId::Binance => write!(f, "Binance"),
            VenueId::BybitSpot => write!(f, "Bybit spot"),
            VenueId::BybitLinear => write!(f, "Bybit perp (linear)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Signal outputs (transient, recomputed every cycle)
// ---------------------------------------------------------------------------

/// Coarse setup quality. Declaration order gives `C < B < A`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    C,
    B,
    A,
}

impl Grade {
    /// Map a 0–4 check count onto a grade.
    pub fn from_points(points: u8) -> Self {
        match points {
            p if p >= 4 => Grade::A,
            3 => Grade::B,
            _ => Grade::C,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::A => write!(f, "A"),
            Grade::B => write!(f, "B"),
            Grade::C => write!(f, "C"),
        }
    }
}

/// Result of the scoring engine for one bar window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Score {
    pub grade: Grade,
    /// Number of passed checks (0–4).
    pub points: u8,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryMode {
    Breakout,
    Pullback,
    Wait,
}

impl fmt::Display for EntryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryMode::Breakout => write!(f, "BREAKOUT"),
            EntryMode::Pullback => write!(f, "PULLBACK"),
            EntryMode::Wait => write!(f, "WAIT"),
        }
    }
}

/// Entry window computed from the current bars. All prices are `None`
/// when `mode` is `Wait`.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryPlan {
    pub mode: EntryMode,
    pub entry: Option<Decimal>,
    pub stop: Option<Decimal>,
    pub invalidation: Option<Decimal>,
    /// Upper bound of the lookback range, kept for diagnostics.
    pub range_high: Option<Decimal>,
    /// Lower bound of the lookback range, kept for diagnostics.
    pub range_low: Option<Decimal>,
    pub notes: Vec<String>,
}

impl EntryPlan {
    /// A WAIT plan with no prices.
    pub fn wait(notes: Vec<String>) -> Self {
        Self {
            mode: EntryMode::Wait,
            entry: None,
            stop: None,
            invalidation: None,
            range_high: None,
            range_low: None,
            notes,
        }
    }

    /// Risk distance (entry − stop), if both prices exist.
    pub fn risk(&self) -> Option<Decimal> {
        match (self.entry, self.stop) {
            (Some(entry), Some(stop)) => Some(entry - stop),
            _ => None,
        }
    }
}

/// Risk-multiple targets derived from an entry plan.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitPlan {
    pub tp1: Option<Decimal>,
    pub tp2: Option<Decimal>,
    /// Move the stop to break-even once TP1 fills.
    pub breakeven_after_tp1: bool,
    pub trail_hint: String,
    pub notes: String,
}

impl ExitPlan {
    pub fn empty(notes: impl Into<String>) -> Self {
        Self {
            tp1: None,
            tp2: None,
            breakeven_after_tp1: false,
            trail_hint: String::new(),
            notes: notes.into(),
        }
    }

    /// Whether both targets are present.
    pub fn is_usable(&self) -> bool {
        self.tp1.is_some() && self.tp2.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Play,
    Wait,
    Skip,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Play => write!(f, "PLAY"),
            Action::Wait => write!(f, "WAIT"),
            Action::Skip => write!(f, "SKIP"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub action: Action,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Persisted pipeline state
// ---------------------------------------------------------------------------

/// Lifecycle stage of an asset, derived from its stage markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Discovered,
    Watching,
    Tracked,
    FirstMoveNotified,
    ConfirmNotified,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Discovered => write!(f, "DISCOVERED"),
            Stage::Watching => write!(f, "WATCHING"),
            Stage::Tracked => write!(f, "TRACKED"),
            Stage::FirstMoveNotified => write!(f, "FIRST_MOVE"),
            Stage::ConfirmNotified => write!(f, "CONFIRM"),
        }
    }
}

/// Rate-limited alert types. Each keeps its own cooldown per asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    FirstMove,
    Confirm,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertKind::FirstMove => write!(f, "FIRST_MOVE"),
            AlertKind::Confirm => write!(f, "CONFIRM"),
        }
    }
}

/// Durable stage markers and cooldown timestamps for every asset.
///
/// All timestamps are unix seconds. The document is loaded once at startup,
/// mutated by the lifecycle and saved after every state-changing decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    /// Every identifier ever observed → first-seen time. Never shrinks.
    #[serde(default)]
    pub seen: BTreeMap<u64, i64>,
    /// Admitted, waiting for an exchange listing → watch start time.
    #[serde(default)]
    pub watch: BTreeMap<u64, i64>,
    /// Trading confirmed → tracking start time.
    #[serde(default)]
    pub tracked: BTreeMap<u64, i64>,
    #[serde(default)]
    pub first_move_sent: BTreeMap<u64, i64>,
    #[serde(default)]
    pub confirm_light_sent: BTreeMap<u64, i64>,
    /// Last "radar started" announcement.
    #[serde(default)]
    pub startup_ts: Option<i64>,
    /// Metadata of assets under watch or tracking.
    #[serde(default)]
    pub assets: BTreeMap<u64, Asset>,
    /// Signal venue of each tracked asset.
    #[serde(default)]
    pub venues: BTreeMap<u64, VenueId>,
    #[serde(default)]
    pub cycle_count: u64,
    #[serde(default)]
    pub updated_ts: Option<i64>,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cycles={} | seen={} | watch={} | tracked={} | first_moves={} | confirms={}",
            self.cycle_count,
            self.seen.len(),
            self.watch.len(),
            self.tracked.len(),
            self.first_move_sent.len(),
            self.confirm_light_sent.len(),
        )
    }
}

impl PipelineState {
    pub fn is_seen(&self, cid: u64) -> bool {
        self.seen.contains_key(&cid)
    }

    /// Record the first observation of an asset. Later calls keep the
    /// original timestamp.
    pub fn mark_seen(&mut self, cid: u64, now: DateTime<Utc>) {
        self.seen.entry(cid).or_insert(now.timestamp());
    }

    /// Admit an asset into the watch list.
    pub fn start_watch(&mut self, asset: Asset, now: DateTime<Utc>) {
        self.watch.entry(asset.cid).or_insert(now.timestamp());
        self.assets.insert(asset.cid, asset);
    }

    /// Move a watched asset to tracked. Returns `false` if the asset was
    /// not watching (already tracked, evicted, or never admitted).
    pub fn promote_to_tracked(&mut self, cid: u64, venue: VenueId, now: DateTime<Utc>) -> bool {
        if self.watch.remove(&cid).is_none() {
            return false;
        }
        self.tracked.entry(cid).or_insert(now.timestamp());
        self.venues.insert(cid, venue);
        true
    }

    /// Refresh stored metadata for an asset that is still active.
    pub fn refresh_asset(&mut self, asset: &Asset) {
        if let Some(stored) = self.assets.get_mut(&asset.cid) {
            *stored = asset.clone();
        }
    }

    /// Drop an asset from active tracking. It stays in `seen`, so it is
    /// never rediscovered.
    pub fn evict(&mut self, cid: u64) {
        self.watch.remove(&cid);
        self.tracked.remove(&cid);
        self.assets.remove(&cid);
        self.venues.remove(&cid);
        self.first_move_sent.remove(&cid);
        self.confirm_light_sent.remove(&cid);
    }

    /// Current lifecycle stage, or `None` for never-seen identifiers.
    pub fn stage(&self, cid: u64) -> Option<Stage> {
        if !self.is_seen(cid) {
            return None;
        }
        if self.tracked.contains_key(&cid) {
            if self.confirm_light_sent.contains_key(&cid) {
                return Some(Stage::ConfirmNotified);
            }
            if self.first_move_sent.contains_key(&cid) {
                return Some(Stage::FirstMoveNotified);
            }
            return Some(Stage::Tracked);
        }
        if self.watch.contains_key(&cid) {
            return Some(Stage::Watching);
        }
        Some(Stage::Discovered)
    }

    fn sent_map(&self, kind: AlertKind) -> &BTreeMap<u64, i64> {
        match kind {
            AlertKind::FirstMove => &self.first_move_sent,
            AlertKind::Confirm => &self.confirm_light_sent,
        }
    }

    pub fn last_alert(&self, kind: AlertKind, cid: u64) -> Option<i64> {
        self.sent_map(kind).get(&cid).copied()
    }

    /// Whether the cooldown for `kind` has elapsed (or nothing was sent yet).
    pub fn alert_due(&self, kind: AlertKind, cid: u64, now: DateTime<Utc>, cooldown_secs: u64) -> bool {
        match self.last_alert(kind, cid) {
            Some(last) => now.timestamp() - last >= cooldown_secs as i64,
            None => true,
        }
    }

    pub fn mark_alert_sent(&mut self, kind: AlertKind, cid: u64, now: DateTime<Utc>) {
        let map = match kind {
            AlertKind::FirstMove => &mut self.first_move_sent,
            AlertKind::Confirm => &mut self.confirm_light_sent,
        };
        map.insert(cid, now.timestamp());
    }

    /// Latest sign of life of a tracked asset: promotion or the most recent
    /// alert. `None` when the asset is not tracked.
    pub fn last_progress(&self, cid: u64) -> Option<i64> {
        let promoted = *self.tracked.get(&cid)?;
        let alerts = [self.first_move_sent.get(&cid), self.confirm_light_sent.get(&cid)];
        Some(alerts.into_iter().flatten().fold(promoted, |acc, ts| acc.max(*ts)))
    }

    /// Whether a startup announcement went out within `cooldown_secs`.
    pub fn startup_recent(&self, now: DateTime<Utc>, cooldown_secs: u64) -> bool {
        match self.startup_ts {
            Some(ts) => now.timestamp() - ts < cooldown_secs as i64,
            None => false,
        }
    }

    pub fn mark_startup(&mut self, now: DateTime<Utc>) {
        self.startup_ts = Some(now.timestamp());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
