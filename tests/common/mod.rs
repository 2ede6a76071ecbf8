//! In-memory collaborators for lifecycle integration tests.
//!
//! Every fake hands out cloneable handles backed by `Arc<Mutex<..>>`, so a
//! test keeps control of a fake after boxing it into the `Lifecycle`.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use radar::clock::{Clock, ManualClock};
use radar::config::AppConfig;
use radar::engine::{Collaborators, Lifecycle};
use radar::exchanges::{CandleSource, Venue};
use radar::listings::ListingsSource;
use radar::notify::Notifier;
use radar::storage::audit::{AuditRow, AuditSink};
use radar::storage::{StateStore, StoreError};
use radar::types::{Asset, Bar, PipelineState, Timeframe, VenueId};

/// Monday noon UTC: inside the active-hours window.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
}

pub fn listing(cid: u64, symbol: &str) -> Asset {
    Asset {
        cid,
        symbol: symbol.to_string(),
        name: format!("{symbol} Protocol"),
        slug: format!("{}-protocol", symbol.to_lowercase()),
        listed_at: t0() - Duration::days(2),
        price: Some(dec!(0.42)),
        volume_24h: dec!(1500000),
        market_cap: dec!(9000000),
        market_pairs: 4,
    }
}

// ---------------------------------------------------------------------------
// Bars
// ---------------------------------------------------------------------------

fn bar_at(i: i64, open: Decimal, high: Decimal, low: Decimal, close: Decimal, volume: Decimal) -> Bar {
    Bar {
        open_time: t0() - Duration::minutes(5 * (20 - i)),
        open,
        high,
        low,
        close,
        volume,
    }
}

/// Nineteen rising bars capped by a wide, high-volume bar closing near its
/// high. Grades A with a breakout entry on either timeframe.
pub fn breakout_bars() -> Vec<Bar> {
    let mut bars: Vec<Bar> = (0..19)
        .map(|i| {
            let step = Decimal::from(i);
            bar_at(
                i,
                dec!(100) + step,
                dec!(101) + step,
                dec!(99.5) + step,
                dec!(100.8) + step,
                dec!(1000),
            )
        })
        .collect();
    bars.push(bar_at(19, dec!(119), dec!(122), dec!(118.9), dec!(121.9), dec!(5000)));
    bars
}

/// Identical quiet bars: grade C, never alerts.
pub fn quiet_bars() -> Vec<Bar> {
    (0..20)
        .map(|i| bar_at(i, dec!(10), dec!(10.5), dec!(9.5), dec!(10), dec!(100000)))
        .collect()
}

// ---------------------------------------------------------------------------
// Venue
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct FakeVenue {
    id: VenueId,
    listed: Arc<AtomicBool>,
    spread: Arc<Mutex<Option<Decimal>>>,
    fast: Arc<Mutex<Vec<Bar>>>,
    slow: Arc<Mutex<Vec<Bar>>>,
}

impl FakeVenue {
    /// A venue listing every symbol with a tight spread and no candles.
    pub fn new(id: VenueId) -> Self {
        Self {
            id,
            listed: Arc::new(AtomicBool::new(true)),
            spread: Arc::new(Mutex::new(Some(dec!(0.2)))),
            fast: Arc::new(Mutex::new(Vec::new())),
            slow: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn set_listed(&self, listed: bool) {
        self.listed.store(listed, Ordering::SeqCst);
    }

    pub fn set_spread(&self, spread: Option<Decimal>) {
        *self.spread.lock().unwrap() = spread;
    }

    pub fn set_bars(&self, fast: Vec<Bar>, slow: Vec<Bar>) {
        *self.fast.lock().unwrap() = fast;
        *self.slow.lock().unwrap() = slow;
    }
}

#[async_trait]
impl CandleSource for FakeVenue {
    async fn fetch(&self, _symbol: &str, timeframe: Timeframe, limit: usize) -> Vec<Bar> {
        let bars = match timeframe {
            Timeframe::Fast => self.fast.lock().unwrap().clone(),
            Timeframe::Slow => self.slow.lock().unwrap().clone(),
        };
        let start = bars.len().saturating_sub(limit);
        bars[start..].to_vec()
    }
}

#[async_trait]
impl Venue for FakeVenue {
    fn id(&self) -> VenueId {
        self.id
    }

    async fn exists(&self, _symbol: &str) -> bool {
        self.listed.load(Ordering::SeqCst)
    }

    async fn spread_pct(&self, _symbol: &str) -> Option<Decimal> {
        *self.spread.lock().unwrap()
    }
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct StaticListings {
    assets: Arc<Mutex<Vec<Asset>>>,
    fail: Arc<AtomicBool>,
}

impl StaticListings {
    pub fn new(assets: Vec<Asset>) -> Self {
        Self {
            assets: Arc::new(Mutex::new(assets)),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ListingsSource for StaticListings {
    async fn fetch_recent(&self, limit: u32) -> Result<Vec<Asset>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("listings API returned HTTP 503"));
        }
        Ok(self.assets.lock().unwrap().iter().take(limit as usize).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<String>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingNotifier {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Messages whose text contains `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.sent.lock().unwrap().iter().filter(|m| m.contains(needle)).count()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("chat unreachable"));
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemoryStore {
    saved: Arc<Mutex<Option<PipelineState>>>,
    saves: Arc<Mutex<usize>>,
}

impl MemoryStore {
    pub fn snapshot(&self) -> Option<PipelineState> {
        self.saved.lock().unwrap().clone()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<PipelineState, StoreError> {
        Ok(self.snapshot().unwrap_or_default())
    }

    fn save(&self, state: &PipelineState) -> Result<(), StoreError> {
        *self.saved.lock().unwrap() = Some(state.clone());
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingAudit {
    pending: Arc<Mutex<Vec<AuditRow>>>,
    written: Arc<Mutex<Vec<AuditRow>>>,
}

impl RecordingAudit {
    pub fn written(&self) -> Vec<AuditRow> {
        self.written.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAudit {
    fn record(&mut self, row: AuditRow) {
        self.pending.lock().unwrap().push(row);
    }

    async fn flush(&mut self) -> Result<usize> {
        let rows: Vec<AuditRow> = self.pending.lock().unwrap().drain(..).collect();
        let n = rows.len();
        self.written.lock().unwrap().extend(rows);
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// A lifecycle wired to fakes, plus the handles that steer them.
pub struct Harness {
    pub lifecycle: Lifecycle,
    pub state: PipelineState,
    pub clock: Arc<ManualClock>,
    pub listings: StaticListings,
    pub venues: Vec<FakeVenue>,
    pub notifier: RecordingNotifier,
    pub store: MemoryStore,
    pub audit: RecordingAudit,
}

impl Harness {
    pub fn new(assets: Vec<Asset>, venues: Vec<FakeVenue>) -> Self {
        Self::with_config(AppConfig::default(), assets, venues)
    }

    pub fn with_config(cfg: AppConfig, assets: Vec<Asset>, venues: Vec<FakeVenue>) -> Self {
        let clock = Arc::new(ManualClock::new(t0()));
        let listings = StaticListings::new(assets);
        let notifier = RecordingNotifier::default();
        let store = MemoryStore::default();
        let audit = RecordingAudit::default();

        let boxed: Vec<Box<dyn Venue>> = venues
            .iter()
            .cloned()
            .map(|v| Box::new(v) as Box<dyn Venue>)
            .collect();
        let shared_clock: Arc<dyn Clock> = clock.clone();

        let lifecycle = Lifecycle::new(
            &cfg,
            Collaborators {
                listings: Box::new(listings.clone()),
                venues: boxed,
                notifier: Box::new(notifier.clone()),
                audit: Box::new(audit.clone()),
                store: Box::new(store.clone()),
                clock: shared_clock,
            },
        );

        Self {
            lifecycle,
            state: PipelineState::default(),
            clock,
            listings,
            venues,
            notifier,
            store,
            audit,
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        self.clock.advance(Duration::seconds(secs));
    }

    /// Put an asset straight into tracking on `venue`, as of `since`.
    pub fn seed_tracked(&mut self, asset: Asset, venue: VenueId, since: DateTime<Utc>) {
        let cid = asset.cid;
        self.state.mark_seen(cid, since);
        self.state.start_watch(asset, since);
        self.state.promote_to_tracked(cid, venue, since);
    }
}
