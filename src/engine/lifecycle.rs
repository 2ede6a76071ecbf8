//! Asset lifecycle.
//!
//! Drives every asset through
//! Discovered → Watching → Tracked → First-Move-Notified → Confirm-Notified,
//! once per poll cycle. All durable decisions go through the
//! `PipelineState` passed in by the caller and are persisted right after
//! they are made.
//!
//! Delivery rules:
//! - "discovered" and "trading found" are one-shot, guarded by the stage
//!   markers (the marker is written before the message goes out).
//! - "first move" and "confirm" are rate-limited per asset; the cooldown is
//!   stamped only after the notifier accepted the message.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::exchanges::Venue;
use crate::listings::{Admission, AdmissionFilter, ListingsSource};
use crate::notify::{format, Notifier};
use crate::signal::liquidity::LiquidityGate;
use crate::signal::SignalPipeline;
use crate::storage::audit::{AuditRow, AuditSink, AuditStatus};
use crate::storage::StateStore;
use crate::types::{Action, AlertKind, Asset, PipelineState, Timeframe};

use super::report::CycleReport;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Minimum spacing of "first move" alerts per asset.
    pub first_move_cooldown_secs: u64,
    /// Minimum spacing of "confirm" alerts per asset.
    pub confirm_cooldown_secs: u64,
    /// Watching assets with no venue listing are evicted after this long.
    pub watch_ttl_hours: i64,
    /// Tracked assets are evicted this long after promotion or their
    /// latest alert, whichever is later.
    pub tracked_ttl_hours: i64,
    /// Bars requested per timeframe.
    pub candle_limit: usize,
    /// Minimum spacing of "radar started" announcements.
    pub startup_cooldown_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            first_move_cooldown_secs: 3600,
            confirm_cooldown_secs: 5400,
            watch_ttl_hours: 72,
            tracked_ttl_hours: 168,
            candle_limit: 60,
            startup_cooldown_secs: 3600,
        }
    }
}

impl LifecycleConfig {
    fn cooldown_secs(&self, kind: AlertKind) -> u64 {
        match kind {
            AlertKind::FirstMove => self.first_move_cooldown_secs,
            AlertKind::Confirm => self.confirm_cooldown_secs,
        }
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// External collaborators, injected so tests can substitute fakes.
pub struct Collaborators {
    pub listings: Box<dyn ListingsSource>,
    /// Probe order decides the signal venue of a newly tracked asset.
    pub venues: Vec<Box<dyn Venue>>,
    pub notifier: Box<dyn Notifier>,
    pub audit: Box<dyn AuditSink>,
    pub store: Box<dyn StateStore>,
    pub clock: Arc<dyn Clock>,
}

pub struct Lifecycle {
    config: LifecycleConfig,
    listings_limit: u32,
    filter: AdmissionFilter,
    pipeline: SignalPipeline,
    gate: LiquidityGate,
    listings: Box<dyn ListingsSource>,
    venues: Vec<Box<dyn Venue>>,
    notifier: Box<dyn Notifier>,
    audit: Box<dyn AuditSink>,
    store: Box<dyn StateStore>,
    clock: Arc<dyn Clock>,
}

impl Lifecycle {
    pub fn new(cfg: &AppConfig, io: Collaborators) -> Self {
        Self {
            config: cfg.lifecycle.clone(),
            listings_limit: cfg.listings.limit,
            filter: AdmissionFilter::new(cfg.listings.clone()),
            pipeline: SignalPipeline::new(cfg.score.clone(), cfg.entry.clone(), cfg.exit.clone()),
            gate: LiquidityGate::new(cfg.liquidity.clone()),
            listings: io.listings,
            venues: io.venues,
            notifier: io.notifier,
            audit: io.audit,
            store: io.store,
            clock: io.clock,
        }
    }

    /// Run one full pass: discovery, TTL eviction, venue probing, signal
    /// evaluation. State is saved and the audit log flushed even when the
    /// listings fetch fails; that failure is then returned so the caller
    /// can report it.
    pub async fn run_cycle(&mut self, state: &mut PipelineState) -> Result<CycleReport> {
        let now = self.clock.now();
        let mut report = CycleReport::new(state.cycle_count + 1, now);
        info!(cycle = report.cycle_number, %state, "Starting cycle");

        let listings_error = match self.listings.fetch_recent(self.listings_limit).await {
            Ok(assets) => {
                report.listings_fetched = assets.len();
                self.discover(assets, state, &mut report, now).await;
                None
            }
            Err(e) => {
                error!(error = %e, "Listings fetch failed; continuing with known assets");
                Some(e)
            }
        };

        self.evict_stale(state, &mut report, now);
        self.probe_watchlist(state, &mut report, now).await;
        self.evaluate_tracked(state, &mut report, now).await;

        state.cycle_count += 1;
        match self.audit.flush().await {
            Ok(rows) => report.audit_rows = rows,
            Err(e) => error!(error = %e, "Audit flush failed; rows kept for next cycle"),
        }
        self.persist(state);

        match listings_error {
            Some(e) => Err(e.context("listings fetch failed")),
            None => Ok(report),
        }
    }

    /// Send the "radar started" message unless one went out recently.
    /// Returns whether a message was sent.
    pub async fn announce_startup(&self, state: &mut PipelineState, name: &str, interval: Duration) -> bool {
        let now = self.clock.now();
        if state.startup_recent(now, self.config.startup_cooldown_secs) {
            info!(last = ?state.startup_ts, "Startup announced recently; staying quiet");
            return false;
        }
        if !self.deliver(&format::startup(name, state, interval)).await {
            return false;
        }
        state.mark_startup(now);
        self.persist(state);
        true
    }

    /// Deliver a free-form message (e.g. a cycle error). Never fails.
    pub async fn notify(&self, text: &str) -> bool {
        self.deliver(text).await
    }

    // ---- Stages ----

    /// Discovered → Watching.
    async fn discover(&mut self, assets: Vec<Asset>, state: &mut PipelineState, report: &mut CycleReport, now: DateTime<Utc>) {
        for asset in assets {
            if state.is_seen(asset.cid) {
                state.refresh_asset(&asset);
                continue;
            }
            state.mark_seen(asset.cid, now);
            report.discovered += 1;

            let unverified = match self.filter.check(&asset, now) {
                Admission::Rejected(reason) => {
                    debug!(cid = asset.cid, symbol = %asset.symbol, %reason, "Listing rejected");
                    report.rejected += 1;
                    continue;
                }
                Admission::AdmittedUnverified(reason) => Some(reason),
                Admission::Admitted => None,
            };

            info!(
                cid = asset.cid,
                symbol = %asset.symbol,
                vol_24h = %asset.volume_24h.round_dp(0),
                unverified = unverified.is_some(),
                "New listing admitted"
            );
            state.start_watch(asset.clone(), now);
            self.audit.record(AuditRow::new(
                &asset,
                AuditStatus::New,
                unverified.as_deref().map(|r| format!("UNVERIFIED: {r}")).unwrap_or_default(),
                now,
            ));
            self.persist(state);
            report.admitted += 1;

            let text = format::discovered(&asset, now, unverified.as_deref());
            if !self.deliver(&text).await {
                report.notify_failures += 1;
            }
        }
    }

    /// Drop watch/tracked entries that outlived their TTL.
    fn evict_stale(&mut self, state: &mut PipelineState, report: &mut CycleReport, now: DateTime<Utc>) {
        let ts = now.timestamp();
        let watch_ttl = self.config.watch_ttl_hours * 3600;
        let tracked_ttl = self.config.tracked_ttl_hours * 3600;

        let expired: Vec<(u64, &'static str)> = state
            .watch
            .iter()
            .filter(|(_, since)| ts - **since > watch_ttl)
            .map(|(cid, _)| (*cid, "watch TTL expired (no venue listing)"))
            .chain(
                state
                    .tracked
                    .keys()
                    .filter(|cid| state.last_progress(**cid).is_some_and(|last| ts - last > tracked_ttl))
                    .map(|cid| (*cid, "tracking TTL expired (no progress)")),
            )
            .collect();

        if expired.is_empty() {
            return;
        }

        for (cid, reason) in expired {
            let stage = state.stage(cid);
            if let Some(asset) = state.assets.get(&cid) {
                self.audit.record(AuditRow::new(asset, AuditStatus::Evicted, reason, now));
            }
            state.evict(cid);
            info!(cid, ?stage, reason, "Asset evicted");
            report.evicted += 1;
        }
        self.persist(state);
    }

    /// Watching → Tracked on the first venue that reports trading.
    async fn probe_watchlist(&mut self, state: &mut PipelineState, report: &mut CycleReport, now: DateTime<Utc>) {
        let watching: Vec<u64> = state.watch.keys().copied().collect();

        for cid in watching {
            let Some(asset) = state.assets.get(&cid).cloned() else {
                warn!(cid, "Watching asset has no stored metadata; skipping");
                continue;
            };

            let mut statuses = Vec::with_capacity(self.venues.len());
            for venue in &self.venues {
                statuses.push((venue.id(), venue.exists(&asset.symbol).await));
            }
            let Some(signal_venue) = statuses.iter().find(|(_, trading)| *trading).map(|(v, _)| *v) else {
                debug!(cid, symbol = %asset.symbol, "Not trading on any venue yet");
                continue;
            };

            if !state.promote_to_tracked(cid, signal_venue, now) {
                continue;
            }
            let listed_on: Vec<String> = statuses
                .iter()
                .filter(|(_, trading)| *trading)
                .map(|(v, _)| v.to_string())
                .collect();
            info!(cid, symbol = %asset.symbol, venue = %signal_venue, "Trading found; now tracked");
            self.audit.record(AuditRow::new(&asset, AuditStatus::Trading, listed_on.join(", "), now));
            self.persist(state);
            report.promoted += 1;

            let text = format::trading_found(&asset, &statuses, signal_venue);
            if !self.deliver(&text).await {
                report.notify_failures += 1;
            }
        }
    }

    /// Liquidity gate, then fast/slow signal evaluation for every tracked
    /// asset. Upstream failures skip the asset for this cycle only.
    async fn evaluate_tracked(&mut self, state: &mut PipelineState, report: &mut CycleReport, now: DateTime<Utc>) {
        let tracked: Vec<u64> = state.tracked.keys().copied().collect();

        for cid in tracked {
            let (Some(asset), Some(venue_id)) = (state.assets.get(&cid).cloned(), state.venues.get(&cid).copied())
            else {
                warn!(cid, "Tracked asset missing metadata or venue; skipping");
                continue;
            };
            let Some(idx) = self.venues.iter().position(|v| v.id() == venue_id) else {
                debug!(cid, venue = %venue_id, "Signal venue disabled; skipping");
                continue;
            };

            let symbol = asset.symbol.as_str();
            let limit = self.config.candle_limit;
            let fast = self.venues[idx].fetch(symbol, Timeframe::Fast, limit).await;
            let slow = self.venues[idx].fetch(symbol, Timeframe::Slow, limit).await;
            if fast.is_empty() || slow.is_empty() {
                debug!(cid, symbol, fast = fast.len(), slow = slow.len(), "Missing candles this cycle");
                report.no_data += 1;
                continue;
            }

            let liquidity = self.gate.assess(&*self.venues[idx], symbol, &fast, &slow).await;
            if !liquidity.passed {
                debug!(cid, symbol, reason = %liquidity.reason, "Liquidity gate rejected");
                report.gated += 1;
                continue;
            }
            report.evaluated += 1;

            let fast_signal = self.pipeline.evaluate(&fast, Timeframe::Fast);
            debug!(
                cid,
                symbol,
                tf = %Timeframe::Fast,
                grade = %fast_signal.score.grade,
                mode = %fast_signal.entry.mode,
                action = %fast_signal.action(),
                "Fast window evaluated"
            );
            if fast_signal.action() == Action::Play {
                let text = format::first_move(&asset, venue_id, &fast_signal, &liquidity);
                if self.send_rate_limited(AlertKind::FirstMove, &asset, &text, state, report, now).await {
                    report.first_moves += 1;
                }
            }

            let slow_signal = self.pipeline.evaluate(&slow, Timeframe::Slow);
            debug!(
                cid,
                symbol,
                tf = %Timeframe::Slow,
                grade = %slow_signal.score.grade,
                mode = %slow_signal.entry.mode,
                action = %slow_signal.action(),
                "Slow window evaluated"
            );
            if slow_signal.action() != Action::Skip {
                let text = format::confirm(&asset, venue_id, &slow_signal, &liquidity);
                if self.send_rate_limited(AlertKind::Confirm, &asset, &text, state, report, now).await {
                    report.confirms += 1;
                }
            }
        }
    }

    // ---- Delivery & persistence ----

    /// Send `text` if the cooldown for (`kind`, asset) has elapsed; stamp
    /// the cooldown only on successful delivery.
    async fn send_rate_limited(
        &mut self,
        kind: AlertKind,
        asset: &Asset,
        text: &str,
        state: &mut PipelineState,
        report: &mut CycleReport,
        now: DateTime<Utc>,
    ) -> bool {
        let cooldown = self.config.cooldown_secs(kind);
        if !state.alert_due(kind, asset.cid, now, cooldown) {
            debug!(cid = asset.cid, %kind, last = ?state.last_alert(kind, asset.cid), "Alert in cooldown");
            return false;
        }
        if !self.deliver(text).await {
            report.notify_failures += 1;
            return false;
        }

        state.mark_alert_sent(kind, asset.cid, now);
        let status = match kind {
            AlertKind::FirstMove => AuditStatus::FirstMove,
            AlertKind::Confirm => AuditStatus::Confirm,
        };
        self.audit.record(AuditRow::new(asset, status, String::new(), now));
        self.persist(state);
        info!(
            cid = asset.cid,
            symbol = %asset.symbol,
            %kind,
            stage = ?state.stage(asset.cid),
            "Alert sent"
        );
        true
    }

    async fn deliver(&self, text: &str) -> bool {
        match self.notifier.send(text).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Notification dropped");
                false
            }
        }
    }

    /// Save the state; failures are logged and the cycle carries on with
    /// the in-memory copy.
    pub fn persist(&self, state: &mut PipelineState) {
        state.updated_ts = Some(self.clock.now().timestamp());
        if let Err(e) = self.store.save(state) {
            error!(error = %e, "Failed to save state");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::listings::MockListingsSource;
    use crate::notify::MockNotifier;
    use crate::storage::audit::NullAudit;
    use crate::storage::StoreError;
    use crate::types::Stage;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        saved: Mutex<Option<PipelineState>>,
    }

    impl StateStore for MemoryStore {
        fn load(&self) -> Result<PipelineState, StoreError> {
            Ok(self.saved.lock().unwrap().clone().unwrap_or_default())
        }

        fn save(&self, state: &PipelineState) -> Result<(), StoreError> {
            *self.saved.lock().unwrap() = Some(state.clone());
            Ok(())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    fn listing(cid: u64) -> Asset {
        Asset {
            cid,
            symbol: format!("NEW{cid}"),
            name: format!("New Token {cid}"),
            slug: format!("new-token-{cid}"),
            listed_at: t0() - ChronoDuration::days(1),
            price: Some(dec!(0.25)),
            volume_24h: dec!(800000),
            market_cap: dec!(3000000),
            market_pairs: 2,
        }
    }

    fn lifecycle(listings: MockListingsSource, notifier: MockNotifier) -> Lifecycle {
        Lifecycle::new(
            &AppConfig::default(),
            Collaborators {
                listings: Box::new(listings),
                venues: Vec::new(),
                notifier: Box::new(notifier),
                audit: Box::new(NullAudit),
                store: Box::new(MemoryStore::default()),
                clock: Arc::new(ManualClock::new(t0())),
            },
        )
    }

    #[tokio::test]
    async fn test_discovered_notification_sent_once() {
        let mut listings = MockListingsSource::new();
        listings.expect_fetch_recent().returning(|_| Ok(vec![listing(1)]));
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .withf(|text| text.contains("New listing detected"))
            .times(1)
            .returning(|_| Ok(()));

        let mut lc = lifecycle(listings, notifier);
        let mut state = PipelineState::default();

        let first = lc.run_cycle(&mut state).await.unwrap();
        assert_eq!(first.discovered, 1);
        assert_eq!(first.admitted, 1);
        assert_eq!(state.stage(1), Some(Stage::Watching));

        let second = lc.run_cycle(&mut state).await.unwrap();
        assert_eq!(second.discovered, 0);
        assert_eq!(state.cycle_count, 2);
    }

    #[tokio::test]
    async fn test_rejected_listing_is_still_seen() {
        let mut quiet = listing(2);
        quiet.volume_24h = dec!(10);
        let mut listings = MockListingsSource::new();
        listings.expect_fetch_recent().returning(move |_| Ok(vec![quiet.clone()]));
        let mut notifier = MockNotifier::new();
        notifier.expect_send().never();

        let mut lc = lifecycle(listings, notifier);
        let mut state = PipelineState::default();
        let report = lc.run_cycle(&mut state).await.unwrap();

        assert_eq!(report.rejected, 1);
        assert_eq!(state.stage(2), Some(Stage::Discovered));
        assert!(state.watch.is_empty());
    }

    #[tokio::test]
    async fn test_listings_failure_keeps_state_and_reports_error() {
        let mut listings = MockListingsSource::new();
        listings
            .expect_fetch_recent()
            .returning(|_| Err(anyhow::anyhow!("HTTP 503")));
        let mut notifier = MockNotifier::new();
        notifier.expect_send().never();

        let mut lc = lifecycle(listings, notifier);
        let mut state = PipelineState::default();
        state.mark_seen(9, t0());
        state.start_watch(listing(9), t0());
        let before = (state.seen.clone(), state.watch.clone(), state.tracked.clone());

        let err = lc.run_cycle(&mut state).await.unwrap_err();
        assert!(format!("{err:#}").contains("HTTP 503"));
        assert_eq!((state.seen.clone(), state.watch.clone(), state.tracked.clone()), before);
    }

    #[tokio::test]
    async fn test_dropped_discovered_message_is_not_retried() {
        let mut listings = MockListingsSource::new();
        listings.expect_fetch_recent().returning(|_| Ok(vec![listing(3)]));
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("chat unreachable")));

        let mut lc = lifecycle(listings, notifier);
        let mut state = PipelineState::default();
        let first = lc.run_cycle(&mut state).await.unwrap();
        assert_eq!(first.notify_failures, 1);
        assert!(state.is_seen(3));

        lc.run_cycle(&mut state).await.unwrap();
    }

    #[tokio::test]
    async fn test_startup_announcement_is_rate_limited() {
        let listings = MockListingsSource::new();
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .withf(|text| text.contains("started"))
            .times(1)
            .returning(|_| Ok(()));

        let lc = lifecycle(listings, notifier);
        let mut state = PipelineState::default();
        let interval = Duration::from_secs(1200);

        assert!(lc.announce_startup(&mut state, "RADAR-001", interval).await);
        assert_eq!(state.startup_ts, Some(t0().timestamp()));
        // Restart within the hour stays quiet
        assert!(!lc.announce_startup(&mut state, "RADAR-001", interval).await);
    }

    #[tokio::test]
    async fn test_watch_ttl_evicts_without_rediscovery() {
        let mut listings = MockListingsSource::new();
        listings.expect_fetch_recent().returning(|_| Ok(vec![listing(4)]));
        let mut notifier = MockNotifier::new();
        notifier.expect_send().never();

        let mut lc = lifecycle(listings, notifier);
        let mut state = PipelineState::default();
        let long_ago = t0() - ChronoDuration::hours(73);
        state.mark_seen(4, long_ago);
        state.start_watch(listing(4), long_ago);

        let report = lc.run_cycle(&mut state).await.unwrap();
        assert_eq!(report.evicted, 1);
        assert_eq!(report.discovered, 0);
        assert_eq!(state.stage(4), Some(Stage::Discovered));
        assert!(state.assets.is_empty());
    }

    #[test]
    fn test_cooldown_lookup() {
        let cfg = LifecycleConfig::default();
        assert_eq!(cfg.cooldown_secs(AlertKind::FirstMove), 3600);
        assert_eq!(cfg.cooldown_secs(AlertKind::Confirm), 5400);
    }
}
