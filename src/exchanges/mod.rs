//! Exchange integrations.
//!
//! Defines the `CandleSource` and `Venue` traits and provides
//! implementations for:
//! - Binance spot (`/api/v3`)
//! - Bybit spot and Bybit linear perpetuals (`/v5/market`)
//!
//! Every method here fails closed: transport or payload errors are logged
//! and surface as "no data" (empty bars, `false`, `None`), never as errors
//! the lifecycle has to handle.

pub mod binance;
pub mod bybit;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::config::VenuesConfig;
use crate::types::{Bar, Timeframe, VenueId};

/// Exchanges cap kline requests at this many rows.
pub const MAX_KLINE_LIMIT: usize = 1000;

const USER_AGENT: &str = "RADAR/0.1.0 (listings-signal-pipeline)";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Typed failures of a single venue request. Callers log these and fall
/// back to "no data".
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("request to {venue} failed: {source}")]
    Transport {
        venue: VenueId,
        #[source]
        source: reqwest::Error,
    },

    #[error("{venue} returned HTTP {status}: {body}")]
    Status {
        venue: VenueId,
        status: u16,
        body: String,
    },

    #[error("{venue} API error {code}: {message}")]
    Api {
        venue: VenueId,
        code: i64,
        message: String,
    },

    #[error("unexpected {venue} payload: {detail}")]
    Payload { venue: VenueId, detail: String },
}

impl ExchangeError {
    pub(crate) fn payload(venue: VenueId, detail: impl Into<String>) -> Self {
        Self::Payload {
            venue,
            detail: detail.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Anything that can hand out OHLCV bars for a symbol.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Up to `limit` bars, oldest → newest. Empty on any failure.
    async fn fetch(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Vec<Bar>;
}

/// A trading venue: candles plus listing and order-book probes.
#[async_trait]
pub trait Venue: CandleSource {
    fn id(&self) -> VenueId;

    /// Whether `symbol` is actively trading against USDT. `false` on any
    /// failure.
    async fn exists(&self, symbol: &str) -> bool;

    /// Best bid/ask spread in percent of mid. `None` when the book is
    /// unavailable or unusable.
    async fn spread_pct(&self, symbol: &str) -> Option<Decimal>;
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Exchange pair for a listing symbol: upper-cased, quoted in USDT.
pub fn usdt_pair(symbol: &str) -> String {
    let s = symbol.trim().to_uppercase();
    if s.ends_with("USDT") {
        s
    } else {
        format!("{s}USDT")
    }
}

/// `(ask - bid) / mid × 100`. `None` for empty or crossed books.
pub fn spread_from_quotes(bid: Decimal, ask: Decimal) -> Option<Decimal> {
    if bid <= Decimal::ZERO || ask < bid {
        return None;
    }
    let mid = (bid + ask) / Decimal::TWO;
    if mid <= Decimal::ZERO {
        return None;
    }
    Some((ask - bid) / mid * Decimal::ONE_HUNDRED)
}

/// Read a decimal that exchanges send either as a JSON string or number.
pub(crate) fn decimal_value(v: &Value) -> Option<Decimal> {
    match v {
        Value::String(s) => Decimal::from_str(s)
            .or_else(|_| Decimal::from_scientific(s))
            .ok(),
        Value::Number(n) => {
            let s = n.to_string();
            Decimal::from_str(&s)
                .or_else(|_| Decimal::from_scientific(&s))
                .ok()
        }
        _ => None,
    }
}

/// Millisecond timestamp sent as a JSON number or string.
pub(crate) fn millis_value(v: &Value) -> Option<DateTime<Utc>> {
    let ms = match v {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.parse::<i64>().ok()?,
        _ => return None,
    };
    Utc.timestamp_millis_opt(ms).single()
}

/// Build one bar from `[open_time, open, high, low, close, volume, ..]`.
/// Rows with missing fields or an inverted range are dropped.
pub(crate) fn bar_from_row(row: &Value) -> Option<Bar> {
    let cols = row.as_array()?;
    if cols.len() < 6 {
        return None;
    }
    let bar = Bar {
        open_time: millis_value(&cols[0])?,
        open: decimal_value(&cols[1])?,
        high: decimal_value(&cols[2])?,
        low: decimal_value(&cols[3])?,
        close: decimal_value(&cols[4])?,
        volume: decimal_value(&cols[5])?,
    };
    (bar.high >= bar.low).then_some(bar)
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to build HTTP client for exchange venues")
}

/// GET `url` and decode the body as JSON, mapping failures onto
/// [`ExchangeError`].
pub(crate) async fn get_json(http: &Client, venue: VenueId, url: &str) -> Result<Value, ExchangeError> {
    let resp = http
        .get(url)
        .send()
        .await
        .map_err(|source| ExchangeError::Transport { venue, source })?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ExchangeError::Status {
            venue,
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        });
    }

    resp.json::<Value>()
        .await
        .map_err(|source| ExchangeError::Transport { venue, source })
}

/// Enabled venues in probe order: Binance, Bybit spot, Bybit linear.
pub fn build_venues(cfg: &VenuesConfig) -> Result<Vec<Box<dyn Venue>>> {
    let mut venues: Vec<Box<dyn Venue>> = Vec::new();
    if cfg.binance_enabled {
        venues.push(Box::new(binance::BinanceClient::new(
            &cfg.binance_base_url,
            cfg.timeout_secs,
        )?));
    }
    if cfg.bybit_spot_enabled {
        venues.push(Box::new(bybit::BybitClient::new(
            &cfg.bybit_base_url,
            bybit::Category::Spot,
            cfg.timeout_secs,
        )?));
    }
    if cfg.bybit_linear_enabled {
        venues.push(Box::new(bybit::BybitClient::new(
            &cfg.bybit_base_url,
            bybit::Category::Linear,
            cfg.timeout_secs,
        )?));
    }
    info!(
        venues = ?venues.iter().map(|v| v.id()).collect::<Vec<_>>(),
        "Exchange venues configured"
    );
    Ok(venues)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
