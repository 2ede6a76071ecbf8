//! Binance spot market data.
//!
//! Base URL: https://api.binance.com
//! Endpoints: `/api/v3/klines`, `/api/v3/exchangeInfo`,
//! `/api/v3/ticker/bookTicker`. All public, no auth.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, warn};

use super::{bar_from_row, decimal_value, get_json, http_client, spread_from_quotes, usdt_pair};
use super::{CandleSource, ExchangeError, Venue, MAX_KLINE_LIMIT};
use crate::types::{Bar, Timeframe, VenueId};

const VENUE: VenueId = VenueId::Binance;

pub struct BinanceClient {
    http: Client,
    base_url: String,
}

impl BinanceClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn interval(tf: Timeframe) -> &'static str {
        match tf {
            Timeframe::Fast => "5m",
            Timeframe::Slow => "15m",
        }
    }

    /// Klines arrive as an array of rows, oldest first.
    pub(crate) fn parse_klines(payload: &Value) -> Result<Vec<Bar>, ExchangeError> {
        let rows = payload
            .as_array()
            .ok_or_else(|| ExchangeError::payload(VENUE, "klines is not an array"))?;
        Ok(rows.iter().filter_map(bar_from_row).collect())
    }

    /// `exchangeInfo` lists the requested symbol with its trading status.
    pub(crate) fn parse_trading(payload: &Value, pair: &str) -> bool {
        payload["symbols"]
            .as_array()
            .map(|symbols| {
                symbols.iter().any(|s| {
                    s["symbol"].as_str() == Some(pair) && s["status"].as_str() == Some("TRADING")
                })
            })
            .unwrap_or(false)
    }

    pub(crate) fn parse_book_ticker(payload: &Value) -> Option<Decimal> {
        let bid = decimal_value(&payload["bidPrice"])?;
        let ask = decimal_value(&payload["askPrice"])?;
        spread_from_quotes(bid, ask)
    }

    async fn klines(&self, pair: &str, tf: Timeframe, limit: usize) -> Result<Vec<Bar>, ExchangeError> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            urlencoding::encode(pair),
            Self::interval(tf),
            limit.clamp(1, MAX_KLINE_LIMIT),
        );
        let payload = get_json(&self.http, VENUE, &url).await?;
        Self::parse_klines(&payload)
    }
}

#[async_trait]
impl CandleSource for BinanceClient {
    async fn fetch(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Vec<Bar> {
        let pair = usdt_pair(symbol);
        match self.klines(&pair, timeframe, limit).await {
            Ok(bars) => {
                debug!(%pair, %timeframe, bars = bars.len(), "Binance klines fetched");
                bars
            }
            Err(e) => {
                warn!(%pair, %timeframe, error = %e, "Binance klines unavailable");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Venue for BinanceClient {
    fn id(&self) -> VenueId {
        VENUE
    }

    async fn exists(&self, symbol: &str) -> bool {
        let pair = usdt_pair(symbol);
        let url = format!(
            "{}/api/v3/exchangeInfo?symbol={}",
            self.base_url,
            urlencoding::encode(&pair)
        );
        match get_json(&self.http, VENUE, &url).await {
            Ok(payload) => Self::parse_trading(&payload, &pair),
            // Unknown symbols come back as HTTP 400
            Err(e) => {
                debug!(%pair, error = %e, "Binance symbol not listed");
                false
            }
        }
    }

    async fn spread_pct(&self, symbol: &str) -> Option<Decimal> {
        let pair = usdt_pair(symbol);
        let url = format!(
            "{}/api/v3/ticker/bookTicker?symbol={}",
            self.base_url,
            urlencoding::encode(&pair)
        );
        match get_json(&self.http, VENUE, &url).await {
            Ok(payload) => Self::parse_book_ticker(&payload),
            Err(e) => {
                warn!(%pair, error = %e, "Binance book ticker unavailable");
                None
            }
        }
    }
}
