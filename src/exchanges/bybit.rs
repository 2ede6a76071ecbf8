//! Bybit v5 market data, spot or linear perpetuals.
//!
//! Base URL: https://api.bybit.com
//! Endpoints: `/v5/market/kline`, `/v5/market/instruments-info`,
//! `/v5/market/tickers`. Every response is wrapped in
//! `{retCode, retMsg, result}`; kline rows arrive newest first.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, warn};

use super::{bar_from_row, decimal_value, get_json, http_client, spread_from_quotes, usdt_pair};
use super::{CandleSource, ExchangeError, Venue, MAX_KLINE_LIMIT};
use crate::types::{Bar, Timeframe, VenueId};

/// Bybit product category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Spot,
    Linear,
}

impl Category {
    fn as_str(&self) -> &'static str {
        match self {
            Category::Spot => "spot",
            Category::Linear => "linear",
        }
    }

    fn venue(&self) -> VenueId {
        match self {
            Category::Spot => VenueId::BybitSpot,
            Category::Linear => VenueId::BybitLinear,
        }
    }
}

pub struct BybitClient {
    http: Client,
    base_url: String,
    category: Category,
}

impl BybitClient {
    pub fn new(base_url: &str, category: Category, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            category,
        })
    }

    /// Unwrap the `result.list` array, surfacing non-zero `retCode`s.
    pub(crate) fn result_list(venue: VenueId, payload: &Value) -> Result<Vec<Value>, ExchangeError> {
        let code = payload["retCode"].as_i64().unwrap_or(-1);
        if code != 0 {
            return Err(ExchangeError::Api {
                venue,
                code,
                message: payload["retMsg"].as_str().unwrap_or_default().to_string(),
            });
        }
        payload["result"]["list"]
            .as_array()
            .cloned()
            .ok_or_else(|| ExchangeError::payload(venue, "missing result.list"))
    }

    /// Rows are `[start, open, high, low, close, volume, turnover]`,
    /// newest first; returned oldest first.
    pub(crate) fn parse_klines(venue: VenueId, payload: &Value) -> Result<Vec<Bar>, ExchangeError> {
        let rows = Self::result_list(venue, payload)?;
        let mut bars: Vec<Bar> = rows.iter().filter_map(bar_from_row).collect();
        bars.reverse();
        Ok(bars)
    }

    pub(crate) fn parse_trading(venue: VenueId, payload: &Value, pair: &str) -> bool {
        Self::result_list(venue, payload)
            .map(|list| {
                list.iter().any(|i| {
                    i["symbol"].as_str() == Some(pair) && i["status"].as_str() == Some("Trading")
                })
            })
            .unwrap_or(false)
    }

    pub(crate) fn parse_ticker(venue: VenueId, payload: &Value) -> Option<Decimal> {
        let list = Self::result_list(venue, payload).ok()?;
        let ticker = list.first()?;
        let bid = decimal_value(&ticker["bid1Price"])?;
        let ask = decimal_value(&ticker["ask1Price"])?;
        spread_from_quotes(bid, ask)
    }

    fn url(&self, path: &str, pair: &str) -> String {
        format!(
            "{}{}?category={}&symbol={}",
            self.base_url,
            path,
            self.category.as_str(),
            urlencoding::encode(pair)
        )
    }
}

#[async_trait]
impl CandleSource for BybitClient {
    async fn fetch(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Vec<Bar> {
        let venue = self.category.venue();
        let pair = usdt_pair(symbol);
        let url = format!(
            "{}&interval={}&limit={}",
            self.url("/v5/market/kline", &pair),
            timeframe.minutes(),
            limit.clamp(1, MAX_KLINE_LIMIT),
        );

        let result = get_json(&self.http, venue, &url)
            .await
            .and_then(|payload| Self::parse_klines(venue, &payload));
        match result {
            Ok(bars) => {
                debug!(%venue, %pair, %timeframe, bars = bars.len(), "Bybit klines fetched");
                bars
            }
            Err(e) => {
                warn!(%venue, %pair, %timeframe, error = %e, "Bybit klines unavailable");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Venue for BybitClient {
    fn id(&self) -> VenueId {
        self.category.venue()
    }

    async fn exists(&self, symbol: &str) -> bool {
        let venue = self.category.venue();
        let pair = usdt_pair(symbol);
        match get_json(&self.http, venue, &self.url("/v5/market/instruments-info", &pair)).await {
            Ok(payload) => Self::parse_trading(venue, &payload, &pair),
            Err(e) => {
                debug!(%venue, %pair, error = %e, "Bybit instrument lookup failed");
                false
            }
        }
    }

    async fn spread_pct(&self, symbol: &str) -> Option<Decimal> {
        let venue = self.category.venue();
        let pair = usdt_pair(symbol);
        match get_json(&self.http, venue, &self.url("/v5/market/tickers", &pair)).await {
            Ok(payload) => Self::parse_ticker(venue, &payload),
            Err(e) => {
                warn!(%venue, %pair, error = %e, "Bybit ticker unavailable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    const LINEAR: VenueId = VenueId::BybitLinear;

    #[test]
    fn test_parse_klines_reverses_to_oldest_first() {
        let payload = json!({
            "retCode": 0,
            "retMsg": "OK",
            "result": {
                "category": "linear",
                "symbol": "NEWTUSDT",
                "list": [
                    ["1700000600000", "1.08", "1.20", "1.07", "1.19", "3000", "3570"],
                    ["1700000300000", "1.05", "1.09", "1.00", "1.08", "900", "970"],
                    ["1700000000000", "1.00", "1.10", "0.95", "1.05", "1200", "1260"]
                ]
            }
        });
        let bars = BybitClient::parse_klines(LINEAR, &payload).unwrap();
        assert_eq!(bars.len(), 3);
        assert!(bars.windows(2).all(|w| w[0].open_time < w[1].open_time));
        assert_eq!(bars[0].open, dec!(1.00));
        assert_eq!(bars[2].close, dec!(1.19));
    }

    #[test]
    fn test_non_zero_ret_code_is_api_error() {
        let payload = json!({"retCode": 10001, "retMsg": "params error: symbol invalid", "result": {}});
        match BybitClient::parse_klines(LINEAR, &payload) {
            Err(ExchangeError::Api { code, message, .. }) => {
                assert_eq!(code, 10001);
                assert!(message.contains("symbol invalid"));
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_trading_status() {
        let payload = json!({
            "retCode": 0,
            "result": {"list": [{"symbol": "NEWTUSDT", "status": "Trading"}]}
        });
        assert!(BybitClient::parse_trading(LINEAR, &payload, "NEWTUSDT"));

        let pre_launch = json!({
            "retCode": 0,
            "result": {"list": [{"symbol": "NEWTUSDT", "status": "PreLaunch"}]}
        });
        assert!(!BybitClient::parse_trading(LINEAR, &pre_launch, "NEWTUSDT"));

        let empty = json!({"retCode": 0, "result": {"list": []}});
        assert!(!BybitClient::parse_trading(LINEAR, &empty, "NEWTUSDT"));
    }

    #[test]
    fn test_parse_ticker_spread() {
        let payload = json!({
            "retCode": 0,
            "result": {"list": [{"symbol": "NEWTUSDT", "bid1Price": "1.99", "ask1Price": "2.01"}]}
        });
        assert_eq!(BybitClient::parse_ticker(LINEAR, &payload), Some(dec!(1)));

        let no_book = json!({"retCode": 0, "result": {"list": [{"symbol": "NEWTUSDT", "bid1Price": ""}]}});
        assert_eq!(BybitClient::parse_ticker(LINEAR, &no_book), None);
    }

    #[test]
    fn test_category_maps_to_venue() {
        assert_eq!(Category::Spot.venue(), VenueId::BybitSpot);
        assert_eq!(Category::Linear.as_str(), "linear");
    }
}
