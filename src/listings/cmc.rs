//! CoinMarketCap listings client.
//!
//! API docs: https://coinmarketcap.com/api/documentation/v1/
//! Endpoint: `/v1/cryptocurrency/listings/latest`, sorted by `date_added`
//! descending so the newest listings come first.
//! Auth: `X-CMC_PRO_API_KEY` header.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

use super::ListingsSource;
use crate::exchanges::decimal_value;
use crate::retry::{with_backoff, RetryPolicy};
use crate::types::Asset;

// ---------------------------------------------------------------------------
// API response types (CMC JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CmcListingsResponse {
    #[serde(default)]
    status: Option<CmcStatus>,
    #[serde(default)]
    data: Vec<CmcListing>,
}

#[derive(Debug, Deserialize)]
struct CmcStatus {
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CmcListing {
    id: u64,
    symbol: String,
    name: String,
    #[serde(default)]
    slug: String,
    /// ISO-8601, e.g. `2025-03-01T12:00:00.000Z`.
    #[serde(default)]
    date_added: Option<String>,
    #[serde(default)]
    num_market_pairs: Option<u32>,
    /// Keyed by convert currency; we request USD only.
    #[serde(default)]
    quote: HashMap<String, CmcQuote>,
}

/// Kept as raw JSON: one out-of-range figure must not sink the whole
/// response. Unconvertible values read as absent.
#[derive(Debug, Default, Deserialize)]
struct CmcQuote {
    #[serde(default)]
    price: Value,
    #[serde(default)]
    volume_24h: Value,
    #[serde(default)]
    market_cap: Value,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct CmcClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    retry: RetryPolicy,
}

impl CmcClient {
    pub fn new(base_url: &str, api_key: SecretString, retry: RetryPolicy) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .user_agent("RADAR/0.1.0 (listings-signal-pipeline)")
            .build()
            .context("Failed to build HTTP client for CoinMarketCap")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            retry,
        })
    }

    async fn request(&self, limit: u32) -> Result<CmcListingsResponse> {
        let url = format!(
            "{}/v1/cryptocurrency/listings/latest?start=1&limit={}&convert=USD&sort=date_added&sort_dir=desc",
            self.base_url, limit,
        );

        let resp = self
            .http
            .get(&url)
            .header("X-CMC_PRO_API_KEY", self.api_key.expose_secret())
            .header("Accept", "application/json")
            .send()
            .await
            .context("CoinMarketCap request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("CoinMarketCap API error {status}: {body}");
        }

        resp.json()
            .await
            .context("Failed to parse CoinMarketCap listings response")
    }

    fn parse_date_added(raw: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|d| d.with_timezone(&Utc))
    }

    /// Normalize one listing row. Rows without a usable `date_added` are
    /// dropped.
    fn to_asset(raw: CmcListing) -> Option<Asset> {
        let listed_at = raw.date_added.as_deref().and_then(Self::parse_date_added)?;
        let usd = raw.quote.get("USD");

        Some(Asset {
            cid: raw.id,
            symbol: raw.symbol.trim().to_string(),
            name: raw.name.trim().to_string(),
            slug: raw.slug.trim().to_string(),
            listed_at,
            price: usd.and_then(|q| decimal_value(&q.price)),
            volume_24h: usd.and_then(|q| decimal_value(&q.volume_24h)).unwrap_or_default(),
            market_cap: usd.and_then(|q| decimal_value(&q.market_cap)).unwrap_or_default(),
            market_pairs: raw.num_market_pairs.unwrap_or(0),
        })
    }

    fn normalize(resp: CmcListingsResponse) -> Result<Vec<Asset>> {
        if let Some(status) = &resp.status {
            if status.error_code != 0 {
                anyhow::bail!(
                    "CoinMarketCap error {}: {}",
                    status.error_code,
                    status.error_message.as_deref().unwrap_or("unknown")
                );
            }
        }

        let total = resp.data.len();
        let assets: Vec<Asset> = resp.data.into_iter().filter_map(Self::to_asset).collect();
        if assets.len() < total {
            debug!(dropped = total - assets.len(), "Listings without date_added dropped");
        }
        Ok(assets)
    }
}

#[async_trait]
impl ListingsSource for CmcClient {
    async fn fetch_recent(&self, limit: u32) -> Result<Vec<Asset>> {
        let resp = with_backoff(&self.retry, "cmc listings", || self.request(limit)).await?;
        let assets = Self::normalize(resp)?;
        info!(count = assets.len(), "Recent listings fetched");
        Ok(assets)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = r#"{
        "status": {"error_code": 0, "error_message": null},
        "data": [
            {
                "id": 36001,
                "name": "Newt Token",
                "symbol": "NEWT",
                "slug": "newt-token",
                "num_market_pairs": 4,
                "date_added": "2025-03-08T10:30:00.000Z",
                "quote": {"USD": {"price": 0.0123, "volume_24h": 450000, "market_cap": 0}}
            },
            {
                "id": 36002,
                "name": "No Date",
                "symbol": "NODT",
                "slug": "no-date",
                "quote": {}
            },
            {
                "id": 36003,
                "name": "Bare",
                "symbol": " BARE ",
                "date_added": "2025-03-09T00:00:00Z"
            }
        ]
    }"#;

    #[test]
    fn test_normalize_listings() {
        let resp: CmcListingsResponse = serde_json::from_str(SAMPLE).unwrap();
        let assets = CmcClient::normalize(resp).unwrap();
        assert_eq!(assets.len(), 2);

        let newt = &assets[0];
        assert_eq!(newt.cid, 36001);
        assert_eq!(newt.slug, "newt-token");
        assert_eq!(newt.market_pairs, 4);
        assert_eq!(newt.volume_24h, dec!(450000));
        assert_eq!(newt.market_cap, Decimal::ZERO);
        assert!(newt.price.is_some());
        assert_eq!(newt.listed_at.timestamp(), 1_741_429_800);

        let bare = &assets[1];
        assert_eq!(bare.symbol, "BARE");
        assert_eq!(bare.slug, "");
        assert_eq!(bare.price, None);
        assert_eq!(bare.volume_24h, Decimal::ZERO);
    }

    #[test]
    fn test_out_of_range_figure_does_not_drop_other_rows() {
        let resp: CmcListingsResponse = serde_json::from_str(
            r#"{
                "status": {"error_code": 0},
                "data": [
                    {
                        "id": 1, "name": "Good", "symbol": "GOOD", "slug": "good",
                        "date_added": "2025-03-08T10:30:00.000Z",
                        "quote": {"USD": {"price": 1.25, "volume_24h": 900000, "market_cap": 5000000}}
                    },
                    {
                        "id": 2, "name": "Broken Supply", "symbol": "BRKN", "slug": "broken-supply",
                        "date_added": "2025-03-08T11:00:00.000Z",
                        "quote": {"USD": {"price": 0.5, "volume_24h": 1e30, "market_cap": "n/a"}}
                    }
                ]
            }"#,
        )
        .unwrap();
        let assets = CmcClient::normalize(resp).unwrap();
        assert_eq!(assets.len(), 2);

        assert_eq!(assets[0].symbol, "GOOD");
        assert_eq!(assets[0].volume_24h, dec!(900000));
        assert_eq!(assets[0].price, Some(dec!(1.25)));

        // Unreadable figures fall back to absent
        assert_eq!(assets[1].price, Some(dec!(0.5)));
        assert_eq!(assets[1].volume_24h, Decimal::ZERO);
        assert_eq!(assets[1].market_cap, Decimal::ZERO);
    }

    #[test]
    fn test_error_status_is_an_error() {
        let resp: CmcListingsResponse = serde_json::from_str(
            r#"{"status": {"error_code": 1002, "error_message": "API key missing."}, "data": []}"#,
        )
        .unwrap();
        let err = CmcClient::normalize(resp).unwrap_err();
        assert!(err.to_string().contains("1002"));
    }

    #[test]
    fn test_parse_date_added_variants() {
        assert!(CmcClient::parse_date_added("2025-03-08T10:30:00.000Z").is_some());
        assert!(CmcClient::parse_date_added("2025-03-08T10:30:00+00:00").is_some());
        assert!(CmcClient::parse_date_added("yesterday").is_none());
    }
}
