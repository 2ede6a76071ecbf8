//! Listings source and admission filter.
//!
//! The listings source hands out the most recently added assets; the
//! admission filter decides which of them are worth watching.

pub mod cmc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::config::ListingsConfig;
use crate::types::Asset;

/// Source of newly listed assets, most recent first.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ListingsSource: Send + Sync {
    async fn fetch_recent(&self, limit: u32) -> Result<Vec<Asset>>;
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Flagged by the unverified heuristics but admitted because the
    /// configuration allows it.
    AdmittedUnverified(String),
    Rejected(String),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Admission::Rejected(_))
    }
}

pub struct AdmissionFilter {
    config: ListingsConfig,
}

impl AdmissionFilter {
    pub fn new(config: ListingsConfig) -> Self {
        Self { config }
    }

    /// Age, volume and slug checks, then the unverified heuristics.
    pub fn check(&self, asset: &Asset, now: DateTime<Utc>) -> Admission {
        let cfg = &self.config;

        let age = asset.age_days(now);
        if age > cfg.max_age_days {
            return Admission::Rejected(format!("too old ({age}d > {}d)", cfg.max_age_days));
        }
        if asset.volume_24h < cfg.min_volume_usd {
            return Admission::Rejected(format!(
                "volume 24h ${} below ${}",
                asset.volume_24h.round_dp(0),
                cfg.min_volume_usd
            ));
        }
        if asset.slug.trim().is_empty() {
            return Admission::Rejected("missing slug".to_string());
        }

        match self.unverified_reason(asset) {
            None => Admission::Admitted,
            Some(reason) if cfg.allow_unverified => Admission::AdmittedUnverified(reason),
            Some(reason) => Admission::Rejected(format!("unverified: {reason}")),
        }
    }

    /// Heuristics for junk listings. `None` when nothing looks off.
    pub fn unverified_reason(&self, asset: &Asset) -> Option<String> {
        let symbol = asset.symbol.trim().to_uppercase();
        let name = asset.name.trim().to_lowercase();
        let slug = asset.slug.trim().to_lowercase();

        let looks_like_url = |s: &str| s.contains('.') || s.contains("http") || s.contains("www");

        if looks_like_url(&name) {
            return Some("name looks like a domain/URL".to_string());
        }
        if looks_like_url(&slug) {
            return Some("slug looks like a domain/URL".to_string());
        }
        if symbol.contains('_') {
            return Some("suspicious symbol (contains _)".to_string());
        }
        if asset.market_cap == Decimal::ZERO && asset.volume_24h >= self.config.zero_mcap_volume_usd {
            return Some("zero market cap with high volume".to_string());
        }
        if symbol.chars().count() > self.config.max_symbol_len {
            return Some("symbol too long".to_string());
        }
        None
    }
}
