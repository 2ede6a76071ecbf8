//! Audit log.
//!
//! Append-only record of every accepted lifecycle transition. Rows are
//! buffered during a cycle and written once at the end inside a single
//! SQLite transaction; a failed flush keeps the buffer for the next cycle.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::Asset;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStatus {
    New,
    Trading,
    FirstMove,
    Confirm,
    Evicted,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::New => "NEW",
            AuditStatus::Trading => "TRADING",
            AuditStatus::FirstMove => "FIRST_MOVE",
            AuditStatus::Confirm => "CONFIRM",
            AuditStatus::Evicted => "EVICTED",
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditRow {
    pub detected_at: DateTime<Utc>,
    pub cid: u64,
    pub symbol: String,
    pub name: String,
    pub slug: String,
    pub age_days: i64,
    pub market_cap: Decimal,
    pub volume_24h: Decimal,
    pub status: AuditStatus,
    pub comment: String,
}

impl AuditRow {
    pub fn new(asset: &Asset, status: AuditStatus, comment: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            detected_at: now,
            cid: asset.cid,
            symbol: asset.symbol.clone(),
            name: asset.name.clone(),
            slug: asset.slug.clone(),
            age_days: asset.age_days(now),
            market_cap: asset.market_cap,
            volume_24h: asset.volume_24h,
            status,
            comment: comment.into(),
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Buffer one row.
    fn record(&mut self, row: AuditRow);

    /// Persist buffered rows. Returns how many were written.
    async fn flush(&mut self) -> Result<usize>;
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullAudit;

#[async_trait]
impl AuditSink for NullAudit {
    fn record(&mut self, _row: AuditRow) {}

    async fn flush(&mut self) -> Result<usize> {
        Ok(0)
    }
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS audit_log (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id      TEXT    NOT NULL,
        detected_at TEXT    NOT NULL,
        cmc_id      INTEGER NOT NULL,
        symbol      TEXT    NOT NULL,
        name        TEXT    NOT NULL,
        slug        TEXT    NOT NULL,
        age_days    INTEGER NOT NULL,
        market_cap  TEXT    NOT NULL,
        volume_24h  TEXT    NOT NULL,
        status      TEXT    NOT NULL,
        comment     TEXT    NOT NULL
    )
"#;

pub struct SqliteAuditLog {
    pool: SqlitePool,
    /// Tags every row written by this process.
    run_id: Uuid,
    buffer: Vec<AuditRow>,
}

impl SqliteAuditLog {
    /// Open (creating if needed) the database at `url`,
    /// e.g. `sqlite://radar_audit.db?mode=rwc`.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .with_context(|| format!("Failed to open audit database {url}"))?;
        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .context("Failed to create audit_log table")?;

        let run_id = Uuid::new_v4();
        info!(%run_id, "Audit log ready");
        Ok(Self {
            pool,
            run_id,
            buffer: Vec::new(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

#[async_trait]
impl AuditSink for SqliteAuditLog {
    fn record(&mut self, row: AuditRow) {
        debug!(cid = row.cid, symbol = %row.symbol, status = %row.status, "Audit row buffered");
        self.buffer.push(row);
    }

    async fn flush(&mut self) -> Result<usize> {
        if self.buffer.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.context("Failed to begin audit transaction")?;
        for row in &self.buffer {
            sqlx::query(
                r#"
                INSERT INTO audit_log
                    (run_id, detected_at, cmc_id, symbol, name, slug, age_days,
                     market_cap, volume_24h, status, comment)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(self.run_id.to_string())
            .bind(row.detected_at.to_rfc3339())
            .bind(row.cid as i64)
            .bind(&row.symbol)
            .bind(&row.name)
            .bind(&row.slug)
            .bind(row.age_days)
            .bind(row.market_cap.to_string())
            .bind(row.volume_24h.to_string())
            .bind(row.status.as_str())
            .bind(&row.comment)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert audit row for {}", row.cid))?;
        }
        tx.commit().await.context("Failed to commit audit rows")?;

        let written = self.buffer.len();
        self.buffer.clear();
        info!(rows = written, "Audit log flushed");
        Ok(written)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
