//! Alert texts (Telegram HTML parse mode).
//!
//! Every user-supplied string goes through [`escape_html`]; prices never
//! use scientific notation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt::Write as _;
use std::time::Duration;

use crate::signal::liquidity::LiquidityDecision;
use crate::signal::SignalReport;
use crate::types::{Action, Asset, PipelineState, VenueId};

const DASH: &str = "—";

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// `$1.23B`, `$4.56M`, `$7.89K`, `$12.00`.
pub fn fmt_money(x: Option<Decimal>) -> String {
    let Some(x) = x else {
        return DASH.to_string();
    };
    let billion = dec!(1_000_000_000);
    let million = dec!(1_000_000);
    let thousand = dec!(1_000);
    if x >= billion {
        format!("${:.2}B", (x / billion).round_dp(2))
    } else if x >= million {
        format!("${:.2}M", (x / million).round_dp(2))
    } else if x >= thousand {
        format!("${:.2}K", (x / thousand).round_dp(2))
    } else {
        format!("${:.2}", x.round_dp(2))
    }
}

/// Up to 8 decimals, trailing zeros stripped.
pub fn fmt_price(x: Option<Decimal>) -> String {
    match x {
        Some(x) => x.round_dp(8).normalize().to_string(),
        None => DASH.to_string(),
    }
}

fn fmt_pct(x: Option<Decimal>) -> String {
    match x {
        Some(x) => format!("{:.2}%", x.round_dp(2)),
        None => DASH.to_string(),
    }
}

fn header(asset: &Asset) -> String {
    format!(
        "<b>{}</b> ({}) · CMC #{}",
        escape_html(&asset.name),
        escape_html(&asset.symbol),
        asset.cid
    )
}

fn links(asset: &Asset) -> String {
    format!(
        "CoinMarketCap: {}\nMarkets: {}",
        asset.cmc_url(),
        asset.markets_url()
    )
}

// ---- Lifecycle messages ----

/// First observation of an admitted asset.
pub fn discovered(asset: &Asset, now: DateTime<Utc>, unverified: Option<&str>) -> String {
    let mut msg = format!("🆕 <b>New listing detected</b>\n\n{}\n", header(asset));
    let _ = writeln!(
        msg,
        "Added: {} · age {}d · pairs {}",
        asset.listed_at.format("%Y-%m-%d %H:%M UTC"),
        asset.age_days(now),
        asset.market_pairs
    );
    let _ = writeln!(msg, "\nPrice (CMC): ${}", fmt_price(asset.price));
    let _ = writeln!(msg, "Market cap: <b>{}</b>", fmt_money(Some(asset.market_cap)));
    let _ = writeln!(msg, "Volume 24h: <b>{}</b>", fmt_money(Some(asset.volume_24h)));
    if let Some(reason) = unverified {
        let _ = writeln!(msg, "\n⚠️ UNVERIFIED: {}", escape_html(reason));
    }
    let _ = write!(msg, "\n{}", links(asset));
    msg
}

/// Trading confirmed on at least one venue; `statuses` lists every probed
/// venue in probe order.
pub fn trading_found(asset: &Asset, statuses: &[(VenueId, bool)], signal_venue: VenueId) -> String {
    let mut msg = format!("✅ <b>Trading found</b>\n\n{}\n\n", header(asset));
    for (venue, trading) in statuses {
        let mark = if *trading { "✅" } else { "❌" };
        let _ = writeln!(msg, "{mark} {venue}");
    }
    let _ = write!(
        msg,
        "\nSignals from: <b>{signal_venue}</b>\n\n{}",
        links(asset)
    );
    msg
}

fn signal_body(msg: &mut String, report: &SignalReport, liquidity: &LiquidityDecision) {
    let entry = &report.entry;
    let exit = &report.exit;
    let _ = writeln!(
        msg,
        "Score: <b>{}</b> ({}/4) · {}",
        report.score.grade,
        report.score.points,
        escape_html(&report.score.reason)
    );
    let _ = writeln!(
        msg,
        "Verdict: <b>{}</b> · {}",
        report.verdict.action,
        escape_html(&report.verdict.reason)
    );
    let _ = writeln!(msg, "\nEntry ({}): {}", entry.mode, fmt_price(entry.entry));
    let _ = writeln!(msg, "Stop: {}", fmt_price(entry.stop));
    let _ = writeln!(msg, "Invalidation: {}", fmt_price(entry.invalidation));
    let _ = writeln!(msg, "TP1: {} · TP2: {}", fmt_price(exit.tp1), fmt_price(exit.tp2));
    if exit.breakeven_after_tp1 {
        let _ = writeln!(msg, "After TP1: stop to break-even");
    }
    if !exit.trail_hint.is_empty() {
        let _ = writeln!(msg, "Trail: {}", escape_html(&exit.trail_hint));
    }
    let _ = writeln!(msg, "Plan: {}", escape_html(&exit.notes));
    let _ = write!(
        msg,
        "\nSpread: {} · notional 5m {} · 15m {}",
        fmt_pct(liquidity.spread_pct),
        fmt_money(Some(liquidity.notional_fast)),
        fmt_money(Some(liquidity.notional_slow)),
    );
}

/// Fast-timeframe impulse that graded PLAY.
pub fn first_move(asset: &Asset, venue: VenueId, report: &SignalReport, liquidity: &LiquidityDecision) -> String {
    let mut msg = format!(
        "🚀 <b>First move</b> · {} · {venue}\n\n{}\n\n",
        report.timeframe,
        header(asset)
    );
    signal_body(&mut msg, report, liquidity);
    msg
}

/// Slow-timeframe corroboration (PLAY or WAIT).
pub fn confirm(asset: &Asset, venue: VenueId, report: &SignalReport, liquidity: &LiquidityDecision) -> String {
    let light = match report.verdict.action {
        Action::Play => "🟢",
        _ => "🟡",
    };
    let mut msg = format!(
        "{light} <b>Confirm</b> · {} · {venue}\n\n{}\n\n",
        report.timeframe,
        header(asset)
    );
    signal_body(&mut msg, report, liquidity);
    msg
}

// ---- Process messages ----

pub fn startup(name: &str, state: &PipelineState, interval: Duration) -> String {
    format!(
        "📡 <b>{}</b> started\n\nPoll interval: {} min\nWatching: {} · tracked: {} · seen: {}",
        escape_html(name),
        interval.as_secs() / 60,
        state.watch.len(),
        state.tracked.len(),
        state.seen.len(),
    )
}

pub fn error(name: &str, err: &anyhow::Error) -> String {
    format!(
        "⚠️ <b>{}</b> cycle error\n\n<code>{}</code>",
        escape_html(name),
        escape_html(&format!("{err:#}"))
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
