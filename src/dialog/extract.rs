//! Field-specific answer extraction.
//!
//! Best-effort only: an answer that doesn't parse yields `FieldUpdate::Empty`
//! and the flow re-asks the same question on the next turn.

use std::sync::LazyLock;

use regex::Regex;

use super::collected::{IdentityKind, field};

/// A typed update extracted from a user answer.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    /// Nothing usable was found.
    Empty,
    Text(String),
    /// Price in minor currency units (NTD × 100), with confirmation flag.
    Price { cents: i64, confirmed: bool },
    /// Duration normalized to minutes.
    Duration { minutes: i64 },
    /// `YYYY-MM`.
    YearMonth(String),
    YesNo(bool),
    Identity(IdentityKind),
    Interests(Vec<String>),
}

static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*(?:元|塊|NT\$?|＄|\$)?").unwrap());
static HOURS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*(?:個?小時|個鐘頭|hours?|hrs?|h)").unwrap());
static MINUTES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*(?:分鐘|分|minutes?|mins?|m)").unwrap());
static YEAR_MONTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})\s*[年/\-\.]\s*(\d{1,2})").unwrap());

/// Extract a structured update for `field_name` from a free-text answer.
pub fn extract_structured_info(message: &str, field_name: &str) -> FieldUpdate {
    let message = message.trim();
    if message.is_empty() {
        return FieldUpdate::Empty;
    }
    match field_name {
        field::PRODUCT_PRICE => extract_price(message),
        field::PRODUCT_DURATION => extract_duration(message),
        field::VISIT_DATE => extract_year_month(message),
        field::LOCATION_CONFIRMED | field::MORE_PRODUCTS | field::REVISIT_INTENT => {
            extract_yes_no(message)
        }
        field::IDENTITY => extract_identity(message),
        field::INTERESTS => extract_interests(message),
        _ => FieldUpdate::Text(message.to_string()),
    }
}

/// `"1500元"` → 150 000 minor units.
fn extract_price(message: &str) -> FieldUpdate {
    let Some(caps) = PRICE_RE.captures(message) else {
        return FieldUpdate::Empty;
    };
    match caps[1].parse::<f64>() {
        Ok(value) if value >= 0.0 => FieldUpdate::Price {
            cents: (value * 100.0).round() as i64,
            confirmed: true,
        },
        _ => FieldUpdate::Empty,
    }
}

/// Hours are normalized to minutes; bare minutes pass through.
fn extract_duration(message: &str) -> FieldUpdate {
    if let Some(caps) = HOURS_RE.captures(message) {
        if let Ok(hours) = caps[1].parse::<f64>() {
            return FieldUpdate::Duration {
                minutes: (hours * 60.0).round() as i64,
            };
        }
    }
    if let Some(caps) = MINUTES_RE.captures(message) {
        if let Ok(minutes) = caps[1].parse::<i64>() {
            return FieldUpdate::Duration { minutes };
        }
    }
    FieldUpdate::Empty
}

/// `2023年7月`, `2023-07`, `2023/7` → `"2023-07"`.
fn extract_year_month(message: &str) -> FieldUpdate {
    let Some(caps) = YEAR_MONTH_RE.captures(message) else {
        return FieldUpdate::Empty;
    };
    let year: i32 = match caps[1].parse() {
        Ok(y) => y,
        Err(_) => return FieldUpdate::Empty,
    };
    let month: u32 = match caps[2].parse() {
        Ok(m) if (1..=12).contains(&m) => m,
        _ => return FieldUpdate::Empty,
    };
    FieldUpdate::YearMonth(format!("{year:04}-{month:02}"))
}

const YES_PHRASES: &[&str] = &["沒錯", "沒問題", "好啊", "當然"];
const NO_TOKENS: &[&str] = &["不", "沒", "否", "no"];
const YES_TOKENS: &[&str] = &["是", "有", "好", "要", "想", "對", "yes", "ok"];

fn extract_yes_no(message: &str) -> FieldUpdate {
    let lower = message.to_lowercase();
    // Affirmative phrases that contain a negation character come first.
    if YES_PHRASES.iter().any(|p| lower.contains(p)) {
        return FieldUpdate::YesNo(true);
    }
    if NO_TOKENS.iter().any(|p| lower.contains(p)) {
        return FieldUpdate::YesNo(false);
    }
    if YES_TOKENS.iter().any(|p| lower.contains(p)) {
        return FieldUpdate::YesNo(true);
    }
    FieldUpdate::Empty
}

const LOCAL_PHRASES: &[&str] = &["居民", "在地", "本地", "我住", "住在澎湖"];
const PLANNING_PHRASES: &[&str] = &["想來", "想去", "計畫", "打算", "第一次", "還沒來過", "還沒去過"];
const VISITED_PHRASES: &[&str] = &["來過", "去過", "玩過", "以前有來"];

/// Classify a self-identification answer.
///
/// Planning is checked before visited: "還沒來過" contains "來過" but means
/// the opposite.
fn extract_identity(message: &str) -> FieldUpdate {
    if LOCAL_PHRASES.iter().any(|p| message.contains(p)) {
        return FieldUpdate::Identity(IdentityKind::Local);
    }
    if PLANNING_PHRASES.iter().any(|p| message.contains(p)) {
        return FieldUpdate::Identity(IdentityKind::Planning);
    }
    if VISITED_PHRASES.iter().any(|p| message.contains(p)) {
        return FieldUpdate::Identity(IdentityKind::Visited);
    }
    FieldUpdate::Empty
}

fn extract_interests(message: &str) -> FieldUpdate {
    let mut items: Vec<String> = Vec::new();
    for part in message.split(['、', ',', '，', ' ', '和', '跟']) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let item = part.to_string();
        if !items.contains(&item) {
            items.push(item);
        }
    }
    if items.is_empty() {
        FieldUpdate::Empty
    } else {
        FieldUpdate::Interests(items)
    }
}
