// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User timezone resolution.

use chrono::{DateTime, FixedOffset, Local, SecondsFormat, TimeZone, Utc};
use tracing::warn;

/// A user's configured timezone.
#[derive(Debug, Clone, PartialEq)]
pub enum UserTimezone {
    /// `Auto`: the host's local zone.
    Local,
    /// `UTC+X` / `UTC-X`, fractional hours allowed.
    Fixed(FixedOffset),
    /// IANA zone name.
    Named(chrono_tz::Tz),
}

impl UserTimezone {
    /// Parse a settings value. Invalid zones fall back to UTC.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.eq_ignore_ascii_case("auto") {
            return Self::Local;
        }

        if let Some(offset) = value.strip_prefix("UTC").filter(|o| !o.is_empty()) {
            match parse_offset_hours(offset) {
                Some(fixed) => return Self::Fixed(fixed),
                None => {
                    warn!(timezone = value, "invalid UTC offset, falling back to UTC");
                    return Self::Named(chrono_tz::UTC);
                }
            }
        }

        match value.parse::<chrono_tz::Tz>() {
            Ok(tz) => Self::Named(tz),
            Err(_) => {
                warn!(timezone = value, "unknown timezone, falling back to UTC");
                Self::Named(chrono_tz::UTC)
            }
        }
    }

    /// Convert a UTC instant into this zone.
    pub fn localize(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        match self {
            Self::Local => instant.with_timezone(&Local).fixed_offset(),
            Self::Fixed(offset) => instant.with_timezone(offset),
            Self::Named(tz) => instant.with_timezone(tz).fixed_offset(),
        }
    }

    /// Current time as an ISO-8601 string with offset.
    pub fn now_iso(&self) -> String {
        self.localize(Utc::now())
            .to_rfc3339_opts(SecondsFormat::Micros, false)
    }

    /// Format a Unix timestamp (seconds, fractional allowed) in this zone.
    pub fn format_timestamp(&self, unix_secs: f64, format: &str) -> String {
        let secs = unix_secs.trunc() as i64;
        let nanos = ((unix_secs.fract() * 1e9).round() as u32).min(999_999_999);
        match Utc.timestamp_opt(secs, nanos).single() {
            Some(instant) => self.localize(instant).format(format).to_string(),
            None => String::new(),
        }
    }

    /// Human-readable zone name used in prompts.
    pub fn label(&self) -> String {
        match self {
            Self::Local => Local::now().offset().to_string(),
            Self::Fixed(offset) => offset.to_string(),
            Self::Named(tz) => tz.name().to_string(),
        }
    }
}

fn parse_offset_hours(raw: &str) -> Option<FixedOffset> {
    let hours: f64 = raw.strip_prefix('+').unwrap_or(raw).parse().ok()?;
    if !hours.is_finite() {
        return None;
    }
    FixedOffset::east_opt((hours * 3600.0).round() as i32)
}
