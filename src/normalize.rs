//! Turning raw field strings into typed records.

use std::fmt;

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate};

use crate::parser::{RawFields, SkipReason};

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Identity tokens that mean "nobody in particular".
const IDENTITY_SENTINELS: [&str; 2] = ["-", "unknown"];

/// Calendar month bucket. Ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period {
    year: i32,
    /// 1-based, always in 1..=12
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of<Tz: chrono::TimeZone>(time: &DateTime<Tz>) -> Self {
        Self {
            year: time.year(),
            month: time.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn month_abbrev(&self) -> &'static str {
        MONTHS[(self.month - 1) as usize]
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}_{}", self.year, self.month_abbrev())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecord {
    pub identity: Option<String>,
    pub timestamp: DateTime<FixedOffset>,
    pub domain: Option<String>,
    pub size: u64,
    pub period: Period,
}

pub fn normalize(fields: &RawFields) -> Result<ParsedRecord, SkipReason> {
    let timestamp = resolve_timestamp(fields).ok_or(SkipReason::InvalidTimestamp)?;
    let domain = fields
        .url
        .as_deref()
        .and_then(|url| extract_domain(fields.method.as_deref(), url));

    Ok(ParsedRecord {
        identity: resolve_identity(fields.user.as_deref(), fields.client.as_deref()),
        period: Period::of(&timestamp),
        timestamp,
        domain,
        size: parse_size(fields.size.as_deref()),
    })
}

pub fn is_identity(token: &str) -> bool {
    !token.is_empty()
        && !IDENTITY_SENTINELS
            .iter()
            .any(|sentinel| token.eq_ignore_ascii_case(sentinel))
}

/// The explicit user wins over the client address.
pub fn resolve_identity(user: Option<&str>, client: Option<&str>) -> Option<String> {
    [user, client]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|token| is_identity(token))
        .map(str::to_owned)
}

fn resolve_timestamp(fields: &RawFields) -> Option<DateTime<FixedOffset>> {
    fields
        .date
        .as_deref()
        .and_then(|date| parse_clf_date(date).ok())
        .or_else(|| fields.epoch.as_deref().and_then(parse_epoch))
}

fn digits(s: &str, range: std::ops::Range<usize>) -> Result<u32> {
    let part = s
        .get(range)
        .ok_or_else(|| anyhow!("truncated date: {:?}", s))?;
    if !part.bytes().all(|b| b.is_ascii_digit()) {
        bail!("expected digits, got {:?}", part);
    }
    Ok(part.parse()?)
}

/// Parse `10/Jan/2023:13:55:36 -0500`, brackets optional.
pub fn parse_clf_date(s: &str) -> Result<DateTime<FixedOffset>> {
    let s = s.trim_matches(|c: char| c == '[' || c == ']');
    if s.len() != 26 {
        bail!("unexpected date length: {:?}", s);
    }
    let bytes = s.as_bytes();
    for (idx, sep) in [(2, b'/'), (6, b'/'), (11, b':'), (14, b':'), (17, b':'), (20, b' ')] {
        if bytes[idx] != sep {
            bail!("unexpected separator in date: {:?}", s);
        }
    }

    let day = digits(s, 0..2)?;
    let month_str = s.get(3..6).ok_or_else(|| anyhow!("invalid month"))?;
    let month = MONTHS
        .iter()
        .position(|m| m.eq_ignore_ascii_case(month_str))
        .ok_or_else(|| anyhow!("invalid month: {}", month_str))? as u32
        + 1;
    let year = digits(s, 7..11)? as i32;
    let hour = digits(s, 12..14)?;
    let minute = digits(s, 15..17)?;
    let second = digits(s, 18..20)?;

    let timezone_sign = match bytes[21] {
        b'+' => 1,
        b'-' => -1,
        _ => bail!("invalid timezone sign"),
    };
    let timezone_offset =
        timezone_sign * (digits(s, 22..24)? as i32 * 3600 + digits(s, 24..26)? as i32 * 60);
    let timezone = FixedOffset::east_opt(timezone_offset).ok_or(anyhow!("invalid timezone"))?;

    let datetime = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .map(|date| date.and_local_timezone(timezone))
        .ok_or(anyhow!("invalid datetime"))?;
    let datetime = datetime
        .single()
        .ok_or(anyhow!("ambiguous or invalid datetime"))?;
    Ok(datetime)
}

/// Parse `1673358936` or `1673358936.586` as UTC.
pub fn parse_epoch(s: &str) -> Option<DateTime<FixedOffset>> {
    let (secs, frac) = s.trim().split_once('.').unwrap_or((s.trim(), ""));
    if secs.is_empty() || !secs.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let secs: i64 = secs.parse().ok()?;
    let nsecs: u32 = if frac.is_empty() {
        0
    } else {
        format!("{:0<9}", &frac[..frac.len().min(9)]).parse().ok()?
    };
    DateTime::from_timestamp(secs, nsecs).map(|time| time.fixed_offset())
}

/// Canonical lowercase host of a requested URL, `None` when nothing is left.
pub fn extract_domain(method: Option<&str>, url: &str) -> Option<String> {
    let url = url.trim();
    // `-` is the log placeholder for "no URL"
    if url == "-" {
        return None;
    }
    let host = if method.is_some_and(|m| m.eq_ignore_ascii_case("CONNECT")) {
        // host:port
        url.split(':').next().unwrap_or_default()
    } else {
        let rest = strip_scheme(url);
        let end = rest.find(['/', ':', '?']).unwrap_or(rest.len());
        &rest[..end]
    };
    let host = host.strip_prefix("www.").unwrap_or(host).to_lowercase();
    (!host.is_empty()).then_some(host)
}

fn strip_scheme(url: &str) -> &str {
    for scheme in ["http://", "https://"] {
        if let Some(prefix) = url.get(..scheme.len()) {
            if prefix.eq_ignore_ascii_case(scheme) {
                return &url[scheme.len()..];
            }
        }
    }
    url
}

/// Byte count; `-`, missing or garbage count as zero.
pub fn parse_size(size: Option<&str>) -> u64 {
    size.and_then(|s| s.trim().parse().ok()).unwrap_or(0)
}
