use std::{borrow::Cow, net::IpAddr};

use clap::ValueEnum;
use thiserror::Error;

use crate::normalize::{normalize, ParsedRecord};

pub mod combined;
pub mod json;
pub mod short;
pub mod squid;

/// Field strings captured from one matched line, not yet interpreted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RawFields<'a> {
    /// `day/Mon/Year:H:M:S ±zzzz`, without the brackets
    pub date: Option<Cow<'a, str>>,
    /// Seconds since the epoch, optionally with a fraction
    pub epoch: Option<Cow<'a, str>>,
    pub client: Option<Cow<'a, str>>,
    pub user: Option<Cow<'a, str>>,
    pub method: Option<Cow<'a, str>>,
    pub url: Option<Cow<'a, str>>,
    pub status: Option<u16>,
    pub size: Option<Cow<'a, str>>,
    pub cache_status: Option<Cow<'a, str>>,
}

pub trait LogFormat: Send + Sync {
    fn name(&self) -> &'static str;
    /// Match the whole line against this shape. `None` when any mandatory
    /// field is missing or malformed.
    fn parse<'a>(&self, line: &'a str) -> Option<RawFields<'a>>;
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    /// Common/combined log with bracketed date and quoted request
    Combined,
    /// Squid native access log
    Squid,
    /// Short proxy line without a request line
    Short,
    /// One JSON object per line
    Json,
}

impl FormatKind {
    pub const DEFAULT_ORDER: [FormatKind; 4] = [
        FormatKind::Combined,
        FormatKind::Squid,
        FormatKind::Short,
        FormatKind::Json,
    ];

    pub fn build(&self) -> Box<dyn LogFormat> {
        match self {
            FormatKind::Combined => Box::<combined::CombinedFormat>::default(),
            FormatKind::Squid => Box::<squid::SquidFormat>::default(),
            FormatKind::Short => Box::<short::ShortFormat>::default(),
            FormatKind::Json => Box::<json::JsonFormat>::default(),
        }
    }
}

/// Why a line did not turn into a record.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SkipReason {
    #[error("empty line")]
    Empty,
    #[error("no known format matched")]
    Unmatched,
    #[error("timestamp could not be parsed")]
    InvalidTimestamp,
}

/// Ordered list of formats; the first one that matches a line wins.
pub struct Classifier {
    formats: Vec<Box<dyn LogFormat>>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(&FormatKind::DEFAULT_ORDER)
    }
}

impl Classifier {
    pub fn new(kinds: &[FormatKind]) -> Self {
        let mut seen = Vec::new();
        for kind in kinds {
            if !seen.contains(kind) {
                seen.push(*kind);
            }
        }
        Self::with_formats(seen.iter().map(|kind| kind.build()).collect())
    }

    /// Formats are tried in the given order.
    pub fn with_formats(formats: Vec<Box<dyn LogFormat>>) -> Self {
        Self { formats }
    }

    pub fn format_names(&self) -> Vec<&'static str> {
        self.formats.iter().map(|f| f.name()).collect()
    }

    pub fn classify<'a>(&self, line: &'a str) -> Option<(&'static str, RawFields<'a>)> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        self.formats
            .iter()
            .find_map(|format| format.parse(line).map(|fields| (format.name(), fields)))
    }

    /// Classify and normalize one line, reporting the matched format name.
    pub fn parse_line(&self, line: &str) -> Result<(&'static str, ParsedRecord), SkipReason> {
        if line.trim().is_empty() {
            return Err(SkipReason::Empty);
        }
        let (name, fields) = self.classify(line).ok_or(SkipReason::Unmatched)?;
        let record = normalize(&fields)?;
        Ok((name, record))
    }
}

fn capture<'a>(caps: &regex::Captures<'a>, name: &str) -> Option<Cow<'a, str>> {
    caps.name(name).map(|m| Cow::Borrowed(m.as_str()))
}

fn is_ip(s: &str) -> bool {
    s.parse::<IpAddr>().is_ok()
}
