//! Offline analysis of proxy and web server access logs: unique clients,
//! transferred bytes and the most requested domains, overall and per month.

pub mod aggregate;
pub mod bar;
pub mod normalize;
pub mod parser;
pub mod report;
pub mod stages;

pub use aggregate::{DomainCounter, LineStats, TrafficStats};
pub use normalize::{ParsedRecord, Period};
pub use parser::{Classifier, FormatKind, SkipReason};
pub use report::Report;
