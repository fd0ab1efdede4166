//! Running totals over normalized records.
//!
//! A `TrafficStats` is owned by whoever drives the parse (one per input
//! file when running in parallel) and partial states are folded together
//! with [`TrafficStats::merge`].

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::{
    normalize::{is_identity, ParsedRecord, Period},
    parser::{Classifier, SkipReason},
};

/// Hit counter that remembers the order in which domains were first seen.
#[derive(Debug, Default, Clone)]
pub struct DomainCounter {
    index: HashMap<String, usize>,
    entries: Vec<(String, u64)>,
}

impl DomainCounter {
    pub fn increment(&mut self, domain: &str) {
        match self.index.get(domain) {
            Some(&idx) => self.entries[idx].1 += 1,
            None => self.insert(domain.to_owned(), 1),
        }
    }

    fn add(&mut self, domain: String, count: u64) {
        match self.index.get(&domain) {
            Some(&idx) => self.entries[idx].1 += count,
            None => self.insert(domain, count),
        }
    }

    fn insert(&mut self, domain: String, count: u64) {
        self.index.insert(domain.clone(), self.entries.len());
        self.entries.push((domain, count));
    }

    pub fn get(&self, domain: &str) -> u64 {
        self.index
            .get(domain)
            .map_or(0, |&idx| self.entries[idx].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all hits.
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, count)| count).sum()
    }

    /// Entries in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries
            .iter()
            .map(|(domain, count)| (domain.as_str(), *count))
    }

    /// Domains new to `self` are appended in `other`'s first-seen order.
    pub fn merge(&mut self, other: DomainCounter) {
        for (domain, count) in other.entries {
            self.add(domain, count);
        }
    }
}

// Counts are compared as a multiset; first-seen order only matters for
// breaking ties in reports.
impl PartialEq for DomainCounter {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(domain, count)| other.get(domain) == count)
    }
}

impl Eq for DomainCounter {}

/// Per-line diagnostics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LineStats {
    pub lines: u64,
    pub matched: BTreeMap<&'static str, u64>,
    pub skipped: BTreeMap<SkipReason, u64>,
    pub without_domain: u64,
}

impl LineStats {
    pub fn matched_total(&self) -> u64 {
        self.matched.values().sum()
    }

    pub fn skipped_total(&self) -> u64 {
        self.skipped.values().sum()
    }

    pub fn merge(&mut self, other: LineStats) {
        self.lines += other.lines;
        for (format, count) in other.matched {
            *self.matched.entry(format).or_default() += count;
        }
        for (reason, count) in other.skipped {
            *self.skipped.entry(reason).or_default() += count;
        }
        self.without_domain += other.without_domain;
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TrafficStats {
    pub identities: HashSet<String>,
    pub total_bytes: u64,
    pub domains: DomainCounter,
    pub monthly: BTreeMap<Period, DomainCounter>,
    pub lines: LineStats,
}

impl TrafficStats {
    pub fn absorb(&mut self, record: ParsedRecord) {
        if let Some(identity) = record.identity {
            if is_identity(&identity) {
                self.identities.insert(identity);
            }
        }
        self.total_bytes += record.size;
        match record.domain {
            Some(domain) if !domain.is_empty() => {
                self.domains.increment(&domain);
                self.monthly
                    .entry(record.period)
                    .or_default()
                    .increment(&domain);
            }
            _ => self.lines.without_domain += 1,
        }
    }

    /// Classify one raw line and absorb it, or count why it was skipped.
    pub fn absorb_line(&mut self, classifier: &Classifier, line: &str) {
        self.lines.lines += 1;
        match classifier.parse_line(line) {
            Ok((format, record)) => {
                *self.lines.matched.entry(format).or_default() += 1;
                self.absorb(record);
            }
            Err(reason) => {
                if reason != SkipReason::Empty {
                    tracing::trace!("Skipped ({}): {:?}", reason, line);
                }
                *self.lines.skipped.entry(reason).or_default() += 1;
            }
        }
    }

    pub fn merge(&mut self, other: TrafficStats) {
        self.identities.extend(other.identities);
        self.total_bytes += other.total_bytes;
        self.domains.merge(other.domains);
        for (period, counter) in other.monthly {
            self.monthly.entry(period).or_default().merge(counter);
        }
        self.lines.merge(other.lines);
    }

    pub fn unique_identities(&self) -> usize {
        self.identities.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, FixedOffset};
    use test_log::test;

    fn record(identity: &str, domain: &str, size: u64, time: &str) -> ParsedRecord {
        let timestamp = DateTime::<FixedOffset>::parse_from_rfc3339(time).unwrap();
        ParsedRecord {
            identity: Some(identity.to_owned()),
            timestamp,
            domain: Some(domain.to_owned()),
            size,
            period: Period::of(&timestamp),
        }
    }

    fn sample() -> Vec<ParsedRecord> {
        vec![
            record("1.2.3.4", "a.com", 100, "2023-01-10T00:00:00+00:00"),
            record("-", "b.com", 0, "2023-01-11T00:00:00+00:00"),
            record("bob", "a.com", 50, "2023-02-01T00:00:00+00:00"),
            record("bob", "c.com", 7, "2024-01-01T00:00:00+00:00"),
            record("unknown", "", 3, "2024-01-02T00:00:00+00:00"),
        ]
    }

    fn aggregate(records: &[ParsedRecord]) -> TrafficStats {
        let mut stats = TrafficStats::default();
        for record in records {
            stats.absorb(record.clone());
        }
        stats
    }

    #[test]
    fn test_sentinel_identity_is_not_a_user() {
        let mut stats = TrafficStats::default();
        stats.absorb(record("1.2.3.4", "a.com", 1, "2023-01-10T00:00:00+00:00"));
        let mut anonymous = record("-", "a.com", 1, "2023-01-10T00:00:00+00:00");
        stats.absorb(anonymous.clone());
        anonymous.identity = None;
        stats.absorb(anonymous);
        assert_eq!(stats.unique_identities(), 1);
    }

    #[test]
    fn test_absorb_totals() {
        let stats = aggregate(&sample());
        assert_eq!(stats.unique_identities(), 2);
        assert_eq!(stats.total_bytes, 160);
        assert_eq!(stats.domains.get("a.com"), 2);
        assert_eq!(stats.domains.get("b.com"), 1);
        assert_eq!(stats.lines.without_domain, 1);
        assert_eq!(stats.monthly.len(), 3);
        let jan_2023 = Period::new(2023, 1).unwrap();
        let jan_2024 = Period::new(2024, 1).unwrap();
        assert_eq!(stats.monthly[&jan_2023].get("a.com"), 1);
        assert_eq!(stats.monthly[&jan_2024].get("c.com"), 1);
        assert_eq!(stats.monthly[&jan_2024].get("a.com"), 0);
    }

    #[test]
    fn test_global_counts_equal_monthly_sums() {
        let stats = aggregate(&sample());
        for (domain, count) in stats.domains.iter() {
            let monthly: u64 = stats.monthly.values().map(|c| c.get(domain)).sum();
            assert_eq!(monthly, count, "{}", domain);
        }
        let with_domain = sample().iter().filter(|r| r.domain.as_deref() != Some("")).count();
        assert_eq!(stats.domains.total(), with_domain as u64);
    }

    #[test]
    fn test_merge_is_partition_and_order_independent() {
        let records = sample();
        let whole = aggregate(&records);
        for split in 0..=records.len() {
            let (left, right) = records.split_at(split);

            let mut forward = aggregate(left);
            forward.merge(aggregate(right));
            let mut backward = aggregate(right);
            backward.merge(aggregate(left));

            assert_eq!(forward, whole, "split at {}", split);
            assert_eq!(backward, whole, "split at {}", split);
        }
    }

    #[test]
    fn test_counter_keeps_first_seen_order() {
        let mut first = DomainCounter::default();
        first.increment("b.com");
        first.increment("a.com");
        first.increment("b.com");
        let mut second = DomainCounter::default();
        second.increment("c.com");
        second.increment("a.com");
        first.merge(second);
        let order: Vec<_> = first.iter().collect();
        assert_eq!(order, vec![("b.com", 2), ("a.com", 2), ("c.com", 1)]);
    }

    #[test]
    fn test_absorb_line_counts_skips() {
        let classifier = Classifier::default();
        let mut stats = TrafficStats::default();
        for line in [
            r#"203.0.113.5 - bob [10/Jan/2023:13:55:36 -0500] "GET http://www.Shop.com/item HTTP/1.1" 200 1024"#,
            "",
            "garbage",
            "1673358936.123 192.168.1.20 TCP_DENIED/403 0",
        ] {
            stats.absorb_line(&classifier, line);
        }
        assert_eq!(stats.lines.lines, 4);
        assert_eq!(stats.lines.matched_total(), 2);
        assert_eq!(stats.lines.matched.get("combined"), Some(&1));
        assert_eq!(stats.lines.matched.get("short"), Some(&1));
        assert_eq!(stats.lines.skipped.get(&SkipReason::Empty), Some(&1));
        assert_eq!(stats.lines.skipped.get(&SkipReason::Unmatched), Some(&1));
        assert_eq!(stats.lines.without_domain, 1);
        assert_eq!(stats.unique_identities(), 2);
        assert_eq!(stats.total_bytes, 1024);
    }
}
