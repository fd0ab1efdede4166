//! Final reduction of [`TrafficStats`] into ranked tables, and the flat
//! text/CSV files written from them.

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::{
    aggregate::{DomainCounter, TrafficStats},
    normalize::Period,
};

pub const DEFAULT_TOP: usize = 500;

const MIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Sorted
    pub users: Vec<String>,
    pub total_bytes: u64,
    pub limit: usize,
    pub global: Vec<(String, u64)>,
    pub monthly: BTreeMap<Period, Vec<(String, u64)>>,
}

/// Domains by descending hit count; ties keep first-seen order.
pub fn top_domains(counter: &DomainCounter, limit: usize) -> Vec<(String, u64)> {
    let mut items: Vec<_> = counter
        .iter()
        .map(|(domain, count)| (domain.to_owned(), count))
        .collect();
    // stable
    items.sort_by(|a, b| b.1.cmp(&a.1));
    items.truncate(limit);
    items
}

impl Report {
    pub fn build(stats: &TrafficStats, limit: usize) -> Self {
        let mut users: Vec<_> = stats.identities.iter().cloned().collect();
        users.sort();
        Self {
            users,
            total_bytes: stats.total_bytes,
            limit,
            global: top_domains(&stats.domains, limit),
            monthly: stats
                .monthly
                .iter()
                .map(|(period, counter)| (*period, top_domains(counter, limit)))
                .collect(),
        }
    }

    pub fn unique_users(&self) -> usize {
        self.users.len()
    }

    pub fn total_megabytes(&self) -> f64 {
        self.total_bytes as f64 / MIB
    }

    /// Write every table into `dir`, creating it when missing. Returns the
    /// written paths.
    pub fn write_to_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create output directory {}", dir.display()))?;
        let mut written = Vec::new();

        let path = dir.join("users.txt");
        write_file(&path, |w| {
            writeln!(w, "Total unique users: {}", self.unique_users())?;
            for user in &self.users {
                writeln!(w, "{}", user)?;
            }
            Ok(())
        })?;
        written.push(path);

        let path = dir.join("traffic_total.txt");
        write_file(&path, |w| {
            writeln!(w, "Total traffic: {:.2} MB", self.total_megabytes())?;
            Ok(())
        })?;
        written.push(path);

        let path = dir.join(format!("top_{}_global.csv", self.limit));
        write_file(&path, |w| write_table(w, &self.global))?;
        written.push(path);

        for (period, rows) in &self.monthly {
            let path = dir.join(format!("{}.csv", period));
            write_file(&path, |w| write_table(w, rows))?;
            written.push(path);
        }

        Ok(written)
    }

    pub fn print_summary(&self, top: usize) {
        println!("{}", "=".repeat(50));
        println!("Total unique users: {}", self.unique_users());
        println!("Total traffic: {:.2} MB", self.total_megabytes());
        println!();
        println!("Top {} domains:", top);
        println!("{}", "=".repeat(50));
        for (rank, (domain, count)) in self.global.iter().take(top).enumerate() {
            println!("{:>4}. {}: {} requests", rank + 1, domain, count);
        }
    }
}

fn write_file<F>(path: &Path, body: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    body(&mut writer)
        .and_then(|_| writer.flush())
        .with_context(|| format!("write {}", path.display()))
}

fn write_table<W: Write>(w: &mut W, rows: &[(String, u64)]) -> std::io::Result<()> {
    writeln!(w, "domain,count")?;
    for (domain, count) in rows {
        writeln!(w, "{},{}", csv_field(domain), count)?;
    }
    Ok(())
}

fn csv_field(s: &str) -> std::borrow::Cow<'_, str> {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\"")).into()
    } else {
        s.into()
    }
}
