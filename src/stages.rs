//! Batch driver: find the log files, read them (decompressing rotated ones)
//! and fold every file into one [`TrafficStats`].

use std::{
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    process::{Child, Stdio},
    sync::Arc,
};

use anyhow::{anyhow, bail, Context, Result};
use futures_util::StreamExt;

use crate::{aggregate::TrafficStats, bar::get_progress_bar, parser::Classifier};

#[derive(Debug, PartialEq, Eq)]
pub enum LogFileType {
    Plain,
    Gzip,
    Zstd,
    Xz,
}

pub fn deduce_log_file_type(filename: &str) -> LogFileType {
    if filename.ends_with(".gz") {
        LogFileType::Gzip
    } else if filename.ends_with(".zst") {
        LogFileType::Zstd
    } else if filename.ends_with(".xz") {
        LogFileType::Xz
    } else {
        LogFileType::Plain
    }
}

/// `access.log`, `access.log.1` and `access.log.2.gz` all count as logs for
/// extension `log`.
pub fn is_log_file_name(filename: &str, extension: &str) -> bool {
    let needle = format!(".{}", extension);
    filename.match_indices(&needle).any(|(idx, _)| {
        let rest = &filename[idx + needle.len()..];
        rest.is_empty() || rest.starts_with('.')
    })
}

/// Regular files directly inside `dir` that look like logs, sorted by name.
pub fn collect_log_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("input directory {} does not exist", dir.display());
    }
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("read input directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().ok().map_or(false, |ft| ft.is_file()))
        .filter(|entry| {
            let matched = entry
                .file_name()
                .to_str()
                .map_or(false, |s| is_log_file_name(s, extension));
            if !matched {
                tracing::debug!("Skipping {}: not a .{} file", entry.path().display(), extension);
            }
            matched
        })
        .map(|entry| entry.path())
        .collect();
    entries.sort();

    tracing::debug!("Entries: {:?}", entries);
    Ok(entries)
}

/// Open a log for line reading. Compressed logs are piped through the
/// matching decompressor; the child must be waited on once drained.
pub fn open_log(path: &Path) -> Result<(Box<dyn BufRead + Send>, Option<Child>)> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    let prog = match deduce_log_file_type(filename) {
        LogFileType::Plain => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("open {}", path.display()))?;
            let reader: Box<dyn BufRead + Send> = Box::new(BufReader::new(file));
            return Ok((reader, None));
        }
        LogFileType::Gzip => "zcat",
        LogFileType::Zstd => "zstdcat",
        LogFileType::Xz => "xzcat",
    };
    let mut child = std::process::Command::new(prog)
        .arg(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("spawn {} for {}", prog, path.display()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("no stdout from {}", prog))?;
    let reader: Box<dyn BufRead + Send> = Box::new(BufReader::new(stdout));
    Ok((reader, Some(child)))
}

/// Absorb every line of `reader`. Invalid UTF-8 is replaced, not rejected.
/// A read error ends the file but keeps what was already absorbed.
pub fn process_reader<R: BufRead>(reader: R, classifier: &Classifier, name: &str) -> TrafficStats {
    let mut stats = TrafficStats::default();
    for line in reader.split(b'\n') {
        match line {
            Ok(bytes) => stats.absorb_line(classifier, &String::from_utf8_lossy(&bytes)),
            Err(e) => {
                tracing::warn!(
                    "Read error in {} after {} lines, keeping partial counts: {}",
                    name,
                    stats.lines.lines,
                    e
                );
                break;
            }
        }
    }
    stats
}

pub fn process_file(path: &Path, classifier: &Classifier) -> Result<TrafficStats> {
    let name = path.display().to_string();
    let (reader, child) = open_log(path)?;
    let stats = process_reader(reader, classifier, &name);
    if let Some(mut child) = child {
        match child.wait() {
            Ok(status) if !status.success() => {
                tracing::warn!("Decompressor for {} exited with {}", name, status)
            }
            Err(e) => tracing::warn!("Failed to wait for decompressor of {}: {}", name, e),
            _ => {}
        }
    }
    tracing::info!(
        "{}: {} lines, {} matched, {} skipped",
        name,
        stats.lines.lines,
        stats.lines.matched_total(),
        stats.lines.skipped_total()
    );
    Ok(stats)
}

/// Parse `files` on the blocking pool, at most `jobs` at a time, and merge
/// the partial states in file order. Files that fail are logged and left out.
pub async fn analyse(files: Vec<PathBuf>, classifier: Arc<Classifier>, jobs: usize) -> TrafficStats {
    let progressbar = get_progress_bar(files.len() as u64, "Parsing logs", None);
    let mut results = futures_util::stream::iter(files.into_iter().map(|path| {
        let classifier = classifier.clone();
        tokio::task::spawn_blocking(move || {
            let stats = process_file(&path, &classifier);
            (path, stats)
        })
    }))
    .buffered(jobs.max(1));

    let mut total = TrafficStats::default();
    let mut failed = 0;
    while let Some(joined) = results.next().await {
        progressbar.inc(1);
        match joined {
            Ok((_, Ok(stats))) => total.merge(stats),
            Ok((path, Err(e))) => {
                failed += 1;
                tracing::error!("Failed to process {}: {:#}", path.display(), e);
            }
            Err(e) => {
                failed += 1;
                tracing::error!("Log worker failed: {}", e);
            }
        }
    }
    progressbar.finish_and_clear();

    tracing::info!(
        "Read {} lines, {} matched ({:?}), {} skipped ({:?}), {} without domain, {} files failed",
        total.lines.lines,
        total.lines.matched_total(),
        total.lines.matched,
        total.lines.skipped_total(),
        total.lines.skipped,
        total.lines.without_domain,
        failed
    );
    tracing::info!(
        "Got {} unique users, {} domains, total traffic {}",
        total.unique_identities(),
        total.domains.len(),
        humansize::format_size(total.total_bytes, humansize::BINARY)
    );
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use test_log::test;

    const LINE_A: &str = r#"203.0.113.5 - bob [10/Jan/2023:13:55:36 -0500] "GET http://www.Shop.com/item HTTP/1.1" 200 1024"#;
    const LINE_B: &str = "1673358936.586    921 192.168.0.68 TCP_MISS/200 507 CONNECT www.google.com:443 - DIRECT/142.250.1.1 -";

    #[test]
    fn test_log_file_names() {
        assert!(is_log_file_name("access.log", "log"));
        assert!(is_log_file_name("access.log.1", "log"));
        assert!(is_log_file_name("access.log.2.gz", "log"));
        assert!(!is_log_file_name("access.logs", "log"));
        assert!(!is_log_file_name("notes.txt", "log"));
        assert!(!is_log_file_name("log", "log"));
        assert_eq!(deduce_log_file_type("access.log.2.gz"), LogFileType::Gzip);
        assert_eq!(deduce_log_file_type("access.log"), LogFileType::Plain);
    }

    #[test]
    fn test_collect_log_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("b.log"), "").unwrap();
        std::fs::write(tmp.path().join("a.log.1"), "").unwrap();
        std::fs::write(tmp.path().join("readme.md"), "").unwrap();
        std::fs::create_dir(tmp.path().join("nested.log")).unwrap();
        std::fs::write(tmp.path().join("nested.log").join("c.log"), "").unwrap();

        let files = collect_log_files(tmp.path(), "log").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.log.1", "b.log"]);
    }

    #[test]
    fn test_missing_input_directory() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(collect_log_files(&tmp.path().join("logs"), "log").is_err());
    }

    #[test]
    fn test_process_reader_is_lenient() {
        let mut data = Vec::new();
        data.extend_from_slice(LINE_A.as_bytes());
        data.extend_from_slice(b"\r\n\xff\xfe garbage\n\n");
        data.extend_from_slice(LINE_B.as_bytes());
        let classifier = Classifier::default();
        let stats = process_reader(Cursor::new(data), &classifier, "test");
        assert_eq!(stats.lines.lines, 4);
        assert_eq!(stats.lines.matched_total(), 2);
        assert_eq!(stats.total_bytes, 1024 + 507);
        assert_eq!(stats.domains.get("shop.com"), 1);
        assert_eq!(stats.domains.get("google.com"), 1);
    }

    #[test(tokio::test)]
    async fn test_analyse_isolates_failed_files() {
        let tmp = tempfile::tempdir().unwrap();
        let first = tmp.path().join("a.log");
        let second = tmp.path().join("b.log");
        std::fs::write(&first, format!("{}\n{}\n", LINE_A, LINE_B)).unwrap();
        std::fs::write(&second, format!("{}\n", LINE_A)).unwrap();
        let missing = tmp.path().join("gone.log");

        let classifier = Arc::new(Classifier::default());
        let stats = analyse(vec![first, missing, second], classifier, 2).await;
        assert_eq!(stats.lines.lines, 3);
        assert_eq!(stats.domains.get("shop.com"), 2);
        assert_eq!(stats.total_bytes, 2 * 1024 + 507);
        assert_eq!(stats.unique_identities(), 2);
        let order: Vec<_> = stats.domains.iter().map(|(d, _)| d).collect();
        assert_eq!(order, vec!["shop.com", "google.com"]);
    }
}
