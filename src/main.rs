use anyhow::Result;
use clap::Parser;
use shadow_rs::shadow;
use sitetally::{report::DEFAULT_TOP, stages, Classifier, FormatKind, Report};
use std::{path::PathBuf, sync::Arc};
use tracing_subscriber::EnvFilter;

shadow!(build);

const SUMMARY_TOP: usize = 10;

#[derive(Parser, Debug)]
#[command(about, version, long_version = build::CLAP_LONG_VERSION)]
struct Cli {
    /// Directory scanned (not recursively) for access logs
    #[clap(long, default_value = "logs")]
    log_path: PathBuf,

    /// Directory the reports are written to
    #[clap(long, default_value = "output")]
    output_path: PathBuf,

    /// Log file extension; rotated names like `access.log.1.gz` also match
    #[clap(long, default_value = "log")]
    extension: String,

    /// Number of domains kept in each ranking
    #[clap(long, default_value_t = DEFAULT_TOP)]
    top: usize,

    /// Files parsed concurrently (defaults to the number of CPUs)
    #[clap(long)]
    jobs: Option<usize>,

    /// Accepted line formats, in priority order (defaults to all)
    #[clap(long, value_enum)]
    format: Vec<FormatKind>,

    /// Print the summary without writing any report file
    #[clap(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = format!("info,{}", std::env::var("RUST_LOG").unwrap_or_default());
    let enable_color = std::env::var("NO_COLOR").is_err();
    tracing_subscriber::fmt()
        .with_thread_ids(true)
        .with_env_filter(EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_ansi(enable_color)
        .init();

    let args = Cli::parse();
    tracing::debug!("{:?}", args);

    let files = stages::collect_log_files(&args.log_path, &args.extension)?;
    tracing::info!(
        "Found {} log files in {}",
        files.len(),
        args.log_path.display()
    );

    let classifier = if args.format.is_empty() {
        Classifier::default()
    } else {
        Classifier::new(&args.format)
    };
    tracing::debug!("Format priority: {:?}", classifier.format_names());

    let jobs = args.jobs.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });
    let stats = stages::analyse(files, Arc::new(classifier), jobs).await;
    let report = Report::build(&stats, args.top);

    if args.dry_run {
        tracing::info!("Dry run, not writing to {}", args.output_path.display());
    } else {
        let written = report.write_to_dir(&args.output_path)?;
        tracing::info!(
            "Wrote {} files to {}",
            written.len(),
            args.output_path.display()
        );
    }

    report.print_summary(SUMMARY_TOP);
    Ok(())
}
