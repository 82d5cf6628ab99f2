//! `slurp` command line: fetch and reassemble the files of an NZB manifest.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use slurp::manifest::{self, Manifest};
use slurp::utils::{format_duration, format_size};
use slurp::{
    Config, Downloader, Error, Event, ExitStatus, FileOutcome, NameFilter, Result, RunSummary,
    ServerConfig, ToExitCode, cancel_on_signal,
};

#[derive(Parser, Debug)]
#[command(name = "slurp")]
#[command(about = "Fetch, verify and reassemble yEnc binaries described by an NZB manifest")]
#[command(version)]
struct Cli {
    /// NZB manifest to fetch
    nzb: PathBuf,

    /// NNTP server address (`host` or `host:port`)
    #[arg(long)]
    host: Option<String>,

    /// Use implicit TLS (default port 563)
    #[arg(long, alias = "tls")]
    ssl: bool,

    /// Username (authentication is skipped when empty)
    #[arg(short, long)]
    user: Option<String>,

    /// Password
    #[arg(short, long)]
    pass: Option<String>,

    /// Segment fetches in flight at once
    #[arg(short = 'n', long, value_parser = clap::value_parser!(u32).range(1..))]
    threads: Option<u32>,

    /// Select files whose name matches PATTERN (regular expression, repeatable)
    #[arg(short = 'e', long = "pattern", value_name = "PATTERN")]
    patterns: Vec<String>,

    /// Select files matching none of the patterns instead
    #[arg(short = 'v', long)]
    invert: bool,

    /// List the selected files and their sizes without fetching
    #[arg(short, long)]
    list: bool,

    /// JSON configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for staged segments and output (default: NZB name without `.nzb`)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Re-fetch files whose output already exists
    #[arg(long)]
    no_skip: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("slurp=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let status = match run(cli).await {
        Ok(status) => status,
        Err(Error::Cancelled) => {
            eprintln!("slurp: interrupted, staged segments removed");
            ExitStatus::Cancelled
        }
        Err(e) => {
            eprintln!("slurp: {e}");
            ExitStatus::from(&e)
        }
    };
    ExitCode::from(status.exit_code())
}

async fn run(cli: Cli) -> Result<ExitStatus> {
    let manifest = manifest::load_nzb(&cli.nzb).await?;
    let filter = NameFilter::new(&cli.patterns, cli.invert)?;

    if cli.list {
        print_listing(&manifest, &filter);
        return Ok(ExitStatus::Success);
    }

    let job_dir = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(manifest::job_name(&cli.nzb)));
    println!("{}", job_dir.display());

    let config = build_config(&cli, job_dir)?;
    let downloader = Downloader::new(config)?;

    tokio::spawn(cancel_on_signal(downloader.cancel_token()));

    let events = downloader.subscribe();
    let renderer = tokio::spawn(render_events(events));

    let result = downloader.run(&manifest.files, &filter).await;

    // Closing the channel lets the renderer drain and stop
    drop(downloader);
    renderer.await.ok();

    let summary = result?;
    print_summary(&summary);
    Ok(summary.exit_status())
}

/// Layer command line flags over the optional JSON config
fn build_config(cli: &Cli, job_dir: PathBuf) -> Result<Config> {
    let mut config = match (&cli.config, &cli.host) {
        (Some(path), _) => Config::from_json_file(path)?,
        (None, Some(host)) => Config::new(ServerConfig::from_address(host, cli.ssl)?),
        (None, None) => {
            return Err(Error::config(
                "server.host",
                "no server given (use --host or --config)",
            ));
        }
    };

    if cli.config.is_some()
        && let Some(host) = &cli.host
    {
        let previous = config.server.clone();
        config.server = ServerConfig::from_address(host, cli.ssl || previous.tls)?
            .with_credentials(previous.username, previous.password);
    } else if cli.ssl {
        config.server.tls = true;
    }

    if let Some(user) = &cli.user {
        config.server.username = user.clone();
    }
    if let Some(pass) = &cli.pass {
        config.server.password = pass.clone();
    }
    if let Some(threads) = cli.threads {
        config.concurrency = threads as usize;
    }
    if cli.no_skip {
        config.skip_existing = false;
    }

    config.staging_dir = job_dir.clone();
    config.output_dir = job_dir;
    Ok(config)
}

fn print_listing(manifest: &Manifest, filter: &NameFilter) {
    let mut total = 0;
    let count = manifest.len();
    for (i, file) in manifest.files.iter().enumerate() {
        if !filter.matches(&file.name) {
            continue;
        }
        total += file.total_bytes;
        println!(
            "{:>3}/{} {} {:>5} segments  {}",
            i + 1,
            count,
            format_size(file.total_bytes),
            file.segments.len(),
            file.name
        );
    }
    println!("total {}", format_size(total));
}

async fn render_events(mut events: tokio::sync::broadcast::Receiver<Event>) {
    use tokio::sync::broadcast::error::RecvError;

    loop {
        match events.recv().await {
            Ok(event) => render(&event),
            Err(RecvError::Lagged(n)) => {
                tracing::debug!(skipped = n, "progress display fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn render(event: &Event) {
    match event {
        Event::FileStarted { index, count, name } => eprintln!("{index}/{count} ({name})"),
        Event::Progress {
            percent,
            staged_bytes,
            total_bytes,
            elapsed,
            ..
        } => eprintln!(
            "  {percent:5.1}%  {} / {}  {}",
            format_size(*staged_bytes),
            format_size(*total_bytes),
            format_duration(*elapsed)
        ),
        // Per-file results are printed from the summary
        _ => {}
    }
}

fn print_summary(summary: &RunSummary) {
    for file in &summary.files {
        match &file.outcome {
            FileOutcome::Complete { .. } => println!("complete    {}", file.name),
            FileOutcome::Skipped => println!("skipped     {}", file.name),
            FileOutcome::Incomplete { missing } => {
                println!("incomplete  {} ({} segments missing)", file.name, missing.len())
            }
            FileOutcome::Failed { error } => println!("failed      {} ({error})", file.name),
        }
    }

    if !summary.checksum_mismatches.is_empty() {
        println!("{} parts dropped on checksum mismatch:", summary.checksum_mismatches.len());
        for warning in &summary.checksum_mismatches {
            println!(
                "  {} segment {}: expected {:08x}, got {:08x}",
                warning.file, warning.segment, warning.expected, warning.actual
            );
        }
    }

    println!("done in {}", format_duration(summary.duration()));
}
