// src/main.rs

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tracing::{info, warn};

use vanguard_deep_scan::{ScanConfig, ScanMode, ScanRequest, Scanner, logging};

mod app;

use app::App;

/// Scans a website and prints a graded security report as JSON.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// URL or bare domain to scan.
    target: String,

    /// quick, deep or extract.
    #[arg(short, long, default_value_t = ScanMode::Deep)]
    mode: ScanMode,

    /// TOML configuration file. Defaults to the platform config directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Per-probe timeout in seconds, overriding the configuration.
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    probe_timeout: Option<u64>,

    /// Print the result on a single line.
    #[arg(long)]
    compact: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let log_path = logging::initialize_logging()?;
    info!(log = %log_path.display(), "Logging initialized.");

    let config = ScanConfig::load(cli.config.as_deref())
        .wrap_err("failed to load scanner configuration")?;

    let mut request = ScanRequest::new(cli.target, cli.mode);
    if let Some(secs) = cli.probe_timeout {
        request = request.with_probe_timeout(Duration::from_secs(secs));
    }

    let mut app = App::new(Scanner::new(config));
    app.run(request).await;

    println!("{}", app.render_json(cli.compact)?);
    eprintln!("{}", app.summary_line());

    if !app.succeeded() {
        warn!("Scan did not succeed.");
        std::process::exit(1);
    }
    Ok(())
}
