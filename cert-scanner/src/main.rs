use std::process::exit;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};

use cert_scanner::reporters::compare::create_comparators;
use cert_scanner::scanner::perform_scan;
use cert_scanner::settings::Settings;
use cert_scanner::{canary, metrics, shutdown};
use scan_model::ScanComparators;

#[derive(Parser)]
#[clap(name = "cert-scanner", about = "periodically scans the TLS posture of a fleet of endpoints")]
struct Cli {
    /// config file
    #[clap(short, long, global = true, default_value = "./cert-scanner.yml")]
    config: String,

    /// use debug logging mode
    #[clap(short, long, global = true)]
    debug: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// run one scan, or repeated scans when scan.repeated is set
    Scan,
    /// run a dummy TLS server with a weak protocol and an expiring cert
    Canary,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = match Settings::load(&cli.config, cli.debug) {
        Ok(settings) => Arc::new(settings),
        Err(err) => {
            eprintln!("error parsing configuration: {err:#}");
            exit(1);
        }
    };

    let level = if settings.debug() { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt::fmt()
        .json()
        .with_max_level(level)
        .with_ansi(false)
        .init();

    let root = shutdown::signalled();
    match cli.command {
        Command::Scan => run_scan(root, settings).await,
        Command::Canary => {
            if let Err(err) = canary::run(settings.canary_port(), root).await {
                error!(err = %err, "error running canary");
                exit(1);
            }
        }
    }
}

async fn run_scan(root: CancellationToken, settings: Arc<Settings>) {
    if settings.metrics_enabled() {
        let listener =
            match tokio::net::TcpListener::bind(("0.0.0.0", settings.metrics_port())).await {
                Ok(listener) => listener,
                Err(err) => {
                    error!(err = %err, port = settings.metrics_port(), "error starting metrics server");
                    exit(1);
                }
            };
        tokio::spawn(metrics::serve(listener, root.child_token()));
    }

    let comparators = match create_comparators(&settings) {
        Ok(comparators) => comparators,
        Err(err) => {
            error!(err = %err, "error configuring comparators");
            exit(1);
        }
    };

    if settings.repeated() {
        repeatedly(&root, &settings, comparators).await;
    } else {
        info!("running standalone scan");
        let token = scan_token(&root, &settings);
        if let Err(err) = perform_scan(&token, &settings).await {
            error!(err = %err, "error running scan");
            exit(1);
        }
    }
}

/// Runs scans on the configured interval until the root token fires. A
/// scan outlasting the interval skips the missed tick; scans never
/// overlap or queue.
async fn repeatedly(
    root: &CancellationToken,
    settings: &Arc<Settings>,
    comparators: ScanComparators,
) {
    let interval = settings.interval().unwrap_or_default();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut previous = None;
    let mut scans: u64 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = root.cancelled() => {
                info!(scans, "context was cancelled, exiting");
                return;
            }
        }
        scans += 1;
        info!(scans, "running scan");
        let token = scan_token(root, settings);
        match perform_scan(&token, settings).await {
            Ok(scan) => {
                if let Some(previous) = previous.take() {
                    for comparator in &comparators {
                        comparator.compare(&previous, &scan);
                    }
                }
                previous = Some(scan);
            }
            Err(err) => {
                // configuration errors persist between ticks, but the
                // next scan retries anyway so an operator can fix the
                // config under a running scanner
                error!(err = %err, "scan aborted");
            }
        }
        info!(scans, interval = %humantime::format_duration(interval), "scan complete, waiting for interval before next scan");
    }
}

fn scan_token(root: &CancellationToken, settings: &Settings) -> CancellationToken {
    let timeout = settings.timeout().unwrap_or_default();
    shutdown::with_timeout(root, timeout)
}
