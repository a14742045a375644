//! AleaMaris CLI
//!
//! Starts the entropy service against the configured frame source and
//! serves one request, or keeps running as a daemon.

use aleamaris::{AleaConfig, EntropyService};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "aleamaris", version, about = "Random numbers from video sensor noise")]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Raw 8-bit grayscale frame file (overrides the config).
    #[arg(long, global = true)]
    video: Option<PathBuf>,

    /// Seed the DRBG from OS entropy if the stream cannot deliver.
    #[arg(long, global = true)]
    allow_urandom: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print random bytes as hex.
    Bytes {
        #[arg(short = 'n', long, default_value_t = 32)]
        count: usize,
        /// Read DRBG output instead of the raw conditioned stream.
        #[arg(long)]
        drbg: bool,
    },
    /// Uniform integers in [low, high].
    Int {
        #[arg(long, allow_hyphen_values = true)]
        low: i64,
        #[arg(long, allow_hyphen_values = true)]
        high: i64,
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },
    /// Roll an n-sided die.
    Dice {
        #[arg(short, long, default_value_t = 6)]
        sides: u32,
    },
    /// Spin a single-zero roulette wheel.
    Roulette,
    /// Print the health report.
    Health,
    /// Print service counters.
    Stats,
    /// Run until interrupted, exporting metrics when built with `metrics`.
    Serve,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(kind = %e.kind(), "{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> aleamaris::Result<()> {
    let mut config = AleaConfig::load(cli.config.as_deref())?;
    if let Some(video) = cli.video {
        config.source.video = Some(video);
    }
    if cli.allow_urandom {
        config.security.allow_insecure_fallback = true;
    }

    info!("AleaMaris v{}", aleamaris::VERSION);
    let service = Arc::new(EntropyService::start(config)?);

    match cli.command {
        Command::Bytes { count, drbg } => {
            let bytes = if drbg {
                service.drbg_bytes(count)?
            } else {
                service.pull_bytes(count)?
            };
            println!("{}", hex(&bytes));
        }
        Command::Int { low, high, count } => {
            for value in service.draw_many(low, high, count)? {
                println!("{}", value);
            }
        }
        Command::Dice { sides } => println!("{}", service.draw_dice(sides)?),
        Command::Roulette => println!("{}", service.roulette()?),
        Command::Health => match service.check_health() {
            Ok(report) => print_toml(&report),
            Err(e) => {
                print_toml(&service.health());
                return Err(e);
            }
        },
        Command::Stats => print_toml(&service.stats()),
        Command::Serve => serve(&service)?,
    }

    service.shutdown();
    Ok(())
}

fn install_interrupt(service: &EntropyService) -> aleamaris::Result<()> {
    let signal = service.shutdown_signal().clone();
    ctrlc::set_handler(move || signal.trigger())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn serve(service: &Arc<EntropyService>) -> aleamaris::Result<()> {
    install_interrupt(service)?;
    let refresh = Duration::from_millis(service.config().metrics.refresh_ms.max(100));
    let signal = service.shutdown_signal().clone();
    info!("Serving until interrupted");
    while !signal.wait(refresh) {
        let report = service.health();
        info!(
            status = %report.status,
            queue_depth = report.queue_depth,
            drbg = ?report.drbg_status,
            "health"
        );
        service.ensure_running()?;
    }
    Ok(())
}

#[cfg(feature = "metrics")]
fn serve(service: &Arc<EntropyService>) -> aleamaris::Result<()> {
    use aleamaris::metrics::{MetricsRegistry, MetricsServer, MetricsServerConfig};

    install_interrupt(service)?;

    let server_config = MetricsServerConfig::from_listen(&service.config().metrics.listen)
        .map_err(|e| aleamaris::config::ConfigError::Invalid(e.to_string()))?;
    let registry = MetricsRegistry::new()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    let signal = service.shutdown_signal().clone();
    let stopped = async move {
        let _ = tokio::task::spawn_blocking(move || while !signal.wait(Duration::from_secs(1)) {}).await;
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime
        .block_on(MetricsServer::new(server_config, Arc::clone(service), registry).run(stopped))
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    Ok(())
}

fn print_toml<T: serde::Serialize>(value: &T) {
    match toml::to_string_pretty(value) {
        Ok(text) => print!("{}", text),
        Err(e) => error!("failed to render report: {}", e),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
