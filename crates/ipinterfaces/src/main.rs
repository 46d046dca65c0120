//! ipintutil entry point
//!
//! Prints the IP interfaces of the device as JSON, visiting every relevant
//! ASIC namespace on multi-ASIC platforms.

use anyhow::Context;
use clap::Parser;
use sonic_ipinterfaces::{DbQuery, IpInterfaces, PlatformPaths, SnapshotDbQuery};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Show IP interfaces across network namespaces
#[derive(Parser, Debug)]
#[command(name = "ipintutil")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address family: ipv4 or ipv6
    #[arg(short = 'a', long, default_value = "ipv6")]
    family: String,

    /// Only show interfaces of this namespace
    #[arg(short = 'n', long)]
    namespace: Option<String>,

    /// Namespace roles to show: all or frontend
    #[arg(short = 'd', long)]
    display: Option<String>,

    /// JSON snapshot of the databases (CONFIG_DB, CONFIG_DB/asicN, ...)
    #[arg(long)]
    db_snapshot: Option<PathBuf>,

    /// TOML file overriding platform paths
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Overall deadline in seconds
    #[arg(long, default_value = "30")]
    timeout_secs: u64,

    /// Log filter when RUST_LOG is unset
    #[arg(short = 'l', long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args.log_level) {
        eprintln!("ipintutil: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("ipintutil failed: {:#}", e);
            eprintln!("ipintutil: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout stays valid JSON
fn init_logging(default_filter: &str) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to set logger")?;
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<()> {
    let paths = match &args.config {
        Some(path) => PlatformPaths::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => PlatformPaths::default(),
    };
    debug!(?paths, "Platform paths");

    let db: Option<Arc<dyn DbQuery>> = match &args.db_snapshot {
        Some(path) => {
            let snapshot = SnapshotDbQuery::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            Some(Arc::new(snapshot))
        }
        None => {
            info!("No database snapshot given; roles and BGP neighbors unavailable");
            None
        }
    };

    let api = Arc::new(IpInterfaces::system(paths, db));
    let interfaces = api
        .get_ip_interfaces_async(
            args.family,
            args.namespace,
            args.display,
            Duration::from_secs(args.timeout_secs),
        )
        .await
        .context("error retrieving interface information")?;

    let json = serde_json::to_string_pretty(&interfaces)?;
    println!("{}", json);
    Ok(())
}
