use certsync::{run_once, serve, EnvConfig, HEALTH_READINESS_PATH};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(version, about, arg_required_else_help(true))]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Keep TLS secrets in sync with their destinations
    Serve,

    /// Run a single sync cycle, then exit
    Once,

    /// Check if a certsync server is running at localhost
    Ready,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(EnvFilter::from_env("CERTSYNC_LOG"))
        .init();

    match Cli::parse().command {
        Some(Command::Serve) => {
            info!("certsync v{VERSION}");
            serve().await?
        }
        Some(Command::Once) => {
            let report = run_once().await?;
            println!(
                "synced={} unchanged={} failed={}",
                report.synced().count(),
                report.unchanged_count(),
                report.failures().count(),
            );
            report.ensure_success()?;
        }
        Some(Command::Ready) => {
            let port = EnvConfig::load()?.health_port;
            reqwest::Client::new()
                .get(format!("http://localhost:{port}{HEALTH_READINESS_PATH}"))
                .send()
                .await?
                .error_for_status()?;
        }
        None => {}
    }

    Ok(())
}
