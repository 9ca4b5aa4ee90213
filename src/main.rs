use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use infraflow::api::shutdown_signal;
use infraflow::{ApiServer, Config, Worker, WorkerManifest};

/// InfraFlow Federated Access - device and account registry
#[derive(Parser)]
#[command(name = "infraflow", version, about)]
struct Cli {
    /// Port to listen on (overrides PORT and the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Path to a TOML config file
    #[arg(short, long, env = "INFRAFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the registry API server (default)
    Serve,
    /// Run a device worker against a registry
    Worker {
        /// Path to the worker manifest
        #[arg(short, long, default_value = "worker.json")]
        manifest: PathBuf,

        /// Registry base URL (overrides the manifest)
        #[arg(long, env = "INFRAFLOW_BASE_URL")]
        base_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,infraflow=info",
        1 => "info,infraflow=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let mut config = Config::load(cli.config.as_deref())?;
            if let Some(port) = cli.port {
                config.server.port = port;
            }

            tracing::info!(
                environment = %config.environment,
                addr = %config.bind_addr(),
                seed_demo_data = config.registry.seed_demo_data,
                "booting InfraFlow Federated Access node"
            );

            ApiServer::new(&config)?.run().await?;
        }
        Command::Worker { manifest, base_url } => {
            let mut manifest = WorkerManifest::load(&manifest)?;
            if let Some(url) = base_url {
                manifest.base_url = url;
            }

            Worker::new(manifest)?.run(shutdown_signal()).await?;
        }
    }

    Ok(())
}
