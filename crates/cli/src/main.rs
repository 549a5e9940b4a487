use blc::config::{self, Config};
use blc::lifecycle::{spawn_signal_listener, ModuleController};
use blc::transport::{HttpTransport, MemoryTransport, ModuleTransport};
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "blc")]
#[command(
    about = "Business logic container: turns inferences into recording commands",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the module until SIGTERM or Ctrl+C.
    Run {
        /// Config file path (default: BLC_CONFIG_PATH or ~/.blc/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP transport port (default from config or 15161)
        #[arg(long, short)]
        port: Option<u16>,

        /// Use the in-process transport instead of HTTP.
        /// No network; for smoke-testing startup and shutdown.
        #[arg(long)]
        loopback: bool,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("blc {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Run {
            config,
            port,
            loopback,
        }) => {
            if let Err(e) = run(config, port, loopback).await {
                log::error!("module failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn build_transport(config: &Config, loopback: bool) -> Arc<dyn ModuleTransport> {
    if loopback {
        return Arc::new(MemoryTransport::new());
    }
    Arc::new(HttpTransport::new(
        config.module.name.clone(),
        config.transport.bind_addr(),
        config::resolve_output_url(config),
    ))
}

async fn run(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
    loopback: bool,
) -> anyhow::Result<()> {
    let (mut config, path) = config::load_config(config_path)?;
    if let Some(p) = port {
        config.transport.port = p;
    }
    log::info!(
        "starting module {} (config {})",
        config.module.name,
        path.display()
    );

    let transport = build_transport(&config, loopback);
    let controller = ModuleController::start(&config.module, transport).await?;
    let signals = spawn_signal_listener(controller.lifecycle());

    let summary = controller.run().await;
    signals.abort();
    log::info!(
        "module {} stopped ({} processed, {} discarded at shutdown)",
        config.module.name,
        summary.processed,
        summary.discarded
    );
    Ok(())
}
