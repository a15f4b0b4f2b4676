use anyhow::Result;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use partkit::{run, RunOptions, ShutdownOptions};
use partkit_bootstrap::{AppConfig, CliArgs};

use std::path::PathBuf;

mod wiring;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// PartKit Server - document resources over HTTP
#[derive(Parser)]
#[command(name = "partkit-server")]
#[command(about = "PartKit Server - document resources over HTTP")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port override for HTTP server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Validate configuration and the part graph, then exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        port: cli.port,
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // defaults -> YAML (if provided) -> env (APP__*) -> CLI overrides
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    let logging_config = config.logging.clone().unwrap_or_default();
    partkit_bootstrap::init_logging(&logging_config, &config.home_dir());

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(config).await,
        Commands::Check => check_config(config),
    }
}

async fn run_server(config: AppConfig) -> Result<()> {
    tracing::info!(
        bind = %config.bind_addr(),
        store = ?config.store.kind,
        "PartKit Server starting"
    );
    let graph = wiring::build_parts(&config)?;
    tracing::debug!(
        ingress = graph.ingress.name(),
        resource = graph.people.name(),
        "parts ready to resolve"
    );

    let result = run(
        graph.all,
        &graph.app,
        RunOptions {
            shutdown: ShutdownOptions::Signals,
        },
    )
    .await;

    tracing::info!("PartKit Server stopped");
    result
}

fn check_config(config: AppConfig) -> Result<()> {
    tracing::info!("Checking configuration…");
    let graph = wiring::build_parts(&config)?;
    partkit::Resolver::new(graph.all).plan()?;
    println!("Configuration is valid");
    println!("{}", config.to_yaml()?);
    Ok(())
}
