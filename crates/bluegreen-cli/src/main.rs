mod cmd;
mod output;
mod revision;
mod root;

use bluegreen_core::DeployError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "bluegreen",
    about = "Immutable-stack deployment orchestrator — deploy, wire, cut over DNS, prune",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to bluegreen.yaml (default: walk upward from the current directory)
    #[arg(long, global = true, env = "BLUEGREEN_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a new web stack: create, wait, validate, wire, then prune
    Deploy(cmd::deploy::DeployArgs),

    /// Delete one stack and revoke its downstream ingress
    DeleteStack {
        /// Full stack name, e.g. fc-dev-web-abcdef-20200101-1200
        name: String,
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Delete superseded web stacks, keeping a rollback window
    #[command(disable_version_flag = true)]
    DeleteOldStacks(cmd::delete_old_stacks::PruneArgs),

    /// Repoint the environment's DNS alias at the newest load balancer
    SwitchDns {
        /// Environment (dev|prod)
        #[arg(long, default_value = "dev")]
        env: String,
    },

    /// Show all stacks with status, live record, and recent failures
    ListStacks {
        /// Limit to one environment
        #[arg(long)]
        env: Option<String>,
    },

    /// Show public DNS names of the live stack's machines
    ListMachines(cmd::list_machines::MachinesArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .init();

    // First interrupt cancels cleanly: polling stops and no wiring is left
    // half-applied. A second interrupt kills the process the usual way.
    let cancel = CancellationToken::new();
    let handler = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            handler.cancel();
        }
    });

    let config = root::resolve_config(cli.config.as_deref());

    let result = match cli.command {
        Commands::Deploy(args) => cmd::deploy::run(&config, args, cli.json, &cancel).await,
        Commands::DeleteStack { name, yes } => {
            cmd::delete_stack::run(&config, &name, yes, cli.json).await
        }
        Commands::DeleteOldStacks(args) => {
            cmd::delete_old_stacks::run(&config, args, cli.json).await
        }
        Commands::SwitchDns { env } => cmd::switch_dns::run(&config, &env, cli.json).await,
        Commands::ListStacks { env } => {
            cmd::list_stacks::run(&config, env.as_deref(), cli.json).await
        }
        Commands::ListMachines(args) => cmd::list_machines::run(&config, args, cli.json).await,
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        let code = e
            .downcast_ref::<DeployError>()
            .map(DeployError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}
