//! trust-steward: claim and provision a simulated application fleet
//!
//! Loads the configuration, seeds an in-memory fleet from `[[fleet]]`,
//! bootstraps the trust coordinator and runs one command against it.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use trust_steward::cli::{self, StewardCommands};
use trust_steward::{ApplicationRegistry, Config, CoordinatorConfig, TrustCoordinator};

#[derive(Parser)]
#[command(name = "trust-steward")]
#[command(about = "Claim and provision fleet applications under one identity")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "TRUST_STEWARD_CONFIG", default_value = "trust-steward.toml")]
    config: PathBuf,

    /// Identity display name (overrides config file)
    #[arg(long, env = "TRUST_STEWARD_USER")]
    user_name: Option<String>,

    #[command(subcommand)]
    command: StewardCommands,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("trust_steward=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("Config file: {}", cli.config.display());
    let mut config = Config::load_or_default(&cli.config)?;
    if let Some(user_name) = cli.user_name {
        config.identity.user_name = user_name;
    }

    let transport = Arc::new(config.seed_transport());
    info!(applications = config.fleet.len(), "Simulated fleet ready");

    let registry = Arc::new(ApplicationRegistry::new());

    let mut coordinator_config = CoordinatorConfig::new(config.identity.user_name.clone())
        .with_listener(registry.clone())
        .with_approver(Arc::new(config.approval.approver()));
    if let Some(key_store) = config.key_store.clone() {
        coordinator_config = coordinator_config.with_key_store(key_store);
    }
    let mut coordinator = TrustCoordinator::new(transport, coordinator_config)?;

    // Events only cover changes from here on; seed with what already exists.
    registry.add_applications(coordinator.get_applications());

    match cli::execute_command(&mut coordinator, &registry, cli.command) {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
