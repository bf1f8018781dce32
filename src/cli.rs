//! Steward CLI - commands for inspecting and provisioning the fleet

use clap::Subcommand;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

use crate::coordinator::TrustCoordinator;
use crate::registry::{ApplicationRegistry, ApplicationView, RegistryEntry};
use crate::types::{ApplicationId, ApplicationInfo, ClaimState};

/// Steward CLI commands
#[derive(Debug, Subcommand)]
pub enum StewardCommands {
    /// List applications known to the transport
    List {
        /// Only show applications in this claim state
        #[arg(short, long)]
        state: Option<ClaimState>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Claim and provision one application
    Claim {
        /// Application id
        app_id: String,
    },

    /// Claim every claimable application
    ClaimAll,

    /// Show the administrative identity and guild
    Whoami,

    /// Rename the administrative identity
    Rename {
        /// New display name
        name: String,
    },

    /// Show the application registry as an attached view sees it
    Registry,
}

/// Execute a steward command, returning the text to print.
pub fn execute_command(
    coordinator: &mut TrustCoordinator,
    registry: &Arc<ApplicationRegistry>,
    command: StewardCommands,
) -> Result<String, String> {
    match command {
        StewardCommands::List { state, json } => {
            let apps = match state {
                Some(state) => coordinator.applications_in_state(state),
                None => coordinator.get_applications(),
            };
            if json {
                serde_json::to_string_pretty(&apps).map_err(|e| e.to_string())
            } else {
                Ok(format_applications(&apps))
            }
        }

        StewardCommands::Claim { app_id } => {
            let app = coordinator
                .get_application(&ApplicationId::new(app_id))
                .map_err(|e| e.to_string())?;
            coordinator
                .claim_application(&app)
                .map_err(|e| e.to_string())?;
            Ok(format!("Claimed {} ({}@{})", app.id, app.application_name, app.device_name))
        }

        StewardCommands::ClaimAll => {
            let apps = coordinator.applications_in_state(ClaimState::Claimable);
            if apps.is_empty() {
                return Ok("No claimable applications".to_string());
            }
            let mut lines = Vec::new();
            let mut failures = 0;
            for app in &apps {
                match coordinator.claim_application(app) {
                    Ok(()) => lines.push(format!("  claimed  {}", app.id)),
                    Err(e) => {
                        failures += 1;
                        lines.push(format!("  FAILED   {}: {}", app.id, e));
                    }
                }
            }
            info!(total = apps.len(), failures, "Claim-all finished");
            lines.push(format!(
                "{} claimed, {} failed",
                apps.len() - failures,
                failures
            ));
            Ok(lines.join("\n"))
        }

        StewardCommands::Whoami => {
            let identity = coordinator.identity();
            let guild = coordinator.guild();
            Ok(format!(
                "User:     {}\nIdentity: {}\nGuild:    {} ({})\n          {}",
                coordinator.user_name(),
                identity.guid(),
                guild.name(),
                guild.guid(),
                guild.description()
            ))
        }

        StewardCommands::Rename { name } => {
            coordinator
                .set_user_name(&name)
                .map_err(|e| e.to_string())?;
            Ok(format!("User name is now {}", coordinator.user_name()))
        }

        StewardCommands::Registry => {
            let view = Arc::new(TextView::default());
            registry.set_adapter(Some(view.clone()));
            registry.set_adapter(None);
            Ok(view.render())
        }
    }
}

/// View that renders entries as text blocks
#[derive(Default)]
struct TextView {
    items: Mutex<Vec<RegistryEntry>>,
}

impl TextView {
    fn render(&self) -> String {
        let mut items = self.items.lock().clone();
        if items.is_empty() {
            return "Registry is empty".to_string();
        }
        items.sort_by(|a, b| a.id_of().cmp(b.id_of()));
        items
            .iter()
            .map(|e| format!("[{}]\n{}", e.id_of(), e))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl ApplicationView for TextView {
    fn add_item(&self, entry: RegistryEntry) {
        let mut items = self.items.lock();
        items.retain(|e| e != &entry);
        items.push(entry);
    }

    fn set_items(&self, entries: Vec<RegistryEntry>) {
        *self.items.lock() = entries;
    }
}

fn format_applications(apps: &[ApplicationInfo]) -> String {
    if apps.is_empty() {
        return "No applications".to_string();
    }
    let mut out = format!(
        "{:<16} {:<20} {:<16} {:<12} {}\n",
        "ID", "NAME", "DEVICE", "CLAIM", "RUNNING"
    );
    for app in apps {
        out.push_str(&format!(
            "{:<16} {:<20} {:<16} {:<12} {}\n",
            app.id.as_str(),
            app.application_name,
            app.device_name,
            app.claim_state.to_string(),
            app.running_state
        ));
    }
    out.trim_end().to_string()
}
