use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use otapack_core::{InstallMode, SyncOptions, SyncStatus};
use otapack_engine::{
    select_bundle, BootWatchdog, EngineConfig, HttpTransport, NoopRestarter, Restarter,
    SystemArchiveCodec, Transport, UpdateEngine,
};
use otapack_store::{PackageStore, StateMachine, StateStore, UpdateLayout};

mod config;
mod render;

use config::CliConfig;
use render::Renderer;

#[derive(Parser, Debug)]
#[command(name = "otapack")]
#[command(about = "Client-side over-the-air update engine", long_about = None)]
struct Cli {
    /// Path to the configuration file (defaults to ./otapack.toml).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Update root directory, overriding the configured one.
    #[arg(long)]
    root: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the persisted version state and the payload that would load.
    Status,
    /// Run one full sync pass against the update server.
    Sync {
        /// Apply a downloaded update immediately instead of staging it.
        #[arg(long)]
        immediate: bool,
    },
    /// Ask the server what the next sync would act on, without side effects.
    Check,
    /// Roll back to the previous installed version.
    Rollback,
    /// Confirm the current boot as healthy.
    Confirm,
    /// Clear the persisted version state entirely.
    Reset,
    /// Remove installed version trees no longer referenced by the state.
    Gc,
    /// Generate a shell completion script on stdout.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> Result<()> {
    init_tracing();
    run_cli(Cli::parse())
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run_cli(cli: Cli) -> Result<()> {
    let command = match cli.command {
        Commands::Completions { shell } => {
            let mut clap_command = Cli::command();
            clap_complete::generate(shell, &mut clap_command, "otapack", &mut io::stdout());
            return Ok(());
        }
        command => command,
    };

    let config = CliConfig::load(cli.config.as_deref())?;
    let root = cli.root.unwrap_or_else(|| config.root_dir());
    let layout = UpdateLayout::new(root);
    let machine = Arc::new(StateMachine::new(StateStore::new(layout.clone())));
    let packages = Arc::new(PackageStore::new(layout.clone()));
    let renderer = Renderer::detect();

    match command {
        Commands::Status => {
            let state = machine.state();
            renderer.print_field(
                "current",
                &state
                    .current_package
                    .as_ref()
                    .map(|pkg| format!("{} ({})", pkg.release_id, pkg.hash))
                    .unwrap_or_else(|| "none".to_string()),
            );
            renderer.print_field(
                "previous",
                &state
                    .previous_package
                    .as_ref()
                    .map(|pkg| pkg.release_id.clone())
                    .unwrap_or_else(|| "none".to_string()),
            );
            renderer.print_field(
                "pending",
                &state
                    .pending_update
                    .as_ref()
                    .map(|pending| {
                        if pending.is_mandatory {
                            format!("{} (mandatory)", pending.package.release_id)
                        } else {
                            pending.package.release_id.clone()
                        }
                    })
                    .unwrap_or_else(|| "none".to_string()),
            );
            renderer.print_field("failed boots", &state.failed_boot_count.to_string());
            let selected = select_bundle(&layout, &state, config.max_failed_boots);
            renderer.print_field(
                "payload",
                &selected
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "bundled (no installed version selectable)".to_string()),
            );
        }
        Commands::Sync { immediate } => {
            let engine = build_engine(&config, Arc::clone(&machine), Arc::clone(&packages))?;
            let options = if immediate {
                SyncOptions {
                    install_mode: InstallMode::Immediate,
                    mandatory_install_mode: InstallMode::Immediate,
                }
            } else {
                SyncOptions::default()
            };
            let status = engine.sync(&options);
            engine.wait_for_background();
            match status {
                SyncStatus::UpToDate => renderer.print_status("ok", "already up to date"),
                SyncStatus::UpdateInstalled => {
                    renderer.print_status("installed", "update downloaded and recorded")
                }
                SyncStatus::Error => {
                    renderer.print_status("error", "sync failed, see log output");
                    bail!("sync finished with errors");
                }
            }
        }
        Commands::Check => {
            let engine = build_engine(&config, Arc::clone(&machine), Arc::clone(&packages))?;
            let response = engine.check()?;
            match response.package.filter(|_| response.update_available) {
                Some(package) => {
                    renderer.print_status("update", "a newer release is available");
                    renderer.print_field("release", &package.release_id);
                    renderer.print_field("mandatory", if package.is_mandatory { "yes" } else { "no" });
                    renderer.print_field(
                        "delivery",
                        if response.patch.is_some() {
                            "patch from installed version"
                        } else {
                            "full package"
                        },
                    );
                }
                None => renderer.print_status("ok", "already up to date"),
            }
        }
        Commands::Rollback => {
            let engine = build_engine(&config, Arc::clone(&machine), Arc::clone(&packages))?;
            engine.rollback()?;
            let state = machine.state();
            match state.current_package {
                Some(pkg) => renderer.print_status(
                    "ok",
                    &format!("rolled back to release {}", pkg.release_id),
                ),
                None => renderer.print_status("ok", "rolled back to the bundled payload"),
            }
        }
        Commands::Confirm => {
            let transport: Arc<dyn Transport> =
                Arc::new(HttpTransport::new(config.server_url.clone())?);
            let restarter: Arc<dyn Restarter> = Arc::new(NoopRestarter);
            let watchdog = BootWatchdog::new(
                Arc::clone(&machine),
                transport,
                restarter,
                config.watchdog_policy(),
                config.client_id.clone(),
            );
            watchdog.confirm_boot();
            renderer.print_status("ok", "current boot confirmed");
        }
        Commands::Reset => {
            let engine = build_engine(&config, Arc::clone(&machine), Arc::clone(&packages))?;
            engine.reset_state()?;
            renderer.print_status("ok", "version state cleared");
        }
        Commands::Gc => {
            let engine = build_engine(&config, Arc::clone(&machine), Arc::clone(&packages))?;
            let removed = engine.collect_garbage()?;
            if removed.is_empty() {
                renderer.print_status("ok", "nothing to collect");
            } else {
                for key in &removed {
                    renderer.print_field("removed", key);
                }
                renderer.print_status("ok", &format!("collected {} directories", removed.len()));
            }
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

fn build_engine(
    config: &CliConfig,
    machine: Arc<StateMachine>,
    packages: Arc<PackageStore>,
) -> Result<UpdateEngine> {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(config.server_url.clone())?);
    let engine_config = EngineConfig::new(
        config.app_id.clone(),
        config.channel.clone(),
        config.binary_version.clone(),
        config.client_id.clone(),
    )
    .with_entry_file(config.entry_file.clone());
    Ok(UpdateEngine::new(
        engine_config,
        machine,
        packages,
        transport,
        Arc::new(SystemArchiveCodec),
        Arc::new(NoopRestarter),
    ))
}
