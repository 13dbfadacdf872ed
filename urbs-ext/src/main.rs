use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use env_logger::Env;
use log::{LevelFilter, error, info};
use urbs_ext::general::settings::{RunSettings, SETTINGS_FILE_NAME};
use urbs_ext::run::runner;
use urbs_ext::run::scenarios::SCENARIOS;

/// Multi-period energy-system model with a solar PV supply-chain extension
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and solve a batch of scenarios.
    Run {
        /// Settings file
        #[arg(long, default_value = SETTINGS_FILE_NAME)]
        settings: PathBuf,
        /// Scenario to run, may be repeated. Defaults to the scenarios in the settings file.
        #[arg(long = "scenario", value_name = "NAME")]
        scenarios: Vec<String>,
    },
    /// List the built-in scenarios.
    Scenarios,
    /// Manage the settings file.
    Settings {
        #[command(subcommand)]
        subcommand: SettingsSubcommands,
    },
}

#[derive(Subcommand)]
enum SettingsSubcommands {
    /// Print the default settings file.
    ShowDefault,
}

fn init_logging(level: &str) {
    // RUST_LOG wins over the settings file
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();
}

fn handle_run_command(settings_path: &Path, scenarios: Vec<String>) -> Result<()> {
    let settings = RunSettings::load_from_path(settings_path).context("Failed to load settings.")?;
    init_logging(&settings.log_level);
    info!("Starting urbs-ext v{}", env!("CARGO_PKG_VERSION"));

    let names = if scenarios.is_empty() {
        settings.scenarios.clone()
    } else {
        scenarios
    };
    let (result_dir, outcomes) = runner::run(&settings, &names)?;
    for outcome in &outcomes {
        info!(
            "{}: {} (objective {:.6e}) -> {}",
            outcome.scenario,
            outcome.status,
            outcome.objective_value,
            outcome.result_file.display()
        );
    }
    info!("{} scenario(s) written to {}", outcomes.len(), result_dir.display());
    Ok(())
}

fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Run { settings, scenarios }) => handle_run_command(&settings, scenarios)?,
        Some(Commands::Scenarios) => {
            for scenario in SCENARIOS {
                println!("{:<28} {}", scenario.name, scenario.description);
            }
        }
        Some(Commands::Settings {
            subcommand: SettingsSubcommands::ShowDefault,
        }) => print!("{}", RunSettings::default_file_contents()?),
        None => Cli::command().print_long_help()?,
    }
    Ok(())
}

fn main() {
    if let Err(err) = run_cli() {
        if log::max_level() == LevelFilter::Off {
            eprintln!("Error: {err:?}");
        } else {
            error!("{err:?}");
        }
        std::process::exit(1);
    }
}
