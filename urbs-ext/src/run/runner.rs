//! Batch driver: one result directory per run, one build and solve per scenario.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use log::info;

use crate::general::input::load_input;
use crate::general::settings::RunSettings;
use crate::model::builder::ModelBuilder;
use crate::model::rule::LogObserver;
use crate::model::tables::ModelInput;
use crate::run::results::{ResultTables, get_constants};
use crate::run::scenarios::{self, Scenario};
use crate::run::solve::solve;

/// Summary of one finished scenario
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioOutcome {
    pub scenario: String,
    pub status: String,
    pub objective_value: f64,
    pub result_file: PathBuf,
}

/// `{results_root}/{result_name}-{YYYYMMDDTHHMM}`
pub fn result_dir_name(settings: &RunSettings, started: DateTime<Local>) -> PathBuf {
    settings.results_root.join(format!(
        "{}-{}",
        settings.result_name,
        started.format("%Y%m%dT%H%M")
    ))
}

pub fn prepare_result_dir(settings: &RunSettings) -> Result<PathBuf> {
    let dir = result_dir_name(settings, Local::now());
    fs::create_dir_all(&dir)
        .with_context(|| format!("Could not create result directory {}", dir.display()))?;
    Ok(dir)
}

/// The loaded input with the run-wide switches from `settings` applied
fn with_settings(input: &ModelInput, settings: &RunSettings) -> ModelInput {
    let mut input = input.clone();
    input.ext_config.growth = settings.growth_recurrence;
    input.policy = settings.policy.clone();
    input
}

/// Builds and solves one scenario and writes `{scenario}.log` and `{scenario}.toml`
pub fn run_scenario(
    input: &ModelInput,
    scenario: &Scenario,
    settings: &RunSettings,
    result_dir: &Path,
) -> Result<ResultTables> {
    info!("Scenario '{}': {}", scenario.name, scenario.description);
    let input = scenarios::prepare(scenario, input);
    let model = ModelBuilder::new(&input)
        .name(scenario.name)
        .dt(settings.dt)
        .timesteps(settings.timesteps.clone())
        .want_duals(settings.want_duals)
        .observer(LogObserver)
        .build(&settings.objective)
        .with_context(|| format!("Could not build scenario '{}'", scenario.name))?;

    let options = settings.solver_options(Some(result_dir.join(format!("{}.log", scenario.name))));
    let solved = solve(model, &options)?;
    let tables = get_constants(&solved);

    let result_file = result_dir.join(format!("{}.toml", scenario.name));
    let text = tables.to_toml().context("Could not serialise result tables")?;
    fs::write(&result_file, text)
        .with_context(|| format!("Could not write {}", result_file.display()))?;
    info!(
        "Scenario '{}' finished with objective {:.4e}",
        scenario.name, tables.objective_value
    );
    Ok(tables)
}

/// Runs the named scenarios in order, stopping at the first one that fails
pub fn run_batch(
    input: &ModelInput,
    names: &[String],
    settings: &RunSettings,
) -> Result<(PathBuf, Vec<ScenarioOutcome>)> {
    let selected = names
        .iter()
        .map(|name| scenarios::find(name))
        .collect::<Result<Vec<_>>>()?;
    let input = with_settings(input, settings);
    let result_dir = prepare_result_dir(settings)?;
    info!("Writing results to {}", result_dir.display());

    let mut outcomes = Vec::with_capacity(selected.len());
    for scenario in selected {
        let tables = run_scenario(&input, scenario, settings, &result_dir)
            .with_context(|| format!("Scenario '{}' failed", scenario.name))?;
        outcomes.push(ScenarioOutcome {
            scenario: scenario.name.to_string(),
            status: tables.status,
            objective_value: tables.objective_value,
            result_file: result_dir.join(format!("{}.toml", scenario.name)),
        });
    }
    Ok((result_dir, outcomes))
}

/// Loads the workbooks named in `settings` and runs the batch
pub fn run(settings: &RunSettings, names: &[String]) -> Result<(PathBuf, Vec<ScenarioOutcome>)> {
    let input = load_input(&settings.input_workbook, &settings.ext_workbook)
        .context("Failed to load input workbooks")?;
    run_batch(&input, names, settings)
}
