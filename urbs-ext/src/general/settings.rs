//! Run settings, read from a TOML file.
use std::fmt::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::tables::{GrowthRecurrence, PolicySwitches, Timestep};
use crate::run::solve::{SolverKind, SolverOptions};

pub const SETTINGS_FILE_NAME: &str = "settings.toml";

const DEFAULT_SETTINGS_FILE_HEADER: &str = concat!(
    "# Run settings for urbs-ext v",
    env!("CARGO_PKG_VERSION"),
    ".
#
# The defaults are shown below, commented out. To change an option, uncomment it and set
# the value.
#
# To print this file again, run:
# \turbs-ext settings show-default
"
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    // Output
    pub result_name: String,   // prefix of the timestamped result directory
    pub results_root: PathBuf, // directory the result directories are created in
    pub log_level: String,     // default level, RUST_LOG takes precedence

    // Input
    pub input_workbook: PathBuf, // urbs sheets
    pub ext_workbook: PathBuf,   // supply-chain sheets

    // Model
    pub objective: String, // "cost" or "CO2"
    pub dt: f64,           // timestep length in hours
    pub timesteps: Vec<Timestep>,
    pub growth_recurrence: GrowthRecurrence,
    pub want_duals: bool,

    // Solver
    pub solver: SolverKind,
    pub time_limit_s: Option<f64>,
    pub mip_rel_gap: Option<f32>,
    pub verbose_solver: bool,

    pub scenarios: Vec<String>,
    pub policy: PolicySwitches,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            result_name: "urbs-ext".to_string(),
            results_root: PathBuf::from("result"),
            log_level: "info".to_string(),
            input_workbook: PathBuf::from("Input/urbs_input.xlsx"),
            ext_workbook: PathBuf::from("Input/urbs_ext.xlsx"),
            objective: "cost".to_string(),
            dt: 8760.0,
            timesteps: vec![0, 1],
            growth_recurrence: GrowthRecurrence::PreviousYearNew,
            want_duals: false,
            solver: SolverKind::Highs,
            time_limit_s: None,
            mip_rel_gap: None,
            verbose_solver: false,
            scenarios: vec!["base".to_string()],
            policy: PolicySwitches::default(),
        }
    }
}

impl RunSettings {
    /// Reads settings from `file_path`. A missing file yields the defaults.
    pub fn load_from_path(file_path: &Path) -> Result<Self> {
        if !file_path.is_file() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(file_path)
            .with_context(|| format!("Could not read settings file {}", file_path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Could not parse settings file {}", file_path.display()))
    }

    /// The default settings as a commented-out TOML file
    pub fn default_file_contents() -> Result<String> {
        let raw = toml::to_string(&Self::default()).context("Could not convert settings to TOML")?;
        let mut out = DEFAULT_SETTINGS_FILE_HEADER.to_string();
        for line in raw.lines() {
            if line.trim().is_empty() {
                out.push('\n');
            } else {
                writeln!(&mut out, "# {line}")?;
            }
        }
        Ok(out)
    }

    pub fn solver_options(&self, log_file: Option<PathBuf>) -> SolverOptions {
        SolverOptions {
            kind: self.solver,
            time_limit_s: self.time_limit_s,
            mip_rel_gap: self.mip_rel_gap,
            verbose: self.verbose_solver,
            log_file,
        }
    }
}
