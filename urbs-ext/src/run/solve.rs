//! Hands a built model to a good_lp backend and reads the values back.
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, Instant};

use good_lp::{
    DualValues, Expression, ResolutionError, Solution, SolutionWithDual, SolverModel, Variable,
};
use indexmap::IndexMap;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::general::error::ModelError;
use crate::model::builder::Model;
use crate::model::objective::ObjectiveMode;
use crate::model::rule::{ConstraintRow, ConstraintSet};
use crate::model::sets::IndexUniverse;
use crate::model::tables::ProKey;
use crate::model::variables::VariableRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    /// LP and MIP
    #[default]
    Highs,
    /// LP only
    Clarabel,
}

impl FromStr for SolverKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "highs" => Ok(SolverKind::Highs),
            "clarabel" => Ok(SolverKind::Clarabel),
            _ => Err(ModelError::UnsupportedSolver {
                solver: s.to_string(),
                reason: "available solvers are highs and clarabel".to_string(),
            }),
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverKind::Highs => f.write_str("highs"),
            SolverKind::Clarabel => f.write_str("clarabel"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SolverOptions {
    pub kind: SolverKind,
    pub time_limit_s: Option<f64>,
    pub mip_rel_gap: Option<f32>,
    pub verbose: bool,
    /// a short solve summary is written here
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TerminationStatus {
    Optimal,
    Infeasible,
    Unbounded,
    Other(String),
}

impl From<ResolutionError> for TerminationStatus {
    fn from(err: ResolutionError) -> Self {
        match err {
            ResolutionError::Infeasible => TerminationStatus::Infeasible,
            ResolutionError::Unbounded => TerminationStatus::Unbounded,
            ResolutionError::Other(status) => TerminationStatus::Other(status.to_string()),
            ResolutionError::Str(status) => TerminationStatus::Other(status),
        }
    }
}

impl fmt::Display for TerminationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationStatus::Optimal => f.write_str("optimal"),
            TerminationStatus::Infeasible => f.write_str("infeasible"),
            TerminationStatus::Unbounded => f.write_str("unbounded"),
            TerminationStatus::Other(status) => f.write_str(status),
        }
    }
}

/// A model together with the values the solver found
pub struct SolvedModel {
    pub name: String,
    pub mode: ObjectiveMode,
    pub sets: IndexUniverse,
    pub vars: VariableRegistry,
    pub constraints: ConstraintSet,
    pub cap_pro: IndexMap<ProKey, Expression>,
    pub status: TerminationStatus,
    pub objective_value: f64,
    /// row duals by label, only for pure LP models solved with duals requested
    pub duals: IndexMap<String, f64>,
    pub solve_time: Duration,
    values: HashMap<Variable, f64>,
}

impl SolvedModel {
    pub fn value(&self, variable: Variable) -> f64 {
        self.values.get(&variable).copied().unwrap_or(0.0)
    }

    pub fn eval(&self, expression: &Expression) -> f64 {
        expression.eval_with(&self.values)
    }

    /// Rows whose relation does not hold at the solved values
    pub fn violated_rows(&self, tolerance: f64) -> Vec<&ConstraintRow> {
        self.constraints
            .rows()
            .iter()
            .filter(|row| !row.relation.is_satisfied(&self.values, tolerance))
            .collect()
    }
}

struct BackendOutcome {
    values: HashMap<Variable, f64>,
    duals: IndexMap<String, f64>,
}

/// Adds the rows, solves, and copies values and duals out of the backend solution
fn run_backend<M>(
    mut problem: M,
    rows: &[ConstraintRow],
    variables: &[Variable],
    want_duals: bool,
) -> Result<BackendOutcome, ResolutionError>
where
    M: SolverModel<Error = ResolutionError>,
    M::Solution: for<'a> SolutionWithDual<'a>,
{
    let references: Vec<_> = rows
        .iter()
        .map(|row| problem.add_constraint(row.relation.clone().into_constraint()))
        .collect();
    let mut solution = problem.solve()?;
    let values = variables
        .iter()
        .map(|variable| (*variable, solution.value(*variable)))
        .collect();

    let mut duals = IndexMap::new();
    if want_duals {
        let dual_values = solution.compute_dual();
        for (row, reference) in rows.iter().zip(references) {
            if let Some(label) = &row.label {
                duals.insert(label.clone(), dual_values.dual(reference));
            }
        }
    }
    Ok(BackendOutcome { values, duals })
}

/// Solves a model.
///
/// Any status other than optimal is returned as `SolveFailed`, carrying the model name.
/// Time-limited HiGHS runs that stop with an incumbent report as optimal, since the backend
/// does not expose the distinction.
pub fn solve(model: Model, options: &SolverOptions) -> Result<SolvedModel, ModelError> {
    let has_binaries = model.has_binaries();
    if has_binaries && options.kind == SolverKind::Clarabel {
        return Err(ModelError::UnsupportedSolver {
            solver: options.kind.to_string(),
            reason: "the model has binary learning-curve variables".to_string(),
        });
    }
    let want_duals = model.want_duals && !has_binaries;
    if model.want_duals && has_binaries {
        warn!("Duals are not reported for mixed-integer model '{}'", model.name);
    }

    let Model {
        name,
        mode,
        sets,
        vars,
        constraints,
        objective,
        cap_pro,
        problem,
        ..
    } = model;
    let variables: Vec<Variable> = problem
        .iter_variables_with_def()
        .map(|(variable, _)| variable)
        .collect();
    let unsolved = problem.minimise(objective.clone());

    info!(
        "Solving '{}' with {} ({} rows, {} variables)",
        name,
        options.kind,
        constraints.len(),
        variables.len()
    );
    let start = Instant::now();
    let outcome = match options.kind {
        SolverKind::Highs => {
            let mut backend = unsolved.using(good_lp::highs);
            backend.set_verbose(options.verbose);
            if let Some(limit) = options.time_limit_s {
                backend = backend.set_time_limit(limit);
            }
            if let Some(gap) = options.mip_rel_gap {
                backend = backend
                    .set_mip_rel_gap(gap)
                    .map_err(|e| ModelError::InvalidParameter {
                        name: "mip_rel_gap".to_string(),
                        detail: format!("{e:?}"),
                    })?;
            }
            run_backend(backend, constraints.rows(), &variables, want_duals)
        }
        SolverKind::Clarabel => run_backend(
            unsolved.using(good_lp::clarabel),
            constraints.rows(),
            &variables,
            want_duals,
        ),
    };
    let solve_time = start.elapsed();

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            let status = TerminationStatus::from(err);
            write_summary(options, &name, &status, None, solve_time, &constraints);
            return Err(ModelError::SolveFailed {
                scenario: name,
                status: status.to_string(),
            });
        }
    };

    let objective_value = objective.eval_with(&outcome.values);
    let status = TerminationStatus::Optimal;
    info!("Solved '{name}' in {solve_time:.2?}, objective {objective_value:.6e}");
    write_summary(
        options,
        &name,
        &status,
        Some(objective_value),
        solve_time,
        &constraints,
    );

    Ok(SolvedModel {
        name,
        mode,
        sets,
        vars,
        constraints,
        cap_pro,
        status,
        objective_value,
        duals: outcome.duals,
        solve_time,
        values: outcome.values,
    })
}

fn write_summary(
    options: &SolverOptions,
    name: &str,
    status: &TerminationStatus,
    objective_value: Option<f64>,
    solve_time: Duration,
    constraints: &ConstraintSet,
) {
    let Some(path) = &options.log_file else {
        return;
    };
    let mut summary = format!(
        "model: {name}\nsolver: {}\nstatus: {status}\nsolve time: {solve_time:.3?}\n",
        options.kind
    );
    if let Some(value) = objective_value {
        summary.push_str(&format!("objective: {value}\n"));
    }
    summary.push_str(&format!("rows: {}\n", constraints.len()));
    for (family, count) in constraints.families() {
        summary.push_str(&format!("  {family}: {count}\n"));
    }
    if let Err(err) = std::fs::write(path, summary) {
        warn!("Could not write solver log {}: {err}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::builder::{ModelBuilder, create_model};
    use crate::model::fixture::{ext_input, outer_input};
    use crate::model::tables::{CostType, ExtCostType, GrowthRecurrence, ModelInput};
    use float_cmp::approx_eq;

    fn key(year: i32) -> (i32, String, String) {
        (year, "EU27".to_string(), "solarPV".to_string())
    }

    /// Three-year supply-chain run with a 50 MW yearly ceiling
    fn end_to_end_input() -> ModelInput {
        let mut input = ext_input();
        input.ext_config.growth = GrowthRecurrence::SameYearNew;
        for year in 2024..=2026 {
            input.ext.installable_capacity.insert(key(year), 50.0);
        }
        input
    }

    #[test]
    fn test_end_to_end_supply_chain() {
        let input = end_to_end_input();
        let model = create_model(&input, 8760.0, &[0, 1], "cost", false).unwrap();
        let solved = solve(model, &SolverOptions::default()).unwrap();
        assert_eq!(solved.status, TerminationStatus::Optimal);

        let mut built = 0.0;
        for year in 2024..=2026 {
            let v = solved.vars.ext(&key(year)).unwrap();
            let new = solved.value(v.capacity_new);
            assert!(approx_eq!(f64, new, 50.0, epsilon = 1e-6));
            built += new;
            // every unit of new capacity has a source
            let sources = solved.value(v.imported)
                + solved.value(v.stockout)
                + solved.value(v.euprimary)
                + solved.value(v.eusecondary);
            assert!(approx_eq!(f64, new, sources, epsilon = 1e-6));
            assert!(solved.value(v.stock) >= -1e-6);
        }
        let last = solved.vars.ext(&key(2026)).unwrap();
        assert!(approx_eq!(
            f64,
            solved.value(last.capacity),
            1000.0 + built,
            epsilon = 1e-6
        ));
        assert!(approx_eq!(f64, solved.objective_value, 0.0, epsilon = 1e-6));
        assert!(solved.violated_rows(1e-6).is_empty());
    }

    #[test]
    fn test_solved_learning_curve_properties() {
        let mut input = end_to_end_input();
        for year in 2024..=2026 {
            input.ext.import_cost.insert(key(year), 10.0);
            input.ext.manufacturing_cost.insert(key(year), 10.0);
            input.ext.remanufacturing_cost.insert(key(year), 8.0);
        }
        input.ext_config.gamma = 1000.0;
        let model = create_model(&input, 8760.0, &[0, 1], "cost", false).unwrap();
        let solved = solve(model, &SolverOptions::default()).unwrap();

        let mut previous_reduction = 0.0;
        for year in 2024..=2026 {
            let k = key(year);
            let selected: Vec<usize> = (0..3)
                .filter(|n| solved.value(solved.vars.bd(&k, *n).unwrap()) > 0.5)
                .collect();
            assert!(selected.len() <= 1);
            let reduction = solved.value(solved.vars.ext(&k).unwrap().price_reduction);
            if let Some(n) = selected.first() {
                let expected = [0.0, 5.0, 10.0][*n];
                assert!(approx_eq!(f64, reduction, expected, epsilon = 1e-6));
            }
            assert!(reduction >= previous_reduction - 1e-6);
            previous_reduction = reduction;

            // cumulative recycled output never reaches the higher thresholds, so their
            // products stay at zero
            for n in 1..3 {
                assert!(solved.value(solved.vars.bd(&k, n).unwrap()) < 0.5);
                assert!(solved.value(solved.vars.z(&k, n).unwrap()).abs() <= 1e-3);
            }
        }

        let costs: f64 = CostType::ALL
            .into_iter()
            .map(|ct| solved.value(solved.vars.cost(ct).unwrap()))
            .sum::<f64>()
            + ExtCostType::ALL
                .into_iter()
                .map(|ct| solved.value(solved.vars.cost_new(ct).unwrap()))
                .sum::<f64>();
        assert!(approx_eq!(
            f64,
            solved.objective_value,
            costs,
            epsilon = 1e-6 * costs.abs().max(1.0)
        ));
    }

    #[test]
    fn test_infeasible_run_names_scenario_and_status() {
        let mut input = end_to_end_input();
        input.ext.installable_capacity.insert(key(2025), 10.0);
        let model = ModelBuilder::new(&input)
            .name("scenario_tight")
            .build("cost")
            .unwrap();
        let err = solve(model, &SolverOptions::default()).err().unwrap();
        assert_eq!(
            err,
            ModelError::SolveFailed {
                scenario: "scenario_tight".to_string(),
                status: "infeasible".to_string(),
            }
        );
    }

    #[test]
    fn test_clarabel_rejects_binaries() {
        let input = ext_input();
        let model = create_model(&input, 8760.0, &[0, 1], "cost", false).unwrap();
        let options = SolverOptions {
            kind: SolverKind::Clarabel,
            ..Default::default()
        };
        assert!(matches!(
            solve(model, &options),
            Err(ModelError::UnsupportedSolver { .. })
        ));
    }

    #[test]
    fn test_clarabel_solves_outer_lp() {
        let input = outer_input();
        let model = create_model(&input, 1.0, &[0, 1, 2], "cost", false).unwrap();
        let options = SolverOptions {
            kind: SolverKind::Clarabel,
            ..Default::default()
        };
        let solved = solve(model, &options).unwrap();
        let costs: f64 = solved
            .vars
            .costs
            .values()
            .map(|var| solved.value(*var))
            .sum();
        assert!(approx_eq!(
            f64,
            solved.objective_value,
            costs,
            epsilon = 1e-4 * costs.abs().max(1.0)
        ));
        // electricity output meets the demand of 40 at t=1
        let elec: f64 = solved
            .vars
            .e_pro_out
            .iter()
            .filter(|((t, (_, _, _, com)), _)| *t == 1 && com == "Elec")
            .map(|(_, var)| solved.value(*var))
            .sum();
        assert!(approx_eq!(f64, elec, 40.0, epsilon = 1e-4));
    }

    #[test]
    fn test_duals_and_log_file_for_lp() {
        let dir = tempfile::tempdir().unwrap();
        let log_file = dir.path().join("base.log");
        let input = outer_input();
        let model = create_model(&input, 1.0, &[0, 1, 2], "cost", true).unwrap();
        let rows = model.constraints.len();
        let options = SolverOptions {
            log_file: Some(log_file.clone()),
            ..Default::default()
        };
        let solved = solve(model, &options).unwrap();
        assert_eq!(solved.duals.len(), rows);
        assert!(solved.duals.keys().any(|label| label.starts_with("res_vertex")));

        let summary = std::fs::read_to_string(log_file).unwrap();
        assert!(summary.contains("status: optimal"));
        assert!(summary.contains("res_vertex"));
    }

    #[test]
    fn test_solver_kind_from_str() {
        assert_eq!("HiGHS".parse::<SolverKind>().unwrap(), SolverKind::Highs);
        assert_eq!("clarabel".parse::<SolverKind>().unwrap(), SolverKind::Clarabel);
        assert!(matches!(
            "scip".parse::<SolverKind>(),
            Err(ModelError::UnsupportedSolver { .. })
        ));
    }
}
