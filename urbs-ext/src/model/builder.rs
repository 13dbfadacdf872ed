//! The model container and the pipeline that fills it: sets, parameters, variables, rules,
//! objective.
use std::time::Instant;

use good_lp::{Expression, ProblemVariables};
use indexmap::IndexMap;
use itertools::iproduct;
use log::info;

use crate::general::error::ModelError;
use crate::model::context::RuleContext;
use crate::model::objective::{GlobalRule, ObjectiveMode, assemble, global_rules};
use crate::model::params::Parameters;
use crate::model::rule::{ConstraintSet, ModelObserver, NullObserver, Rule};
use crate::model::sets::IndexUniverse;
use crate::model::tables::{CostType, ExtCostType, ExtKey, ModelInput, ProKey, Timestep};
use crate::model::variables::VariableRegistry;
use crate::model::{ext, learning, outer};

/// A solve-ready model: index sets, variables, emitted rows and the objective
pub struct Model {
    pub name: String,
    pub mode: ObjectiveMode,
    pub sets: IndexUniverse,
    pub vars: VariableRegistry,
    pub constraints: ConstraintSet,
    pub objective: Expression,
    /// process capacity as an expression of the new-capacity variables
    pub cap_pro: IndexMap<ProKey, Expression>,
    pub want_duals: bool,
    pub(crate) problem: ProblemVariables,
}

impl Model {
    pub fn has_binaries(&self) -> bool {
        self.vars.has_binaries()
    }

    pub fn num_variables(&self) -> usize {
        self.problem.len()
    }

    /// Rows emitted by one rule family
    pub fn count(&self, family: &str) -> usize {
        self.constraints.count(family)
    }
}

/// Builds a model with the default name and no observer.
///
/// # Arguments
/// * `input` - tables after any scenario transform
/// * `dt` - timestep length in hours
/// * `timesteps` - ordered timesteps, the first being the initialisation step
/// * `objective` - `"cost"` or `"CO2"`
/// * `want_duals` - label rows so their duals can be reported
pub fn create_model(
    input: &ModelInput,
    dt: f64,
    timesteps: &[Timestep],
    objective: &str,
    want_duals: bool,
) -> Result<Model, ModelError> {
    ModelBuilder::new(input)
        .dt(dt)
        .timesteps(timesteps.to_vec())
        .want_duals(want_duals)
        .build(objective)
}

pub struct ModelBuilder<'a> {
    input: &'a ModelInput,
    name: String,
    dt: f64,
    timesteps: Vec<Timestep>,
    want_duals: bool,
    intertemporal: Option<bool>,
    observer: Box<dyn ModelObserver + 'a>,
}

impl<'a> ModelBuilder<'a> {
    pub fn new(input: &'a ModelInput) -> Self {
        Self {
            input,
            name: "urbs-ext".to_string(),
            dt: 8760.0,
            timesteps: vec![0, 1],
            want_duals: false,
            intertemporal: None,
            observer: Box::new(NullObserver),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    pub fn timesteps(mut self, timesteps: Vec<Timestep>) -> Self {
        self.timesteps = timesteps;
        self
    }

    pub fn want_duals(mut self, want_duals: bool) -> Self {
        self.want_duals = want_duals;
        self
    }

    /// Forces the inter-temporal mode on or off instead of deriving it from the year count
    pub fn intertemporal(mut self, intertemporal: bool) -> Self {
        self.intertemporal = Some(intertemporal);
        self
    }

    pub fn observer(mut self, observer: impl ModelObserver + 'a) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn build(mut self, objective: &str) -> Result<Model, ModelError> {
        let mode: ObjectiveMode = objective.parse()?;
        if self.dt <= 0.0 {
            return Err(ModelError::InvalidParameter {
                name: "dt".to_string(),
                detail: format!("{} is not a positive timestep length", self.dt),
            });
        }
        let start = Instant::now();
        let input = self.input;

        self.observer.stage("Deriving index sets");
        let sets = IndexUniverse::build(
            &input.urbs,
            &input.ext,
            &input.ext_config,
            &self.timesteps,
            self.dt,
            self.intertemporal,
        )?;

        self.observer.stage("Declaring variables");
        let mut problem = ProblemVariables::new();
        let vars = VariableRegistry::declare(&sets, &mut problem);

        self.observer.stage("Generating rules");
        let params = Parameters::new(input, &sets, self.dt);
        let (constraints, objective_expr, cap_pro) = {
            let ctx = RuleContext::new(&sets, params, &vars)?;
            let constraints = register_rules(&ctx, mode, self.want_duals, self.observer.as_mut())?;
            let objective_expr = assemble(&ctx, mode);
            (constraints, objective_expr, ctx.cap_pro)
        };

        info!(
            "Built model '{}' in {:.2?}: {} variables, {} rows, objective {}",
            self.name,
            start.elapsed(),
            problem.len(),
            constraints.len(),
            mode
        );

        Ok(Model {
            name: self.name,
            mode,
            sets,
            vars,
            constraints,
            objective: objective_expr,
            cap_pro,
            want_duals: self.want_duals,
            problem,
        })
    }
}

/// Emits every rule family over its index set
fn register_rules(
    ctx: &RuleContext,
    mode: ObjectiveMode,
    labelled: bool,
    observer: &mut dyn ModelObserver,
) -> Result<ConstraintSet, ModelError> {
    let sets = ctx.sets;
    let tm = || sets.modelled.iter().copied();
    let mut rows = ConstraintSet::new(labelled);

    // commodities
    rows.add_family("res_vertex", iproduct!(tm(), sets.com_tuples.iter().cloned()), observer, |i| {
        outer::res_vertex(ctx, i)
    })?;
    rows.add_family("res_stock_step", iproduct!(tm(), sets.com_tuples.iter().cloned()), observer, |i| {
        outer::res_stock_step(ctx, i)
    })?;
    rows.add_family("res_stock_total", sets.com_tuples.iter().cloned(), observer, |i| {
        outer::res_stock_total(ctx, i)
    })?;
    rows.add_family("res_env_step", iproduct!(tm(), sets.com_tuples.iter().cloned()), observer, |i| {
        outer::res_env_step(ctx, i)
    })?;
    rows.add_family("res_env_total", sets.com_tuples.iter().cloned(), observer, |i| {
        outer::res_env_total(ctx, i)
    })?;

    // process operation
    let inputs = || iproduct!(tm(), sets.pro_input_tuples.iter().cloned());
    let outputs = || iproduct!(tm(), sets.pro_output_tuples.iter().cloned());
    rows.add_family("def_process_input", inputs(), observer, |i| outer::def_process_input(ctx, i))?;
    rows.add_family("def_process_output", outputs(), observer, |i| outer::def_process_output(ctx, i))?;
    rows.add_family("def_intermittent_supply", inputs(), observer, |i| {
        outer::def_intermittent_supply(ctx, i)
    })?;
    rows.add_family(
        "res_process_throughput_by_capacity",
        iproduct!(tm(), sets.pro_tuples.iter().cloned()),
        observer,
        |i| outer::res_process_throughput_by_capacity(ctx, i),
    )?;
    rows.add_family(
        "res_process_maxgrad_lower",
        iproduct!(tm(), sets.pro_maxgrad_tuples.iter().cloned()),
        observer,
        |i| outer::res_process_maxgrad_lower(ctx, i),
    )?;
    rows.add_family(
        "res_process_maxgrad_upper",
        iproduct!(tm(), sets.pro_maxgrad_tuples.iter().cloned()),
        observer,
        |i| outer::res_process_maxgrad_upper(ctx, i),
    )?;
    rows.add_family(
        "res_throughput_by_capacity_min",
        iproduct!(tm(), sets.pro_partial_tuples.iter().cloned()),
        observer,
        |i| outer::res_throughput_by_capacity_min(ctx, i),
    )?;
    rows.add_family(
        "def_partial_process_input",
        iproduct!(tm(), sets.pro_partial_input_tuples.iter().cloned()),
        observer,
        |i| outer::def_partial_process_input(ctx, i),
    )?;
    rows.add_family(
        "def_partial_process_output",
        iproduct!(tm(), sets.pro_partial_output_tuples.iter().cloned()),
        observer,
        |i| outer::def_partial_process_output(ctx, i),
    )?;

    // capacities
    rows.add_family("res_process_capacity_lower", sets.pro_tuples.iter().cloned(), observer, |i| {
        outer::res_process_capacity_lower(ctx, i)
    })?;
    rows.add_family("res_process_capacity_upper", sets.pro_tuples.iter().cloned(), observer, |i| {
        outer::res_process_capacity_upper(ctx, i)
    })?;
    rows.add_family("res_area", sets.sit_tuples.iter().cloned(), observer, |i| {
        outer::res_area(ctx, i)
    })?;

    // global limits of the quantity not minimised
    for rule in global_rules(mode, sets.intertemporal) {
        let family = rule.family();
        let years = sets.years.iter().copied();
        match rule {
            GlobalRule::Co2Limit => {
                rows.add_family(family, years, observer, |i| outer::res_global_co2_limit(ctx, i))?
            }
            GlobalRule::CostLimit => {
                rows.add_family(family, years, observer, |i| outer::res_global_cost_limit(ctx, i))?
            }
            GlobalRule::Co2Budget => {
                rows.add_family(family, [()], observer, |i| outer::res_global_co2_budget(ctx, i))?
            }
            GlobalRule::CostBudget => {
                rows.add_family(family, [()], observer, |i| outer::res_global_cost_budget(ctx, i))?
            }
        }
    }

    // costs
    rows.add_family("def_costs", CostType::ALL, observer, |i| outer::def_costs(ctx, i))?;
    rows.add_family(
        "def_specific_process_costs",
        iproduct!(sets.pro_tuples.iter().cloned(), CostType::ALL),
        observer,
        |i| outer::def_specific_process_costs(ctx, i),
    )?;

    // supply-chain extension
    let ext_families: [(&'static str, ExtRule); 30] = [
        ("ext_growth", ext::ext_growth),
        ("ext_initial_capacity", ext::ext_initial_capacity),
        ("ext_closure", ext::ext_closure),
        ("ext_stock_balance", ext::ext_stock_balance),
        ("ext_stock_initial", ext::ext_stock_initial),
        ("ext_anti_dumping", ext::ext_anti_dumping),
        ("ext_installable_capacity", ext::ext_installable_capacity),
        ("ext_ramp_primary", ext::ext_ramp_primary),
        ("ext_ramp_secondary", ext::ext_ramp_secondary),
        ("ext_floor_primary", ext::ext_floor_primary),
        ("ext_floor_secondary", ext::ext_floor_secondary),
        ("ext_content_lagged", ext::ext_content_lagged),
        ("ext_content_ratio", ext::ext_content_ratio),
        ("ext_stock_turnover", ext::ext_stock_turnover),
        ("ext_import_cost", ext::ext_import_cost),
        ("ext_storage_cost", ext::ext_storage_cost),
        ("ext_primary_cost", ext::ext_primary_cost),
        ("ext_secondary_cost", ext::ext_secondary_cost),
        ("ext_balance", ext::ext_balance),
        ("ext_balance_import", ext::ext_balance_import),
        ("ext_balance_stockout", ext::ext_balance_stockout),
        ("ext_balance_primary", ext::ext_balance_primary),
        ("ext_balance_secondary", ext::ext_balance_secondary),
        ("policy_nzia_benchmark", ext::policy_nzia_benchmark),
        ("policy_milestone", ext::policy_milestone),
        ("policy_stock_import_fraction", ext::policy_stock_import_fraction),
        ("policy_min_stock", ext::policy_min_stock),
        ("lc_exclusive", learning::lc_exclusive),
        ("lc_monotonic", learning::lc_monotonic),
        ("lc_value", learning::lc_value),
    ];
    for (family, rule) in ext_families {
        rows.add_family(family, sets.ext_tuples.iter().cloned(), observer, |i| rule(ctx, i))?;
    }
    rows.add_family("lc_cumulative_gate", sets.ext_tuples.iter().cloned(), observer, |i| {
        learning::lc_cumulative_gate(ctx, i)
    })?;

    let segments = || iproduct!(sets.ext_tuples.iter().cloned(), sets.learning_steps.iter().copied());
    let segment_families: [(&'static str, SegmentRule); 4] = [
        ("lc_z_binary", learning::lc_z_binary),
        ("lc_z_capacity", learning::lc_z_capacity),
        ("lc_z_lower", learning::lc_z_lower),
        ("lc_z_nonneg", learning::lc_z_nonneg),
    ];
    for (family, rule) in segment_families {
        rows.add_family(family, segments(), observer, |i| rule(ctx, i))?;
    }

    rows.add_family("def_costs_new", ExtCostType::ALL, observer, |i| ext::def_costs_new(ctx, i))?;

    Ok(rows)
}

type ExtRule = fn(&RuleContext, &ExtKey) -> Result<Rule, ModelError>;
type SegmentRule = fn(&RuleContext, &(ExtKey, usize)) -> Result<Rule, ModelError>;
