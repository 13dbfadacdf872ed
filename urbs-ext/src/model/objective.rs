use std::fmt;
use std::str::FromStr;

use good_lp::Expression;
use serde::{Deserialize, Serialize};

use crate::general::error::ModelError;
use crate::model::context::RuleContext;
use crate::model::outer::co2_total;

/// What the solver minimises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveMode {
    #[serde(rename = "cost")]
    Cost,
    #[serde(rename = "CO2")]
    Co2,
}

impl FromStr for ObjectiveMode {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cost" => Ok(ObjectiveMode::Cost),
            "CO2" => Ok(ObjectiveMode::Co2),
            other => Err(ModelError::UnknownObjective(other.to_string())),
        }
    }
}

impl fmt::Display for ObjectiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectiveMode::Cost => f.write_str("cost"),
            ObjectiveMode::Co2 => f.write_str("CO2"),
        }
    }
}

/// Global limit rules on the cost and CO2 totals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalRule {
    Co2Limit,
    CostLimit,
    Co2Budget,
    CostBudget,
}

impl GlobalRule {
    /// Rule family name in the constraint set
    pub fn family(self) -> &'static str {
        match self {
            GlobalRule::Co2Limit => "res_global_co2_limit",
            GlobalRule::CostLimit => "res_global_cost_limit",
            GlobalRule::Co2Budget => "res_global_co2_budget",
            GlobalRule::CostBudget => "res_global_cost_budget",
        }
    }
}

/// Global rules registered for a mode. The limit on the minimised quantity is never
/// registered, the other quantity is always bounded.
pub fn global_rules(mode: ObjectiveMode, intertemporal: bool) -> Vec<GlobalRule> {
    let mut rules = match mode {
        ObjectiveMode::Cost => vec![GlobalRule::Co2Limit],
        ObjectiveMode::Co2 => vec![GlobalRule::CostLimit],
    };
    if intertemporal {
        match mode {
            ObjectiveMode::Cost => rules.extend([GlobalRule::Co2Budget, GlobalRule::CostLimit]),
            ObjectiveMode::Co2 => rules.extend([GlobalRule::CostBudget, GlobalRule::Co2Limit]),
        }
    }
    rules
}

/// Sum of all cost variables, aggregate and extension
pub fn total_cost(ctx: &RuleContext) -> Expression {
    let mut total: Expression = ctx.vars.costs.values().copied().sum();
    for cost in ctx.vars.costs_new.values() {
        total += *cost;
    }
    total
}

pub fn assemble(ctx: &RuleContext, mode: ObjectiveMode) -> Expression {
    match mode {
        ObjectiveMode::Cost => total_cost(ctx),
        ObjectiveMode::Co2 => co2_total(ctx),
    }
}
