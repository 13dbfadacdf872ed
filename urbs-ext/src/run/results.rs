use std::fmt::Display;

use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::model::outer::ELEC;
use crate::model::tables::{ExtCostType, ExtKey, Year};
use crate::run::solve::SolvedModel;

/// Values of one table keyed by the index tuple joined with `/`
pub type ResultTable = IndexMap<String, f64>;

/// Capacity sources of one technology in one year
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtCapacityRow {
    pub capacity: f64,
    pub capacity_new: f64,
    pub imported: f64,
    pub stockout: f64,
    pub euprimary: f64,
    pub eusecondary: f64,
    pub stock: f64,
    pub stock_imported: f64,
    pub anti_dumping: f64,
}

/// Energy per year delivered by the capacity and by each source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtBalanceRow {
    pub total: f64,
    pub import: f64,
    pub stockout: f64,
    pub primary: f64,
    pub secondary: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtCostRow {
    pub import: f64,
    pub storage: f64,
    pub primary: f64,
    pub secondary: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningRow {
    pub price_reduction: f64,
    pub bd: Vec<f64>, // one per segment
    pub z: Vec<f64>,
}

/// Named result tables of a solved model, ready for a reporting layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTables {
    pub scenario: String,
    pub objective: String,
    pub status: String,
    pub objective_value: f64,
    pub costs: ResultTable,
    pub costs_new: ResultTable,
    pub cap_pro: ResultTable,
    pub cap_pro_new: ResultTable,
    pub process_costs: ResultTable,
    /// electricity output per (timestep, year, site, process)
    pub process_elec_output: ResultTable,
    pub ext_capacity: IndexMap<String, ExtCapacityRow>,
    pub ext_balance: IndexMap<String, ExtBalanceRow>,
    pub ext_costs: IndexMap<String, ExtCostRow>,
    /// installed extension capacity per year, summed over locations and technologies
    pub ext_capacity_total: ResultTable,
    pub learning: IndexMap<String, LearningRow>,
    pub duals: ResultTable,
}

impl ResultTables {
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

fn key<I>(parts: I) -> String
where
    I: IntoIterator,
    I::Item: Display,
{
    parts.into_iter().join("/")
}

fn ext_key(key: &ExtKey) -> String {
    format!("{}/{}/{}", key.0, key.1, key.2)
}

/// Reads every reported table out of a solved model
pub fn get_constants(solved: &SolvedModel) -> ResultTables {
    let vars = &solved.vars;
    let value = |variable| solved.value(variable);

    let costs = vars
        .costs
        .iter()
        .map(|(cost_type, var)| (cost_type.to_string(), value(*var)))
        .collect();
    let costs_new = ExtCostType::ALL
        .into_iter()
        .filter_map(|ct| vars.costs_new.get(&ct).map(|var| (ct.to_string(), value(*var))))
        .collect();

    let cap_pro = solved
        .cap_pro
        .iter()
        .map(|((stf, sit, pro), expr)| (key([stf.to_string(), sit.clone(), pro.clone()]), solved.eval(expr)))
        .collect();
    let cap_pro_new = vars
        .cap_pro_new
        .iter()
        .map(|((stf, sit, pro), var)| (key([stf.to_string(), sit.clone(), pro.clone()]), value(*var)))
        .collect();
    let process_costs = vars
        .process_costs
        .iter()
        .map(|(((stf, sit, pro), cost_type), var)| {
            (
                key([stf.to_string(), sit.clone(), pro.clone(), cost_type.to_string()]),
                value(*var),
            )
        })
        .collect();

    let mut process_elec_output = ResultTable::new();
    for ((t, (stf, sit, pro, com)), var) in &vars.e_pro_out {
        if com == ELEC {
            process_elec_output.insert(
                key([t.to_string(), stf.to_string(), sit.clone(), pro.clone()]),
                value(*var),
            );
        }
    }

    let mut ext_capacity = IndexMap::new();
    let mut ext_balance = IndexMap::new();
    let mut ext_costs = IndexMap::new();
    let mut learning = IndexMap::new();
    let mut totals: IndexMap<Year, f64> = IndexMap::new();
    for (k, v) in &vars.ext {
        let label = ext_key(k);
        let capacity = value(v.capacity);
        *totals.entry(k.0).or_insert(0.0) += capacity;
        ext_capacity.insert(
            label.clone(),
            ExtCapacityRow {
                capacity,
                capacity_new: value(v.capacity_new),
                imported: value(v.imported),
                stockout: value(v.stockout),
                euprimary: value(v.euprimary),
                eusecondary: value(v.eusecondary),
                stock: value(v.stock),
                stock_imported: value(v.stock_imported),
                anti_dumping: value(v.anti_dumping),
            },
        );
        ext_balance.insert(
            label.clone(),
            ExtBalanceRow {
                total: value(v.balance),
                import: value(v.balance_import),
                stockout: value(v.balance_stockout),
                primary: value(v.balance_primary),
                secondary: value(v.balance_secondary),
            },
        );
        ext_costs.insert(
            label.clone(),
            ExtCostRow {
                import: value(v.costs_import),
                storage: value(v.costs_storage),
                primary: value(v.costs_primary),
                secondary: value(v.costs_secondary),
            },
        );
        let steps = &solved.sets.learning_steps;
        learning.insert(
            label,
            LearningRow {
                price_reduction: value(v.price_reduction),
                bd: steps
                    .iter()
                    .filter_map(|n| vars.bd.get(&(k.clone(), *n)).map(|var| value(*var)))
                    .collect(),
                z: steps
                    .iter()
                    .filter_map(|n| vars.z.get(&(k.clone(), *n)).map(|var| value(*var)))
                    .collect(),
            },
        );
    }
    let ext_capacity_total = totals
        .into_iter()
        .sorted_by_key(|(year, _)| *year)
        .map(|(year, total)| (year.to_string(), total))
        .collect();

    ResultTables {
        scenario: solved.name.clone(),
        objective: solved.mode.to_string(),
        status: solved.status.to_string(),
        objective_value: solved.objective_value,
        costs,
        costs_new,
        cap_pro,
        cap_pro_new,
        process_costs,
        process_elec_output,
        ext_capacity,
        ext_balance,
        ext_costs,
        ext_capacity_total,
        learning,
        duals: solved.duals.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::builder::create_model;
    use crate::model::fixture::{ext_input, outer_input};
    use crate::model::tables::GrowthRecurrence;
    use crate::run::solve::{SolverKind, SolverOptions, solve};
    use float_cmp::approx_eq;

    #[test]
    fn test_extension_tables() {
        let mut input = ext_input();
        input.ext_config.growth = GrowthRecurrence::SameYearNew;
        let model = create_model(&input, 8760.0, &[0, 1], "cost", false).unwrap();
        let solved = solve(model, &SolverOptions::default()).unwrap();
        let tables = get_constants(&solved);

        assert_eq!(tables.status, "optimal");
        assert_eq!(tables.objective, "cost");
        assert_eq!(tables.costs.len(), 7);
        assert_eq!(tables.costs_new.len(), 4);
        assert_eq!(
            tables.ext_capacity_total.keys().collect::<Vec<_>>(),
            vec!["2024", "2025", "2026"]
        );
        // demand of 110 000 MWh at 100 full-load hours
        let row = &tables.ext_capacity["2025/EU27/solarPV"];
        assert!(approx_eq!(f64, row.capacity, 1100.0, epsilon = 1e-6));
        let balance = &tables.ext_balance["2025/EU27/solarPV"];
        assert!(approx_eq!(f64, balance.total, 110_000.0, epsilon = 1e-4));
        assert_eq!(tables.learning["2024/EU27/solarPV"].bd.len(), 3);
        assert!(tables.duals.is_empty());
    }

    #[test]
    fn test_process_tables_and_toml() {
        let input = outer_input();
        let model = create_model(&input, 1.0, &[0, 1, 2], "cost", false).unwrap();
        let options = SolverOptions {
            kind: SolverKind::Clarabel,
            ..Default::default()
        };
        let solved = solve(model, &options).unwrap();
        let tables = get_constants(&solved);

        assert!(tables.cap_pro.contains_key("2024/Mid/Hydro"));
        assert!(approx_eq!(f64, tables.cap_pro["2024/Mid/Hydro"], 25.0, epsilon = 1e-6));
        assert!(!tables.cap_pro_new.contains_key("2024/Mid/Hydro"));
        assert!(tables.process_costs.contains_key("2024/Mid/Coal plant/Invest"));
        let elec_t1: f64 = tables
            .process_elec_output
            .iter()
            .filter(|(label, _)| label.starts_with("1/"))
            .map(|(_, value)| value)
            .sum();
        assert!(approx_eq!(f64, elec_t1, 40.0, epsilon = 1e-4));
        assert!(tables.ext_capacity.is_empty());

        let text = tables.to_toml().unwrap();
        let parsed: ResultTables = toml::from_str(&text).unwrap();
        assert_eq!(parsed.cap_pro.len(), tables.cap_pro.len());
        assert_eq!(parsed.scenario, "urbs-ext");
    }
}
