//! Decision variables, declared once per tuple of their governing set.
use good_lp::{Expression, ProblemVariables, Variable, variable};
use indexmap::IndexMap;
use log::info;

use crate::general::error::ModelError;
use crate::model::sets::IndexUniverse;
use crate::model::tables::{ComKey, CostType, ExtCostType, ExtKey, ProComKey, ProKey, Timestep};

/// Capacity flows, balances and yearly costs of one (year, location, technology)
#[derive(Debug, Clone, Copy)]
pub struct ExtVariables {
    pub capacity: Variable,
    pub capacity_new: Variable,
    pub imported: Variable,
    pub stockout: Variable,
    pub euprimary: Variable,
    pub eusecondary: Variable,
    pub stock: Variable,
    pub stock_imported: Variable,
    pub anti_dumping: Variable,

    // energy per year, injected into the electricity vertex
    pub balance: Variable,
    pub balance_import: Variable,
    pub balance_stockout: Variable,
    pub balance_primary: Variable,
    pub balance_secondary: Variable,

    pub costs_import: Variable,
    pub costs_storage: Variable,
    pub costs_primary: Variable,
    pub costs_secondary: Variable,

    pub price_reduction: Variable,
}

impl ExtVariables {
    fn declare(vars: &mut ProblemVariables) -> Self {
        let mut non_negative = || vars.add(variable().min(0.0));
        let capacity = non_negative();
        let capacity_new = non_negative();
        let imported = non_negative();
        let stockout = non_negative();
        let euprimary = non_negative();
        let eusecondary = non_negative();
        let stock = non_negative();
        let stock_imported = non_negative();
        let anti_dumping = non_negative();
        let balance = non_negative();
        let balance_import = non_negative();
        let balance_stockout = non_negative();
        let balance_primary = non_negative();
        let balance_secondary = non_negative();
        let price_reduction = non_negative();
        let costs_import = non_negative();
        let costs_storage = non_negative();
        let costs_primary = non_negative();
        let costs_secondary = non_negative();
        Self {
            capacity,
            capacity_new,
            imported,
            stockout,
            euprimary,
            eusecondary,
            stock,
            stock_imported,
            anti_dumping,
            balance,
            balance_import,
            balance_stockout,
            balance_primary,
            balance_secondary,
            costs_import,
            costs_storage,
            costs_primary,
            costs_secondary,
            price_reduction,
        }
    }

    /// Yearly cost variable of an extension cost type
    pub fn cost(&self, cost_type: ExtCostType) -> Variable {
        match cost_type {
            ExtCostType::Import => self.costs_import,
            ExtCostType::Storage => self.costs_storage,
            ExtCostType::EuPrimary => self.costs_primary,
            ExtCostType::EuSecondary => self.costs_secondary,
        }
    }
}

/// Every decision variable of a model, keyed by its index tuple
#[derive(Debug, Clone)]
pub struct VariableRegistry {
    pub costs: IndexMap<CostType, Variable>,
    pub process_costs: IndexMap<(ProKey, CostType), Variable>,
    pub cap_pro_new: IndexMap<ProKey, Variable>,
    pub tau_pro: IndexMap<(Timestep, ProKey), Variable>,
    pub e_pro_in: IndexMap<(Timestep, ProComKey), Variable>,
    pub e_pro_out: IndexMap<(Timestep, ProComKey), Variable>,
    pub e_co_stock: IndexMap<(Timestep, ComKey), Variable>,

    pub ext: IndexMap<ExtKey, ExtVariables>,
    pub costs_new: IndexMap<ExtCostType, Variable>,
    pub bd: IndexMap<(ExtKey, usize), Variable>, // binary segment selector
    pub z: IndexMap<(ExtKey, usize), Variable>,  // BD * capacity_eusecondary
}

impl VariableRegistry {
    /// Declares all variables into `vars`
    pub fn declare(sets: &IndexUniverse, vars: &mut ProblemVariables) -> Self {
        let costs = CostType::ALL
            .into_iter()
            .map(|cost_type| (cost_type, vars.add(variable())))
            .collect();
        let mut process_costs = IndexMap::new();
        for key in &sets.pro_tuples {
            for cost_type in CostType::ALL {
                process_costs.insert((key.clone(), cost_type), vars.add(variable()));
            }
        }
        let cap_pro_new = sets
            .pro_tuples
            .iter()
            .filter(|key| !sets.pro_const_cap.contains(*key))
            .map(|key| (key.clone(), vars.add(variable().min(0.0))))
            .collect();

        let mut tau_pro = IndexMap::new();
        for t in &sets.timesteps {
            for key in &sets.pro_tuples {
                tau_pro.insert((*t, key.clone()), vars.add(variable().min(0.0)));
            }
        }
        let mut e_pro_in = IndexMap::new();
        let mut e_pro_out = IndexMap::new();
        let mut e_co_stock = IndexMap::new();
        for t in &sets.modelled {
            for key in &sets.pro_input_tuples {
                e_pro_in.insert((*t, key.clone()), vars.add(variable().min(0.0)));
            }
            for key in &sets.pro_output_tuples {
                e_pro_out.insert((*t, key.clone()), vars.add(variable().min(0.0)));
            }
            for key in &sets.com_tuples {
                if sets.com_stock.contains(&key.2) {
                    e_co_stock.insert((*t, key.clone()), vars.add(variable().min(0.0)));
                }
            }
        }

        let ext = sets
            .ext_tuples
            .iter()
            .map(|key| (key.clone(), ExtVariables::declare(vars)))
            .collect();
        let costs_new = ExtCostType::ALL
            .into_iter()
            .map(|cost_type| (cost_type, vars.add(variable())))
            .collect();
        let mut bd = IndexMap::new();
        let mut z = IndexMap::new();
        for key in &sets.ext_tuples {
            for n in &sets.learning_steps {
                bd.insert((key.clone(), *n), vars.add(variable().binary()));
                z.insert((key.clone(), *n), vars.add(variable().min(0.0)));
            }
        }

        info!(
            "Declared {} variables ({} binary)",
            vars.len(),
            bd.len()
        );

        Self {
            costs,
            process_costs,
            cap_pro_new,
            tau_pro,
            e_pro_in,
            e_pro_out,
            e_co_stock,
            ext,
            costs_new,
            bd,
            z,
        }
    }

    pub fn has_binaries(&self) -> bool {
        !self.bd.is_empty()
    }

    pub fn cost(&self, cost_type: CostType) -> Result<Variable, ModelError> {
        lookup(&self.costs, "costs", &cost_type)
    }

    pub fn cost_new(&self, cost_type: ExtCostType) -> Result<Variable, ModelError> {
        lookup(&self.costs_new, "costs_new", &cost_type)
    }

    pub fn process_cost(&self, key: &ProKey, cost_type: CostType) -> Result<Variable, ModelError> {
        lookup(&self.process_costs, "process_costs", &(key.clone(), cost_type))
    }

    pub fn cap_pro_new(&self, key: &ProKey) -> Result<Variable, ModelError> {
        lookup(&self.cap_pro_new, "cap_pro_new", key)
    }

    pub fn tau_pro(&self, t: Timestep, key: &ProKey) -> Result<Variable, ModelError> {
        lookup(&self.tau_pro, "tau_pro", &(t, key.clone()))
    }

    pub fn e_pro_in(&self, t: Timestep, key: &ProComKey) -> Result<Variable, ModelError> {
        lookup(&self.e_pro_in, "e_pro_in", &(t, key.clone()))
    }

    pub fn e_pro_out(&self, t: Timestep, key: &ProComKey) -> Result<Variable, ModelError> {
        lookup(&self.e_pro_out, "e_pro_out", &(t, key.clone()))
    }

    pub fn e_co_stock(&self, t: Timestep, key: &ComKey) -> Result<Variable, ModelError> {
        lookup(&self.e_co_stock, "e_co_stock", &(t, key.clone()))
    }

    pub fn ext(&self, key: &ExtKey) -> Result<&ExtVariables, ModelError> {
        self.ext
            .get(key)
            .ok_or_else(|| ModelError::not_in_domain("ext", key))
    }

    pub fn bd(&self, key: &ExtKey, n: usize) -> Result<Variable, ModelError> {
        lookup(&self.bd, "BD", &(key.clone(), n))
    }

    pub fn z(&self, key: &ExtKey, n: usize) -> Result<Variable, ModelError> {
        lookup(&self.z, "z", &(key.clone(), n))
    }

    /// Net consumption of a commodity at a site and timestep:
    /// process inputs minus process outputs
    pub fn commodity_balance(
        &self,
        sets: &IndexUniverse,
        t: Timestep,
        stf: i32,
        sit: &str,
        com: &str,
    ) -> Expression {
        let mut balance = Expression::default();
        for key in sets
            .pro_input_tuples
            .iter()
            .filter(|(s, site, _, c)| *s == stf && site == sit && c == com)
        {
            if let Some(flow) = self.e_pro_in.get(&(t, key.clone())) {
                balance += *flow;
            }
        }
        for key in sets
            .pro_output_tuples
            .iter()
            .filter(|(s, site, _, c)| *s == stf && site == sit && c == com)
        {
            if let Some(flow) = self.e_pro_out.get(&(t, key.clone())) {
                balance -= *flow;
            }
        }
        balance
    }
}

fn lookup<K: std::hash::Hash + Eq + std::fmt::Debug>(
    map: &IndexMap<K, Variable>,
    table: &'static str,
    key: &K,
) -> Result<Variable, ModelError> {
    map.get(key)
        .copied()
        .ok_or_else(|| ModelError::not_in_domain(table, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::sets::tests::sample_tables;
    use crate::model::tables::{ExtConfig, ExtTables, TechnologyParams};
    use good_lp::SolverModel;

    fn sets() -> IndexUniverse {
        let mut ext = ExtTables::default();
        ext.technologies.insert(
            ("EU27".to_string(), "solarPV".to_string()),
            TechnologyParams::default(),
        );
        let config = ExtConfig {
            start_year: 2020,
            learning_steps: 3,
            ..Default::default()
        };
        IndexUniverse::build(&sample_tables(), &ext, &config, &[0, 1, 2], 1.0, None).unwrap()
    }

    #[test]
    fn test_variables_follow_their_tuple_sets() {
        let sets = sets();
        let mut vars = ProblemVariables::new();
        let registry = VariableRegistry::declare(&sets, &mut vars);

        assert_eq!(registry.tau_pro.len(), 3 * sets.pro_tuples.len());
        assert_eq!(registry.e_pro_in.len(), 2 * sets.pro_input_tuples.len());
        assert_eq!(registry.e_pro_out.len(), 2 * sets.pro_output_tuples.len());
        // Coal is the only stock commodity, in two years
        assert_eq!(registry.e_co_stock.len(), 2 * 2);
        assert_eq!(registry.ext.len(), 2);
        assert_eq!(registry.bd.len(), 2 * 3);
        assert!(registry.has_binaries());
        assert_eq!(registry.costs.len(), 7);
    }

    #[test]
    fn test_extension_costs_are_non_negative() {
        let sets = sets();
        let mut vars = ProblemVariables::new();
        let registry = VariableRegistry::declare(&sets, &mut vars);
        let costs: Expression = registry
            .ext
            .values()
            .flat_map(|v| [v.costs_import, v.costs_storage, v.costs_primary, v.costs_secondary])
            .sum();
        let solution = vars
            .minimise(costs.clone())
            .using(good_lp::highs)
            .solve()
            .unwrap();
        assert!(costs.eval_with(&solution).abs() < 1e-9);
    }

    #[test]
    fn test_lookup_outside_domain_is_an_error() {
        let sets = sets();
        let mut vars = ProblemVariables::new();
        let registry = VariableRegistry::declare(&sets, &mut vars);
        let key = (2020, "EU27".to_string(), "solarPV".to_string());
        assert!(registry.bd(&key, 2).is_ok());
        assert!(matches!(
            registry.bd(&key, 3),
            Err(ModelError::IndexNotInDomain { table: "BD", .. })
        ));
        assert!(registry.tau_pro(0, &(2020, "Mid".into(), "Nowhere".into())).is_err());
    }

    #[test]
    fn test_commodity_balance_is_input_minus_output() {
        let sets = sets();
        let mut vars = ProblemVariables::new();
        let registry = VariableRegistry::declare(&sets, &mut vars);
        let balance = registry.commodity_balance(&sets, 1, 2020, "Mid", "Elec");

        let mut values = std::collections::HashMap::new();
        for flow in registry.e_pro_out.values() {
            values.insert(*flow, 2.0);
        }
        for flow in registry.e_pro_in.values() {
            values.insert(*flow, 1.0);
        }
        // two processes produce Elec, none consume it
        assert_eq!(balance.eval_with(&values), -4.0);
    }
}
