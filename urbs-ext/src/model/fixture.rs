//! Small input systems shared by the unit tests of the model
use good_lp::ProblemVariables;

use crate::model::context::RuleContext;
use crate::model::params::Parameters;
use crate::model::sets::IndexUniverse;
use crate::model::tables::{
    CommodityAttrs, CommodityType, LearningCurve, ModelInput, PolicySwitches, ProcessAttrs,
    TechnologyParams, Timestep,
};
use crate::model::variables::VariableRegistry;

/// Owns everything a `RuleContext` borrows
pub struct Fixture {
    pub input: ModelInput,
    pub sets: IndexUniverse,
    pub vars: VariableRegistry,
    pub problem: ProblemVariables,
    pub dt: f64,
}

impl Fixture {
    pub fn new(input: ModelInput, timesteps: &[Timestep], dt: f64) -> Self {
        let sets = IndexUniverse::build(
            &input.urbs,
            &input.ext,
            &input.ext_config,
            timesteps,
            dt,
            None,
        )
        .unwrap();
        let mut problem = ProblemVariables::new();
        let vars = VariableRegistry::declare(&sets, &mut problem);
        Self {
            input,
            sets,
            vars,
            problem,
            dt,
        }
    }

    pub fn ctx(&self) -> RuleContext<'_> {
        let params = Parameters::new(&self.input, &self.sets, self.dt);
        RuleContext::new(&self.sets, params, &self.vars).unwrap()
    }
}

fn insert_ratio(table: &mut indexmap::IndexMap<(i32, String, String), f64>, pro: &str, com: &str, value: f64) {
    table.insert((2024, pro.to_string(), com.to_string()), value);
}

/// One site, one year: a coal plant with partial load, a PV park on limited land and a
/// fixed hydro plant serve an electricity demand.
pub fn outer_input() -> ModelInput {
    let mut input = ModelInput::default();
    let urbs = &mut input.urbs;
    let site = "Mid".to_string();
    for (name, com_type, price) in [
        ("Elec", CommodityType::Demand, 0.0),
        ("Coal", CommodityType::Stock, 7.0),
        ("Solar", CommodityType::SupIm, 0.0),
        ("CO2", CommodityType::Env, 3.0),
    ] {
        urbs.commodity.insert(
            (2024, site.clone(), name.to_string(), com_type),
            CommodityAttrs {
                price,
                ..Default::default()
            },
        );
    }
    urbs.site_area.insert((2024, site.clone()), 1000.0);
    urbs.process.insert(
        (2024, site.clone(), "Coal plant".to_string()),
        ProcessAttrs {
            cap_up: 500.0,
            max_grad: 0.5,
            min_fraction: 0.4,
            inv_cost: 600.0,
            fix_cost: 20.0,
            var_cost: 2.0,
            ..Default::default()
        },
    );
    urbs.process.insert(
        (2024, site.clone(), "Photovoltaics".to_string()),
        ProcessAttrs {
            inv_cost: 800.0,
            fix_cost: 10.0,
            area_per_cap: Some(2.0),
            ..Default::default()
        },
    );
    urbs.process.insert(
        (2024, site.clone(), "Hydro".to_string()),
        ProcessAttrs {
            inst_cap: 25.0,
            cap_up: 25.0,
            fix_cost: 5.0,
            ..Default::default()
        },
    );
    insert_ratio(&mut urbs.r_in, "Coal plant", "Coal", 2.5);
    insert_ratio(&mut urbs.r_out, "Coal plant", "Elec", 1.0);
    insert_ratio(&mut urbs.r_out, "Coal plant", "CO2", 0.9);
    insert_ratio(&mut urbs.r_in_min_fraction, "Coal plant", "Coal", 3.0);
    insert_ratio(&mut urbs.r_in, "Photovoltaics", "Solar", 1.0);
    insert_ratio(&mut urbs.r_out, "Photovoltaics", "Elec", 1.0);
    for (t, demand, solar) in [(1, 40.0, 0.5), (2, 50.0, 0.2)] {
        urbs.demand
            .insert((2024, site.clone(), "Elec".to_string(), t), demand);
        urbs.supim
            .insert((2024, site.clone(), "Solar".to_string(), t), solar);
    }
    input
}

/// Three years with electricity demand served only by the solar supply chain.
///
/// Demand rises by 5000 per year, so with a load factor of 0.1 over 1000 hours
/// capacity has to grow by 50 MW per year from 1000 MW installed.
pub fn ext_input() -> ModelInput {
    let mut input = ModelInput::default();
    let location = "EU27".to_string();
    for (stf, demand) in [(2024, 105_000.0), (2025, 110_000.0), (2026, 115_000.0)] {
        input.urbs.commodity.insert(
            (stf, location.clone(), "Elec".to_string(), CommodityType::Demand),
            CommodityAttrs::default(),
        );
        input
            .urbs
            .demand
            .insert((stf, location.clone(), "Elec".to_string(), 1), demand);
        let key = (stf, location.clone(), "solarPV".to_string());
        input.ext.import_cost.insert(key.clone(), 0.0);
        input.ext.manufacturing_cost.insert(key.clone(), 0.0);
        input.ext.remanufacturing_cost.insert(key.clone(), 0.0);
    }
    input.ext.technologies.insert(
        (location, "solarPV".to_string()),
        TechnologyParams {
            installed_capacity: 1000.0,
            existing_stock: 500.0,
            load_factor: 0.1,
            hours_per_year: 1000.0,
            ..Default::default()
        },
    );
    input.ext.learning_curves.insert(
        "solarPV".to_string(),
        LearningCurve {
            price_reduction: vec![0.0, 5.0, 10.0],
            capacity_threshold: vec![0.0, 1e5, 2e5],
        },
    );
    input.ext_config.start_year = 2024;
    input.ext_config.end_year = 2026;
    input.ext_config.learning_steps = 3;
    input.ext_config.gamma = 1e6;
    input.policy = PolicySwitches {
        stock_turnover: false,
        ..Default::default()
    };
    input
}
