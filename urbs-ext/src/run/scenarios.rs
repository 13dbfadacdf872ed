//! Named scenario transforms, applied once to a fresh copy of the input before a model is built.
use anyhow::{Context, Result};
use indexmap::IndexMap;
use itertools::Itertools;
use log::warn;

use crate::model::outer::CO2;
use crate::model::tables::{CommodityType, ExtKey, ModelInput, TechnologyParams, Year};

/// Stock commodities whose price moves with the fossil price level
const FOSSIL_FUELS: [&str; 4] = ["Lignite", "Gas", "Coal", "Nuclear Fuel"];

/// Import cost multiplier that makes imports prohibitive
const IMPORT_STOP_FACTOR: f64 = 9_999_999_999_999.0;

pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    pub apply: fn(&mut ModelInput),
}

pub const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "base",
        description: "Input as loaded",
        apply: base,
    },
    Scenario {
        name: "co2_price_70_until_2030",
        description: "CO2 price of 70 in the years before 2030",
        apply: co2_price_70_until_2030,
    },
    Scenario {
        name: "high_fossil_co2",
        description: "CO2 price of 250, fossil fuel prices x1.5",
        apply: high_fossil_co2,
    },
    Scenario {
        name: "low_co2_price",
        description: "CO2 price held at 65",
        apply: low_co2_price,
    },
    Scenario {
        name: "import_cost_double_2035",
        description: "Import cost x2 from 2035, anti-dumping index +0.05",
        apply: import_cost_double_2035,
    },
    Scenario {
        name: "import_stop_2035",
        description: "Prohibitive import cost from 2035, stock turnover enforced",
        apply: import_stop_2035,
    },
    Scenario {
        name: "import_cost_spike_2035",
        description: "Import cost ramps to x2 over 2030-2035 and back to the 2040 level by 2040",
        apply: import_cost_spike_2035,
    },
    Scenario {
        name: "installable_dip_2040",
        description: "Installable capacity 56 000 MW falling to 40 000 MW in 2040, 60 000 MW in 2050",
        apply: installable_dip_2040,
    },
    Scenario {
        name: "installable_growth_10pct",
        description: "Installable capacity growing 10 % a year from 56 000 MW",
        apply: installable_growth_10pct,
    },
    Scenario {
        name: "ramp_boost",
        description: "Domestic ramp-up rates +0.1",
        apply: ramp_boost,
    },
    Scenario {
        name: "decline_floor_strict",
        description: "Domestic decline rate 0.35",
        apply: decline_floor_strict,
    },
    Scenario {
        name: "decline_floor_relaxed",
        description: "Domestic decline rate 0.2",
        apply: decline_floor_relaxed,
    },
    Scenario {
        name: "installable_plus_10",
        description: "Installable capacity x1.1",
        apply: installable_plus_10,
    },
    Scenario {
        name: "installable_minus_20",
        description: "Installable capacity x0.8",
        apply: installable_minus_20,
    },
    Scenario {
        name: "primary_cost_cut_2030",
        description: "Domestic manufacturing cost x0.6 from 2030",
        apply: primary_cost_cut_2030,
    },
    Scenario {
        name: "secondary_cost_cut",
        description: "Remanufacturing cost x0.8",
        apply: secondary_cost_cut,
    },
    Scenario {
        name: "nzia_benchmark",
        description: "At least 40 % of new capacity manufactured domestically",
        apply: nzia_benchmark,
    },
    Scenario {
        name: "min_stock",
        description: "Stock kept above the configured minimum level",
        apply: min_stock,
    },
];

/// Looks a scenario up by name
pub fn find(name: &str) -> Result<&'static Scenario> {
    SCENARIOS
        .iter()
        .find(|scenario| scenario.name == name)
        .with_context(|| {
            format!(
                "Unknown scenario '{name}'. Known scenarios: {}",
                SCENARIOS.iter().map(|s| s.name).join(", ")
            )
        })
}

/// Runs a scenario on a copy of `input`
pub fn prepare(scenario: &Scenario, input: &ModelInput) -> ModelInput {
    let mut input = input.clone();
    (scenario.apply)(&mut input);
    input
}

fn base(_input: &mut ModelInput) {}

fn set_co2_price(input: &mut ModelInput, price: f64, years: impl Fn(Year) -> bool) {
    for ((stf, _, com, com_type), attrs) in input.urbs.commodity.iter_mut() {
        if com == CO2 && *com_type == CommodityType::Env && years(*stf) {
            attrs.price = price;
        }
    }
}

fn co2_price_70_until_2030(input: &mut ModelInput) {
    set_co2_price(input, 70.0, |year| year < 2030);
}

fn high_fossil_co2(input: &mut ModelInput) {
    set_co2_price(input, 250.0, |_| true);
    for ((_, _, com, com_type), attrs) in input.urbs.commodity.iter_mut() {
        if *com_type == CommodityType::Stock && FOSSIL_FUELS.contains(&com.as_str()) {
            attrs.price *= 1.5;
        }
    }
}

fn low_co2_price(input: &mut ModelInput) {
    set_co2_price(input, 65.0, |_| true);
}

/// Multiplies every entry of a yearly extension table from `from` on
fn scale_from(table: &mut IndexMap<ExtKey, f64>, from: Year, factor: f64) {
    for ((year, _, _), value) in table.iter_mut() {
        if *year >= from {
            *value *= factor;
        }
    }
}

fn for_each_technology(input: &mut ModelInput, f: impl Fn(&mut TechnologyParams)) {
    input.ext.technologies.values_mut().for_each(f);
}

fn import_cost_double_2035(input: &mut ModelInput) {
    scale_from(&mut input.ext.import_cost, 2035, 2.0);
    for_each_technology(input, |tech| tech.anti_dumping_index += 0.05);
}

fn import_stop_2035(input: &mut ModelInput) {
    scale_from(&mut input.ext.import_cost, 2035, IMPORT_STOP_FACTOR);
    input.policy.stock_turnover = true;
}

fn import_cost_spike_2035(input: &mut ModelInput) {
    let technologies: Vec<(String, String)> = input.ext.technologies.keys().cloned().collect();
    let table = &mut input.ext.import_cost;
    for (location, tech) in technologies {
        let at = |year: Year| (year, location.clone(), tech.clone());
        let (Some(base_2030), Some(base_2040)) =
            (table.get(&at(2030)).copied(), table.get(&at(2040)).copied())
        else {
            warn!("No 2030/2040 import cost for {location} {tech}, spike not applied");
            continue;
        };
        for year in 2030..=2035 {
            let factor = 1.0 + f64::from(year - 2030) / 5.0;
            table.insert(at(year), base_2030 * factor);
        }
        for year in 2036..=2040 {
            let factor = f64::from(2040 - year) / 5.0;
            table.insert(at(year), base_2040 + (2.0 * base_2030 - base_2040) * factor);
        }
    }
}

fn installable_dip_2040(input: &mut ModelInput) {
    let technologies: Vec<(String, String)> = input.ext.technologies.keys().cloned().collect();
    for (location, tech) in technologies {
        for year in 2024..=2050 {
            let capacity = if year <= 2040 {
                56_000.0 - 16_000.0 * f64::from(year - 2024) / 16.0
            } else {
                40_000.0 + 20_000.0 * f64::from(year - 2040) / 10.0
            };
            input
                .ext
                .installable_capacity
                .insert((year, location.clone(), tech.clone()), capacity);
        }
    }
}

fn installable_growth_10pct(input: &mut ModelInput) {
    for ((year, _, _), value) in input.ext.installable_capacity.iter_mut() {
        if *year >= 2024 {
            *value = 56_000.0 * 1.1_f64.powi(*year - 2024);
        }
    }
}

fn ramp_boost(input: &mut ModelInput) {
    for_each_technology(input, |tech| {
        tech.ir_primary += 0.1;
        tech.ir_secondary += 0.1;
    });
}

fn decline_floor_strict(input: &mut ModelInput) {
    for_each_technology(input, |tech| {
        tech.dr_primary = 0.35;
        tech.dr_secondary = 0.35;
    });
}

fn decline_floor_relaxed(input: &mut ModelInput) {
    for_each_technology(input, |tech| {
        tech.dr_primary = 0.2;
        tech.dr_secondary = 0.2;
    });
}

fn installable_plus_10(input: &mut ModelInput) {
    scale_from(&mut input.ext.installable_capacity, 2024, 1.1);
}

fn installable_minus_20(input: &mut ModelInput) {
    scale_from(&mut input.ext.installable_capacity, 2024, 0.8);
}

fn primary_cost_cut_2030(input: &mut ModelInput) {
    scale_from(&mut input.ext.manufacturing_cost, 2030, 0.6);
}

fn secondary_cost_cut(input: &mut ModelInput) {
    scale_from(&mut input.ext.remanufacturing_cost, Year::MIN, 0.8);
}

fn nzia_benchmark(input: &mut ModelInput) {
    input.policy.nzia_benchmark = Some(0.4);
}

fn min_stock(input: &mut ModelInput) {
    input.policy.min_stock_level = true;
}
