//! Typed input tables, keyed by the index tuples of the model.
//!
//! These are the already-parsed tabular inputs. Scenario transforms mutate them in place
//! before a model is built; the parameter binder only ever borrows them.
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::general::error::ModelError;

pub type Year = i32;
pub type Timestep = u32;

/// (support timeframe, site)
pub type SiteKey = (Year, String);
/// (support timeframe, site, commodity, commodity type)
pub type ComKey = (Year, String, String, CommodityType);
/// (support timeframe, site, process)
pub type ProKey = (Year, String, String);
/// (support timeframe, site, process, commodity)
pub type ProComKey = (Year, String, String, String);
/// (support timeframe, process, commodity)
pub type RatioKey = (Year, String, String);
/// (support timeframe, site, commodity, timestep)
pub type SeriesKey = (Year, String, String, Timestep);
/// (location, technology)
pub type TechKey = (String, String);
/// (year, location, technology)
pub type ExtKey = (Year, String, String);

/// Role of a commodity at a site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CommodityType {
    SupIm,
    Demand,
    Stock,
    Env,
}

impl FromStr for CommodityType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "SupIm" => Ok(CommodityType::SupIm),
            "Demand" => Ok(CommodityType::Demand),
            "Stock" => Ok(CommodityType::Stock),
            "Env" => Ok(CommodityType::Env),
            other => Err(ModelError::InvalidParameter {
                name: "commodity type".to_string(),
                detail: format!("'{other}' is not one of SupIm, Demand, Stock, Env"),
            }),
        }
    }
}

impl fmt::Display for CommodityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommodityType::SupIm => "SupIm",
            CommodityType::Demand => "Demand",
            CommodityType::Stock => "Stock",
            CommodityType::Env => "Env",
        };
        f.write_str(name)
    }
}

/// Cost types of the energy-system model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CostType {
    Invest,
    Fixed,
    Variable,
    Fuel,
    Environmental,
    Revenue,
    Purchase,
}

impl CostType {
    pub const ALL: [CostType; 7] = [
        CostType::Invest,
        CostType::Fixed,
        CostType::Variable,
        CostType::Fuel,
        CostType::Environmental,
        CostType::Revenue,
        CostType::Purchase,
    ];
}

impl FromStr for CostType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CostType::ALL
            .into_iter()
            .find(|cost_type| cost_type.to_string() == s.trim())
            .ok_or_else(|| ModelError::UnknownCostType(s.to_string()))
    }
}

impl fmt::Display for CostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Cost types of the supply-chain extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExtCostType {
    Import,
    Storage,
    EuPrimary,
    EuSecondary,
}

impl ExtCostType {
    pub const ALL: [ExtCostType; 4] = [
        ExtCostType::Import,
        ExtCostType::Storage,
        ExtCostType::EuPrimary,
        ExtCostType::EuSecondary,
    ];
}

impl fmt::Display for ExtCostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Attributes of a commodity row
#[derive(Debug, Clone, PartialEq)]
pub struct CommodityAttrs {
    pub price: f64,
    pub max: f64,          // total annual limit
    pub max_per_hour: f64, // per-step limit, scaled by dt
    pub cost_factor: f64,
}

impl Default for CommodityAttrs {
    fn default() -> Self {
        Self {
            price: 0.0,
            max: f64::INFINITY,
            max_per_hour: f64::INFINITY,
            cost_factor: 1.0,
        }
    }
}

/// Attributes of a process row
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessAttrs {
    pub inst_cap: f64,
    pub cap_lo: f64,
    pub cap_up: f64,
    pub max_grad: f64,
    pub min_fraction: f64,
    pub inv_cost: f64,
    pub fix_cost: f64,
    pub var_cost: f64,
    pub invcost_factor: f64,
    pub overpay_factor: f64,
    pub cost_factor: f64,
    pub area_per_cap: Option<f64>,
    pub lifetime: f64,
}

impl Default for ProcessAttrs {
    fn default() -> Self {
        Self {
            inst_cap: 0.0,
            cap_lo: 0.0,
            cap_up: f64::INFINITY,
            max_grad: f64::INFINITY,
            min_fraction: 0.0,
            inv_cost: 0.0,
            fix_cost: 0.0,
            var_cost: 0.0,
            invcost_factor: 1.0,
            overpay_factor: 0.0,
            cost_factor: 1.0,
            area_per_cap: None,
            lifetime: f64::INFINITY,
        }
    }
}

/// Tables of the generic energy-system model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UrbsTables {
    pub commodity: IndexMap<ComKey, CommodityAttrs>,
    pub process: IndexMap<ProKey, ProcessAttrs>,
    pub r_in: IndexMap<RatioKey, f64>,
    pub r_out: IndexMap<RatioKey, f64>,
    pub r_in_min_fraction: IndexMap<RatioKey, f64>,
    pub r_out_min_fraction: IndexMap<RatioKey, f64>,
    pub site_area: IndexMap<SiteKey, f64>,
    pub demand: IndexMap<SeriesKey, f64>,
    pub supim: IndexMap<SeriesKey, f64>,
    /// (year, property) -> value, e.g. "CO2 limit", "Cost budget", "Weight"
    pub global_prop: IndexMap<(Year, String), f64>,
}

/// Scalars of one technology at one location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TechnologyParams {
    pub installed_capacity: f64, // capacity in the start year, MW
    pub existing_stock: f64,     // stockpile in the start year, MW
    pub storage_cost: f64,       // per MW held in stock
    pub turnover_factor: f64,    // FT
    pub anti_dumping_index: f64,
    pub dq_primary: f64,
    pub dq_secondary: f64,
    pub ir_primary: f64,
    pub ir_secondary: f64,
    pub dr_primary: f64,
    pub dr_secondary: f64,
    pub dcr: f64,
    pub load_factor: f64,
    pub hours_per_year: f64,
    pub turnover_window: u32, // n
    pub content_lag: i32,     // l
}

impl Default for TechnologyParams {
    fn default() -> Self {
        Self {
            installed_capacity: 0.0,
            existing_stock: 0.0,
            storage_cost: 0.0,
            turnover_factor: 0.0,
            anti_dumping_index: 0.0,
            dq_primary: 0.0,
            dq_secondary: 0.0,
            ir_primary: 0.0,
            ir_secondary: 0.0,
            dr_primary: 0.0,
            dr_secondary: 0.0,
            dcr: 1.0,
            load_factor: 1.0,
            hours_per_year: 8760.0,
            turnover_window: 5,
            content_lag: 1,
        }
    }
}

/// Breakpoints of a piecewise learning curve.
///
/// `price_reduction[n]` is the reduction reached in segment `n`, and
/// `capacity_threshold[n]` the cumulative secondary capacity needed to select it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningCurve {
    pub price_reduction: Vec<f64>,
    pub capacity_threshold: Vec<f64>,
}

/// Tables of the supply-chain extension
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtTables {
    pub technologies: IndexMap<TechKey, TechnologyParams>,
    pub import_cost: IndexMap<ExtKey, f64>,
    pub manufacturing_cost: IndexMap<ExtKey, f64>,
    pub remanufacturing_cost: IndexMap<ExtKey, f64>,
    pub installable_capacity: IndexMap<ExtKey, f64>,
    pub dcr: IndexMap<ExtKey, f64>,
    pub stock_level: IndexMap<ExtKey, f64>,
    pub milestones: IndexMap<ExtKey, f64>,
    /// keyed by technology
    pub learning_curves: IndexMap<String, LearningCurve>,
}

/// Which year's new capacity enters the growth recurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GrowthRecurrence {
    /// `capacity[y] = capacity[y-1] + capacity_new[y-1]`
    #[default]
    PreviousYearNew,
    /// `capacity[y] = capacity[y-1] + capacity_new[y]`
    SameYearNew,
}

/// Global scalars of the extension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtConfig {
    pub start_year: Year,
    pub end_year: Year,
    pub logistic_cost: f64, // surcharge factor on stock-routed imports
    pub gamma: f64,         // big-M
    pub turnover_years: Vec<Year>,
    pub turnover_offset: i32,
    pub growth: GrowthRecurrence,
    pub learning_steps: usize,
}

impl Default for ExtConfig {
    fn default() -> Self {
        Self {
            start_year: 2024,
            end_year: 2050,
            logistic_cost: 15.0,
            gamma: 1e10,
            turnover_years: vec![2025, 2030, 2035, 2040, 2045, 2050],
            turnover_offset: 5,
            growth: GrowthRecurrence::PreviousYearNew,
            learning_steps: 7,
        }
    }
}

/// Optional policy rules, switched on per scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySwitches {
    pub nzia_benchmark: Option<f64>, // minimum domestic share of new capacity
    pub milestones: bool,
    pub max_stock_import_fraction: Option<f64>,
    pub min_stock_level: bool,
    pub stock_turnover: bool,
}

impl Default for PolicySwitches {
    fn default() -> Self {
        Self {
            nzia_benchmark: None,
            milestones: false,
            max_stock_import_fraction: None,
            min_stock_level: false,
            stock_turnover: true,
        }
    }
}

/// Everything a model is built from. Each scenario works on its own clone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelInput {
    pub urbs: UrbsTables,
    pub ext: ExtTables,
    pub ext_config: ExtConfig,
    pub policy: PolicySwitches,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_type_from_str() {
        assert_eq!("Invest".parse::<CostType>().unwrap(), CostType::Invest);
        assert_eq!(" Fuel ".parse::<CostType>().unwrap(), CostType::Fuel);
        assert_eq!(
            "Subsidy".parse::<CostType>(),
            Err(ModelError::UnknownCostType("Subsidy".to_string()))
        );
    }

    #[test]
    fn test_commodity_type_round_trips_through_display() {
        for com_type in [
            CommodityType::SupIm,
            CommodityType::Demand,
            CommodityType::Stock,
            CommodityType::Env,
        ] {
            assert_eq!(com_type.to_string().parse::<CommodityType>().unwrap(), com_type);
        }
        assert!("Buy".parse::<CommodityType>().is_err());
    }

    #[test]
    fn test_growth_recurrence_serde_names() {
        let config: ExtConfig = toml::from_str("growth = \"same-year-new\"").unwrap();
        assert_eq!(config.growth, GrowthRecurrence::SameYearNew);
        assert_eq!(config.logistic_cost, 15.0);
    }
}
