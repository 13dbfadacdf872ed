//! Domain-checked parameter lookups over the input tables.
//!
//! `Parameters` only borrows the tables, so whatever a scenario changed before the build is
//! exactly what the rules see.
use crate::general::error::ModelError;
use crate::model::sets::IndexUniverse;
use crate::model::tables::{
    ComKey, CommodityAttrs, ExtConfig, ExtKey, ExtTables, ModelInput, PolicySwitches, ProKey,
    ProcessAttrs, TechnologyParams, Timestep, UrbsTables, Year,
};

/// Hours of a full year, the reference for the timestep weight
const HOURS_PER_YEAR: f64 = 8760.0;

#[derive(Debug, Clone, Copy)]
pub struct Parameters<'a> {
    pub urbs: &'a UrbsTables,
    pub ext: &'a ExtTables,
    pub config: &'a ExtConfig,
    pub policy: &'a PolicySwitches,
    pub sets: &'a IndexUniverse,
    pub dt: f64,     // timestep length in hours
    pub weight: f64, // scales the modelled steps up to one year
}

impl<'a> Parameters<'a> {
    pub fn new(input: &'a ModelInput, sets: &'a IndexUniverse, dt: f64) -> Self {
        let modelled_hours = sets.modelled.len() as f64 * dt;
        Self {
            urbs: &input.urbs,
            ext: &input.ext,
            config: &input.ext_config,
            policy: &input.policy,
            sets,
            dt,
            weight: HOURS_PER_YEAR / modelled_hours,
        }
    }

    pub fn commodity(&self, key: &ComKey) -> Result<&'a CommodityAttrs, ModelError> {
        self.urbs
            .commodity
            .get(key)
            .ok_or_else(|| ModelError::not_in_domain("commodity", key))
    }

    /// Commodity attributes looked up without the type component
    pub fn commodity_of(
        &self,
        stf: Year,
        sit: &str,
        com: &str,
    ) -> Option<(&'a ComKey, &'a CommodityAttrs)> {
        self.urbs
            .commodity
            .iter()
            .find(|((s, site, name, _), _)| *s == stf && site == sit && name == com)
    }

    pub fn process(&self, key: &ProKey) -> Result<&'a ProcessAttrs, ModelError> {
        self.urbs
            .process
            .get(key)
            .ok_or_else(|| ModelError::not_in_domain("process", key))
    }

    pub fn r_in(&self, stf: Year, pro: &str, com: &str) -> Result<f64, ModelError> {
        ratio(&self.urbs.r_in, "r_in", stf, pro, com)
    }

    pub fn r_out(&self, stf: Year, pro: &str, com: &str) -> Result<f64, ModelError> {
        ratio(&self.urbs.r_out, "r_out", stf, pro, com)
    }

    pub fn r_in_min_fraction(&self, stf: Year, pro: &str, com: &str) -> Result<f64, ModelError> {
        ratio(&self.urbs.r_in_min_fraction, "r_in_min_fraction", stf, pro, com)
    }

    pub fn r_out_min_fraction(&self, stf: Year, pro: &str, com: &str) -> Result<f64, ModelError> {
        ratio(&self.urbs.r_out_min_fraction, "r_out_min_fraction", stf, pro, com)
    }

    /// Demand of a commodity, `None` where no demand series exists
    pub fn demand(&self, stf: Year, sit: &str, com: &str, t: Timestep) -> Option<f64> {
        self.urbs
            .demand
            .get(&(stf, sit.to_string(), com.to_string(), t))
            .copied()
    }

    pub fn supim(&self, stf: Year, sit: &str, com: &str, t: Timestep) -> Result<f64, ModelError> {
        let key = (stf, sit.to_string(), com.to_string(), t);
        self.urbs
            .supim
            .get(&key)
            .copied()
            .ok_or_else(|| ModelError::not_in_domain("supim", &key))
    }

    pub fn site_area(&self, stf: Year, sit: &str) -> Result<f64, ModelError> {
        let key = (stf, sit.to_string());
        self.urbs
            .site_area
            .get(&key)
            .copied()
            .ok_or_else(|| ModelError::not_in_domain("site", &key))
    }

    /// Global property of a year, `None` if it is not set
    pub fn global_prop(&self, stf: Year, name: &str) -> Option<f64> {
        self.urbs.global_prop.get(&(stf, name.to_string())).copied()
    }

    pub fn technology(&self, location: &str, tech: &str) -> Result<&'a TechnologyParams, ModelError> {
        let key = (location.to_string(), tech.to_string());
        self.ext
            .technologies
            .get(&key)
            .ok_or_else(|| ModelError::not_in_domain("technologies", &key))
    }

    pub fn import_cost(&self, key: &ExtKey) -> Result<f64, ModelError> {
        ext_value(&self.ext.import_cost, "import_cost", key)
    }

    pub fn manufacturing_cost(&self, key: &ExtKey) -> Result<f64, ModelError> {
        ext_value(&self.ext.manufacturing_cost, "manufacturing_cost", key)
    }

    pub fn remanufacturing_cost(&self, key: &ExtKey) -> Result<f64, ModelError> {
        ext_value(&self.ext.remanufacturing_cost, "remanufacturing_cost", key)
    }

    /// Exogenous ceiling on new capacity, `None` when the year has no entry
    pub fn installable_capacity(&self, key: &ExtKey) -> Option<f64> {
        self.ext.installable_capacity.get(key).copied()
    }

    /// Yearly content ratio, falling back to the technology scalar
    pub fn dcr(&self, key: &ExtKey) -> Result<f64, ModelError> {
        match self.ext.dcr.get(key) {
            Some(value) => Ok(*value),
            None => Ok(self.technology(&key.1, &key.2)?.dcr),
        }
    }

    pub fn stock_level(&self, key: &ExtKey) -> Option<f64> {
        self.ext.stock_level.get(key).copied()
    }

    pub fn milestone(&self, key: &ExtKey) -> Option<f64> {
        self.ext.milestones.get(key).copied()
    }

    /// Breakpoint `(P[n], Q[n])` of a technology's learning curve.
    ///
    /// Technologies without a curve, and steps past the end of a curve, map to zero.
    pub fn learning_point(&self, tech: &str, n: usize) -> (f64, f64) {
        match self.ext.learning_curves.get(tech) {
            Some(curve) => (
                curve.price_reduction.get(n).copied().unwrap_or(0.0),
                curve.capacity_threshold.get(n).copied().unwrap_or(0.0),
            ),
            None => (0.0, 0.0),
        }
    }

    /// Years represented by a support timeframe in the inter-temporal sums
    pub fn stf_dist(&self, stf: Year) -> f64 {
        let last_weight = self
            .sets
            .years
            .last()
            .and_then(|last| self.global_prop(*last, "Weight"))
            .unwrap_or(1.0);
        self.sets.year_distance(stf, last_weight)
    }
}

fn ratio(
    table: &indexmap::IndexMap<(Year, String, String), f64>,
    name: &'static str,
    stf: Year,
    pro: &str,
    com: &str,
) -> Result<f64, ModelError> {
    let key = (stf, pro.to_string(), com.to_string());
    table
        .get(&key)
        .copied()
        .ok_or_else(|| ModelError::not_in_domain(name, &key))
}

fn ext_value(
    table: &indexmap::IndexMap<ExtKey, f64>,
    name: &'static str,
    key: &ExtKey,
) -> Result<f64, ModelError> {
    table
        .get(key)
        .copied()
        .ok_or_else(|| ModelError::not_in_domain(name, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::sets::tests::sample_tables;
    use crate::model::tables::LearningCurve;

    fn input() -> ModelInput {
        let mut input = ModelInput {
            urbs: sample_tables(),
            ..Default::default()
        };
        input.ext.technologies.insert(
            ("EU27".to_string(), "solarPV".to_string()),
            TechnologyParams {
                dcr: 0.4,
                ..Default::default()
            },
        );
        input
            .ext
            .dcr
            .insert((2030, "EU27".to_string(), "solarPV".to_string()), 0.6);
        input.ext.learning_curves.insert(
            "solarPV".to_string(),
            LearningCurve {
                price_reduction: vec![0.0, 10.0],
                capacity_threshold: vec![0.0, 500.0],
            },
        );
        input
            .urbs
            .global_prop
            .insert((2030, "Weight".to_string()), 5.0);
        input
    }

    fn sets(input: &ModelInput) -> IndexUniverse {
        IndexUniverse::build(
            &input.urbs,
            &input.ext,
            &ExtConfig {
                start_year: 2020,
                ..Default::default()
            },
            &[0, 1, 2],
            2.0,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_weight_scales_modelled_hours_to_a_year() {
        let input = input();
        let sets = sets(&input);
        let params = Parameters::new(&input, &sets, 2.0);
        assert_eq!(params.weight, 8760.0 / 4.0);
    }

    #[test]
    fn test_missing_ratio_names_table_and_key() {
        let input = input();
        let sets = sets(&input);
        let params = Parameters::new(&input, &sets, 2.0);
        assert_eq!(params.r_in(2020, "Coal plant", "Coal").unwrap(), 2.5);
        let err = params.r_in(2020, "Coal plant", "Gas").unwrap_err();
        assert!(matches!(err, ModelError::IndexNotInDomain { table: "r_in", .. }));
    }

    #[test]
    fn test_dcr_falls_back_to_technology_scalar() {
        let input = input();
        let sets = sets(&input);
        let params = Parameters::new(&input, &sets, 2.0);
        let key = |y| (y, "EU27".to_string(), "solarPV".to_string());
        assert_eq!(params.dcr(&key(2030)).unwrap(), 0.6);
        assert_eq!(params.dcr(&key(2020)).unwrap(), 0.4);
        assert!(params.dcr(&(2020, "EU27".to_string(), "wind".to_string())).is_err());
    }

    #[test]
    fn test_learning_points_default_to_zero() {
        let input = input();
        let sets = sets(&input);
        let params = Parameters::new(&input, &sets, 2.0);
        assert_eq!(params.learning_point("solarPV", 1), (10.0, 500.0));
        assert_eq!(params.learning_point("solarPV", 6), (0.0, 0.0));
        assert_eq!(params.learning_point("windOnshore", 1), (0.0, 0.0));
    }

    #[test]
    fn test_stf_dist_uses_weight_for_last_year() {
        let input = input();
        let sets = sets(&input);
        let params = Parameters::new(&input, &sets, 2.0);
        assert_eq!(params.stf_dist(2020), 10.0);
        assert_eq!(params.stf_dist(2030), 5.0);
    }

    #[test]
    fn test_lookups_see_mutations_made_before_binding() {
        let mut input = input();
        input
            .urbs
            .r_in
            .insert((2020, "Coal plant".to_string(), "Coal".to_string()), 3.0);
        let sets = sets(&input);
        let params = Parameters::new(&input, &sets, 2.0);
        assert_eq!(params.r_in(2020, "Coal plant", "Coal").unwrap(), 3.0);
        assert_eq!(params.demand(2020, "Mid", "Elec", 1), None);
        assert!(params.commodity_of(2020, "Mid", "Coal").is_some());
    }
}
