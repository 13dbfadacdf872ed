//! Derivation of the index universe: every set and tuple set the model is indexed by.
//!
//! Tuples are only derived for combinations that are populated in the input. A process that
//! is declared but has no ratio rows simply gets no input/output tuples.
use indexmap::IndexSet;
use itertools::{Itertools, iproduct};
use log::{debug, warn};

use crate::general::error::ModelError;
use crate::model::tables::{
    CommodityType, ComKey, ExtConfig, ExtKey, ExtTables, ProComKey, ProKey, RatioKey, SiteKey,
    TechKey, Timestep, UrbsTables, Year,
};

/// All index sets and tuple sets of one model instance
#[derive(Debug, Clone, Default)]
pub struct IndexUniverse {
    pub timesteps: Vec<Timestep>,
    /// modelled timesteps, i.e. without the initialisation step
    pub modelled: Vec<Timestep>,
    pub years: Vec<Year>,
    pub sites: IndexSet<String>,
    pub commodities: IndexSet<String>,
    pub commodity_types: IndexSet<CommodityType>,
    pub processes: IndexSet<String>,

    pub sit_tuples: IndexSet<SiteKey>,
    pub com_tuples: IndexSet<ComKey>,
    pub pro_tuples: IndexSet<ProKey>,
    pub com_supim: IndexSet<String>,
    pub com_demand: IndexSet<String>,
    pub com_stock: IndexSet<String>,
    pub com_env: IndexSet<String>,
    pub pro_input_tuples: IndexSet<ProComKey>,
    pub pro_output_tuples: IndexSet<ProComKey>,
    pub pro_maxgrad_tuples: IndexSet<ProKey>,
    pub pro_partial_tuples: IndexSet<ProKey>,
    pub pro_partial_input_tuples: IndexSet<ProComKey>,
    pub pro_partial_output_tuples: IndexSet<ProComKey>,
    pub pro_area_tuples: IndexSet<ProKey>,
    pub pro_const_cap: IndexSet<ProKey>,

    pub ext_years: Vec<Year>,
    pub tech_tuples: IndexSet<TechKey>,
    pub ext_tuples: IndexSet<ExtKey>,
    pub learning_steps: Vec<usize>,
    pub intertemporal: bool,
}

impl IndexUniverse {
    /// Derives every set from the input tables.
    ///
    /// # Arguments
    /// * `timesteps` - ordered timesteps; the first one is the initialisation step
    /// * `dt` - timestep length in hours, used for the max-gradient filter
    /// * `intertemporal` - forces the inter-temporal mode; defaults to "more than one year"
    pub fn build(
        urbs: &UrbsTables,
        ext: &ExtTables,
        ext_config: &ExtConfig,
        timesteps: &[Timestep],
        dt: f64,
        intertemporal: Option<bool>,
    ) -> Result<Self, ModelError> {
        if timesteps.len() < 2 {
            return Err(ModelError::InvalidParameter {
                name: "timesteps".to_string(),
                detail: "need an initialisation step and at least one modelled step".to_string(),
            });
        }

        let mut sets = IndexUniverse {
            timesteps: timesteps.to_vec(),
            modelled: timesteps[1..].to_vec(),
            ..Default::default()
        };

        sets.years = urbs
            .commodity
            .keys()
            .map(|(stf, ..)| *stf)
            .unique()
            .sorted()
            .collect();
        for (_, sit, com, com_type) in urbs.commodity.keys() {
            sets.sites.insert(sit.clone());
            sets.commodities.insert(com.clone());
            sets.commodity_types.insert(*com_type);
        }
        sets.processes = urbs.process.keys().map(|(_, _, pro)| pro.clone()).collect();
        sets.intertemporal = intertemporal.unwrap_or(sets.years.len() > 1);

        sets.sit_tuples = urbs.site_area.keys().cloned().collect();
        sets.com_tuples = urbs.commodity.keys().cloned().collect();
        sets.pro_tuples = urbs.process.keys().cloned().collect();

        sets.com_supim = commodity_subset(&sets.com_tuples, CommodityType::SupIm);
        sets.com_demand = commodity_subset(&sets.com_tuples, CommodityType::Demand);
        sets.com_stock = commodity_subset(&sets.com_tuples, CommodityType::Stock);
        sets.com_env = commodity_subset(&sets.com_tuples, CommodityType::Env);

        sets.pro_input_tuples = join_ratio_keys(&sets.pro_tuples, urbs.r_in.keys());
        sets.pro_output_tuples = join_ratio_keys(&sets.pro_tuples, urbs.r_out.keys());

        sets.pro_maxgrad_tuples = urbs
            .process
            .iter()
            .filter(|(_, attrs)| attrs.max_grad < 1.0 / dt)
            .map(|(key, _)| key.clone())
            .collect();

        let partial_keys: IndexSet<(Year, &str)> = urbs
            .r_in_min_fraction
            .keys()
            .map(|(stf, pro, _)| (*stf, pro.as_str()))
            .collect();
        sets.pro_partial_tuples = sets
            .pro_tuples
            .iter()
            .filter(|(stf, _, pro)| partial_keys.contains(&(*stf, pro.as_str())))
            .cloned()
            .collect();
        sets.pro_partial_input_tuples =
            join_ratio_keys(&sets.pro_partial_tuples, urbs.r_in_min_fraction.keys());
        sets.pro_partial_output_tuples =
            join_ratio_keys(&sets.pro_partial_tuples, urbs.r_out_min_fraction.keys());

        sets.pro_area_tuples = urbs
            .process
            .iter()
            .filter(|(_, attrs)| attrs.area_per_cap.is_some_and(|area| !area.is_nan()))
            .map(|(key, _)| key.clone())
            .collect();
        sets.pro_const_cap = urbs
            .process
            .iter()
            .filter(|(_, attrs)| attrs.inst_cap == attrs.cap_up)
            .map(|(key, _)| key.clone())
            .collect();

        sets.tech_tuples = ext.technologies.keys().cloned().collect();
        if !sets.tech_tuples.is_empty() {
            if !sets.years.contains(&ext_config.start_year) {
                return Err(ModelError::not_in_domain("years", ext_config.start_year));
            }
            sets.ext_years = sets
                .years
                .iter()
                .copied()
                .filter(|year| (ext_config.start_year..=ext_config.end_year).contains(year))
                .collect();
            sets.ext_tuples = iproduct!(sets.ext_years.iter(), sets.tech_tuples.iter())
                .map(|(year, (location, tech))| (*year, location.clone(), tech.clone()))
                .collect();
            sets.learning_steps = (0..ext_config.learning_steps).collect();
            for location in sets.unmatched_locations() {
                warn!(
                    "Extension location '{location}' is not a site; its energy reaches no vertex"
                );
            }
        }

        if sets.pro_tuples.is_empty() {
            warn!("No processes defined; the model only balances commodities");
        }
        debug!(
            "Derived {} years, {} commodity tuples, {} process tuples, {} ext tuples",
            sets.years.len(),
            sets.com_tuples.len(),
            sets.pro_tuples.len(),
            sets.ext_tuples.len()
        );

        Ok(sets)
    }

    /// Extension locations without a commodity site of the same name
    pub fn unmatched_locations(&self) -> Vec<&str> {
        self.tech_tuples
            .iter()
            .map(|(location, _)| location.as_str())
            .filter(|location| !self.sites.contains(*location))
            .unique()
            .collect()
    }

    /// The year before `year` in the ordered year set
    pub fn previous_year(&self, year: Year) -> Option<Year> {
        let position = self.years.iter().position(|&y| y == year)?;
        position.checked_sub(1).map(|previous| self.years[previous])
    }

    /// The extension year before `year`, `None` at the start year
    pub fn previous_ext_year(&self, year: Year) -> Option<Year> {
        let position = self.ext_years.iter().position(|&y| y == year)?;
        position.checked_sub(1).map(|previous| self.ext_years[previous])
    }

    pub fn previous_timestep(&self, t: Timestep) -> Option<Timestep> {
        let position = self.timesteps.iter().position(|&step| step == t)?;
        position.checked_sub(1).map(|previous| self.timesteps[previous])
    }

    pub fn first_year(&self) -> Option<Year> {
        self.years.first().copied()
    }

    pub fn first_ext_year(&self) -> Option<Year> {
        self.ext_years.first().copied()
    }

    /// Distance to the next modelled year; the last year uses `last_weight`
    pub fn year_distance(&self, year: Year, last_weight: f64) -> f64 {
        match self.years.iter().position(|&y| y == year) {
            Some(position) if position + 1 < self.years.len() => {
                f64::from(self.years[position + 1] - year)
            }
            _ => last_weight,
        }
    }
}

/// Commodities of the given type at any site and year
fn commodity_subset(com_tuples: &IndexSet<ComKey>, com_type: CommodityType) -> IndexSet<String> {
    com_tuples
        .iter()
        .filter(|(_, _, _, ct)| *ct == com_type)
        .map(|(_, _, com, _)| com.clone())
        .collect()
}

/// Joins process tuples with ratio keys on matching (year, process)
fn join_ratio_keys<'a>(
    pro_tuples: &IndexSet<ProKey>,
    ratio_keys: impl Iterator<Item = &'a RatioKey> + Clone,
) -> IndexSet<ProComKey> {
    let mut tuples = IndexSet::new();
    for (stf, sit, pro) in pro_tuples {
        for (s, p, com) in ratio_keys.clone() {
            if p == pro && s == stf {
                tuples.insert((*stf, sit.clone(), pro.clone(), com.clone()));
            }
        }
    }
    tuples
}
