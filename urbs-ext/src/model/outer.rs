//! Rules of the generic energy-system model: commodity vertices, process operation,
//! capacity and area limits, global limits and the cost definitions.
use good_lp::Expression;

use crate::general::error::ModelError;
use crate::model::context::RuleContext;
use crate::model::params::Parameters;
use crate::model::rule::Rule;
use crate::model::sets::IndexUniverse;
use crate::model::tables::{
    ComKey, CommodityType, CostType, ProComKey, ProKey, SiteKey, Timestep, Year,
};
use crate::model::variables::VariableRegistry;

pub const ELEC: &str = "Elec";
pub const CO2: &str = "CO2";

/// Capacity of a process as an expression of the new-capacity variables.
///
/// Constant-capacity processes (inst-cap equal to cap-up) contribute their installed capacity
/// only. In the inter-temporal mode, capacity built in an earlier year counts as long as it is
/// within its lifetime, and the installed capacity of the first year lasts for that year's
/// lifetime.
pub fn process_capacity(
    sets: &IndexUniverse,
    params: &Parameters,
    vars: &VariableRegistry,
    key: &ProKey,
) -> Result<Expression, ModelError> {
    let attrs = params.process(key)?;
    if sets.pro_const_cap.contains(key) {
        return Ok(Expression::from(attrs.inst_cap));
    }
    if !sets.intertemporal {
        return Ok(vars.cap_pro_new(key)? + attrs.inst_cap);
    }

    let (stf, sit, pro) = key;
    let mut capacity = Expression::default();
    for built in sets.years.iter().filter(|year| *year <= stf) {
        let built_key = (*built, sit.clone(), pro.clone());
        let Some(new) = vars.cap_pro_new.get(&built_key) else {
            continue;
        };
        let lifetime = params.process(&built_key)?.lifetime;
        if f64::from(stf - built) < lifetime {
            capacity += *new;
        }
    }
    if let Some(first) = sets.first_year() {
        let first_key = (first, sit.clone(), pro.clone());
        if let Some(first_attrs) = params.urbs.process.get(&first_key) {
            if f64::from(stf - first) < first_attrs.lifetime {
                capacity += first_attrs.inst_cap;
            }
        }
    }
    Ok(capacity)
}

/// Commodity vertex: generation, stock purchase and supply-chain energy cover demand.
pub fn res_vertex(ctx: &RuleContext, index: &(Timestep, ComKey)) -> Result<Rule, ModelError> {
    let (t, (stf, sit, com, com_type)) = index;
    if matches!(com_type, CommodityType::SupIm | CommodityType::Env) {
        return Ok(Rule::Skip);
    }

    let mut power_surplus = -ctx.vars.commodity_balance(ctx.sets, *t, *stf, sit, com);
    if com == ELEC {
        // unscaled by dt, as the yearly supply-chain energy of the site
        for (_, ext) in ctx
            .vars
            .ext
            .iter()
            .filter(|((year, location, _), _)| year == stf && location == sit)
        {
            power_surplus += ext.balance;
        }
    }
    if ctx.sets.com_stock.contains(com) {
        if let Some(stock) = ctx.vars.e_co_stock.get(&(*t, index.1.clone())) {
            power_surplus += *stock;
        }
    }
    if let Some(demand) = ctx.params.demand(*stf, sit, com, *t) {
        power_surplus -= demand;
    }
    Ok(Rule::eq(power_surplus, 0.0))
}

/// Stock purchase per timestep
pub fn res_stock_step(ctx: &RuleContext, index: &(Timestep, ComKey)) -> Result<Rule, ModelError> {
    let (t, key) = index;
    if key.3 != CommodityType::Stock {
        return Ok(Rule::Skip);
    }
    let max_per_hour = ctx.params.commodity(key)?.max_per_hour;
    if max_per_hour.is_infinite() {
        return Ok(Rule::Skip);
    }
    Ok(Rule::le(
        ctx.vars.e_co_stock(*t, key)?,
        ctx.params.dt * max_per_hour,
    ))
}

/// Annual stock purchase
pub fn res_stock_total(ctx: &RuleContext, key: &ComKey) -> Result<Rule, ModelError> {
    if key.3 != CommodityType::Stock {
        return Ok(Rule::Skip);
    }
    let max = ctx.params.commodity(key)?.max;
    if max.is_infinite() {
        return Ok(Rule::Skip);
    }
    let mut total = Expression::default();
    for t in &ctx.sets.modelled {
        total.add_mul(ctx.params.weight, ctx.vars.e_co_stock(*t, key)?);
    }
    Ok(Rule::le(total, max))
}

/// Environmental output per timestep
pub fn res_env_step(ctx: &RuleContext, index: &(Timestep, ComKey)) -> Result<Rule, ModelError> {
    let (t, key) = index;
    let (stf, sit, com, com_type) = key;
    if *com_type != CommodityType::Env {
        return Ok(Rule::Skip);
    }
    let max_per_hour = ctx.params.commodity(key)?.max_per_hour;
    if max_per_hour.is_infinite() {
        return Ok(Rule::Skip);
    }
    let output = -ctx.vars.commodity_balance(ctx.sets, *t, *stf, sit, com);
    Ok(Rule::le(output, ctx.params.dt * max_per_hour))
}

/// Annual environmental output
pub fn res_env_total(ctx: &RuleContext, key: &ComKey) -> Result<Rule, ModelError> {
    let (stf, sit, com, com_type) = key;
    if *com_type != CommodityType::Env {
        return Ok(Rule::Skip);
    }
    let max = ctx.params.commodity(key)?.max;
    if max.is_infinite() {
        return Ok(Rule::Skip);
    }
    let mut total = Expression::default();
    for t in &ctx.sets.modelled {
        total.add_mul(
            -ctx.params.weight,
            ctx.vars.commodity_balance(ctx.sets, *t, *stf, sit, com),
        );
    }
    Ok(Rule::le(total, max))
}

/// Process input follows throughput; partial-load inputs are handled separately
pub fn def_process_input(
    ctx: &RuleContext,
    index: &(Timestep, ProComKey),
) -> Result<Rule, ModelError> {
    let (t, key) = index;
    if ctx.sets.pro_partial_input_tuples.contains(key) {
        return Ok(Rule::Skip);
    }
    let (stf, sit, pro, com) = key;
    let tau = ctx.vars.tau_pro(*t, &(*stf, sit.clone(), pro.clone()))?;
    Ok(Rule::eq(
        ctx.vars.e_pro_in(*t, key)?,
        tau * ctx.params.r_in(*stf, pro, com)?,
    ))
}

pub fn def_process_output(
    ctx: &RuleContext,
    index: &(Timestep, ProComKey),
) -> Result<Rule, ModelError> {
    let (t, key) = index;
    if ctx.sets.pro_partial_output_tuples.contains(key) {
        return Ok(Rule::Skip);
    }
    let (stf, sit, pro, com) = key;
    let tau = ctx.vars.tau_pro(*t, &(*stf, sit.clone(), pro.clone()))?;
    Ok(Rule::eq(
        ctx.vars.e_pro_out(*t, key)?,
        tau * ctx.params.r_out(*stf, pro, com)?,
    ))
}

/// Intermittent inputs are fixed by the installed capacity and the supply series
pub fn def_intermittent_supply(
    ctx: &RuleContext,
    index: &(Timestep, ProComKey),
) -> Result<Rule, ModelError> {
    let (t, key) = index;
    let (stf, sit, pro, com) = key;
    if !ctx.sets.com_supim.contains(com) {
        return Ok(Rule::Skip);
    }
    let cap_pro = ctx.cap_pro(&(*stf, sit.clone(), pro.clone()))?;
    let supim = ctx.params.supim(*stf, sit, com, *t)?;
    Ok(Rule::eq(
        ctx.vars.e_pro_in(*t, key)?,
        cap_pro.clone() * (supim * ctx.params.dt),
    ))
}

pub fn res_process_throughput_by_capacity(
    ctx: &RuleContext,
    index: &(Timestep, ProKey),
) -> Result<Rule, ModelError> {
    let (t, key) = index;
    Ok(Rule::le(
        ctx.vars.tau_pro(*t, key)?,
        ctx.cap_pro(key)?.clone() * ctx.params.dt,
    ))
}

/// Ramp-down limit between consecutive timesteps
pub fn res_process_maxgrad_lower(
    ctx: &RuleContext,
    index: &(Timestep, ProKey),
) -> Result<Rule, ModelError> {
    let (t, key) = index;
    let Some(previous) = ctx.sets.previous_timestep(*t) else {
        return Ok(Rule::Skip);
    };
    let ramp = ctx.cap_pro(key)?.clone() * (ctx.params.process(key)?.max_grad * ctx.params.dt);
    Ok(Rule::ge(
        ctx.vars.tau_pro(*t, key)?,
        ctx.vars.tau_pro(previous, key)? - ramp,
    ))
}

/// Ramp-up limit between consecutive timesteps
pub fn res_process_maxgrad_upper(
    ctx: &RuleContext,
    index: &(Timestep, ProKey),
) -> Result<Rule, ModelError> {
    let (t, key) = index;
    let Some(previous) = ctx.sets.previous_timestep(*t) else {
        return Ok(Rule::Skip);
    };
    let ramp = ctx.cap_pro(key)?.clone() * (ctx.params.process(key)?.max_grad * ctx.params.dt);
    Ok(Rule::le(
        ctx.vars.tau_pro(*t, key)?,
        ctx.vars.tau_pro(previous, key)? + ramp,
    ))
}

/// Partial-load processes run at least at their minimum fraction
pub fn res_throughput_by_capacity_min(
    ctx: &RuleContext,
    index: &(Timestep, ProKey),
) -> Result<Rule, ModelError> {
    let (t, key) = index;
    let min_fraction = ctx.params.process(key)?.min_fraction;
    Ok(Rule::ge(
        ctx.vars.tau_pro(*t, key)?,
        ctx.cap_pro(key)?.clone() * (min_fraction * ctx.params.dt),
    ))
}

/// Online and throughput factors of the two-point partial-load line.
///
/// `ratio` applies at full load, `ratio_min` at the minimum fraction.
fn partial_factors(
    key: &ProComKey,
    min_fraction: f64,
    ratio: f64,
    ratio_min: f64,
) -> Result<(f64, f64), ModelError> {
    if min_fraction >= 1.0 {
        return Err(ModelError::InvalidParameter {
            name: format!("min-fraction of {key:?}"),
            detail: format!("{min_fraction} leaves no partial-load range"),
        });
    }
    let online = min_fraction * (ratio_min - ratio) / (1.0 - min_fraction);
    let throughput = (ratio - min_fraction * ratio_min) / (1.0 - min_fraction);
    Ok((online, throughput))
}

pub fn def_partial_process_input(
    ctx: &RuleContext,
    index: &(Timestep, ProComKey),
) -> Result<Rule, ModelError> {
    let (t, key) = index;
    let (stf, sit, pro, com) = key;
    let pro_key = (*stf, sit.clone(), pro.clone());
    let (online, throughput) = partial_factors(
        key,
        ctx.params.process(&pro_key)?.min_fraction,
        ctx.params.r_in(*stf, pro, com)?,
        ctx.params.r_in_min_fraction(*stf, pro, com)?,
    )?;
    let mut flow = ctx.cap_pro(&pro_key)?.clone() * (ctx.params.dt * online);
    flow.add_mul(throughput, ctx.vars.tau_pro(*t, &pro_key)?);
    Ok(Rule::eq(ctx.vars.e_pro_in(*t, key)?, flow))
}

pub fn def_partial_process_output(
    ctx: &RuleContext,
    index: &(Timestep, ProComKey),
) -> Result<Rule, ModelError> {
    let (t, key) = index;
    let (stf, sit, pro, com) = key;
    let pro_key = (*stf, sit.clone(), pro.clone());
    let (online, throughput) = partial_factors(
        key,
        ctx.params.process(&pro_key)?.min_fraction,
        ctx.params.r_out(*stf, pro, com)?,
        ctx.params.r_out_min_fraction(*stf, pro, com)?,
    )?;
    let mut flow = ctx.cap_pro(&pro_key)?.clone() * (ctx.params.dt * online);
    flow.add_mul(throughput, ctx.vars.tau_pro(*t, &pro_key)?);
    Ok(Rule::eq(ctx.vars.e_pro_out(*t, key)?, flow))
}

pub fn res_process_capacity_lower(ctx: &RuleContext, key: &ProKey) -> Result<Rule, ModelError> {
    let cap_lo = ctx.params.process(key)?.cap_lo;
    if ctx.sets.pro_const_cap.contains(key) || cap_lo <= 0.0 {
        return Ok(Rule::Skip);
    }
    Ok(Rule::ge(ctx.cap_pro(key)?.clone(), cap_lo))
}

pub fn res_process_capacity_upper(ctx: &RuleContext, key: &ProKey) -> Result<Rule, ModelError> {
    let cap_up = ctx.params.process(key)?.cap_up;
    if ctx.sets.pro_const_cap.contains(key) || cap_up.is_infinite() {
        return Ok(Rule::Skip);
    }
    Ok(Rule::le(ctx.cap_pro(key)?.clone(), cap_up))
}

/// Land use of area-restricted processes at a site
pub fn res_area(ctx: &RuleContext, key: &SiteKey) -> Result<Rule, ModelError> {
    let (stf, sit) = key;
    let area = ctx.params.site_area(*stf, sit)?;
    let mut total_area_per_cap = 0.0;
    let mut occupied = Expression::default();
    for pro_key in ctx
        .sets
        .pro_area_tuples
        .iter()
        .filter(|(s, site, _)| s == stf && site == sit)
    {
        let area_per_cap = ctx.params.process(pro_key)?.area_per_cap.unwrap_or(0.0);
        total_area_per_cap += area_per_cap;
        occupied.add_mul(area_per_cap, ctx.cap_pro(pro_key)?);
    }
    if area < 0.0 || area.is_infinite() || total_area_per_cap <= 0.0 {
        return Ok(Rule::Skip);
    }
    Ok(Rule::le(occupied, area))
}

/// Weighted CO2 output of one support timeframe, summed over sites and timesteps
fn co2_output(ctx: &RuleContext, stf: Year) -> Expression {
    let mut output = Expression::default();
    for (s, sit, com, com_type) in &ctx.sets.com_tuples {
        if *s != stf || com != CO2 || *com_type != CommodityType::Env {
            continue;
        }
        for t in &ctx.sets.modelled {
            output.add_mul(
                -ctx.params.weight,
                ctx.vars.commodity_balance(ctx.sets, *t, stf, sit, com),
            );
        }
    }
    output
}

/// A usable limit: present, finite and non-negative
fn finite_limit(value: Option<f64>) -> Option<f64> {
    value.filter(|limit| limit.is_finite() && *limit >= 0.0)
}

pub fn res_global_co2_limit(ctx: &RuleContext, stf: &Year) -> Result<Rule, ModelError> {
    let Some(limit) = finite_limit(ctx.params.global_prop(*stf, "CO2 limit")) else {
        return Ok(Rule::Skip);
    };
    Ok(Rule::le(co2_output(ctx, *stf), limit))
}

/// CO2 over the whole horizon, each year weighted by the years it represents
pub fn co2_total(ctx: &RuleContext) -> Expression {
    let mut total = Expression::default();
    for stf in &ctx.sets.years {
        let dist = if ctx.sets.intertemporal {
            ctx.params.stf_dist(*stf)
        } else {
            1.0
        };
        total.add_mul(dist, co2_output(ctx, *stf));
    }
    total
}

pub fn res_global_co2_budget(ctx: &RuleContext, _index: &()) -> Result<Rule, ModelError> {
    let first = ctx.sets.first_year();
    let Some(budget) = finite_limit(first.and_then(|y| ctx.params.global_prop(y, "CO2 budget")))
    else {
        return Ok(Rule::Skip);
    };
    Ok(Rule::le(co2_total(ctx), budget))
}

fn total_costs(ctx: &RuleContext) -> Expression {
    ctx.vars.costs.values().copied().sum()
}

pub fn res_global_cost_limit(ctx: &RuleContext, stf: &Year) -> Result<Rule, ModelError> {
    let Some(limit) = finite_limit(ctx.params.global_prop(*stf, "Cost limit")) else {
        return Ok(Rule::Skip);
    };
    Ok(Rule::le(total_costs(ctx), limit))
}

pub fn res_global_cost_budget(ctx: &RuleContext, _index: &()) -> Result<Rule, ModelError> {
    let first = ctx.sets.first_year();
    let Some(budget) = finite_limit(first.and_then(|y| ctx.params.global_prop(y, "Cost budget")))
    else {
        return Ok(Rule::Skip);
    };
    Ok(Rule::le(total_costs(ctx), budget))
}

/// Invest cost of one process, net of the overpay share in the inter-temporal mode
fn invest_cost(ctx: &RuleContext, key: &ProKey) -> Result<Expression, ModelError> {
    let Some(new) = ctx.vars.cap_pro_new.get(key) else {
        return Ok(Expression::default());
    };
    let attrs = ctx.params.process(key)?;
    let mut factor = attrs.inv_cost * attrs.invcost_factor;
    if ctx.sets.intertemporal {
        factor -= attrs.inv_cost * attrs.overpay_factor;
    }
    Ok(*new * factor)
}

fn fixed_cost(ctx: &RuleContext, key: &ProKey) -> Result<Expression, ModelError> {
    let attrs = ctx.params.process(key)?;
    Ok(ctx.cap_pro(key)?.clone() * (attrs.fix_cost * attrs.cost_factor))
}

fn variable_cost(ctx: &RuleContext, key: &ProKey) -> Result<Expression, ModelError> {
    let attrs = ctx.params.process(key)?;
    let factor = ctx.params.weight * attrs.var_cost * attrs.cost_factor;
    let mut cost = Expression::default();
    for t in &ctx.sets.modelled {
        cost.add_mul(factor, ctx.vars.tau_pro(*t, key)?);
    }
    Ok(cost)
}

/// Aggregate cost of one cost type
pub fn def_costs(ctx: &RuleContext, cost_type: &CostType) -> Result<Rule, ModelError> {
    let mut cost = Expression::default();
    match cost_type {
        CostType::Invest => {
            for key in &ctx.sets.pro_tuples {
                cost += invest_cost(ctx, key)?;
            }
        }
        CostType::Fixed => {
            for key in &ctx.sets.pro_tuples {
                cost += fixed_cost(ctx, key)?;
            }
        }
        CostType::Variable => {
            for key in &ctx.sets.pro_tuples {
                cost += variable_cost(ctx, key)?;
            }
        }
        CostType::Fuel => {
            for ((_, key), stock) in &ctx.vars.e_co_stock {
                let attrs = ctx.params.commodity(key)?;
                cost.add_mul(ctx.params.weight * attrs.price * attrs.cost_factor, *stock);
            }
        }
        CostType::Environmental => {
            for key in &ctx.sets.com_tuples {
                let (stf, sit, com, com_type) = key;
                if *com_type != CommodityType::Env {
                    continue;
                }
                let attrs = ctx.params.commodity(key)?;
                let factor = -ctx.params.weight * attrs.price * attrs.cost_factor;
                for t in &ctx.sets.modelled {
                    cost.add_mul(
                        factor,
                        ctx.vars.commodity_balance(ctx.sets, *t, *stf, sit, com),
                    );
                }
            }
        }
        // buy/sell markets are not modelled
        CostType::Revenue | CostType::Purchase => {}
    }
    Ok(Rule::eq(ctx.vars.cost(*cost_type)?, cost))
}

/// Cost of one process and cost type, the reporting view of `def_costs`
pub fn def_specific_process_costs(
    ctx: &RuleContext,
    index: &(ProKey, CostType),
) -> Result<Rule, ModelError> {
    let (key, cost_type) = index;
    let (stf, sit, pro) = key;
    let cost = match cost_type {
        CostType::Invest => invest_cost(ctx, key)?,
        CostType::Fixed => fixed_cost(ctx, key)?,
        CostType::Variable => variable_cost(ctx, key)?,
        CostType::Fuel => {
            let mut cost = Expression::default();
            for flow_key in ctx
                .sets
                .pro_input_tuples
                .iter()
                .filter(|(s, site, p, _)| s == stf && site == sit && p == pro)
            {
                let Some((com_key, attrs)) = ctx.params.commodity_of(*stf, sit, &flow_key.3)
                else {
                    continue;
                };
                if com_key.3 != CommodityType::Stock {
                    continue;
                }
                for t in &ctx.sets.modelled {
                    cost.add_mul(
                        ctx.params.weight * attrs.price * attrs.cost_factor,
                        ctx.vars.e_pro_in(*t, flow_key)?,
                    );
                }
            }
            cost
        }
        CostType::Environmental => {
            let mut cost = Expression::default();
            for flow_key in ctx
                .sets
                .pro_output_tuples
                .iter()
                .filter(|(s, site, p, _)| s == stf && site == sit && p == pro)
            {
                let Some((com_key, attrs)) = ctx.params.commodity_of(*stf, sit, &flow_key.3)
                else {
                    continue;
                };
                if com_key.3 != CommodityType::Env {
                    continue;
                }
                for t in &ctx.sets.modelled {
                    cost.add_mul(
                        ctx.params.weight * attrs.price * attrs.cost_factor,
                        ctx.vars.e_pro_out(*t, flow_key)?,
                    );
                }
            }
            cost
        }
        CostType::Revenue | CostType::Purchase => Expression::default(),
    };
    Ok(Rule::eq(ctx.vars.process_cost(key, *cost_type)?, cost))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixture::{Fixture, ext_input, outer_input};
    use crate::model::rule::Sense;
    use rstest::rstest;
    use float_cmp::approx_eq;
    use std::collections::HashMap;

    fn fixture() -> Fixture {
        Fixture::new(outer_input(), &[0, 1, 2], 1.0)
    }

    fn key(pro: &str) -> ProKey {
        (2024, "Mid".to_string(), pro.to_string())
    }

    fn com(name: &str, com_type: CommodityType) -> ComKey {
        (2024, "Mid".to_string(), name.to_string(), com_type)
    }

    #[test]
    fn test_vertex_skips_supim_and_env() {
        let fixture = fixture();
        let ctx = fixture.ctx();
        for com_type in [CommodityType::SupIm, CommodityType::Env] {
            let name = if com_type == CommodityType::Env { "CO2" } else { "Solar" };
            assert!(res_vertex(&ctx, &(1, com(name, com_type))).unwrap().is_skip());
        }
        let rule = res_vertex(&ctx, &(1, com("Elec", CommodityType::Demand))).unwrap();
        assert_eq!(rule.relation().unwrap().sense, Sense::Eq);
    }

    #[test]
    fn test_vertex_balances_demand_with_output() {
        let fixture = fixture();
        let ctx = fixture.ctx();
        let rule = res_vertex(&ctx, &(1, com("Elec", CommodityType::Demand))).unwrap();
        let relation = rule.relation().unwrap();

        let mut values: HashMap<_, f64> = HashMap::new();
        for var in fixture.vars.e_pro_out.values() {
            values.insert(*var, 0.0);
        }
        for var in fixture.vars.e_pro_in.values() {
            values.insert(*var, 0.0);
        }
        let coal_elec = (2024, "Mid".into(), "Coal plant".into(), "Elec".into());
        values.insert(fixture.vars.e_pro_out(1, &coal_elec).unwrap(), 40.0);
        // demand at t=1 is 40
        assert!(relation.is_satisfied(&values, 1e-9));
        values.insert(fixture.vars.e_pro_out(1, &coal_elec).unwrap(), 30.0);
        assert!(!relation.is_satisfied(&values, 1e-9));
    }

    #[rstest]
    #[case(1.0)]
    #[case(8760.0)]
    fn test_extension_energy_enters_vertex_unscaled(#[case] dt: f64) {
        let fixture = Fixture::new(ext_input(), &[0, 1], dt);
        let ctx = fixture.ctx();
        let elec = (2025, "EU27".to_string(), "Elec".to_string(), CommodityType::Demand);
        let rule = res_vertex(&ctx, &(1, elec)).unwrap();
        let relation = rule.relation().unwrap();

        let balance = fixture.vars.ext(&(2025, "EU27".into(), "solarPV".into())).unwrap().balance;
        // demand at t=1 in 2025 is 110 000
        let mut values = HashMap::from([(balance, 110_000.0)]);
        assert!(relation.is_satisfied(&values, 1e-6));
        values.insert(balance, 110_000.0 * dt / 8760.0 + 1.0);
        assert!(!relation.is_satisfied(&values, 1e-6));
    }

    #[test]
    fn test_partial_tuples_skip_plain_io_definition() {
        let fixture = fixture();
        let ctx = fixture.ctx();
        let coal_in = (2024, "Mid".into(), "Coal plant".into(), "Coal".into());
        assert!(def_process_input(&ctx, &(1, coal_in.clone())).unwrap().is_skip());
        assert!(!def_partial_process_input(&ctx, &(1, coal_in)).unwrap().is_skip());
        let pv_in = (2024, "Mid".into(), "Photovoltaics".into(), "Solar".into());
        assert!(!def_process_input(&ctx, &(1, pv_in.clone())).unwrap().is_skip());
        assert!(!def_intermittent_supply(&ctx, &(1, pv_in)).unwrap().is_skip());
    }

    #[test]
    fn test_partial_factors_match_operating_points() {
        let key = (2024, "Mid".into(), "Coal plant".into(), "Coal".into());
        let (online, throughput) = partial_factors(&key, 0.5, 2.0, 3.0).unwrap();
        // at full load: cap*online + cap*throughput = cap * ratio
        assert!(approx_eq!(f64, online + throughput, 2.0, epsilon = 1e-12));
        // at minimum load: cap*online + 0.5*cap*throughput = 0.5*cap * ratio_min
        assert!(approx_eq!(f64, online + 0.5 * throughput, 1.5, epsilon = 1e-12));
        assert!(partial_factors(&key, 1.0, 2.0, 3.0).is_err());
    }

    #[test]
    fn test_maxgrad_skips_first_timestep() {
        let fixture = fixture();
        let ctx = fixture.ctx();
        assert!(
            res_process_maxgrad_lower(&ctx, &(0, key("Coal plant")))
                .unwrap()
                .is_skip()
        );
        assert!(
            !res_process_maxgrad_upper(&ctx, &(1, key("Coal plant")))
                .unwrap()
                .is_skip()
        );
    }

    #[test]
    fn test_capacity_bounds_and_area() {
        let fixture = fixture();
        let ctx = fixture.ctx();
        assert!(res_process_capacity_lower(&ctx, &key("Coal plant")).unwrap().is_skip());
        assert!(!res_process_capacity_upper(&ctx, &key("Coal plant")).unwrap().is_skip());
        assert!(!res_area(&ctx, &(2024, "Mid".to_string())).unwrap().is_skip());
    }

    #[test]
    fn test_missing_or_infinite_global_limits_are_skipped() {
        let mut input = outer_input();
        input
            .urbs
            .global_prop
            .insert((2024, "CO2 limit".to_string()), f64::INFINITY);
        input
            .urbs
            .global_prop
            .insert((2024, "Cost limit".to_string()), 1e6);
        let fixture = Fixture::new(input, &[0, 1, 2], 1.0);
        let ctx = fixture.ctx();
        assert!(res_global_co2_limit(&ctx, &2024).unwrap().is_skip());
        assert!(res_global_co2_budget(&ctx, &()).unwrap().is_skip());
        assert!(!res_global_cost_limit(&ctx, &2024).unwrap().is_skip());
    }

    #[test]
    fn test_specific_costs_add_up_to_aggregate() {
        let fixture = fixture();
        let ctx = fixture.ctx();
        let mut values: HashMap<_, f64> = HashMap::new();
        for (i, var) in fixture.vars.cap_pro_new.values().enumerate() {
            values.insert(*var, 10.0 + i as f64);
        }
        for (i, var) in fixture.vars.tau_pro.values().enumerate() {
            values.insert(*var, 1.0 + i as f64);
        }
        for (i, var) in fixture
            .vars
            .e_pro_in
            .values()
            .chain(fixture.vars.e_pro_out.values())
            .enumerate()
        {
            values.insert(*var, 2.0 + i as f64);
        }
        // stock purchase covers the coal burnt, as the vertex requires
        for ((t, (stf, sit, com, _)), stock) in &fixture.vars.e_co_stock {
            let burnt = fixture
                .vars
                .commodity_balance(&fixture.sets, *t, *stf, sit, com)
                .eval_with(&values);
            values.insert(*stock, burnt);
        }

        for cost_type in CostType::ALL {
            let aggregate = def_costs(&ctx, &cost_type).unwrap();
            let aggregate = &aggregate.relation().unwrap().rhs;
            let mut specific = 0.0;
            for pro_key in &fixture.sets.pro_tuples {
                let rule = def_specific_process_costs(&ctx, &(pro_key.clone(), cost_type)).unwrap();
                specific += rule.relation().unwrap().rhs.eval_with(&values);
            }
            assert!(approx_eq!(
                f64,
                aggregate.eval_with(&values),
                specific,
                epsilon = 1e-9
            ));
        }
    }

    #[test]
    fn test_const_cap_process_has_constant_capacity() {
        let fixture = fixture();
        let ctx = fixture.ctx();
        let capacity = ctx.cap_pro(&key("Hydro")).unwrap();
        let values: HashMap<good_lp::Variable, f64> = HashMap::new();
        assert_eq!(capacity.eval_with(&values), 25.0);
        assert!(fixture.vars.cap_pro_new(&key("Hydro")).is_err());
    }
}
