//! Rules of the solar supply-chain extension, per (year, location, technology).
//!
//! New capacity is sourced from four flows: import, stock drawdown, domestic primary and
//! domestic secondary (recycled) manufacturing. Rules with a predecessor year skip the start
//! year; the start year gets its own initial-condition rules instead.
use good_lp::{Expression, Variable};

use crate::general::error::ModelError;
use crate::model::context::RuleContext;
use crate::model::rule::Rule;
use crate::model::tables::{ExtCostType, ExtKey, GrowthRecurrence, Year};
use crate::model::variables::ExtVariables;

/// The same technology at the previous extension year
fn previous(ctx: &RuleContext, key: &ExtKey) -> Option<ExtKey> {
    let (year, location, tech) = key;
    ctx.sets
        .previous_ext_year(*year)
        .map(|prev| (prev, location.clone(), tech.clone()))
}

fn at_year(key: &ExtKey, year: Year) -> ExtKey {
    (year, key.1.clone(), key.2.clone())
}

fn is_start_year(ctx: &RuleContext, key: &ExtKey) -> bool {
    ctx.sets.first_ext_year() == Some(key.0)
}

/// `capacity[y] = capacity[y-1] + capacity_new[y-1 or y]`, depending on the configured
/// recurrence
pub fn ext_growth(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    let Some(prev_key) = previous(ctx, key) else {
        return Ok(Rule::Skip);
    };
    let now = ctx.vars.ext(key)?;
    let prev = ctx.vars.ext(&prev_key)?;
    let new = match ctx.params.config.growth {
        GrowthRecurrence::PreviousYearNew => prev.capacity_new,
        GrowthRecurrence::SameYearNew => now.capacity_new,
    };
    Ok(Rule::eq(now.capacity, prev.capacity + new))
}

pub fn ext_initial_capacity(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    if !is_start_year(ctx, key) {
        return Ok(Rule::Skip);
    }
    let tech = ctx.params.technology(&key.1, &key.2)?;
    let v = ctx.vars.ext(key)?;
    Ok(Rule::eq(v.capacity, v.capacity_new + tech.installed_capacity))
}

/// Every unit of new capacity comes from exactly one source
pub fn ext_closure(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    let v = ctx.vars.ext(key)?;
    Ok(Rule::eq(
        v.capacity_new,
        v.imported + v.stockout + v.euprimary + v.eusecondary,
    ))
}

pub fn ext_stock_balance(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    let Some(prev_key) = previous(ctx, key) else {
        return Ok(Rule::Skip);
    };
    let v = ctx.vars.ext(key)?;
    let prev = ctx.vars.ext(&prev_key)?;
    Ok(Rule::eq(v.stock, prev.stock + v.stock_imported - v.stockout))
}

pub fn ext_stock_initial(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    if !is_start_year(ctx, key) {
        return Ok(Rule::Skip);
    }
    let tech = ctx.params.technology(&key.1, &key.2)?;
    let v = ctx.vars.ext(key)?;
    Ok(Rule::eq(
        v.stock,
        v.stock_imported - v.stockout + tech.existing_stock,
    ))
}

pub fn ext_anti_dumping(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    let index = ctx.params.technology(&key.1, &key.2)?.anti_dumping_index;
    let v = ctx.vars.ext(key)?;
    Ok(Rule::eq(
        v.anti_dumping,
        (v.imported + v.stock_imported) * index,
    ))
}

pub fn ext_installable_capacity(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    let Some(ceiling) = ctx.params.installable_capacity(key) else {
        return Ok(Rule::Skip);
    };
    Ok(Rule::le(ctx.vars.ext(key)?.capacity_new, ceiling))
}

/// `X[y] - X[y-1] <= dQ + IR * X[y-1]`
fn ramp(
    ctx: &RuleContext,
    key: &ExtKey,
    flow: fn(&ExtVariables) -> Variable,
    delta: f64,
    rate: f64,
) -> Result<Rule, ModelError> {
    let Some(prev_key) = previous(ctx, key) else {
        return Ok(Rule::Skip);
    };
    let now = flow(ctx.vars.ext(key)?);
    let prev = flow(ctx.vars.ext(&prev_key)?);
    Ok(Rule::le(now - prev, prev * rate + delta))
}

pub fn ext_ramp_primary(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    let tech = ctx.params.technology(&key.1, &key.2)?;
    ramp(ctx, key, |v| v.euprimary, tech.dq_primary, tech.ir_primary)
}

pub fn ext_ramp_secondary(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    let tech = ctx.params.technology(&key.1, &key.2)?;
    ramp(ctx, key, |v| v.eusecondary, tech.dq_secondary, tech.ir_secondary)
}

/// `X[y] >= DR * X[y-1]`; DR below one bounds the decline, above one forces growth
fn floor(
    ctx: &RuleContext,
    key: &ExtKey,
    flow: fn(&ExtVariables) -> Variable,
    rate: f64,
) -> Result<Rule, ModelError> {
    let Some(prev_key) = previous(ctx, key) else {
        return Ok(Rule::Skip);
    };
    let now = flow(ctx.vars.ext(key)?);
    let prev = flow(ctx.vars.ext(&prev_key)?);
    Ok(Rule::ge(now, prev * rate))
}

pub fn ext_floor_primary(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    let tech = ctx.params.technology(&key.1, &key.2)?;
    floor(ctx, key, |v| v.euprimary, tech.dr_primary)
}

pub fn ext_floor_secondary(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    let tech = ctx.params.technology(&key.1, &key.2)?;
    floor(ctx, key, |v| v.eusecondary, tech.dr_secondary)
}

/// Recycled output is bounded by the new capacity installed `l` years earlier
pub fn ext_content_lagged(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    let lag = ctx.params.technology(&key.1, &key.2)?.content_lag;
    let lagged_year = key.0 - lag;
    let Some(start) = ctx.sets.first_ext_year() else {
        return Ok(Rule::Skip);
    };
    if lagged_year < start || !ctx.sets.ext_years.contains(&lagged_year) {
        return Ok(Rule::Skip);
    }
    let lagged = ctx.vars.ext(&at_year(key, lagged_year))?;
    Ok(Rule::le(ctx.vars.ext(key)?.eusecondary, lagged.capacity_new))
}

/// Before the lag window reaches back into the horizon, recycled output is bounded by the
/// content ratio of total capacity instead
pub fn ext_content_ratio(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    let lag = ctx.params.technology(&key.1, &key.2)?.content_lag;
    let Some(start) = ctx.sets.first_ext_year() else {
        return Ok(Rule::Skip);
    };
    if start < key.0 - lag {
        return Ok(Rule::Skip);
    }
    let v = ctx.vars.ext(key)?;
    Ok(Rule::le(v.eusecondary, v.capacity * ctx.params.dcr(key)?))
}

/// Stock drawn over a forward window must turn over a share of the stock held.
///
/// Only evaluated in the configured turnover years that leave a full window before the end
/// of the horizon.
pub fn ext_stock_turnover(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    if !ctx.params.policy.stock_turnover {
        return Ok(Rule::Skip);
    }
    let (year, _, _) = key;
    let tech = ctx.params.technology(&key.1, &key.2)?;
    let window = tech.turnover_window as i32;
    let Some(last) = ctx.sets.ext_years.last().copied() else {
        return Ok(Rule::Skip);
    };
    if window == 0
        || !ctx.params.config.turnover_years.contains(year)
        || *year > last - window
    {
        return Ok(Rule::Skip);
    }

    let offset = ctx.params.config.turnover_offset;
    let draw_window = (year + offset)..(year + offset + window);
    let hold_window = *year..(year + window);

    let mut drawn = Expression::default();
    let mut held = Expression::default();
    // a draw window past the horizon leaves `drawn` empty and forces the held stock to zero
    for y in &ctx.sets.ext_years {
        let v = ctx.vars.ext(&at_year(key, *y))?;
        if draw_window.contains(y) {
            drawn += v.stockout;
        }
        if hold_window.contains(y) {
            held += v.stock;
        }
    }
    Ok(Rule::ge(drawn, held * (tech.turnover_factor / f64::from(window))))
}

/// Import cost with the logistics surcharge on stock-routed imports and the anti-dumping levy
pub fn ext_import_cost(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    let price = ctx.params.import_cost(key)?;
    let v = ctx.vars.ext(key)?;
    let mut cost = Expression::default();
    cost.add_mul(price, v.imported);
    cost.add_mul(price * ctx.params.config.logistic_cost, v.stock_imported);
    cost.add_mul(price, v.anti_dumping);
    Ok(Rule::eq(v.costs_import, cost))
}

pub fn ext_storage_cost(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    let storage_cost = ctx.params.technology(&key.1, &key.2)?.storage_cost;
    let v = ctx.vars.ext(key)?;
    Ok(Rule::eq(v.costs_storage, v.stock * storage_cost))
}

pub fn ext_primary_cost(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    let price = ctx.params.manufacturing_cost(key)?;
    let v = ctx.vars.ext(key)?;
    Ok(Rule::eq(v.costs_primary, v.euprimary * price))
}

/// Recycling cost, net of the learning-curve reduction of the selected segment
pub fn ext_secondary_cost(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    let price = ctx.params.remanufacturing_cost(key)?;
    let v = ctx.vars.ext(key)?;
    let mut cost = Expression::from(v.eusecondary * price);
    for n in &ctx.sets.learning_steps {
        let (reduction, _) = ctx.params.learning_point(&key.2, *n);
        cost.add_mul(-reduction, ctx.vars.z(key, *n)?);
    }
    Ok(Rule::eq(v.costs_secondary, cost))
}

/// Capacity converted into energy per year
fn balance(
    ctx: &RuleContext,
    key: &ExtKey,
    balance: fn(&ExtVariables) -> Variable,
    flow: fn(&ExtVariables) -> Variable,
) -> Result<Rule, ModelError> {
    let tech = ctx.params.technology(&key.1, &key.2)?;
    let v = ctx.vars.ext(key)?;
    Ok(Rule::eq(
        balance(v),
        flow(v) * (tech.load_factor * tech.hours_per_year),
    ))
}

pub fn ext_balance(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    balance(ctx, key, |v| v.balance, |v| v.capacity)
}

pub fn ext_balance_import(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    balance(ctx, key, |v| v.balance_import, |v| v.imported)
}

pub fn ext_balance_stockout(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    balance(ctx, key, |v| v.balance_stockout, |v| v.stockout)
}

pub fn ext_balance_primary(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    balance(ctx, key, |v| v.balance_primary, |v| v.euprimary)
}

pub fn ext_balance_secondary(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    balance(ctx, key, |v| v.balance_secondary, |v| v.eusecondary)
}

/// Total of one extension cost type over all years and technologies
pub fn def_costs_new(ctx: &RuleContext, cost_type: &ExtCostType) -> Result<Rule, ModelError> {
    let total: Expression = ctx.vars.ext.values().map(|v| v.cost(*cost_type)).sum();
    Ok(Rule::eq(ctx.vars.cost_new(*cost_type)?, total))
}

/// Minimum domestic share of new capacity
pub fn policy_nzia_benchmark(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    let Some(share) = ctx.params.policy.nzia_benchmark else {
        return Ok(Rule::Skip);
    };
    let v = ctx.vars.ext(key)?;
    Ok(Rule::ge(v.euprimary + v.eusecondary, v.capacity_new * share))
}

/// Installed capacity stays below the expansion-plan milestone of the year
pub fn policy_milestone(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    if !ctx.params.policy.milestones {
        return Ok(Rule::Skip);
    }
    let Some(milestone) = ctx.params.milestone(key) else {
        return Ok(Rule::Skip);
    };
    Ok(Rule::le(ctx.vars.ext(key)?.capacity, milestone))
}

pub fn policy_stock_import_fraction(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    let Some(fraction) = ctx.params.policy.max_stock_import_fraction else {
        return Ok(Rule::Skip);
    };
    let v = ctx.vars.ext(key)?;
    Ok(Rule::le(
        v.stock_imported,
        (v.imported + v.stock_imported) * fraction,
    ))
}

pub fn policy_min_stock(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    if !ctx.params.policy.min_stock_level {
        return Ok(Rule::Skip);
    }
    let Some(level) = ctx.params.stock_level(key) else {
        return Ok(Rule::Skip);
    };
    Ok(Rule::ge(ctx.vars.ext(key)?.stock, level))
}
