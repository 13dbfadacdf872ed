//! Piecewise learning curve of recycled manufacturing.
//!
//! One binary `BD[y, n]` selects segment `n` of the curve. The selected segment fixes the
//! price reduction to `P[n]` and requires the cumulative recycled output to have reached
//! `Q[n]`. The product `BD[y, n] * capacity_eusecondary[y]` is carried by `z[y, n]` through the
//! usual four big-M rows, with `M = gamma`.
use good_lp::Expression;

use crate::general::error::ModelError;
use crate::model::context::RuleContext;
use crate::model::rule::Rule;
use crate::model::tables::ExtKey;

fn selected<F>(ctx: &RuleContext, key: &ExtKey, weight: F) -> Result<Expression, ModelError>
where
    F: Fn(usize) -> f64,
{
    let mut total = Expression::default();
    for n in &ctx.sets.learning_steps {
        total.add_mul(weight(*n), ctx.vars.bd(key, *n)?);
    }
    Ok(total)
}

/// At most one segment per year
pub fn lc_exclusive(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    if ctx.sets.learning_steps.is_empty() {
        return Ok(Rule::Skip);
    }
    Ok(Rule::le(selected(ctx, key, |_| 1.0)?, 1.0))
}

/// Reductions, once reached, are kept
pub fn lc_monotonic(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    let (year, location, tech) = key;
    let Some(prev) = ctx.sets.previous_ext_year(*year) else {
        return Ok(Rule::Skip);
    };
    let prev_key = (prev, location.clone(), tech.clone());
    Ok(Rule::ge(
        ctx.vars.ext(key)?.price_reduction,
        ctx.vars.ext(&prev_key)?.price_reduction,
    ))
}

pub fn lc_value(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    let reduction = selected(ctx, key, |n| ctx.params.learning_point(&key.2, n).0)?;
    Ok(Rule::eq(ctx.vars.ext(key)?.price_reduction, reduction))
}

/// Recycled output up to and including the year covers the threshold of the selected segment
pub fn lc_cumulative_gate(ctx: &RuleContext, key: &ExtKey) -> Result<Rule, ModelError> {
    let (year, location, tech) = key;
    let mut cumulative = Expression::default();
    for y in ctx.sets.ext_years.iter().filter(|y| *y <= year) {
        cumulative += ctx.vars.ext(&(*y, location.clone(), tech.clone()))?.eusecondary;
    }
    let threshold = selected(ctx, key, |n| ctx.params.learning_point(tech, n).1)?;
    Ok(Rule::ge(cumulative, threshold))
}

/// `z <= M * BD`
pub fn lc_z_binary(ctx: &RuleContext, index: &(ExtKey, usize)) -> Result<Rule, ModelError> {
    let (key, n) = index;
    Ok(Rule::le(
        ctx.vars.z(key, *n)?,
        ctx.vars.bd(key, *n)? * ctx.params.config.gamma,
    ))
}

/// `z <= capacity_eusecondary`
pub fn lc_z_capacity(ctx: &RuleContext, index: &(ExtKey, usize)) -> Result<Rule, ModelError> {
    let (key, n) = index;
    Ok(Rule::le(
        ctx.vars.z(key, *n)?,
        ctx.vars.ext(key)?.eusecondary,
    ))
}

/// `z >= capacity_eusecondary - (1 - BD) * M`
pub fn lc_z_lower(ctx: &RuleContext, index: &(ExtKey, usize)) -> Result<Rule, ModelError> {
    let (key, n) = index;
    let gamma = ctx.params.config.gamma;
    let mut bound = Expression::from(ctx.vars.ext(key)?.eusecondary);
    bound.add_mul(gamma, ctx.vars.bd(key, *n)?);
    Ok(Rule::ge(ctx.vars.z(key, *n)?, bound - gamma))
}

/// `z >= 0`
pub fn lc_z_nonneg(ctx: &RuleContext, index: &(ExtKey, usize)) -> Result<Rule, ModelError> {
    let (key, n) = index;
    Ok(Rule::ge(ctx.vars.z(key, *n)?, 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixture::{Fixture, ext_input};
    use good_lp::Variable;
    use std::collections::HashMap;

    fn key(year: i32) -> ExtKey {
        (year, "EU27".to_string(), "solarPV".to_string())
    }

    fn fixture() -> Fixture {
        Fixture::new(ext_input(), &[0, 1], 8760.0)
    }

    /// Values for BD, z and eusecondary of one year
    fn values(fixture: &Fixture, year: i32, selected: Option<usize>, z: [f64; 3], x: f64) -> HashMap<Variable, f64> {
        let mut values = HashMap::new();
        for n in 0..3 {
            let bd = if selected == Some(n) { 1.0 } else { 0.0 };
            values.insert(fixture.vars.bd(&key(year), n).unwrap(), bd);
            values.insert(fixture.vars.z(&key(year), n).unwrap(), z[n]);
        }
        values.insert(fixture.vars.ext(&key(year)).unwrap().eusecondary, x);
        values
    }

    fn all_satisfied(ctx: &RuleContext, year: i32, values: &HashMap<Variable, f64>) -> bool {
        (0..3).all(|n| {
            let index = (key(year), n);
            [
                lc_z_binary(ctx, &index),
                lc_z_capacity(ctx, &index),
                lc_z_lower(ctx, &index),
                lc_z_nonneg(ctx, &index),
            ]
            .into_iter()
            .all(|rule| rule.unwrap().relation().unwrap().is_satisfied(values, 1e-6))
        })
    }

    #[test]
    fn test_big_m_rows_pin_z_to_selected_segment() {
        let fixture = fixture();
        let ctx = fixture.ctx();
        let ok = values(&fixture, 2024, Some(1), [0.0, 80.0, 0.0], 80.0);
        assert!(all_satisfied(&ctx, 2024, &ok));
        // z of an unselected segment leaks
        let leak = values(&fixture, 2024, Some(1), [1.0, 80.0, 0.0], 80.0);
        assert!(!all_satisfied(&ctx, 2024, &leak));
        // z of the selected segment falls short of the output
        let short = values(&fixture, 2024, Some(1), [0.0, 70.0, 0.0], 80.0);
        assert!(!all_satisfied(&ctx, 2024, &short));
    }

    #[test]
    fn test_exclusive_and_value_rows() {
        let fixture = fixture();
        let ctx = fixture.ctx();
        let mut values = values(&fixture, 2025, Some(2), [0.0; 3], 0.0);
        let reduction = fixture.vars.ext(&key(2025)).unwrap().price_reduction;
        values.insert(reduction, 10.0);
        let value_rule = lc_value(&ctx, &key(2025)).unwrap();
        assert!(value_rule.relation().unwrap().is_satisfied(&values, 1e-9));
        let exclusive = lc_exclusive(&ctx, &key(2025)).unwrap();
        assert!(exclusive.relation().unwrap().is_satisfied(&values, 1e-9));

        values.insert(fixture.vars.bd(&key(2025), 1).unwrap(), 1.0);
        assert!(!exclusive.relation().unwrap().is_satisfied(&values, 1e-9));
    }

    #[test]
    fn test_gate_uses_cumulative_output() {
        let fixture = fixture();
        let ctx = fixture.ctx();
        let mut values = values(&fixture, 2025, Some(1), [0.0; 3], 60_000.0);
        values.insert(fixture.vars.ext(&key(2024)).unwrap().eusecondary, 40_000.0);
        values.insert(fixture.vars.ext(&key(2026)).unwrap().eusecondary, 1e9);
        let gate = lc_cumulative_gate(&ctx, &key(2025)).unwrap();
        // 40 000 + 60 000 reach the 1e5 threshold of segment 1
        assert!(gate.relation().unwrap().is_satisfied(&values, 1e-6));
        values.insert(fixture.vars.ext(&key(2024)).unwrap().eusecondary, 30_000.0);
        assert!(!gate.relation().unwrap().is_satisfied(&values, 1e-6));
    }

    #[test]
    fn test_monotonic_skips_start_year() {
        let fixture = fixture();
        let ctx = fixture.ctx();
        assert!(lc_monotonic(&ctx, &key(2024)).unwrap().is_skip());
        assert!(!lc_monotonic(&ctx, &key(2026)).unwrap().is_skip());
    }
}
