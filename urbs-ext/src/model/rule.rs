//! Constraint rows, the `Emit`/`Skip` result of a rule generator, and the observer that
//! generators report to.
use std::fmt::Debug;

use good_lp::{Constraint, Expression, Solution, constraint};
use indexmap::IndexMap;
use log::{debug, info, trace};

use crate::general::error::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Eq,
    Le,
    Ge,
}

/// `lhs <sense> rhs`, kept unsolved so it can be inspected and evaluated in tests
#[derive(Debug, Clone)]
pub struct LinearRelation {
    pub lhs: Expression,
    pub sense: Sense,
    pub rhs: Expression,
}

impl LinearRelation {
    pub fn new(lhs: impl Into<Expression>, sense: Sense, rhs: impl Into<Expression>) -> Self {
        Self {
            lhs: lhs.into(),
            sense,
            rhs: rhs.into(),
        }
    }

    pub fn into_constraint(self) -> Constraint {
        match self.sense {
            Sense::Eq => constraint::eq(self.lhs, self.rhs),
            Sense::Le => constraint::leq(self.lhs, self.rhs),
            Sense::Ge => constraint::geq(self.lhs, self.rhs),
        }
    }

    /// `lhs - rhs` at the given values
    pub fn residual<S: Solution>(&self, values: &S) -> f64 {
        self.lhs.eval_with(values) - self.rhs.eval_with(values)
    }

    pub fn is_satisfied<S: Solution>(&self, values: &S, tolerance: f64) -> bool {
        let residual = self.residual(values);
        match self.sense {
            Sense::Eq => residual.abs() <= tolerance,
            Sense::Le => residual <= tolerance,
            Sense::Ge => residual >= -tolerance,
        }
    }
}

/// Result of a rule generator for one index tuple
#[derive(Debug, Clone)]
pub enum Rule {
    Emit(LinearRelation),
    /// the tuple is outside the rule's domain; no row is emitted
    Skip,
}

impl Rule {
    pub fn eq(lhs: impl Into<Expression>, rhs: impl Into<Expression>) -> Self {
        Rule::Emit(LinearRelation::new(lhs, Sense::Eq, rhs))
    }

    pub fn le(lhs: impl Into<Expression>, rhs: impl Into<Expression>) -> Self {
        Rule::Emit(LinearRelation::new(lhs, Sense::Le, rhs))
    }

    pub fn ge(lhs: impl Into<Expression>, rhs: impl Into<Expression>) -> Self {
        Rule::Emit(LinearRelation::new(lhs, Sense::Ge, rhs))
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Rule::Skip)
    }

    pub fn relation(&self) -> Option<&LinearRelation> {
        match self {
            Rule::Emit(relation) => Some(relation),
            Rule::Skip => None,
        }
    }
}

/// Receives progress reports while a model is built. All methods default to no-ops.
pub trait ModelObserver {
    fn stage(&mut self, _stage: &str) {}
    fn emitted(&mut self, _family: &'static str, _index: &dyn Debug) {}
    fn skipped(&mut self, _family: &'static str, _index: &dyn Debug) {}
    fn family_done(&mut self, _family: &'static str, _emitted: usize, _skipped: usize) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ModelObserver for NullObserver {}

/// Forwards build progress to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ModelObserver for LogObserver {
    fn stage(&mut self, stage: &str) {
        info!("{stage}");
    }

    fn emitted(&mut self, family: &'static str, index: &dyn Debug) {
        trace!("{family}{index:?}: emitted");
    }

    fn skipped(&mut self, family: &'static str, index: &dyn Debug) {
        trace!("{family}{index:?}: skipped");
    }

    fn family_done(&mut self, family: &'static str, emitted: usize, skipped: usize) {
        debug!("{family}: {emitted} rows, {skipped} skipped");
    }
}

#[derive(Debug, Clone)]
pub struct ConstraintRow {
    pub family: &'static str,
    /// `family[index]`, only formatted when duals are requested
    pub label: Option<String>,
    pub relation: LinearRelation,
}

/// All emitted rows of a model, grouped by rule family
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    rows: Vec<ConstraintRow>,
    counts: IndexMap<&'static str, usize>,
    labelled: bool,
}

impl ConstraintSet {
    pub fn new(labelled: bool) -> Self {
        Self {
            labelled,
            ..Default::default()
        }
    }

    /// Runs `generator` over every index of a family and keeps the emitted rows
    pub fn add_family<T: Debug>(
        &mut self,
        family: &'static str,
        indices: impl IntoIterator<Item = T>,
        observer: &mut dyn ModelObserver,
        mut generator: impl FnMut(&T) -> Result<Rule, ModelError>,
    ) -> Result<(), ModelError> {
        let mut emitted = 0;
        let mut skipped = 0;
        for index in indices {
            match generator(&index)? {
                Rule::Emit(relation) => {
                    observer.emitted(family, &index);
                    let label = self.labelled.then(|| format!("{family}{index:?}"));
                    self.rows.push(ConstraintRow {
                        family,
                        label,
                        relation,
                    });
                    emitted += 1;
                }
                Rule::Skip => {
                    observer.skipped(family, &index);
                    skipped += 1;
                }
            }
        }
        *self.counts.entry(family).or_insert(0) += emitted;
        observer.family_done(family, emitted, skipped);
        Ok(())
    }

    /// Number of rows emitted by a family, zero for families never registered
    pub fn count(&self, family: &str) -> usize {
        self.counts.get(family).copied().unwrap_or(0)
    }

    pub fn is_registered(&self, family: &str) -> bool {
        self.counts.contains_key(family)
    }

    pub fn families(&self) -> impl Iterator<Item = (&'static str, usize)> + '_ {
        self.counts.iter().map(|(family, count)| (*family, *count))
    }

    pub fn rows(&self) -> &[ConstraintRow] {
        &self.rows
    }

    pub fn rows_of<'s>(&'s self, family: &'s str) -> impl Iterator<Item = &'s ConstraintRow> + 's {
        self.rows.iter().filter(move |row| row.family == family)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
