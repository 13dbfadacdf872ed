use good_lp::Expression;
use indexmap::IndexMap;

use crate::general::error::ModelError;
use crate::model::outer::process_capacity;
use crate::model::params::Parameters;
use crate::model::sets::IndexUniverse;
use crate::model::tables::ProKey;
use crate::model::variables::VariableRegistry;

/// What every rule generator reads from: sets, parameters, variables and the derived
/// process capacity expressions.
pub struct RuleContext<'a> {
    pub sets: &'a IndexUniverse,
    pub params: Parameters<'a>,
    pub vars: &'a VariableRegistry,
    pub cap_pro: IndexMap<ProKey, Expression>,
}

impl<'a> RuleContext<'a> {
    pub fn new(
        sets: &'a IndexUniverse,
        params: Parameters<'a>,
        vars: &'a VariableRegistry,
    ) -> Result<Self, ModelError> {
        let mut cap_pro = IndexMap::with_capacity(sets.pro_tuples.len());
        for key in &sets.pro_tuples {
            cap_pro.insert(key.clone(), process_capacity(sets, &params, vars, key)?);
        }
        Ok(Self {
            sets,
            params,
            vars,
            cap_pro,
        })
    }

    pub fn cap_pro(&self, key: &ProKey) -> Result<&Expression, ModelError> {
        self.cap_pro
            .get(key)
            .ok_or_else(|| ModelError::not_in_domain("cap_pro", key))
    }
}
