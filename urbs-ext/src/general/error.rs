use thiserror::Error;

/// Errors raised while binding, building or solving a model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("unknown objective '{0}', expected 'cost' or 'CO2'")]
    UnknownObjective(String),

    #[error("unknown cost type '{0}'")]
    UnknownCostType(String),

    #[error("index {index} not in domain of '{table}'")]
    IndexNotInDomain { table: &'static str, index: String },

    #[error("missing parameter '{name}'")]
    MissingParameter { name: String },

    #[error("invalid parameter '{name}': {detail}")]
    InvalidParameter { name: String, detail: String },

    #[error("solver '{solver}' cannot be used: {reason}")]
    UnsupportedSolver { solver: String, reason: String },

    #[error("scenario '{scenario}' did not solve to optimality (status: {status})")]
    SolveFailed { scenario: String, status: String },
}

impl ModelError {
    pub(crate) fn not_in_domain(table: &'static str, index: impl std::fmt::Debug) -> Self {
        ModelError::IndexNotInDomain {
            table,
            index: format!("{index:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_in_domain_names_table_and_tuple() {
        let err = ModelError::not_in_domain("process", (2030, "EU27", "Coal Plant"));
        assert_eq!(
            err.to_string(),
            "index (2030, \"EU27\", \"Coal Plant\") not in domain of 'process'"
        );
    }

    #[test]
    fn test_solve_failed_carries_scenario_and_status() {
        let err = ModelError::SolveFailed {
            scenario: "scenario_base".to_string(),
            status: "infeasible".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("scenario_base"));
        assert!(message.contains("infeasible"));
    }
}
