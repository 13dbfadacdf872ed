//! Multi-period energy-system optimisation model with a solar PV supply-chain extension.
pub mod general;
pub mod model;
pub mod run;

// Entry points of the build, solve and report pipeline
pub use general::error::ModelError;
pub use general::input::load_input;
pub use model::builder::{Model, ModelBuilder, create_model};
pub use model::tables::ModelInput;
pub use run::results::{ResultTables, get_constants};
pub use run::solve::{SolverOptions, solve};
