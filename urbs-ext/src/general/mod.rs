pub mod error;
pub mod input;
pub mod settings;

pub use error::ModelError;
