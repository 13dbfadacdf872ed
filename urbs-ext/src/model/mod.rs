pub mod builder;
pub mod context;
pub mod ext;
pub mod learning;
pub mod objective;
pub mod outer;
pub mod params;
pub mod rule;
pub mod sets;
pub mod tables;
pub mod variables;

#[cfg(test)]
pub(crate) mod fixture;
