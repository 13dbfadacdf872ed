pub mod results;
pub mod runner;
pub mod scenarios;
pub mod solve;
