pub mod forcefield;
pub mod models;
