pub mod mixing;
pub mod params;
pub mod potentials;
