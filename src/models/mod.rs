pub mod delivery;
pub mod driver;
pub mod tracking;
