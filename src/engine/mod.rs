pub mod lifecycle;
pub mod simulation;
