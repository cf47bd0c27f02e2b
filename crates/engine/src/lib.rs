pub mod alerts;
pub mod hysteresis;
pub mod portfolio;
pub mod risk;
pub mod sizing;

pub use risk::RiskEngine;
