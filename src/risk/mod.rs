// Risk gating module
pub mod volatility_gate;

pub use volatility_gate::{GateDecision, VolatilityGate, VolatilityTrip};
