use serde::{Deserialize, Serialize};

use crate::config::LadderConfig;
use crate::engine::CycleState;
use crate::models::IndicatorReading;

/// Suppresses new placement when ATR is too high or moving too fast
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolatilityGate {
    pub enabled: bool,
    pub max_atr: f64,
    pub atr_change_threshold: f64,
}

impl Default for VolatilityGate {
    fn default() -> Self {
        Self::from_config(&LadderConfig::default())
    }
}

/// Why placement was suppressed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum VolatilityTrip {
    AtrAboveMax { atr: f64, max_atr: f64 },
    AtrJump {
        atr: f64,
        previous: f64,
        change: f64,
        threshold: f64,
    },
}

/// Outcome of one gate evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GateDecision {
    /// Gate turned off by configuration
    Disabled,
    /// No ATR this cycle; placement allowed, previous ATR kept
    Unavailable,
    Clear { atr: f64 },
    Skip(VolatilityTrip),
}

impl GateDecision {
    /// True when new placement must be suppressed this cycle
    pub fn skip(&self) -> bool {
        matches!(self, GateDecision::Skip(_))
    }
}

impl VolatilityGate {
    pub fn from_config(config: &LadderConfig) -> Self {
        Self {
            enabled: config.use_indicators,
            max_atr: config.max_atr,
            atr_change_threshold: config.atr_change_threshold,
        }
    }

    /// Check the trip conditions against the prior ATR without touching state
    pub fn check(&self, atr: f64, previous_atr: Option<f64>) -> Result<(), VolatilityTrip> {
        if atr > self.max_atr {
            return Err(VolatilityTrip::AtrAboveMax {
                atr,
                max_atr: self.max_atr,
            });
        }

        if let Some(previous) = previous_atr {
            let change = (atr - previous).abs();
            if change > self.atr_change_threshold {
                return Err(VolatilityTrip::AtrJump {
                    atr,
                    previous,
                    change,
                    threshold: self.atr_change_threshold,
                });
            }
        }

        Ok(())
    }

    /// Decide whether placement is skipped and record the ATR for next cycle
    ///
    /// `previous_atr` moves to the new reading whenever one is available, after
    /// the comparison. A missing reading leaves the stale value in place.
    pub fn evaluate(
        &self,
        reading: Option<&IndicatorReading>,
        state: &mut CycleState,
    ) -> GateDecision {
        if !self.enabled {
            return GateDecision::Disabled;
        }

        let Some(atr) = reading.and_then(|r| r.atr) else {
            tracing::warn!("Could not retrieve ATR from the venue. Ensure the indicator is enabled.");
            return GateDecision::Unavailable;
        };

        let previous = state.previous_atr;
        tracing::info!(
            "ATR: {:.2} (Prev: {})",
            atr,
            previous.map_or_else(|| "N/A".to_string(), |p| format!("{:.2}", p))
        );

        let decision = match self.check(atr, previous) {
            Ok(()) => GateDecision::Clear { atr },
            Err(trip) => {
                log_trip(&trip);
                GateDecision::Skip(trip)
            }
        };

        state.previous_atr = Some(atr);
        decision
    }
}

fn log_trip(trip: &VolatilityTrip) {
    match trip {
        VolatilityTrip::AtrAboveMax { atr, max_atr } => {
            tracing::info!(
                "ATR ({:.2}) higher than max ATR ({}). Skipping placement.",
                atr,
                max_atr
            );
        }
        VolatilityTrip::AtrJump {
            change, threshold, ..
        } => {
            tracing::info!(
                "ATR change ({:.2}) > threshold ({}). Skipping placement.",
                change,
                threshold
            );
        }
    }
}
