use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::time::sleep;

use super::CycleState;
use crate::config::LadderConfig;
use crate::errors::VenueError;
use crate::execution::{
    CancelSummary, DistanceCanceller, LadderReconciler, PositionCloser, ReconcileOutcome,
};
use crate::models::IndicatorReading;
use crate::risk::{GateDecision, VolatilityGate};
use crate::venue::VenueAdapter;

/// Conditions that end a cycle early
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CycleError {
    #[error("could not get current price: {0}")]
    PriceUnavailable(#[source] VenueError),
    #[error("could not read {what}: {source}")]
    Read {
        what: &'static str,
        #[source]
        source: VenueError,
    },
}

impl CycleError {
    fn read(what: &'static str) -> impl FnOnce(VenueError) -> Self {
        move |source| CycleError::Read { what, source }
    }
}

/// Summary of one completed cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub loop_counter: u64,
    pub started_at: DateTime<Utc>,
    pub indicators: Option<IndicatorReading>,
    pub gate: GateDecision,
    pub positions_found: usize,
    pub positions_closed: usize,
    pub orders_found: usize,
    pub price: f64,
    pub cancel: CancelSummary,
    /// None when placement was skipped for volatility
    pub reconcile: Option<ReconcileOutcome>,
}

/// Run one full decision pass: gate, close, cancel, reconcile
///
/// Steps run strictly in order because each one reads venue state left by the
/// previous one. Only read failures end the cycle early; individual close,
/// cancel and placement failures are logged where they happen.
pub async fn run_cycle<V: VenueAdapter + ?Sized>(
    venue: &V,
    config: &LadderConfig,
    state: &Mutex<CycleState>,
    loop_counter: u64,
) -> Result<CycleReport, CycleError> {
    let started_at = Utc::now();
    let timing = &config.timing;

    // 1. Volatility gate
    let indicators = if config.use_indicators {
        match venue.read_indicators().await {
            Ok(reading) => {
                tracing::debug!(atr = ?reading.atr, adx = ?reading.adx, rsi = ?reading.rsi, "Indicators");
                Some(reading)
            }
            Err(e) => {
                tracing::warn!("Indicator read failed: {}", e);
                None
            }
        }
    } else {
        None
    };

    let gate = {
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        VolatilityGate::from_config(config).evaluate(indicators.as_ref(), &mut state)
    };

    // 2. Positions are always closed
    let positions = venue
        .read_open_positions()
        .await
        .map_err(CycleError::read("open positions"))?;
    let mut positions_closed = 0;
    if !positions.is_empty() {
        tracing::info!("Found {} open position(s). Closing them now.", positions.len());
        positions_closed = PositionCloser::new(venue, timing).close_all(&positions).await;
        tracing::info!("Waiting for venue to update after closing positions...");
        sleep(timing.post_close_settle()).await;
    }

    // 3. Distance band
    let orders = venue
        .read_open_orders()
        .await
        .map_err(CycleError::read("open orders"))?;
    let price = venue
        .read_current_price()
        .await
        .map_err(CycleError::PriceUnavailable)?;
    if !price.is_finite() || price <= 0.0 {
        return Err(CycleError::PriceUnavailable(VenueError::Unparseable {
            what: "current price".into(),
            text: price.to_string(),
        }));
    }

    let cancel = DistanceCanceller::new(venue, config)
        .cancel_out_of_band(&orders, price)
        .await;
    if cancel.cancelled_any() {
        tracing::info!("Waiting for venue to update after cancellations...");
        sleep(timing.post_cancel_settle()).await;
    }

    // 4. Placement
    let reconcile = if gate.skip() {
        tracing::info!("New order placement (initial or replacement) skipped due to volatility.");
        None
    } else {
        let current = if cancel.cancelled_any() {
            venue
                .read_open_orders()
                .await
                .map_err(CycleError::read("open orders"))?
        } else {
            orders.clone()
        };

        Some(
            LadderReconciler::new(venue, config)
                .reconcile(&current, price, cancel.cancelled_any())
                .await,
        )
    };

    Ok(CycleReport {
        loop_counter,
        started_at,
        indicators,
        gate,
        positions_found: positions.len(),
        positions_closed,
        orders_found: orders.len(),
        price,
        cancel,
        reconcile,
    })
}
