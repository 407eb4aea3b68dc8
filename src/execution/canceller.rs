use serde::Serialize;
use tokio::time::sleep;

use crate::config::LadderConfig;
use crate::models::{Order, BPS_PER_UNIT};
use crate::venue::VenueAdapter;

/// Why a resting order falls outside the band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BandViolation {
    /// Unlikely to fill
    TooFar,
    /// Likely to execute
    TooClose,
}

impl BandViolation {
    pub fn describe(self) -> &'static str {
        match self {
            BandViolation::TooFar => "too far",
            BandViolation::TooClose => "too close",
        }
    }
}

/// Distance of `order_price` from `current_price` in bps
pub fn distance_bps(order_price: f64, current_price: f64) -> f64 {
    (order_price - current_price).abs() / current_price * BPS_PER_UNIT
}

/// Band check; `None` means the order may rest
pub fn classify_distance(
    order_price: f64,
    current_price: f64,
    config: &LadderConfig,
) -> Option<BandViolation> {
    let distance = distance_bps(order_price, current_price);
    if distance > config.max_distance_bps {
        Some(BandViolation::TooFar)
    } else if distance < config.min_distance_bps {
        Some(BandViolation::TooClose)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CancelSummary {
    pub cancelled: usize,
    pub failed: usize,
}

impl CancelSummary {
    /// Order listings read before the pass are stale
    pub fn cancelled_any(&self) -> bool {
        self.cancelled > 0
    }
}

/// Cancels resting orders whose distance from price is outside the band
pub struct DistanceCanceller<'a, V: VenueAdapter + ?Sized> {
    venue: &'a V,
    config: &'a LadderConfig,
}

impl<'a, V: VenueAdapter + ?Sized> DistanceCanceller<'a, V> {
    pub fn new(venue: &'a V, config: &'a LadderConfig) -> Self {
        Self { venue, config }
    }

    pub async fn cancel_out_of_band(&self, orders: &[Order], current_price: f64) -> CancelSummary {
        let mut summary = CancelSummary::default();

        if orders.is_empty() {
            tracing::info!("No existing open orders to check.");
            return summary;
        }

        tracing::info!("Checking distances for {} existing open order(s)...", orders.len());
        for order in orders {
            let Some(violation) = classify_distance(order.price, current_price, self.config) else {
                continue;
            };

            tracing::info!(
                "Order at {} ({}) is {} ({:.2} bps). Canceling.",
                order.price,
                order.side,
                violation.describe(),
                distance_bps(order.price, current_price)
            );

            match self.venue.cancel_order(order).await {
                Ok(()) => {
                    summary.cancelled += 1;
                    sleep(self.config.timing.cancel_settle()).await;
                }
                Err(e) => {
                    summary.failed += 1;
                    if e.is_not_found() {
                        tracing::warn!("✗ {} order at {} no longer listed: {}", order.side, order.price, e);
                    } else {
                        tracing::error!("✗ Failed to cancel {} order at {}: {}", order.side, order.price, e);
                    }
                }
            }
        }

        summary
    }
}
