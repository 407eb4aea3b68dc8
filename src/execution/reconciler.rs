use serde::Serialize;
use tokio::time::sleep;

use crate::config::LadderConfig;
use crate::execution::executor::OrderExecutor;
use crate::models::{count_side, Order, Side};
use crate::venue::VenueAdapter;

/// One order to place, `bps` away from price on `side`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Placement {
    pub side: Side,
    pub bps: f64,
}

impl Placement {
    pub fn price_multiplier(&self) -> f64 {
        self.side.price_multiplier(self.bps)
    }
}

/// What the reconciler decided to do with the observed ladder
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LadderPlan {
    /// No orders at all: lay the full ladder on both sides
    ColdStart { rungs: Vec<f64> },
    /// Restore per-side counts, every new order at the replacement distance
    TopUp {
        long_deficit: usize,
        short_deficit: usize,
        replacement_bps: f64,
    },
    /// Both sides already hold at least `N` orders
    Balanced,
}

/// Reportable shape of a [`LadderPlan`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlanKind {
    ColdStart,
    TopUp,
    Balanced,
}

impl LadderPlan {
    pub fn kind(&self) -> PlanKind {
        match self {
            LadderPlan::ColdStart { .. } => PlanKind::ColdStart,
            LadderPlan::TopUp { .. } => PlanKind::TopUp,
            LadderPlan::Balanced => PlanKind::Balanced,
        }
    }

    /// Placements in execution order: all longs first, then all shorts
    pub fn placements(&self) -> Vec<Placement> {
        match self {
            LadderPlan::ColdStart { rungs } => Side::BOTH
                .iter()
                .flat_map(|&side| rungs.iter().map(move |&bps| Placement { side, bps }))
                .collect(),
            LadderPlan::TopUp {
                long_deficit,
                short_deficit,
                replacement_bps,
            } => {
                let longs = std::iter::repeat(Placement {
                    side: Side::Long,
                    bps: *replacement_bps,
                })
                .take(*long_deficit);
                let shorts = std::iter::repeat(Placement {
                    side: Side::Short,
                    bps: *replacement_bps,
                })
                .take(*short_deficit);
                longs.chain(shorts).collect()
            }
            LadderPlan::Balanced => Vec::new(),
        }
    }
}

/// Decide how to bring the observed orders back to `N` per side
///
/// Over-full sides are left alone; only the distance band ever removes orders.
pub fn plan(orders: &[Order], config: &LadderConfig) -> LadderPlan {
    if orders.is_empty() {
        return LadderPlan::ColdStart {
            rungs: config.bps_ladder.clone(),
        };
    }

    let target = config.rungs();
    let long_deficit = target.saturating_sub(count_side(orders, Side::Long));
    let short_deficit = target.saturating_sub(count_side(orders, Side::Short));

    if long_deficit == 0 && short_deficit == 0 {
        LadderPlan::Balanced
    } else {
        LadderPlan::TopUp {
            long_deficit,
            short_deficit,
            replacement_bps: config.replacement_bps,
        }
    }
}

/// Result of one reconcile pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub plan: PlanKind,
    pub attempted: usize,
    pub succeeded: usize,
}

pub struct LadderReconciler<'a, V: VenueAdapter + ?Sized> {
    venue: &'a V,
    config: &'a LadderConfig,
}

impl<'a, V: VenueAdapter + ?Sized> LadderReconciler<'a, V> {
    pub fn new(venue: &'a V, config: &'a LadderConfig) -> Self {
        Self { venue, config }
    }

    /// Plan against `orders` and place what is missing, one order at a time
    ///
    /// `current_price` is only reported; every placement samples its own price.
    pub async fn reconcile(
        &self,
        orders: &[Order],
        current_price: f64,
        cancelled_this_cycle: bool,
    ) -> ReconcileOutcome {
        let plan = plan(orders, self.config);
        let target = self.config.rungs();

        match &plan {
            LadderPlan::ColdStart { .. } => {
                tracing::info!(
                    "No open orders found. Performing initial placement around {}...",
                    current_price
                );
            }
            LadderPlan::TopUp {
                long_deficit,
                short_deficit,
                replacement_bps,
            } => {
                for (side, deficit) in [(Side::Long, long_deficit), (Side::Short, short_deficit)] {
                    if *deficit > 0 {
                        tracing::info!(
                            "Found {} {} orders, need {}. Placing {} new {} order(s) at {} bps.",
                            count_side(orders, side),
                            side,
                            target,
                            deficit,
                            side,
                            replacement_bps
                        );
                    }
                }
            }
            LadderPlan::Balanced => {
                if !cancelled_this_cycle {
                    tracing::info!("All open orders are correct and safe.");
                }
            }
        }

        let executor = OrderExecutor::new(self.venue, self.config);
        let placements = plan.placements();
        let mut succeeded = 0;

        for placement in &placements {
            match executor
                .place_order(placement.side, placement.price_multiplier())
                .await
            {
                Ok(placed) => {
                    succeeded += 1;
                    tracing::debug!(
                        side = %placed.side,
                        target = %placed.target_price,
                        sampled = placed.sampled_price,
                        "Placed ladder order"
                    );
                }
                Err(e) => {
                    tracing::error!("✗ {} placement at {} bps failed: {}", placement.side, placement.bps, e);
                }
            }
            sleep(self.config.timing.placement_delay()).await;
        }

        if plan.kind() == PlanKind::ColdStart {
            tracing::info!("--- Initial Placement Complete ---");
        }

        ReconcileOutcome {
            plan: plan.kind(),
            attempted: placements.len(),
            succeeded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingConfig;
    use crate::models::OrderHandle;
    use crate::venue::{PaperFaults, PaperVenue};
    use rust_decimal::Decimal;

    fn config() -> LadderConfig {
        LadderConfig {
            timing: TimingConfig::immediate(),
            ..Default::default()
        }
    }

    fn order(side: Side, price: f64) -> Order {
        Order {
            side,
            price,
            handle: OrderHandle::new(),
        }
    }

    #[test]
    fn test_cold_start_plan_order() {
        let plan = plan(&[], &config());
        let placements = plan.placements();

        assert_eq!(plan.kind(), PlanKind::ColdStart);
        assert_eq!(
            placements,
            vec![
                Placement { side: Side::Long, bps: 6.0 },
                Placement { side: Side::Long, bps: 7.0 },
                Placement { side: Side::Long, bps: 8.0 },
                Placement { side: Side::Short, bps: 6.0 },
                Placement { side: Side::Short, bps: 7.0 },
                Placement { side: Side::Short, bps: 8.0 },
            ]
        );
    }

    #[test]
    fn test_top_up_uses_replacement_distance() {
        let orders = vec![
            order(Side::Long, 49_960.0),
            order(Side::Short, 50_030.0),
            order(Side::Short, 50_035.0),
            order(Side::Short, 50_040.0),
        ];

        let plan = plan(&orders, &config());

        assert_eq!(
            plan,
            LadderPlan::TopUp {
                long_deficit: 2,
                short_deficit: 0,
                replacement_bps: 6.0
            }
        );
        assert_eq!(
            plan.placements(),
            vec![Placement { side: Side::Long, bps: 6.0 }; 2]
        );
    }

    #[test]
    fn test_over_full_side_is_not_trimmed() {
        let mut orders: Vec<Order> = (0..5).map(|i| order(Side::Long, 49_960.0 + i as f64)).collect();
        orders.push(order(Side::Short, 50_030.0));

        let plan = plan(&orders, &config());

        assert_eq!(
            plan,
            LadderPlan::TopUp {
                long_deficit: 0,
                short_deficit: 2,
                replacement_bps: 6.0
            }
        );
    }

    #[test]
    fn test_balanced_plan_places_nothing() {
        let orders: Vec<Order> = Side::BOTH
            .iter()
            .flat_map(|&side| (0..3).map(move |_| order(side, 50_000.0)))
            .collect();

        let plan = plan(&orders, &config());
        assert_eq!(plan, LadderPlan::Balanced);
        assert!(plan.placements().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cold_start_prices() {
        let venue = PaperVenue::fixed(50_000.0);
        let config = config();

        let outcome = LadderReconciler::new(&venue, &config)
            .reconcile(&[], 50_000.0, false)
            .await;

        assert_eq!(
            outcome,
            ReconcileOutcome {
                plan: PlanKind::ColdStart,
                attempted: 6,
                succeeded: 6
            }
        );
        let cents = |v: i64| Decimal::new(v, 2);
        assert_eq!(
            venue.placements(),
            vec![
                (Side::Long, cents(4_997_000)),
                (Side::Long, cents(4_996_500)),
                (Side::Long, cents(4_996_000)),
                (Side::Short, cents(5_003_000)),
                (Side::Short, cents(5_003_500)),
                (Side::Short, cents(5_004_000)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_placement_does_not_stop_the_rest() {
        let venue = PaperVenue::fixed(50_000.0);
        venue.set_faults(PaperFaults {
            submit_disabled: true,
            ..Default::default()
        });
        let config = config();

        let outcome = LadderReconciler::new(&venue, &config)
            .reconcile(&[], 50_000.0, false)
            .await;

        assert_eq!(outcome.attempted, 6);
        assert_eq!(outcome.succeeded, 0);
    }
}
