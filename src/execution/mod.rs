// Venue mutations: close, cancel, reconcile, place
pub mod canceller;
pub mod executor;
pub mod position_closer;
pub mod reconciler;

pub use canceller::{classify_distance, distance_bps, BandViolation, CancelSummary, DistanceCanceller};
pub use executor::{target_price, OrderExecutor, PlaceStep, PlacedOrder, PlacementError};
pub use position_closer::{CloseError, CloseStep, PositionCloser};
pub use reconciler::{plan, LadderPlan, LadderReconciler, Placement, PlanKind, ReconcileOutcome};
