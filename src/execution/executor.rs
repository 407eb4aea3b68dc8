use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;
use tokio::time::sleep;

use crate::config::LadderConfig;
use crate::errors::VenueError;
use crate::models::Side;
use crate::venue::{wait_for, Control, ControlScope, EntryField, VenueAdapter};

const LIMIT_LABEL: &str = "LIMIT";

/// Steps of the limit-order entry sequence, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlaceStep {
    SamplePrice,
    ComputeTarget,
    SelectLimit,
    AwaitEntryFields,
    EnterPrice,
    EnterQuantity,
    LocateSubmit,
    Submit,
}

impl fmt::Display for PlaceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaceStep::SamplePrice => "sample price",
            PlaceStep::ComputeTarget => "compute target price",
            PlaceStep::SelectLimit => "select limit order",
            PlaceStep::AwaitEntryFields => "await entry fields",
            PlaceStep::EnterPrice => "enter price",
            PlaceStep::EnterQuantity => "enter quantity",
            PlaceStep::LocateSubmit => "locate submit control",
            PlaceStep::Submit => "submit",
        };
        f.write_str(name)
    }
}

/// A placement attempt that stopped at `step`
///
/// Earlier steps are not rolled back: fields already filled stay filled.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{step} failed: {source}")]
pub struct PlacementError {
    pub step: PlaceStep,
    #[source]
    pub source: VenueError,
}

impl PlacementError {
    fn at(step: PlaceStep) -> impl FnOnce(VenueError) -> Self {
        move |source| Self { step, source }
    }
}

/// A submitted order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedOrder {
    pub side: Side,
    /// Price sampled at the start of this placement
    pub sampled_price: f64,
    pub target_price: Decimal,
}

/// Round `price * multiplier` to cents, halves away from zero
///
/// Rounds the exact binary product once, so a product stored just below a
/// cent midpoint (e.g. `1.005`) rounds down.
///
/// # Example
/// ```
/// use ladderbot::execution::target_price;
/// use rust_decimal::Decimal;
///
/// assert_eq!(target_price(50_000.0, 0.9994), Some(Decimal::new(4_997_000, 2)));
/// assert_eq!(target_price(f64::NAN, 1.0), None);
/// ```
pub fn target_price(price: f64, multiplier: f64) -> Option<Decimal> {
    Decimal::from_f64_retain(price * multiplier)
        .map(|d| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

/// Drives the venue's order-entry sequence for one limit order
pub struct OrderExecutor<'a, V: VenueAdapter + ?Sized> {
    venue: &'a V,
    config: &'a LadderConfig,
}

impl<'a, V: VenueAdapter + ?Sized> OrderExecutor<'a, V> {
    pub fn new(venue: &'a V, config: &'a LadderConfig) -> Self {
        Self { venue, config }
    }

    /// Place one order at `price_multiplier` times a fresh price sample
    ///
    /// Every failure ends this attempt only; nothing is retried.
    pub async fn place_order(
        &self,
        side: Side,
        price_multiplier: f64,
    ) -> Result<PlacedOrder, PlacementError> {
        let timing = &self.config.timing;
        tracing::info!(
            "--- Executing {} Order with Multiplier: {} ---",
            side.label(),
            price_multiplier
        );

        let current_price = self
            .venue
            .read_current_price()
            .await
            .map_err(PlacementError::at(PlaceStep::SamplePrice))?;
        tracing::info!("1. Current price retrieved: {}", current_price);

        let target = target_price(current_price, price_multiplier).ok_or_else(|| {
            PlacementError::at(PlaceStep::ComputeTarget)(VenueError::Unparseable {
                what: "target price".into(),
                text: format!("{} x {}", current_price, price_multiplier),
            })
        })?;
        tracing::info!("2. Calculated target price: {}", target);

        tracing::info!("3. Clicking on the 'Limit' control...");
        let limit = self
            .find_control(|c| c.normalized_label() == LIMIT_LABEL)
            .await
            .and_then(|found| found.ok_or_else(|| VenueError::NotFound("limit order control".into())))
            .map_err(PlacementError::at(PlaceStep::SelectLimit))?;
        self.venue
            .activate(limit.id)
            .await
            .map_err(PlacementError::at(PlaceStep::SelectLimit))?;

        tracing::info!("4. Waiting for price and quantity fields...");
        let price_field = self
            .await_field(EntryField::Price)
            .await
            .map_err(PlacementError::at(PlaceStep::AwaitEntryFields))?;
        let quantity_field = self
            .await_field(EntryField::Quantity)
            .await
            .map_err(PlacementError::at(PlaceStep::AwaitEntryFields))?;

        tracing::info!("5. Setting price to: {}", target);
        self.venue
            .write_field(price_field, &target.to_string())
            .await
            .map_err(PlacementError::at(PlaceStep::EnterPrice))?;
        sleep(timing.input_settle()).await;

        tracing::info!("6. Setting quantity to: {}", self.config.quantity);
        self.venue
            .write_field(quantity_field, &self.config.quantity.to_string())
            .await
            .map_err(PlacementError::at(PlaceStep::EnterQuantity))?;
        sleep(timing.input_settle()).await;

        tracing::info!("7. Submitting the '{}' order...", side);
        sleep(timing.pre_submit()).await;

        // Row actions in the orders table carry the same labels as the form buttons
        let submit = self
            .find_control(|c| c.normalized_label() == side.label() && !c.in_table)
            .await
            .and_then(|found| {
                let control = found.ok_or_else(|| VenueError::NotFound(format!("{} submit control", side.label())))?;
                if control.enabled {
                    Ok(control)
                } else {
                    Err(VenueError::Disabled(format!("{} submit control", side.label())))
                }
            })
            .map_err(PlacementError::at(PlaceStep::LocateSubmit))?;

        self.venue
            .activate(submit.id)
            .await
            .map_err(PlacementError::at(PlaceStep::Submit))?;
        tracing::info!("--- Order Submitted Successfully! ---");

        Ok(PlacedOrder {
            side,
            sampled_price: current_price,
            target_price: target,
        })
    }

    async fn find_control<P>(&self, predicate: P) -> Result<Option<Control>, VenueError>
    where
        P: Fn(&Control) -> bool,
    {
        let controls = self.venue.controls(ControlScope::Page).await?;
        Ok(controls.into_iter().find(|c| predicate(c)))
    }

    async fn await_field(&self, field: EntryField) -> Result<crate::venue::FieldId, VenueError> {
        let timing = &self.config.timing;
        wait_for(field.name(), timing.element_timeout(), timing.poll_interval(), || {
            self.venue.entry_field(field)
        })
        .await
    }
}
