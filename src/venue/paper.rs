use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Serialize;

use super::{Control, ControlId, ControlScope, DialogId, EntryField, FieldId, VenueAdapter};
use crate::errors::VenueError;
use crate::indicators::{calculate_atr, calculate_rsi, DEFAULT_PERIOD};
use crate::models::{
    Candle, IndicatorReading, Order, OrderHandle, Position, PositionHandle, Side, BPS_PER_UNIT,
};

const LIMIT_CONTROL: ControlId = ControlId(1);
const MARKET_CONTROL: ControlId = ControlId(2);
const SUBMIT_LONG: ControlId = ControlId(3);
const SUBMIT_SHORT: ControlId = ControlId(4);
const DIALOG_CONFIRM: ControlId = ControlId(10);
const DIALOG_CANCEL: ControlId = ControlId(11);
const TABLE_LONG: ControlId = ControlId(20);
const TABLE_SHORT: ControlId = ControlId(21);

const PRICE_FIELD: FieldId = FieldId(100);
const QUANTITY_FIELD: FieldId = FieldId(101);

/// Simulated market parameters
#[derive(Debug, Clone)]
pub struct PaperVenueConfig {
    pub initial_price: f64,
    /// Largest random move per tick, in bps; zero keeps the price fixed
    pub volatility_bps: f64,
    pub seed: u64,
    /// Convert orders into positions when a tick trades through them
    pub fill_crossed_orders: bool,
    pub indicator_period: usize,
    pub max_candles: usize,
}

impl Default for PaperVenueConfig {
    fn default() -> Self {
        Self {
            initial_price: 50_000.0,
            volatility_bps: 2.0,
            seed: 42,
            fill_crossed_orders: true,
            indicator_period: DEFAULT_PERIOD,
            max_candles: 500,
        }
    }
}

/// Failure modes the paper venue can be told to reproduce
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaperFaults {
    pub price_unavailable: bool,
    pub dialog_never_appears: bool,
    pub confirm_missing: bool,
    pub limit_missing: bool,
    pub entry_fields_missing: bool,
    pub submit_disabled: bool,
    /// Table rows show their own LONG/SHORT controls ahead of the order form
    pub table_side_controls: bool,
    pub reject_cancels: bool,
}

/// Mutation recorded by the paper venue
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum VenueEvent {
    OrderPlaced {
        side: Side,
        price: Decimal,
        quantity: Decimal,
        handle: OrderHandle,
    },
    OrderCancelled { side: Side, price: Decimal },
    OrderFilled { side: Side, price: Decimal },
    PositionClosed { side: Side },
    /// A control was pressed that does nothing useful (e.g. a table row action)
    Misclick { label: String },
}

#[derive(Debug, Clone)]
struct RestingOrder {
    handle: OrderHandle,
    side: Side,
    price: Decimal,
}

#[derive(Debug, Clone)]
struct OpenPosition {
    handle: PositionHandle,
    side: Side,
}

#[derive(Debug, Clone, Copy)]
struct PendingClose {
    dialog: DialogId,
    position: PositionHandle,
}

struct PaperState {
    price: f64,
    rng: StdRng,
    candles: VecDeque<Candle>,
    orders: Vec<RestingOrder>,
    positions: Vec<OpenPosition>,
    dialog: Option<PendingClose>,
    dialogs_opened: u64,
    order_form_open: bool,
    price_text: Option<String>,
    quantity_text: Option<String>,
    indicator_override: Option<Option<IndicatorReading>>,
    faults: PaperFaults,
    journal: Vec<VenueEvent>,
}

/// In-memory venue for dry runs and tests
///
/// Behaves like the order-entry screen of a perpetuals venue: a close request
/// opens a confirmation dialog, the limit control reveals the price and size
/// fields, and the side controls submit whatever the fields contain.
pub struct PaperVenue {
    config: PaperVenueConfig,
    state: Mutex<PaperState>,
}

impl PaperVenue {
    pub fn new(config: PaperVenueConfig) -> Self {
        let state = PaperState {
            price: config.initial_price,
            rng: StdRng::seed_from_u64(config.seed),
            candles: VecDeque::new(),
            orders: Vec::new(),
            positions: Vec::new(),
            dialog: None,
            dialogs_opened: 0,
            order_form_open: false,
            price_text: None,
            quantity_text: None,
            indicator_override: None,
            faults: PaperFaults::default(),
            journal: Vec::new(),
        };

        Self {
            config,
            state: Mutex::new(state),
        }
    }

    /// Market pinned at `price` with no fills
    pub fn fixed(price: f64) -> Self {
        Self::new(PaperVenueConfig {
            initial_price: price,
            volatility_bps: 0.0,
            fill_crossed_orders: false,
            ..Default::default()
        })
    }

    fn state(&self) -> MutexGuard<'_, PaperState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advance the market by one random step and fill crossed orders
    pub fn tick(&self) {
        let mut state = self.state();
        let open = state.price;

        let max_step = open * self.config.volatility_bps / BPS_PER_UNIT;
        let (step, wick) = if max_step > 0.0 {
            (
                state.rng.gen_range(-max_step..=max_step),
                state.rng.gen_range(0.0..=max_step),
            )
        } else {
            (0.0, 0.0)
        };

        let close = (open + step).max(0.01);
        state.price = close;
        state.candles.push_back(Candle {
            timestamp: Utc::now(),
            open,
            high: open.max(close) + wick,
            low: (open.min(close) - wick).max(0.01),
            close,
            volume: 0.0,
        });
        while state.candles.len() > self.config.max_candles {
            state.candles.pop_front();
        }

        if self.config.fill_crossed_orders {
            fill_crossed(&mut state, close);
        }
    }

    pub fn price(&self) -> f64 {
        self.state().price
    }

    pub fn set_price(&self, price: f64) {
        self.state().price = price;
    }

    /// Pin the indicator reading; `None` inside means no ATR/ADX/RSI at all
    pub fn set_indicators(&self, reading: Option<IndicatorReading>) {
        self.state().indicator_override = Some(reading);
    }

    pub fn set_faults(&self, faults: PaperFaults) {
        self.state().faults = faults;
    }

    /// Place a resting order directly, bypassing the order form
    pub fn seed_order(&self, side: Side, price: f64) -> OrderHandle {
        let handle = OrderHandle::new();
        let price = Decimal::from_f64(price).unwrap_or(Decimal::ZERO);
        self.state().orders.push(RestingOrder { handle, side, price });
        handle
    }

    pub fn seed_position(&self, side: Side) -> PositionHandle {
        let handle = PositionHandle::new();
        self.state().positions.push(OpenPosition { handle, side });
        handle
    }

    pub fn journal(&self) -> Vec<VenueEvent> {
        self.state().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.state().journal.clear();
    }

    /// Side and price of every order placed through the order form, in order
    pub fn placements(&self) -> Vec<(Side, Decimal)> {
        self.state()
            .journal
            .iter()
            .filter_map(|event| match event {
                VenueEvent::OrderPlaced { side, price, .. } => Some((*side, *price)),
                _ => None,
            })
            .collect()
    }

    pub fn cancellations(&self) -> usize {
        self.state()
            .journal
            .iter()
            .filter(|e| matches!(e, VenueEvent::OrderCancelled { .. }))
            .count()
    }

    pub fn order_count(&self, side: Side) -> usize {
        self.state().orders.iter().filter(|o| o.side == side).count()
    }

    pub fn position_count(&self) -> usize {
        self.state().positions.len()
    }

    fn computed_indicators(&self, state: &PaperState) -> IndicatorReading {
        let candles: Vec<Candle> = state.candles.iter().cloned().collect();
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

        IndicatorReading {
            atr: calculate_atr(&candles, self.config.indicator_period),
            adx: None,
            rsi: calculate_rsi(&closes, self.config.indicator_period),
        }
    }

    fn submit(&self, state: &mut PaperState, side: Side) -> Result<(), VenueError> {
        if !state.order_form_open {
            return Err(VenueError::NotFound("order form".into()));
        }
        if state.faults.submit_disabled {
            return Err(VenueError::Disabled(side.label().into()));
        }

        let price = parse_field(state.price_text.as_deref(), "price")?;
        let quantity = parse_field(state.quantity_text.as_deref(), "quantity")?;
        if price <= Decimal::ZERO || quantity <= Decimal::ZERO {
            return Err(VenueError::Unexpected(format!(
                "order rejected: price {} size {}",
                price, quantity
            )));
        }

        let handle = OrderHandle::new();
        state.orders.push(RestingOrder { handle, side, price });
        state.journal.push(VenueEvent::OrderPlaced {
            side,
            price,
            quantity,
            handle,
        });
        Ok(())
    }

    fn confirm_close(&self, state: &mut PaperState) -> Result<(), VenueError> {
        let pending = state
            .dialog
            .take()
            .ok_or_else(|| VenueError::NotFound("confirmation dialog".into()))?;

        let index = state
            .positions
            .iter()
            .position(|p| p.handle == pending.position)
            .ok_or_else(|| VenueError::NotFound("position".into()))?;
        let closed = state.positions.remove(index);
        state.journal.push(VenueEvent::PositionClosed { side: closed.side });
        Ok(())
    }
}

fn parse_field(text: Option<&str>, what: &str) -> Result<Decimal, VenueError> {
    let text = text.ok_or_else(|| VenueError::NotFound(format!("{} value", what)))?;
    Decimal::from_str(text.trim()).map_err(|_| VenueError::Unparseable {
        what: what.to_string(),
        text: text.to_string(),
    })
}

fn fill_crossed(state: &mut PaperState, price: f64) {
    let (filled, resting): (Vec<RestingOrder>, Vec<RestingOrder>) =
        state.orders.drain(..).partition(|order| {
            let limit = order.price.to_f64().unwrap_or(0.0);
            match order.side {
                Side::Long => price <= limit,
                Side::Short => price >= limit,
            }
        });
    state.orders = resting;

    for order in filled {
        tracing::debug!("Paper fill: {} @ {}", order.side, order.price);
        state.positions.push(OpenPosition {
            handle: PositionHandle::new(),
            side: order.side,
        });
        state.journal.push(VenueEvent::OrderFilled {
            side: order.side,
            price: order.price,
        });
    }
}

fn control(id: ControlId, label: &str, enabled: bool, in_table: bool) -> Control {
    Control {
        id,
        label: label.to_string(),
        enabled,
        in_table,
    }
}

fn title_case(side: Side) -> &'static str {
    match side {
        Side::Long => "Long",
        Side::Short => "Short",
    }
}

#[async_trait]
impl VenueAdapter for PaperVenue {
    async fn read_current_price(&self) -> Result<f64, VenueError> {
        let state = self.state();
        if state.faults.price_unavailable {
            return Err(VenueError::NotFound("price in title".into()));
        }
        Ok(state.price)
    }

    async fn read_indicators(&self) -> Result<IndicatorReading, VenueError> {
        let state = self.state();
        match state.indicator_override {
            Some(Some(reading)) => Ok(reading),
            Some(None) => Ok(IndicatorReading::default()),
            None => Ok(self.computed_indicators(&state)),
        }
    }

    async fn read_open_orders(&self) -> Result<Vec<Order>, VenueError> {
        Ok(self
            .state()
            .orders
            .iter()
            .map(|o| Order {
                side: o.side,
                price: o.price.to_f64().unwrap_or(0.0),
                handle: o.handle,
            })
            .collect())
    }

    async fn read_open_positions(&self) -> Result<Vec<Position>, VenueError> {
        Ok(self
            .state()
            .positions
            .iter()
            .map(|p| Position {
                side: p.side,
                handle: p.handle,
            })
            .collect())
    }

    async fn cancel_order(&self, order: &Order) -> Result<(), VenueError> {
        let mut state = self.state();
        if state.faults.reject_cancels {
            return Err(VenueError::Unexpected("cancel rejected".into()));
        }

        let index = state
            .orders
            .iter()
            .position(|o| o.handle == order.handle)
            .ok_or_else(|| VenueError::NotFound("order row".into()))?;
        let cancelled = state.orders.remove(index);
        state.journal.push(VenueEvent::OrderCancelled {
            side: cancelled.side,
            price: cancelled.price,
        });
        Ok(())
    }

    async fn request_close(&self, position: &Position) -> Result<(), VenueError> {
        let mut state = self.state();
        if !state.positions.iter().any(|p| p.handle == position.handle) {
            return Err(VenueError::NotFound("position row".into()));
        }

        if !state.faults.dialog_never_appears {
            state.dialogs_opened += 1;
            state.dialog = Some(PendingClose {
                dialog: DialogId(state.dialogs_opened),
                position: position.handle,
            });
        }
        Ok(())
    }

    async fn confirmation_dialog(&self) -> Result<Option<DialogId>, VenueError> {
        Ok(self.state().dialog.map(|pending| pending.dialog))
    }

    async fn controls(&self, scope: ControlScope) -> Result<Vec<Control>, VenueError> {
        let state = self.state();
        let faults = &state.faults;

        match scope {
            ControlScope::Page => {
                let mut controls = Vec::new();
                if faults.table_side_controls {
                    controls.push(control(TABLE_LONG, "Long", true, true));
                    controls.push(control(TABLE_SHORT, " Short ", true, true));
                }
                if !faults.limit_missing {
                    controls.push(control(LIMIT_CONTROL, "Limit", true, false));
                }
                controls.push(control(MARKET_CONTROL, "Market", true, false));
                controls.push(control(SUBMIT_LONG, "Long", !faults.submit_disabled, false));
                controls.push(control(SUBMIT_SHORT, "Short", !faults.submit_disabled, false));
                Ok(controls)
            }
            ControlScope::Dialog(dialog) => {
                let pending = state
                    .dialog
                    .filter(|p| p.dialog == dialog)
                    .ok_or_else(|| VenueError::NotFound("confirmation dialog".into()))?;

                let mut controls = vec![control(DIALOG_CANCEL, "Cancel", true, false)];
                if !faults.confirm_missing {
                    let side = state
                        .positions
                        .iter()
                        .find(|p| p.handle == pending.position)
                        .map(|p| p.side)
                        .ok_or_else(|| VenueError::NotFound("position".into()))?;
                    let label = format!("Confirm {}", title_case(side.opposite()));
                    controls.push(control(DIALOG_CONFIRM, &label, true, false));
                }
                Ok(controls)
            }
        }
    }

    async fn activate(&self, id: ControlId) -> Result<(), VenueError> {
        let mut state = self.state();

        match id {
            LIMIT_CONTROL if !state.faults.limit_missing => {
                state.order_form_open = true;
                Ok(())
            }
            MARKET_CONTROL => {
                state.order_form_open = false;
                Ok(())
            }
            SUBMIT_LONG => self.submit(&mut state, Side::Long),
            SUBMIT_SHORT => self.submit(&mut state, Side::Short),
            DIALOG_CONFIRM if !state.faults.confirm_missing => self.confirm_close(&mut state),
            DIALOG_CANCEL => {
                state.dialog = None;
                Ok(())
            }
            TABLE_LONG | TABLE_SHORT => {
                let label = if id == TABLE_LONG { "Long" } else { "Short" };
                state.journal.push(VenueEvent::Misclick {
                    label: label.to_string(),
                });
                Ok(())
            }
            other => Err(VenueError::NotFound(format!("control {:?}", other))),
        }
    }

    async fn entry_field(&self, field: EntryField) -> Result<Option<FieldId>, VenueError> {
        let state = self.state();
        if !state.order_form_open || state.faults.entry_fields_missing {
            return Ok(None);
        }

        Ok(Some(match field {
            EntryField::Price => PRICE_FIELD,
            EntryField::Quantity => QUANTITY_FIELD,
        }))
    }

    async fn write_field(&self, field: FieldId, value: &str) -> Result<(), VenueError> {
        let mut state = self.state();
        match field {
            PRICE_FIELD => state.price_text = Some(value.to_string()),
            QUANTITY_FIELD => state.quantity_text = Some(value.to_string()),
            other => return Err(VenueError::NotFound(format!("field {:?}", other))),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_price_does_not_move() {
        let venue = PaperVenue::fixed(50_000.0);
        for _ in 0..5 {
            venue.tick();
        }
        assert_eq!(venue.read_current_price().await.unwrap(), 50_000.0);
    }

    #[tokio::test]
    async fn test_indicators_need_history() {
        let venue = PaperVenue::new(PaperVenueConfig::default());
        let reading = venue.read_indicators().await.unwrap();
        assert!(reading.atr.is_none());

        for _ in 0..20 {
            venue.tick();
        }
        let reading = venue.read_indicators().await.unwrap();
        assert!(reading.atr.unwrap() > 0.0);
        assert!(reading.rsi.is_some());
        assert!(reading.adx.is_none());
    }

    #[tokio::test]
    async fn test_order_form_submission() {
        let venue = PaperVenue::fixed(100.0);
        assert_eq!(venue.entry_field(EntryField::Price).await.unwrap(), None);

        venue.activate(LIMIT_CONTROL).await.unwrap();
        let price = venue.entry_field(EntryField::Price).await.unwrap().unwrap();
        let size = venue.entry_field(EntryField::Quantity).await.unwrap().unwrap();
        venue.write_field(price, "99.94").await.unwrap();
        venue.write_field(size, "0.001").await.unwrap();
        venue.activate(SUBMIT_LONG).await.unwrap();

        assert_eq!(venue.placements(), vec![(Side::Long, Decimal::new(9994, 2))]);
        assert_eq!(venue.order_count(Side::Long), 1);
    }

    #[tokio::test]
    async fn test_unparseable_price_rejected() {
        let venue = PaperVenue::fixed(100.0);
        venue.activate(LIMIT_CONTROL).await.unwrap();
        venue.write_field(PRICE_FIELD, "abc").await.unwrap();
        venue.write_field(QUANTITY_FIELD, "1").await.unwrap();

        let err = venue.activate(SUBMIT_SHORT).await.unwrap_err();
        assert!(matches!(err, VenueError::Unparseable { .. }));
        assert!(venue.placements().is_empty());
    }

    #[tokio::test]
    async fn test_close_dialog_shows_inverse_side() {
        let venue = PaperVenue::fixed(100.0);
        let handle = venue.seed_position(Side::Long);
        let position = Position {
            side: Side::Long,
            handle,
        };

        venue.request_close(&position).await.unwrap();
        let dialog = venue.confirmation_dialog().await.unwrap().unwrap();
        let controls = venue.controls(ControlScope::Dialog(dialog)).await.unwrap();

        assert!(controls.iter().any(|c| c.normalized_label() == "CONFIRM SHORT"));
        venue.activate(DIALOG_CONFIRM).await.unwrap();
        assert_eq!(venue.position_count(), 0);
        assert_eq!(
            venue.journal(),
            vec![VenueEvent::PositionClosed { side: Side::Long }]
        );
    }

    #[tokio::test]
    async fn test_crossed_orders_fill_into_positions() {
        let venue = PaperVenue::new(PaperVenueConfig {
            initial_price: 100.0,
            volatility_bps: 0.0,
            fill_crossed_orders: true,
            ..Default::default()
        });
        venue.seed_order(Side::Long, 99.0);
        venue.seed_order(Side::Short, 101.0);

        venue.set_price(98.5);
        venue.tick();

        assert_eq!(venue.order_count(Side::Long), 0);
        assert_eq!(venue.order_count(Side::Short), 1);
        assert_eq!(venue.position_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_removes_order() {
        let venue = PaperVenue::fixed(100.0);
        venue.seed_order(Side::Short, 101.0);
        let orders = venue.read_open_orders().await.unwrap();

        venue.cancel_order(&orders[0]).await.unwrap();
        assert_eq!(venue.cancellations(), 1);
        assert!(venue.cancel_order(&orders[0]).await.is_err());
    }
}
