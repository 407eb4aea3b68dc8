use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Basis points per unit of price
pub const BPS_PER_UNIT: f64 = 10_000.0;

/// Side of a resting order or open position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

struct SideTraits {
    direction: f64,
    label: &'static str,
    opposite: Side,
}

const LONG_TRAITS: SideTraits = SideTraits {
    direction: -1.0, // bids rest below price
    label: "LONG",
    opposite: Side::Short,
};

const SHORT_TRAITS: SideTraits = SideTraits {
    direction: 1.0, // asks rest above price
    label: "SHORT",
    opposite: Side::Long,
};

impl Side {
    pub const BOTH: [Side; 2] = [Side::Long, Side::Short];

    fn traits(self) -> &'static SideTraits {
        match self {
            Side::Long => &LONG_TRAITS,
            Side::Short => &SHORT_TRAITS,
        }
    }

    /// Sign applied to a bps distance when moving away from price
    pub fn direction(self) -> f64 {
        self.traits().direction
    }

    /// Upper-case label the venue shows for this side
    pub fn label(self) -> &'static str {
        self.traits().label
    }

    pub fn opposite(self) -> Side {
        self.traits().opposite
    }

    /// Label of the control that confirms closing a position on this side.
    ///
    /// Closing a long is confirmed with a "SHORT" control and vice versa.
    pub fn close_confirmation_label(self) -> &'static str {
        self.opposite().label()
    }

    /// Multiplier that places an order `bps` away from price on this side
    ///
    /// # Example
    /// ```
    /// use ladderbot::models::Side;
    ///
    /// assert!((Side::Long.price_multiplier(6.0) - 0.9994).abs() < 1e-12);
    /// assert!((Side::Short.price_multiplier(6.0) - 1.0006).abs() < 1e-12);
    /// ```
    pub fn price_multiplier(self, bps: f64) -> f64 {
        1.0 + self.direction() * bps / BPS_PER_UNIT
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// Venue-supplied handle used to cancel a resting order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct OrderHandle(pub Uuid);

/// Venue-supplied handle used to close an open position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PositionHandle(pub Uuid);

impl OrderHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrderHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PositionHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Resting limit order as read from the venue this cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub side: Side,
    pub price: f64,
    pub handle: OrderHandle,
}

/// Open position as read from the venue this cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub side: Side,
    pub handle: PositionHandle,
}

/// Indicator values shown by the venue chart
///
/// Only ATR feeds the volatility gate; ADX and RSI are carried for logging.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct IndicatorReading {
    pub atr: Option<f64>,
    pub adx: Option<f64>,
    pub rsi: Option<f64>,
}

impl IndicatorReading {
    pub fn with_atr(atr: f64) -> Self {
        Self {
            atr: Some(atr),
            ..Default::default()
        }
    }
}

/// OHLCV candlestick data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Count orders resting on one side
pub fn count_side(orders: &[Order], side: Side) -> usize {
    orders.iter().filter(|o| o.side == side).count()
}
