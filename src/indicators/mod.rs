// Technical indicators computed from candle history
//
// Live venues report these values on their charts; the paper venue derives them
// itself so the volatility gate sees realistic readings in dry runs.

pub mod atr;
pub mod rsi;

pub use atr::{calculate_atr, calculate_atr_series, true_ranges};
pub use rsi::calculate_rsi;

/// Lookback used for both ATR and RSI
pub const DEFAULT_PERIOD: usize = 14;
