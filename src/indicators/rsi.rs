/// Relative Strength Index (RSI)
///
/// Average gain against average loss over the last `period` price changes.
/// Reported alongside ATR for context only.
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let (gain, loss) = prices
        .windows(2)
        .rev()
        .take(period)
        .map(|pair| pair[1] - pair[0])
        .fold((0.0, 0.0), |(gain, loss), change| {
            if change > 0.0 {
                (gain + change, loss)
            } else {
                (gain, loss - change)
            }
        });

    if loss == 0.0 {
        return Some(100.0);
    }

    let rs = (gain / period as f64) / (loss / period as f64);
    Some(100.0 - 100.0 / (1.0 + rs))
}
