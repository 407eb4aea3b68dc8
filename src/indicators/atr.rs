/// Average True Range (ATR)
///
/// Volatility measure fed to the volatility gate. True Range of a candle is the
/// greatest of:
/// - High - Low
/// - |High - previous Close|
/// - |Low - previous Close|
///
/// The first ATR is the simple mean of the first `period` true ranges, later
/// values use Wilder's smoothing.

use crate::models::Candle;

/// True range of every candle after the first
pub fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .windows(2)
        .map(|pair| {
            let (prev, bar) = (&pair[0], &pair[1]);
            (bar.high - bar.low)
                .max((bar.high - prev.close).abs())
                .max((bar.low - prev.close).abs())
        })
        .collect()
}

/// ATR series aligned with candles from index `period` onward
///
/// Empty when fewer than `period + 1` candles are available.
pub fn calculate_atr_series(candles: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || candles.len() < period + 1 {
        return Vec::new();
    }

    let ranges = true_ranges(candles);
    let mut atr = ranges[..period].iter().sum::<f64>() / period as f64;

    let mut series = Vec::with_capacity(ranges.len() - period + 1);
    series.push(atr);
    for tr in &ranges[period..] {
        atr = (atr * (period as f64 - 1.0) + tr) / period as f64;
        series.push(atr);
    }

    series
}

/// Latest ATR value, or None if there is not enough history
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    calculate_atr_series(candles, period).last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candles_from(bars: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        bars.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Candle {
                timestamp: Utc::now() + chrono::Duration::seconds(i as i64),
                open,
                high,
                low,
                close,
                volume: 0.0,
            })
            .collect()
    }

    #[test]
    fn test_flat_range_atr() {
        let candles = candles_from(&[(100.0, 101.0, 99.0, 100.0); 15]);
        let atr = calculate_atr(&candles, 14).unwrap();
        assert!((atr - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_gap_counts_toward_true_range() {
        // Second bar gaps up: high-low is 1, but |low - prev close| is 9
        let candles = candles_from(&[(100.0, 100.0, 100.0, 100.0), (110.0, 110.0, 109.0, 110.0)]);
        assert_eq!(true_ranges(&candles), vec![10.0]);
    }

    #[test]
    fn test_wilder_smoothing() {
        let mut bars = vec![(100.0, 101.0, 99.0, 100.0); 3];
        bars.push((100.0, 105.0, 95.0, 100.0));
        let candles = candles_from(&bars);

        // period 2: first ATR = (2 + 2) / 2 = 2, then (2 * 1 + 10) / 2 = 6
        let series = calculate_atr_series(&candles, 2);
        assert_eq!(series, vec![2.0, 6.0]);
    }

    #[test]
    fn test_insufficient_data() {
        let candles = candles_from(&[(100.0, 101.0, 99.0, 100.0); 2]);
        assert!(calculate_atr(&candles, 14).is_none());
        assert!(calculate_atr_series(&candles, 0).is_empty());
    }
}
