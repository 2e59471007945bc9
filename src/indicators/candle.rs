// =============================================================================
// Candle-shape classification
// =============================================================================
//
// The bar's range is split into five equal bands numbered 1 (bottom) to 5
// (top).  The code is `open_band * 10 + close_band`, so 15 is a full-range
// bullish body and 51 its bearish mirror.  Zero-range bars are coded 0.

use crate::types::Bar;

/// Number of equal bands the range is split into.
const BANDS: f64 = 5.0;

/// Classify a bar by the bands its open and close fall into.
pub fn candle_type(bar: &Bar) -> u8 {
    classify(bar.open, bar.high, bar.low, bar.close)
}

/// Classification code in `0..=55` for raw prices.
pub fn classify(open: f64, high: f64, low: f64, close: f64) -> u8 {
    let range = high - low;
    if !range.is_finite() || range <= 0.0 {
        return 0;
    }
    band(open, low, range) * 10 + band(close, low, range)
}

fn band(price: f64, low: f64, range: f64) -> u8 {
    let position = ((price - low) / range * BANDS).floor();
    // `as` saturates NaN to 0, which the clamp turns into band 1.
    (position as i64 + 1).clamp(1, 5) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_bar_is_zero() {
        assert_eq!(classify(10.0, 10.0, 10.0, 10.0), 0);
        assert_eq!(classify(10.0, 9.0, 11.0, 10.0), 0);
        assert_eq!(classify(10.0, f64::NAN, 9.0, 10.0), 0);
        assert_eq!(classify(10.0, f64::INFINITY, 9.0, 10.0), 0);
    }

    #[test]
    fn full_bodies() {
        assert_eq!(classify(0.0, 10.0, 0.0, 10.0), 15);
        assert_eq!(classify(10.0, 10.0, 0.0, 0.0), 51);
    }

    #[test]
    fn band_edges() {
        // Range 0..10, bands of width 2: [0,2) -> 1, [2,4) -> 2, ..., [8,10] -> 5
        assert_eq!(classify(1.9, 10.0, 0.0, 2.0), 12);
        assert_eq!(classify(5.0, 10.0, 0.0, 7.9), 34);
        assert_eq!(classify(8.0, 10.0, 0.0, 9.99), 55);
    }

    #[test]
    fn invariant_to_positive_scaling() {
        let bars = [
            (100.0, 102.0, 99.0, 101.0),
            (101.0, 105.0, 100.0, 104.0),
            (50.3, 51.7, 48.9, 49.1),
            (12.0, 12.0, 11.0, 11.5),
        ];
        for &(o, h, l, c) in &bars {
            let code = classify(o, h, l, c);
            for k in [0.25, 0.5, 2.0, 8.0, 1024.0] {
                assert_eq!(classify(o * k, h * k, l * k, c * k), code, "scale {k} changed code");
            }
        }
    }

    #[test]
    fn open_near_low_close_near_high() {
        // Range 3: open at 1/3 of range -> band 2, close at 2/3 -> band 4.
        assert_eq!(classify(100.0, 102.0, 99.0, 101.0), 24);
        assert_eq!(classify(12.0, 12.0, 11.0, 11.5), 53);
    }
}
