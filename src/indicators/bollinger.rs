// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Middle band = rolling mean of close over `period`, band width = rolling
// population standard deviation (ddof = 0).  Every multiplier `m` yields one
// band pair: middle ± m·σ.  Percent-B is expressed in standard deviations:
//   %B = (close - middle) / σ          (0 when σ is 0)
//
// Until the first full window the middle band falls back to the close itself
// and σ to zero, so the bands collapse onto price instead of being undefined.

use crate::error::IndicatorError;

/// Upper/lower band pair for one standard-deviation multiplier.
#[derive(Debug, Clone)]
pub struct Band {
    pub multiplier: f64,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Bollinger series aligned with the input closes.
#[derive(Debug, Clone)]
pub struct BollingerSeries {
    pub middle: Vec<f64>,
    pub std_dev: Vec<f64>,
    pub percent_b: Vec<f64>,
    pub bands: Vec<Band>,
}

/// Calculate Bollinger Bands for `closes` with one band pair per entry of
/// `multipliers`.
///
/// Returns `InsufficientData` when `closes.len() <= period` and
/// `InvalidParameter` when `period` is zero or no multiplier is given.
pub fn calculate_bollinger(
    closes: &[f64],
    period: usize,
    multipliers: &[f64],
) -> Result<BollingerSeries, IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::InvalidParameter {
            indicator: "BollingerBands",
            reason: "period must be positive".into(),
        });
    }
    if multipliers.is_empty() {
        return Err(IndicatorError::InvalidParameter {
            indicator: "BollingerBands",
            reason: "at least one multiplier is required".into(),
        });
    }
    if closes.len() <= period {
        return Err(IndicatorError::InsufficientData {
            indicator: "BollingerBands",
            needed: period,
            got: closes.len(),
        });
    }

    let n = closes.len();
    let period_f = period as f64;
    let mut middle = Vec::with_capacity(n);
    let mut std_dev = Vec::with_capacity(n);

    for i in 0..n {
        if i + 1 < period {
            middle.push(closes[i]);
            std_dev.push(0.0);
            continue;
        }
        let window = &closes[i + 1 - period..=i];
        let mean = window.iter().sum::<f64>() / period_f;
        let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period_f;
        middle.push(mean);
        std_dev.push(if variance.is_finite() { variance.sqrt() } else { 0.0 });
    }

    let percent_b = closes
        .iter()
        .zip(middle.iter().zip(&std_dev))
        .map(|(&c, (&m, &s))| {
            if s == 0.0 {
                return 0.0;
            }
            let pc = (c - m) / s;
            if pc.is_finite() {
                pc
            } else {
                0.0
            }
        })
        .collect();

    let bands = multipliers
        .iter()
        .map(|&k| Band {
            multiplier: k,
            upper: middle.iter().zip(&std_dev).map(|(m, s)| m + k * s).collect(),
            lower: middle.iter().zip(&std_dev).map(|(m, s)| m - k * s).collect(),
        })
        .collect();

    Ok(BollingerSeries {
        middle,
        std_dev,
        percent_b,
        bands,
    })
}
