// =============================================================================
// Support / Resistance levels
// =============================================================================
//
// 1. A bar is a local high (low) when its high (low) is strictly greater
//    (less) than the highs (lows) of the `sensitivity` bars on both sides.
// 2. Each extremum is weighted by recency: w = exp(-decay * (len - i)).
// 3. Levels are clustered greedily in input order: a level joins the first
//    cluster whose price lies within `threshold` (relative to the level) and
//    moves that cluster's price to the weighted average of its members.
// 4. The `max_levels` clusters with the highest accumulated weight are kept,
//    the all-time high and low of the window are always added, and the result
//    is returned in ascending order with prices rounded to cents.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::Bar;

/// Tuning knobs for level detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelParams {
    /// Bars on each side an extremum must dominate.
    #[serde(default = "default_sensitivity")]
    pub sensitivity: usize,
    /// Maximum relative distance for two levels to share a cluster.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Number of clusters kept, excluding the all-time extremes.
    #[serde(default = "default_max_levels")]
    pub max_levels: usize,
    /// Exponential recency decay per bar.
    #[serde(default = "default_decay")]
    pub decay: f64,
}

fn default_sensitivity() -> usize {
    5
}

fn default_threshold() -> f64 {
    0.01
}

fn default_max_levels() -> usize {
    10
}

fn default_decay() -> f64 {
    0.005
}

impl Default for LevelParams {
    fn default() -> Self {
        Self {
            sensitivity: default_sensitivity(),
            threshold: default_threshold(),
            max_levels: default_max_levels(),
            decay: default_decay(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Cluster {
    price: f64,
    weighted_sum: f64,
    weight_total: f64,
    score: f64,
}

/// Detect the most important support/resistance prices in `bars`.
///
/// Returns an empty vector for empty input.
pub fn support_resistance_levels(bars: &[Bar], params: &LevelParams) -> Vec<f64> {
    if bars.is_empty() {
        return Vec::new();
    }

    let len = bars.len();
    let s = params.sensitivity;
    let mut clusters: Vec<Cluster> = Vec::new();

    for i in s..len.saturating_sub(s) {
        let neighbours = (1..=s).flat_map(|j| [i - j, i + j]);
        let is_high = neighbours.clone().all(|k| bars[i].high > bars[k].high);
        let is_low = neighbours.clone().all(|k| bars[i].low < bars[k].low);
        if !is_high && !is_low {
            continue;
        }

        let price = if is_high { bars[i].high } else { bars[i].low };
        let weight = (-params.decay * (len - i) as f64).exp();

        let matched = clusters
            .iter_mut()
            .find(|c| price != 0.0 && ((c.price - price) / price).abs() < params.threshold);
        match matched {
            Some(cluster) => {
                cluster.weighted_sum += price * weight;
                cluster.weight_total += weight;
                cluster.score += weight;
                cluster.price = cluster.weighted_sum / cluster.weight_total;
            }
            None => clusters.push(Cluster {
                price,
                weighted_sum: price * weight,
                weight_total: weight,
                score: weight,
            }),
        }
    }

    clusters.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut levels: Vec<f64> = clusters
        .iter()
        .take(params.max_levels)
        .map(|c| round_cents(c.price))
        .collect();

    let all_time_high = round_cents(bars.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max));
    let all_time_low = round_cents(bars.iter().map(|b| b.low).fold(f64::INFINITY, f64::min));
    for extreme in [all_time_high, all_time_low] {
        if !levels.contains(&extreme) {
            levels.push(extreme);
        }
    }

    levels.sort_by(f64::total_cmp);
    debug!(clusters = clusters.len(), levels = levels.len(), "support/resistance levels detected");
    levels
}

fn round_cents(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn series(prices: &[(f64, f64)]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2025, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &(high, low))| Bar {
                time: start + chrono::Duration::minutes(i as i64),
                open: low,
                high,
                low,
                close: high,
                volume: 1,
            })
            .collect()
    }

    /// Zig-zag with peaks near 110 and troughs near 90 every 10 bars.
    fn zigzag(cycles: usize) -> Vec<Bar> {
        let mut prices = Vec::new();
        for c in 0..cycles {
            let wobble = (c % 3) as f64 * 0.2;
            for k in 0..10 {
                let mid = if k <= 5 {
                    90.0 + 4.0 * k as f64
                } else {
                    110.0 - 4.0 * (k - 5) as f64
                };
                let mid = if k == 5 { mid + wobble } else { mid };
                prices.push((mid + 1.0, mid - 1.0));
            }
        }
        series(&prices)
    }

    #[test]
    fn empty_input() {
        assert!(support_resistance_levels(&[], &LevelParams::default()).is_empty());
    }

    #[test]
    fn always_includes_extremes_sorted() {
        let bars = zigzag(6);
        let levels = support_resistance_levels(&bars, &LevelParams::default());
        let high = bars.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let low = bars.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        assert!(levels.contains(&round_cents(high)));
        assert!(levels.contains(&round_cents(low)));
        assert!(levels.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn clusters_repeated_peaks() {
        let bars = zigzag(8);
        let params = LevelParams {
            sensitivity: 3,
            ..LevelParams::default()
        };
        let levels = support_resistance_levels(&bars, &params);
        // Peaks at 111.0..111.4 collapse into one cluster near 111.
        let near_peak = levels.iter().filter(|&&p| (p - 111.2).abs() < 1.0).count();
        assert!(near_peak <= 2, "peaks not clustered: {levels:?}");
    }

    #[test]
    fn max_levels_limits_clusters() {
        let bars = zigzag(8);
        let params = LevelParams {
            sensitivity: 3,
            max_levels: 1,
            ..LevelParams::default()
        };
        let levels = support_resistance_levels(&bars, &params);
        assert!(levels.len() <= 3, "{levels:?}");
    }

    #[test]
    fn short_window_returns_only_extremes() {
        let bars = series(&[(10.0, 9.0), (12.0, 8.0), (11.0, 9.5)]);
        let levels = support_resistance_levels(&bars, &LevelParams::default());
        assert_eq!(levels, vec![8.0, 12.0]);
    }
}
