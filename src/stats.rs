//! Latency statistics
//!
//! Reduces the successful trial samples of one endpoint to min/avg/max,
//! rounded to one decimal place.

/// Statistics for a set of latency samples, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencyStats {
    pub min_ms: f64,
    pub max_ms: f64,
    pub avg_ms: f64,
    /// Number of valid samples
    pub count: usize,
}

impl LatencyStats {
    /// Compute statistics from millisecond samples.
    ///
    /// Non-finite and negative samples are ignored. Returns `None` when no
    /// valid sample remains.
    ///
    /// # Example
    /// ```
    /// use region_latency::stats::LatencyStats;
    ///
    /// let stats = LatencyStats::from_samples(&[50.0, 55.0, 52.0]).unwrap();
    /// assert_eq!(stats.min_ms, 50.0);
    /// assert_eq!(stats.max_ms, 55.0);
    /// assert_eq!(stats.avg_ms, 52.3);
    /// ```
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        let valid: Vec<f64> = samples
            .iter()
            .copied()
            .filter(|x| x.is_finite() && *x >= 0.0)
            .collect();

        if valid.is_empty() {
            return None;
        }

        let count = valid.len();
        let sum: f64 = valid.iter().sum();
        let min = valid.iter().copied().fold(f64::INFINITY, f64::min);
        let max = valid.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(Self {
            min_ms: round1(min),
            max_ms: round1(max),
            avg_ms: round1(sum / count as f64),
            count,
        })
    }
}

/// Round to one decimal place.
///
/// Halves round away from zero (`f64::round`), so `52.25` becomes `52.3`.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Round to two decimal places, halves away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
