//! # Signal Conditioner Module
//!
//! Removes slow illumination drift (hand movement, exposure changes) from the
//! brightness series while keeping the faster cardiac oscillation.
//!
//! Each output value is the input minus the mean of a symmetric window of
//! `radius` neighbours on each side. Near the edges the window is truncated to
//! whatever neighbours exist; there is no padding.

/// Below this many samples the series is returned untouched
const MIN_SAMPLES: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct SignalConditioner {
    radius: usize,
}

impl SignalConditioner {
    pub fn new(radius: usize) -> Self {
        Self { radius }
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Detrended copy of `signal`
    pub fn detrend(&self, signal: &[f64]) -> Vec<f64> {
        if signal.len() < MIN_SAMPLES {
            return signal.to_vec();
        }

        (0..signal.len())
            .map(|i| {
                let start = i.saturating_sub(self.radius);
                let end = (i + self.radius + 1).min(signal.len());
                let window = &signal[start..end];
                let local_mean = window.iter().sum::<f64>() / window.len() as f64;
                signal[i] - local_mean
            })
            .collect()
    }
}

impl Default for SignalConditioner {
    fn default() -> Self {
        Self::new(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_signal_unchanged() {
        let conditioner = SignalConditioner::default();
        let signal = [10.0, 12.0, 11.0, 13.0];
        assert_eq!(conditioner.detrend(&signal), signal.to_vec());
    }

    #[test]
    fn test_constant_signal_becomes_zero() {
        let conditioner = SignalConditioner::default();
        let detrended = conditioner.detrend(&[150.0; 40]);
        assert!(detrended.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn test_linear_drift_removed_in_interior() {
        let conditioner = SignalConditioner::new(5);
        let signal: Vec<f64> = (0..50).map(|i| 100.0 + 0.5 * i as f64).collect();
        let detrended = conditioner.detrend(&signal);

        // Symmetric windows cancel a linear ramp exactly
        for v in &detrended[5..45] {
            assert!(v.abs() < 1e-9);
        }
    }

    #[test]
    fn test_edges_use_available_neighbours() {
        let conditioner = SignalConditioner::new(2);
        let signal = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let detrended = conditioner.detrend(&signal);

        // First sample: window is [1, 2, 3]
        assert!((detrended[0] - (1.0 - 2.0)).abs() < 1e-12);
        // Last sample: window is [4, 5, 6]
        assert!((detrended[5] - (6.0 - 5.0)).abs() < 1e-12);
        assert_eq!(detrended.len(), signal.len());
    }

    #[test]
    fn test_oscillation_preserved_on_drift() {
        let conditioner = SignalConditioner::new(5);
        let signal: Vec<f64> = (0..240)
            .map(|i| {
                let t = i as f64;
                100.0 + 0.2 * t + 3.0 * (2.0 * std::f64::consts::PI * t / 24.0).cos()
            })
            .collect();
        let detrended = conditioner.detrend(&signal);

        // Peaks stay at multiples of the period
        assert!(detrended[48] > detrended[47]);
        assert!(detrended[48] > detrended[49]);
        assert!(detrended[48] > 0.0);
        assert!(detrended[60] < 0.0);
    }
}
