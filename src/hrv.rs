//! # HRV Estimator Module
//!
//! Turns accepted RR intervals into the terminal metrics record.
//!
//! ## Statistics
//! - Heart rate: `round(60000 / mean RR)`, clamped to 40-200 bpm
//! - SDNN: population standard deviation of RR intervals
//! - RMSSD: root mean square of successive RR differences
//! - Signal quality: 100 minus cumulative deductions for a flat or noisy
//!   brightness trace, too few intervals, or wildly scattered intervals
//!
//! `estimate` is all-or-nothing: below the minimum interval count it returns
//! `MeasurementError::InsufficientBeats` and no partial record exists.

use crate::classify::{classify, AutonomicBalance, Classification, CoachingState, StressLevel};
use crate::config::MeasurementConfig;
use crate::error::MeasurementError;
use crate::timeseries::SeriesStatsExt;
use chrono::{DateTime, Utc};
use serde::Serialize;

const MIN_HEART_RATE: f64 = 40.0;
const MAX_HEART_RATE: f64 = 200.0;

// Signal quality deductions
const FLAT_CV: f64 = 0.01;
const NOISY_CV: f64 = 0.5;
const FLAT_PENALTY: i32 = 40;
const NOISY_PENALTY: i32 = 30;
const FEW_INTERVALS: usize = 3;
const FEW_INTERVALS_PENALTY: i32 = 30;
const RR_VARIANCE_LIMIT: f64 = 100_000.0;
const RR_VARIANCE_PENALTY: i32 = 20;

/// One completed reading; owned by the caller once emitted
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HrvMetrics {
    pub heart_rate: u32,
    pub sdnn: f64,
    pub rmssd: f64,
    pub signal_quality: u8,
    pub stress_level: StressLevel,
    pub autonomic_balance: AutonomicBalance,
    pub coaching_state: CoachingState,
    pub rr_intervals: Vec<f64>,
    pub beat_count: usize,
    pub measured_at: DateTime<Utc>,
}

impl HrvMetrics {
    pub fn classification(&self) -> Classification {
        Classification {
            stress_level: self.stress_level,
            autonomic_balance: self.autonomic_balance,
            coaching_state: self.coaching_state,
        }
    }
}

pub fn mean_rr(rr_intervals: &[f64]) -> Option<f64> {
    rr_intervals.mean()
}

pub fn heart_rate(rr_intervals: &[f64]) -> Option<u32> {
    let mean = mean_rr(rr_intervals)?;
    if mean <= 0.0 {
        return None;
    }
    Some((60_000.0 / mean).round().clamp(MIN_HEART_RATE, MAX_HEART_RATE) as u32)
}

/// Population variance of RR intervals in ms²
pub fn rr_variance(rr_intervals: &[f64]) -> f64 {
    match mean_rr(rr_intervals) {
        Some(mean) => {
            rr_intervals.iter().map(|x| (x - mean).powi(2)).sum::<f64>()
                / rr_intervals.len() as f64
        }
        None => 0.0,
    }
}

pub fn sdnn(rr_intervals: &[f64]) -> f64 {
    rr_variance(rr_intervals).sqrt()
}

pub fn rmssd(rr_intervals: &[f64]) -> f64 {
    if rr_intervals.len() < 2 {
        return 0.0;
    }
    let sum_sq: f64 = rr_intervals
        .windows(2)
        .map(|w| (w[1] - w[0]).powi(2))
        .sum();
    (sum_sq / (rr_intervals.len() - 1) as f64).sqrt()
}

/// 0-100 diagnostic score; never gates whether a reading is emitted
pub fn signal_quality(brightness: &[f64], rr_intervals: &[f64]) -> u8 {
    let mut score: i32 = 100;

    let cv = brightness.coefficient_of_variation();
    if cv < FLAT_CV {
        score -= FLAT_PENALTY;
    }
    if cv > NOISY_CV {
        score -= NOISY_PENALTY;
    }
    if rr_intervals.len() < FEW_INTERVALS {
        score -= FEW_INTERVALS_PENALTY;
    }
    if rr_variance(rr_intervals) > RR_VARIANCE_LIMIT {
        score -= RR_VARIANCE_PENALTY;
    }

    score.clamp(0, 100) as u8
}

/// Build the metrics record, or refuse when too few intervals were captured
pub fn estimate(
    rr_intervals: &[f64],
    brightness: &[f64],
    beat_count: usize,
    config: &MeasurementConfig,
) -> Result<HrvMetrics, MeasurementError> {
    if rr_intervals.len() < config.min_rr_intervals {
        return Err(MeasurementError::InsufficientBeats {
            captured: rr_intervals.len(),
            required: config.min_rr_intervals,
        });
    }

    let heart_rate = heart_rate(rr_intervals).ok_or(MeasurementError::InsufficientBeats {
        captured: 0,
        required: config.min_rr_intervals,
    })?;
    let sdnn = sdnn(rr_intervals);
    let rmssd = rmssd(rr_intervals);
    let classification = classify(rmssd, sdnn, heart_rate, config.rmssd_coach_threshold_ms);

    Ok(HrvMetrics {
        heart_rate,
        sdnn,
        rmssd,
        signal_quality: signal_quality(brightness, rr_intervals),
        stress_level: classification.stress_level,
        autonomic_balance: classification.autonomic_balance,
        coaching_state: classification.coaching_state,
        rr_intervals: rr_intervals.to_vec(),
        beat_count,
        measured_at: Utc::now(),
    })
}
