//! # Beat Detection Module
//!
//! Finds heartbeats in the brightness series and turns them into RR intervals.
//!
//! ## Strategies
//! - `StreamingDetector`: checks each incoming sample's predecessor for a strict
//!   3-sample local maximum and accepts it when the time since the previous beat
//!   lies inside the streaming RR band (default 400-1500 ms).
//! - `BatchDetector`: at the end of the session, detrends the whole buffer,
//!   thresholds at `P25 + k * (P75 - P25)`, picks ±2-sample local maxima with a
//!   minimum spacing away from the buffer edges, and converts index gaps to
//!   milliseconds at the configured sample rate (default band 300-2000 ms).
//!
//! Both share `RrBounds::contains`, and both drop out-of-band intervals instead
//! of clamping them. The per-strategy bands differ on purpose.

use crate::conditioner::SignalConditioner;
use crate::config::{DetectionMode, MeasurementConfig, RrBounds};
use crate::timeseries::Sample;

impl RrBounds {
    /// Inclusive plausibility check shared by both strategies
    pub fn contains(&self, interval_ms: f64) -> bool {
        interval_ms >= self.min_ms && interval_ms <= self.max_ms
    }
}

/// Beats and intervals accepted over one session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeatReport {
    /// Timestamps of accepted beats on the session clock
    pub peak_times_ms: Vec<f64>,
    /// RR intervals that passed the plausibility band
    pub intervals_ms: Vec<f64>,
}

impl BeatReport {
    pub fn beat_count(&self) -> usize {
        self.peak_times_ms.len()
    }
}

pub trait BeatDetector: Send {
    fn mode(&self) -> DetectionMode;

    /// Feed one sample as it arrives
    fn observe(&mut self, sample: &Sample);

    /// Beats accepted so far, for progress reporting
    fn beats_so_far(&self) -> usize;

    /// Final beats and intervals given the session's buffered samples
    fn finish(&mut self, samples: &[Sample]) -> BeatReport;

    fn reset(&mut self);
}

/// Detector selected by `config.detection_mode`
pub fn build_detector(config: &MeasurementConfig) -> Box<dyn BeatDetector> {
    match config.detection_mode {
        DetectionMode::Streaming => Box::new(StreamingDetector::new(config.streaming_rr_bounds)),
        DetectionMode::Batch => Box::new(BatchDetector::new(config)),
    }
}

pub struct StreamingDetector {
    bounds: RrBounds,
    previous: Option<Sample>,
    candidate: Option<Sample>,
    last_beat_ms: Option<f64>,
    report: BeatReport,
}

impl StreamingDetector {
    pub fn new(bounds: RrBounds) -> Self {
        Self {
            bounds,
            previous: None,
            candidate: None,
            last_beat_ms: None,
            report: BeatReport::default(),
        }
    }

    fn on_peak(&mut self, time_ms: f64) {
        let Some(last) = self.last_beat_ms else {
            self.last_beat_ms = Some(time_ms);
            self.report.peak_times_ms.push(time_ms);
            return;
        };

        let elapsed = time_ms - last;
        if elapsed < self.bounds.min_ms {
            // Too soon: a dicrotic notch or noise, keep the previous anchor
            log::debug!("Ignoring peak {:.0} ms after last beat", elapsed);
            return;
        }

        if self.bounds.contains(elapsed) {
            log::debug!("Beat at {:.0} ms, RR {:.0} ms", time_ms, elapsed);
            self.report.intervals_ms.push(elapsed);
        } else {
            // Missed beat; restart the interval chain from here
            log::debug!("Dropping {:.0} ms interval outside RR band", elapsed);
        }
        self.last_beat_ms = Some(time_ms);
        self.report.peak_times_ms.push(time_ms);
    }
}

impl BeatDetector for StreamingDetector {
    fn mode(&self) -> DetectionMode {
        DetectionMode::Streaming
    }

    fn observe(&mut self, sample: &Sample) {
        if let (Some(previous), Some(candidate)) = (self.previous, self.candidate) {
            if candidate.brightness > previous.brightness && candidate.brightness > sample.brightness {
                self.on_peak(candidate.time_ms);
            }
        }
        self.previous = self.candidate;
        self.candidate = Some(*sample);
    }

    fn beats_so_far(&self) -> usize {
        self.report.beat_count()
    }

    fn finish(&mut self, _samples: &[Sample]) -> BeatReport {
        self.report.clone()
    }

    fn reset(&mut self) {
        self.previous = None;
        self.candidate = None;
        self.last_beat_ms = None;
        self.report = BeatReport::default();
    }
}

pub struct BatchDetector {
    conditioner: SignalConditioner,
    bounds: RrBounds,
    sample_rate_hz: f64,
    min_peak_distance_ms: f64,
    threshold_multiplier: f64,
}

impl BatchDetector {
    pub fn new(config: &MeasurementConfig) -> Self {
        Self {
            conditioner: SignalConditioner::new(config.detrend_radius),
            bounds: config.batch_rr_bounds,
            sample_rate_hz: config.sample_rate_hz,
            min_peak_distance_ms: config.min_peak_distance_ms,
            threshold_multiplier: config.threshold_multiplier,
        }
    }

    fn min_peak_distance(&self) -> usize {
        (self.min_peak_distance_ms * self.sample_rate_hz / 1000.0)
            .round()
            .max(1.0) as usize
    }

    /// Indices of accepted peaks in a detrended signal.
    ///
    /// Samples whose detrend window was truncated by the buffer edge are not
    /// peak candidates; their baseline estimate is lopsided.
    pub fn find_peaks(&self, signal: &[f64]) -> Vec<usize> {
        let margin = self.conditioner.radius().max(2);
        if signal.len() < 5 || signal.len() <= 2 * margin {
            return Vec::new();
        }

        let threshold = adaptive_threshold(signal, self.threshold_multiplier);
        let min_distance = self.min_peak_distance();
        let mut peaks: Vec<usize> = Vec::new();

        for i in margin..signal.len() - margin {
            let value = signal[i];
            let is_local_max = value > threshold
                && value > signal[i - 2]
                && value > signal[i - 1]
                && value > signal[i + 1]
                && value > signal[i + 2];
            if !is_local_max {
                continue;
            }

            match peaks.last().copied() {
                Some(last) if i - last < min_distance => {
                    // Within the refractory window keep the taller of the two
                    if value > signal[last] {
                        if let Some(slot) = peaks.last_mut() {
                            *slot = i;
                        }
                    }
                }
                _ => peaks.push(i),
            }
        }

        peaks
    }
}

impl BeatDetector for BatchDetector {
    fn mode(&self) -> DetectionMode {
        DetectionMode::Batch
    }

    fn observe(&mut self, _sample: &Sample) {}

    fn beats_so_far(&self) -> usize {
        0
    }

    fn finish(&mut self, samples: &[Sample]) -> BeatReport {
        let brightness: Vec<f64> = samples.iter().map(|s| s.brightness).collect();
        let detrended = self.conditioner.detrend(&brightness);
        let peaks = self.find_peaks(&detrended);

        let ms_per_sample = 1000.0 / self.sample_rate_hz;
        let intervals_ms = peaks
            .windows(2)
            .map(|w| (w[1] - w[0]) as f64 * ms_per_sample)
            .filter(|&interval| self.bounds.contains(interval))
            .collect();

        BeatReport {
            peak_times_ms: peaks.iter().map(|&i| samples[i].time_ms).collect(),
            intervals_ms,
        }
    }

    fn reset(&mut self) {}
}

/// Linear-interpolated percentile, `p` in [0, 100]
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// `P25 + multiplier * (P75 - P25)`
pub fn adaptive_threshold(signal: &[f64], multiplier: f64) -> f64 {
    match (percentile(signal, 25.0), percentile(signal, 75.0)) {
        (Some(p25), Some(p75)) => p25 + multiplier * (p75 - p25),
        _ => 0.0,
    }
}
