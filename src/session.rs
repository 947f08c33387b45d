//! # Measurement Session Module
//!
//! One explicit, caller-owned record per measurement attempt. Holds the
//! sampler, the rolling buffer and the detector, and wires them together:
//!
//! ```text
//! start(now) ─▶ tick(frame, now) ... ─▶ finish() ─▶ Some(SessionOutcome)
//!                    │                      ▲
//!                    └── Expired ───────────┘      abort() discards everything
//! ```
//!
//! Nothing here touches a clock or a thread; hosts pass timestamps in, which
//! keeps the whole pipeline testable without a camera.

use crate::classify::feedback_text;
use crate::config::MeasurementConfig;
use crate::detector::{build_detector, BeatDetector};
use crate::error::MeasurementError;
use crate::hrv::{self, HrvMetrics};
use crate::sampler::{Frame, FrameSampler};
use crate::timeseries::{Sample, SampleBuffer};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Measuring,
    Complete,
    Failed,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureReason {
    InsufficientBeats,
    SourceUnavailable,
    PermissionDenied,
}

/// The single terminal event of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum SessionOutcome {
    Success { metrics: HrvMetrics, feedback: String },
    Failure { reason: FailureReason },
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SessionOutcome::Success { .. })
    }

    pub fn metrics(&self) -> Option<&HrvMetrics> {
        match self {
            SessionOutcome::Success { metrics, .. } => Some(metrics),
            SessionOutcome::Failure { .. } => None,
        }
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            SessionOutcome::Success { .. } => None,
            SessionOutcome::Failure { reason } => Some(*reason),
        }
    }
}

/// Result of feeding one tick into the session
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickStatus {
    Sampled(Sample),
    /// No frame, or a frame with no usable pixels
    Skipped,
    /// Session duration reached; call `finish`
    Expired,
    /// Session is not measuring
    Inactive,
}

pub struct MeasurementSession {
    config: MeasurementConfig,
    phase: SessionPhase,
    started_at_ms: f64,
    elapsed_ms: f64,
    sampler: FrameSampler,
    buffer: SampleBuffer,
    detector: Box<dyn BeatDetector>,
    samples_seen: usize,
    skipped_ticks: usize,
}

impl MeasurementSession {
    pub fn new(config: MeasurementConfig) -> Self {
        Self {
            sampler: FrameSampler::new(&config),
            buffer: SampleBuffer::new(config.buffer_capacity),
            detector: build_detector(&config),
            config,
            phase: SessionPhase::Idle,
            started_at_ms: 0.0,
            elapsed_ms: 0.0,
            samples_seen: 0,
            skipped_ticks: 0,
        }
    }

    pub fn config(&self) -> &MeasurementConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    /// Fraction of the session duration elapsed, 0.0-1.0
    pub fn progress(&self) -> f64 {
        (self.elapsed_ms / self.config.session_duration_ms()).clamp(0.0, 1.0)
    }

    pub fn samples_seen(&self) -> usize {
        self.samples_seen
    }

    pub fn buffered_samples(&self) -> usize {
        self.buffer.len()
    }

    pub fn skipped_ticks(&self) -> usize {
        self.skipped_ticks
    }

    /// Brightness of the newest buffered sample, for live signal display
    pub fn latest_brightness(&self) -> Option<f64> {
        self.buffer.last_point().map(|s| s.brightness)
    }

    pub fn beats_so_far(&self) -> usize {
        self.detector.beats_so_far()
    }

    /// Begin measuring; any state from an earlier attempt is dropped
    pub fn start(&mut self, now_ms: f64) {
        self.clear();
        self.started_at_ms = now_ms;
        self.phase = SessionPhase::Measuring;
        let band = self.config.active_rr_bounds();
        log::info!(
            "Measurement started ({:?} detection, RR {:.0}-{:.0} ms, {:.0} s)",
            self.detector.mode(),
            band.min_ms,
            band.max_ms,
            self.config.session_duration_secs
        );
    }

    pub fn is_expired(&self, now_ms: f64) -> bool {
        now_ms - self.started_at_ms >= self.config.session_duration_ms()
    }

    /// Sample one frame (or note its absence) at `now_ms`
    pub fn tick(&mut self, frame: Option<&Frame>, now_ms: f64) -> TickStatus {
        if let Some(status) = self.advance_clock(now_ms) {
            return status;
        }

        match frame.and_then(|f| self.sampler.tick(f, now_ms)) {
            Some(sample) => {
                self.record(sample);
                TickStatus::Sampled(sample)
            }
            None => {
                self.skipped_ticks += 1;
                log::trace!("Skipped tick at {:.0} ms", now_ms);
                TickStatus::Skipped
            }
        }
    }

    /// Feed an already-reduced brightness sample
    pub fn push_sample(&mut self, sample: Sample) -> TickStatus {
        if let Some(status) = self.advance_clock(sample.time_ms) {
            return status;
        }
        self.record(sample);
        TickStatus::Sampled(sample)
    }

    fn advance_clock(&mut self, now_ms: f64) -> Option<TickStatus> {
        if self.phase != SessionPhase::Measuring {
            return Some(TickStatus::Inactive);
        }
        self.elapsed_ms = (now_ms - self.started_at_ms).max(0.0);
        if self.is_expired(now_ms) {
            return Some(TickStatus::Expired);
        }
        None
    }

    fn record(&mut self, sample: Sample) {
        self.buffer.push(sample);
        self.detector.observe(&sample);
        self.samples_seen += 1;
    }

    /// Run detection and estimation over what was collected, then clear.
    ///
    /// Valid after expiry or an early stop. Returns `None` when no session is
    /// measuring, so an outcome is produced at most once per `start`.
    pub fn finish(&mut self) -> Option<SessionOutcome> {
        if self.phase != SessionPhase::Measuring {
            log::warn!("finish() called in {:?} phase, nothing to report", self.phase);
            return None;
        }

        let samples = self.buffer.snapshot();
        let brightness = self.buffer.brightness();
        let report = self.detector.finish(&samples);
        log::info!(
            "Detected {} beats, {} valid RR intervals from {} samples ({} skipped ticks)",
            report.beat_count(),
            report.intervals_ms.len(),
            self.samples_seen,
            self.skipped_ticks
        );

        let outcome = match hrv::estimate(
            &report.intervals_ms,
            &brightness,
            report.beat_count(),
            &self.config,
        ) {
            Ok(metrics) => {
                let feedback =
                    feedback_text(&metrics.classification(), metrics.heart_rate, metrics.rmssd);
                log::info!(
                    "HR {} bpm, SDNN {:.1} ms, RMSSD {:.1} ms, quality {}",
                    metrics.heart_rate,
                    metrics.sdnn,
                    metrics.rmssd,
                    metrics.signal_quality
                );
                self.phase = SessionPhase::Complete;
                SessionOutcome::Success { metrics, feedback }
            }
            Err(err) => {
                log::info!("Measurement failed: {}", err);
                self.phase = SessionPhase::Failed;
                SessionOutcome::Failure { reason: err.reason() }
            }
        };

        self.clear();
        Some(outcome)
    }

    /// End the session on a source failure
    pub fn fail(&mut self, error: MeasurementError) -> SessionOutcome {
        log::error!("Measurement failed: {}", error);
        self.clear();
        self.phase = SessionPhase::Failed;
        SessionOutcome::Failure { reason: error.reason() }
    }

    /// Drop the session without an outcome
    pub fn abort(&mut self) {
        if self.phase == SessionPhase::Measuring {
            log::info!("Measurement aborted after {:.0} ms", self.elapsed_ms);
        }
        self.clear();
        self.phase = SessionPhase::Aborted;
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.detector.reset();
        self.samples_seen = 0;
        self.skipped_ticks = 0;
        self.elapsed_ms = 0.0;
    }
}
