//! # Camera Module
//!
//! Host side of a measurement: owns the frame source for the duration of a
//! session and paces the per-frame work.
//!
//! ## Key Types
//! - `FrameSource`: anything that can hand out the most recent camera frame
//! - `CameraGuard`: scoped acquisition; the source is released when the guard
//!   drops, whichever way the session ends
//! - `run_measurement`: async tick loop from acquisition to terminal outcome
//!
//! ## Stop Semantics
//! Setting `should_stop` ends the session early but still finalises it with the
//! samples collected so far. Source errors and stalls end it with
//! `SourceUnavailable`. An invalid config is rejected before the source is
//! touched.

use crate::clock::Clock;
use crate::config::MeasurementConfig;
use crate::error::{ConfigError, MeasurementError, SourceError};
use crate::sampler::Frame;
use crate::session::{MeasurementSession, SessionOutcome, TickStatus};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

const PROGRESS_INTERVAL_MS: f64 = 1000.0;

pub trait FrameSource: Send {
    /// Claim the device (torch on, capture running)
    fn acquire(&mut self) -> Result<(), SourceError>;

    /// Most recent frame, or `None` if nothing new is available yet
    fn current_frame(&mut self) -> Result<Option<Frame>, SourceError>;

    fn release(&mut self);
}

/// Holds an acquired source and releases it on drop
pub struct CameraGuard<'a> {
    source: &'a mut dyn FrameSource,
}

impl<'a> CameraGuard<'a> {
    pub fn acquire(source: &'a mut dyn FrameSource) -> Result<Self, SourceError> {
        source.acquire()?;
        log::debug!("Camera acquired");
        Ok(Self { source })
    }

    pub fn current_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        self.source.current_frame()
    }
}

impl Drop for CameraGuard<'_> {
    fn drop(&mut self) {
        self.source.release();
        log::debug!("Camera released");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementUpdate {
    Started,
    Progress {
        elapsed_ms: f64,
        beats: usize,
        samples: usize,
        brightness: Option<f64>,
    },
    Finished(SessionOutcome),
    /// Session cancelled; no outcome follows
    Aborted,
    Error(String),
}

/// Drive one session to its terminal outcome.
///
/// Ticks at `config.sample_rate_hz`; late ticks are skipped rather than
/// bunched, since each sample carries its own timestamp.
///
/// Returns `Err` only for a config that fails `validate()`; every other way a
/// session can end is a `SessionOutcome`.
pub async fn run_measurement(
    source: &mut dyn FrameSource,
    config: &MeasurementConfig,
    clock: &dyn Clock,
    should_stop: &AtomicBool,
    updates: &Sender<MeasurementUpdate>,
) -> Result<SessionOutcome, ConfigError> {
    config.validate()?;
    let mut session = MeasurementSession::new(config.clone());

    let mut camera = match CameraGuard::acquire(source) {
        Ok(camera) => camera,
        Err(e) => return Ok(session.fail(e.into())),
    };

    session.start(clock.now_ms());
    let _ = updates.send(MeasurementUpdate::Started);

    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / config.sample_rate_hz));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let stall_timeout_ms = config.stall_timeout_secs * 1000.0;
    let mut last_frame_ms = clock.now_ms();
    let mut next_progress_ms = PROGRESS_INTERVAL_MS;

    loop {
        ticker.tick().await;

        if should_stop.load(Ordering::Relaxed) {
            log::info!("Stop requested after {:.0} ms", session.elapsed_ms());
            break;
        }

        let now = clock.now_ms();
        let frame = match camera.current_frame() {
            Ok(frame) => frame,
            Err(e) => return Ok(session.fail(e.into())),
        };

        if frame.is_some() {
            last_frame_ms = now;
        } else if now - last_frame_ms >= stall_timeout_ms {
            log::warn!("No frame for {:.0} ms, giving up", now - last_frame_ms);
            return Ok(session.fail(MeasurementError::SourceUnavailable(format!(
                "no frames for {:.1} s",
                (now - last_frame_ms) / 1000.0
            ))));
        }

        match session.tick(frame.as_ref(), now) {
            TickStatus::Expired | TickStatus::Inactive => break,
            TickStatus::Sampled(_) | TickStatus::Skipped => {}
        }

        if session.elapsed_ms() >= next_progress_ms {
            let _ = updates.send(MeasurementUpdate::Progress {
                elapsed_ms: session.elapsed_ms(),
                beats: session.beats_so_far(),
                samples: session.samples_seen(),
                brightness: session.latest_brightness(),
            });
            next_progress_ms += PROGRESS_INTERVAL_MS;
        }
    }

    Ok(session.finish().unwrap_or_else(|| {
        session.fail(MeasurementError::SourceUnavailable("session ended before finalising".into()))
    }))
}
