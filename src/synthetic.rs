//! # Synthetic Fingertip Module
//!
//! A `FrameSource` that renders what a rear camera sees with a fingertip over
//! the lens and the torch on: a red, slightly vignetted frame whose brightness
//! dips and rises with each heartbeat.
//!
//! ## Controls
//! - `rr_pattern_ms`: beat-to-beat intervals, cycled; a single value is a metronome
//! - `warmup_frames`: fully transparent frames before the signal starts
//! - `stall_after`: stop delivering frames after this many
//! - `fail_acquire`: make `acquire()` fail with the given error
//!
//! Each `current_frame()` call advances the waveform by one frame period, so
//! the host's tick rate should match `frame_rate_hz`.

use crate::camera::FrameSource;
use crate::error::SourceError;
use crate::sampler::Frame;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const WIDTH: usize = 32;
const HEIGHT: usize = 24;
const BASE_LEVEL: f64 = 150.0;
const PULSE_AMPLITUDE: f64 = 40.0;
// Corner pixels are this much darker than the centre
const VIGNETTE_STRENGTH: f64 = 0.35;

#[derive(Debug, Clone)]
pub struct SyntheticOptions {
    pub rr_pattern_ms: Vec<f64>,
    pub frame_rate_hz: f64,
    pub warmup_frames: usize,
    pub stall_after: Option<usize>,
    pub fail_acquire: Option<SourceError>,
}

impl Default for SyntheticOptions {
    fn default() -> Self {
        Self {
            rr_pattern_ms: vec![800.0],
            frame_rate_hz: 30.0,
            warmup_frames: 0,
            stall_after: None,
            fail_acquire: None,
        }
    }
}

impl SyntheticOptions {
    pub fn from_bpm(bpm: f64) -> Self {
        Self {
            rr_pattern_ms: vec![60_000.0 / bpm.max(1.0)],
            ..Default::default()
        }
    }
}

pub struct SyntheticFingertip {
    options: SyntheticOptions,
    vignette: Vec<f64>,
    /// Position within the current beat, 0.0-1.0
    phase: f64,
    beat_index: usize,
    frames_delivered: usize,
    acquired: bool,
    released: Arc<AtomicBool>,
}

impl SyntheticFingertip {
    pub fn new(options: SyntheticOptions) -> Self {
        let mut options = options;
        options.rr_pattern_ms.retain(|rr| *rr > 0.0);
        if options.rr_pattern_ms.is_empty() {
            options.rr_pattern_ms.push(800.0);
        }

        Self {
            options,
            vignette: build_vignette(WIDTH, HEIGHT),
            phase: 0.0,
            beat_index: 0,
            frames_delivered: 0,
            acquired: false,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag set once `release()` has run; lets callers observe release after
    /// the source has been moved into a driver
    pub fn release_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }

    pub fn frames_delivered(&self) -> usize {
        self.frames_delivered
    }

    fn current_rr_ms(&self) -> f64 {
        let pattern = &self.options.rr_pattern_ms;
        pattern[self.beat_index % pattern.len()]
    }

    fn render(&self, level: f64) -> Frame {
        let mut rgba = Vec::with_capacity(WIDTH * HEIGHT * 4);
        for weight in &self.vignette {
            let red = (level * weight).round().clamp(0.0, 255.0);
            rgba.extend_from_slice(&[
                red as u8,
                (red * 0.3).round() as u8,
                (red * 0.2).round() as u8,
                255,
            ]);
        }
        Frame::new(WIDTH, HEIGHT, rgba)
    }

    fn advance(&mut self) {
        let frame_ms = 1000.0 / self.options.frame_rate_hz;
        self.phase += frame_ms / self.current_rr_ms();
        while self.phase >= 1.0 {
            self.phase -= 1.0;
            self.beat_index += 1;
        }
    }
}

impl FrameSource for SyntheticFingertip {
    fn acquire(&mut self) -> Result<(), SourceError> {
        if let Some(err) = self.options.fail_acquire.clone() {
            return Err(err);
        }
        self.acquired = true;
        self.released.store(false, Ordering::SeqCst);
        log::debug!(
            "Synthetic fingertip acquired ({} ms RR pattern)",
            self.options
                .rr_pattern_ms
                .iter()
                .map(|rr| format!("{:.0}", rr))
                .collect::<Vec<_>>()
                .join(",")
        );
        Ok(())
    }

    fn current_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if !self.acquired {
            return Err(SourceError::Unavailable("source not acquired".to_string()));
        }
        if let Some(limit) = self.options.stall_after {
            if self.frames_delivered >= limit {
                return Ok(None);
            }
        }

        self.frames_delivered += 1;
        if self.frames_delivered <= self.options.warmup_frames {
            return Ok(Some(Frame::uniform(WIDTH, HEIGHT, [0, 0, 0, 0])));
        }

        let level = BASE_LEVEL + PULSE_AMPLITUDE * (2.0 * PI * self.phase).cos();
        let frame = self.render(level);
        self.advance();
        Ok(Some(frame))
    }

    fn release(&mut self) {
        self.acquired = false;
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Per-pixel brightness weights, 1.0 at the centre falling off radially
fn build_vignette(width: usize, height: usize) -> Vec<f64> {
    let mut weights = Vec::with_capacity(width * height);
    for y in 0..height {
        let ny = (y as f64 + 0.5) / height as f64 * 2.0 - 1.0;
        for x in 0..width {
            let nx = (x as f64 + 0.5) / width as f64 * 2.0 - 1.0;
            weights.push(1.0 - VIGNETTE_STRENGTH * (nx * nx + ny * ny) / 2.0);
        }
    }
    weights
}
