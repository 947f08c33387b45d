//! # Frame Sampler Module
//!
//! Reduces each camera frame to a single photoplethysmographic sample.
//!
//! ## Per-tick work
//! 1. Nearest-neighbour downsample into a fixed `resolution x resolution` buffer
//! 2. Average the red channel (or luma) over the centered ROI mask
//! 3. Emit a `Sample`, or nothing when the frame has no usable pixels
//!
//! The cost of a tick depends only on the configured resolution, never on the
//! camera's frame size, so it is safe to call from a display-refresh callback.

use crate::config::{BrightnessChannel, MeasurementConfig, RoiShape};
use crate::timeseries::Sample;

const BYTES_PER_PIXEL: usize = 4;

/// Raw RGBA8 frame as delivered by a frame source
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    /// Row-major RGBA bytes
    pub rgba: Vec<u8>,
}

impl Frame {
    pub fn new(width: usize, height: usize, rgba: Vec<u8>) -> Self {
        Self { width, height, rgba }
    }

    /// Frame filled with a single colour
    pub fn uniform(width: usize, height: usize, pixel: [u8; 4]) -> Self {
        let rgba = pixel
            .iter()
            .copied()
            .cycle()
            .take(width * height * BYTES_PER_PIXEL)
            .collect();
        Self { width, height, rgba }
    }

    /// Dimensions are non-zero and the byte buffer covers them
    pub fn is_ready(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.rgba.len() >= self.width * self.height * BYTES_PER_PIXEL
    }

    fn pixel(&self, x: usize, y: usize) -> [u8; 4] {
        let offset = (y * self.width + x) * BYTES_PER_PIXEL;
        [
            self.rgba[offset],
            self.rgba[offset + 1],
            self.rgba[offset + 2],
            self.rgba[offset + 3],
        ]
    }
}

pub struct FrameSampler {
    resolution: usize,
    channel: BrightnessChannel,
    roi_mask: Vec<bool>,
    scratch: Vec<[u8; 4]>,
}

impl FrameSampler {
    pub fn new(config: &MeasurementConfig) -> Self {
        let resolution = config.downsample_resolution.max(1);
        Self {
            resolution,
            channel: config.brightness_channel,
            roi_mask: build_roi_mask(resolution, config.roi_fraction, config.roi_shape),
            scratch: vec![[0; 4]; resolution * resolution],
        }
    }

    /// Number of downsampled pixels inside the ROI
    pub fn roi_pixel_count(&self) -> usize {
        self.roi_mask.iter().filter(|&&inside| inside).count()
    }

    /// Reduce a frame to one sample stamped with `time_ms`.
    ///
    /// Returns `None` when the frame is not ready or every ROI pixel is
    /// transparent, so warm-up frames never enter the statistics as zeros.
    pub fn tick(&mut self, frame: &Frame, time_ms: f64) -> Option<Sample> {
        if !frame.is_ready() {
            return None;
        }
        self.downsample(frame);
        self.roi_mean().map(|brightness| Sample { time_ms, brightness })
    }

    fn downsample(&mut self, frame: &Frame) {
        let res = self.resolution;
        for ty in 0..res {
            let sy = (ty * frame.height) / res;
            for tx in 0..res {
                let sx = (tx * frame.width) / res;
                self.scratch[ty * res + tx] = frame.pixel(sx, sy);
            }
        }
    }

    fn roi_mean(&self) -> Option<f64> {
        let mut sum = 0.0;
        let mut count = 0usize;

        for (pixel, _) in self
            .scratch
            .iter()
            .zip(self.roi_mask.iter())
            .filter(|&(pixel, &inside)| inside && pixel[3] > 0)
        {
            sum += match self.channel {
                BrightnessChannel::Red => pixel[0] as f64,
                BrightnessChannel::Luminance => {
                    0.299 * pixel[0] as f64 + 0.587 * pixel[1] as f64 + 0.114 * pixel[2] as f64
                }
            };
            count += 1;
        }

        if count == 0 {
            None
        } else {
            Some(sum / count as f64)
        }
    }
}

/// Centered ROI over a square grid; always contains at least the centre pixel
fn build_roi_mask(resolution: usize, fraction: f64, shape: RoiShape) -> Vec<bool> {
    let center = resolution as f64 / 2.0;
    let half = (fraction.clamp(0.0, 1.0) * resolution as f64) / 2.0;

    let mut mask: Vec<bool> = (0..resolution * resolution)
        .map(|i| {
            let dx = (i % resolution) as f64 + 0.5 - center;
            let dy = (i / resolution) as f64 + 0.5 - center;
            match shape {
                RoiShape::Square => dx.abs() <= half && dy.abs() <= half,
                RoiShape::Circle => dx * dx + dy * dy <= half * half,
            }
        })
        .collect();

    if !mask.iter().any(|&inside| inside) {
        let mid = resolution / 2;
        mask[mid * resolution + mid] = true;
    }
    mask
}
