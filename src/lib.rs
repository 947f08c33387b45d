//! Fingertip heart-rate variability from a phone camera.
//!
//! Frames flow through `sampler` → `timeseries` buffer → `conditioner` →
//! `detector` → `hrv`/`classify`, coordinated per attempt by
//! `session::MeasurementSession`. `camera` and `manager` are the async host
//! drivers; `synthetic` stands in for a real camera.

pub mod camera;
pub mod classify;
pub mod clock;
pub mod conditioner;
pub mod config;
pub mod detector;
pub mod error;
pub mod hrv;
pub mod manager;
pub mod sampler;
pub mod session;
pub mod synthetic;
pub mod timeseries;
