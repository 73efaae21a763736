//! Deterministic depth sensor for tests and demos.
//!
//! Renders a tilted plane in front of a camera that slides along +X, with a
//! repeating confidence pattern and a gradient color image. Sensor faults can
//! be scripted by pull number.

use crate::source::{
    CameraIntrinsics, ConfidenceMap, DepthMap, DepthSensor, DepthSource, FrameSample, SensorError,
};
use glam::{Affine3A, Vec3};
use image::{Rgb, RgbImage};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Synthetic depth source.
pub struct SyntheticSensor {
    width: u32,
    height: u32,
    color_scale: u32,
    frame_limit: Option<u64>,
    step: f32,
    fail_on_pulls: BTreeSet<u64>,
    start_failures: u32,
    pulls: u64,
    delivered: u64,
    starts: u32,
    active: bool,
}

impl SyntheticSensor {
    /// Create a sensor producing `width` x `height` depth frames forever.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            color_scale: 2,
            frame_limit: None,
            step: 0.01,
            fail_on_pulls: BTreeSet::new(),
            start_failures: 0,
            pulls: 0,
            delivered: 0,
            starts: 0,
            active: false,
        }
    }

    /// Stop after `frames` frames have been delivered.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Report an interruption instead of a frame on these pulls (1-based).
    pub fn with_failures_on_pulls(mut self, pulls: impl IntoIterator<Item = u64>) -> Self {
        self.fail_on_pulls.extend(pulls);
        self
    }

    /// Make the next `count` calls to `start` fail.
    pub fn with_start_failures(mut self, count: u32) -> Self {
        self.start_failures = count;
        self
    }

    /// How many times a sensor session was started.
    pub fn start_count(&self) -> u32 {
        self.starts
    }

    /// Frames delivered so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Intrinsics for the configured resolution (roughly 60 degree FOV).
    pub fn intrinsics(&self) -> CameraIntrinsics {
        let f = self.width as f32 * 0.87;
        CameraIntrinsics::new(f, f, self.width as f32 / 2.0, self.height as f32 / 2.0)
    }

    /// Render the frame for a given delivery count.
    pub fn render(&self, n: u64) -> Result<FrameSample, SensorError> {
        let (w, h) = (self.width, self.height);
        let mut depth = Vec::with_capacity((w * h) as usize);
        let mut confidence = Vec::with_capacity((w * h) as usize);
        for v in 0..h {
            for u in 0..w {
                depth.push(1.0 + v as f32 / h as f32);
                confidence.push(((u + v) % 3) as u8);
            }
        }

        let mut color = RgbImage::new(w * self.color_scale, h * self.color_scale);
        let (cw, ch) = color.dimensions();
        for (x, y, px) in color.enumerate_pixels_mut() {
            *px = Rgb([
                (x * 255 / cw.max(1)) as u8,
                (y * 255 / ch.max(1)) as u8,
                (n % 256) as u8,
            ]);
        }

        let pose = Affine3A::from_translation(Vec3::new(n as f32 * self.step, 0.0, 0.0));
        FrameSample::new(
            DepthMap::new(w, h, depth)?,
            ConfidenceMap::new(w, h, confidence)?,
            color,
            self.intrinsics(),
            pose,
        )
    }
}

impl DepthSensor for SyntheticSensor {
    fn start(&mut self) -> Result<(), SensorError> {
        if self.start_failures > 0 {
            self.start_failures -= 1;
            return Err(SensorError::Unavailable("synthetic start failure".to_string()));
        }
        self.starts += 1;
        self.active = true;
        info!("Synthetic sensor session {} started ({}x{})", self.starts, self.width, self.height);
        Ok(())
    }

    fn stop(&mut self) {
        if self.active {
            debug!("Synthetic sensor stopped after {} frames", self.delivered);
        }
        self.active = false;
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

impl DepthSource for SyntheticSensor {
    fn next_frame(&mut self) -> Result<Option<FrameSample>, SensorError> {
        if !self.active {
            return Ok(None);
        }
        if self.frame_limit.is_some_and(|limit| self.delivered >= limit) {
            return Ok(None);
        }

        self.pulls += 1;
        if self.fail_on_pulls.contains(&self.pulls) {
            return Err(SensorError::Interrupted(format!("scripted fault on pull {}", self.pulls)));
        }

        self.delivered += 1;
        self.render(self.delivered).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inactive_sensor_yields_nothing() {
        let mut sensor = SyntheticSensor::new(4, 4);
        assert!(sensor.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_frame_limit() {
        let mut sensor = SyntheticSensor::new(4, 4).with_frame_limit(2);
        sensor.start().unwrap();
        assert!(sensor.next_frame().unwrap().is_some());
        assert!(sensor.next_frame().unwrap().is_some());
        assert!(sensor.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_scripted_faults() {
        let mut sensor = SyntheticSensor::new(2, 2).with_failures_on_pulls([2]);
        sensor.start().unwrap();
        assert!(sensor.next_frame().is_ok());
        assert!(matches!(sensor.next_frame(), Err(SensorError::Interrupted(_))));
        assert!(sensor.next_frame().is_ok());
        assert_eq!(sensor.delivered(), 2);
    }

    #[test]
    fn test_start_failures() {
        let mut sensor = SyntheticSensor::new(2, 2).with_start_failures(1);
        assert!(sensor.start().is_err());
        assert!(sensor.start().is_ok());
        assert_eq!(sensor.start_count(), 1);
    }

    #[test]
    fn test_rendered_frame_shape() {
        let sensor = SyntheticSensor::new(8, 6);
        let frame = sensor.render(1).unwrap();
        assert_eq!(frame.dimensions(), (8, 6));
        assert_eq!(frame.color().dimensions(), (16, 12));
    }
}
