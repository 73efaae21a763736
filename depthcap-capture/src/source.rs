//! Depth sensor types and traits.
//!
//! The platform adapter implements [`DepthSensor`] (and usually
//! [`DepthSource`]) and turns its callbacks into the handful of inputs the
//! session manager understands: frames, sensor failures and memory pressure.

use glam::{Affine3A, Vec3};
use image::RgbImage;
use thiserror::Error;

/// Errors reported by a depth sensor.
#[derive(Debug, Clone, Error)]
pub enum SensorError {
    #[error("Sensor session interrupted: {0}")]
    Interrupted(String),

    #[error("Sensor unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}

/// Pinhole intrinsics in depth-map pixel units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
}

impl CameraIntrinsics {
    pub fn new(fx: f32, fy: f32, cx: f32, cy: f32) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Lift pixel `(u, v)` at `depth` metres into the camera frame (+Z forward).
    pub fn unproject(&self, u: f32, v: f32, depth: f32) -> Vec3 {
        Vec3::new(
            (u - self.cx) * depth / self.fx,
            (v - self.cy) * depth / self.fy,
            depth,
        )
    }
}

/// Row-major depth image in metres.
#[derive(Debug, Clone)]
pub struct DepthMap {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl DepthMap {
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Result<Self, SensorError> {
        check_len("depth", width, height, data.len())?;
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, u: u32, v: u32) -> f32 {
        self.data[pixel_index(self.width, u, v)]
    }
}

/// Row-major per-pixel confidence, raw sensor levels (0 low, 1 medium, 2 high).
#[derive(Debug, Clone)]
pub struct ConfidenceMap {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl ConfidenceMap {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, SensorError> {
        check_len("confidence", width, height, data.len())?;
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, u: u32, v: u32) -> u8 {
        self.data[pixel_index(self.width, u, v)]
    }
}

fn pixel_index(width: u32, u: u32, v: u32) -> usize {
    v as usize * width as usize + u as usize
}

fn check_len(kind: &str, width: u32, height: u32, len: usize) -> Result<(), SensorError> {
    let expected = width as usize * height as usize;
    if len != expected {
        return Err(SensorError::InvalidFrame(format!(
            "{} map is {}x{} but holds {} values",
            kind, width, height, len
        )));
    }
    Ok(())
}

/// One frame delivered by the sensor.
///
/// Consumed synchronously by the projector on the delivery thread and never
/// stored. The frame index is assigned by the session, not the sensor.
/// Depth and confidence always share one resolution.
#[derive(Debug, Clone)]
pub struct FrameSample {
    depth: DepthMap,
    confidence: ConfidenceMap,
    color: RgbImage,
    intrinsics: CameraIntrinsics,
    pose: Affine3A,
}

impl FrameSample {
    /// Create a frame, checking that depth and confidence line up.
    pub fn new(
        depth: DepthMap,
        confidence: ConfidenceMap,
        color: RgbImage,
        intrinsics: CameraIntrinsics,
        pose: Affine3A,
    ) -> Result<Self, SensorError> {
        if depth.width() != confidence.width() || depth.height() != confidence.height() {
            return Err(SensorError::InvalidFrame(format!(
                "depth is {}x{} but confidence is {}x{}",
                depth.width(),
                depth.height(),
                confidence.width(),
                confidence.height()
            )));
        }
        Ok(Self {
            depth,
            confidence,
            color,
            intrinsics,
            pose,
        })
    }

    /// Depth resolution (width, height).
    pub fn dimensions(&self) -> (u32, u32) {
        (self.depth.width(), self.depth.height())
    }

    pub fn depth(&self) -> &DepthMap {
        &self.depth
    }

    pub fn confidence(&self) -> &ConfidenceMap {
        &self.confidence
    }

    /// Camera image; may be larger than the depth map.
    pub fn color(&self) -> &RgbImage {
        &self.color
    }

    pub fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    /// Camera-to-world transform in the session frame.
    pub fn pose(&self) -> &Affine3A {
        &self.pose
    }
}

/// Control surface of a depth sensor.
pub trait DepthSensor {
    /// Start a new underlying sensor session. Also used for the automatic
    /// restart after a failure.
    fn start(&mut self) -> Result<(), SensorError>;

    /// Stop delivering frames.
    fn stop(&mut self);

    /// Check if the sensor is currently delivering.
    fn is_active(&self) -> bool;
}

/// A sensor that can be polled for frames by a single producer.
pub trait DepthSource: DepthSensor {
    /// Get the next frame. `Ok(None)` means the source has nothing more.
    fn next_frame(&mut self) -> Result<Option<FrameSample>, SensorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unproject_principal_point() {
        let k = CameraIntrinsics::new(100.0, 100.0, 32.0, 24.0);
        assert_eq!(k.unproject(32.0, 24.0, 2.0), Vec3::new(0.0, 0.0, 2.0));
    }

    #[test]
    fn test_unproject_offset_pixel() {
        let k = CameraIntrinsics::new(100.0, 50.0, 0.0, 0.0);
        let p = k.unproject(10.0, 10.0, 1.0);
        assert!((p - Vec3::new(0.1, 0.2, 1.0)).length() < 1e-6);
    }

    #[test]
    fn test_depth_map_length_checked() {
        assert!(DepthMap::new(2, 2, vec![1.0; 3]).is_err());
        let map = DepthMap::new(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(map.get(1, 1), 4.0);
    }

    #[test]
    fn test_frame_rejects_mismatched_maps() {
        let depth = DepthMap::new(2, 1, vec![1.0, 1.0]).unwrap();
        let confidence = ConfidenceMap::new(1, 2, vec![2, 2]).unwrap();
        let result = FrameSample::new(
            depth,
            confidence,
            RgbImage::new(2, 1),
            CameraIntrinsics::new(1.0, 1.0, 0.0, 0.0),
            Affine3A::IDENTITY,
        );
        assert!(matches!(result, Err(SensorError::InvalidFrame(_))));
    }

    #[test]
    fn test_confidence_cannot_shrink_below_depth() {
        let depth = DepthMap::new(2, 2, vec![1.0; 4]).unwrap();
        let full = ConfidenceMap::new(2, 2, vec![2; 4]).unwrap();
        let frame = FrameSample::new(
            depth,
            full,
            RgbImage::new(4, 4),
            CameraIntrinsics::new(1.0, 1.0, 0.0, 0.0),
            Affine3A::IDENTITY,
        )
        .unwrap();

        // Swapping in a smaller confidence map has to go through the checked constructor.
        let tiny = ConfidenceMap::new(1, 1, vec![2]).unwrap();
        let swapped = FrameSample::new(
            frame.depth().clone(),
            tiny,
            frame.color().clone(),
            *frame.intrinsics(),
            *frame.pose(),
        );
        assert!(matches!(swapped, Err(SensorError::InvalidFrame(_))));
        assert_eq!(frame.confidence().get(1, 1), 2);
    }

    #[test]
    fn test_pixel_index_wide_rows() {
        // Would overflow if computed in u32.
        assert_eq!(pixel_index(70_000, 5, 70_000), 70_000usize * 70_000 + 5);
    }
}
