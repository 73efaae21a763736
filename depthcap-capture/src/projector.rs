//! Depth-to-point projection.

use crate::source::{CameraIntrinsics, FrameSample};
use depthcap_data::{ConfidenceLevel, PointBatch, PointRecord};
use glam::{Affine3A, Vec3};
use image::RgbImage;
use tracing::debug;

// Used when the frame carries no color image.
const FALLBACK_COLOR: [u8; 3] = [204, 204, 204];

/// Turns accepted frames into point batches.
///
/// Pure apart from logging; runs on the frame delivery thread.
#[derive(Debug, Clone, Copy)]
pub struct PointProjector {
    threshold: ConfidenceLevel,
    inclusion_radius: f32,
}

impl PointProjector {
    /// `inclusion_radius` of 0 disables radius filtering.
    pub fn new(threshold: ConfidenceLevel, inclusion_radius: f32) -> Self {
        Self {
            threshold,
            inclusion_radius,
        }
    }

    /// Project a single depth pixel into the world frame.
    ///
    /// Returns `None` when the pixel is below the confidence threshold, has no
    /// usable depth, or lands farther from the camera than the inclusion
    /// radius.
    pub fn project_pixel(
        &self,
        u: u32,
        v: u32,
        depth: f32,
        confidence: ConfidenceLevel,
        intrinsics: &CameraIntrinsics,
        pose: &Affine3A,
    ) -> Option<Vec3> {
        if confidence < self.threshold {
            return None;
        }
        if !depth.is_finite() || depth <= 0.0 {
            return None;
        }

        let local = intrinsics.unproject(u as f32, v as f32, depth);
        if self.inclusion_radius > 0.0 && local.length() > self.inclusion_radius {
            return None;
        }

        Some(pose.transform_point3(local))
    }

    /// Project every pixel of an accepted frame.
    ///
    /// Always returns a batch for `frame_index`, even if it ends up empty.
    pub fn project(&self, frame_index: u64, sample: &FrameSample) -> PointBatch {
        let (width, height) = sample.dimensions();
        let mut points = Vec::new();

        for v in 0..height {
            for u in 0..width {
                let confidence = ConfidenceLevel::from_raw(sample.confidence().get(u, v));
                let Some(position) = self.project_pixel(
                    u,
                    v,
                    sample.depth().get(u, v),
                    confidence,
                    sample.intrinsics(),
                    sample.pose(),
                ) else {
                    continue;
                };
                let color = sample_color(sample.color(), u, v, width, height);
                points.push(PointRecord::new(position, color, confidence));
            }
        }

        debug!(
            "Frame {}: kept {} of {} pixels",
            frame_index,
            points.len(),
            width as usize * height as usize
        );
        PointBatch::new(frame_index, points)
    }
}

/// Color of the camera pixel covering depth pixel `(u, v)`.
fn sample_color(image: &RgbImage, u: u32, v: u32, depth_width: u32, depth_height: u32) -> [u8; 3] {
    let (cw, ch) = image.dimensions();
    if cw == 0 || ch == 0 {
        return FALLBACK_COLOR;
    }
    let x = ((u64::from(u) * u64::from(cw) + u64::from(cw) / 2) / u64::from(depth_width)) as u32;
    let y = ((u64::from(v) * u64::from(ch) + u64::from(ch) / 2) / u64::from(depth_height)) as u32;
    image.get_pixel(x.min(cw - 1), y.min(ch - 1)).0
}
