//! On-disk vertex layout

use crate::types::{ConfidenceLevel, PointRecord};
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::Deserialize;

/// One PLY vertex as stored in segment and artifact files.
///
/// Field order and names match the header emitted by [`crate::PlyWriter`],
/// so a slice of these can be written as the file body directly.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Deserialize)]
pub struct PlyVertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub confidence: u8,
}

impl From<&PointRecord> for PlyVertex {
    fn from(point: &PointRecord) -> Self {
        Self {
            x: point.position.x,
            y: point.position.y,
            z: point.position.z,
            red: point.color[0],
            green: point.color[1],
            blue: point.color[2],
            confidence: point.confidence.as_raw(),
        }
    }
}

impl From<PlyVertex> for PointRecord {
    fn from(vertex: PlyVertex) -> Self {
        PointRecord {
            position: Vec3::new(vertex.x, vertex.y, vertex.z),
            color: [vertex.red, vertex.green, vertex.blue],
            confidence: ConfidenceLevel::from_raw(vertex.confidence),
        }
    }
}
