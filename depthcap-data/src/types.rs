//! Core data types for captured points.
//!
//! A `PointRecord` is one accepted depth pixel lifted into the session world
//! frame. Points from a single sampled frame travel together as a `PointBatch`.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-pixel depth confidence reported by the sensor.
///
/// Ordered so that `Low < Medium < High`; a threshold admits every level at or
/// above itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl ConfidenceLevel {
    /// Map a raw sensor value (0 low, 1 medium, 2 high). Anything above 2 is
    /// treated as high.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => ConfidenceLevel::Low,
            1 => ConfidenceLevel::Medium,
            _ => ConfidenceLevel::High,
        }
    }

    /// Raw sensor value for this level.
    pub fn as_raw(self) -> u8 {
        match self {
            ConfidenceLevel::Low => 0,
            ConfidenceLevel::Medium => 1,
            ConfidenceLevel::High => 2,
        }
    }

    /// Get all levels in ascending order.
    pub fn all() -> &'static [ConfidenceLevel] {
        &[ConfidenceLevel::Low, ConfidenceLevel::Medium, ConfidenceLevel::High]
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceLevel::Low => write!(f, "Low"),
            ConfidenceLevel::Medium => write!(f, "Medium"),
            ConfidenceLevel::High => write!(f, "High"),
        }
    }
}

impl FromStr for ConfidenceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" | "0" => Ok(ConfidenceLevel::Low),
            "medium" | "1" => Ok(ConfidenceLevel::Medium),
            "high" | "2" => Ok(ConfidenceLevel::High),
            other => Err(format!("unknown confidence level '{}'", other)),
        }
    }
}

/// A colored point in the session world frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointRecord {
    /// Position in session-local world space (metres).
    pub position: Vec3,
    /// sRGB color sampled from the camera image.
    pub color: [u8; 3],
    /// Confidence of the depth pixel this point came from.
    pub confidence: ConfidenceLevel,
}

impl PointRecord {
    /// Create a new point.
    pub fn new(position: Vec3, color: [u8; 3], confidence: ConfidenceLevel) -> Self {
        Self {
            position,
            color,
            confidence,
        }
    }
}

/// All points accepted from one sampled frame.
///
/// An empty batch is still a valid batch: it keeps the frame index traceable
/// through storage even when every pixel was rejected.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointBatch {
    pub frame_index: u64,
    pub points: Vec<PointRecord>,
}

impl PointBatch {
    pub fn new(frame_index: u64, points: Vec<PointRecord>) -> Self {
        Self {
            frame_index,
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_ordering() {
        assert!(ConfidenceLevel::Low < ConfidenceLevel::Medium);
        assert!(ConfidenceLevel::Medium < ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::default(), ConfidenceLevel::Medium);
    }

    #[test]
    fn test_confidence_raw_mapping() {
        for level in ConfidenceLevel::all() {
            assert_eq!(ConfidenceLevel::from_raw(level.as_raw()), *level);
        }
        assert_eq!(ConfidenceLevel::from_raw(17), ConfidenceLevel::High);
    }

    #[test]
    fn test_confidence_serde_names() {
        let level: ConfidenceLevel = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(level, ConfidenceLevel::High);
        assert_eq!(serde_json::to_string(&ConfidenceLevel::Low).unwrap(), "\"low\"");
    }

    #[test]
    fn test_confidence_from_str() {
        assert_eq!("HIGH".parse::<ConfidenceLevel>(), Ok(ConfidenceLevel::High));
        assert_eq!("0".parse::<ConfidenceLevel>(), Ok(ConfidenceLevel::Low));
        assert!("extreme".parse::<ConfidenceLevel>().is_err());
    }

    #[test]
    fn test_empty_batch_keeps_index() {
        let batch = PointBatch::new(10, Vec::new());
        assert!(batch.is_empty());
        assert_eq!(batch.frame_index, 10);
    }
}
