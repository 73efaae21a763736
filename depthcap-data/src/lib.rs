//! Depthcap Data Crate
//!
//! Point records produced by depth capture and the PLY encoding used for
//! per-frame segments and merged artifacts. This crate knows nothing about
//! sessions or threads; it only shapes and moves point data.

pub mod ply;
pub mod types;

pub use ply::{PlyError, PlyVertex, PlyWriter, load_points_from_ply, write_points_to_ply};
pub use types::{ConfidenceLevel, PointBatch, PointRecord};
