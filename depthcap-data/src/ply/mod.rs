//! PLY encoding for point segments and merged artifacts

mod loader;
mod vertex;
mod writer;

use thiserror::Error;

pub use loader::load_points_from_ply;
pub use vertex::PlyVertex;
pub use writer::{PlyWriter, write_points_to_ply};

/// Errors raised while encoding or decoding PLY point files.
#[derive(Debug, Error)]
pub enum PlyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PLY parsing error: {0}")]
    Parse(String),

    #[error("Vertex count mismatch: header declares {expected}, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
}
