//! PLY file loading functions

use crate::ply::{PlyError, PlyVertex};
use crate::types::PointRecord;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, warn};

// A point file only carries the vertex element; an empty file may omit it.
#[derive(Deserialize, Debug)]
struct PlyFile {
    #[serde(default, rename = "vertex")]
    vertex: Vec<PlyVertex>,
}

/// Load every point stored in a segment or artifact file.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn load_points_from_ply(path: &Path) -> Result<Vec<PointRecord>, PlyError> {
    debug!("Loading PLY points from: {}", path.display());
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let ply_data: PlyFile = serde_ply::from_reader(reader).map_err(|e| {
        warn!("Failed to parse PLY file: {}", e);
        PlyError::Parse(e.to_string())
    })?;

    debug!("Loaded {} points from PLY file", ply_data.vertex.len());
    Ok(ply_data.vertex.into_iter().map(PointRecord::from).collect())
}
