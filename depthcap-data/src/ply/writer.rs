//! PLY file writing

use crate::ply::{PlyError, PlyVertex};
use crate::types::PointRecord;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

const FORMAT: &str = if cfg!(target_endian = "big") {
    "binary_big_endian"
} else {
    "binary_little_endian"
};

/// Streaming PLY writer.
///
/// The vertex count goes into the header up front, so callers must know it
/// before the first point is written. `finish` checks that exactly that many
/// points arrived.
pub struct PlyWriter<W: Write> {
    inner: W,
    expected: usize,
    written: usize,
}

impl<W: Write> PlyWriter<W> {
    /// Write the header and return a writer ready for `vertex_count` points.
    pub fn new(mut inner: W, vertex_count: usize) -> Result<Self, PlyError> {
        write!(
            inner,
            "ply\n\
             format {FORMAT} 1.0\n\
             comment depthcap point cloud\n\
             element vertex {vertex_count}\n\
             property float x\n\
             property float y\n\
             property float z\n\
             property uchar red\n\
             property uchar green\n\
             property uchar blue\n\
             property uchar confidence\n\
             end_header\n"
        )?;
        Ok(Self {
            inner,
            expected: vertex_count,
            written: 0,
        })
    }

    /// Append a run of points to the body.
    pub fn write_points(&mut self, points: &[PointRecord]) -> Result<(), PlyError> {
        if self.written + points.len() > self.expected {
            return Err(PlyError::CountMismatch {
                expected: self.expected,
                actual: self.written + points.len(),
            });
        }
        let vertices: Vec<PlyVertex> = points.iter().map(PlyVertex::from).collect();
        self.inner.write_all(bytemuck::cast_slice(&vertices))?;
        self.written += points.len();
        Ok(())
    }

    /// Number of points written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W, PlyError> {
        if self.written != self.expected {
            return Err(PlyError::CountMismatch {
                expected: self.expected,
                actual: self.written,
            });
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Write a complete point file in one go.
#[tracing::instrument(skip_all, fields(path = %path.display(), points = points.len()))]
pub fn write_points_to_ply(path: &Path, points: &[PointRecord]) -> Result<(), PlyError> {
    let file = File::create(path)?;
    let mut writer = PlyWriter::new(BufWriter::new(file), points.len())?;
    writer.write_points(points)?;
    let buffered = writer.finish()?;
    buffered.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    debug!("Wrote {} points", points.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ply::load_points_from_ply;
    use crate::types::ConfidenceLevel;
    use glam::Vec3;
    use tempfile::TempDir;

    fn sample_points() -> Vec<PointRecord> {
        vec![
            PointRecord::new(Vec3::new(0.1, -0.25, 1.5), [255, 0, 0], ConfidenceLevel::High),
            PointRecord::new(Vec3::new(-3.0, 0.0, 0.333_333_34), [0, 128, 7], ConfidenceLevel::Low),
            PointRecord::new(Vec3::new(1e-6, 42.0, -7.75), [9, 9, 9], ConfidenceLevel::Medium),
        ]
    }

    #[test]
    fn test_points_survive_write_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("segment.ply");
        let points = sample_points();

        write_points_to_ply(&path, &points).unwrap();
        let loaded = load_points_from_ply(&path).unwrap();

        assert_eq!(loaded, points);
    }

    #[test]
    fn test_empty_segment() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.ply");

        write_points_to_ply(&path, &[]).unwrap();

        let text = String::from_utf8(std::fs::read(&path).unwrap()).unwrap();
        assert!(text.contains("element vertex 0\n"));
        assert!(text.ends_with("end_header\n"));
    }

    #[test]
    fn test_writer_rejects_extra_points() {
        let mut writer = PlyWriter::new(Vec::new(), 1).unwrap();
        let err = writer.write_points(&sample_points()).unwrap_err();
        assert!(matches!(err, PlyError::CountMismatch { expected: 1, actual: 3 }));
    }

    #[test]
    fn test_writer_rejects_short_body() {
        let mut writer = PlyWriter::new(Vec::new(), 5).unwrap();
        writer.write_points(&sample_points()).unwrap();
        assert_eq!(writer.written(), 3);
        assert!(matches!(
            writer.finish(),
            Err(PlyError::CountMismatch { expected: 5, actual: 3 })
        ));
    }

    #[test]
    fn test_header_layout() {
        let writer = PlyWriter::new(Vec::new(), 12).unwrap();
        let bytes = writer.finish_unchecked();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("ply\nformat binary_"));
        assert!(text.contains("element vertex 12\n"));
        assert!(text.ends_with("property uchar confidence\nend_header\n"));
    }

    #[test]
    fn test_loader_rejects_non_ply() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bogus.ply");
        std::fs::write(&path, "not a ply\n").unwrap();
        assert!(matches!(load_points_from_ply(&path), Err(PlyError::Parse(_))));
    }

    impl PlyWriter<Vec<u8>> {
        fn finish_unchecked(self) -> Vec<u8> {
            self.inner
        }
    }
}
