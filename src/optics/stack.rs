//! In-memory PSF stack and the acquisition metadata read alongside it

use crate::io::error::LoadError;
use ndarray::{Array3, ArrayView2, Axis};
use std::path::{Path, PathBuf};

/// Acquisition settings recorded with a PSF stack
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AcquisitionMetadata {
    /// Lateral pixel size in nanometres
    pub pixel_size_xy_nm: f64,
    /// Axial step between planes in nanometres
    pub pixel_size_z_nm: f64,
    /// Numerical aperture of the objective
    pub numerical_aperture: f64,
    /// Refractive index of the immersion medium, when known
    pub refractive_index: Option<f64>,
    /// Emission wavelength in nanometres, when known
    pub wavelength_nm: Option<f64>,
}

/// Three-dimensional intensity samples indexed `(z, y, x)` with square planes
///
/// Read-only once constructed; shared with the retrieval worker behind an `Arc`.
#[derive(Clone, Debug)]
pub struct PsfStack {
    data: Array3<f64>,
    metadata: AcquisitionMetadata,
    source: Option<PathBuf>,
}

impl PsfStack {
    /// Wrap intensity samples and their metadata
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::InvalidShape`] when the stack is empty, the planes
    /// are not square, or a sample is not finite
    pub fn new(data: Array3<f64>, metadata: AcquisitionMetadata) -> Result<Self, LoadError> {
        let shape = data.dim();
        let (z, y, x) = shape;
        if z == 0 || y == 0 || x == 0 {
            return Err(LoadError::InvalidShape {
                shape,
                reason: "stack must contain at least one non-empty plane".to_string(),
            });
        }
        if y != x {
            return Err(LoadError::InvalidShape {
                shape,
                reason: "planes must be square".to_string(),
            });
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(LoadError::InvalidShape {
                shape,
                reason: "stack contains non-finite samples".to_string(),
            });
        }
        Ok(Self {
            data,
            metadata,
            source: None,
        })
    }

    /// Record the file the stack was read from
    #[must_use]
    pub fn with_source(mut self, path: &Path) -> Self {
        self.source = Some(path.to_path_buf());
        self
    }

    /// Intensity samples indexed `(z, y, x)`
    pub const fn data(&self) -> &Array3<f64> {
        &self.data
    }

    /// Acquisition metadata
    pub const fn metadata(&self) -> &AcquisitionMetadata {
        &self.metadata
    }

    /// File the stack was read from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Number of planes
    pub fn size_z(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// Edge length of each square plane
    pub fn size_xy(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// Lateral plane at axial index `z`
    pub fn xy_slice(&self, z: usize) -> Option<ArrayView2<'_, f64>> {
        (z < self.size_z()).then(|| self.data.index_axis(Axis(0), z))
    }

    /// Axial section through row `y`, indexed `(z, x)`
    pub fn xz_slice(&self, y: usize) -> Option<ArrayView2<'_, f64>> {
        (y < self.size_xy()).then(|| self.data.index_axis(Axis(1), y))
    }

    /// Index of the plane holding the brightest sample
    pub fn focal_plane(&self) -> usize {
        self.brightest_voxel().0
    }

    /// `(z, y, x)` of the brightest sample, first occurrence on ties
    pub fn brightest_voxel(&self) -> (usize, usize, usize) {
        let mut best = ((0, 0, 0), f64::NEG_INFINITY);
        for (index, &value) in self.data.indexed_iter() {
            if value > best.1 {
                best = (index, value);
            }
        }
        best.0
    }

    /// Ratio of axial step to lateral pixel size
    pub const fn voxel_aspect(&self) -> f64 {
        self.metadata.pixel_size_z_nm / self.metadata.pixel_size_xy_nm
    }
}
