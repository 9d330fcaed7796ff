//! Synthetic PSF stacks rendered from a known pupil

use crate::io::error::{FitError, computation_error, invalid_parameter};
use crate::optics::pupil::{HanserModel, axial_positions};
use crate::optics::stack::{AcquisitionMetadata, PsfStack};
use crate::retrieval::parameters::PsfParameters;

/// Description of a simulated acquisition
#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticPsf {
    /// Optics of the simulated microscope
    pub params: PsfParameters,
    /// Edge length of every plane in pixels
    pub size: usize,
    /// Number of planes, centred on focus
    pub planes: usize,
    /// `(noll order, waves)` pairs applied to the pupil phase
    pub aberrations: Vec<(usize, f64)>,
    /// Intensity of the brightest voxel above background
    pub peak: f64,
    /// Constant offset added to every voxel
    pub background: f64,
}

impl SyntheticPsf {
    /// Unaberrated stack with a peak of 1000 counts over a background of 100
    pub const fn new(params: PsfParameters, size: usize, planes: usize) -> Self {
        Self {
            params,
            size,
            planes,
            aberrations: Vec::new(),
            peak: 1000.0,
            background: 100.0,
        }
    }

    /// Add `waves` of Noll polynomial `order`
    #[must_use]
    pub fn with_aberration(mut self, order: usize, waves: f64) -> Self {
        self.aberrations.push((order, waves));
        self
    }

    /// Set peak and background counts
    #[must_use]
    pub const fn with_levels(mut self, peak: f64, background: f64) -> Self {
        self.peak = peak;
        self.background = background;
        self
    }

    /// Metadata a microscope would record for this acquisition
    pub const fn metadata(&self) -> AcquisitionMetadata {
        AcquisitionMetadata {
            pixel_size_xy_nm: self.params.pixel_size_xy_nm,
            pixel_size_z_nm: self.params.pixel_size_z_nm,
            numerical_aperture: self.params.numerical_aperture,
            refractive_index: Some(self.params.refractive_index),
            wavelength_nm: Some(self.params.wavelength_nm),
        }
    }

    /// Render the stack; the focal plane is `planes / 2`
    ///
    /// # Errors
    ///
    /// Returns [`FitError::InvalidParameter`] for invalid optics, an empty
    /// geometry, Noll order 0 or non-finite levels, and
    /// [`FitError::Computation`] when the rendered field vanishes
    pub fn render(&self) -> Result<PsfStack, FitError> {
        self.params.validate()?;
        if self.size < 2 {
            return Err(invalid_parameter("size", &self.size, &"planes need at least 2x2 pixels"));
        }
        if self.planes == 0 {
            return Err(invalid_parameter("planes", &self.planes, &"at least one plane is required"));
        }
        if let Some(&(order, _)) = self.aberrations.iter().find(|&&(order, _)| order == 0) {
            return Err(invalid_parameter("aberration", &order, &"Noll orders start at 1"));
        }
        if !(self.peak.is_finite() && self.peak > 0.0) {
            return Err(invalid_parameter("peak", &self.peak, &"must be positive"));
        }
        if !(self.background.is_finite() && self.background >= 0.0) {
            return Err(invalid_parameter("background", &self.background, &"must be non-negative"));
        }

        let z = axial_positions(self.planes, self.params.pixel_size_z_nm, self.planes / 2);
        let model = HanserModel::new(&self.params, self.size, &z);
        let pupil = model.grid().aberrated_pupil(&self.aberrations);
        let mut data = model.intensity(&pupil);

        let max = data.fold(0.0_f64, |acc, &v| acc.max(v));
        if !(max.is_finite() && max > 0.0) {
            return Err(computation_error("render synthetic stack", &"field vanished"));
        }
        let (peak, background) = (self.peak, self.background);
        data.mapv_inplace(|v| v / max * peak + background);

        PsfStack::new(data, self.metadata())
            .map_err(|e| computation_error("render synthetic stack", &e))
    }
}
