//! Optical and fitting parameters with validation and layered overrides

use crate::io::configuration::{
    DEFAULT_INITIAL_PHASE_NOISE, DEFAULT_MAX_ITERATIONS, DEFAULT_MSE_TOLERANCE,
    DEFAULT_PHASE_TOLERANCE, DEFAULT_PUPIL_TOLERANCE, DEFAULT_SEED, DEFAULT_ZERNIKE_COUNT,
    MAX_ZERNIKE_COUNT,
};
use crate::io::error::{FitError, invalid_parameter};
use crate::optics::stack::AcquisitionMetadata;
use serde::{Deserialize, Serialize};

/// Optical description of the acquisition used by the forward model
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PsfParameters {
    /// Emission wavelength in nanometres
    pub wavelength_nm: f64,
    /// Numerical aperture of the objective
    pub numerical_aperture: f64,
    /// Refractive index of the immersion medium
    pub refractive_index: f64,
    /// Lateral pixel size in nanometres
    pub pixel_size_xy_nm: f64,
    /// Axial step in nanometres
    pub pixel_size_z_nm: f64,
}

/// Optional replacements for individual PSF parameters
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PsfOverrides {
    /// Emission wavelength in nanometres
    pub wavelength_nm: Option<f64>,
    /// Numerical aperture of the objective
    pub numerical_aperture: Option<f64>,
    /// Refractive index of the immersion medium
    pub refractive_index: Option<f64>,
    /// Lateral pixel size in nanometres
    pub pixel_size_xy_nm: Option<f64>,
    /// Axial step in nanometres
    pub pixel_size_z_nm: Option<f64>,
}

impl PsfOverrides {
    /// Values set here win over values set in `base`
    #[must_use]
    pub fn layered_over(self, base: Self) -> Self {
        Self {
            wavelength_nm: self.wavelength_nm.or(base.wavelength_nm),
            numerical_aperture: self.numerical_aperture.or(base.numerical_aperture),
            refractive_index: self.refractive_index.or(base.refractive_index),
            pixel_size_xy_nm: self.pixel_size_xy_nm.or(base.pixel_size_xy_nm),
            pixel_size_z_nm: self.pixel_size_z_nm.or(base.pixel_size_z_nm),
        }
    }
}

/// Labelled parameter value for reports
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParameterEntry {
    /// Display name
    pub name: &'static str,
    /// Unit suffix, empty when dimensionless
    pub unit: &'static str,
    /// Parameter value
    pub value: f64,
}

impl PsfParameters {
    /// Resolve parameters from file metadata with overrides applied on top
    ///
    /// # Errors
    ///
    /// Returns [`FitError::InvalidParameter`] when a value is missing from both
    /// sources or the resolved set fails [`PsfParameters::validate`]
    pub fn resolve(
        metadata: &AcquisitionMetadata,
        overrides: &PsfOverrides,
    ) -> Result<Self, FitError> {
        let wavelength_nm = overrides
            .wavelength_nm
            .or(metadata.wavelength_nm)
            .ok_or_else(|| {
                invalid_parameter("wavelength_nm", &"unset", &"not recorded in the file, pass it explicitly")
            })?;
        let refractive_index = overrides
            .refractive_index
            .or(metadata.refractive_index)
            .ok_or_else(|| {
                invalid_parameter(
                    "refractive_index",
                    &"unset",
                    &"not recorded in the file, pass it explicitly",
                )
            })?;

        let parameters = Self {
            wavelength_nm,
            numerical_aperture: overrides
                .numerical_aperture
                .unwrap_or(metadata.numerical_aperture),
            refractive_index,
            pixel_size_xy_nm: overrides
                .pixel_size_xy_nm
                .unwrap_or(metadata.pixel_size_xy_nm),
            pixel_size_z_nm: overrides
                .pixel_size_z_nm
                .unwrap_or(metadata.pixel_size_z_nm),
        };
        parameters.validate()?;
        Ok(parameters)
    }

    /// Check physical plausibility
    ///
    /// # Errors
    ///
    /// Returns [`FitError::InvalidParameter`] for non-positive or non-finite
    /// values and for a numerical aperture exceeding the refractive index
    pub fn validate(&self) -> Result<(), FitError> {
        for (name, value) in [
            ("wavelength_nm", self.wavelength_nm),
            ("numerical_aperture", self.numerical_aperture),
            ("refractive_index", self.refractive_index),
            ("pixel_size_xy_nm", self.pixel_size_xy_nm),
            ("pixel_size_z_nm", self.pixel_size_z_nm),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid_parameter(name, &value, &"must be a positive number"));
            }
        }
        if self.numerical_aperture > self.refractive_index {
            return Err(invalid_parameter(
                "numerical_aperture",
                &self.numerical_aperture,
                &format!(
                    "cannot exceed the refractive index {}",
                    self.refractive_index
                ),
            ));
        }
        Ok(())
    }

    /// Radius of the pupil support in spatial frequency (1/nm)
    pub const fn cutoff_frequency(&self) -> f64 {
        self.numerical_aperture / self.wavelength_nm
    }

    /// Entries in report order
    pub fn entries(&self) -> [ParameterEntry; 5] {
        [
            ParameterEntry {
                name: "Emission wavelength",
                unit: "nm",
                value: self.wavelength_nm,
            },
            ParameterEntry {
                name: "Numerical aperture",
                unit: "",
                value: self.numerical_aperture,
            },
            ParameterEntry {
                name: "Refractive index",
                unit: "",
                value: self.refractive_index,
            },
            ParameterEntry {
                name: "xy-Resolution",
                unit: "nm",
                value: self.pixel_size_xy_nm,
            },
            ParameterEntry {
                name: "z-Resolution",
                unit: "nm",
                value: self.pixel_size_z_nm,
            },
        ]
    }
}

/// Settings controlling the iterative fit
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitParameters {
    /// Upper bound on iterations
    pub max_iterations: usize,
    /// Stop once the relative pupil change falls below this
    pub pupil_tolerance: f64,
    /// Stop once the relative MSE change falls below this
    pub mse_tolerance: f64,
    /// Zernike magnitude in waves flagged as out of tolerance (display only)
    pub phase_tolerance: f64,
    /// Number of Noll-ordered Zernike polynomials to fit
    pub zernike_count: usize,
    /// Seed of the initial phase noise
    pub seed: u64,
    /// Amplitude in radians of the random initial phase
    pub initial_phase_noise: f64,
}

impl Default for FitParameters {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            pupil_tolerance: DEFAULT_PUPIL_TOLERANCE,
            mse_tolerance: DEFAULT_MSE_TOLERANCE,
            phase_tolerance: DEFAULT_PHASE_TOLERANCE,
            zernike_count: DEFAULT_ZERNIKE_COUNT,
            seed: DEFAULT_SEED,
            initial_phase_noise: DEFAULT_INITIAL_PHASE_NOISE,
        }
    }
}

/// Optional replacements for individual fit parameters
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FitOverrides {
    /// Upper bound on iterations
    pub max_iterations: Option<usize>,
    /// Relative pupil change tolerance
    pub pupil_tolerance: Option<f64>,
    /// Relative MSE change tolerance
    pub mse_tolerance: Option<f64>,
    /// Zernike tolerance in waves
    pub phase_tolerance: Option<f64>,
    /// Number of Zernike polynomials
    pub zernike_count: Option<usize>,
    /// Seed of the initial phase noise
    pub seed: Option<u64>,
    /// Amplitude in radians of the random initial phase
    pub initial_phase_noise: Option<f64>,
}

impl FitOverrides {
    /// Values set here win over values set in `base`
    #[must_use]
    pub fn layered_over(self, base: Self) -> Self {
        Self {
            max_iterations: self.max_iterations.or(base.max_iterations),
            pupil_tolerance: self.pupil_tolerance.or(base.pupil_tolerance),
            mse_tolerance: self.mse_tolerance.or(base.mse_tolerance),
            phase_tolerance: self.phase_tolerance.or(base.phase_tolerance),
            zernike_count: self.zernike_count.or(base.zernike_count),
            seed: self.seed.or(base.seed),
            initial_phase_noise: self.initial_phase_noise.or(base.initial_phase_noise),
        }
    }
}

impl FitParameters {
    /// Defaults with overrides applied, validated
    ///
    /// # Errors
    ///
    /// Returns [`FitError::InvalidParameter`] when the result fails
    /// [`FitParameters::validate`]
    pub fn resolve(overrides: &FitOverrides) -> Result<Self, FitError> {
        let defaults = Self::default();
        let parameters = Self {
            max_iterations: overrides.max_iterations.unwrap_or(defaults.max_iterations),
            pupil_tolerance: overrides.pupil_tolerance.unwrap_or(defaults.pupil_tolerance),
            mse_tolerance: overrides.mse_tolerance.unwrap_or(defaults.mse_tolerance),
            phase_tolerance: overrides.phase_tolerance.unwrap_or(defaults.phase_tolerance),
            zernike_count: overrides.zernike_count.unwrap_or(defaults.zernike_count),
            seed: overrides.seed.unwrap_or(defaults.seed),
            initial_phase_noise: overrides
                .initial_phase_noise
                .unwrap_or(defaults.initial_phase_noise),
        };
        parameters.validate()?;
        Ok(parameters)
    }

    /// Check ranges
    ///
    /// # Errors
    ///
    /// Returns [`FitError::InvalidParameter`] for zero iterations, negative or
    /// non-finite tolerances, a non-positive phase tolerance, or a Zernike count
    /// outside `1..=MAX_ZERNIKE_COUNT`
    pub fn validate(&self) -> Result<(), FitError> {
        if self.max_iterations == 0 {
            return Err(invalid_parameter(
                "max_iterations",
                &self.max_iterations,
                &"at least one iteration is required",
            ));
        }
        for (name, value) in [
            ("pupil_tolerance", self.pupil_tolerance),
            ("mse_tolerance", self.mse_tolerance),
            ("initial_phase_noise", self.initial_phase_noise),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid_parameter(name, &value, &"must be finite and non-negative"));
            }
        }
        if !self.phase_tolerance.is_finite() || self.phase_tolerance <= 0.0 {
            return Err(invalid_parameter(
                "phase_tolerance",
                &self.phase_tolerance,
                &"must be a positive number of waves",
            ));
        }
        if self.zernike_count == 0 || self.zernike_count > MAX_ZERNIKE_COUNT {
            return Err(invalid_parameter(
                "zernike_count",
                &self.zernike_count,
                &format!("must lie in 1..={MAX_ZERNIKE_COUNT}"),
            ));
        }
        Ok(())
    }

    /// Entries in report order
    pub fn entries(&self) -> [ParameterEntry; 4] {
        [
            ParameterEntry {
                name: "Maximum iterations",
                unit: "",
                value: self.max_iterations as f64,
            },
            ParameterEntry {
                name: "Minimal pupil function difference",
                unit: "",
                value: self.pupil_tolerance,
            },
            ParameterEntry {
                name: "Minimal relative MSE difference",
                unit: "",
                value: self.mse_tolerance,
            },
            ParameterEntry {
                name: "Tolerable phase deviation",
                unit: "waves",
                value: self.phase_tolerance,
            },
        ]
    }
}
