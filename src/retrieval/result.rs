//! Products of a completed retrieval run

use crate::io::error::FitError;
use crate::math::fft::fftshift;
use crate::optics::pupil::{HanserModel, PupilGrid, axial_positions};
use crate::optics::zernike::ZernikeFit;
use crate::retrieval::parameters::{FitParameters, PsfParameters};
use ndarray::{Array2, Array3, Zip};
use num_complex::Complex64;
use std::fmt;
use std::time::Duration;

/// Error metrics recorded for one iteration
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IterationRecord {
    /// 1-based iteration index
    pub iteration: usize,
    /// Mean squared error between model and data
    pub mse: f64,
    /// Relative change of the MSE, absent on the first iteration
    pub mse_diff: Option<f64>,
    /// Relative change of the pupil estimate
    pub pupil_diff: f64,
    /// Time since the run started
    pub elapsed: Duration,
}

/// Why the iteration loop ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Pupil change dropped below its tolerance
    PupilConverged,
    /// MSE change dropped below its tolerance
    MseConverged,
    /// Iteration budget exhausted
    MaxIterations,
}

impl StopReason {
    /// Human-readable description for reports
    pub const fn description(self) -> &'static str {
        match self {
            Self::PupilConverged => "Pupil function difference below tolerance",
            Self::MseConverged => "Relative MSE difference below tolerance",
            Self::MaxIterations => "Maximum number of iterations reached",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Pupil estimate and run history of a completed retrieval
#[derive(Clone, Debug)]
pub struct RetrievalResult {
    pupil: Array2<Complex64>,
    grid: PupilGrid,
    psf: PsfParameters,
    fit: FitParameters,
    trace: Vec<IterationRecord>,
    stop_reason: StopReason,
    focus_index: usize,
    elapsed: Duration,
}

impl RetrievalResult {
    /// Assemble a result; the pupil must be sampled on `grid`
    pub fn new(
        pupil: Array2<Complex64>,
        grid: PupilGrid,
        psf: PsfParameters,
        fit: FitParameters,
        trace: Vec<IterationRecord>,
        stop_reason: StopReason,
        focus_index: usize,
        elapsed: Duration,
    ) -> Self {
        Self {
            pupil,
            grid,
            psf,
            fit,
            trace,
            stop_reason,
            focus_index,
            elapsed,
        }
    }

    /// Pupil on the unshifted frequency grid
    pub const fn pupil(&self) -> &Array2<Complex64> {
        &self.pupil
    }

    /// Frequency grid of the pupil
    pub const fn grid(&self) -> &PupilGrid {
        &self.grid
    }

    /// Optical parameters used for the run
    pub const fn psf_parameters(&self) -> &PsfParameters {
        &self.psf
    }

    /// Fit parameters used for the run
    pub const fn fit_parameters(&self) -> &FitParameters {
        &self.fit
    }

    /// Per-iteration error metrics
    pub fn trace(&self) -> &[IterationRecord] {
        &self.trace
    }

    /// Why the loop ended
    pub const fn stop_reason(&self) -> StopReason {
        self.stop_reason
    }

    /// Wall-clock duration of the run
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Number of completed iterations
    pub const fn iterations(&self) -> usize {
        self.trace.len()
    }

    /// MSE of the last iteration
    pub fn final_mse(&self) -> Option<f64> {
        self.trace.last().map(|record| record.mse)
    }

    /// "Phase retrieval stopped after iteration k out of N."
    pub fn status_line(&self) -> String {
        format!(
            "Phase retrieval stopped after iteration {} out of {}.",
            self.iterations(),
            self.fit.max_iterations
        )
    }

    /// Pupil magnitude with the zero frequency centred
    pub fn magnitude(&self) -> Array2<f64> {
        fftshift(&self.pupil.mapv(Complex64::norm))
    }

    /// Pupil phase in radians with the zero frequency centred, zero outside the aperture
    pub fn phase(&self) -> Array2<f64> {
        let mut phase = Array2::zeros(self.pupil.dim());
        Zip::from(&mut phase)
            .and(&self.pupil)
            .and(self.grid.aperture())
            .for_each(|out, p, &inside| {
                if inside {
                    *out = p.arg();
                }
            });
        fftshift(&phase)
    }

    /// Model PSF of `planes` slices around the retrieved focus, indexed `(z, y, x)`
    pub fn reconstruct_psf(&self, planes: usize) -> Array3<f64> {
        let focus = self.focus_index.min(planes.saturating_sub(1));
        let positions = axial_positions(planes, self.psf.pixel_size_z_nm, focus);
        HanserModel::new(&self.psf, self.grid.size(), &positions).intensity(&self.pupil)
    }

    /// Decompose the pupil into the configured number of Zernike polynomials
    ///
    /// # Errors
    ///
    /// Returns [`FitError`] when the fit cannot be computed
    pub fn zernike(&self) -> Result<ZernikeFit, FitError> {
        ZernikeFit::fit(&self.grid, &self.pupil, self.fit.zernike_count)
    }
}

/// How a run ended when it did not fail
#[derive(Clone, Debug)]
pub enum RunOutcome {
    /// Run reached a stopping criterion
    Completed(Box<RetrievalResult>),
    /// Observer requested a stop
    Cancelled {
        /// Iterations finished before the stop took effect
        completed_iterations: usize,
    },
}

impl RunOutcome {
    /// Result of a completed run
    pub fn into_result(self) -> Option<RetrievalResult> {
        match self {
            Self::Completed(result) => Some(*result),
            Self::Cancelled { .. } => None,
        }
    }

    /// Whether the run was cancelled
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
