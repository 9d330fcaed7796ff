//! Gerchberg–Saxton pupil retrieval over a defocus series (Hanser et al. 2004)
//!
//! Each iteration propagates the current pupil to every plane, replaces the
//! modelled magnitude by the measured one while keeping the modelled phase,
//! propagates back and averages over planes, then clips to the aperture.

use crate::io::error::{FitError, invalid_parameter};
use crate::math::statistics::{normalized_mse, relative_change};
use crate::optics::prep::PreparedPsf;
use crate::optics::pupil::{HanserModel, axial_positions};
use crate::retrieval::engine::{IterationObserver, PhaseRetriever, ProgressEvent};
use crate::retrieval::parameters::{FitParameters, PsfParameters};
use crate::retrieval::result::{IterationRecord, RetrievalResult, RunOutcome, StopReason};
use ndarray::{Array2, Zip};
use num_complex::Complex64;
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::time::Instant;

/// Scalar-model Gerchberg–Saxton retrieval
#[derive(Clone, Copy, Debug, Default)]
pub struct HanserRetriever;

impl HanserRetriever {
    /// Create the retriever
    pub const fn new() -> Self {
        Self
    }
}

/// Unit pupil over the aperture, optionally with seeded random phase
fn initial_pupil(model: &HanserModel, fit: &FitParameters) -> Array2<Complex64> {
    let mut pupil = model.grid().aperture_pupil();
    if fit.initial_phase_noise > 0.0 {
        let mut rng = StdRng::seed_from_u64(fit.seed);
        let amplitude = fit.initial_phase_noise;
        Zip::from(&mut pupil)
            .and(model.grid().aperture())
            .for_each(|p, &inside| {
                if inside {
                    *p = Complex64::from_polar(1.0, rng.random_range(-amplitude..=amplitude));
                }
            });
    }
    pupil
}

fn stop_reason(record: &IterationRecord, fit: &FitParameters) -> Option<StopReason> {
    if record.iteration > 1 {
        if record.pupil_diff < fit.pupil_tolerance {
            return Some(StopReason::PupilConverged);
        }
        if record.mse_diff.is_some_and(|diff| diff < fit.mse_tolerance) {
            return Some(StopReason::MseConverged);
        }
    }
    (record.iteration >= fit.max_iterations).then_some(StopReason::MaxIterations)
}

impl PhaseRetriever for HanserRetriever {
    fn retrieve(
        &self,
        data: &PreparedPsf,
        psf: &PsfParameters,
        fit: &FitParameters,
        observer: &mut dyn IterationObserver,
    ) -> Result<RunOutcome, FitError> {
        psf.validate()?;
        fit.validate()?;

        let size = data.size();
        let positions = axial_positions(data.planes(), psf.pixel_size_z_nm, data.focus_index());
        let model = HanserModel::new(psf, size, &positions);
        if model.grid().aperture_len() == 0 {
            return Err(invalid_parameter(
                "numerical_aperture",
                &psf.numerical_aperture,
                &"aperture does not cover a single pupil sample",
            ));
        }

        let measured_magnitude = data.data().mapv(|v| v.max(0.0).sqrt());
        let mut pupil = initial_pupil(&model, fit);
        let mut trace: Vec<IterationRecord> = Vec::with_capacity(fit.max_iterations);
        let start = Instant::now();

        for iteration in 1..=fit.max_iterations {
            let amplitude = model.amplitude(&pupil);
            let intensity = amplitude.mapv(|a| a.norm_sqr());
            let mse = normalized_mse(data.data(), &intensity);
            if !mse.is_finite() {
                return Err(FitError::Diverged {
                    iteration,
                    reason: format!("mean squared error became {mse}"),
                });
            }

            let constrained = Zip::from(&amplitude)
                .and(&measured_magnitude)
                .map_collect(|a, &m| Complex64::from_polar(m, a.arg()));
            let next = model.back_propagate(&constrained);

            let pupil_diff = relative_change(&pupil, &next);
            if !pupil_diff.is_finite() {
                return Err(FitError::Diverged {
                    iteration,
                    reason: "pupil estimate vanished".to_string(),
                });
            }
            pupil = next;

            let mse_diff = trace
                .last()
                .map(|previous| (previous.mse - mse).abs() / previous.mse);
            let record = IterationRecord {
                iteration,
                mse,
                mse_diff,
                pupil_diff,
                elapsed: start.elapsed(),
            };
            trace.push(record);
            log::trace!(
                "iteration {iteration}: mse {mse:.3e}, pupil diff {pupil_diff:.3e}, mse diff {:?}",
                mse_diff
            );

            let event = ProgressEvent {
                iteration,
                max_iterations: fit.max_iterations,
                mse,
                mse_diff,
                pupil_diff,
                elapsed: record.elapsed,
            };
            if observer.on_iteration(&event).is_break() {
                log::debug!("retrieval cancelled after iteration {iteration}");
                return Ok(RunOutcome::Cancelled {
                    completed_iterations: iteration,
                });
            }

            if let Some(reason) = stop_reason(&record, fit) {
                log::debug!("retrieval stopped after iteration {iteration}: {reason}");
                return Ok(RunOutcome::Completed(Box::new(RetrievalResult::new(
                    pupil,
                    model.grid().clone(),
                    *psf,
                    *fit,
                    trace,
                    reason,
                    data.focus_index(),
                    start.elapsed(),
                ))));
            }
        }

        // Unreachable for max_iterations >= 1; the last iteration always stops
        Err(FitError::Diverged {
            iteration: fit.max_iterations,
            reason: "iteration loop ended without a stopping decision".to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "hanser"
    }
}
