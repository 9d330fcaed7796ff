//! Contract between the retrieval driver and an iterative phase-retrieval routine

use crate::io::error::FitError;
use crate::optics::prep::PreparedPsf;
use crate::retrieval::parameters::{FitParameters, PsfParameters};
use crate::retrieval::result::RunOutcome;
use std::ops::ControlFlow;
use std::time::Duration;

/// Snapshot emitted after every completed iteration
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProgressEvent {
    /// 1-based index of the iteration just completed
    pub iteration: usize,
    /// Configured upper bound on iterations
    pub max_iterations: usize,
    /// Mean squared error between model and data
    pub mse: f64,
    /// Relative change of the MSE, absent on the first iteration
    pub mse_diff: Option<f64>,
    /// Relative change of the pupil estimate
    pub pupil_diff: f64,
    /// Time since the run started
    pub elapsed: Duration,
}

impl ProgressEvent {
    /// Completed fraction of the iteration budget
    pub const fn fraction(&self) -> f64 {
        if self.max_iterations == 0 {
            return 1.0;
        }
        (self.iteration as f64 / self.max_iterations as f64).min(1.0)
    }
}

/// Receives progress and decides whether the run continues
pub trait IterationObserver {
    /// Called once per completed iteration; `Break` stops the run
    fn on_iteration(&mut self, event: &ProgressEvent) -> ControlFlow<()>;
}

impl<F> IterationObserver for F
where
    F: FnMut(&ProgressEvent) -> ControlFlow<()>,
{
    fn on_iteration(&mut self, event: &ProgressEvent) -> ControlFlow<()> {
        self(event)
    }
}

/// Iterative estimator of the pupil function from a prepared PSF stack
///
/// Implementations must invoke the observer after every iteration and stop
/// with [`RunOutcome::Cancelled`] as soon as it returns `Break`. Identical
/// inputs must produce identical outputs.
pub trait PhaseRetriever: Send + Sync {
    /// Run the routine to completion, cancellation or failure
    ///
    /// # Errors
    ///
    /// Returns [`FitError`] when the parameters are rejected or the routine
    /// diverges
    fn retrieve(
        &self,
        data: &PreparedPsf,
        psf: &PsfParameters,
        fit: &FitParameters,
        observer: &mut dyn IterationObserver,
    ) -> Result<RunOutcome, FitError>;

    /// Short identifier for logs and reports
    fn name(&self) -> &'static str;
}
