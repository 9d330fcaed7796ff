//! Explicit session context driving one load, run and export cycle at a time
//!
//! ```text
//! Idle -> Loaded -> Running -> Completed | Cancelled | Failed -> Idle
//! ```
//!
//! A front end owns one [`Session`] and calls into it from its event loop;
//! the retrieval itself runs on a worker thread and is observed by polling.

use crate::io::error::{FitError, PsfError, Result};
use crate::io::ome_tiff::load_stack;
use crate::io::output::OutputPaths;
use crate::io::parameters::ParameterFile;
use crate::io::report::{Report, ReportOptions};
use crate::optics::stack::PsfStack;
use crate::optics::zernike::ZernikeFit;
use crate::retrieval::driver::{RetrievalDriver, RunHandle};
use crate::retrieval::engine::ProgressEvent;
use crate::retrieval::parameters::{FitParameters, PsfParameters};
use crate::retrieval::result::{RetrievalResult, RunOutcome};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle position of a [`Session`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Nothing loaded
    Idle,
    /// Stack loaded, no run yet
    Loaded,
    /// Worker thread running
    Running,
    /// Run finished with a result
    Completed,
    /// Run stopped on request
    Cancelled,
    /// Run ended with an error
    Failed,
}

impl SessionState {
    /// Lower-case name used in messages
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loaded => "loaded",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Whether a run has ended
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stack, run and result of the current session
#[derive(Debug, Default)]
pub struct Session {
    driver: RetrievalDriver,
    stack: Option<Arc<PsfStack>>,
    run: Option<RunHandle>,
    result: Option<RetrievalResult>,
    zernike: Option<ZernikeFit>,
    last_progress: Option<ProgressEvent>,
    failure: Option<FitError>,
    cancelled_after: Option<usize>,
}

impl Session {
    /// Empty session using the bundled retriever
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty session using `driver`
    pub fn with_driver(driver: RetrievalDriver) -> Self {
        Self {
            driver,
            ..Self::default()
        }
    }

    /// Current lifecycle position
    pub const fn state(&self) -> SessionState {
        if self.run.is_some() {
            SessionState::Running
        } else if self.result.is_some() {
            SessionState::Completed
        } else if self.cancelled_after.is_some() {
            SessionState::Cancelled
        } else if self.failure.is_some() {
            SessionState::Failed
        } else if self.stack.is_some() {
            SessionState::Loaded
        } else {
            SessionState::Idle
        }
    }

    const fn invalid(&self, operation: &'static str) -> PsfError {
        PsfError::InvalidState {
            operation,
            state: self.state().name(),
        }
    }

    fn require(&self, operation: &'static str, allowed: &[SessionState]) -> Result<()> {
        if allowed.contains(&self.state()) {
            Ok(())
        } else {
            Err(self.invalid(operation))
        }
    }

    fn clear_run(&mut self) {
        self.run = None;
        self.result = None;
        self.zernike = None;
        self.last_progress = None;
        self.failure = None;
        self.cancelled_after = None;
    }

    /// Load a PSF stack from disk, replacing any previous stack and result
    ///
    /// A failed load leaves the session as it was.
    ///
    /// # Errors
    ///
    /// Returns [`PsfError::InvalidState`] while running and [`PsfError::Load`]
    /// when the file cannot be read
    pub fn load(&mut self, path: &Path) -> Result<&PsfStack> {
        self.require("load a stack", &NOT_RUNNING)?;
        let stack = load_stack(path)?;
        self.attach(stack)
    }

    /// Use an in-memory stack, replacing any previous stack and result
    ///
    /// # Errors
    ///
    /// Returns [`PsfError::InvalidState`] while running
    pub fn attach(&mut self, stack: PsfStack) -> Result<&PsfStack> {
        self.require("load a stack", &NOT_RUNNING)?;
        self.clear_run();
        Ok(&**self.stack.insert(Arc::new(stack)))
    }

    /// Resolve run parameters: file metadata, then `overrides`
    ///
    /// # Errors
    ///
    /// Returns [`PsfError::InvalidState`] without a stack and
    /// [`PsfError::Fit`] when the resolved parameters are rejected
    pub fn resolve_parameters(
        &self,
        overrides: &ParameterFile,
    ) -> Result<(PsfParameters, FitParameters)> {
        let Some(stack) = &self.stack else {
            return Err(self.invalid("resolve parameters"));
        };
        let psf = PsfParameters::resolve(stack.metadata(), &overrides.psf)?;
        let fit = FitParameters::resolve(&overrides.fit)?;
        Ok((psf, fit))
    }

    /// Start a retrieval on the loaded stack
    ///
    /// Allowed after loading and after a previous run ended; rejected
    /// parameters leave the session unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`PsfError::InvalidState`] without a stack or while running, and
    /// [`PsfError::Fit`] for rejected parameters
    pub fn start(&mut self, psf: PsfParameters, fit: FitParameters) -> Result<()> {
        self.require("start a run", &STARTABLE)?;
        let Some(stack) = self.stack.clone() else {
            return Err(self.invalid("start a run"));
        };
        let handle = self.driver.spawn(stack, psf, fit)?;
        log::info!(
            "started {} retrieval, at most {} iterations",
            self.driver.retriever_name(),
            fit.max_iterations
        );
        self.clear_run();
        self.run = Some(handle);
        Ok(())
    }

    /// Drain progress without blocking; moves to a terminal state once the
    /// worker has finished
    ///
    /// # Errors
    ///
    /// Returns [`PsfError::InvalidState`] when no run is active
    pub fn poll(&mut self) -> Result<Vec<ProgressEvent>> {
        self.poll_with(RunHandle::poll)
    }

    /// Like [`Session::poll`] but waits up to `timeout` for the first event
    ///
    /// # Errors
    ///
    /// Returns [`PsfError::InvalidState`] when no run is active
    pub fn poll_timeout(&mut self, timeout: Duration) -> Result<Vec<ProgressEvent>> {
        self.poll_with(|handle| handle.poll_timeout(timeout))
    }

    fn poll_with(
        &mut self,
        drain: impl FnOnce(&mut RunHandle) -> Vec<ProgressEvent>,
    ) -> Result<Vec<ProgressEvent>> {
        if self.run.is_none() {
            return Err(self.invalid("poll progress"));
        }
        let Some(handle) = self.run.as_mut() else {
            return Ok(Vec::new());
        };
        let events = drain(handle);
        let finished = handle.is_finished();
        if let Some(last) = events.last() {
            self.last_progress = Some(*last);
        }
        if finished {
            if let Some(mut handle) = self.run.take() {
                self.settle(handle.finish());
            }
        }
        Ok(events)
    }

    /// Block until the run ends, forwarding progress to `on_progress`
    ///
    /// # Errors
    ///
    /// Returns [`PsfError::InvalidState`] when no run is active,
    /// [`PsfError::Cancelled`] when the run was cancelled and
    /// [`PsfError::Fit`] when it failed
    pub fn wait(&mut self, mut on_progress: impl FnMut(&ProgressEvent)) -> Result<&RetrievalResult> {
        let Some(handle) = self.run.take() else {
            return Err(self.invalid("wait for a run"));
        };
        let mut last = self.last_progress;
        let outcome = handle.wait(|event| {
            last = Some(*event);
            on_progress(event);
        });
        self.last_progress = last;
        self.settle(outcome);
        self.outcome()
    }

    /// Outcome of the last run
    ///
    /// # Errors
    ///
    /// Returns [`PsfError::Cancelled`] or [`PsfError::Fit`] for runs that did
    /// not complete and [`PsfError::InvalidState`] when no run has ended
    pub fn outcome(&self) -> Result<&RetrievalResult> {
        if let Some(result) = &self.result {
            return Ok(result);
        }
        if let Some(completed_iterations) = self.cancelled_after {
            return Err(PsfError::Cancelled {
                completed_iterations,
            });
        }
        if let Some(error) = &self.failure {
            return Err(PsfError::Fit(error.clone()));
        }
        Err(self.invalid("read the outcome"))
    }

    fn settle(&mut self, outcome: std::result::Result<RunOutcome, FitError>) {
        match outcome {
            Ok(RunOutcome::Completed(result)) => match result.zernike() {
                Ok(zernike) => {
                    log::info!(
                        "retrieval completed after {} iterations ({}), {:.2?}",
                        result.iterations(),
                        result.stop_reason(),
                        result.elapsed()
                    );
                    self.zernike = Some(zernike);
                    self.result = Some(*result);
                }
                Err(error) => {
                    log::warn!("zernike decomposition failed: {error}");
                    self.failure = Some(error);
                }
            },
            Ok(RunOutcome::Cancelled {
                completed_iterations,
            }) => {
                log::info!("retrieval cancelled after {completed_iterations} iterations");
                self.cancelled_after = Some(completed_iterations);
            }
            Err(error) => {
                log::warn!("retrieval failed: {error}");
                self.failure = Some(error);
            }
        }
    }

    /// Ask the worker to stop after its current iteration
    ///
    /// The session stays [`SessionState::Running`] until the worker
    /// acknowledges through [`Session::poll`] or [`Session::wait`].
    ///
    /// # Errors
    ///
    /// Returns [`PsfError::InvalidState`] when no run is active
    pub fn cancel(&self) -> Result<()> {
        let Some(handle) = &self.run else {
            return Err(self.invalid("cancel"));
        };
        log::debug!("cancellation requested");
        handle.cancel();
        Ok(())
    }

    /// Write the report of the completed run
    ///
    /// # Errors
    ///
    /// Returns [`PsfError::InvalidState`] unless the run completed and
    /// [`PsfError::Write`] when an artefact cannot be written
    pub fn export(&self, paths: &OutputPaths, options: &ReportOptions) -> Result<Vec<PathBuf>> {
        let (Some(stack), Some(result), Some(zernike)) = (&self.stack, &self.result, &self.zernike)
        else {
            return Err(self.invalid("export a report"));
        };
        Ok(Report::new(stack, result, zernike).write(paths, options)?)
    }

    /// Drop stack, run and result; a running worker is cancelled
    pub fn reset(&mut self) {
        if let Some(handle) = &self.run {
            handle.cancel();
        }
        self.clear_run();
        self.stack = None;
    }

    /// Loaded stack
    pub fn stack(&self) -> Option<&PsfStack> {
        self.stack.as_deref()
    }

    /// Result of the completed run
    pub const fn result(&self) -> Option<&RetrievalResult> {
        self.result.as_ref()
    }

    /// Zernike decomposition of the completed run
    pub const fn zernike(&self) -> Option<&ZernikeFit> {
        self.zernike.as_ref()
    }

    /// Most recent progress of the current or last run
    pub const fn last_progress(&self) -> Option<&ProgressEvent> {
        self.last_progress.as_ref()
    }

    /// Error of the failed run
    pub const fn failure(&self) -> Option<&FitError> {
        self.failure.as_ref()
    }

    /// Report locations next to the loaded file, or in `directory`
    pub fn output_paths(&self, directory: Option<&Path>) -> Option<OutputPaths> {
        let source = self.stack.as_ref()?.source()?;
        Some(OutputPaths::for_input(source, directory))
    }
}

const NOT_RUNNING: [SessionState; 5] = [
    SessionState::Idle,
    SessionState::Loaded,
    SessionState::Completed,
    SessionState::Cancelled,
    SessionState::Failed,
];

const STARTABLE: [SessionState; 4] = [
    SessionState::Loaded,
    SessionState::Completed,
    SessionState::Cancelled,
    SessionState::Failed,
];
