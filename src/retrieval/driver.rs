//! Runs a phase retriever synchronously or on a worker thread with progress and cancellation

use crate::io::configuration::{BACKGROUND_MULTIPLIER, PADDING_FACTOR};
use crate::io::error::{FitError, computation_error};
use crate::optics::prep::prepare_stack;
use crate::optics::stack::PsfStack;
use crate::retrieval::engine::{IterationObserver, PhaseRetriever, ProgressEvent};
use crate::retrieval::hanser::HanserRetriever;
use crate::retrieval::parameters::{FitParameters, PsfParameters};
use crate::retrieval::result::RunOutcome;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Shared flag checked by the worker between iterations
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, unset token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Message sent from the worker to the handle
#[derive(Debug)]
pub enum DriverEvent {
    /// One iteration completed
    Progress(ProgressEvent),
    /// Worker finished; always the last message
    Finished(Result<RunOutcome, FitError>),
}

/// Validates inputs, prepares the stack and hands it to a [`PhaseRetriever`]
#[derive(Clone)]
pub struct RetrievalDriver {
    retriever: Arc<dyn PhaseRetriever>,
}

impl Default for RetrievalDriver {
    fn default() -> Self {
        Self::new(Arc::new(HanserRetriever::new()))
    }
}

impl std::fmt::Debug for RetrievalDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalDriver")
            .field("retriever", &self.retriever.name())
            .finish()
    }
}

impl RetrievalDriver {
    /// Driver delegating to `retriever`
    pub const fn new(retriever: Arc<dyn PhaseRetriever>) -> Self {
        Self { retriever }
    }

    /// Name of the underlying routine
    pub fn retriever_name(&self) -> &'static str {
        self.retriever.name()
    }

    /// Run on the calling thread
    ///
    /// # Errors
    ///
    /// Returns [`FitError::InvalidParameter`] before any work when a parameter
    /// is rejected, or whatever the routine reports
    pub fn run(
        &self,
        stack: &PsfStack,
        psf: &PsfParameters,
        fit: &FitParameters,
        observer: &mut dyn IterationObserver,
    ) -> Result<RunOutcome, FitError> {
        psf.validate()?;
        fit.validate()?;

        let prepared = prepare_stack(stack, PADDING_FACTOR, BACKGROUND_MULTIPLIER)?;
        log::debug!(
            "prepared {}x{}x{} stack, background {:.3}, focus plane {}",
            prepared.planes(),
            prepared.size(),
            prepared.size(),
            prepared.background(),
            prepared.focus_index()
        );

        self.retriever.retrieve(&prepared, psf, fit, observer)
    }

    /// Run on a dedicated worker thread
    ///
    /// Parameters are validated before the thread starts so obvious mistakes
    /// surface immediately.
    ///
    /// # Errors
    ///
    /// Returns [`FitError::InvalidParameter`] for rejected parameters and
    /// [`FitError::Computation`] when the thread cannot be spawned
    pub fn spawn(
        &self,
        stack: Arc<PsfStack>,
        psf: PsfParameters,
        fit: FitParameters,
    ) -> Result<RunHandle, FitError> {
        psf.validate()?;
        fit.validate()?;

        let (tx, rx) = mpsc::channel::<DriverEvent>();
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();
        let driver = self.clone();

        let worker = std::thread::Builder::new()
            .name("psf-retrieval-worker".into())
            .spawn(move || {
                let mut observer = ChannelObserver {
                    tx: tx.clone(),
                    cancel: worker_cancel,
                };
                let outcome = driver.run(&stack, &psf, &fit, &mut observer);
                // Receiver may be gone; nothing left to report to
                let _ = tx.send(DriverEvent::Finished(outcome));
            })
            .map_err(|e| computation_error("spawn retrieval worker", &e))?;

        Ok(RunHandle {
            events: rx,
            cancel,
            worker: Some(worker),
            outcome: None,
            max_iterations: fit.max_iterations,
        })
    }
}

/// Forwards progress over the channel and reports cancellation
struct ChannelObserver {
    tx: Sender<DriverEvent>,
    cancel: CancelToken,
}

impl IterationObserver for ChannelObserver {
    fn on_iteration(&mut self, event: &ProgressEvent) -> ControlFlow<()> {
        let _ = self.tx.send(DriverEvent::Progress(*event));
        if self.cancel.is_cancelled() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}

/// Owner-side view of a run executing on a worker thread
#[derive(Debug)]
pub struct RunHandle {
    events: Receiver<DriverEvent>,
    cancel: CancelToken,
    worker: Option<JoinHandle<()>>,
    outcome: Option<Result<RunOutcome, FitError>>,
    max_iterations: usize,
}

impl RunHandle {
    /// Token that cancels this run
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Request cooperative cancellation; takes effect after the current iteration
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Iteration budget of the run
    pub const fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Whether the worker delivered its outcome
    pub const fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// Drain pending progress without blocking
    pub fn poll(&mut self) -> Vec<ProgressEvent> {
        let mut progress = Vec::new();
        while self.outcome.is_none() {
            match self.events.try_recv() {
                Ok(event) => self.absorb(event, &mut progress),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.outcome = Some(Err(FitError::WorkerPanicked));
                }
            }
        }
        progress
    }

    /// Wait up to `timeout` for the next batch of progress
    pub fn poll_timeout(&mut self, timeout: Duration) -> Vec<ProgressEvent> {
        let mut progress = Vec::new();
        if self.outcome.is_none() {
            match self.events.recv_timeout(timeout) {
                Ok(event) => self.absorb(event, &mut progress),
                Err(RecvTimeoutError::Timeout) => return progress,
                Err(RecvTimeoutError::Disconnected) => {
                    self.outcome = Some(Err(FitError::WorkerPanicked));
                }
            }
        }
        progress.extend(self.poll());
        progress
    }

    /// Block until the worker finishes, forwarding progress to `on_progress`
    ///
    /// # Errors
    ///
    /// Returns the routine's [`FitError`], or [`FitError::WorkerPanicked`]
    /// when the worker ended without reporting
    pub fn wait(
        mut self,
        mut on_progress: impl FnMut(&ProgressEvent),
    ) -> Result<RunOutcome, FitError> {
        while self.outcome.is_none() {
            let mut progress = Vec::new();
            match self.events.recv() {
                Ok(event) => self.absorb(event, &mut progress),
                Err(_) => self.outcome = Some(Err(FitError::WorkerPanicked)),
            }
            progress.iter().for_each(&mut on_progress);
        }
        self.finish()
    }

    /// Take the outcome once [`RunHandle::is_finished`] is true
    ///
    /// # Errors
    ///
    /// Returns [`FitError::RunPending`] while the worker is still running,
    /// leaving the run untouched; otherwise the routine's [`FitError`], or
    /// [`FitError::WorkerPanicked`] when the worker did not exit cleanly
    pub fn finish(&mut self) -> Result<RunOutcome, FitError> {
        let Some(outcome) = self.outcome.take() else {
            return Err(FitError::RunPending);
        };
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                return Err(FitError::WorkerPanicked);
            }
        }
        outcome
    }

    fn absorb(&mut self, event: DriverEvent, progress: &mut Vec<ProgressEvent>) {
        match event {
            DriverEvent::Progress(step) => progress.push(step),
            DriverEvent::Finished(outcome) => self.outcome = Some(outcome),
        }
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        // An abandoned run stops at its next iteration boundary
        if self.worker.is_some() && self.outcome.is_none() {
            self.cancel.cancel();
        }
    }
}
