//! Tests for synchronous and threaded retrieval runs

#[cfg(test)]
mod tests {
    use psf_retrieval::FitError;
    use psf_retrieval::optics::stack::PsfStack;
    use psf_retrieval::optics::synthetic::SyntheticPsf;
    use psf_retrieval::retrieval::driver::{CancelToken, RetrievalDriver};
    use psf_retrieval::optics::prep::PreparedPsf;
    use psf_retrieval::retrieval::engine::{IterationObserver, PhaseRetriever, ProgressEvent};
    use psf_retrieval::retrieval::parameters::{FitParameters, PsfParameters};
    use psf_retrieval::retrieval::result::{RunOutcome, StopReason};
    use std::ops::ControlFlow;
    use std::sync::Arc;
    use std::time::Duration;

    fn params() -> PsfParameters {
        PsfParameters {
            wavelength_nm: 520.0,
            numerical_aperture: 1.2,
            refractive_index: 1.333,
            pixel_size_xy_nm: 100.0,
            pixel_size_z_nm: 250.0,
        }
    }

    fn stack() -> PsfStack {
        SyntheticPsf::new(params(), 16, 7)
            .with_aberration(6, 0.05)
            .with_levels(1000.0, 0.0)
            .render()
            .unwrap()
    }

    fn fit(max_iterations: usize) -> FitParameters {
        FitParameters {
            max_iterations,
            pupil_tolerance: 0.0,
            mse_tolerance: 0.0,
            zernike_count: 15,
            ..FitParameters::default()
        }
    }

    struct Crashing;

    impl PhaseRetriever for Crashing {
        fn retrieve(
            &self,
            _data: &PreparedPsf,
            _psf: &PsfParameters,
            _fit: &FitParameters,
            _observer: &mut dyn IterationObserver,
        ) -> Result<RunOutcome, FitError> {
            panic!("routine crashed");
        }

        fn name(&self) -> &'static str {
            "crashing"
        }
    }

    // Tests cancel tokens share their flag across clones
    // Verified by deriving Clone on a plain bool
    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();

        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    // Tests a synchronous run prepares the padded stack and reports each iteration
    // Verified by handing the raw stack to the routine
    #[test]
    fn test_run_on_calling_thread() {
        let driver = RetrievalDriver::default();
        let mut events = 0;
        let mut observer = |_: &ProgressEvent| {
            events += 1;
            ControlFlow::Continue(())
        };

        let outcome = driver.run(&stack(), &params(), &fit(3), &mut observer).unwrap();

        let result = outcome.into_result().unwrap();
        assert_eq!(events, 3);
        assert_eq!(result.grid().size(), 32);
        assert_eq!(result.stop_reason(), StopReason::MaxIterations);
        assert_eq!(driver.retriever_name(), "hanser");
    }

    // Tests a worker run forwards progress and delivers the result
    // Verified by dropping progress sent before the outcome
    #[test]
    fn test_spawn_and_wait() {
        let driver = RetrievalDriver::default();
        let handle = driver.spawn(Arc::new(stack()), params(), fit(4)).unwrap();
        assert_eq!(handle.max_iterations(), 4);
        let mut seen = Vec::new();

        let outcome = handle.wait(|e| seen.push(e.iteration)).unwrap();

        assert_eq!(seen, vec![1, 2, 3, 4]);
        assert_eq!(outcome.into_result().unwrap().iterations(), 4);
    }

    // Tests polling with a timeout eventually settles the run
    // Verified by never recording the outcome in poll_timeout
    #[test]
    fn test_poll_until_finished() {
        let driver = RetrievalDriver::default();
        let mut handle = driver.spawn(Arc::new(stack()), params(), fit(3)).unwrap();
        let mut progress = Vec::new();

        while !handle.is_finished() {
            progress.extend(handle.poll_timeout(Duration::from_millis(20)));
        }

        assert_eq!(progress.len(), 3);
        assert!(handle.finish().unwrap().into_result().is_some());
    }

    // Tests cancellation stops the worker at an iteration boundary
    // Verified by never consulting the cancel token
    #[test]
    fn test_cancel_worker() {
        let driver = RetrievalDriver::default();
        let handle = driver.spawn(Arc::new(stack()), params(), fit(100_000)).unwrap();

        handle.cancel();
        let outcome = handle.wait(|_| {}).unwrap();

        match outcome {
            RunOutcome::Cancelled {
                completed_iterations,
            } => assert!((1..100_000).contains(&completed_iterations)),
            RunOutcome::Completed(_) => panic!("run should have been cancelled"),
        }
    }

    // Tests asking for the outcome early leaves the run alive and retrievable
    // Verified by consuming the handle and cancelling the worker on an early finish
    #[test]
    fn test_finish_before_outcome() {
        let driver = RetrievalDriver::default();
        let mut handle = driver.spawn(Arc::new(stack()), params(), fit(100_000)).unwrap();

        assert!(matches!(handle.finish(), Err(FitError::RunPending)));
        assert!(!handle.cancel_token().is_cancelled());

        handle.cancel();
        let outcome = handle.wait(|_| {}).unwrap();
        assert!(matches!(outcome, RunOutcome::Cancelled { .. }));
    }

    // Tests invalid parameters are rejected before a worker starts
    // Verified by validating inside the worker
    #[test]
    fn test_spawn_rejects_parameters() {
        let driver = RetrievalDriver::default();
        let bad_optics = PsfParameters {
            numerical_aperture: 1.5,
            ..params()
        };

        assert!(matches!(
            driver.spawn(Arc::new(stack()), bad_optics, fit(3)),
            Err(FitError::InvalidParameter {
                parameter: "numerical_aperture",
                ..
            })
        ));
        assert!(matches!(
            driver.spawn(Arc::new(stack()), params(), fit(0)),
            Err(FitError::InvalidParameter {
                parameter: "max_iterations",
                ..
            })
        ));
    }

    // Tests a panicking routine surfaces as an error instead of hanging
    // Verified by waiting on the channel without a disconnect check
    #[test]
    fn test_worker_panic_reported() {
        let driver = RetrievalDriver::new(Arc::new(Crashing));
        let handle = driver.spawn(Arc::new(stack()), params(), fit(3)).unwrap();

        assert_eq!(driver.retriever_name(), "crashing");
        assert!(matches!(handle.wait(|_| {}), Err(FitError::WorkerPanicked)));
    }
}
