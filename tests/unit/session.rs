//! Tests for the session state machine

#[cfg(test)]
mod tests {
    use psf_retrieval::io::output::OutputPaths;
    use psf_retrieval::io::parameters::ParameterFile;
    use psf_retrieval::io::report::ReportOptions;
    use psf_retrieval::optics::prep::PreparedPsf;
    use psf_retrieval::optics::stack::PsfStack;
    use psf_retrieval::optics::synthetic::SyntheticPsf;
    use psf_retrieval::retrieval::driver::RetrievalDriver;
    use psf_retrieval::retrieval::engine::{IterationObserver, PhaseRetriever};
    use psf_retrieval::retrieval::parameters::{FitOverrides, FitParameters, PsfParameters};
    use psf_retrieval::retrieval::result::RunOutcome;
    use psf_retrieval::session::{Session, SessionState};
    use psf_retrieval::{FitError, PsfError};
    use std::path::Path;
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

    fn assert_invalid_state<T: std::fmt::Debug>(result: Result<T, PsfError>, state: &str) {
        match result {
            Err(PsfError::InvalidState { state: actual, .. }) => assert_eq!(actual, state),
            other => panic!("expected an invalid state error, got {other:?}"),
        }
    }

    /// Routine that always diverges
    struct Diverging;

    impl PhaseRetriever for Diverging {
        fn retrieve(
            &self,
            _data: &PreparedPsf,
            _psf: &PsfParameters,
            _fit: &FitParameters,
            _observer: &mut dyn IterationObserver,
        ) -> Result<RunOutcome, FitError> {
            Err(FitError::Diverged {
                iteration: 1,
                reason: "test".to_string(),
            })
        }

        fn name(&self) -> &'static str {
            "diverging"
        }
    }

    // Tests operations needing a stack or a run are refused when idle
    // Verified by allowing start without a stack
    #[test]
    fn test_idle_rejections() {
        let mut session = Session::new();
        assert_eq!(session.state(), SessionState::Idle);

        assert_invalid_state(session.start(params(), fit(1)), "idle");
        assert_invalid_state(session.poll(), "idle");
        assert_invalid_state(session.cancel(), "idle");
        assert_invalid_state(session.outcome(), "idle");
        assert_invalid_state(session.resolve_parameters(&ParameterFile::default()), "idle");
        let paths = OutputPaths::new(Path::new("."), "x");
        assert_invalid_state(session.export(&paths, &ReportOptions::default()), "idle");
    }

    // Tests a full cycle from attach to export and back to idle
    // Verified by leaving the result unset after wait
    #[test]
    fn test_complete_cycle() {
        let mut session = Session::new();
        session.attach(stack()).unwrap();
        assert_eq!(session.state(), SessionState::Loaded);
        assert!(session.output_paths(None).is_none());

        let overrides = ParameterFile {
            fit: FitOverrides {
                max_iterations: Some(3),
                zernike_count: Some(15),
                ..FitOverrides::default()
            },
            ..ParameterFile::default()
        };
        let (psf, fit) = session.resolve_parameters(&overrides).unwrap();
        assert_eq!(psf, params());
        assert_eq!(fit.max_iterations, 3);

        session.start(psf, fit).unwrap();
        assert_eq!(session.state(), SessionState::Running);
        assert_invalid_state(session.start(psf, fit), "running");
        assert_invalid_state(session.attach(stack()), "running");

        let mut seen = 0;
        let iterations = session.wait(|_| seen += 1).unwrap().iterations();
        assert_eq!(iterations, seen);
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(session.zernike().unwrap().phase_coefficients().len(), 15);
        assert_eq!(session.last_progress().unwrap().iteration, iterations);

        let dir = tempfile::tempdir().unwrap();
        let paths = OutputPaths::new(dir.path(), "bead");
        let written = session.export(&paths, &ReportOptions::default()).unwrap();
        assert_eq!(written, vec![paths.spreadsheet()]);

        session.reset();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.stack().is_none());
    }

    // Tests polling drives the session to completion
    // Verified by never settling the finished handle
    #[test]
    fn test_poll_until_completed() {
        let mut session = Session::new();
        session.attach(stack()).unwrap();
        session.start(params(), fit(2)).unwrap();

        let mut events = Vec::new();
        while session.state() == SessionState::Running {
            events.extend(session.poll_timeout(Duration::from_millis(20)).unwrap());
        }

        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(events.len(), 2);
        assert!(session.outcome().is_ok());
        assert!(session.result().is_some());
    }

    // Tests cancellation ends in Cancelled with no exportable result, then restarts
    // Verified by completing the run after cancel
    #[test]
    fn test_cancel_then_restart() {
        let mut session = Session::new();
        session.attach(stack()).unwrap();
        session.start(params(), fit(100_000)).unwrap();

        session.cancel().unwrap();
        assert_eq!(session.state(), SessionState::Running);
        let error = session.wait(|_| {}).unwrap_err();

        assert!(matches!(error, PsfError::Cancelled { .. }));
        assert_eq!(error.exit_code(), 6);
        assert_eq!(session.state(), SessionState::Cancelled);
        assert!(session.result().is_none());
        let dir = tempfile::tempdir().unwrap();
        let paths = OutputPaths::new(dir.path(), "bead");
        assert_invalid_state(session.export(&paths, &ReportOptions::default()), "cancelled");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        session.start(params(), fit(1)).unwrap();
        assert!(session.wait(|_| {}).is_ok());
        assert_eq!(session.state(), SessionState::Completed);
    }

    // Tests a diverging routine leaves the session Failed with its error
    // Verified by mapping failures to Cancelled
    #[test]
    fn test_failed_run() {
        let mut session = Session::with_driver(RetrievalDriver::new(Arc::new(Diverging)));
        session.attach(stack()).unwrap();
        session.start(params(), fit(5)).unwrap();

        let error = session.wait(|_| {}).unwrap_err();

        assert_eq!(error.exit_code(), 4);
        assert_eq!(session.state(), SessionState::Failed);
        assert!(matches!(session.failure(), Some(FitError::Diverged { .. })));
        assert!(session.outcome().is_err());
    }

    // Tests rejected parameters and failed loads leave the state unchanged
    // Verified by clearing the stack before loading
    #[test]
    fn test_failures_keep_state() {
        let mut session = Session::new();
        session.attach(stack()).unwrap();

        assert!(matches!(
            session.start(params(), fit(0)),
            Err(PsfError::Fit(FitError::InvalidParameter { .. }))
        ));
        assert_eq!(session.state(), SessionState::Loaded);

        let error = session.load(Path::new("/nonexistent/bead.ome.tif")).unwrap_err();
        assert_eq!(error.exit_code(), 3);
        assert_eq!(session.state(), SessionState::Loaded);
        assert!(session.stack().is_some());
    }

    // Tests state names and terminal flags
    // Verified by marking Running as terminal
    #[test]
    fn test_state_names() {
        assert_eq!(SessionState::Completed.to_string(), "completed");
        assert!(SessionState::Failed.is_terminal());
        assert!(SessionState::Cancelled.is_terminal());
        assert!(!SessionState::Running.is_terminal());
        assert!(!SessionState::Loaded.is_terminal());
    }
}
