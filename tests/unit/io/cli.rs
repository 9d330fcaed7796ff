//! Tests for command-line parsing and the simulate and inspect commands

#[cfg(test)]
mod tests {
    use clap::Parser;
    use log::LevelFilter;
    use psf_retrieval::PsfError;
    use psf_retrieval::io::cli::{Cli, Command, parse_aberration, run};
    use psf_retrieval::io::ome_tiff::load_stack;
    use std::path::PathBuf;

    fn retrieve_args(cli: Cli) -> psf_retrieval::io::cli::RetrieveArgs {
        match cli.command {
            Command::Retrieve(args) => args,
            other => panic!("expected retrieve, got {other:?}"),
        }
    }

    // Tests retrieve with only the input file keeps every override unset
    // Verified by giving the flags default values
    #[test]
    fn test_parse_retrieve_minimal() {
        let cli = Cli::parse_from(["psf-retrieval", "retrieve", "bead.ome.tif"]);
        assert_eq!(cli.log_level(), LevelFilter::Info);

        let args = retrieve_args(cli);
        assert_eq!(args.target, PathBuf::from("bead.ome.tif"));
        assert!(args.output.is_none());
        assert!(!args.pdf && !args.png);

        let overrides = args.parameters().unwrap();
        assert_eq!(overrides.psf.wavelength_nm, None);
        assert_eq!(overrides.fit.max_iterations, None);
        assert!(args.deadline().unwrap().is_none());
    }

    // Tests every override flag reaches the parameter layer
    // Verified by dropping the flattened fit flags
    #[test]
    fn test_parse_retrieve_overrides() {
        let cli = Cli::parse_from([
            "psf-retrieval",
            "-vv",
            "retrieve",
            "bead.ome.tif",
            "--wavelength",
            "600",
            "--na",
            "1.4",
            "--ri",
            "1.518",
            "--xy-res",
            "65",
            "--z-res",
            "150",
            "-i",
            "25",
            "-z",
            "36",
            "--seed",
            "9",
            "--phase-tolerance",
            "0.1",
            "--pdf",
            "--png",
            "--timeout",
            "1.5",
        ]);
        assert_eq!(cli.log_level(), LevelFilter::Trace);

        let args = retrieve_args(cli);
        let overrides = args.parameters().unwrap();
        assert_eq!(overrides.psf.wavelength_nm, Some(600.0));
        assert_eq!(overrides.psf.numerical_aperture, Some(1.4));
        assert_eq!(overrides.psf.refractive_index, Some(1.518));
        assert_eq!(overrides.psf.pixel_size_xy_nm, Some(65.0));
        assert_eq!(overrides.psf.pixel_size_z_nm, Some(150.0));
        assert_eq!(overrides.fit.max_iterations, Some(25));
        assert_eq!(overrides.fit.zernike_count, Some(36));
        assert_eq!(overrides.fit.seed, Some(9));
        assert_eq!(overrides.fit.phase_tolerance, Some(0.1));
        assert!(args.pdf && args.png);
        assert!(args.deadline().unwrap().is_some());
    }

    // Tests flags win over the parameter file while file values fill the rest
    // Verified by layering the file over the flags
    #[test]
    fn test_parameter_file_layering() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("params.json");
        std::fs::write(
            &file,
            r#"{"psf": {"wavelength_nm": 510.0}, "fit": {"max_iterations": 40, "seed": 3}}"#,
        )
        .unwrap();
        let cli = Cli::parse_from([
            "psf-retrieval".into(),
            "retrieve".into(),
            "bead.ome.tif".into(),
            "-p".into(),
            file.into_os_string(),
            "--seed".into(),
            "11".into(),
        ]);

        let overrides = retrieve_args(cli).parameters().unwrap();

        assert_eq!(overrides.psf.wavelength_nm, Some(510.0));
        assert_eq!(overrides.fit.max_iterations, Some(40));
        assert_eq!(overrides.fit.seed, Some(11));
    }

    // Tests a negative timeout is a parameter error
    // Verified by saturating negative durations to zero
    #[test]
    fn test_negative_timeout() {
        let cli = Cli::parse_from(["psf-retrieval", "retrieve", "a.tif", "--timeout=-1"]);

        let error = retrieve_args(cli).deadline().unwrap_err();

        assert_eq!(error.exit_code(), 4);
    }

    // Tests quiet wins over verbose
    // Verified by checking verbose first
    #[test]
    fn test_quiet_log_level() {
        let cli = Cli::parse_from(["psf-retrieval", "-q", "-v", "retrieve", "a.tif"]);

        assert_eq!(cli.log_level(), LevelFilter::Warn);
    }

    // Tests aberration specifications
    // Verified by accepting order 0
    #[test]
    fn test_parse_aberration() {
        assert_eq!(parse_aberration("6=0.1"), Ok((6, 0.1)));
        assert_eq!(parse_aberration(" 11 = -0.05 "), Ok((11, -0.05)));
        assert!(parse_aberration("6").is_err());
        assert!(parse_aberration("0=0.1").is_err());
        assert!(parse_aberration("x=0.1").is_err());
        assert!(parse_aberration("6=a").is_err());
    }

    // Tests simulate writes a stack that loads back with its metadata
    // Verified by omitting the OME description
    #[test]
    fn test_simulate_then_inspect() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("sim").join("bead.ome.tif");
        let simulate = Cli::parse_from([
            "psf-retrieval".into(),
            "simulate".into(),
            output.clone().into_os_string(),
            "--size".into(),
            "16".into(),
            "--slices".into(),
            "5".into(),
            "-a".into(),
            "6=0.1".into(),
        ]);

        run(&simulate).unwrap();

        let stack = load_stack(&output).unwrap();
        assert_eq!(stack.data().dim(), (5, 16, 16));
        assert_eq!(stack.metadata().wavelength_nm, Some(520.0));

        let inspect = Cli::parse_from([
            "psf-retrieval".into(),
            "inspect".into(),
            output.into_os_string(),
        ]);
        run(&inspect).unwrap();
        assert!(dir.path().join("sim").join("bead_psf_xy.png").is_file());
        assert!(dir.path().join("sim").join("bead_psf_xz.png").is_file());
    }

    // Tests out-of-range preview indices and missing files map to their exit codes
    // Verified by clamping the plane index
    #[test]
    fn test_inspect_errors() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("bead.ome.tif");
        run(&Cli::parse_from([
            "psf-retrieval".into(),
            "simulate".into(),
            output.clone().into_os_string(),
            "--size".into(),
            "8".into(),
            "--slices".into(),
            "3".into(),
        ]))
        .unwrap();

        let out_of_range = Cli::parse_from([
            "psf-retrieval".into(),
            "inspect".into(),
            output.into_os_string(),
            "-z".into(),
            "3".into(),
        ]);
        assert!(matches!(run(&out_of_range), Err(PsfError::Config { .. })));

        let missing = Cli::parse_from([
            "psf-retrieval".into(),
            "inspect".into(),
            dir.path().join("none.tif").into_os_string(),
        ]);
        assert_eq!(run(&missing).unwrap_err().exit_code(), 3);
    }
}
