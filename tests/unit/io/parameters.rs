//! Tests for JSON parameter files

#[cfg(test)]
mod tests {
    use psf_retrieval::PsfError;
    use psf_retrieval::io::parameters::ParameterFile;
    use psf_retrieval::retrieval::parameters::{FitOverrides, PsfOverrides};

    // Tests omitted sections and keys stay unset
    // Verified by requiring both sections
    #[test]
    fn test_parse_partial() {
        let file = ParameterFile::parse(r#"{"fit": {"zernike_count": 36}}"#).unwrap();

        assert_eq!(file.fit.zernike_count, Some(36));
        assert_eq!(file.psf, PsfOverrides::default());
        assert_eq!(ParameterFile::parse("{}").unwrap(), ParameterFile::default());
    }

    // Tests unknown keys are rejected at both levels
    // Verified by removing deny_unknown_fields from the outer struct
    #[test]
    fn test_parse_unknown_keys() {
        assert!(ParameterFile::parse(r#"{"optics": {}}"#).is_err());
        assert!(ParameterFile::parse(r#"{"psf": {"lambda": 500}}"#).is_err());
    }

    // Tests serialised files parse back unchanged
    // Verified by skipping None fields without serde default
    #[test]
    fn test_json_round_trip() {
        let file = ParameterFile {
            psf: PsfOverrides {
                numerical_aperture: Some(1.4),
                ..PsfOverrides::default()
            },
            fit: FitOverrides {
                seed: Some(5),
                ..FitOverrides::default()
            },
        };

        let json = file.to_json().unwrap();

        assert_eq!(ParameterFile::parse(&json).unwrap(), file);
    }

    // Tests flags take precedence over file values
    // Verified by layering in the opposite order
    #[test]
    fn test_overridden_by() {
        let file = ParameterFile::parse(
            r#"{"psf": {"wavelength_nm": 500}, "fit": {"seed": 1, "max_iterations": 30}}"#,
        )
        .unwrap();
        let flags = ParameterFile {
            fit: FitOverrides {
                seed: Some(2),
                ..FitOverrides::default()
            },
            ..ParameterFile::default()
        };

        let merged = file.overridden_by(flags);

        assert_eq!(merged.psf.wavelength_nm, Some(500.0));
        assert_eq!(merged.fit.seed, Some(2));
        assert_eq!(merged.fit.max_iterations, Some(30));
    }

    // Tests unreadable and malformed files are configuration errors
    // Verified by mapping read failures to load errors
    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let malformed = dir.path().join("bad.json");
        std::fs::write(&malformed, "{ not json").unwrap();

        assert!(matches!(ParameterFile::load(&missing), Err(PsfError::Config { .. })));
        let error = ParameterFile::load(&malformed).unwrap_err();
        assert_eq!(error.exit_code(), 2);

        let good = dir.path().join("good.json");
        std::fs::write(&good, r#"{"fit": {"max_iterations": 7}}"#).unwrap();
        assert_eq!(ParameterFile::load(&good).unwrap().fit.max_iterations, Some(7));
    }
}
