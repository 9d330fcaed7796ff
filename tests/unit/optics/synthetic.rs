//! Tests for synthetic PSF rendering

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use psf_retrieval::FitError;
    use psf_retrieval::optics::synthetic::SyntheticPsf;
    use psf_retrieval::retrieval::parameters::PsfParameters;

    fn params() -> PsfParameters {
        PsfParameters {
            wavelength_nm: 520.0,
            numerical_aperture: 1.2,
            refractive_index: 1.333,
            pixel_size_xy_nm: 100.0,
            pixel_size_z_nm: 250.0,
        }
    }

    // Tests an unaberrated stack peaks at its centre with the requested levels
    // Verified by rendering the focus at plane 0
    #[test]
    fn test_render_levels_and_focus() {
        let synthetic = SyntheticPsf::new(params(), 16, 7).with_levels(500.0, 20.0);

        let stack = synthetic.render().unwrap();

        assert_eq!(stack.data().dim(), (7, 16, 16));
        assert_eq!(stack.brightest_voxel(), (3, 8, 8));
        let max = stack.data().fold(f64::MIN, |acc, &v| acc.max(v));
        let min = stack.data().fold(f64::MAX, |acc, &v| acc.min(v));
        assert_relative_eq!(max, 520.0, epsilon = 1e-9);
        assert!(min >= 20.0 - 1e-9);
        assert_eq!(stack.metadata().wavelength_nm, Some(520.0));
        assert_eq!(stack.metadata().refractive_index, Some(1.333));
    }

    // Tests aberrations lower the peak relative to the ideal focus
    // Verified by ignoring the aberration list
    #[test]
    fn test_aberration_spreads_focus() {
        let ideal = SyntheticPsf::new(params(), 16, 5).with_levels(1.0, 0.0);
        let aberrated = ideal.clone().with_aberration(11, 0.2);

        let ideal_stack = ideal.render().unwrap();
        let aberrated_stack = aberrated.render().unwrap();

        assert_eq!(aberrated.aberrations, vec![(11, 0.2)]);
        assert_ne!(ideal_stack.data(), aberrated_stack.data());
    }

    // Tests invalid geometry and aberrations are rejected
    // Verified by accepting Noll order 0
    #[test]
    fn test_render_rejects_invalid_input() {
        assert!(matches!(
            SyntheticPsf::new(params(), 1, 5).render(),
            Err(FitError::InvalidParameter { parameter: "size", .. })
        ));
        assert!(matches!(
            SyntheticPsf::new(params(), 8, 0).render(),
            Err(FitError::InvalidParameter { parameter: "planes", .. })
        ));
        assert!(matches!(
            SyntheticPsf::new(params(), 8, 3).with_aberration(0, 0.1).render(),
            Err(FitError::InvalidParameter { parameter: "aberration", .. })
        ));
        assert!(matches!(
            SyntheticPsf::new(params(), 8, 3).with_levels(-1.0, 0.0).render(),
            Err(FitError::InvalidParameter { parameter: "peak", .. })
        ));
    }
}
