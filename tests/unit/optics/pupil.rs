//! Tests for pupil sampling and the defocus propagation model

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use num_complex::Complex64;
    use psf_retrieval::optics::pupil::{HanserModel, PupilGrid, axial_positions};
    use psf_retrieval::retrieval::parameters::PsfParameters;

    fn params() -> PsfParameters {
        PsfParameters {
            wavelength_nm: 500.0,
            numerical_aperture: 1.0,
            refractive_index: 1.33,
            pixel_size_xy_nm: 100.0,
            pixel_size_z_nm: 200.0,
        }
    }

    // Tests the aperture radius follows NA / wavelength on the frequency grid
    // Verified by scaling the cutoff with the refractive index
    #[test]
    fn test_grid_aperture() {
        let grid = PupilGrid::new(&params(), 32);

        assert_eq!(grid.size(), 32);
        assert_relative_eq!(grid.cutoff(), 0.002);
        assert!(grid.aperture()[(0, 0)]);
        assert!(!grid.aperture()[(16, 16)]);
        assert_relative_eq!(grid.radius()[(0, 0)], 0.0);
        // Radius 6.4 samples: roughly pi * 6.4^2 samples inside
        assert!((100..=160).contains(&grid.aperture_len()), "{}", grid.aperture_len());
    }

    // Tests the in-focus kernel is the plain aperture and aberrated pupils keep unit magnitude
    // Verified by leaving the kernel unmasked outside the aperture
    #[test]
    fn test_kernels_and_pupils() {
        let grid = PupilGrid::new(&params(), 16);

        assert_eq!(grid.defocus_kernel(0.0), grid.aperture_pupil());
        assert_eq!(grid.aberrated_pupil(&[]), grid.aperture_pupil());

        let aberrated = grid.aberrated_pupil(&[(6, 0.2)]);
        for (value, &inside) in aberrated.iter().zip(grid.aperture()) {
            if inside {
                assert_relative_eq!(value.norm(), 1.0, epsilon = 1e-12);
            } else {
                assert_eq!(*value, Complex64::default());
            }
        }
    }

    // Tests axial offsets are centred on the focus index
    // Verified by measuring offsets from plane 0
    #[test]
    fn test_axial_positions() {
        assert_eq!(
            axial_positions(5, 100.0, 2),
            vec![-200.0, -100.0, 0.0, 100.0, 200.0]
        );
    }

    // Tests an unaberrated pupil focuses at the centre and defocus is symmetric
    // Verified by omitting the fftshift of each plane
    #[test]
    fn test_intensity_of_ideal_pupil() {
        let positions = axial_positions(3, 300.0, 1);
        let model = HanserModel::new(&params(), 32, &positions);
        let intensity = model.intensity(&model.grid().aperture_pupil());

        assert_eq!(model.planes(), 3);
        let focus = intensity.index_axis(ndarray::Axis(0), 1);
        let peak = focus.fold(0.0_f64, |acc, &v| acc.max(v));
        assert_relative_eq!(focus[(16, 16)], peak);

        for (above, below) in intensity
            .index_axis(ndarray::Axis(0), 0)
            .iter()
            .zip(intensity.index_axis(ndarray::Axis(0), 2))
        {
            assert_relative_eq!(*above, *below, epsilon = 1e-12, max_relative = 1e-9);
        }
    }

    // Tests back propagation inverts forward propagation inside the aperture
    // Verified by dropping the conjugate kernel
    #[test]
    fn test_back_propagation_inverts_model() {
        let positions = axial_positions(4, 250.0, 2);
        let model = HanserModel::new(&params(), 16, &positions);
        let pupil = model.grid().aberrated_pupil(&[(5, 0.1), (11, -0.05)]);

        let recovered = model.back_propagate(&model.amplitude(&pupil));

        for (a, b) in recovered.iter().zip(&pupil) {
            assert_relative_eq!(a.re, b.re, epsilon = 1e-10);
            assert_relative_eq!(a.im, b.im, epsilon = 1e-10);
        }
    }
}
