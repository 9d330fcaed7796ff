//! Tests for the PSF stack container

#[cfg(test)]
mod tests {
    use ndarray::Array3;
    use psf_retrieval::LoadError;
    use psf_retrieval::optics::stack::{AcquisitionMetadata, PsfStack};
    use std::path::Path;

    fn metadata() -> AcquisitionMetadata {
        AcquisitionMetadata {
            pixel_size_xy_nm: 100.0,
            pixel_size_z_nm: 250.0,
            numerical_aperture: 1.2,
            refractive_index: Some(1.333),
            wavelength_nm: Some(520.0),
        }
    }

    // Tests shape accessors, slices and brightest voxel lookup
    // Verified by indexing the xz slice along x instead of y
    #[test]
    fn test_accessors_and_slices() {
        let mut data = Array3::zeros((3, 4, 4));
        data[(2, 1, 3)] = 9.0;
        data[(0, 0, 0)] = 5.0;

        let stack = PsfStack::new(data, metadata()).unwrap();

        assert_eq!(stack.size_z(), 3);
        assert_eq!(stack.size_xy(), 4);
        assert_eq!(stack.brightest_voxel(), (2, 1, 3));
        assert_eq!(stack.focal_plane(), 2);
        assert_eq!(stack.xy_slice(2).unwrap()[(1, 3)], 9.0);
        assert_eq!(stack.xz_slice(1).unwrap()[(2, 3)], 9.0);
        assert!(stack.xy_slice(3).is_none());
        assert!(stack.xz_slice(4).is_none());
        assert!((stack.voxel_aspect() - 2.5).abs() < f64::EPSILON);
    }

    // Tests rejection of empty, non-square and non-finite stacks
    // Verified by accepting rectangular planes
    #[test]
    fn test_invalid_shapes_rejected() {
        let empty = PsfStack::new(Array3::zeros((0, 4, 4)), metadata());
        assert!(matches!(empty, Err(LoadError::InvalidShape { .. })));

        let rectangular = PsfStack::new(Array3::zeros((2, 4, 5)), metadata());
        assert!(matches!(rectangular, Err(LoadError::InvalidShape { .. })));

        let mut data = Array3::zeros((1, 2, 2));
        data[(0, 1, 1)] = f64::NAN;
        assert!(matches!(
            PsfStack::new(data, metadata()),
            Err(LoadError::InvalidShape { .. })
        ));
    }

    // Tests the source path is recorded
    // Verified by dropping the path in with_source
    #[test]
    fn test_source_path() {
        let stack = PsfStack::new(Array3::ones((1, 2, 2)), metadata()).unwrap();
        assert!(stack.source().is_none());

        let stack = stack.with_source(Path::new("/data/bead.ome.tif"));
        assert_eq!(stack.source(), Some(Path::new("/data/bead.ome.tif")));
        assert_eq!(stack.metadata(), &metadata());
    }
}
