//! Tests for retrieval defaults and output conventions

#[cfg(test)]
mod tests {
    use psf_retrieval::io::configuration::{
        BACKGROUND_MULTIPLIER, DEFAULT_MAX_ITERATIONS, DEFAULT_MSE_TOLERANCE,
        DEFAULT_PHASE_TOLERANCE, DEFAULT_PUPIL_TOLERANCE, DEFAULT_ZERNIKE_COUNT, EXIT_CANCELLED,
        EXIT_CONFIG, EXIT_FIT, EXIT_LOAD, EXIT_WRITE, IMPORTANT_NOLL_ORDERS, MAX_ZERNIKE_COUNT,
        NAMED_ZERNIKE_COUNT, PADDING_FACTOR, PDF_SUFFIX, SPREADSHEET_SUFFIX,
    };

    // Tests fit defaults
    // Verified by changing the default iteration budget
    #[test]
    fn test_fit_defaults() {
        assert_eq!(DEFAULT_MAX_ITERATIONS, 100);
        assert_eq!(DEFAULT_ZERNIKE_COUNT, 120);
        assert!(DEFAULT_PUPIL_TOLERANCE > 0.0);
        assert!(DEFAULT_MSE_TOLERANCE > 0.0);
        assert!(DEFAULT_PHASE_TOLERANCE > 0.0);
    }

    // Tests the Zernike limit covers radial degree 20
    // Verified by lowering the limit below the default count
    #[test]
    fn test_zernike_limits() {
        assert_eq!(MAX_ZERNIKE_COUNT, 21 * 22 / 2);
        assert!(DEFAULT_ZERNIKE_COUNT <= MAX_ZERNIKE_COUNT);
        assert!(IMPORTANT_NOLL_ORDERS.iter().all(|&o| o <= NAMED_ZERNIKE_COUNT));
    }

    // Tests preparation constants
    // Verified by disabling padding
    #[test]
    fn test_preparation_constants() {
        assert_eq!(PADDING_FACTOR, 2);
        assert!((BACKGROUND_MULTIPLIER - 1.5).abs() < f64::EPSILON);
    }

    // Tests exit codes are distinct and non-zero
    // Verified by sharing the load and fit codes
    #[test]
    fn test_exit_codes_distinct() {
        let codes = [EXIT_CONFIG, EXIT_LOAD, EXIT_FIT, EXIT_WRITE, EXIT_CANCELLED];
        assert_eq!(codes, [2, 3, 4, 5, 6]);
    }

    // Tests report suffixes
    // Verified by changing the spreadsheet extension
    #[test]
    fn test_report_suffixes() {
        assert!(SPREADSHEET_SUFFIX.ends_with(".xlsx"));
        assert!(PDF_SUFFIX.ends_with(".pdf"));
    }
}
