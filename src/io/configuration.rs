//! Retrieval defaults, acquisition conventions and output naming

// Fit parameter defaults
/// Default maximum number of retrieval iterations
pub const DEFAULT_MAX_ITERATIONS: usize = 100;
/// Relative pupil change below which the retrieval is considered converged
pub const DEFAULT_PUPIL_TOLERANCE: f64 = 1e-8;
/// Relative MSE change below which the retrieval is considered converged
pub const DEFAULT_MSE_TOLERANCE: f64 = 1e-6;
/// Zernike coefficient magnitude (in waves) tolerated before a term is flagged
pub const DEFAULT_PHASE_TOLERANCE: f64 = 0.5;
/// Number of Noll-ordered Zernike polynomials fitted to the pupil
pub const DEFAULT_ZERNIKE_COUNT: usize = 120;
/// Fixed seed for reproducible initial pupil noise
pub const DEFAULT_SEED: u64 = 42;
/// Amplitude in radians of the random initial pupil phase (zero keeps a flat start)
pub const DEFAULT_INITIAL_PHASE_NOISE: f64 = 0.0;

// Fitting up to radial degree 20
/// Largest Zernike count accepted by the decomposition
pub const MAX_ZERNIKE_COUNT: usize = 231;

// Data preparation
/// Multiplier applied to the estimated background before subtraction
pub const BACKGROUND_MULTIPLIER: f64 = 1.5;
/// Lateral zero-padding factor applied before retrieval
pub const PADDING_FACTOR: usize = 2;

// Zernike presentation
/// Number of Zernike terms carrying a conventional name
pub const NAMED_ZERNIKE_COUNT: usize = 15;
/// Noll orders emphasised in reports (astigmatism, coma, spherical)
pub const IMPORTANT_NOLL_ORDERS: [usize; 5] = [5, 6, 7, 8, 11];

// Refractive indices assumed from the objective immersion medium
/// Refractive index of immersion oil
pub const OIL_REFRACTIVE_INDEX: f64 = 1.518;
/// Refractive index of glycerol
pub const GLYCEROL_REFRACTIVE_INDEX: f64 = 1.472;
/// Refractive index of water
pub const WATER_REFRACTIVE_INDEX: f64 = 1.333;
/// Refractive index of air
pub const AIR_REFRACTIVE_INDEX: f64 = 1.0;

// Progress display
/// Width of the iteration progress bar in characters
pub const PROGRESS_BAR_WIDTH: u16 = 40;
/// Interval between polls of the worker channel
pub const POLL_INTERVAL_MS: u64 = 250;

// Output settings
/// Suffix of the Zernike spreadsheet
pub const SPREADSHEET_SUFFIX: &str = "_zd_results.xlsx";
/// Suffix of the PDF report
pub const PDF_SUFFIX: &str = "_report.pdf";
/// Suffix of the pupil magnitude and phase image
pub const PUPIL_IMAGE_SUFFIX: &str = "_pr_results.png";
/// Suffix of the Zernike bar chart
pub const ZERNIKE_IMAGE_SUFFIX: &str = "_zd_results.png";
/// Suffix of the convergence plot
pub const CONVERGENCE_IMAGE_SUFFIX: &str = "_convergence.png";
/// Suffix of the lateral PSF preview
pub const XY_PREVIEW_SUFFIX: &str = "_psf_xy.png";
/// Suffix of the axial PSF preview
pub const XZ_PREVIEW_SUFFIX: &str = "_psf_xz.png";
/// Edge length in pixels of rendered previews
pub const PREVIEW_SIZE: u32 = 256;

// Process exit codes
/// Usage or configuration problem
pub const EXIT_CONFIG: u8 = 2;
/// Input file could not be loaded
pub const EXIT_LOAD: u8 = 3;
/// Retrieval rejected its parameters or diverged
pub const EXIT_FIT: u8 = 4;
/// A report could not be written
pub const EXIT_WRITE: u8 = 5;
/// The run was cancelled before completion
pub const EXIT_CANCELLED: u8 = 6;
