//! File formats, reports, configuration and the command-line surface

/// Command-line interface
pub mod cli;
/// Compile-time defaults and naming conventions
pub mod configuration;
/// Error types and exit codes
pub mod error;
/// False-colour rendering and PNG export
pub mod image;
/// OME-XML metadata model
pub mod ome;
/// OME-TIFF stack decoding and encoding
pub mod ome_tiff;
/// Atomic writes and output naming
pub mod output;
/// JSON parameter files
pub mod parameters;
/// PDF report
pub mod pdf;
/// Convergence and Zernike charts
pub mod plots;
/// Terminal progress display
pub mod progress;
/// Report assembly
pub mod report;
/// Spreadsheet report
pub mod workbook;
