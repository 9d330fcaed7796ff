//! Phase retrieval front end for measured microscopy point spread functions
//!
//! Loads OME-TIFF PSF stacks, recovers the pupil function with an iterative
//! Gerchberg–Saxton routine over the defocus series, decomposes the pupil phase
//! into Zernike polynomials and writes spreadsheet, PDF and PNG reports.

#![deny(unsafe_code)]

/// File formats, reports, configuration and the command line
pub mod io;
/// FFT and statistics helpers
pub mod math;
/// PSF stacks, pupil model, Zernike polynomials and synthetic data
pub mod optics;
/// Retrieval parameters, routine contract, bundled routine and worker driver
pub mod retrieval;
/// Session state machine driven by front ends
pub mod session;

pub use io::error::{FitError, LoadError, PsfError, Result, WriteError};
