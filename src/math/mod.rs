//! Numerical building blocks shared by the optics model and the retrieval routine

/// Two-dimensional FFT and quadrant shifts
pub mod fft;
/// Medians and error metrics
pub mod statistics;
