//! Optical model of the microscope: PSF stacks, pupil sampling and aberrations

/// Background removal, centring and padding of measured stacks
pub mod prep;
/// Pupil-plane grid and the scalar defocus model
pub mod pupil;
/// PSF stack container and acquisition metadata
pub mod stack;
/// Simulated acquisitions with known aberrations
pub mod synthetic;
/// Zernike polynomials and pupil decomposition
pub mod zernike;
