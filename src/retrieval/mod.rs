//! Phase retrieval: parameters, the routine contract, the bundled routine and its driver

/// Worker thread, progress channel and cancellation
pub mod driver;
/// Routine contract and progress events
pub mod engine;
/// Gerchberg–Saxton routine over a defocus series
pub mod hanser;
/// Optical and fitting parameters
pub mod parameters;
/// Retrieved pupil and run history
pub mod result;
