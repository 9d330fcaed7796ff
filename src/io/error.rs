//! Error kinds for loading, fitting and reporting, with their process exit codes

use crate::io::configuration::{EXIT_CANCELLED, EXIT_CONFIG, EXIT_FIT, EXIT_LOAD, EXIT_WRITE};
use std::path::{Path, PathBuf};

/// Failure to turn a file into a PSF stack
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// File could not be opened or read
    #[error("Failed to read PSF file '{}': {source}", .path.display())]
    Io {
        /// Path to the PSF file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// File is not a container the loader understands
    #[error("Unsupported file format for '{}': {reason}", .path.display())]
    UnsupportedFormat {
        /// Path to the PSF file
        path: PathBuf,
        /// Why the format was rejected
        reason: String,
    },

    /// Required acquisition metadata is absent
    #[error("Missing metadata '{field}' in '{}'", .path.display())]
    MissingMetadata {
        /// Path to the PSF file
        path: PathBuf,
        /// Name of the absent field
        field: &'static str,
    },

    /// Acquisition metadata is present but unusable
    #[error("Invalid metadata in '{}': {reason}", .path.display())]
    InvalidMetadata {
        /// Path to the PSF file
        path: PathBuf,
        /// Description of the inconsistency
        reason: String,
    },

    /// Pixel data could not be decoded
    #[error("Failed to decode pixel data of '{}': {source}", .path.display())]
    Decode {
        /// Path to the PSF file
        path: PathBuf,
        /// Underlying TIFF error
        #[source]
        source: tiff::TiffError,
    },

    /// File holds fewer planes than its metadata announces
    #[error("PSF file '{}' is truncated: expected {expected} planes, found {found}", .path.display())]
    Truncated {
        /// Path to the PSF file
        path: PathBuf,
        /// Planes announced by the metadata
        expected: usize,
        /// Planes actually decoded
        found: usize,
    },

    /// In-memory stack does not have the required shape
    #[error("Invalid PSF stack shape {shape:?}: {reason}")]
    InvalidShape {
        /// Observed (z, y, x) shape
        shape: (usize, usize, usize),
        /// What is wrong with it
        reason: String,
    },
}

/// Failure reported by the retrieval driver or routine
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FitError {
    /// Parameter validation failed
    #[error("Invalid parameter '{parameter}' = '{value}': {reason}")]
    InvalidParameter {
        /// Name of the invalid parameter
        parameter: &'static str,
        /// Provided value that failed validation
        value: String,
        /// Explanation of why the value is invalid
        reason: String,
    },

    /// Routine signalled divergence
    #[error("Phase retrieval diverged at iteration {iteration}: {reason}")]
    Diverged {
        /// Iteration at which divergence was detected
        iteration: usize,
        /// Description of the divergence
        reason: String,
    },

    /// Numerical computation produced an unusable result
    #[error("Computation error in {operation}: {reason}")]
    Computation {
        /// Name of the computation that failed
        operation: &'static str,
        /// Description of the failure
        reason: String,
    },

    /// Worker thread ended without delivering an outcome
    #[error("Retrieval worker terminated unexpectedly")]
    WorkerPanicked,

    /// Outcome was requested before the worker delivered it
    #[error("Retrieval run has not finished yet")]
    RunPending,
}

/// Failure to persist a report artefact
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// File system operation failed
    #[error("File system error during {operation} on '{}': {source}", .path.display())]
    FileSystem {
        /// Path involved in the operation
        path: PathBuf,
        /// Description of the operation that failed
        operation: &'static str,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Artefact could not be encoded in memory
    #[error("Failed to encode {format} for '{}': {reason}", .path.display())]
    Encode {
        /// Destination of the artefact
        path: PathBuf,
        /// Format being produced
        format: &'static str,
        /// Description of the encoder failure
        reason: String,
    },
}

/// Umbrella error for session and command-line operations
#[derive(Debug, thiserror::Error)]
pub enum PsfError {
    /// Loading the PSF stack failed
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Phase retrieval failed
    #[error(transparent)]
    Fit(#[from] FitError),

    /// Writing a report failed
    #[error(transparent)]
    Write(#[from] WriteError),

    /// Run was cancelled before it completed
    #[error("Phase retrieval cancelled after {completed_iterations} iterations")]
    Cancelled {
        /// Iterations finished before cancellation took effect
        completed_iterations: usize,
    },

    /// Parameter file could not be used
    #[error("Invalid configuration '{}': {reason}", .path.display())]
    Config {
        /// Path to the parameter file
        path: PathBuf,
        /// Description of the problem
        reason: String,
    },

    /// Operation is not allowed in the current session state
    #[error("Cannot {operation} while the session is {state}")]
    InvalidState {
        /// Attempted operation
        operation: &'static str,
        /// Current state name
        state: &'static str,
    },
}

impl PsfError {
    /// Process exit code distinguishing the error kind
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Load(_) => EXIT_LOAD,
            Self::Fit(_) => EXIT_FIT,
            Self::Write(_) => EXIT_WRITE,
            Self::Cancelled { .. } => EXIT_CANCELLED,
            Self::Config { .. } | Self::InvalidState { .. } => EXIT_CONFIG,
        }
    }
}

/// Convenience type alias for session results
pub type Result<T> = std::result::Result<T, PsfError>;

/// Attaches the path and operation to bare I/O failures
pub trait IoContext<T> {
    /// Convert into a [`WriteError::FileSystem`]
    ///
    /// # Errors
    ///
    /// Propagates the original error with its path and operation attached
    fn write_context(self, path: &Path, operation: &'static str) -> std::result::Result<T, WriteError>;

    /// Convert into a [`LoadError::Io`]
    ///
    /// # Errors
    ///
    /// Propagates the original error with its path attached
    fn load_context(self, path: &Path) -> std::result::Result<T, LoadError>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn write_context(self, path: &Path, operation: &'static str) -> std::result::Result<T, WriteError> {
        self.map_err(|source| WriteError::FileSystem {
            path: path.to_path_buf(),
            operation,
            source,
        })
    }

    fn load_context(self, path: &Path) -> std::result::Result<T, LoadError> {
        self.map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Create an invalid parameter error
pub fn invalid_parameter(
    parameter: &'static str,
    value: &impl ToString,
    reason: &impl ToString,
) -> FitError {
    FitError::InvalidParameter {
        parameter,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Create a computation error
pub fn computation_error(operation: &'static str, reason: &impl ToString) -> FitError {
    FitError::Computation {
        operation,
        reason: reason.to_string(),
    }
}

/// Create an encoding error
pub fn encode_error(path: &Path, format: &'static str, reason: &impl ToString) -> WriteError {
    WriteError::Encode {
        path: path.to_path_buf(),
        format,
        reason: reason.to_string(),
    }
}
