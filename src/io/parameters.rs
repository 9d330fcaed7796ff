//! JSON parameter files layered between file metadata and command-line flags

use crate::io::error::{PsfError, Result};
use crate::retrieval::parameters::{FitOverrides, PsfOverrides};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Contents of a parameter file; every field may be omitted
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParameterFile {
    /// Optical parameters
    pub psf: PsfOverrides,
    /// Retrieval parameters
    pub fit: FitOverrides,
}

impl ParameterFile {
    /// Read and parse a parameter file
    ///
    /// # Errors
    ///
    /// Returns [`PsfError::Config`] when the file cannot be read or is not a
    /// valid parameter document
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| config_error(path, &e))?;
        let file = Self::parse(&text).map_err(|e| config_error(path, &e))?;
        log::debug!("loaded parameter file {}", path.display());
        Ok(file)
    }

    /// Parse a parameter document
    ///
    /// # Errors
    ///
    /// Returns the JSON error for malformed documents or unknown keys
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Returns the JSON error if serialisation fails
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Values in `flags` win over values in this file
    #[must_use]
    pub fn overridden_by(self, flags: Self) -> Self {
        Self {
            psf: flags.psf.layered_over(self.psf),
            fit: flags.fit.layered_over(self.fit),
        }
    }
}

fn config_error(path: &Path, reason: &impl ToString) -> PsfError {
    PsfError::Config {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
