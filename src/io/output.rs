//! Output file naming and all-or-nothing writes

use crate::io::configuration::{
    CONVERGENCE_IMAGE_SUFFIX, PDF_SUFFIX, PUPIL_IMAGE_SUFFIX, SPREADSHEET_SUFFIX,
    XY_PREVIEW_SUFFIX, XZ_PREVIEW_SUFFIX, ZERNIKE_IMAGE_SUFFIX,
};
use crate::io::error::{IoContext, WriteError};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write `bytes` to `path` so that either the complete file or nothing appears
///
/// The bytes go to a temporary file in the destination directory which is then
/// renamed over `path`. The temporary file is removed on every failure path.
///
/// # Errors
///
/// Returns [`WriteError::FileSystem`] when the directory is missing or not
/// writable, or the rename fails
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), WriteError> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !directory.is_dir() {
        return Err(WriteError::FileSystem {
            path: path.to_path_buf(),
            operation: "locate output directory",
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("'{}' is not a directory", directory.display()),
            ),
        });
    }

    let mut staging = tempfile::NamedTempFile::new_in(directory)
        .write_context(path, "create temporary file")?;
    staging.write_all(bytes).write_context(path, "write")?;
    staging.as_file().sync_all().write_context(path, "sync")?;
    staging
        .persist(path)
        .map_err(|e| e.error)
        .write_context(path, "persist")?;
    Ok(())
}

/// Ensure an output directory exists
///
/// # Errors
///
/// Returns [`WriteError::FileSystem`] when the directory cannot be created,
/// for instance because a path component is a regular file
pub fn ensure_directory(directory: &Path) -> Result<(), WriteError> {
    std::fs::create_dir_all(directory).write_context(directory, "create output directory")
}

/// Paths of every artefact derived from one PSF file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputPaths {
    directory: PathBuf,
    stem: String,
}

impl OutputPaths {
    /// Artefacts named `<stem><suffix>` inside `directory`
    pub fn new(directory: &Path, stem: &str) -> Self {
        Self {
            directory: directory.to_path_buf(),
            stem: stem.to_string(),
        }
    }

    /// Artefacts next to the PSF file or in `directory` when given
    ///
    /// Double extensions such as `.ome.tif` are removed from the stem.
    pub fn for_input(input: &Path, directory: Option<&Path>) -> Self {
        let stem = input
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let stem = [".ome.tiff", ".ome.tif", ".tiff", ".tif"]
            .iter()
            .find_map(|ext| {
                stem.to_ascii_lowercase()
                    .ends_with(ext)
                    .then(|| stem.get(..stem.len() - ext.len()).unwrap_or(&stem).to_string())
            })
            .unwrap_or_else(|| {
                input
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default()
            });
        let directory = directory.map_or_else(
            || {
                input
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default()
            },
            Path::to_path_buf,
        );
        Self { directory, stem }
    }

    /// Directory holding the artefacts
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Common file name prefix
    pub fn stem(&self) -> &str {
        &self.stem
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        self.directory.join(format!("{}{suffix}", self.stem))
    }

    /// Zernike spreadsheet
    pub fn spreadsheet(&self) -> PathBuf {
        self.with_suffix(SPREADSHEET_SUFFIX)
    }

    /// PDF report
    pub fn pdf(&self) -> PathBuf {
        self.with_suffix(PDF_SUFFIX)
    }

    /// Pupil magnitude and phase image
    pub fn pupil_image(&self) -> PathBuf {
        self.with_suffix(PUPIL_IMAGE_SUFFIX)
    }

    /// Zernike bar chart
    pub fn zernike_image(&self) -> PathBuf {
        self.with_suffix(ZERNIKE_IMAGE_SUFFIX)
    }

    /// Convergence plot
    pub fn convergence_image(&self) -> PathBuf {
        self.with_suffix(CONVERGENCE_IMAGE_SUFFIX)
    }

    /// Lateral PSF preview
    pub fn xy_preview(&self) -> PathBuf {
        self.with_suffix(XY_PREVIEW_SUFFIX)
    }

    /// Axial PSF preview
    pub fn xz_preview(&self) -> PathBuf {
        self.with_suffix(XZ_PREVIEW_SUFFIX)
    }
}
