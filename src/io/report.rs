//! Assembles the artefacts describing one completed retrieval and writes them

use crate::io::configuration::PREVIEW_SIZE;
use crate::io::error::WriteError;
use crate::io::image::{pupil_panel, save_png};
use crate::io::output::{OutputPaths, ensure_directory, write_atomic};
use crate::io::plots::{convergence_plot, zernike_chart};
use crate::io::{pdf, workbook};
use crate::optics::stack::PsfStack;
use crate::optics::zernike::{ZernikeCoefficient, ZernikeFit};
use crate::retrieval::result::RetrievalResult;
use std::path::PathBuf;

/// Which artefacts to produce
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReportOptions {
    /// Zernike spreadsheet
    pub spreadsheet: bool,
    /// PDF summary
    pub pdf: bool,
    /// PNG images of the pupil, the Zernike chart and the convergence trace
    pub images: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            spreadsheet: true,
            pdf: false,
            images: false,
        }
    }
}

/// Everything a report shows about a completed run
///
/// Only constructible from a [`RetrievalResult`], which exists for completed
/// runs alone.
#[derive(Clone, Debug)]
pub struct Report<'a> {
    stack: &'a PsfStack,
    result: &'a RetrievalResult,
    zernike: &'a ZernikeFit,
    coefficients: Vec<ZernikeCoefficient>,
    source_label: String,
    generated_at: String,
}

impl<'a> Report<'a> {
    /// Report on `result`, retrieved from `stack` and decomposed into `zernike`
    pub fn new(stack: &'a PsfStack, result: &'a RetrievalResult, zernike: &'a ZernikeFit) -> Self {
        let source_label = stack
            .source()
            .map_or_else(|| "<in-memory stack>".to_string(), |p| p.display().to_string());
        Self {
            stack,
            result,
            zernike,
            coefficients: zernike.named(result.fit_parameters().phase_tolerance),
            source_label,
            generated_at: chrono::Local::now()
                .format("%d.%m.%Y - %H:%M:%S")
                .to_string(),
        }
    }

    /// Replace the generation timestamp
    #[must_use]
    pub fn with_timestamp(mut self, generated_at: &str) -> Self {
        self.generated_at = generated_at.to_string();
        self
    }

    /// Measured stack
    pub const fn stack(&self) -> &PsfStack {
        self.stack
    }

    /// Retrieval result
    pub const fn result(&self) -> &RetrievalResult {
        self.result
    }

    /// Full Zernike decomposition
    pub const fn zernike(&self) -> &ZernikeFit {
        self.zernike
    }

    /// Named coefficients with tolerance flags
    pub fn coefficients(&self) -> &[ZernikeCoefficient] {
        &self.coefficients
    }

    /// Path of the PSF file as displayed
    pub fn source_label(&self) -> &str {
        &self.source_label
    }

    /// Generation timestamp as displayed
    pub fn generated_at(&self) -> &str {
        &self.generated_at
    }

    /// Produce the selected artefacts under `paths`, returning what was written
    ///
    /// Each file appears completely or not at all.
    ///
    /// # Errors
    ///
    /// Returns the first [`WriteError`]; artefacts written before it remain
    pub fn write(
        &self,
        paths: &OutputPaths,
        options: &ReportOptions,
    ) -> Result<Vec<PathBuf>, WriteError> {
        ensure_directory(paths.directory())?;
        let mut written = Vec::new();

        if options.spreadsheet {
            let path = paths.spreadsheet();
            let bytes = workbook::workbook_bytes(self, &path)?;
            write_atomic(&path, &bytes)?;
            written.push(path);
        }

        if options.pdf {
            let path = paths.pdf();
            let bytes = pdf::pdf_bytes(self, &path)?;
            write_atomic(&path, &bytes)?;
            written.push(path);
        }

        if options.images {
            let path = paths.pupil_image();
            save_png(&pupil_panel(self.result), &path)?;
            written.push(path);

            let path = paths.zernike_image();
            let chart = zernike_chart(
                &self.coefficients,
                self.result.fit_parameters().phase_tolerance,
                (2 * PREVIEW_SIZE, 2 * PREVIEW_SIZE),
                &path,
            )?;
            save_png(&chart, &path)?;
            written.push(path);

            let path = paths.convergence_image();
            let plot = convergence_plot(
                self.result.trace(),
                self.result.fit_parameters().max_iterations,
                (4 * PREVIEW_SIZE, PREVIEW_SIZE),
                &path,
            )?;
            save_png(&plot, &path)?;
            written.push(path);
        }

        for path in &written {
            log::info!("wrote {}", path.display());
        }
        Ok(written)
    }
}
