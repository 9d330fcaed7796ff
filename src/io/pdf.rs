//! One-page PDF summary of a retrieval
//!
//! Layout coordinates are given in points from the bottom-left corner of an
//! A4 page and converted to millimetres on use.

use crate::io::configuration::PREVIEW_SIZE;
use crate::io::error::{WriteError, encode_error};
use crate::io::image::{psf_xy_preview, psf_xz_preview, pupil_panel};
use crate::io::plots::{convergence_plot, zernike_chart};
use crate::io::report::Report;
use crate::retrieval::parameters::ParameterEntry;
use image::RgbImage;
use printpdf::image_crate::{DynamicImage, RgbImage as PdfRgbImage};
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument,
    PdfLayerReference, Rgb,
};
use std::path::Path;

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const IMAGE_DPI: f32 = 300.0;

const WITHIN: (f32, f32, f32) = (0.22, 0.67, 0.15);
const OUTSIDE: (f32, f32, f32) = (0.9, 0.07, 0.07);
const BLACK: (f32, f32, f32) = (0.0, 0.0, 0.0);

const fn pt(value: f32) -> Mm {
    Mm(value * 25.4 / 72.0)
}

// Helvetica averages about half an em per glyph
fn approximate_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.5
}

struct Page<'a> {
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    target: &'a Path,
}

impl Page<'_> {
    fn text(&self, text: &str, size: f32, x: f32, y: f32) {
        self.layer.use_text(text, size, pt(x), pt(y), &self.regular);
    }

    fn bold(&self, text: &str, size: f32, x: f32, y: f32) {
        self.layer.use_text(text, size, pt(x), pt(y), &self.bold);
    }

    fn right_aligned(&self, text: &str, size: f32, right: f32, y: f32) {
        let x = right - approximate_width(text, size);
        self.text(text, size, x, y);
    }

    fn fill(&self, (r, g, b): (f32, f32, f32)) {
        self.layer.set_fill_color(Color::Rgb(Rgb::new(r, g, b, None)));
    }

    fn parameter(&self, entry: &ParameterEntry, y: f32, decimals: usize) {
        self.text(entry.name, 10.0, 370.0, y);
        let value = if entry.value.abs() < 1e-3 && entry.value != 0.0 {
            format!("{:.1E}", entry.value)
        } else {
            format!("{:.decimals$}", entry.value)
        };
        self.right_aligned(&value, 10.0, 545.0, y);
        if !entry.unit.is_empty() {
            self.text(entry.unit, 10.0, 550.0, y);
        }
    }

    // Places `picture` with its lower-left corner at (x, y), scaled to width x height points
    fn image(&self, picture: &RgbImage, x: f32, y: f32, width: f32, height: f32) -> Result<(), WriteError> {
        let (px_w, px_h) = picture.dimensions();
        let raw = PdfRgbImage::from_raw(px_w, px_h, picture.as_raw().clone())
            .ok_or_else(|| encode_error(self.target, "PDF", &"image buffer size mismatch"))?;
        let native_w = px_w as f32 * 72.0 / IMAGE_DPI;
        let native_h = px_h as f32 * 72.0 / IMAGE_DPI;
        Image::from_dynamic_image(&DynamicImage::ImageRgb8(raw)).add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(pt(x)),
                translate_y: Some(pt(y)),
                scale_x: Some(width / native_w),
                scale_y: Some(height / native_h),
                dpi: Some(IMAGE_DPI),
                ..Default::default()
            },
        );
        Ok(())
    }
}

/// Encode the PDF report in memory
///
/// # Errors
///
/// Returns [`WriteError::Encode`] (reported against `target`) when a figure
/// cannot be rendered or the document cannot be serialised
pub fn pdf_bytes(report: &Report<'_>, target: &Path) -> Result<Vec<u8>, WriteError> {
    let result = report.result();
    let fit = result.fit_parameters();
    let (document, page, layer) = PdfDocument::new(
        "PSF phase retrieval report",
        Mm(PAGE_WIDTH_MM),
        Mm(PAGE_HEIGHT_MM),
        "Layer 1",
    );
    let regular = document
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| encode_error(target, "PDF", &e))?;
    let bold = document
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| encode_error(target, "PDF", &e))?;
    let page = Page {
        layer: document.get_page(page).get_layer(layer),
        regular,
        bold,
        target,
    };

    page.bold("PSF phase retrieval report", 16.0, 100.0, 790.0);
    page.text(&format!("PSF file: {}", report.source_label()), 9.0, 100.0, 760.0);

    page.bold("PSF previews", 12.0, 100.0, 730.0);
    if let Some(xy) = psf_xy_preview(report.stack(), None) {
        page.image(&xy, 100.0, 585.0, 120.0, 120.0)?;
    }
    if let Some(xz) = psf_xz_preview(report.stack(), None) {
        page.image(&xz, 230.0, 585.0, 120.0, 120.0)?;
    }

    page.bold("PSF & Fit parameters", 12.0, 370.0, 730.0);
    let psf_entries = result.psf_parameters().entries();
    for (entry, y) in psf_entries.iter().zip([710.0, 693.0, 676.0, 659.0, 642.0]) {
        page.parameter(entry, y, 2);
    }
    let fit_entries = fit.entries();
    for (entry, y) in fit_entries.iter().zip([617.0, 600.0, 583.0, 566.0]) {
        page.parameter(entry, y, if entry.unit.is_empty() { 0 } else { 2 });
    }

    page.bold("Phase retrieval results", 12.0, 100.0, 550.0);
    page.image(&pupil_panel(result), 100.0, 390.0, 360.0, 150.0)?;
    let trace = convergence_plot(
        result.trace(),
        fit.max_iterations,
        (4 * PREVIEW_SIZE, PREVIEW_SIZE),
        target,
    )?;
    page.image(&trace, 100.0, 325.0, 288.0, 72.0)?;
    page.text(&result.status_line(), 8.0, 395.0, 355.0);
    page.bold(result.stop_reason().description(), 8.0, 395.0, 340.0);

    page.bold("Zernike decomposition results", 12.0, 100.0, 310.0);
    let chart = zernike_chart(
        report.coefficients(),
        fit.phase_tolerance,
        (2 * PREVIEW_SIZE, 2 * PREVIEW_SIZE),
        target,
    )?;
    page.image(&chart, 100.0, 60.0, 240.0, 240.0)?;

    page.bold("Noll order and name", 10.0, 350.0, 285.0);
    page.bold("Value (waves)", 10.0, 520.0, 285.0);
    let mut y = 265.0;
    for coefficient in report.coefficients() {
        let label = format!("{:>2}  {}", coefficient.order, coefficient.name);
        if coefficient.important {
            page.bold(&label, 9.0, 350.0, y);
        } else {
            page.text(&label, 9.0, 350.0, y);
        }
        page.fill(if coefficient.within_tolerance { WITHIN } else { OUTSIDE });
        page.right_aligned(&format!("{:.2}", coefficient.value), 9.0, 560.0, y);
        page.fill(BLACK);
        y -= 17.0;
    }

    page.text(
        &format!("Report generated on: {}", report.generated_at()),
        8.0,
        100.0,
        10.0,
    );

    document
        .save_to_bytes()
        .map_err(|e| encode_error(target, "PDF", &e))
}
