//! False-colour rendering of PSF sections and pupil maps, and PNG export

use crate::io::configuration::PREVIEW_SIZE;
use crate::io::error::{WriteError, encode_error};
use crate::io::output::write_atomic;
use crate::math::fft::fftshift;
use crate::optics::stack::PsfStack;
use crate::retrieval::result::RetrievalResult;
use colorous::Gradient;
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgb, RgbImage};
use ndarray::{Array2, ArrayView2};
use std::f64::consts::PI;
use std::io::Cursor;
use std::path::Path;

// Gap between the magnitude and phase panels
const PANEL_GAP: u32 = 8;

#[derive(Debug)]
struct BoundingBox {
    min_row: usize,
    max_row: usize,
    min_col: usize,
    max_col: usize,
}

// Smallest rectangle holding every set sample
fn bounding_box(mask: &Array2<bool>) -> Option<BoundingBox> {
    let mut found = None::<BoundingBox>;
    for ((row, col), &set) in mask.indexed_iter() {
        if !set {
            continue;
        }
        let bbox = found.get_or_insert(BoundingBox {
            min_row: row,
            max_row: row,
            min_col: col,
            max_col: col,
        });
        bbox.min_row = bbox.min_row.min(row);
        bbox.max_row = bbox.max_row.max(row);
        bbox.min_col = bbox.min_col.min(col);
        bbox.max_col = bbox.max_col.max(col);
    }
    found
}

/// Map values through a colour gradient
///
/// Values are scaled linearly from `range` (default: data minimum and maximum)
/// onto the gradient; a flat image renders at the low end.
pub fn colorize(values: ArrayView2<'_, f64>, gradient: Gradient, range: Option<(f64, f64)>) -> RgbImage {
    let (rows, cols) = values.dim();
    let (low, high) = range.unwrap_or_else(|| {
        values.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
    });
    let span = high - low;

    RgbImage::from_fn(cols as u32, rows as u32, |x, y| {
        let value = values.get((y as usize, x as usize)).copied().unwrap_or(low);
        let t = if span > 0.0 && span.is_finite() {
            ((value - low) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let color = gradient.eval_continuous(t);
        Rgb([color.r, color.g, color.b])
    })
}

fn upscale(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    imageops::resize(image, width.max(1), height.max(1), FilterType::Nearest)
}

/// Lateral section through plane `z` (default: the brightest plane)
pub fn psf_xy_preview(stack: &PsfStack, z: Option<usize>) -> Option<RgbImage> {
    let plane = stack.xy_slice(z.unwrap_or_else(|| stack.focal_plane()))?;
    let peak = stack.data().fold(0.0_f64, |acc, &v| acc.max(v));
    let image = colorize(plane, colorous::INFERNO, Some((0.0, peak)));
    Some(upscale(&image, PREVIEW_SIZE, PREVIEW_SIZE))
}

/// Axial section through row `y` (default: the row of the brightest voxel),
/// stretched by the voxel aspect ratio
pub fn psf_xz_preview(stack: &PsfStack, y: Option<usize>) -> Option<RgbImage> {
    let row = y.unwrap_or_else(|| stack.brightest_voxel().1);
    let section = stack.xz_slice(row)?;
    let peak = stack.data().fold(0.0_f64, |acc, &v| acc.max(v));
    let image = colorize(section, colorous::INFERNO, Some((0.0, peak)));

    let scale = f64::from(PREVIEW_SIZE) / stack.size_xy() as f64;
    let height = (stack.size_z() as f64 * stack.voxel_aspect() * scale).round() as u32;
    Some(upscale(&image, PREVIEW_SIZE, height.clamp(1, 4 * PREVIEW_SIZE)))
}

/// Pupil magnitude and phase side by side, cropped to the aperture
pub fn pupil_panel(result: &RetrievalResult) -> RgbImage {
    let magnitude = result.magnitude();
    let phase = result.phase();
    let aperture = fftshift(result.grid().aperture());

    let (magnitude, phase) = match bounding_box(&aperture) {
        Some(b) => (
            magnitude
                .slice(ndarray::s![b.min_row..=b.max_row, b.min_col..=b.max_col])
                .to_owned(),
            phase
                .slice(ndarray::s![b.min_row..=b.max_row, b.min_col..=b.max_col])
                .to_owned(),
        ),
        None => (magnitude, phase),
    };

    let left = upscale(
        &colorize(magnitude.view(), colorous::INFERNO, None),
        PREVIEW_SIZE,
        PREVIEW_SIZE,
    );
    let right = upscale(
        &colorize(phase.view(), colorous::RED_BLUE, Some((-PI, PI))),
        PREVIEW_SIZE,
        PREVIEW_SIZE,
    );

    let mut panel = RgbImage::from_pixel(2 * PREVIEW_SIZE + PANEL_GAP, PREVIEW_SIZE, Rgb([255, 255, 255]));
    imageops::replace(&mut panel, &left, 0, 0);
    imageops::replace(&mut panel, &right, i64::from(PREVIEW_SIZE + PANEL_GAP), 0);
    panel
}

/// PNG bytes of an image
///
/// # Errors
///
/// Returns [`WriteError::Encode`] when the PNG encoder fails
pub fn encode_png(image: &RgbImage, path: &Path) -> Result<Vec<u8>, WriteError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| encode_error(path, "PNG", &e))?;
    Ok(bytes)
}

/// Encode and atomically write a PNG
///
/// # Errors
///
/// Returns [`WriteError`] when encoding or writing fails
pub fn save_png(image: &RgbImage, path: &Path) -> Result<(), WriteError> {
    let bytes = encode_png(image, path)?;
    write_atomic(path, &bytes)
}
