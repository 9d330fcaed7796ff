//! Convergence and Zernike charts rendered to in-memory bitmaps

use crate::io::error::{WriteError, encode_error};
use crate::optics::zernike::ZernikeCoefficient;
use crate::retrieval::result::IterationRecord;
use image::RgbImage;
use plotters::prelude::{
    BLACK, BitMapBackend, ChartBuilder, Color, IntoDrawingArea, LineSeries, PathElement,
    RGBColor, Rectangle, WHITE,
};
use std::path::Path;

/// Colour of coefficients within tolerance
pub const WITHIN_TOLERANCE: RGBColor = RGBColor(56, 171, 38);
/// Colour of coefficients outside tolerance
pub const OUTSIDE_TOLERANCE: RGBColor = RGBColor(230, 18, 18);

const TOLERANCE_LINE: RGBColor = RGBColor(150, 150, 150);

fn palette(index: usize) -> RGBColor {
    let color = colorous::TABLEAU10
        .get(index % colorous::TABLEAU10.len())
        .copied()
        .unwrap_or(colorous::Color { r: 0, g: 0, b: 0 });
    RGBColor(color.r, color.g, color.b)
}

fn padded_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let (low, high) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !low.is_finite() || !high.is_finite() {
        return None;
    }
    let pad = ((high - low) * 0.05).max(0.1);
    Some((low - pad, high + pad))
}

/// Base-10 logarithms of the MSE and relative pupil change per iteration
///
/// MSE is drawn in the first palette colour, the pupil change in the second.
///
/// # Errors
///
/// Returns [`WriteError::Encode`] (reported against `target`) when drawing fails
pub fn convergence_plot(
    trace: &[IterationRecord],
    max_iterations: usize,
    (width, height): (u32, u32),
    target: &Path,
) -> Result<RgbImage, WriteError> {
    let mse: Vec<(f64, f64)> = trace
        .iter()
        .filter(|r| r.mse > 0.0)
        .map(|r| (r.iteration as f64, r.mse.log10()))
        .collect();
    let pupil: Vec<(f64, f64)> = trace
        .iter()
        .filter(|r| r.pupil_diff > 0.0)
        .map(|r| (r.iteration as f64, r.pupil_diff.log10()))
        .collect();
    let (low, high) =
        padded_range(mse.iter().chain(&pupil).map(|&(_, y)| y)).unwrap_or((-1.0, 0.0));
    let x_end = max_iterations.max(trace.len()).max(1) as f64;

    let mut buffer = vec![0_u8; width as usize * height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| encode_error(target, "plot", &e))?;
        let mut chart = ChartBuilder::on(&root)
            .margin(8)
            .build_cartesian_2d(0.0..x_end, low..high)
            .map_err(|e| encode_error(target, "plot", &e))?;

        for (index, series) in [mse, pupil].into_iter().enumerate() {
            chart
                .draw_series(LineSeries::new(series, palette(index).stroke_width(2)))
                .map_err(|e| encode_error(target, "plot", &e))?;
        }
        chart
            .draw_series(std::iter::once(PathElement::new(
                vec![(0.0, low), (x_end, low), (x_end, high), (0.0, high), (0.0, low)],
                BLACK,
            )))
            .map_err(|e| encode_error(target, "plot", &e))?;
        root.present().map_err(|e| encode_error(target, "plot", &e))?;
    }

    RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| encode_error(target, "plot", &"bitmap size mismatch"))
}

/// Bar per named Zernike coefficient, coloured by tolerance, with ±tolerance guides
///
/// # Errors
///
/// Returns [`WriteError::Encode`] (reported against `target`) when drawing fails
pub fn zernike_chart(
    coefficients: &[ZernikeCoefficient],
    phase_tolerance: f64,
    (width, height): (u32, u32),
    target: &Path,
) -> Result<RgbImage, WriteError> {
    let extent = coefficients
        .iter()
        .map(|c| c.value.abs())
        .fold(phase_tolerance, f64::max)
        * 1.15;
    let x_end = coefficients.len().max(1) as f64 + 0.5;

    let mut buffer = vec![0_u8; width as usize * height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| encode_error(target, "plot", &e))?;
        let mut chart = ChartBuilder::on(&root)
            .margin(8)
            .build_cartesian_2d(0.5..x_end, -extent..extent)
            .map_err(|e| encode_error(target, "plot", &e))?;

        chart
            .draw_series(coefficients.iter().map(|c| {
                let x = c.order as f64;
                let color = if c.within_tolerance {
                    WITHIN_TOLERANCE
                } else {
                    OUTSIDE_TOLERANCE
                };
                Rectangle::new([(x - 0.35, 0.0), (x + 0.35, c.value)], color.filled())
            }))
            .map_err(|e| encode_error(target, "plot", &e))?;

        chart
            .draw_series(
                [phase_tolerance, -phase_tolerance]
                    .into_iter()
                    .map(|y| PathElement::new(vec![(0.5, y), (x_end, y)], TOLERANCE_LINE)),
            )
            .map_err(|e| encode_error(target, "plot", &e))?;
        chart
            .draw_series(std::iter::once(PathElement::new(
                vec![(0.5, 0.0), (x_end, 0.0)],
                BLACK,
            )))
            .map_err(|e| encode_error(target, "plot", &e))?;
        root.present().map_err(|e| encode_error(target, "plot", &e))?;
    }

    RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| encode_error(target, "plot", &"bitmap size mismatch"))
}
