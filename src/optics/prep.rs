//! Conditioning of a measured PSF stack before phase retrieval

use crate::io::error::{FitError, computation_error, invalid_parameter};
use crate::math::statistics::median;
use crate::optics::stack::PsfStack;
use ndarray::{Array3, Axis, s};
use std::ops::Range;

/// Background-free, centred, padded stack normalised to unit maximum
#[derive(Clone, Debug)]
pub struct PreparedPsf {
    data: Array3<f64>,
    focus_index: usize,
    background: f64,
}

impl PreparedPsf {
    /// Wrap already conditioned data, skipping preparation
    ///
    /// # Errors
    ///
    /// Returns [`FitError::InvalidParameter`] when the planes are not square or
    /// the focus index lies outside the stack
    pub fn from_normalized(data: Array3<f64>, focus_index: usize) -> Result<Self, FitError> {
        let (z, y, x) = data.dim();
        if y != x || y == 0 {
            return Err(invalid_parameter(
                "data",
                &format!("{:?}", data.dim()),
                &"planes must be square and non-empty",
            ));
        }
        if focus_index >= z {
            return Err(invalid_parameter(
                "focus_index",
                &focus_index,
                &format!("stack only holds {z} planes"),
            ));
        }
        Ok(Self {
            data,
            focus_index,
            background: 0.0,
        })
    }

    /// Intensities indexed `(z, y, x)`
    pub const fn data(&self) -> &Array3<f64> {
        &self.data
    }

    /// Plane holding the intensity peak, taken as the focal plane
    pub const fn focus_index(&self) -> usize {
        self.focus_index
    }

    /// Background level subtracted from the raw samples
    pub const fn background(&self) -> f64 {
        self.background
    }

    /// Number of planes
    pub fn planes(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// Edge length of each padded plane
    pub fn size(&self) -> usize {
        self.data.len_of(Axis(2))
    }
}

/// Estimate the background from the outer frame of every plane
pub fn border_background(stack: &PsfStack) -> Option<f64> {
    let data = stack.data();
    let edge = stack.size_xy().saturating_sub(1);
    let border = data
        .indexed_iter()
        .filter(|((_, y, x), _)| *y == 0 || *x == 0 || *y == edge || *x == edge)
        .map(|(_, &value)| value);
    median(border)
}

/// Subtract the scaled background, centre the peak on a canvas
/// `padding_factor` times wider, and normalise to unit maximum
///
/// # Errors
///
/// Returns [`FitError::InvalidParameter`] for a zero padding factor or a
/// negative multiplier, and [`FitError::Computation`] when no signal remains
/// above the background
pub fn prepare_stack(
    stack: &PsfStack,
    padding_factor: usize,
    background_multiplier: f64,
) -> Result<PreparedPsf, FitError> {
    if padding_factor == 0 {
        return Err(invalid_parameter(
            "padding_factor",
            &padding_factor,
            &"must be at least 1",
        ));
    }
    if !background_multiplier.is_finite() || background_multiplier < 0.0 {
        return Err(invalid_parameter(
            "background_multiplier",
            &background_multiplier,
            &"must be finite and non-negative",
        ));
    }

    let background = border_background(stack).unwrap_or(0.0) * background_multiplier;
    let cleaned = stack.data().mapv(|v| (v - background).max(0.0));

    let mut peak = ((0, 0, 0), f64::NEG_INFINITY);
    for (index, &value) in cleaned.indexed_iter() {
        if value > peak.1 {
            peak = (index, value);
        }
    }
    let ((focus_index, peak_y, peak_x), peak_value) = peak;
    if peak_value <= 0.0 {
        return Err(computation_error(
            "background removal",
            &"no signal above the background level",
        ));
    }

    let size = stack.size_xy();
    let target = size * padding_factor;
    let centre = target / 2;
    let mut canvas = Array3::zeros((stack.size_z(), target, target));

    // Rows and columns of the source that land inside the canvas
    let rows = overlap(size, target, centre as isize - peak_y as isize);
    let cols = overlap(size, target, centre as isize - peak_x as isize);
    if let (Some((src_y, dst_y)), Some((src_x, dst_x))) = (rows, cols) {
        canvas
            .slice_mut(s![.., dst_y, dst_x])
            .assign(&cleaned.slice(s![.., src_y, src_x]));
    }

    canvas.mapv_inplace(|v| v / peak_value);

    Ok(PreparedPsf {
        data: canvas,
        focus_index,
        background,
    })
}

/// Source and destination ranges of a 1-D copy of `len` samples shifted by
/// `offset` into a buffer of `target` samples
fn overlap(len: usize, target: usize, offset: isize) -> Option<(Range<usize>, Range<usize>)> {
    let start = offset.max(0);
    let end = (len as isize + offset).min(target as isize);
    (end > start).then(|| {
        let source = (start - offset) as usize..(end - offset) as usize;
        (source, start as usize..end as usize)
    })
}
