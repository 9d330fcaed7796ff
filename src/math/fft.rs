//! Two-dimensional FFT over square `ndarray` planes and quadrant shifts

use ndarray::Array2;
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Planned forward and inverse transforms for square planes of one size
///
/// The forward transform is unnormalised; the inverse scales by `1 / size²`
/// so that `inverse(forward(x)) == x`.
#[derive(Clone)]
pub struct Fft2 {
    size: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl std::fmt::Debug for Fft2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fft2").field("size", &self.size).finish()
    }
}

impl Fft2 {
    /// Plan transforms for `size × size` planes
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        Self {
            size,
            forward: planner.plan_fft_forward(size),
            inverse: planner.plan_fft_inverse(size),
        }
    }

    /// Edge length of the planned planes
    pub const fn size(&self) -> usize {
        self.size
    }

    /// In-place forward transform
    pub fn forward(&self, plane: &mut Array2<Complex64>) {
        self.transform(plane, self.forward.as_ref());
    }

    /// In-place normalised inverse transform
    pub fn inverse(&self, plane: &mut Array2<Complex64>) {
        self.transform(plane, self.inverse.as_ref());
        let scale = 1.0 / (self.size * self.size) as f64;
        plane.mapv_inplace(|value| value * scale);
    }

    fn transform(&self, plane: &mut Array2<Complex64>, plan: &dyn Fft<f64>) {
        let mut buffer = vec![Complex64::default(); self.size];

        for mut row in plane.rows_mut() {
            for (slot, value) in buffer.iter_mut().zip(row.iter()) {
                *slot = *value;
            }
            plan.process(&mut buffer);
            for (value, slot) in row.iter_mut().zip(&buffer) {
                *value = *slot;
            }
        }

        for mut column in plane.columns_mut() {
            for (slot, value) in buffer.iter_mut().zip(column.iter()) {
                *slot = *value;
            }
            plan.process(&mut buffer);
            for (value, slot) in column.iter_mut().zip(&buffer) {
                *value = *slot;
            }
        }
    }
}

/// Circularly shift both axes so the zero frequency moves to the centre
pub fn fftshift<T: Clone + Default>(plane: &Array2<T>) -> Array2<T> {
    let (rows, cols) = plane.dim();
    roll(plane, rows / 2, cols / 2)
}

/// Inverse of [`fftshift`], also correct for odd sizes
pub fn ifftshift<T: Clone + Default>(plane: &Array2<T>) -> Array2<T> {
    let (rows, cols) = plane.dim();
    roll(plane, rows - rows / 2, cols - cols / 2)
}

/// Circular shift by `(down, right)` elements
pub fn roll<T: Clone + Default>(plane: &Array2<T>, down: usize, right: usize) -> Array2<T> {
    let (rows, cols) = plane.dim();
    if rows == 0 || cols == 0 {
        return plane.clone();
    }
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let source_row = (r + rows - down % rows) % rows;
        let source_col = (c + cols - right % cols) % cols;
        plane
            .get((source_row, source_col))
            .cloned()
            .unwrap_or_default()
    })
}

/// Sample frequencies of a length-`n` transform with sample spacing `spacing`
///
/// Ordered as the unshifted transform output: non-negative frequencies first.
pub fn fftfreq(n: usize, spacing: f64) -> Vec<f64> {
    let scale = 1.0 / (n as f64 * spacing);
    let positive = n.div_ceil(2);
    (0..n)
        .map(|i| {
            if i < positive {
                i as f64 * scale
            } else {
                (i as f64 - n as f64) * scale
            }
        })
        .collect()
}
