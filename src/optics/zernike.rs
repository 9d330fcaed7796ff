//! Noll-ordered Zernike polynomials and least-squares decomposition of a pupil

use crate::io::configuration::{IMPORTANT_NOLL_ORDERS, NAMED_ZERNIKE_COUNT};
use crate::io::error::{FitError, computation_error, invalid_parameter};
use crate::optics::pupil::PupilGrid;
use nalgebra::{DMatrix, DVector};
use ndarray::{Array2, Zip};
use num_complex::Complex64;
use std::f64::consts::TAU;

const NOLL_NAMES: [&str; NAMED_ZERNIKE_COUNT] = [
    "Piston",
    "Tip (X-Tilt)",
    "Tilt (Y-Tilt)",
    "Defocus",
    "Oblique Astigmatism",
    "Vertical Astigmatism",
    "Vertical Coma",
    "Horizontal Coma",
    "Vertical Trefoil",
    "Oblique Trefoil",
    "Primary Spherical",
    "Vertical Secondary Astigmatism",
    "Oblique Secondary Astigmatism",
    "Vertical Quadrafoil",
    "Oblique Quadrafoil",
];

// Singular values below this fraction are treated as zero
const SVD_EPSILON: f64 = 1e-12;

/// Conventional name of a Noll order, for orders 1 to 15
pub fn noll_name(order: usize) -> Option<&'static str> {
    order.checked_sub(1).and_then(|i| NOLL_NAMES.get(i).copied())
}

/// Radial degree `n` and signed azimuthal frequency `m` of Noll order `j ≥ 1`
///
/// Negative `m` selects the sine term. Order 0 maps to piston.
pub fn noll_to_degrees(order: usize) -> (usize, i32) {
    let j = order.max(1);
    let mut n = 0;
    while (n + 1) * (n + 2) / 2 < j {
        n += 1;
    }
    let position = j - n * (n + 1) / 2;
    let parity = n % 2;
    let m_abs = 2 * ((position + parity) / 2) - parity;
    let m = m_abs as i32;
    if m_abs != 0 && j % 2 == 1 {
        (n, -m)
    } else {
        (n, m)
    }
}

/// Radial polynomial `R_n^m(r)`
pub fn radial_polynomial(n: usize, m_abs: usize, r: f64) -> f64 {
    if m_abs > n || (n - m_abs) % 2 != 0 {
        return 0.0;
    }
    let half_sum = (n + m_abs) / 2;
    let half_diff = (n - m_abs) / 2;
    (0..=half_diff)
        .map(|s| {
            let sign = if s % 2 == 0 { 1.0 } else { -1.0 };
            let numerator = factorial(n - s);
            let denominator =
                factorial(s) * factorial(half_sum - s) * factorial(half_diff - s);
            sign * numerator / denominator * r.powi((n - 2 * s) as i32)
        })
        .sum()
}

/// Noll-normalised Zernike polynomial of `order` at polar coordinates `(r, theta)`
pub fn zernike(order: usize, r: f64, theta: f64) -> f64 {
    let (n, m) = noll_to_degrees(order);
    let m_abs = m.unsigned_abs() as usize;
    let radial = radial_polynomial(n, m_abs, r);
    if m == 0 {
        ((n + 1) as f64).sqrt() * radial
    } else {
        let norm = (2.0 * (n + 1) as f64).sqrt();
        let azimuth = m_abs as f64 * theta;
        if m > 0 {
            norm * radial * azimuth.cos()
        } else {
            norm * radial * azimuth.sin()
        }
    }
}

fn factorial(k: usize) -> f64 {
    (1..=k).map(|i| i as f64).product()
}

/// Named coefficient prepared for display
#[derive(Clone, Debug, PartialEq)]
pub struct ZernikeCoefficient {
    /// Noll order
    pub order: usize,
    /// Conventional name
    pub name: &'static str,
    /// Phase coefficient in waves
    pub value: f64,
    /// Whether `|value|` is below the phase tolerance
    pub within_tolerance: bool,
    /// Whether the order is emphasised in reports
    pub important: bool,
}

/// Zernike decomposition of a retrieved pupil
#[derive(Clone, Debug, PartialEq)]
pub struct ZernikeFit {
    phase: Vec<f64>,
    magnitude: Vec<f64>,
}

impl ZernikeFit {
    /// Fit `count` polynomials to the pupil phase (in waves) and magnitude
    ///
    /// The global phase is removed before fitting so the wrapped phase sits
    /// around zero.
    ///
    /// # Errors
    ///
    /// Returns [`FitError::InvalidParameter`] when the aperture holds fewer
    /// samples than requested polynomials or the pupil shape does not match the
    /// grid, and [`FitError::Computation`] when the least-squares solve fails
    pub fn fit(grid: &PupilGrid, pupil: &Array2<Complex64>, count: usize) -> Result<Self, FitError> {
        if pupil.dim() != (grid.size(), grid.size()) {
            return Err(invalid_parameter(
                "pupil",
                &format!("{:?}", pupil.dim()),
                &format!("expected a {0}x{0} pupil", grid.size()),
            ));
        }

        let mut samples = Vec::with_capacity(grid.aperture_len());
        Zip::from(pupil)
            .and(grid.radius())
            .and(grid.theta())
            .and(grid.aperture())
            .for_each(|&p, &r, &t, &inside| {
                if inside {
                    samples.push((p, r, t));
                }
            });

        if samples.len() < count {
            return Err(invalid_parameter(
                "zernike_count",
                &count,
                &format!("aperture only holds {} samples", samples.len()),
            ));
        }

        let mean: Complex64 = samples.iter().map(|(p, _, _)| p).sum();
        let derotate = if mean.norm() > 0.0 {
            mean.conj() / mean.norm()
        } else {
            Complex64::new(1.0, 0.0)
        };

        let design = DMatrix::from_fn(samples.len(), count, |row, col| {
            samples
                .get(row)
                .map_or(0.0, |&(_, r, t)| zernike(col + 1, r, t))
        });
        let phase_target = DVector::from_iterator(
            samples.len(),
            samples.iter().map(|(p, _, _)| (p * derotate).arg() / TAU),
        );
        let magnitude_target =
            DVector::from_iterator(samples.len(), samples.iter().map(|(p, _, _)| p.norm()));

        let svd = design.svd(true, true);
        let phase = svd
            .solve(&phase_target, SVD_EPSILON)
            .map_err(|e| computation_error("zernike phase fit", &e))?;
        let magnitude = svd
            .solve(&magnitude_target, SVD_EPSILON)
            .map_err(|e| computation_error("zernike magnitude fit", &e))?;

        Ok(Self {
            phase: phase.iter().copied().collect(),
            magnitude: magnitude.iter().copied().collect(),
        })
    }

    /// Phase coefficients in waves, index 0 is Noll order 1
    pub fn phase_coefficients(&self) -> &[f64] {
        &self.phase
    }

    /// Magnitude coefficients, index 0 is Noll order 1
    pub fn magnitude_coefficients(&self) -> &[f64] {
        &self.magnitude
    }

    /// Phase coefficient of a Noll order
    pub fn phase(&self, order: usize) -> Option<f64> {
        order
            .checked_sub(1)
            .and_then(|i| self.phase.get(i).copied())
    }

    /// Named orders with tolerance flags
    pub fn named(&self, phase_tolerance: f64) -> Vec<ZernikeCoefficient> {
        self.phase
            .iter()
            .take(NAMED_ZERNIKE_COUNT)
            .enumerate()
            .filter_map(|(i, &value)| {
                let order = i + 1;
                noll_name(order).map(|name| ZernikeCoefficient {
                    order,
                    name,
                    value,
                    within_tolerance: value.abs() < phase_tolerance,
                    important: IMPORTANT_NOLL_ORDERS.contains(&order),
                })
            })
            .collect()
    }
}
