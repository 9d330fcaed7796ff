//! Pupil-plane sampling and the scalar defocus model linking pupil and PSF stack
//!
//! The pupil lives on the unshifted FFT frequency grid of a square plane. A PSF
//! plane at axial offset `z` is `|ifft2(P · exp(2πi kz z))|²`, shifted so the
//! optical axis sits at index `size / 2`.

use crate::math::fft::{Fft2, fftfreq, fftshift, ifftshift};
use crate::optics::zernike::zernike;
use crate::retrieval::parameters::PsfParameters;
use ndarray::{Array2, Array3, Axis, Zip};
use num_complex::Complex64;
use std::f64::consts::TAU;

/// Frequency-space sampling of a square pupil
#[derive(Clone, Debug)]
pub struct PupilGrid {
    size: usize,
    cutoff: f64,
    radius: Array2<f64>,
    theta: Array2<f64>,
    kz: Array2<f64>,
    aperture: Array2<bool>,
}

impl PupilGrid {
    /// Sample the pupil of `params` on a `size × size` frequency grid
    pub fn new(params: &PsfParameters, size: usize) -> Self {
        let frequencies = fftfreq(size, params.pixel_size_xy_nm);
        let cutoff = params.cutoff_frequency();
        let medium = params.refractive_index / params.wavelength_nm;

        let mut radius = Array2::zeros((size, size));
        let mut theta = Array2::zeros((size, size));
        let mut kz = Array2::zeros((size, size));
        let mut aperture = Array2::from_elem((size, size), false);

        for (row, &ky) in frequencies.iter().enumerate() {
            for (col, &kx) in frequencies.iter().enumerate() {
                let kr = kx.hypot(ky);
                if let Some(r) = radius.get_mut((row, col)) {
                    *r = kr / cutoff;
                }
                if let Some(t) = theta.get_mut((row, col)) {
                    *t = ky.atan2(kx);
                }
                if let Some(k) = kz.get_mut((row, col)) {
                    *k = (medium * medium - kr * kr).max(0.0).sqrt();
                }
                if let Some(a) = aperture.get_mut((row, col)) {
                    *a = kr <= cutoff;
                }
            }
        }

        Self {
            size,
            cutoff,
            radius,
            theta,
            kz,
            aperture,
        }
    }

    /// Edge length of the grid
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Aperture radius in spatial frequency (1/nm)
    pub const fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Radial frequency normalised so the aperture edge is 1
    pub const fn radius(&self) -> &Array2<f64> {
        &self.radius
    }

    /// Azimuth of each frequency sample
    pub const fn theta(&self) -> &Array2<f64> {
        &self.theta
    }

    /// Samples inside the aperture
    pub const fn aperture(&self) -> &Array2<bool> {
        &self.aperture
    }

    /// Number of samples inside the aperture
    pub fn aperture_len(&self) -> usize {
        self.aperture.iter().filter(|&&inside| inside).count()
    }

    /// Uniform unit pupil over the aperture
    pub fn aperture_pupil(&self) -> Array2<Complex64> {
        self.aperture
            .mapv(|inside| if inside { Complex64::new(1.0, 0.0) } else { Complex64::default() })
    }

    /// Unit pupil carrying the given `(noll order, waves)` aberrations
    pub fn aberrated_pupil(&self, aberrations: &[(usize, f64)]) -> Array2<Complex64> {
        let mut pupil = Array2::from_elem((self.size, self.size), Complex64::default());
        Zip::from(&mut pupil)
            .and(&self.radius)
            .and(&self.theta)
            .and(&self.aperture)
            .for_each(|p, &r, &t, &inside| {
                if inside {
                    let waves: f64 = aberrations
                        .iter()
                        .map(|&(order, amount)| amount * zernike(order, r, t))
                        .sum();
                    *p = Complex64::from_polar(1.0, TAU * waves);
                }
            });
        pupil
    }

    /// Propagation phase factor `exp(2πi kz z)` restricted to the aperture
    pub fn defocus_kernel(&self, z_nm: f64) -> Array2<Complex64> {
        let mut kernel = Array2::from_elem((self.size, self.size), Complex64::default());
        Zip::from(&mut kernel)
            .and(&self.kz)
            .and(&self.aperture)
            .for_each(|k, &kz, &inside| {
                if inside {
                    *k = Complex64::from_polar(1.0, TAU * kz * z_nm);
                }
            });
        kernel
    }
}

/// Axial offsets in nanometres of `planes` slices spaced `step_nm` apart
/// with the focus at `focus_index`
pub fn axial_positions(planes: usize, step_nm: f64, focus_index: usize) -> Vec<f64> {
    (0..planes)
        .map(|i| (i as f64 - focus_index as f64) * step_nm)
        .collect()
}

/// Forward and backward propagation between a pupil and a PSF stack
#[derive(Clone, Debug)]
pub struct HanserModel {
    grid: PupilGrid,
    fft: Fft2,
    kernels: Vec<Array2<Complex64>>,
}

impl HanserModel {
    /// Model for planes of `size × size` at the given axial offsets
    pub fn new(params: &PsfParameters, size: usize, z_positions: &[f64]) -> Self {
        let grid = PupilGrid::new(params, size);
        let kernels = z_positions
            .iter()
            .map(|&z| grid.defocus_kernel(z))
            .collect();
        Self {
            grid,
            fft: Fft2::new(size),
            kernels,
        }
    }

    /// Pupil sampling used by the model
    pub const fn grid(&self) -> &PupilGrid {
        &self.grid
    }

    /// Number of modelled planes
    pub const fn planes(&self) -> usize {
        self.kernels.len()
    }

    /// Complex field of every plane, centred, indexed `(z, y, x)`
    pub fn amplitude(&self, pupil: &Array2<Complex64>) -> Array3<Complex64> {
        let size = self.grid.size;
        let mut stack = Array3::from_elem((self.kernels.len(), size, size), Complex64::default());
        for (mut plane, kernel) in stack.axis_iter_mut(Axis(0)).zip(&self.kernels) {
            let mut field = pupil * kernel;
            self.fft.inverse(&mut field);
            plane.assign(&fftshift(&field));
        }
        stack
    }

    /// Intensity of every plane, centred, indexed `(z, y, x)`
    pub fn intensity(&self, pupil: &Array2<Complex64>) -> Array3<f64> {
        self.amplitude(pupil).mapv(|a| a.norm_sqr())
    }

    /// Pupil estimate averaged over all planes of a centred field stack
    pub fn back_propagate(&self, amplitude: &Array3<Complex64>) -> Array2<Complex64> {
        let size = self.grid.size;
        let mut pupil = Array2::from_elem((size, size), Complex64::default());
        for (plane, kernel) in amplitude.axis_iter(Axis(0)).zip(&self.kernels) {
            let mut field = ifftshift(&plane.to_owned());
            self.fft.forward(&mut field);
            Zip::from(&mut pupil)
                .and(&field)
                .and(kernel)
                .for_each(|p, &f, &k| *p += f * k.conj());
        }
        let planes = self.kernels.len().max(1) as f64;
        pupil.mapv_inplace(|p| p / planes);
        pupil
    }
}
