//! 2-D Gaussian point spread function.
//!
//! The Gaussian function is defined as:
//! f(x, y) = height * exp(-wx * dx² - wy * dy²)
//!
//! where `dx = x - (xc + xoff)` and `dy = y - (yc + yoff)` are measured from
//! the integer pixel coordinates and `wx = 1 / (2 σx²)` (likewise for y) are
//! the width parameters stored in [`PeakData::params`].

use ndarray::{Array1, Array2};

use crate::aoi::{aoi_origin, hysteresis_half_size, hysteresis_origin, FitImage};
use crate::diagnostics::FitFault;
use crate::models::{PeakModelData, PeakShape};
use crate::peak::{
    sigma_to_width, width_to_sigma, PeakData, BACKGROUND, HEIGHT, NFITTING, XCENTER, XWIDTH,
    YCENTER, YWIDTH,
};

const FIXED_PARAMS: [usize; 4] = [HEIGHT, XCENTER, YCENTER, BACKGROUND];
const VARIABLE_PARAMS: [usize; 6] = [HEIGHT, XCENTER, XWIDTH, YCENTER, YWIDTH, BACKGROUND];

/// Default AOI half size in units of σ.
pub const DEFAULT_AOI_SCALE: f64 = 4.0;

/// Width handling of a Gaussian PSF.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GaussianWidth {
    /// The width is fixed at σ and not fit.
    Fixed(f64),

    /// Both widths are fit independently.
    Variable,
}

/// Per-axis terms of a rendered Gaussian peak.
///
/// `dx[k]` is the distance of AOI column `k` from the peak center and
/// `ex[k] = exp(-wx * dx[k]²)`, likewise for rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GaussianPeakData {
    pub dx: Vec<f64>,
    pub ex: Vec<f64>,
    pub dy: Vec<f64>,
    pub ey: Vec<f64>,
}

/// A Gaussian peak shape.
#[derive(Debug, Clone)]
pub struct GaussianPsf {
    width: GaussianWidth,
    sigma: f64,
    aoi_scale: f64,
}

impl GaussianPsf {
    /// Create a Gaussian model.
    ///
    /// # Arguments
    ///
    /// * `width` - Whether the width is fixed or fit
    /// * `sigma` - Starting σ in pixels for peaks seeded from a position only
    ///
    /// # Returns
    ///
    /// * A new GaussianPsf instance
    pub fn new(width: GaussianWidth, sigma: f64) -> Self {
        Self {
            width,
            sigma,
            aoi_scale: DEFAULT_AOI_SCALE,
        }
    }

    /// Gaussian with a fixed width σ.
    pub fn fixed(sigma: f64) -> Self {
        Self::new(GaussianWidth::Fixed(sigma), sigma)
    }

    /// Gaussian with variable widths starting at σ.
    pub fn variable(sigma: f64) -> Self {
        Self::new(GaussianWidth::Variable, sigma)
    }

    /// Set the AOI half size in units of σ.
    pub fn with_aoi_scale(mut self, aoi_scale: f64) -> Self {
        self.aoi_scale = aoi_scale;
        self
    }

    /// The width mode.
    pub fn width(&self) -> GaussianWidth {
        self.width
    }

    /// Desired (fractional) AOI half size for a width parameter.
    ///
    /// Capped at the larger image dimension; an AOI that large never fits.
    fn target_half_size(&self, width: f64, image: &FitImage) -> f64 {
        let sigma = width_to_sigma(width);
        let sigma = if sigma.is_finite() { sigma } else { self.sigma };
        let limit = image.size_x().max(image.size_y()).max(1) as f64;
        (self.aoi_scale * sigma).clamp(1.0, limit)
    }

    fn half_size(&self, width: f64, image: &FitImage) -> usize {
        (self.target_half_size(width, image).round() as usize).max(1)
    }
}

fn axis_terms(origin: isize, size: usize, center: f64, width: f64) -> (Vec<f64>, Vec<f64>) {
    let d: Vec<f64> = (0..size)
        .map(|k| (origin + k as isize) as f64 - center)
        .collect();
    let e = d.iter().map(|d| (-width * d * d).exp()).collect();
    (d, e)
}

fn aoi_terms(peak: &PeakData, image: &FitImage) -> GaussianPeakData {
    let (dx, ex) = axis_terms(
        peak.xi,
        peak.size_x,
        peak.params[XCENTER] + image.xoff,
        peak.params[XWIDTH],
    );
    let (dy, ey) = axis_terms(
        peak.yi,
        peak.size_y,
        peak.params[YCENTER] + image.yoff,
        peak.params[YWIDTH],
    );
    GaussianPeakData { dx, ex, dy, ey }
}

impl PeakShape for GaussianPsf {
    fn name(&self) -> &str {
        match self.width {
            GaussianWidth::Fixed(_) => "gaussian-fixed",
            GaussianWidth::Variable => "gaussian-variable",
        }
    }

    fn fitting_params(&self) -> &[usize] {
        match self.width {
            GaussianWidth::Fixed(_) => &FIXED_PARAMS,
            GaussianWidth::Variable => &VARIABLE_PARAMS,
        }
    }

    fn init_params(&self, params: &mut [f64; NFITTING]) {
        let sigma = match self.width {
            GaussianWidth::Fixed(sigma) => sigma,
            GaussianWidth::Variable => self.sigma,
        };
        params[XWIDTH] = sigma_to_width(sigma);
        params[YWIDTH] = sigma_to_width(sigma);
    }

    fn init_peak(&self, peak: &mut PeakData, image: &FitImage) {
        if let GaussianWidth::Fixed(sigma) = self.width {
            peak.params[XWIDTH] = sigma_to_width(sigma);
            peak.params[YWIDTH] = sigma_to_width(sigma);
        }

        let half_x = self.half_size(peak.params[XWIDTH], image);
        let half_y = self.half_size(peak.params[YWIDTH], image);
        peak.size_x = 2 * half_x + 1;
        peak.size_y = 2 * half_y + 1;
        peak.xi = aoi_origin(peak.params[XCENTER] + image.xoff, half_x);
        peak.yi = aoi_origin(peak.params[YCENTER] + image.yoff, half_y);
        peak.model_data = PeakModelData::Gaussian(GaussianPeakData::default());
    }

    fn calc_peak_shape(&self, peak: &mut PeakData, image: &FitImage) {
        let terms = aoi_terms(peak, image);
        let height = peak.params[HEIGHT];
        peak.psf = Array2::from_shape_fn((peak.size_y, peak.size_x), |(j, k)| {
            height * terms.ey[j] * terms.ex[k]
        });
        peak.model_data = PeakModelData::Gaussian(terms);
    }

    fn calc_jh(
        &self,
        peak: &PeakData,
        image: &FitImage,
        jacobian: &mut Array1<f64>,
        hessian: &mut Array2<f64>,
    ) {
        let computed;
        let terms = match &peak.model_data {
            PeakModelData::Gaussian(t)
                if t.ex.len() == peak.size_x && t.ey.len() == peak.size_y =>
            {
                t
            }
            _ => {
                computed = aoi_terms(peak, image);
                &computed
            }
        };

        let params = self.fitting_params();
        let height = peak.params[HEIGHT];
        let wx = peak.params[XWIDTH];
        let wy = peak.params[YWIDTH];
        let x_data = image.x_data();
        let scmos = image.scmos_term();
        let counts = image.bg_counts();

        let mut grad = [0.0; NFITTING];
        let mut jt = vec![0.0; params.len()];
        for j in 0..peak.size_y {
            let row = peak.yi as usize + j;
            for k in 0..peak.size_x {
                let col = peak.xi as usize + k;
                let fi = image.fit_value(row, col);
                let w = 1.0 / scmos[[row, col]];
                let dfi = fi - x_data[[row, col]];

                let e = terms.ex[k] * terms.ey[j];
                let he = height * e;
                let (dx, dy) = (terms.dx[k], terms.dy[j]);
                grad[HEIGHT] = e;
                grad[XCENTER] = 2.0 * wx * dx * he;
                grad[XWIDTH] = -dx * dx * he;
                grad[YCENTER] = 2.0 * wy * dy * he;
                grad[YWIDTH] = -dy * dy * he;
                grad[BACKGROUND] = 1.0 / f64::from(counts[[row, col]].max(1));

                for (m, &pm) in params.iter().enumerate() {
                    jt[m] = grad[pm];
                }
                for m in 0..params.len() {
                    jacobian[m] += w * dfi * jt[m];
                    for n in 0..=m {
                        hessian[[m, n]] += w * jt[m] * jt[n];
                    }
                }
            }
        }

        for m in 0..params.len() {
            for n in 0..m {
                hessian[[n, m]] = hessian[[m, n]];
            }
        }
    }

    fn check(&self, peak: &PeakData) -> Option<FitFault> {
        match self.width {
            GaussianWidth::Fixed(_) => None,
            GaussianWidth::Variable => {
                if peak.params[XWIDTH] <= 0.0 || peak.params[YWIDTH] <= 0.0 {
                    Some(FitFault::NegativeWidth)
                } else {
                    None
                }
            }
        }
    }

    fn update_aoi(&self, peak: &mut PeakData, image: &FitImage, hysteresis: f64) {
        let old_half_x = peak.size_x / 2;
        let old_half_y = peak.size_y / 2;
        let (half_x, half_y) = match self.width {
            GaussianWidth::Fixed(_) => (old_half_x, old_half_y),
            GaussianWidth::Variable => {
                let target_x = self.target_half_size(peak.params[XWIDTH], image);
                let target_y = self.target_half_size(peak.params[YWIDTH], image);
                (
                    hysteresis_half_size(old_half_x, target_x, hysteresis),
                    hysteresis_half_size(old_half_y, target_y, hysteresis),
                )
            }
        };

        let xc = peak.params[XCENTER] + image.xoff;
        let yc = peak.params[YCENTER] + image.yoff;
        if !xc.is_finite() || !yc.is_finite() {
            return;
        }

        // A resized AOI is always recentered.
        peak.xi = if half_x != old_half_x {
            aoi_origin(xc, half_x)
        } else {
            hysteresis_origin(peak.xi, half_x, xc, hysteresis)
        };
        peak.yi = if half_y != old_half_y {
            aoi_origin(yc, half_y)
        } else {
            hysteresis_origin(peak.yi, half_y, yc, hysteresis)
        };
        peak.size_x = 2 * half_x + 1;
        peak.size_y = 2 * half_y + 1;
    }
}
