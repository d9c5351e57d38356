//! The per-peak record.
//!
//! A [`PeakData`] holds everything the engine knows about one peak: its seven
//! fit parameters, the area of interest (AOI) it is rendered over, the solver
//! state (damping, clamps, status, error) and the rendered intensity cache
//! used to subtract the peak from the shared accumulators without
//! re-rendering it.

use ndarray::Array2;

use crate::lm::config::FitConfig;
use crate::lm::convergence::PeakStatus;
use crate::models::PeakModelData;

/// Number of peak fitting parameters.
pub const NFITTING: usize = 7;

/// Height.
pub const HEIGHT: usize = 0;
/// X center.
pub const XCENTER: usize = 1;
/// Width in x, only relevant for gaussians.
pub const XWIDTH: usize = 2;
/// Y center.
pub const YCENTER: usize = 3;
/// Width in y, only relevant for gaussians.
pub const YWIDTH: usize = 4;
/// Background level under the peak.
pub const BACKGROUND: usize = 5;
/// Z center.
pub const ZCENTER: usize = 6;

/// Convert a width parameter `1 / (2 σ²)` to σ.
pub fn width_to_sigma(width: f64) -> f64 {
    (1.0 / (2.0 * width)).sqrt()
}

/// Convert σ to the width parameter `1 / (2 σ²)`.
pub fn sigma_to_width(sigma: f64) -> f64 {
    1.0 / (2.0 * sigma * sigma)
}

/// There is one of these for each peak to be fit.
#[derive(Debug, Clone)]
pub struct PeakData {
    /// Peak id, stable for the lifetime of the peak.
    pub index: usize,

    /// Counter for adding / subtracting the peak from the accumulators.
    pub added: u32,

    /// Number of fitting iterations.
    pub iterations: usize,

    /// Status of the fit.
    pub status: PeakStatus,

    /// AOI origin in x (starting pixel).
    pub xi: isize,

    /// AOI origin in y (starting pixel).
    pub yi: isize,

    /// AOI size in x in pixels.
    pub size_x: usize,

    /// AOI size in y in pixels.
    pub size_y: usize,

    /// Current error.
    pub error: f64,

    /// Levenberg-Marquardt lambda term.
    pub lambda: f64,

    /// Sign of the previous update of each parameter (legacy fitting only).
    pub sign: [i8; NFITTING],

    /// Clamp term to suppress fit oscillations (legacy fitting only).
    pub clamp: [f64; NFITTING],

    /// `[height, x-center, x-width, y-center, y-width, background, z-center]`
    pub params: [f64; NFITTING],

    /// The rendered peak over its AOI, `size_y × size_x`.
    pub psf: Array2<f64>,

    /// Peak model specific data.
    pub model_data: PeakModelData,
}

impl PeakData {
    /// Create a running peak with the given starting parameters.
    ///
    /// The AOI is left empty; the shape model sets it in `init_peak`.
    pub fn new(index: usize, params: [f64; NFITTING], config: &FitConfig) -> Self {
        let mut peak = Self {
            index,
            added: 0,
            iterations: 0,
            status: PeakStatus::Running,
            xi: 0,
            yi: 0,
            size_x: 0,
            size_y: 0,
            error: 0.0,
            lambda: config.lambda_start,
            sign: [0; NFITTING],
            clamp: config.clamp_start,
            params,
            psf: Array2::zeros((0, 0)),
            model_data: PeakModelData::None,
        };
        peak.reset_clamp(&config.clamp_start);
        peak
    }

    /// Reset clamp and sign values. Height and background clamps are relative.
    pub fn reset_clamp(&mut self, clamp_start: &[f64; NFITTING]) {
        self.clamp = *clamp_start;
        self.sign = [0; NFITTING];
        self.clamp[HEIGHT] = clamp_start[HEIGHT] * self.params[HEIGHT];
        self.clamp[BACKGROUND] = clamp_start[BACKGROUND] * self.params[BACKGROUND];
    }

    /// Update parameter `i` based on `delta` (the parameter moves by `-delta`).
    ///
    /// With clamping the step is limited to `clamp[i]`, and the clamp is
    /// halved every time the sign of the update flips.
    pub fn update_param(&mut self, i: usize, delta: f64, use_clamp: bool) {
        if !use_clamp {
            self.params[i] -= delta;
            return;
        }
        if delta == 0.0 {
            return;
        }

        let flipped = (self.sign[i] == 1 && delta < 0.0) || (self.sign[i] == -1 && delta > 0.0);
        if flipped {
            self.clamp[i] *= 0.5;
        }
        self.sign[i] = if delta > 0.0 { 1 } else { -1 };

        self.params[i] -= delta / (1.0 + delta.abs() / self.clamp[i]);
    }

    /// Multiply lambda by the up factor.
    ///
    /// Returns false once lambda has reached the maximum; lambda is left at
    /// the maximum and the peak should be treated as unfittable.
    pub fn raise_lambda(&mut self, config: &FitConfig) -> bool {
        let lambda = self.lambda * config.lambda_up;
        if lambda >= config.lambda_max || !lambda.is_finite() {
            self.lambda = config.lambda_max;
            false
        } else {
            self.lambda = lambda;
            true
        }
    }

    /// Multiply lambda by the down factor, not going below the minimum.
    pub fn lower_lambda(&mut self, config: &FitConfig) {
        self.lambda = (self.lambda * config.lambda_down).max(config.lambda_min);
    }

    /// Reset the solver state to its starting values.
    pub fn reset(&mut self, config: &FitConfig) {
        self.lambda = config.lambda_start;
        self.iterations = 0;
        self.reset_clamp(&config.clamp_start);
    }

    /// True if the AOI lies completely inside an image of the given size.
    pub fn aoi_in_bounds(&self, image_size_x: usize, image_size_y: usize) -> bool {
        let fits = |origin: isize, size: usize, limit: usize| {
            usize::try_from(origin)
                .ok()
                .and_then(|start| start.checked_add(size))
                .is_some_and(|end| end <= limit)
        };
        fits(self.xi, self.size_x, image_size_x) && fits(self.yi, self.size_y, image_size_y)
    }

    /// Number of pixels in the AOI.
    pub fn aoi_pixels(&self) -> usize {
        self.size_x * self.size_y
    }
}
