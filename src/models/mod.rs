//! Peak shape models.
//!
//! The fit context is shape-agnostic: everything that depends on what a peak
//! looks like (rendering, derivatives, validity, parameter update, AOI
//! geometry) is delegated to a [`PeakShape`] implementation. The crate
//! provides a 2-D Gaussian PSF; other shapes (e.g. cubic splines) plug in by
//! implementing the trait and, when they need per-peak state, adding a
//! variant to [`PeakModelData`].

use ndarray::{Array1, Array2};

use crate::aoi::FitImage;
use crate::diagnostics::FitFault;
use crate::peak::{PeakData, NFITTING};

pub mod gaussian;

pub use gaussian::{GaussianPeakData, GaussianPsf, GaussianWidth};

/// Shape model specific data owned by each peak.
///
/// The data lives and dies with the [`PeakData`] that owns it.
#[derive(Debug, Clone, Default)]
pub enum PeakModelData {
    /// The model keeps no per-peak data.
    #[default]
    None,

    /// Per-axis terms of a Gaussian peak.
    Gaussian(GaussianPeakData),
}

/// A trait representing a peak shape that can be fit.
///
/// All methods operate on a single peak. The image passed in gives read
/// access to the data, the sCMOS term and the current accumulators.
pub trait PeakShape {
    /// Short name of the model, used in log messages.
    fn name(&self) -> &str;

    /// Indices (see [`crate::peak`]) of the parameters that are fit, in
    /// Jacobian column order.
    fn fitting_params(&self) -> &[usize];

    /// Number of terms in the Jacobian.
    fn jac_size(&self) -> usize {
        self.fitting_params().len()
    }

    /// Fill in model specific starting values (e.g. widths) for a peak that
    /// is seeded from a position only.
    fn init_params(&self, _params: &mut [f64; NFITTING]) {}

    /// Set up the AOI and model data of a new peak from its parameters.
    fn init_peak(&self, peak: &mut PeakData, image: &FitImage);

    /// Render the peak into `peak.psf` using its current parameters and AOI.
    fn calc_peak_shape(&self, peak: &mut PeakData, image: &FitImage);

    /// Accumulate the Jacobian and Hessian of the weighted error.
    ///
    /// `jacobian` and `hessian` are zeroed by the caller and sized
    /// [`PeakShape::jac_size`]. The peak is expected to be rendered and added
    /// to the image.
    fn calc_jh(
        &self,
        peak: &PeakData,
        image: &FitImage,
        jacobian: &mut Array1<f64>,
        hessian: &mut Array2<f64>,
    );

    /// Model specific validity check of the peak parameters.
    fn check(&self, _peak: &PeakData) -> Option<FitFault> {
        None
    }

    /// Move (and for some models resize) the AOI to follow the current
    /// parameters, subject to `hysteresis`.
    ///
    /// The new AOI is not checked against the image bounds here.
    fn update_aoi(&self, peak: &mut PeakData, image: &FitImage, hysteresis: f64);

    /// Apply the solver update `delta` and then follow it with the AOI.
    fn update(
        &self,
        peak: &mut PeakData,
        image: &FitImage,
        delta: &Array1<f64>,
        use_clamp: bool,
        hysteresis: f64,
    ) {
        for (col, &param) in self.fitting_params().iter().enumerate() {
            peak.update_param(param, delta[col], use_clamp);
        }
        self.update_aoi(peak, image, hysteresis);
    }
}
