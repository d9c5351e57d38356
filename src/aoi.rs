//! Image buffers and area-of-interest (AOI) accumulator bookkeeping.
//!
//! All peaks share three accumulators laid over the image:
//!
//! - `f_data`: the summed foreground (rendered peak shapes),
//! - `bg_data`: the summed background parameters of the covering peaks,
//! - `bg_counts`: how many added peaks cover each pixel.
//!
//! At any quiescent point `f_data[p]` equals the sum of the rendered
//! intensity at `p` of every peak that is currently added. A peak is
//! subtracted before any change that affects its rendered shape and added
//! back afterwards, so one peak can be perturbed without re-rendering the
//! others. The fit value of a pixel is `f_data + bg_data / bg_counts`.

use ndarray::{s, Array2, ArrayView2};

use crate::diagnostics::FitFault;
use crate::error::{PeakFitError, Result};
use crate::peak::PeakData;

/// Image data, noise term and shared accumulators of one fit.
#[derive(Debug, Clone)]
pub struct FitImage {
    x_data: Array2<f64>,
    scmos_term: Array2<f64>,
    bg_estimate: Array2<f64>,
    f_data: Array2<f64>,
    bg_data: Array2<f64>,
    bg_counts: Array2<u32>,

    /// Offset between the peak center parameter in x and the pixel center.
    pub xoff: f64,
    /// Offset between the peak center parameter in y and the pixel center.
    pub yoff: f64,
    /// Offset between the peak center parameter in z and the actual center.
    pub zoff: f64,
}

impl FitImage {
    /// Create the buffers for an image and its per-pixel sCMOS term
    /// (variance / gain²). Arrays are indexed `[[y, x]]`.
    ///
    /// # Errors
    ///
    /// * `PeakFitError::InvalidInput` if the image is empty or the sCMOS term
    ///   is not strictly positive and finite everywhere
    /// * `PeakFitError::DimensionMismatch` if the shapes differ
    pub fn new(x_data: Array2<f64>, scmos_term: Array2<f64>) -> Result<Self> {
        if x_data.is_empty() {
            return Err(PeakFitError::InvalidInput("image has no pixels".to_string()));
        }
        if x_data.dim() != scmos_term.dim() {
            return Err(PeakFitError::DimensionMismatch(format!(
                "image is {:?}, sCMOS term is {:?}",
                x_data.dim(),
                scmos_term.dim()
            )));
        }
        if scmos_term.iter().any(|v| !(*v > 0.0) || !v.is_finite()) {
            return Err(PeakFitError::InvalidInput(
                "sCMOS term must be positive and finite".to_string(),
            ));
        }
        if x_data.iter().any(|v| !v.is_finite()) {
            return Err(PeakFitError::InvalidInput(
                "image contains non-finite values".to_string(),
            ));
        }

        let dim = x_data.dim();
        Ok(Self {
            x_data,
            scmos_term,
            bg_estimate: Array2::zeros(dim),
            f_data: Array2::zeros(dim),
            bg_data: Array2::zeros(dim),
            bg_counts: Array2::zeros(dim),
            xoff: 0.0,
            yoff: 0.0,
            zoff: 0.0,
        })
    }

    /// Size in x (fast axis).
    pub fn size_x(&self) -> usize {
        self.x_data.ncols()
    }

    /// Size in y (slow axis).
    pub fn size_y(&self) -> usize {
        self.x_data.nrows()
    }

    /// The image data.
    pub fn x_data(&self) -> ArrayView2<'_, f64> {
        self.x_data.view()
    }

    /// The sCMOS term.
    pub fn scmos_term(&self) -> ArrayView2<'_, f64> {
        self.scmos_term.view()
    }

    /// The externally supplied background estimate.
    pub fn bg_estimate(&self) -> ArrayView2<'_, f64> {
        self.bg_estimate.view()
    }

    /// The summed foreground of all added peaks.
    pub fn f_data(&self) -> ArrayView2<'_, f64> {
        self.f_data.view()
    }

    /// The summed background of all added peaks.
    pub fn bg_data(&self) -> ArrayView2<'_, f64> {
        self.bg_data.view()
    }

    /// Number of added peaks covering each pixel.
    pub fn bg_counts(&self) -> ArrayView2<'_, u32> {
        self.bg_counts.view()
    }

    /// Current fit value (foreground plus mean background) of a pixel.
    pub fn fit_value(&self, row: usize, col: usize) -> f64 {
        let counts = self.bg_counts[[row, col]];
        if counts == 0 {
            self.f_data[[row, col]]
        } else {
            self.f_data[[row, col]] + self.bg_data[[row, col]] / f64::from(counts)
        }
    }

    /// Mean background of the covering peaks, zero where no peak is added.
    pub fn background_model(&self) -> Array2<f64> {
        let mut bg = Array2::zeros(self.bg_data.dim());
        ndarray::Zip::from(&mut bg)
            .and(&self.bg_data)
            .and(&self.bg_counts)
            .for_each(|out, &sum, &counts| {
                if counts > 0 {
                    *out = sum / f64::from(counts);
                }
            });
        bg
    }

    pub(crate) fn replace_image(&mut self, x_data: Array2<f64>) -> Result<()> {
        if x_data.dim() != self.x_data.dim() {
            return Err(PeakFitError::DimensionMismatch(format!(
                "new image is {:?}, expected {:?}",
                x_data.dim(),
                self.x_data.dim()
            )));
        }
        self.x_data = x_data;
        self.reset_accumulators();
        Ok(())
    }

    pub(crate) fn replace_background(&mut self, background: Array2<f64>) -> Result<()> {
        if background.dim() != self.x_data.dim() {
            return Err(PeakFitError::DimensionMismatch(format!(
                "background is {:?}, expected {:?}",
                background.dim(),
                self.x_data.dim()
            )));
        }
        self.bg_estimate = background;
        Ok(())
    }

    pub(crate) fn reset_accumulators(&mut self) {
        self.f_data.fill(0.0);
        self.bg_data.fill(0.0);
        self.bg_counts.fill(0);
    }

    /// Add the peak's cached rendering and background to the accumulators.
    ///
    /// The peak must already be rendered for its current AOI.
    pub(crate) fn add_psf(&mut self, peak: &mut PeakData) {
        if !self.psf_fits(peak) {
            log::warn!(
                "Peak {} not added, AOI ({}, {}) {}x{} does not match the image",
                peak.index,
                peak.xi,
                peak.yi,
                peak.size_x,
                peak.size_y
            );
            return;
        }
        let (rows, cols) = aoi_ranges(peak);
        let background = peak.params[crate::peak::BACKGROUND];

        let mut f = self.f_data.slice_mut(s![rows.clone(), cols.clone()]);
        f += &peak.psf;
        self.bg_data
            .slice_mut(s![rows.clone(), cols.clone()])
            .mapv_inplace(|v| v + background);
        self.bg_counts
            .slice_mut(s![rows, cols])
            .mapv_inplace(|c| c + 1);

        peak.added += 1;
    }

    /// Remove the peak's cached rendering and background from the accumulators.
    pub(crate) fn subtract_psf(&mut self, peak: &mut PeakData) {
        if peak.added == 0 {
            log::warn!("Peak {} subtracted but it is not in the image", peak.index);
            return;
        }
        if !self.psf_fits(peak) {
            log::warn!("Peak {} not subtracted, AOI does not match the image", peak.index);
            return;
        }
        let (rows, cols) = aoi_ranges(peak);
        let background = peak.params[crate::peak::BACKGROUND];

        let mut f = self.f_data.slice_mut(s![rows.clone(), cols.clone()]);
        f -= &peak.psf;
        self.bg_data
            .slice_mut(s![rows.clone(), cols.clone()])
            .mapv_inplace(|v| v - background);
        self.bg_counts
            .slice_mut(s![rows, cols])
            .mapv_inplace(|c| c.saturating_sub(1));

        peak.added -= 1;
    }

    /// Weighted error of the pixels covered by the peak.
    ///
    /// When peaks overlap substantially they will have similar errors, as
    /// this is the total error over the AOI and not the peak's share of it.
    pub fn peak_error(&self, peak: &PeakData) -> std::result::Result<f64, FitFault> {
        if !peak.aoi_in_bounds(self.size_x(), self.size_y()) {
            return Err(FitFault::Margin);
        }
        let (rows, cols) = aoi_ranges(peak);

        let mut err = 0.0;
        for row in rows {
            for col in cols.clone() {
                let fi = self.fit_value(row, col);
                if fi < 0.0 {
                    log::debug!(
                        "Negative f detected for peak {}: f {:.3}, fit {:.3}, bg {:.3}, counts {}",
                        peak.index,
                        fi,
                        self.f_data[[row, col]],
                        self.bg_data[[row, col]],
                        self.bg_counts[[row, col]]
                    );
                    return Err(FitFault::NegativeIntensity);
                }
                let diff = self.x_data[[row, col]] - fi;
                err += diff * diff / self.scmos_term[[row, col]];
            }
        }
        Ok(err)
    }

    fn psf_fits(&self, peak: &PeakData) -> bool {
        peak.aoi_in_bounds(self.size_x(), self.size_y())
            && peak.psf.dim() == (peak.size_y, peak.size_x)
    }
}

fn aoi_ranges(peak: &PeakData) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
    let y0 = peak.yi as usize;
    let x0 = peak.xi as usize;
    (y0..y0 + peak.size_y, x0..x0 + peak.size_x)
}

/// Largest AOI origin offset, in pixels, kept for any peak center.
const MAX_AOI_OFFSET: f64 = i32::MAX as f64;

/// AOI origin along one axis for a peak centered at `center` (pixels).
///
/// Centers far outside any image saturate, so the AOI fails the bounds
/// check instead of overflowing.
pub fn aoi_origin(center: f64, half_size: usize) -> isize {
    (center.round() - half_size as f64).clamp(-MAX_AOI_OFFSET, MAX_AOI_OFFSET) as isize
}

/// AOI origin along one axis with hysteresis.
///
/// The origin only moves when the center is at least `hysteresis` away from
/// the current AOI center `origin + half_size`.
pub fn hysteresis_origin(origin: isize, half_size: usize, center: f64, hysteresis: f64) -> isize {
    let aoi_center = origin as f64 + half_size as f64;
    if (center - aoi_center).abs() >= hysteresis {
        aoi_origin(center, half_size)
    } else {
        origin
    }
}

/// AOI half size along one axis for a desired (fractional) half size.
///
/// The size only changes when `target` is at least `hysteresis` away from
/// the current half size. The result is at least 1.
pub fn hysteresis_half_size(half_size: usize, target: f64, hysteresis: f64) -> usize {
    if !target.is_finite() {
        return half_size;
    }
    if (target - half_size as f64).abs() >= hysteresis {
        (target.round() as usize).max(1)
    } else {
        half_size
    }
}
