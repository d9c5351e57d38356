//! The fit context and the peak lifecycle operations.
//!
//! A [`FitContext`] owns the image buffers, the peaks and the diagnostics of
//! one fit. The iteration algorithms live in [`crate::lm::algorithm`] and
//! [`crate::lm::original`]; this module handles everything around them:
//! adding peaks, querying and forcing their state, recentering and pruning.

use ndarray::{Array1, Array2};
use std::fmt;
use std::str::FromStr;

use crate::aoi::FitImage;
use crate::diagnostics::{FitDiagnostics, FitFault};
use crate::error::{PeakFitError, Result};
use crate::lm::config::{FitConfig, FitStrategy};
use crate::lm::convergence::{ConvergenceCriteria, PeakStatus};
use crate::models::PeakShape;
use crate::peak::{
    width_to_sigma, PeakData, BACKGROUND, HEIGHT, NFITTING, XCENTER, XWIDTH, YCENTER, YWIDTH,
    ZCENTER,
};

/// Per-peak quantities that can be queried with [`FitContext::peak_property`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeakProperty {
    Background,
    Error,
    Height,
    X,
    /// σ in x, derived from the width parameter.
    XWidth,
    Y,
    /// σ in y, derived from the width parameter.
    YWidth,
    Z,
    Iterations,
    Lambda,
}

impl FromStr for PeakProperty {
    type Err = PeakFitError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "background" => Ok(PeakProperty::Background),
            "error" => Ok(PeakProperty::Error),
            "height" => Ok(PeakProperty::Height),
            "x" => Ok(PeakProperty::X),
            "xwidth" => Ok(PeakProperty::XWidth),
            "y" => Ok(PeakProperty::Y),
            "ywidth" => Ok(PeakProperty::YWidth),
            "z" => Ok(PeakProperty::Z),
            "iterations" => Ok(PeakProperty::Iterations),
            "lambda" => Ok(PeakProperty::Lambda),
            other => Err(PeakFitError::InvalidParameter(format!(
                "unrecognized peak property '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for PeakProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeakProperty::Background => "background",
            PeakProperty::Error => "error",
            PeakProperty::Height => "height",
            PeakProperty::X => "x",
            PeakProperty::XWidth => "xwidth",
            PeakProperty::Y => "y",
            PeakProperty::YWidth => "ywidth",
            PeakProperty::Z => "z",
            PeakProperty::Iterations => "iterations",
            PeakProperty::Lambda => "lambda",
        };
        write!(f, "{}", name)
    }
}

/// State of a multi-peak fit of one image.
///
/// The context is generic over the peak shape so that the per-pixel model
/// calls are statically dispatched.
#[derive(Debug, Clone)]
pub struct FitContext<M: PeakShape> {
    pub(crate) model: M,
    pub(crate) image: FitImage,
    pub(crate) peaks: Vec<PeakData>,
    pub(crate) max_nfit: usize,
    pub(crate) working_peak: Option<PeakData>,
    pub(crate) next_index: usize,
    pub(crate) config: FitConfig,
    pub(crate) criteria: ConvergenceCriteria,
    pub(crate) diagnostics: FitDiagnostics,
    pub(crate) clamp_warned: bool,
}

impl<M: PeakShape> FitContext<M> {
    /// Create a fit context.
    ///
    /// # Arguments
    ///
    /// * `model` - The peak shape
    /// * `image` - The image to fit, indexed `[[y, x]]`
    /// * `scmos_term` - Per-pixel variance / gain², same shape as `image`
    /// * `config` - Fitting constants
    ///
    /// # Returns
    ///
    /// * A context with no peaks, or an error if the inputs are unusable
    pub fn new(
        model: M,
        image: Array2<f64>,
        scmos_term: Array2<f64>,
        config: FitConfig,
    ) -> Result<Self> {
        config.validate()?;
        let image = FitImage::new(image, scmos_term)?;
        let criteria = ConvergenceCriteria::new(config.tolerance, config.error_floor);

        Ok(Self {
            model,
            image,
            peaks: Vec::new(),
            max_nfit: 0,
            working_peak: None,
            next_index: 0,
            config,
            criteria,
            diagnostics: FitDiagnostics::default(),
            clamp_warned: false,
        })
    }

    /// The peak shape model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// The fitting constants.
    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// The image buffers and accumulators.
    pub fn image(&self) -> &FitImage {
        &self.image
    }

    /// All peaks, including those in the error state.
    pub fn peaks(&self) -> &[PeakData] {
        &self.peaks
    }

    /// Number of peaks.
    pub fn nfit(&self) -> usize {
        self.peaks.len()
    }

    /// Number of peaks that fit in the current storage.
    pub fn max_nfit(&self) -> usize {
        self.max_nfit
    }

    /// Counters collected so far.
    pub fn diagnostics(&self) -> &FitDiagnostics {
        &self.diagnostics
    }

    /// The current fit image (summed foreground of the added peaks).
    pub fn fit_image(&self) -> Array2<f64> {
        self.image.f_data().to_owned()
    }

    /// Image minus the fit foreground.
    pub fn residual(&self) -> Array2<f64> {
        &self.image.x_data() - &self.image.f_data()
    }

    /// Mean background of the covering peaks at every pixel.
    pub fn background_model(&self) -> Array2<f64> {
        self.image.background_model()
    }

    /// Replace the image. All peaks are discarded and the accumulators reset.
    pub fn new_image(&mut self, image: Array2<f64>) -> Result<()> {
        if image.iter().any(|v| !v.is_finite()) {
            return Err(PeakFitError::InvalidInput(
                "image contains non-finite values".to_string(),
            ));
        }
        self.image.replace_image(image)?;
        self.peaks.clear();
        self.working_peak = None;
        Ok(())
    }

    /// Replace the background estimate used to seed new peaks.
    pub fn new_background(&mut self, background: Array2<f64>) -> Result<()> {
        self.image.replace_background(background)
    }

    /// Set the offsets between the peak center parameters and pixel centers.
    ///
    /// Existing peaks pick up the new offsets the next time they are rendered.
    pub fn set_offsets(&mut self, xoff: f64, yoff: f64, zoff: f64) {
        self.image.xoff = xoff;
        self.image.yoff = yoff;
        self.image.zoff = zoff;
    }

    /// Grow peak storage in whole increments so that `n_new` more peaks fit.
    fn reserve_peaks(&mut self, n_new: usize) {
        let needed = self.peaks.len() + n_new;
        if needed <= self.max_nfit {
            return;
        }
        let increment = self.config.storage_increment;
        let n_alloc = increment * (needed / increment + 1);
        log::debug!("Growing peak storage from {} to {}", self.max_nfit, n_alloc);
        self.peaks.reserve_exact(n_alloc - self.peaks.len());
        self.max_nfit = n_alloc;
    }

    /// Add peaks with full starting parameters.
    ///
    /// Each peak starts Running with fresh solver state. A peak that fails
    /// the validity checks (AOI outside the image, negative height, model
    /// check) is stored in the error state and never added to the image.
    /// The starting errors are computed once all the new peaks are added.
    pub fn new_peaks(&mut self, params: &[[f64; NFITTING]]) -> Result<()> {
        if params.iter().flatten().any(|v| !v.is_finite()) {
            return Err(PeakFitError::InvalidInput(
                "peak parameters must be finite".to_string(),
            ));
        }
        self.reserve_peaks(params.len());

        let start = self.peaks.len();
        for p in params {
            let mut peak = PeakData::new(self.next_index, *p, &self.config);
            self.next_index += 1;
            self.model.init_peak(&mut peak, &self.image);

            if let Some(fault) = self.check_peak(&peak) {
                log::debug!("New peak {} rejected: {}", peak.index, fault);
                self.diagnostics.record(fault);
                peak.status = PeakStatus::Error;
            } else {
                self.add_peak(&mut peak);
            }
            self.peaks.push(peak);
        }

        for i in start..self.peaks.len() {
            if self.peaks[i].status == PeakStatus::Error {
                continue;
            }
            let error = match self.image.peak_error(&self.peaks[i]) {
                Ok(error) => error,
                Err(fault) => {
                    self.diagnostics.record(fault);
                    f64::INFINITY
                }
            };
            self.peaks[i].error = error;
        }
        Ok(())
    }

    /// Add peaks from positions `(x, y, z)` only.
    ///
    /// The background is read from the background estimate at the peak
    /// center, the widths come from the model and the height from
    /// [`FitContext::estimate_peak_height`].
    pub fn new_peaks_at(&mut self, positions: &[(f64, f64, f64)]) -> Result<()> {
        let mut params = Vec::with_capacity(positions.len());
        for &(x, y, z) in positions {
            if !(x.is_finite() && y.is_finite() && z.is_finite()) {
                return Err(PeakFitError::InvalidInput(
                    "peak positions must be finite".to_string(),
                ));
            }
            let mut p = [0.0; NFITTING];
            p[XCENTER] = x;
            p[YCENTER] = y;
            p[ZCENTER] = z;
            self.model.init_params(&mut p);
            p[BACKGROUND] = self.background_at(x, y);

            let mut probe = PeakData::new(0, p, &self.config);
            self.model.init_peak(&mut probe, &self.image);
            p[HEIGHT] = self.estimate_peak_height(&probe);
            params.push(p);
        }
        self.new_peaks(&params)
    }

    fn background_at(&self, x: f64, y: f64) -> f64 {
        let col = (x + self.image.xoff).round();
        let row = (y + self.image.yoff).round();
        let max_col = (self.image.size_x() - 1) as f64;
        let max_row = (self.image.size_y() - 1) as f64;
        let col = col.clamp(0.0, max_col) as usize;
        let row = row.clamp(0.0, max_row) as usize;
        self.image.bg_estimate()[[row, col]]
    }

    /// Estimate the height of a peak that is not yet added to the image.
    ///
    /// This is the weighted least-squares projection of the image minus the
    /// current foreground and the peak background onto the unit-height
    /// shape, never less than the configured minimum height.
    pub fn estimate_peak_height(&self, peak: &PeakData) -> f64 {
        let minimum = self.config.minimum_height;
        if !peak.aoi_in_bounds(self.image.size_x(), self.image.size_y()) {
            return minimum;
        }

        let mut unit = peak.clone();
        unit.params[HEIGHT] = 1.0;
        self.model.calc_peak_shape(&mut unit, &self.image);

        let x_data = self.image.x_data();
        let f_data = self.image.f_data();
        let scmos = self.image.scmos_term();
        let background = peak.params[BACKGROUND];

        let mut num = 0.0;
        let mut den = 0.0;
        for ((j, k), s) in unit.psf.indexed_iter() {
            let row = peak.yi as usize + j;
            let col = peak.xi as usize + k;
            let w = 1.0 / scmos[[row, col]];
            num += w * s * (x_data[[row, col]] - f_data[[row, col]] - background);
            den += w * s * s;
        }

        if den > 0.0 && (num / den).is_finite() {
            (num / den).max(minimum)
        } else {
            minimum
        }
    }

    /// Move the AOI of every non-error peak to follow its center.
    ///
    /// A peak whose AOI moves is re-rendered and its error recomputed. A
    /// move that would leave the image is not applied.
    pub fn recenter_peaks(&mut self) {
        let hysteresis = self.config.hysteresis;
        for i in 0..self.peaks.len() {
            if self.peaks[i].status == PeakStatus::Error {
                continue;
            }

            let mut moved = self.peaks[i].clone();
            self.model.update_aoi(&mut moved, &self.image, hysteresis);
            let old = &self.peaks[i];
            if moved.xi == old.xi
                && moved.yi == old.yi
                && moved.size_x == old.size_x
                && moved.size_y == old.size_y
            {
                continue;
            }
            if !moved.aoi_in_bounds(self.image.size_x(), self.image.size_y()) {
                log::debug!("Peak {} not recentered, new AOI is outside the image", old.index);
                continue;
            }

            self.image.subtract_psf(&mut self.peaks[i]);
            moved.added = self.peaks[i].added;
            self.add_peak(&mut moved);
            match self.image.peak_error(&moved) {
                Ok(error) => moved.error = error,
                Err(fault) => self.diagnostics.record(fault),
            }
            self.peaks[i] = moved;
        }
    }

    /// Reset the solver state (lambda, clamps, iterations) of peak `i`.
    pub fn reset_peak(&mut self, i: usize) -> Result<()> {
        let nfit = self.peaks.len();
        let peak = self
            .peaks
            .get_mut(i)
            .ok_or(PeakFitError::IndexOutOfRange { index: i, nfit })?;
        peak.reset(&self.config);
        Ok(())
    }

    /// Reset the clamp values of every peak.
    pub fn reset_clamp_values(&mut self) {
        let mut bg_warning = false;
        for peak in self.peaks.iter_mut() {
            peak.reset_clamp(&self.config.clamp_start);
            if peak.clamp[BACKGROUND] < 1.0e-3 && !bg_warning {
                log::warn!("Background clamp is zero due to peak with zero background");
                bg_warning = true;
            }
        }
    }

    /// Remove the peaks in the error state, returning how many were removed.
    pub fn remove_error_peaks(&mut self) -> usize {
        for peak in self.peaks.iter_mut() {
            if peak.status == PeakStatus::Error && peak.added > 0 {
                log::warn!("Peak {} is in error state, but still in the image", peak.index);
                for _ in 0..peak.added {
                    self.image.subtract_psf(peak);
                }
            }
        }

        let before = self.peaks.len();
        self.peaks.retain(|p| p.status != PeakStatus::Error);
        let removed = before - self.peaks.len();
        self.diagnostics.n_lost += removed as u64;
        removed
    }

    /// Number of peaks that are still running.
    pub fn unconverged(&self) -> usize {
        self.peaks
            .iter()
            .filter(|p| p.status == PeakStatus::Running)
            .count()
    }

    /// Number of peaks in the error state.
    pub fn n_error(&self) -> usize {
        self.peaks
            .iter()
            .filter(|p| p.status == PeakStatus::Error)
            .count()
    }

    /// One value of `property` per peak.
    pub fn peak_property(&self, property: PeakProperty) -> Array1<f64> {
        self.peaks
            .iter()
            .map(|p| match property {
                PeakProperty::Background => p.params[BACKGROUND],
                PeakProperty::Error => p.error,
                PeakProperty::Height => p.params[HEIGHT],
                PeakProperty::X => p.params[XCENTER],
                PeakProperty::XWidth => width_to_sigma(p.params[XWIDTH]),
                PeakProperty::Y => p.params[YCENTER],
                PeakProperty::YWidth => width_to_sigma(p.params[YWIDTH]),
                PeakProperty::Z => p.params[ZCENTER],
                PeakProperty::Iterations => p.iterations as f64,
                PeakProperty::Lambda => p.lambda,
            })
            .collect()
    }

    /// Status of every peak.
    pub fn peak_status(&self) -> Vec<PeakStatus> {
        self.peaks.iter().map(|p| p.status).collect()
    }

    /// Set the status of every peak.
    pub fn set_peak_status(&mut self, status: &[PeakStatus]) -> Result<()> {
        if status.len() != self.peaks.len() {
            return Err(PeakFitError::DimensionMismatch(format!(
                "{} status values for {} peaks",
                status.len(),
                self.peaks.len()
            )));
        }
        for (i, &s) in status.iter().enumerate() {
            self.change_status(i, s);
        }
        Ok(())
    }

    /// Set the status of the peaks at positions `indices`.
    pub fn set_peak_status_at(&mut self, indices: &[usize], status: PeakStatus) -> Result<()> {
        let nfit = self.peaks.len();
        if let Some(&index) = indices.iter().find(|&&i| i >= nfit) {
            return Err(PeakFitError::IndexOutOfRange { index, nfit });
        }
        for &i in indices {
            self.change_status(i, status);
        }
        Ok(())
    }

    fn change_status(&mut self, i: usize, status: PeakStatus) {
        let peak = &mut self.peaks[i];
        match (peak.status, status) {
            (old, new) if old == new => {}
            (PeakStatus::Error, new) => {
                log::warn!(
                    "Peak {} is in the error state, ignoring change to {}",
                    peak.index,
                    new
                );
            }
            (_, PeakStatus::Error) => {
                self.image.subtract_psf(peak);
                peak.status = PeakStatus::Error;
            }
            (_, new) => peak.status = new,
        }
    }

    /// Run fitting rounds until every peak has stopped or `max_rounds` is
    /// reached. Returns the number of rounds run.
    pub fn iterate_until_converged(&mut self, strategy: FitStrategy, max_rounds: usize) -> usize {
        let mut rounds = 0;
        while rounds < max_rounds && self.unconverged() > 0 {
            match strategy {
                FitStrategy::LevenbergMarquardt => self.iterate_lm(),
                FitStrategy::Original => self.iterate_original(),
            }
            rounds += 1;
        }
        log::debug!(
            "{} rounds, {} running, {} in error",
            rounds,
            self.unconverged(),
            self.n_error()
        );
        rounds
    }

    /// Tear down the context, returning the final diagnostics.
    ///
    /// Peaks that are still running are counted as non-converged.
    pub fn cleanup(mut self) -> FitDiagnostics {
        self.diagnostics.n_non_converged += self.unconverged() as u64;
        log::info!(
            "{} peaks fit with {} ({} lost)\n{}",
            self.peaks.len(),
            self.model.name(),
            self.diagnostics.n_lost,
            self.diagnostics
        );
        self.diagnostics
    }

    /// Generic validity checks followed by the model check.
    pub(crate) fn check_peak(&self, peak: &PeakData) -> Option<FitFault> {
        if !peak.aoi_in_bounds(self.image.size_x(), self.image.size_y()) {
            return Some(FitFault::Margin);
        }
        if peak.params[HEIGHT] < 0.0 {
            return Some(FitFault::NegativeHeight);
        }
        self.model.check(peak)
    }

    /// Render `peak` and add it to the accumulators.
    pub(crate) fn add_peak(&mut self, peak: &mut PeakData) {
        self.model.calc_peak_shape(peak, &self.image);
        self.image.add_psf(peak);
    }
}
