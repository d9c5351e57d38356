//! Levenberg-Marquardt iteration over the peaks of a fit context.
//!
//! Every running peak is refined independently while all other peaks stay
//! in the accumulators, so a peak "sees" its neighbours as part of the fit
//! image. Each peak carries its own damping term `lambda`, which is lowered
//! after an accepted step and raised after every failed attempt. A peak
//! whose lambda reaches the maximum is considered unfittable and moved to
//! the error state.

use ndarray::{Array1, Array2};

use crate::context::FitContext;
use crate::diagnostics::FitFault;
use crate::lm::convergence::PeakStatus;
use crate::lm::solve::solve_with;
use crate::models::PeakShape;
use crate::peak::PeakData;

/// What happened to a peak in one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CycleOutcome {
    /// A step was accepted.
    Accepted,

    /// No step improved the error, but it stopped changing.
    ConvergedAtPrior,

    /// All attempts failed; the peak keeps its previous parameters.
    Exhausted,

    /// Lambda saturated; the peak is lost.
    Lost,
}

impl<M: PeakShape> FitContext<M> {
    /// Perform one Levenberg-Marquardt round over all running peaks.
    ///
    /// For each peak the Jacobian and Hessian are built once at the current
    /// parameters, then up to `max_cycles + 1` damped steps are tried until
    /// one of them lowers the peak error.
    pub fn iterate_lm(&mut self) {
        let n = self.model.jac_size();
        let mut jacobian = Array1::zeros(n);
        let mut hessian = Array2::zeros((n, n));

        for i in 0..self.peaks.len() {
            if self.peaks[i].status != PeakStatus::Running {
                continue;
            }

            // Copy the current peak into the working peak.
            let mut working = self.take_working_peak(i);

            // Jacobian and Hessian with the peak still in the image.
            jacobian.fill(0.0);
            hessian.fill(0.0);
            self.model
                .calc_jh(&working, &self.image, &mut jacobian, &mut hessian);

            // Current error, including the latest state of the neighbours.
            working.error = match self.image.peak_error(&working) {
                Ok(error) => error,
                Err(fault) => {
                    self.diagnostics.record(fault);
                    f64::INFINITY
                }
            };

            self.image.subtract_psf(&mut working);

            let outcome = self.lm_cycles(&mut working, &jacobian, &hessian);
            log::trace!(
                "Peak {}: {:?}, error {:.6e}, lambda {:.3e}",
                working.index,
                outcome,
                working.error,
                working.lambda
            );

            let expected = if working.status == PeakStatus::Error { 0 } else { 1 };
            if working.added != expected {
                log::warn!(
                    "Problem detected in peak addition / subtraction logic, \
                     peak {} status {} added {}",
                    working.index,
                    working.status,
                    working.added
                );
            }

            self.peaks[i].clone_from(&working);
            self.working_peak = Some(working);
        }
    }

    /// Damped attempts for one peak that has been subtracted from the image.
    ///
    /// On return the peak is added back unless it was lost.
    fn lm_cycles(
        &mut self,
        peak: &mut PeakData,
        jacobian: &Array1<f64>,
        hessian: &Array2<f64>,
    ) -> CycleOutcome {
        let current_error = peak.error;
        let use_clamp = self.config.use_clamp;
        let hysteresis = self.config.hysteresis;

        for cycle in 0..=self.config.max_cycles {
            self.diagnostics.n_iterations += 1;

            // Damp the diagonal of the Hessian.
            let mut w_hessian = hessian.clone();
            for k in 0..w_hessian.nrows() {
                w_hessian[[k, k]] *= 1.0 + peak.lambda;
            }

            let delta = match solve_with(self.config.solver, &w_hessian, jacobian) {
                Ok(delta) => delta,
                Err(err) => {
                    log::debug!("Peak {} cycle {}: {}", peak.index, cycle, err);
                    if !self.reject_attempt(peak, FitFault::Solver) {
                        return CycleOutcome::Lost;
                    }
                    continue;
                }
            };

            // Try the step on a copy, the peak itself keeps the prior parameters.
            let mut trial = peak.clone();
            self.model
                .update(&mut trial, &self.image, &delta, use_clamp, hysteresis);

            if let Some(fault) = self.check_peak(&trial) {
                if !self.reject_attempt(peak, fault) {
                    return CycleOutcome::Lost;
                }
                continue;
            }

            self.add_peak(&mut trial);
            let new_error = match self.image.peak_error(&trial) {
                Ok(error) => error,
                Err(fault) => {
                    self.image.subtract_psf(&mut trial);
                    if !self.reject_attempt(peak, fault) {
                        return CycleOutcome::Lost;
                    }
                    continue;
                }
            };

            if new_error < current_error {
                trial.lower_lambda(&self.config);
                trial.iterations += 1;
                trial.error = new_error;
                if self.criteria.check(current_error, new_error) {
                    trial.status = PeakStatus::Converged;
                }
                *peak = trial;
                return CycleOutcome::Accepted;
            }

            // Ties count as no improvement.
            self.image.subtract_psf(&mut trial);
            if self.criteria.check(current_error, new_error) {
                peak.iterations += 1;
                peak.status = PeakStatus::Converged;
                self.add_peak(peak);
                return CycleOutcome::ConvergedAtPrior;
            }
            if !self.reject_attempt(peak, FitFault::NonDecreasing) {
                return CycleOutcome::Lost;
            }
        }

        // The peak stays where it was and we try again next round.
        log::trace!("Peak {} reached max cycles with no improvement", peak.index);
        peak.iterations += 1;
        self.add_peak(peak);
        CycleOutcome::Exhausted
    }

    /// Record a failed attempt and raise lambda.
    ///
    /// Returns false, with the peak moved to the error state, once lambda
    /// has saturated.
    fn reject_attempt(&mut self, peak: &mut PeakData, fault: FitFault) -> bool {
        log::debug!("Peak {} attempt rejected: {}", peak.index, fault);
        self.diagnostics.record(fault);
        if peak.raise_lambda(&self.config) {
            return true;
        }
        log::debug!("Peak {} lost, lambda reached {:.1e}", peak.index, peak.lambda);
        peak.status = PeakStatus::Error;
        false
    }

    /// Copy peak `i` into the reusable working peak.
    pub(crate) fn take_working_peak(&mut self, i: usize) -> PeakData {
        match self.working_peak.take() {
            Some(mut working) => {
                working.clone_from(&self.peaks[i]);
                working
            }
            None => self.peaks[i].clone(),
        }
    }
}
