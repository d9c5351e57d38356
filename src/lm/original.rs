//! The original (legacy) fitting iteration.
//!
//! Unlike [`FitContext::iterate_lm`] there is no damping and no retry: every
//! running peak takes one Newton step per round, limited only by the clamp
//! values, and a peak that fails any check is dropped immediately. Errors are
//! computed in a second pass, after all peaks have moved.
//!
//! A peak whose fit intensity goes negative is not discarded but stays
//! running with its previous error.

use ndarray::{Array1, Array2};

use crate::context::FitContext;
use crate::diagnostics::FitFault;
use crate::lm::convergence::PeakStatus;
use crate::lm::solve::solve_with;
use crate::models::PeakShape;

impl<M: PeakShape> FitContext<M> {
    /// Perform one round of the original fitting algorithm.
    pub fn iterate_original(&mut self) {
        if !self.config.use_clamp && !self.clamp_warned {
            log::warn!("Original fitting algorithm without clamping, is this a mistake?");
            self.clamp_warned = true;
        }

        let n = self.model.jac_size();
        let mut jacobian = Array1::zeros(n);
        let mut hessian = Array2::zeros((n, n));
        let use_clamp = self.config.use_clamp;
        let hysteresis = self.config.hysteresis;

        // 1. Calculate updated peaks.
        for i in 0..self.peaks.len() {
            if self.peaks[i].status != PeakStatus::Running {
                continue;
            }

            let mut working = self.take_working_peak(i);

            jacobian.fill(0.0);
            hessian.fill(0.0);
            self.model
                .calc_jh(&working, &self.image, &mut jacobian, &mut hessian);
            self.image.subtract_psf(&mut working);
            self.diagnostics.n_iterations += 1;

            let fault = match solve_with(self.config.solver, &hessian, &jacobian) {
                Ok(delta) => {
                    self.model
                        .update(&mut working, &self.image, &delta, use_clamp, hysteresis);
                    self.check_peak(&working)
                }
                Err(err) => {
                    log::debug!("Peak {}: {}", working.index, err);
                    Some(FitFault::Solver)
                }
            };

            match fault {
                Some(fault) => {
                    // Drop this peak from the analysis.
                    log::debug!("Peak {} lost: {}", working.index, fault);
                    self.diagnostics.record(fault);
                    working.status = PeakStatus::Error;
                }
                None => {
                    self.add_peak(&mut working);
                    working.iterations += 1;
                }
            }

            self.peaks[i].clone_from(&working);
            self.working_peak = Some(working);
        }

        // 2. Calculate peak errors.
        for i in 0..self.peaks.len() {
            if self.peaks[i].status != PeakStatus::Running {
                continue;
            }
            match self.image.peak_error(&self.peaks[i]) {
                Ok(error) => {
                    let peak = &mut self.peaks[i];
                    let old_error = peak.error;
                    peak.error = error;
                    if self.criteria.check(old_error, error) {
                        peak.status = PeakStatus::Converged;
                    }
                }
                Err(fault) => self.diagnostics.record(fault),
            }
        }
    }
}
