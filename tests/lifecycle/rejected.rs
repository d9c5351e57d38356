//! New peaks that can never be fitted are stored in the error state.

use approx::assert_relative_eq;
use ndarray::Array2;
use peakfit_rs::peak::{sigma_to_width, XCENTER, XWIDTH};
use peakfit_rs::{FitConfig, FitContext, FitStrategy, GaussianPsf, PeakStatus};

use crate::test_helpers::{flat_scmos, gaussian_image, gaussian_params, TruePeak};

fn context(model: GaussianPsf) -> FitContext<GaussianPsf> {
    FitContext::new(
        model,
        Array2::from_elem((20, 20), 10.0),
        flat_scmos(20, 20),
        FitConfig::default(),
    )
    .unwrap()
}

#[test_log::test]
fn test_center_far_outside_image() {
    let mut ctx = context(GaussianPsf::fixed(1.0));
    let w = sigma_to_width(1.0);
    ctx.new_peaks(&[
        [5.0, -1.0e20, w, 10.0, w, 10.0, 0.0],
        [5.0, 1.0e20, w, 10.0, w, 10.0, 0.0],
    ])
    .unwrap();

    assert_eq!(ctx.peak_status(), vec![PeakStatus::Error, PeakStatus::Error]);
    assert_eq!(ctx.diagnostics().n_margin, 2);
    assert!(ctx.peaks().iter().all(|p| p.added == 0));
    assert!(ctx.fit_image().iter().all(|v| *v == 0.0));
}

#[test_log::test]
fn test_tiny_width_is_rejected() {
    let mut ctx = context(GaussianPsf::variable(1.0));
    ctx.new_peaks(&[[5.0, 10.0, 1.0e-40, 10.0, 0.5, 10.0, 0.0]]).unwrap();

    assert_eq!(ctx.peak_status(), vec![PeakStatus::Error]);
    assert_eq!(ctx.diagnostics().n_margin, 1);
    assert_eq!(ctx.peaks()[0].added, 0);
}

#[test_log::test]
fn test_rejected_peak_does_not_disturb_fit() {
    let truth = [TruePeak { height: 100.0, x: 10.2, y: 9.7, sigma: 1.0 }];
    let image = gaussian_image(20, 20, 10.0, &truth);
    let mut ctx = FitContext::new(
        GaussianPsf::variable(1.0),
        image,
        flat_scmos(20, 20),
        FitConfig::default(),
    )
    .unwrap();
    let mut bad = gaussian_params(100.0, 10.0, 10.0, 1.0, 10.0);
    bad[XWIDTH] = 1.0e-40;
    ctx.new_peaks(&[gaussian_params(90.0, 10.0, 10.0, 1.0, 10.0), bad]).unwrap();
    assert_eq!(ctx.peak_status(), vec![PeakStatus::Running, PeakStatus::Error]);

    ctx.iterate_until_converged(FitStrategy::LevenbergMarquardt, 200);

    assert_eq!(ctx.remove_error_peaks(), 1);
    assert_eq!(ctx.peak_status(), vec![PeakStatus::Converged]);
    assert_relative_eq!(ctx.peaks()[0].params[XCENTER], 10.2, epsilon = 1e-3);
}
