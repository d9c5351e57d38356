//! The original, clamped fitting algorithm.

use approx::assert_relative_eq;
use ndarray::Array2;
use peakfit_rs::peak::{HEIGHT, NFITTING, XCENTER, YCENTER};
use peakfit_rs::{FitConfig, FitContext, FitStrategy, GaussianPsf, PeakProperty, PeakStatus};

use crate::test_helpers::{flat_scmos, gaussian_image, gaussian_params, BoxShape, TruePeak};

#[test_log::test]
fn test_original_algorithm_converges() {
    let truth = TruePeak { height: 100.0, x: 15.3, y: 16.7, sigma: 1.5 };
    let image = gaussian_image(32, 32, 10.0, &[truth]);
    let config = FitConfig::default().with_use_clamp(true);
    let mut ctx = FitContext::new(
        GaussianPsf::variable(1.5),
        image,
        flat_scmos(32, 32),
        config,
    )
    .unwrap();
    ctx.new_peaks(&[gaussian_params(90.0, 15.5, 16.5, 1.4, 9.0)]).unwrap();

    let rounds = ctx.iterate_until_converged(FitStrategy::Original, 300);

    assert!(rounds < 300);
    assert_eq!(ctx.peak_status(), vec![PeakStatus::Converged]);
    assert_relative_eq!(ctx.peak_property(PeakProperty::X)[0], truth.x, epsilon = 0.01);
    assert_relative_eq!(ctx.peak_property(PeakProperty::Y)[0], truth.y, epsilon = 0.01);
    assert_relative_eq!(
        ctx.peak_property(PeakProperty::XWidth)[0],
        truth.sigma,
        max_relative = 0.02
    );

    // The original algorithm does not adapt lambda.
    assert_eq!(ctx.peaks()[0].lambda, 1.0);
    assert_eq!(ctx.diagnostics().n_iterations as usize, ctx.peaks()[0].iterations);
}

#[test_log::test]
fn test_original_algorithm_drops_failed_peak() {
    // Without damping the first step takes the box peak off the image.
    let mut ctx = FitContext::new(
        BoxShape { gradient: [0.0, 1000.0] },
        Array2::from_elem((10, 10), 1.0),
        Array2::ones((10, 10)),
        FitConfig::default(),
    )
    .unwrap();
    let mut params = [0.0; NFITTING];
    params[HEIGHT] = 1.0;
    params[XCENTER] = 5.0;
    params[YCENTER] = 5.0;
    ctx.new_peaks(&[params]).unwrap();

    ctx.iterate_original();

    let peak = &ctx.peaks()[0];
    assert_eq!(peak.status, PeakStatus::Error);
    assert_eq!(peak.added, 0);
    assert_eq!(peak.iterations, 0);
    assert_eq!(ctx.diagnostics().n_margin, 1);
    assert_eq!(ctx.diagnostics().n_iterations, 1);
    assert!(ctx.fit_image().iter().all(|v| *v == 0.0));
}
