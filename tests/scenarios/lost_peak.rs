//! A peak that cannot be fit is dropped without disturbing its neighbour.

use approx::assert_relative_eq;
use peakfit_rs::{FitConfig, FitContext, FitStrategy, GaussianPsf, PeakProperty, PeakStatus};

use crate::test_helpers::{
    flat_scmos, gaussian_image, gaussian_params, sum_of_rendered_peaks, TruePeak,
};

#[test_log::test]
fn test_negative_height_peak_is_lost() {
    let truth = [TruePeak { height: 100.0, x: 10.4, y: 9.8, sigma: 1.2 }];
    let image = gaussian_image(32, 32, 10.0, &truth);
    let mut ctx = FitContext::new(
        GaussianPsf::fixed(1.2),
        image,
        flat_scmos(32, 32),
        FitConfig::default(),
    )
    .unwrap();
    ctx.new_peaks(&[
        gaussian_params(90.0, 10.0, 10.0, 1.2, 10.0),
        gaussian_params(-50.0, 22.0, 20.0, 1.2, 10.0),
    ])
    .unwrap();

    assert_eq!(ctx.peak_status(), vec![PeakStatus::Running, PeakStatus::Error]);
    assert_eq!(ctx.diagnostics().n_neg_height, 1);
    assert_eq!(ctx.peaks()[1].added, 0);

    ctx.iterate_until_converged(FitStrategy::LevenbergMarquardt, 200);
    assert_eq!(ctx.peaks()[0].status, PeakStatus::Converged);

    assert_eq!(ctx.remove_error_peaks(), 1);
    assert_eq!(ctx.nfit(), 1);
    assert_eq!(ctx.n_error(), 0);
    assert_eq!(ctx.diagnostics().n_lost, 1);

    // Only the surviving peak is in the fit image.
    let expected = sum_of_rendered_peaks(ctx.peaks(), 32, 32);
    for (f, e) in ctx.fit_image().iter().zip(expected.iter()) {
        assert_relative_eq!(*f, *e, epsilon = 1e-8);
    }
    assert_eq!(ctx.fit_image()[[20, 22]], 0.0);
    assert_relative_eq!(ctx.peak_property(PeakProperty::X)[0], 10.4, epsilon = 0.01);

    let diagnostics = ctx.cleanup();
    assert_eq!(diagnostics.n_lost, 1);
}
