//! A single isolated peak.

use approx::assert_relative_eq;
use peakfit_rs::{
    FitConfig, FitContext, FitStrategy, GaussianPsf, PeakProperty, PeakStatus, SolverMethod,
};

use crate::test_helpers::{add_shot_noise, flat_scmos, gaussian_image, gaussian_params, TruePeak};

const TRUTH: TruePeak = TruePeak { height: 100.0, x: 15.3, y: 16.7, sigma: 1.5 };

fn fit(model: GaussianPsf, config: FitConfig, start_sigma: f64) -> FitContext<GaussianPsf> {
    let image = gaussian_image(32, 32, 10.0, &[TRUTH]);
    let mut ctx = FitContext::new(model, image, flat_scmos(32, 32), config).unwrap();
    ctx.new_peaks(&[gaussian_params(80.0, 15.7, 16.4, start_sigma, 8.0)]).unwrap();
    ctx.iterate_until_converged(FitStrategy::LevenbergMarquardt, 200);
    ctx
}

#[test_log::test]
fn test_single_peak_fixed_width() {
    let ctx = fit(GaussianPsf::fixed(1.5), FitConfig::default(), 1.5);

    assert_eq!(ctx.peak_status(), vec![PeakStatus::Converged]);
    assert_relative_eq!(ctx.peak_property(PeakProperty::X)[0], TRUTH.x, epsilon = 0.01);
    assert_relative_eq!(ctx.peak_property(PeakProperty::Y)[0], TRUTH.y, epsilon = 0.01);
    assert_relative_eq!(
        ctx.peak_property(PeakProperty::Height)[0],
        TRUTH.height,
        max_relative = 0.01
    );
    assert_relative_eq!(ctx.peak_property(PeakProperty::Background)[0], 10.0, epsilon = 0.1);

    let diagnostics = ctx.cleanup();
    assert!(diagnostics.n_iterations > 0);
    assert_eq!(diagnostics.n_lost, 0);
    assert_eq!(diagnostics.n_non_converged, 0);
}

#[test_log::test]
fn test_single_peak_variable_width() {
    let ctx = fit(GaussianPsf::variable(1.2), FitConfig::default(), 1.2);

    assert_eq!(ctx.peak_status(), vec![PeakStatus::Converged]);
    assert_relative_eq!(ctx.peak_property(PeakProperty::X)[0], TRUTH.x, epsilon = 0.01);
    assert_relative_eq!(ctx.peak_property(PeakProperty::Y)[0], TRUTH.y, epsilon = 0.01);
    assert_relative_eq!(
        ctx.peak_property(PeakProperty::XWidth)[0],
        TRUTH.sigma,
        max_relative = 0.02
    );
    assert_relative_eq!(
        ctx.peak_property(PeakProperty::YWidth)[0],
        TRUTH.sigma,
        max_relative = 0.02
    );

    // The AOI grew with the width.
    let peak = &ctx.peaks()[0];
    assert_eq!(peak.size_x, 13);
    assert!(peak.lambda >= ctx.config().lambda_min);
}

#[cfg(feature = "matrix")]
#[test_log::test]
fn test_single_peak_nalgebra_solver_agrees() {
    let native = fit(GaussianPsf::fixed(1.5), FitConfig::default(), 1.5);
    let nalgebra = fit(
        GaussianPsf::fixed(1.5),
        FitConfig::default().with_solver(SolverMethod::Nalgebra),
        1.5,
    );

    for property in [PeakProperty::X, PeakProperty::Y, PeakProperty::Height] {
        assert_relative_eq!(
            native.peak_property(property)[0],
            nalgebra.peak_property(property)[0],
            epsilon = 1e-4
        );
    }
}

#[test_log::test]
fn test_single_noisy_peak() {
    let truth = TruePeak { height: 500.0, ..TRUTH };
    let image = add_shot_noise(&gaussian_image(32, 32, 10.0, &[truth]), 42);
    let mut ctx = FitContext::new(
        GaussianPsf::variable(1.5),
        image,
        flat_scmos(32, 32),
        FitConfig::default(),
    )
    .unwrap();
    ctx.new_peaks(&[gaussian_params(400.0, 15.6, 16.5, 1.5, 10.0)]).unwrap();

    let rounds = ctx.iterate_until_converged(FitStrategy::LevenbergMarquardt, 200);

    assert!(rounds < 200);
    assert_eq!(ctx.n_error(), 0);
    assert_relative_eq!(ctx.peak_property(PeakProperty::X)[0], truth.x, epsilon = 0.1);
    assert_relative_eq!(ctx.peak_property(PeakProperty::Y)[0], truth.y, epsilon = 0.1);
    assert_relative_eq!(
        ctx.peak_property(PeakProperty::Height)[0],
        truth.height,
        max_relative = 0.1
    );
}
