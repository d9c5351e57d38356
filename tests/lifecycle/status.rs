//! Forcing peak status from outside the iteration engine.

use peakfit_rs::{FitConfig, FitContext, GaussianPsf, PeakFitError, PeakStatus};

use crate::test_helpers::{flat_scmos, gaussian_image, gaussian_params, TruePeak};

fn context() -> FitContext<GaussianPsf> {
    let truth = [
        TruePeak { height: 100.0, x: 8.0, y: 8.0, sigma: 1.0 },
        TruePeak { height: 100.0, x: 20.0, y: 9.0, sigma: 1.0 },
    ];
    let image = gaussian_image(30, 20, 10.0, &truth);
    let mut ctx = FitContext::new(
        GaussianPsf::fixed(1.0),
        image,
        flat_scmos(30, 20),
        FitConfig::default(),
    )
    .unwrap();
    ctx.new_peaks(&[
        gaussian_params(100.0, 8.0, 8.0, 1.0, 10.0),
        gaussian_params(100.0, 20.0, 9.0, 1.0, 10.0),
    ])
    .unwrap();
    ctx
}

#[test_log::test]
fn test_set_peak_status_all() {
    let mut ctx = context();
    ctx.set_peak_status(&[PeakStatus::Converged, PeakStatus::Error]).unwrap();

    assert_eq!(ctx.peak_status(), vec![PeakStatus::Converged, PeakStatus::Error]);
    assert_eq!(ctx.unconverged(), 0);
    assert_eq!(ctx.n_error(), 1);
    assert_eq!(ctx.peaks()[0].added, 1);
    assert_eq!(ctx.peaks()[1].added, 0);

    // Converged peaks can be restarted.
    ctx.set_peak_status(&[PeakStatus::Running, PeakStatus::Error]).unwrap();
    assert_eq!(ctx.unconverged(), 1);

    assert!(matches!(
        ctx.set_peak_status(&[PeakStatus::Running]),
        Err(PeakFitError::DimensionMismatch(_))
    ));
}

#[test_log::test]
fn test_error_peaks_cannot_be_revived() {
    let mut ctx = context();
    ctx.set_peak_status_at(&[0], PeakStatus::Error).unwrap();
    let f = ctx.fit_image();

    ctx.set_peak_status_at(&[0], PeakStatus::Running).unwrap();
    assert_eq!(ctx.peaks()[0].status, PeakStatus::Error);
    assert_eq!(ctx.peaks()[0].added, 0);
    assert_eq!(ctx.fit_image(), f);

    // Setting Error twice does not subtract twice.
    ctx.set_peak_status_at(&[0], PeakStatus::Error).unwrap();
    assert_eq!(ctx.fit_image(), f);
}

#[test_log::test]
fn test_set_peak_status_at_checks_indices() {
    let mut ctx = context();
    assert!(matches!(
        ctx.set_peak_status_at(&[1, 2], PeakStatus::Converged),
        Err(PeakFitError::IndexOutOfRange { index: 2, nfit: 2 })
    ));
    // Nothing changes when an index is invalid.
    assert_eq!(ctx.unconverged(), 2);
}

#[test_log::test]
fn test_cleanup_counts_running_peaks() {
    let mut ctx = context();
    ctx.set_peak_status_at(&[1], PeakStatus::Converged).unwrap();
    let diagnostics = ctx.cleanup();
    assert_eq!(diagnostics.n_non_converged, 1);
    assert_eq!(diagnostics.n_lost, 0);
}
