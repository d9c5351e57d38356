//! Peak property queries and peaks seeded from positions.

use approx::assert_relative_eq;
use peakfit_rs::peak::{XWIDTH, YWIDTH};
use peakfit_rs::{FitConfig, FitContext, GaussianPsf, PeakProperty};

use crate::test_helpers::{flat_scmos, gaussian_image, gaussian_params, TruePeak};

#[test]
fn test_peak_property_values() {
    let image = gaussian_image(24, 24, 5.0, &[]);
    let mut ctx = FitContext::new(
        GaussianPsf::variable(1.0),
        image,
        flat_scmos(24, 24),
        FitConfig::default(),
    )
    .unwrap();
    ctx.new_peaks(&[
        gaussian_params(50.0, 8.5, 9.5, 1.5, 4.0),
        gaussian_params(70.0, 15.0, 14.0, 2.0, 6.0),
    ])
    .unwrap();

    let height = ctx.peak_property("height".parse().unwrap());
    assert_eq!(height.to_vec(), vec![50.0, 70.0]);
    assert_eq!(ctx.peak_property(PeakProperty::X).to_vec(), vec![8.5, 15.0]);
    assert_eq!(ctx.peak_property(PeakProperty::Y).to_vec(), vec![9.5, 14.0]);
    assert_eq!(ctx.peak_property(PeakProperty::Background).to_vec(), vec![4.0, 6.0]);
    assert_eq!(ctx.peak_property(PeakProperty::Z).to_vec(), vec![0.0, 0.0]);
    assert_eq!(ctx.peak_property(PeakProperty::Iterations).to_vec(), vec![0.0, 0.0]);
    assert_eq!(ctx.peak_property(PeakProperty::Lambda).to_vec(), vec![1.0, 1.0]);

    let xwidth = ctx.peak_property(PeakProperty::XWidth);
    assert_relative_eq!(xwidth[0], 1.5, epsilon = 1e-12);
    assert_relative_eq!(xwidth[1], 2.0, epsilon = 1e-12);

    // Width properties report σ, not the raw parameter.
    let raw = ctx.peaks()[0].params[YWIDTH];
    assert_relative_eq!(raw, 1.0 / (2.0 * 1.5 * 1.5), epsilon = 1e-12);
    assert_relative_eq!(ctx.peak_property(PeakProperty::YWidth)[0], 1.5, epsilon = 1e-12);
    assert_eq!(ctx.peaks()[1].params[XWIDTH], 0.125);

    let errors = ctx.peak_property(PeakProperty::Error);
    assert!(errors.iter().all(|e| *e > 0.0));
    assert!("fwhm".parse::<PeakProperty>().is_err());
}

#[test]
fn test_new_peaks_at_uses_background_and_model_width() {
    let truth = [TruePeak { height: 60.0, x: 11.0, y: 12.0, sigma: 1.3 }];
    let image = gaussian_image(24, 24, 7.0, &truth);
    let mut ctx = FitContext::new(
        GaussianPsf::variable(1.3),
        image,
        flat_scmos(24, 24),
        FitConfig::default(),
    )
    .unwrap();
    ctx.new_background(ndarray::Array2::from_elem((24, 24), 7.0)).unwrap();

    ctx.new_peaks_at(&[(11.0, 12.0, 0.5)]).unwrap();

    let peak = &ctx.peaks()[0];
    assert_relative_eq!(ctx.peak_property(PeakProperty::XWidth)[0], 1.3, epsilon = 1e-12);
    assert_relative_eq!(ctx.peak_property(PeakProperty::Background)[0], 7.0);
    assert_relative_eq!(ctx.peak_property(PeakProperty::Z)[0], 0.5);
    // Projecting the background-subtracted image recovers the true height.
    assert_relative_eq!(peak.params[0], 60.0, max_relative = 1e-3);
}
