//! Peak storage growth and image replacement.

use ndarray::Array2;
use peakfit_rs::lm::config::INCNPEAKS;
use peakfit_rs::{FitConfig, FitContext, GaussianPsf};

use crate::test_helpers::{flat_scmos, gaussian_params};

fn context(config: FitConfig) -> FitContext<GaussianPsf> {
    FitContext::new(
        GaussianPsf::fixed(1.0),
        Array2::from_elem((40, 40), 10.0),
        flat_scmos(40, 40),
        config,
    )
    .unwrap()
}

fn grid(n: usize) -> Vec<[f64; 7]> {
    (0..n)
        .map(|i| {
            let x = 6.0 + (i % 6) as f64 * 5.0;
            let y = 6.0 + (i / 6 % 6) as f64 * 5.0;
            gaussian_params(5.0, x, y, 1.0, 10.0)
        })
        .collect()
}

#[test]
fn test_default_storage_increment() {
    let mut ctx = context(FitConfig::default());
    assert_eq!(ctx.max_nfit(), 0);
    ctx.new_peaks(&grid(3)).unwrap();
    assert_eq!(ctx.max_nfit(), INCNPEAKS);
}

#[test]
fn test_storage_grows_in_increments() {
    let mut ctx = context(FitConfig::default().with_storage_increment(4));

    ctx.new_peaks(&grid(3)).unwrap();
    assert_eq!(ctx.nfit(), 3);
    assert_eq!(ctx.max_nfit(), 4);

    ctx.new_peaks(&grid(1)).unwrap();
    assert_eq!(ctx.max_nfit(), 4);

    ctx.new_peaks(&grid(1)).unwrap();
    assert_eq!(ctx.nfit(), 5);
    assert_eq!(ctx.max_nfit(), 8);

    ctx.new_peaks(&grid(9)).unwrap();
    assert_eq!(ctx.nfit(), 14);
    assert_eq!(ctx.max_nfit(), 16);
    assert!(ctx.nfit() <= ctx.max_nfit());
}

#[test]
fn test_new_image_resets_peaks_and_accumulators() {
    let mut ctx = context(FitConfig::default());
    ctx.new_peaks(&grid(4)).unwrap();
    assert!(ctx.fit_image().sum() > 0.0);

    ctx.new_image(Array2::from_elem((40, 40), 3.0)).unwrap();
    assert_eq!(ctx.nfit(), 0);
    assert!(ctx.fit_image().iter().all(|v| *v == 0.0));
    assert!(ctx.image().bg_counts().iter().all(|c| *c == 0));
    assert!(ctx.residual().iter().all(|v| *v == 3.0));

    assert!(ctx.new_image(Array2::zeros((4, 4))).is_err());
    assert!(ctx.new_background(Array2::zeros((4, 4))).is_err());
}
