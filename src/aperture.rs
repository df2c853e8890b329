use anyhow::{bail, Result};
use tracing::debug;

use crate::background::BackgroundStats;
use crate::mask::Mask;

/// One aperture per sweep value, in the order the values were given:
/// the aperture mask, its pixel count, the summed background-subtracted
/// flux, and the propagated flux uncertainty.
#[derive(Debug, Clone)]
pub struct ApertureSweep {
    pub masks: Vec<Mask>,
    pub pixel_counts: Vec<usize>,
    pub flux: Vec<f64>,
    pub flux_error: Vec<f64>,
}

/// A peak-fraction sweep additionally reports the peak of the
/// background-subtracted object flux that the thresholds refer to.
#[derive(Debug, Clone)]
pub struct PeakFractionSweep {
    pub sweep: ApertureSweep,
    pub peak_flux: f64,
}

/// Variance of an aperture flux sum.
///
/// flux/bg_mean stands in for the effective photon count of the source,
/// so the three terms are source Poisson noise, background Poisson noise,
/// and the uncertainty of the subtracted mean background.
fn propagated_flux_error(flux_sum: f64, pixel_count: usize, background: &BackgroundStats) -> f64 {
    let n = pixel_count as f64;
    (flux_sum / background.mean * background.std_dev.powi(2)
        + n * background.std_dev.powi(2)
        + n * n * background.mean_error.powi(2))
    .sqrt()
}

fn check_background(background: &BackgroundStats) -> Result<()> {
    if background.mean == 0.0 || !background.mean.is_finite() {
        bail!(
            "Background mean {} cannot be used for error propagation",
            background.mean
        );
    }
    Ok(())
}

/// Aperture photometry with brightness-threshold selection.
///
/// Object-mask pixels are background-subtracted; for each fraction `t`
/// (sweep order preserved) the aperture keeps pixels whose subtracted
/// value reaches `t` times the peak subtracted value.
pub fn measure_by_peak_fraction(
    data: &[f64],
    object_mask: &Mask,
    fractions: &[f64],
    background: &BackgroundStats,
) -> Result<PeakFractionSweep> {
    let (w, h) = (object_mask.width(), object_mask.height());
    assert_eq!(data.len(), w * h);
    check_background(background)?;

    if object_mask.count_true() == 0 {
        bail!("Object mask is empty, nothing to measure");
    }

    let peak_flux = object_mask
        .iter_true()
        .map(|(x, y)| data[y * w + x] - background.mean)
        .fold(f64::NEG_INFINITY, f64::max);
    if peak_flux <= 0.0 {
        bail!(
            "Peak background-subtracted flux {:.4e} is not positive; \
             no aperture threshold can select a source",
            peak_flux
        );
    }

    let mut sweep = ApertureSweep {
        masks: Vec::with_capacity(fractions.len()),
        pixel_counts: Vec::with_capacity(fractions.len()),
        flux: Vec::with_capacity(fractions.len()),
        flux_error: Vec::with_capacity(fractions.len()),
    };

    for &fraction in fractions {
        let criterion = fraction * peak_flux;
        let mut mask = Mask::new(w, h);
        let mut pixel_count = 0usize;
        let mut flux_sum = 0.0;
        for (x, y) in object_mask.iter_true() {
            let value = data[y * w + x] - background.mean;
            if value >= criterion {
                mask.set(x, y, true);
                pixel_count += 1;
                flux_sum += value;
            }
        }
        let flux_error = propagated_flux_error(flux_sum, pixel_count, background);
        debug!(fraction, pixel_count, flux_sum, "peak-fraction aperture");

        sweep.masks.push(mask);
        sweep.pixel_counts.push(pixel_count);
        sweep.flux.push(flux_sum);
        sweep.flux_error.push(flux_error);
    }

    Ok(PeakFractionSweep { sweep, peak_flux })
}

/// Aperture photometry with fixed-radius selection.
///
/// Membership is purely geometric: object-mask pixels within `radius` of
/// `center`, regardless of brightness. The center is taken as given (not
/// recomputed) and must be in the same coordinate frame as `data`.
pub fn measure_by_radius(
    data: &[f64],
    object_mask: &Mask,
    radii: &[f64],
    center: (f64, f64),
    background: &BackgroundStats,
) -> Result<ApertureSweep> {
    let (w, h) = (object_mask.width(), object_mask.height());
    assert_eq!(data.len(), w * h);
    check_background(background)?;

    if object_mask.count_true() == 0 {
        bail!("Object mask is empty, nothing to measure");
    }

    let mut sweep = ApertureSweep {
        masks: Vec::with_capacity(radii.len()),
        pixel_counts: Vec::with_capacity(radii.len()),
        flux: Vec::with_capacity(radii.len()),
        flux_error: Vec::with_capacity(radii.len()),
    };

    for &radius in radii {
        let r_sq = radius * radius;
        let mut mask = Mask::new(w, h);
        let mut pixel_count = 0usize;
        let mut flux_sum = 0.0;
        for (x, y) in object_mask.iter_true() {
            let dx = x as f64 - center.0;
            let dy = y as f64 - center.1;
            if dx * dx + dy * dy <= r_sq {
                mask.set(x, y, true);
                pixel_count += 1;
                flux_sum += data[y * w + x] - background.mean;
            }
        }
        let flux_error = propagated_flux_error(flux_sum, pixel_count, background);
        debug!(radius, pixel_count, flux_sum, "fixed-radius aperture");

        sweep.masks.push(mask);
        sweep.pixel_counts.push(pixel_count);
        sweep.flux.push(flux_sum);
        sweep.flux_error.push(flux_error);
    }

    Ok(sweep)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_background() -> BackgroundStats {
        BackgroundStats {
            pixel_count: 100,
            mean: 10.0,
            mean_error: 0.5,
            std_dev: 2.0,
        }
    }

    /// 9x9 flat field at the background level with one bright pixel.
    fn single_source() -> (Vec<f64>, Mask) {
        let mut data = vec![10.0; 81];
        data[4 * 9 + 4] = 110.0;
        let mask = Mask::circular(9, 9, 4.0, 4.0, 3.0);
        (data, mask)
    }

    #[test]
    fn test_threshold_one_keeps_only_the_peak() {
        let (data, mask) = single_source();
        let result =
            measure_by_peak_fraction(&data, &mask, &[1.0], &flat_background()).unwrap();

        assert_eq!(result.peak_flux, 100.0);
        assert!(result.sweep.pixel_counts[0] >= 1);
        assert_eq!(result.sweep.pixel_counts[0], 1);
        assert_eq!(result.sweep.flux[0], 100.0);
        assert!(result.sweep.masks[0].get(4, 4));
    }

    #[test]
    fn test_lower_threshold_grows_the_aperture() {
        let (mut data, mask) = single_source();
        data[4 * 9 + 5] = 60.0; // half-peak neighbor

        let result = measure_by_peak_fraction(&data, &mask, &[0.4, 1.0], &flat_background())
            .unwrap();
        // Sweep order is preserved, not sorted
        assert_eq!(result.sweep.pixel_counts, vec![2, 1]);
        assert_eq!(result.sweep.flux, vec![150.0, 100.0]);
        assert!(result.sweep.pixel_counts[0] >= result.sweep.pixel_counts[1]);
    }

    #[test]
    fn test_error_propagation_terms() {
        let (data, mask) = single_source();
        let result =
            measure_by_peak_fraction(&data, &mask, &[1.0], &flat_background()).unwrap();

        // flux/mean * std^2 + n * std^2 + n^2 * mean_err^2
        // = 100/10 * 4 + 1 * 4 + 1 * 0.25 = 44.25
        assert!((result.sweep.flux_error[0] - 44.25_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_no_positive_peak_is_an_error() {
        let data = vec![10.0; 81];
        let mask = Mask::circular(9, 9, 4.0, 4.0, 3.0);
        assert!(measure_by_peak_fraction(&data, &mask, &[0.5], &flat_background()).is_err());
    }

    #[test]
    fn test_zero_background_mean_is_an_error() {
        let (data, mask) = single_source();
        let mut background = flat_background();
        background.mean = 0.0;
        assert!(measure_by_peak_fraction(&data, &mask, &[1.0], &background).is_err());
        assert!(measure_by_radius(&data, &mask, &[2.0], (4.0, 4.0), &background).is_err());
    }

    #[test]
    fn test_radius_sweep_geometry() {
        let data = vec![15.0; 81]; // uniform 5 above background
        let mask = Mask::from_bits(9, 9, vec![true; 81]);
        let sweep =
            measure_by_radius(&data, &mask, &[0.5, 1.5], (4.0, 4.0), &flat_background())
                .unwrap();

        // r=0.5 keeps the center pixel; r=1.5 keeps the 3x3 block
        assert_eq!(sweep.pixel_counts, vec![1, 9]);
        assert_eq!(sweep.flux, vec![5.0, 45.0]);
        assert!(sweep.masks[1].get(3, 3));
        assert!(!sweep.masks[1].get(2, 4));
    }

    #[test]
    fn test_radius_sweep_respects_object_mask() {
        let data = vec![15.0; 81];
        // Object mask misses the row above the center
        let mut bits = vec![true; 81];
        for x in 0..9 {
            bits[3 * 9 + x] = false;
        }
        let mask = Mask::from_bits(9, 9, bits);
        let sweep =
            measure_by_radius(&data, &mask, &[1.5], (4.0, 4.0), &flat_background()).unwrap();
        assert_eq!(sweep.pixel_counts, vec![6]);
    }

    #[test]
    fn test_empty_object_mask_is_an_error() {
        let data = vec![10.0; 81];
        let mask = Mask::new(9, 9);
        assert!(measure_by_peak_fraction(&data, &mask, &[1.0], &flat_background()).is_err());
        assert!(measure_by_radius(&data, &mask, &[2.0], (4.0, 4.0), &flat_background()).is_err());
    }
}
