use anyhow::{bail, Result};
use tracing::debug;

use crate::fits::{CropWindow, FitsImage};
use crate::mask::Mask;
use crate::sigma_clip::sigma_clip;

/// Geometry and rejection settings for a background estimate.
#[derive(Debug, Clone)]
pub struct BackgroundParams {
    /// Nominal source center in image coordinates.
    pub center_x: usize,
    pub center_y: usize,
    /// Half-width of the square analysis window.
    pub crop_half_width: usize,
    /// Radius of the object disk.
    pub object_radius: f64,
    /// Outer radius of the background annulus.
    pub background_radius: f64,
    /// Sigma threshold for outlier rejection in the window.
    pub sigma: f64,
    /// Maximum sigma-clipping iterations.
    pub max_iters: usize,
    /// Refine the center to the flux-weighted centroid of the object disk.
    pub flux_weighted: bool,
}

/// Statistics over the unmasked background annulus pixels.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct BackgroundStats {
    pub pixel_count: usize,
    pub mean: f64,
    /// Standard error of the mean: std_dev / sqrt(pixel_count).
    pub mean_error: f64,
    pub std_dev: f64,
}

/// Result of background estimation around one source.
pub struct BackgroundEstimate {
    /// The analysis window cut from the parent image.
    pub window: CropWindow,
    /// Pixels rejected by sigma clipping (bright sources, cosmic rays).
    pub clip_mask: Mask,
    /// Object disk around the (possibly refined) center.
    pub object_mask: Mask,
    /// Background annulus around the (possibly refined) center.
    pub background_mask: Mask,
    /// Window-local object center after optional flux-weighted refinement.
    pub center: (f64, f64),
    pub stats: BackgroundStats,
}

impl BackgroundEstimate {
    /// The refined center mapped back to the parent image frame.
    pub fn center_in_parent(&self) -> (f64, f64) {
        self.window.to_parent(self.center.0, self.center.1)
    }
}

/// Estimate the sky background around a source.
///
/// Cuts a window around the nominal center, sigma-clips it, builds the
/// object disk and background annulus, and computes background statistics
/// over annulus pixels that are neither clipped nor inside the disk. With
/// `flux_weighted` set, the center is refined once to the
/// background-subtracted-flux-weighted centroid of the disk and the masks
/// and statistics are rebuilt around it.
pub fn estimate_background(
    image: &FitsImage,
    params: &BackgroundParams,
) -> Result<BackgroundEstimate> {
    let window = image.crop(params.center_x, params.center_y, params.crop_half_width)?;
    let (w, h) = (window.width, window.height);

    let mut center = (
        (params.center_x - window.x0) as f64,
        (params.center_y - window.y0) as f64,
    );

    let clip_mask = sigma_clip(&window.data, w, h, params.sigma, params.max_iters);

    let mut object_mask = Mask::circular(w, h, center.0, center.1, params.object_radius);
    let mut background_mask = Mask::annular(
        w,
        h,
        center.0,
        center.1,
        params.object_radius,
        params.background_radius,
    );
    let mut stats = background_stats(&window, &clip_mask, &object_mask, &background_mask)?;

    if params.flux_weighted {
        center = flux_weighted_centroid(&window, &object_mask, stats.mean)?;
        debug!(x = center.0, y = center.1, "refined object centroid");

        object_mask = Mask::circular(w, h, center.0, center.1, params.object_radius);
        background_mask = Mask::annular(
            w,
            h,
            center.0,
            center.1,
            params.object_radius,
            params.background_radius,
        );
        stats = background_stats(&window, &clip_mask, &object_mask, &background_mask)?;
    }

    debug!(
        pixel_count = stats.pixel_count,
        mean = stats.mean,
        std_dev = stats.std_dev,
        "background estimate"
    );

    Ok(BackgroundEstimate {
        window,
        clip_mask,
        object_mask,
        background_mask,
        center,
        stats,
    })
}

/// Mean, population std and standard error over annulus pixels that are
/// neither sigma-clipped nor inside the object disk.
fn background_stats(
    window: &CropWindow,
    clip_mask: &Mask,
    object_mask: &Mask,
    background_mask: &Mask,
) -> Result<BackgroundStats> {
    let excluded = clip_mask.or(object_mask);
    let usable = background_mask.and(&excluded.not());

    let pixel_count = usable.count_true();
    if pixel_count == 0 {
        bail!(
            "No usable background pixels: annulus is empty or fully masked \
             (check crop size against the background radius)"
        );
    }

    let mut sum = 0.0;
    for (x, y) in usable.iter_true() {
        sum += window.get(x, y);
    }
    let mean = sum / pixel_count as f64;

    let mut sq_sum = 0.0;
    for (x, y) in usable.iter_true() {
        sq_sum += (window.get(x, y) - mean).powi(2);
    }
    let std_dev = (sq_sum / pixel_count as f64).sqrt();
    let mean_error = std_dev / (pixel_count as f64).sqrt();

    Ok(BackgroundStats {
        pixel_count,
        mean,
        mean_error,
        std_dev,
    })
}

/// Background-subtracted-flux-weighted mean pixel coordinate over the
/// object disk, with weights normalized to sum to one.
fn flux_weighted_centroid(
    window: &CropWindow,
    object_mask: &Mask,
    background_mean: f64,
) -> Result<(f64, f64)> {
    let mut weight_sum = 0.0;
    for (x, y) in object_mask.iter_true() {
        weight_sum += window.get(x, y) - background_mean;
    }
    if weight_sum == 0.0 || !weight_sum.is_finite() {
        bail!("Flux-weighted recentering failed: object flux sums to zero");
    }

    let mut cx = 0.0;
    let mut cy = 0.0;
    for (x, y) in object_mask.iter_true() {
        let weight = (window.get(x, y) - background_mean) / weight_sum;
        cx += x as f64 * weight;
        cy += y as f64 * weight;
    }
    Ok((cx, cy))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flat field with an optional centered bright disk.
    fn disk_image(size: usize, background: f64, disk_radius: f64, disk_value: f64) -> FitsImage {
        let c = (size / 2) as f64;
        let mut data = vec![background; size * size];
        for y in 0..size {
            for x in 0..size {
                let dx = x as f64 - c;
                let dy = y as f64 - c;
                if dx * dx + dy * dy <= disk_radius * disk_radius {
                    data[y * size + x] = disk_value;
                }
            }
        }
        FitsImage {
            width: size,
            height: size,
            data,
        }
    }

    fn params(size: usize, weighted: bool) -> BackgroundParams {
        BackgroundParams {
            center_x: size / 2,
            center_y: size / 2,
            crop_half_width: size / 2,
            object_radius: 6.0,
            background_radius: 14.0,
            sigma: 3.0,
            max_iters: 5,
            flux_weighted: weighted,
        }
    }

    #[test]
    fn test_flat_background_statistics() {
        let image = disk_image(41, 100.0, 3.0, 5000.0);
        let estimate = estimate_background(&image, &params(41, false)).unwrap();

        // The disk sits inside the object radius, so the annulus is pure
        // background: count matches the analytic annulus area exactly.
        let expected = Mask::annular(41, 41, 20.0, 20.0, 6.0, 14.0).count_true();
        assert_eq!(estimate.stats.pixel_count, expected);
        assert!((estimate.stats.mean - 100.0).abs() < 1e-12);
        assert_eq!(estimate.stats.std_dev, 0.0);
        assert_eq!(estimate.stats.mean_error, 0.0);
    }

    #[test]
    fn test_masks_are_disjoint() {
        let image = disk_image(41, 100.0, 3.0, 5000.0);
        for weighted in [false, true] {
            let estimate = estimate_background(&image, &params(41, weighted)).unwrap();
            assert!(estimate.object_mask.is_disjoint(&estimate.background_mask));
        }
    }

    #[test]
    fn test_weighted_centroid_of_symmetric_source() {
        let image = disk_image(41, 100.0, 3.0, 5000.0);
        let estimate = estimate_background(&image, &params(41, true)).unwrap();
        assert!((estimate.center.0 - 20.0).abs() < 1e-9);
        assert!((estimate.center.1 - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_centroid_follows_offset_source() {
        // Source one pixel right of the nominal center pulls the centroid
        // in that direction.
        let size = 41;
        let mut image = disk_image(size, 100.0, 0.0, 100.0);
        image.data[20 * size + 22] = 9000.0;

        let mut p = params(size, true);
        p.object_radius = 5.0;
        let estimate = estimate_background(&image, &p).unwrap();
        assert!(estimate.center.0 > 20.5);
        assert!((estimate.center.1 - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_center_in_parent_frame() {
        let image = disk_image(61, 100.0, 3.0, 5000.0);
        let mut p = params(61, true);
        p.crop_half_width = 20;
        let estimate = estimate_background(&image, &p).unwrap();
        let (px, py) = estimate.center_in_parent();
        assert!((px - 30.0).abs() < 1e-9);
        assert!((py - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_annulus_is_an_error() {
        let image = disk_image(21, 100.0, 3.0, 5000.0);
        let mut p = params(21, false);
        // Annulus entirely outside the window
        p.object_radius = 40.0;
        p.background_radius = 50.0;
        assert!(estimate_background(&image, &p).is_err());
    }

    #[test]
    fn test_clipped_pixels_excluded_from_background() {
        // A cosmic-ray hit inside the annulus is rejected by the clip mask
        // and must not bias the mean.
        let size = 41;
        let mut image = disk_image(size, 100.0, 3.0, 5000.0);
        image.data[20 * size + 30] = 50_000.0; // radius 10 from center, in annulus

        let estimate = estimate_background(&image, &params(size, false)).unwrap();
        let expected = Mask::annular(41, 41, 20.0, 20.0, 6.0, 14.0).count_true() - 1;
        assert_eq!(estimate.stats.pixel_count, expected);
        assert!((estimate.stats.mean - 100.0).abs() < 1e-12);
    }
}
