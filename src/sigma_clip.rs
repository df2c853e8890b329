use crate::mask::Mask;
use tracing::debug;

/// Iteratively reject pixels beyond `sigma` standard deviations from the
/// running mean. Returns a mask of the rejected pixels.
///
/// Already-rejected pixels stay rejected; iteration stops early once a pass
/// rejects nothing new, or when the surviving spread collapses to zero.
pub fn sigma_clip(data: &[f64], width: usize, height: usize, sigma: f64, max_iters: usize) -> Mask {
    assert_eq!(data.len(), width * height);

    let mut clipped = vec![false; data.len()];

    for iteration in 0..max_iters {
        let mut sum = 0.0;
        let mut count = 0usize;
        for (value, &is_clipped) in data.iter().zip(clipped.iter()) {
            if !is_clipped {
                sum += value;
                count += 1;
            }
        }
        if count == 0 {
            break;
        }
        let mean = sum / count as f64;

        let mut sq_sum = 0.0;
        for (value, &is_clipped) in data.iter().zip(clipped.iter()) {
            if !is_clipped {
                sq_sum += (value - mean).powi(2);
            }
        }
        let std_dev = (sq_sum / count as f64).sqrt();
        if std_dev == 0.0 {
            break;
        }

        let threshold = sigma * std_dev;
        let mut newly_clipped = 0usize;
        for (value, is_clipped) in data.iter().zip(clipped.iter_mut()) {
            if !*is_clipped && (value - mean).abs() > threshold {
                *is_clipped = true;
                newly_clipped += 1;
            }
        }

        debug!(
            iteration,
            mean, std_dev, newly_clipped, "sigma-clip pass"
        );

        if newly_clipped == 0 {
            break;
        }
    }

    Mask::from_bits(width, height, clipped)
}
