use anyhow::{Context, Result};
use bumpalo::Bump;
use fitrs::{Fits, FitsData, FitsDataArray, HeaderValue};
use std::path::Path;

/// A 2-D FITS image held as physical pixel values.
///
/// Integer data is scaled by BZERO/BSCALE on load so that photometric sums
/// operate on real flux units rather than raw detector counts.
pub struct FitsImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f64>,
}

/// Basic whole-image statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ImageStatistics {
    pub width: usize,
    pub height: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub mad: f64,
}

/// Square window cut from a parent image.
///
/// All downstream mask and centroid coordinates are window-local;
/// `x0`/`y0` map them back to the parent frame.
#[derive(Debug, Clone)]
pub struct CropWindow {
    pub x0: usize,
    pub y0: usize,
    pub width: usize,
    pub height: usize,
    pub data: Vec<f64>,
}

impl CropWindow {
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.width + x]
    }

    /// Map a window-local position back into the parent image frame.
    pub fn to_parent(&self, x: f64, y: f64) -> (f64, f64) {
        (x + self.x0 as f64, y + self.y0 as f64)
    }
}

fn header_int(hdu: &fitrs::Hdu, key: &str) -> Result<i64> {
    match hdu.value(key) {
        Some(HeaderValue::IntegerNumber(n)) => Ok((*n).into()),
        Some(_) => Err(anyhow::anyhow!("{} is not an integer", key)),
        None => Err(anyhow::anyhow!("Missing {} header", key)),
    }
}

fn header_float_or(hdu: &fitrs::Hdu, key: &str, default: f64) -> f64 {
    match hdu.value(key) {
        Some(HeaderValue::IntegerNumber(n)) => *n as f64,
        Some(HeaderValue::RealFloatingNumber(f)) => *f,
        _ => default,
    }
}

impl FitsImage {
    /// Load image data from the primary HDU of a FITS file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let fits = Fits::open(path)
            .with_context(|| format!("Failed to open FITS file: {}", path.display()))?;

        let hdu = fits
            .get(0)
            .ok_or_else(|| anyhow::anyhow!("No primary HDU found in FITS file"))?;

        let naxis = header_int(&hdu, "NAXIS")?;
        if naxis < 2 {
            return Err(anyhow::anyhow!(
                "FITS file does not contain 2D image data (NAXIS={})",
                naxis
            ));
        }

        let width = header_int(&hdu, "NAXIS1")? as usize;
        let height = header_int(&hdu, "NAXIS2")? as usize;

        // Scaling per the FITS standard: physical = BZERO + BSCALE * raw
        let bzero = header_float_or(&hdu, "BZERO", 0.0);
        let bscale = header_float_or(&hdu, "BSCALE", 1.0);

        let fits_data = hdu.read_data();

        let data: Vec<f64> = match fits_data {
            FitsData::Characters(_) => {
                return Err(anyhow::anyhow!(
                    "FITS file contains character data, not image data"
                ));
            }
            FitsData::IntegersI32(FitsDataArray { data, .. }) => data
                .into_iter()
                .map(|x| bzero + bscale * x.unwrap_or(0) as f64)
                .collect(),
            FitsData::IntegersU32(FitsDataArray { data, .. }) => data
                .into_iter()
                .map(|x| bzero + bscale * x.unwrap_or(0) as f64)
                .collect(),
            FitsData::FloatingPoint32(FitsDataArray { data, .. }) => data
                .into_iter()
                .map(|x| bzero + bscale * x as f64)
                .collect(),
            FitsData::FloatingPoint64(FitsDataArray { data, .. }) => {
                data.into_iter().map(|x| bzero + bscale * x).collect()
            }
        };

        if data.len() != width * height {
            return Err(anyhow::anyhow!(
                "Data size mismatch: expected {} pixels, got {}",
                width * height,
                data.len()
            ));
        }

        Ok(FitsImage {
            width,
            height,
            data,
        })
    }

    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.width + x]
    }

    /// Cut a square window of half-width `half_width` around `(cx, cy)`,
    /// clamped to the image bounds.
    pub fn crop(&self, cx: usize, cy: usize, half_width: usize) -> Result<CropWindow> {
        if cx >= self.width || cy >= self.height {
            return Err(anyhow::anyhow!(
                "Crop center ({}, {}) outside {}x{} image",
                cx,
                cy,
                self.width,
                self.height
            ));
        }

        let x0 = cx.saturating_sub(half_width);
        let y0 = cy.saturating_sub(half_width);
        let x1 = (cx + half_width).min(self.width - 1);
        let y1 = (cy + half_width).min(self.height - 1);

        let width = x1 - x0 + 1;
        let height = y1 - y0 + 1;
        let mut data = Vec::with_capacity(width * height);
        for y in y0..=y1 {
            let row = &self.data[y * self.width + x0..y * self.width + x1 + 1];
            data.extend_from_slice(row);
        }

        Ok(CropWindow {
            x0,
            y0,
            width,
            height,
            data,
        })
    }

    /// Whole-image statistics with a median-absolute-deviation estimate.
    pub fn statistics(&self) -> ImageStatistics {
        // Arena for the temporary sorted copies
        let arena = Bump::new();
        let mut sorted = bumpalo::vec![in &arena];
        sorted.extend_from_slice(&self.data);
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mean = self.data.iter().sum::<f64>() / self.data.len() as f64;
        let median = median_of_sorted(&sorted);

        let variance = self.data.iter().map(|&x| (x - mean).powi(2)).sum::<f64>()
            / self.data.len() as f64;
        let std_dev = variance.sqrt();

        let min = sorted[0];
        let max = sorted[sorted.len() - 1];

        let mut deviations = bumpalo::vec![in &arena];
        deviations.extend(self.data.iter().map(|&x| (x - median).abs()));
        deviations.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mad = median_of_sorted(&deviations);

        ImageStatistics {
            width: self.width,
            height: self.height,
            mean,
            median,
            std_dev,
            min,
            max,
            mad,
        }
    }
}

fn median_of_sorted(sorted: &[f64]) -> f64 {
    if sorted.len() % 2 == 0 {
        let mid = sorted.len() / 2;
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[sorted.len() / 2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_image(width: usize, height: usize) -> FitsImage {
        let data = (0..width * height).map(|i| i as f64).collect();
        FitsImage {
            width,
            height,
            data,
        }
    }

    #[test]
    fn test_crop_interior() {
        let image = gradient_image(10, 10);
        let window = image.crop(5, 5, 2).unwrap();
        assert_eq!(window.width, 5);
        assert_eq!(window.height, 5);
        assert_eq!(window.x0, 3);
        assert_eq!(window.y0, 3);
        assert_eq!(window.get(2, 2), image.get(5, 5));
    }

    #[test]
    fn test_crop_clamped_at_edge() {
        let image = gradient_image(10, 10);
        let window = image.crop(0, 0, 3).unwrap();
        assert_eq!(window.x0, 0);
        assert_eq!(window.y0, 0);
        assert_eq!(window.width, 4);
        assert_eq!(window.height, 4);
    }

    #[test]
    fn test_crop_center_out_of_bounds() {
        let image = gradient_image(10, 10);
        assert!(image.crop(20, 5, 2).is_err());
    }

    #[test]
    fn test_to_parent_roundtrip() {
        let image = gradient_image(20, 20);
        let window = image.crop(12, 9, 4).unwrap();
        let (px, py) = window.to_parent(4.0, 4.0);
        assert_eq!((px, py), (12.0, 9.0));
    }

    #[test]
    fn test_statistics_flat() {
        let image = FitsImage {
            width: 4,
            height: 4,
            data: vec![7.0; 16],
        };
        let stats = image.statistics();
        assert_eq!(stats.mean, 7.0);
        assert_eq!(stats.median, 7.0);
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.mad, 0.0);
        assert_eq!(stats.min, 7.0);
        assert_eq!(stats.max, 7.0);
    }

    #[test]
    fn test_statistics_simple() {
        let image = FitsImage {
            width: 2,
            height: 2,
            data: vec![1.0, 2.0, 3.0, 4.0],
        };
        let stats = image.statistics();
        assert_eq!(stats.mean, 2.5);
        assert_eq!(stats.median, 2.5);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        // Population variance of 1..4 is 1.25
        assert!((stats.std_dev - 1.25_f64.sqrt()).abs() < 1e-12);
    }
}
