use anyhow::{Context, Result};
use image::{ImageBuffer, Luma, Rgb};
use std::path::{Path, PathBuf};

use crate::fits::FitsImage;
use crate::stretch::{heat_color, normalize_to_u8, Normalization, Stretch};

/// Render a stretch-normalized PNG preview of a FITS image.
pub fn render_image(
    fits_path: &str,
    output: Option<String>,
    stretch: &str,
    vmin: Option<f64>,
    vmax: Option<f64>,
    percent: f64,
    color: bool,
    invert: bool,
) -> Result<()> {
    let fits_path = Path::new(fits_path);
    println!("Loading FITS file: {}", fits_path.display());

    let image = FitsImage::from_file(fits_path)?;
    println!("Image dimensions: {}x{}", image.width, image.height);

    let stats = image.statistics();
    println!("Statistics:");
    println!("  Mean: {:.3}", stats.mean);
    println!("  Median: {:.3}", stats.median);
    println!("  MAD: {:.3}", stats.mad);
    println!("  Min: {:.3}", stats.min);
    println!("  Max: {:.3}", stats.max);

    let stretch: Stretch = stretch
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let norm = match (vmin, vmax) {
        (Some(lo), Some(hi)) => Normalization::from_limits(lo, hi)?,
        _ => Normalization::from_percentile(&image.data, percent)?,
    };
    println!(
        "Display range: [{:.4}, {:.4}], stretch: {:?}",
        norm.vmin, norm.vmax, stretch
    );

    let output_path = match output {
        Some(path) => PathBuf::from(path),
        None => {
            let mut path = fits_path.to_path_buf();
            path.set_extension("png");
            path
        }
    };

    let display = normalize_to_u8(&image.data, &norm, stretch);

    if color {
        let mut rgb_data = Vec::with_capacity(display.len() * 3);
        for &pixel in &display {
            let (r, g, b) = heat_color(pixel);
            rgb_data.push(r);
            rgb_data.push(g);
            rgb_data.push(b);
        }
        let buffer = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(
            image.width as u32,
            image.height as u32,
            rgb_data,
        )
        .context("Failed to create RGB image buffer")?;
        buffer
            .save(&output_path)
            .with_context(|| format!("Failed to save PNG to: {}", output_path.display()))?;
    } else {
        let gray: Vec<u8> = if invert {
            display.iter().map(|&p| 255 - p).collect()
        } else {
            display
        };
        let buffer = ImageBuffer::<Luma<u8>, Vec<u8>>::from_raw(
            image.width as u32,
            image.height as u32,
            gray,
        )
        .context("Failed to create image buffer")?;
        buffer
            .save(&output_path)
            .with_context(|| format!("Failed to save PNG to: {}", output_path.display()))?;
    }

    println!("Saved preview to: {}", output_path.display());
    Ok(())
}
