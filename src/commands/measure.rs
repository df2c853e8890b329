use anyhow::{bail, Result};
use std::path::Path;

use crate::aperture::{measure_by_peak_fraction, measure_by_radius, ApertureSweep};
use crate::background::{estimate_background, BackgroundEstimate, BackgroundParams};
use crate::calibration::{instrumental_magnitude, Magnitude};
use crate::cli::MeasureOptions;
use crate::fits::FitsImage;

/// One aperture of a sweep, flattened for output.
struct SweepRow {
    sweep: &'static str,
    value: f64,
    pixel_count: usize,
    flux: f64,
    flux_error: f64,
    magnitude: Option<Magnitude>,
}

/// Run the full measurement pipeline on one source in one image.
pub fn measure_image(
    fits_path: &str,
    center_x: usize,
    center_y: usize,
    options: &MeasureOptions,
    format: &str,
) -> Result<()> {
    let fits_path = Path::new(fits_path);
    println!("Loading FITS file: {}", fits_path.display());

    let image = FitsImage::from_file(fits_path)?;
    println!("Image dimensions: {}x{}", image.width, image.height);

    let params = BackgroundParams {
        center_x,
        center_y,
        crop_half_width: options.crop_half_width,
        object_radius: options.object_radius,
        background_radius: options.background_radius,
        sigma: options.sigma,
        max_iters: options.max_iters,
        flux_weighted: !options.no_recenter,
    };
    let estimate = estimate_background(&image, &params)?;

    let (px, py) = estimate.center_in_parent();
    println!("Background estimate:");
    println!("  Pixels: {}", estimate.stats.pixel_count);
    println!(
        "  Mean: {:.4} +/- {:.4}",
        estimate.stats.mean, estimate.stats.mean_error
    );
    println!("  Std dev: {:.4}", estimate.stats.std_dev);
    println!("  Object center: ({:.2}, {:.2})", px, py);

    let mut rows = Vec::new();

    if !options.thresholds.is_empty() {
        let result = measure_by_peak_fraction(
            &estimate.window.data,
            &estimate.object_mask,
            &options.thresholds,
            &estimate.stats,
        )?;
        println!("Peak flux: {:.4e}", result.peak_flux);
        collect_rows(&mut rows, "threshold", &options.thresholds, &result.sweep);
    }

    if !options.radii.is_empty() {
        let sweep = measure_by_radius(
            &estimate.window.data,
            &estimate.object_mask,
            &options.radii,
            estimate.center,
            &estimate.stats,
        )?;
        collect_rows(&mut rows, "radius", &options.radii, &sweep);
    }

    if rows.is_empty() {
        bail!("Nothing to measure: both the threshold and radius sweeps are empty");
    }

    match format {
        "json" => output_json(&estimate, &rows)?,
        "csv" => output_csv(&rows),
        _ => output_table(&rows),
    }

    Ok(())
}

fn collect_rows(
    rows: &mut Vec<SweepRow>,
    sweep_name: &'static str,
    values: &[f64],
    sweep: &ApertureSweep,
) {
    for (i, &value) in values.iter().enumerate() {
        let flux = sweep.flux[i];
        // Nonpositive flux has no magnitude; report the row as invalid
        // rather than printing NaN
        let magnitude = instrumental_magnitude(flux, sweep.flux_error[i]).ok();
        rows.push(SweepRow {
            sweep: sweep_name,
            value,
            pixel_count: sweep.pixel_counts[i],
            flux,
            flux_error: sweep.flux_error[i],
            magnitude,
        });
    }
}

fn output_table(rows: &[SweepRow]) {
    println!(
        "{:<12} {:<10} {:<8} {:<14} {:<14} {:<12} {:<12}",
        "Sweep", "Value", "Pixels", "Flux", "Flux Error", "Mag", "Mag Error"
    );
    println!("{:-<86}", "");

    for row in rows {
        let (mag, mag_error) = match &row.magnitude {
            Some(m) => (format!("{:.4}", m.value), format!("{:.4}", m.error)),
            None => ("invalid".to_string(), "-".to_string()),
        };
        println!(
            "{:<12} {:<10.4} {:<8} {:<14.4e} {:<14.4e} {:<12} {:<12}",
            row.sweep, row.value, row.pixel_count, row.flux, row.flux_error, mag, mag_error
        );
    }

    println!("\nTotal: {} apertures", rows.len());
}

fn output_csv(rows: &[SweepRow]) {
    println!("sweep,value,pixel_count,flux,flux_error,magnitude,magnitude_error");
    for row in rows {
        let (mag, mag_error) = match &row.magnitude {
            Some(m) => (m.value.to_string(), m.error.to_string()),
            None => ("".to_string(), "".to_string()),
        };
        println!(
            "{},{},{},{},{},{},{}",
            row.sweep, row.value, row.pixel_count, row.flux, row.flux_error, mag, mag_error
        );
    }
}

fn output_json(estimate: &BackgroundEstimate, rows: &[SweepRow]) -> Result<()> {
    let (px, py) = estimate.center_in_parent();
    let apertures: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| {
            serde_json::json!({
                "sweep": row.sweep,
                "value": row.value,
                "pixel_count": row.pixel_count,
                "flux": row.flux,
                "flux_error": row.flux_error,
                "magnitude": row.magnitude.as_ref().map(|m| m.value),
                "magnitude_error": row.magnitude.as_ref().map(|m| m.error),
            })
        })
        .collect();

    let report = serde_json::json!({
        "background": estimate.stats,
        "object_center": { "x": px, "y": py },
        "apertures": apertures,
    });

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
