use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use crate::calibration::{
    color_term, color_term_error, fit_color_term, residual, CalibrationPoint,
};

/// A calibration table row: band errors ride along for the error report.
struct TableRow {
    point: CalibrationPoint,
    m1_error: f64,
    m2_error: f64,
}

/// Fit the color-term transformation from a CSV calibration table.
pub fn fit_from_table(data_path: &str, format: &str) -> Result<()> {
    let data_path = Path::new(data_path);
    let rows = read_table(data_path)?;
    println!(
        "Loaded {} calibration points from {}",
        rows.len(),
        data_path.display()
    );

    let points: Vec<CalibrationPoint> = rows.iter().map(|r| r.point).collect();
    let fit = fit_color_term(&points)?;

    match format {
        "json" => {
            let per_point: Vec<serde_json::Value> = rows
                .iter()
                .map(|row| {
                    let calibrated = color_term(row.point.m1, row.point.m2, fit.beta, fit.gamma);
                    serde_json::json!({
                        "m1": row.point.m1,
                        "m2": row.point.m2,
                        "reference": row.point.reference,
                        "calibrated": calibrated,
                        "calibrated_error": color_term_error(
                            row.point.m1,
                            row.point.m2,
                            fit.beta,
                            row.m1_error,
                            row.m2_error,
                            fit.beta_error,
                            fit.gamma_error,
                        ),
                        "residual": residual(fit.beta, fit.gamma, &row.point),
                    })
                })
                .collect();
            let report = serde_json::json!({ "fit": fit, "points": per_point });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            println!("Color-term fit:");
            println!("  beta  = {:.6} +/- {:.6}", fit.beta, fit.beta_error);
            println!("  gamma = {:.6} +/- {:.6}", fit.gamma, fit.gamma_error);
            println!("  weighted residual rms = {:.6}", fit.rms);
            println!();
            println!(
                "{:<10} {:<10} {:<12} {:<12} {:<12} {:<12}",
                "m1", "m2", "Reference", "Calibrated", "Cal Error", "Residual"
            );
            println!("{:-<70}", "");
            for row in &rows {
                let calibrated = color_term(row.point.m1, row.point.m2, fit.beta, fit.gamma);
                let calibrated_error = color_term_error(
                    row.point.m1,
                    row.point.m2,
                    fit.beta,
                    row.m1_error,
                    row.m2_error,
                    fit.beta_error,
                    fit.gamma_error,
                );
                println!(
                    "{:<10.4} {:<10.4} {:<12.4} {:<12.4} {:<12.4} {:<12.4}",
                    row.point.m1,
                    row.point.m2,
                    row.point.reference,
                    calibrated,
                    calibrated_error,
                    residual(fit.beta, fit.gamma, &row.point)
                );
            }
        }
    }

    Ok(())
}

/// Parse `m1,m1_error,m2,m2_error,reference[,weight]` rows. Blank lines
/// and `#` comments are skipped; a missing weight defaults to 1.
fn read_table(path: &Path) -> Result<Vec<TableRow>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read calibration table: {}", path.display()))?;

    let mut rows = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<f64> = line
            .split(',')
            .map(|field| {
                field
                    .trim()
                    .parse::<f64>()
                    .with_context(|| format!("Line {}: bad number '{}'", line_no + 1, field))
            })
            .collect::<Result<_>>()?;

        if fields.len() != 5 && fields.len() != 6 {
            bail!(
                "Line {}: expected 5 or 6 comma-separated values, got {}",
                line_no + 1,
                fields.len()
            );
        }

        rows.push(TableRow {
            point: CalibrationPoint {
                m1: fields[0],
                m2: fields[2],
                reference: fields[4],
                weight: if fields.len() == 6 { fields[5] } else { 1.0 },
            },
            m1_error: fields[1],
            m2_error: fields[3],
        });
    }

    if rows.is_empty() {
        bail!("Calibration table {} holds no data rows", path.display());
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("apphot-{}-{}", std::process::id(), name));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_read_table_with_comments_and_weights() {
        let path = write_temp(
            "table.csv",
            "# m1,m1e,m2,m2e,ref,weight\n10.0,0.1,11.0,0.2,9.95,0.5\n\n12.0,0.1,12.5,0.2,11.9\n",
        );
        let rows = read_table(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].point.weight, 0.5);
        assert_eq!(rows[1].point.weight, 1.0);
        assert_eq!(rows[0].m2_error, 0.2);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_read_table_rejects_short_rows() {
        let path = write_temp("short.csv", "1.0,2.0,3.0\n");
        assert!(read_table(&path).is_err());
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_read_table_rejects_garbage() {
        let path = write_temp("garbage.csv", "1.0,x,3.0,4.0,5.0\n");
        assert!(read_table(&path).is_err());
        fs::remove_file(path).unwrap();
    }
}
