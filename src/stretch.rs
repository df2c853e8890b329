use anyhow::{bail, Result};

/// Intensity stretch applied after normalization to the 0-1 range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stretch {
    Linear,
    Sqrt,
    Log,
    Asinh,
    Power(f64),
}

impl std::str::FromStr for Stretch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linear" => Ok(Stretch::Linear),
            "sqrt" => Ok(Stretch::Sqrt),
            "log" => Ok(Stretch::Log),
            "asinh" => Ok(Stretch::Asinh),
            "power" | "squared" => Ok(Stretch::Power(2.0)),
            _ => Err(format!("Unknown stretch type: {}", s)),
        }
    }
}

impl Stretch {
    /// Map a normalized value in [0, 1] through the stretch curve.
    pub fn apply(&self, x: f64) -> f64 {
        let x = x.clamp(0.0, 1.0);
        match self {
            Stretch::Linear => x,
            Stretch::Sqrt => x.sqrt(),
            // log and asinh softening constants follow the usual
            // astronomical display conventions
            Stretch::Log => (1000.0 * x + 1.0).ln() / 1001.0_f64.ln(),
            Stretch::Asinh => (x / 0.1).asinh() / (1.0 / 0.1_f64).asinh(),
            Stretch::Power(a) => x.powf(*a),
        }
    }
}

/// Display range for normalization, from explicit limits or a
/// percentile clip of the data.
#[derive(Debug, Clone, Copy)]
pub struct Normalization {
    pub vmin: f64,
    pub vmax: f64,
}

impl Normalization {
    pub fn from_limits(vmin: f64, vmax: f64) -> Result<Self> {
        if !(vmax > vmin) {
            bail!("Display range requires vmax > vmin, got [{}, {}]", vmin, vmax);
        }
        Ok(Normalization { vmin, vmax })
    }

    /// Clip symmetrically so that `percent` of the pixel values fall
    /// inside the display range; 100 keeps the full min/max range.
    pub fn from_percentile(data: &[f64], percent: f64) -> Result<Self> {
        if data.is_empty() {
            bail!("Cannot normalize an empty image");
        }
        if !(0.0..=100.0).contains(&percent) {
            bail!("Percentile must be within 0-100, got {}", percent);
        }

        let mut sorted = data.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let tail = (100.0 - percent) / 2.0 / 100.0;
        let lo = ((sorted.len() - 1) as f64 * tail).round() as usize;
        let hi = ((sorted.len() - 1) as f64 * (1.0 - tail)).round() as usize;

        let vmin = sorted[lo];
        let vmax = sorted[hi];
        if vmax > vmin {
            Ok(Normalization { vmin, vmax })
        } else {
            // Degenerate (flat) data: widen so apply() stays defined
            Ok(Normalization {
                vmin,
                vmax: vmin + 1.0,
            })
        }
    }

    /// Scale a pixel value into [0, 1], clamped at the range edges.
    pub fn apply(&self, value: f64) -> f64 {
        ((value - self.vmin) / (self.vmax - self.vmin)).clamp(0.0, 1.0)
    }
}

/// Normalize and stretch pixel data into 8-bit display values.
pub fn normalize_to_u8(data: &[f64], norm: &Normalization, stretch: Stretch) -> Vec<u8> {
    data.iter()
        .map(|&value| {
            let stretched = stretch.apply(norm.apply(value));
            (stretched * 255.0).round() as u8
        })
        .collect()
}

/// Heat-map false color for a display intensity.
pub fn heat_color(intensity: u8) -> (u8, u8, u8) {
    let i = intensity as f32 / 255.0;

    if i < 0.25 {
        // Black to blue
        let t = i * 4.0;
        (0, 0, (t * 255.0) as u8)
    } else if i < 0.5 {
        // Blue to cyan
        let t = (i - 0.25) * 4.0;
        (0, (t * 255.0) as u8, 255)
    } else if i < 0.75 {
        // Cyan to yellow
        let t = (i - 0.5) * 4.0;
        ((t * 255.0) as u8, 255, (255.0 * (1.0 - t)) as u8)
    } else {
        // Yellow to white
        let t = (i - 0.75) * 4.0;
        (255, 255, (255.0 * t) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stretch_boundaries() {
        for stretch in [
            Stretch::Linear,
            Stretch::Sqrt,
            Stretch::Log,
            Stretch::Asinh,
            Stretch::Power(2.0),
        ] {
            assert_eq!(stretch.apply(0.0), 0.0, "{:?} at 0", stretch);
            assert!((stretch.apply(1.0) - 1.0).abs() < 1e-12, "{:?} at 1", stretch);
        }
    }

    #[test]
    fn test_stretch_monotonicity() {
        for stretch in [Stretch::Sqrt, Stretch::Log, Stretch::Asinh, Stretch::Power(2.0)] {
            let mut last = stretch.apply(0.0);
            for step in 1..=20 {
                let value = stretch.apply(step as f64 / 20.0);
                assert!(value >= last, "{:?} not monotone", stretch);
                last = value;
            }
        }
    }

    #[test]
    fn test_stretch_from_str() {
        assert_eq!("linear".parse::<Stretch>().unwrap(), Stretch::Linear);
        assert_eq!("ASINH".parse::<Stretch>().unwrap(), Stretch::Asinh);
        assert_eq!("power".parse::<Stretch>().unwrap(), Stretch::Power(2.0));
        assert!("mystery".parse::<Stretch>().is_err());
    }

    #[test]
    fn test_normalization_limits() {
        let norm = Normalization::from_limits(10.0, 20.0).unwrap();
        assert_eq!(norm.apply(10.0), 0.0);
        assert_eq!(norm.apply(20.0), 1.0);
        assert_eq!(norm.apply(15.0), 0.5);
        assert_eq!(norm.apply(0.0), 0.0);
        assert_eq!(norm.apply(100.0), 1.0);
        assert!(Normalization::from_limits(5.0, 5.0).is_err());
    }

    #[test]
    fn test_full_percentile_is_min_max() {
        let data = vec![3.0, 1.0, 4.0, 1.5, 9.0, 2.6];
        let norm = Normalization::from_percentile(&data, 100.0).unwrap();
        assert_eq!(norm.vmin, 1.0);
        assert_eq!(norm.vmax, 9.0);
    }

    #[test]
    fn test_percentile_clips_outliers() {
        let mut data = vec![100.0; 1000];
        data[0] = -1e6;
        data[999] = 1e6;
        let norm = Normalization::from_percentile(&data, 99.0).unwrap();
        assert_eq!(norm.vmin, 100.0);
        assert_eq!(norm.vmax, 100.0 + 1.0); // flat interior widened
    }

    #[test]
    fn test_normalize_to_u8_range() {
        let data = vec![0.0, 50.0, 100.0];
        let norm = Normalization::from_limits(0.0, 100.0).unwrap();
        let out = normalize_to_u8(&data, &norm, Stretch::Linear);
        assert_eq!(out, vec![0, 128, 255]);
    }

    #[test]
    fn test_heat_color_endpoints() {
        assert_eq!(heat_color(0), (0, 0, 0));
        assert_eq!(heat_color(255), (255, 255, 255));
        let (r, g, b) = heat_color(128);
        assert!(g == 255 && r < 10 && b > 245);
    }
}
