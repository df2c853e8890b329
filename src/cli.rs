use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "apphot")]
#[command(about = "Aperture photometry and calibration for FITS images", long_about = None)]
pub struct Cli {
    /// Increase diagnostic logging (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Measure source flux and instrumental magnitude in a FITS image
    Measure {
        /// FITS file to measure
        fits_path: String,

        /// Approximate source center, x pixel
        #[arg(short = 'x', long)]
        center_x: usize,

        /// Approximate source center, y pixel
        #[arg(short = 'y', long)]
        center_y: usize,

        #[command(flatten)]
        options: MeasureOptions,

        /// Output format (json, csv, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Render a stretch-normalized PNG preview of a FITS image
    Render {
        /// FITS file to render
        fits_path: String,

        /// Output PNG path (defaults to the FITS path with .png)
        #[arg(short, long)]
        output: Option<String>,

        /// Stretch type (linear, sqrt, log, asinh, power)
        #[arg(long, default_value = "asinh")]
        stretch: String,

        /// Lower display limit (overrides the percentile clip)
        #[arg(long, requires = "vmax")]
        vmin: Option<f64>,

        /// Upper display limit (overrides the percentile clip)
        #[arg(long, requires = "vmin")]
        vmax: Option<f64>,

        /// Percent of pixel values kept inside the display range
        #[arg(long, default_value = "99.5")]
        percent: f64,

        /// Render a false-color heat map instead of grayscale
        #[arg(long)]
        color: bool,

        /// Invert the grayscale output
        #[arg(long, conflicts_with = "color")]
        invert: bool,
    },

    /// Fit the color-term transformation from a calibration table
    FitColorTerm {
        /// CSV file with m1,m1_error,m2,m2_error,reference[,weight] rows
        data_path: String,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Validate a category catalog and plan the local directory layout
    Catalog {
        /// Catalog JSON file
        catalog_path: String,

        /// Root directory for the local layout
        #[arg(long, default_value = "./images")]
        root: String,

        /// Create missing directories (existing ones are skipped)
        #[arg(long)]
        create: bool,
    },
}

#[derive(Parser, Debug, Clone)]
pub struct MeasureOptions {
    /// Half-width of the analysis window around the source (pixels)
    #[arg(long, default_value = "50")]
    pub crop_half_width: usize,

    /// Object aperture radius (pixels)
    #[arg(long, default_value = "12.0")]
    pub object_radius: f64,

    /// Outer radius of the background annulus (pixels)
    #[arg(long, default_value = "30.0")]
    pub background_radius: f64,

    /// Sigma threshold for background outlier rejection
    #[arg(long, default_value = "3.0")]
    pub sigma: f64,

    /// Maximum sigma-clipping iterations
    #[arg(long, default_value = "5")]
    pub max_iters: usize,

    /// Skip flux-weighted recentering of the object aperture
    #[arg(long)]
    pub no_recenter: bool,

    /// Peak-fraction thresholds for the brightness-based sweep
    #[arg(long, value_delimiter = ',', default_value = "0.05,0.1,0.2,0.5")]
    pub thresholds: Vec<f64>,

    /// Fixed aperture radii for the geometric sweep (pixels)
    #[arg(long, value_delimiter = ',')]
    pub radii: Vec<f64>,
}
