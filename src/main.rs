use anyhow::Result;
use clap::Parser;

use apphot::cli::{Cli, Commands};
use apphot::commands;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Measure {
            fits_path,
            center_x,
            center_y,
            options,
            format,
        } => {
            commands::measure_image(&fits_path, center_x, center_y, &options, &format)?;
        }
        Commands::Render {
            fits_path,
            output,
            stretch,
            vmin,
            vmax,
            percent,
            color,
            invert,
        } => {
            commands::render_image(
                &fits_path, output, &stretch, vmin, vmax, percent, color, invert,
            )?;
        }
        Commands::FitColorTerm { data_path, format } => {
            commands::fit_from_table(&data_path, &format)?;
        }
        Commands::Catalog {
            catalog_path,
            root,
            create,
        } => {
            commands::plan_catalog(&catalog_path, &root, create)?;
        }
    }

    Ok(())
}

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
