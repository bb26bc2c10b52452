//! powderpix CLI - Command-line interface for powder diffraction integration.
//!
//! Reads a text image and a JSON detector calibration, and writes reduced
//! profiles, Q by azimuth maps or outlier masks.
#![allow(clippy::too_many_lines, clippy::struct_excessive_bools)]

use clap::{Parser, Subcommand, ValueEnum};

use powderpix_algorithms::{
    outlier_mask, remap_image, Dimensions, ErrorModel, ImageInput, IntegrationConfig,
    IntegrationResult, OutlierConfig, OutlierSide, PixelIntegrator, RemapGrid, XAxis,
};
use powderpix_core::{two_theta_from_q, DiffractionMetadata, Map2D};
use powderpix_io::{
    load_integration_config, load_metadata, read_text_image, read_text_mask, DataFileWriter,
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    PowderpixIo(#[from] powderpix_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] powderpix_core::Error),

    #[error("Invalid argument: {0}")]
    Argument(String),
}

/// Radial quantity selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Quantity {
    /// Scattering vector magnitude |Q| in 1/Å
    Q,
    /// Scattering angle 2θ in degrees
    Angle,
    /// d-spacing in Å
    Resolution,
    /// Distance from the beam centre in pixels
    Pixel,
}

impl From<Quantity> for XAxis {
    fn from(quantity: Quantity) -> Self {
        match quantity {
            Quantity::Q => XAxis::Q,
            Quantity::Angle => XAxis::Angle,
            Quantity::Resolution => XAxis::Resolution,
            Quantity::Pixel => XAxis::Pixel,
        }
    }
}

/// Outlier side selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Side {
    /// Reject values below the median
    Low,
    /// Reject values above the median
    High,
    /// Reject deviations in either direction
    Both,
}

impl From<Side> for OutlierSide {
    fn from(side: Side) -> Self {
        match side {
            Side::Low => OutlierSide::Low,
            Side::High => OutlierSide::High,
            Side::Both => OutlierSide::Both,
        }
    }
}

/// Azimuthal integration of powder diffraction images.
#[derive(Parser)]
#[command(name = "powderpix")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Image, mask and calibration shared by the processing commands.
#[derive(clap::Args)]
struct ImageArgs {
    /// Input image (text matrix, one row per line)
    image: PathBuf,

    /// Detector calibration (JSON)
    #[arg(short, long)]
    calibration: PathBuf,

    /// Mask (text matrix, non-zero keeps a pixel)
    #[arg(short, long)]
    mask: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Integrate an image into a 1D profile or a 2D map
    Integrate {
        #[command(flatten)]
        source: ImageArgs,

        /// Output file (CSV for profiles, text matrix for maps)
        #[arg(short, long)]
        output: PathBuf,

        /// Integration configuration (JSON); replaces the options below
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of radial bins
        #[arg(long, default_value = "1000")]
        bins: usize,

        /// Number of azimuthal bins
        #[arg(long, default_value = "360")]
        azimuthal_bins: usize,

        /// Radial quantity
        #[arg(short = 'x', long, value_enum, default_value = "q")]
        axis: Quantity,

        /// Radial range (two values)
        #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], allow_negative_numbers = true)]
        radial_range: Option<Vec<f64>>,

        /// Azimuthal range in degrees (two values)
        #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], allow_negative_numbers = true)]
        azimuthal_range: Option<Vec<f64>>,

        /// Split pixels over the bins they overlap
        #[arg(long)]
        split: bool,

        /// Log10-spaced radial bins
        #[arg(long)]
        log_radial: bool,

        /// Produce a 2D map instead of a profile
        #[arg(long)]
        map: bool,

        /// Use azimuth as the x axis
        #[arg(long)]
        azimuthal_x: bool,

        /// Propagate Poisson errors
        #[arg(long)]
        poisson: bool,

        /// Keep NaN in empty bins
        #[arg(long)]
        no_sanitise: bool,
    },

    /// Compute an outlier mask from per-bin median and MAD
    Outliers {
        #[command(flatten)]
        source: ImageArgs,

        /// Output mask file
        #[arg(short, long)]
        output: PathBuf,

        /// MAD multiple beyond which a pixel is rejected
        #[arg(long, default_value = "3.0")]
        scale: f64,

        /// Side(s) to reject
        #[arg(long, value_enum, default_value = "both")]
        side: Side,

        /// Number of radial bins
        #[arg(long, default_value = "1000")]
        bins: usize,

        /// Radial quantity
        #[arg(short = 'x', long, value_enum, default_value = "q")]
        axis: Quantity,
    },

    /// Remap an image onto a regular Q by azimuth grid
    Remap {
        #[command(flatten)]
        source: ImageArgs,

        /// Output map file
        #[arg(short, long)]
        output: PathBuf,

        /// Number of Q columns
        #[arg(long, default_value = "500")]
        q_bins: usize,

        /// Number of azimuthal rows
        #[arg(long, default_value = "360")]
        azimuthal_bins: usize,

        /// Q range in 1/Å (two values)
        #[arg(long, num_args = 2, value_names = ["MIN", "MAX"])]
        q_range: Option<Vec<f64>>,

        /// Split pixels over the cells they overlap
        #[arg(long)]
        split: bool,
    },

    /// Show detector and beam information from a calibration
    Info {
        /// Detector calibration (JSON)
        calibration: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Integrate {
            source,
            output,
            config,
            bins,
            azimuthal_bins,
            axis,
            radial_range,
            azimuthal_range,
            split,
            log_radial,
            map,
            azimuthal_x,
            poisson,
            no_sanitise,
        } => {
            let config = match config {
                Some(path) => load_integration_config(path)?,
                None => {
                    let mut config = IntegrationConfig::new()
                        .with_bins(bins)
                        .with_azimuthal_bins(azimuthal_bins)
                        .with_x_axis(axis.into())
                        .with_pixel_splitting(split)
                        .with_log_radial(log_radial)
                        .with_azimuthal_x(azimuthal_x)
                        .with_sanitise(!no_sanitise);
                    if let Some([min, max]) = pair(radial_range.as_deref())? {
                        config = config.with_radial_range(min, max);
                    }
                    if let Some([min, max]) = pair(azimuthal_range.as_deref())? {
                        config = config.with_azimuthal_range(min, max);
                    }
                    if map {
                        config = config.with_dimensions(Dimensions::Two);
                    }
                    if poisson {
                        config = config.with_error_model(ErrorModel::Poisson);
                    }
                    config
                }
            };

            let (md, image, mask) = load_source(&source)?;
            let input = ImageInput::new(image.view()).with_optional_mask(mask.as_ref().map(|m| m.view()));
            let integrator = PixelIntegrator::new(config)?;

            let start = Instant::now();
            let result = integrator.integrate(&input, Some(&md))?;
            log::info!(
                "Integrated {:?} image in {:.3}s",
                image.dim(),
                start.elapsed().as_secs_f64()
            );

            match result {
                IntegrationResult::Profile(profile) => {
                    DataFileWriter::create(&output)?.write_profile_csv(&profile)?;
                    println!(
                        "Wrote {} bins to {}",
                        profile.intensity.len(),
                        output.display()
                    );
                }
                IntegrationResult::Map(map) => {
                    write_map(&map, &output)?;
                }
            }
        }

        Commands::Outliers {
            source,
            output,
            scale,
            side,
            bins,
            axis,
        } => {
            let (md, image, mask) = load_source(&source)?;
            let input = ImageInput::new(image.view()).with_optional_mask(mask.as_ref().map(|m| m.view()));
            let config = OutlierConfig::default()
                .with_scale(scale)
                .with_side(side.into())
                .with_bins(bins)
                .with_x_axis(axis.into());

            let start = Instant::now();
            let result = outlier_mask(&input, &md, &config)?;
            let rejected = result.iter().filter(|keep| !**keep).count();
            log::info!("Outlier pass took {:.3}s", start.elapsed().as_secs_f64());

            DataFileWriter::create(&output)?.write_mask(&result)?;
            println!(
                "Rejected {rejected} of {} pixels; mask written to {}",
                result.len(),
                output.display()
            );
        }

        Commands::Remap {
            source,
            output,
            q_bins,
            azimuthal_bins,
            q_range,
            split,
        } => {
            let (md, image, mask) = load_source(&source)?;
            let input = ImageInput::new(image.view()).with_optional_mask(mask.as_ref().map(|m| m.view()));
            let mut grid = RemapGrid::new(q_bins, azimuthal_bins);
            if let Some([min, max]) = pair(q_range.as_deref())? {
                grid = grid.with_q_range(min, max);
            }

            let start = Instant::now();
            let map = remap_image(&input, &md, &grid, split)?;
            log::info!("Remapped in {:.3}s", start.elapsed().as_secs_f64());
            write_map(&map, &output)?;
        }

        Commands::Info { calibration } => {
            let md = load_metadata(&calibration)?;
            print_info(&calibration, &md)?;
        }
    }

    Ok(())
}

fn pair(values: Option<&[f64]>) -> Result<Option<[f64; 2]>> {
    match values {
        None => Ok(None),
        Some(&[min, max]) => Ok(Some([min, max])),
        Some(other) => Err(CliError::Argument(format!(
            "expected two values, got {}",
            other.len()
        ))),
    }
}

type Source = (
    DiffractionMetadata,
    ndarray::Array2<f64>,
    Option<ndarray::Array2<bool>>,
);

fn load_source(source: &ImageArgs) -> Result<Source> {
    let md = load_metadata(&source.calibration)?;
    let image = read_text_image(&source.image)?;
    let mask = source.mask.as_ref().map(read_text_mask).transpose()?;
    let expected = md.detector.image_shape();
    if image.dim() != expected {
        log::warn!(
            "image shape {:?} differs from calibrated detector {:?}",
            image.dim(),
            expected
        );
    }
    Ok((md, image, mask))
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map_or_else(|| "map".into(), |s| s.to_string_lossy().into_owned());
    path.with_file_name(format!("{stem}.{suffix}.csv"))
}

fn write_map(map: &Map2D, output: &Path) -> Result<()> {
    DataFileWriter::create(output)?.write_map_text(map)?;
    let x_path = sibling(output, "x");
    let y_path = sibling(output, "y");
    DataFileWriter::create(&x_path)?.write_axis_csv(&map.x_axis)?;
    DataFileWriter::create(&y_path)?.write_axis_csv(&map.y_axis)?;
    let (rows, columns) = map.intensity.dim();
    println!(
        "Wrote {rows}x{columns} map to {} (axes: {}, {})",
        output.display(),
        x_path.display(),
        y_path.display()
    );
    Ok(())
}

fn print_info(path: &Path, md: &DiffractionMetadata) -> Result<()> {
    let detector = &md.detector;
    let (px, py) = detector.pixel_counts();
    let (h, v) = detector.pixel_size();
    let (cx, cy) = detector.beam_centre_coords()?;
    let max_q = md.max_q();

    println!("Calibration: {}", path.display());
    println!("Detector: {px} x {py} pixels of {h} x {v} mm");
    println!("Beam centre: ({cx:.3}, {cy:.3}) pixels");
    println!("Distance: {:.3} mm", detector.distance_to_beam_centre()?);
    println!("Wavelength: {:.5} Å", md.wavelength());
    println!("Q range: 0 - {max_q:.4} 1/Å");
    println!(
        "2-theta range: 0 - {:.3} degrees",
        two_theta_from_q(max_q, md.wavelength())
    );
    Ok(())
}
