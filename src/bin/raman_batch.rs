//! # raman-batch
//!
//! Scripted front end to the assembly and analysis pipeline.
//!
//! ```bash
//! # Baseline-correct every spectrum in a folder and join with metadata
//! raman-batch assemble spectra/ --metadata metadata.xlsx -o combined.csv
//!
//! # Peak intensities and ratios for the 785 nm peak set
//! raman-batch analyze spectra/ --metadata metadata.xlsx -o analysis.xlsx --peak-set "785 nm"
//!
//! # Tube compositions plus a spectrum → tube mapping instead of one table
//! raman-batch assemble spectra/ --metadata GC514_spectroscopie.xlsx --tube-map GC514_spectre_tube.xlsx -o combined.csv
//!
//! # List the available peak sets
//! raman-batch peaks
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;

use rusty_raman::data::analysis::PeakSet;
use rusty_raman::data::discover::expand_inputs;
use rusty_raman::data::export::CombinedFormat;
use rusty_raman::data::metadata::MetadataSource;
use rusty_raman::{PipelineConfig, Session};

/// Raman spectra assembly and peak-ratio analysis
#[derive(Parser)]
#[command(name = "raman-batch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Load parameters from a JSON config file
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputArgs {
    /// Spectrum files or folders of `.txt` exports
    #[arg(value_name = "INPUTS", required = true)]
    inputs: Vec<PathBuf>,

    /// Metadata table (.xlsx, .xls or .csv); the tube composition table
    /// when --tube-map is given
    #[arg(short, long, value_name = "PATH")]
    metadata: PathBuf,

    /// Spectrum → tube mapping, joined with the metadata table on `Tube`
    #[arg(long, value_name = "PATH")]
    tube_map: Option<PathBuf>,

    /// Baseline polynomial order (overrides the config file)
    #[arg(long)]
    poly_order: Option<usize>,

    /// Keep `Cuvette BRB` blank spectra
    #[arg(long)]
    keep_brb: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble spectra with metadata into one combined dataset
    Assemble {
        #[command(flatten)]
        input: InputArgs,

        /// Output file (.csv, .xlsx or .parquet)
        #[arg(short, long, value_name = "OUT")]
        output: PathBuf,
    },

    /// Assemble, then extract peak intensities and ratios
    Analyze {
        #[command(flatten)]
        input: InputArgs,

        /// Output workbook (.xlsx)
        #[arg(short, long, value_name = "OUT")]
        output: PathBuf,

        /// Name of a built-in or configured peak set
        #[arg(long, conflicts_with = "peaks")]
        peak_set: Option<String>,

        /// Explicit peak list, e.g. "1000,1231.5,1327"
        #[arg(long)]
        peaks: Option<String>,

        /// Half-width of the peak search window (cm⁻¹)
        #[arg(short, long)]
        tolerance: Option<f64>,

        /// Also write the combined dataset to this file
        #[arg(long, value_name = "PATH")]
        combined: Option<PathBuf>,
    },

    /// List the available peak sets
    Peaks,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Assemble { input, output } => {
            let session = assembled_session(config, &input)?;
            export_combined(&session, &output)?;
        }
        Commands::Analyze {
            input,
            output,
            peak_set,
            peaks,
            tolerance,
            combined,
        } => {
            if let Some(name) = peak_set {
                config.peak_set = name;
            }
            if let Some(t) = tolerance {
                config.tolerance = t;
            }
            let mut session = assembled_session(config, &input)?;
            if let Some(path) = combined {
                export_combined(&session, &path)?;
            }

            let result = match peaks {
                Some(list) => {
                    let set = PeakSet::parse("custom", &list).context("Invalid --peaks list")?;
                    session.analyze_with(&set)
                }
                None => session.analyze(),
            }
            .context("Peak analysis failed")?;
            info!(
                "{} file(s), {} ratio(s) with peak set {}",
                result.intensities.rows.len(),
                result.ratios.rows.len(),
                result.peak_set
            );

            session
                .export_analysis(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Wrote {}", output.display());
        }
        Commands::Peaks => {
            for set in config.available_peak_sets() {
                println!("{set}");
            }
        }
    }

    Ok(())
}

/// Apply flag overrides, then assemble the inputs.
fn assembled_session(mut config: PipelineConfig, input: &InputArgs) -> Result<Session> {
    if let Some(order) = input.poly_order {
        config.poly_order = order;
    }
    if input.keep_brb {
        config.exclude_brb = false;
    }
    config.validate().context("Invalid parameters")?;

    let files = expand_inputs(&input.inputs).context("Failed to list spectrum files")?;
    if files.is_empty() {
        bail!("No spectrum files found in the given inputs");
    }
    info!("Assembling {} spectrum file(s)", files.len());

    let source = match &input.tube_map {
        Some(mapping) => MetadataSource::composed(&input.metadata, mapping),
        None => MetadataSource::from_path(&input.metadata),
    };
    let mut session = Session::new(config);
    let summary = session
        .assemble(&files, &source)
        .context("Assembly failed")?;
    for skipped in &summary.skipped {
        eprintln!("skipped {}: {}", skipped.path.display(), skipped.reason);
    }
    println!("Assembled {summary}");
    Ok(session)
}

fn export_combined(session: &Session, path: &Path) -> Result<()> {
    let format = CombinedFormat::from_path(path)?;
    session
        .export_combined(path, format)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
