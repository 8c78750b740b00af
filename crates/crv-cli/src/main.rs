use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use crv_lib::analysis::{analyze, AnalysisOptions, FRAME_COLUMNS};
use crv_lib::io::{container, csv as csv_io, text as text_io};
use crv_lib::metrics::outliers::{OutlierDetectionSettings, OutlierPolicy};
use crv_lib::preprocess::{preprocess, PreprocessOptions, SmoothingSettings};
use crv_lib::signal::Signal;
use std::{
    io::{self, Read, Write},
    path::PathBuf,
};

#[derive(Parser)]
#[command(
    name = "crv",
    version,
    about = "CRV: windowed heart-rate and variability analysis"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputOpts {
    /// Newline-delimited samples; read from stdin when no input flag is given
    #[arg(long)]
    input: Option<PathBuf>,
    /// Headered CSV file; the column is selected with --column
    #[arg(long)]
    csv: Option<PathBuf>,
    #[arg(long, default_value = "ppg")]
    column: String,
    /// Signal container written by `crv preprocess`
    #[arg(long)]
    container: Option<PathBuf>,
    /// Sampling rate in Hz; ignored for --container input
    #[arg(long, default_value_t = 250)]
    sample_rate: u32,
}

impl InputOpts {
    fn load(&self) -> Result<Signal> {
        if let Some(path) = &self.container {
            return container::load_signal(path);
        }
        if let Some(path) = &self.csv {
            let data = csv_io::load_column(path, &self.column)?;
            return Ok(Signal::new(data, self.sample_rate));
        }
        if let Some(path) = &self.input {
            return text_io::read_signal(path, self.sample_rate);
        }
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        text_io::parse_signal(&buf, self.sample_rate)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the windowed analysis and print one row per window
    Analyze {
        #[command(flatten)]
        input: InputOpts,
        /// Window width in seconds
        #[arg(long, default_value_t = 10.0)]
        window_width: f64,
        /// Overlap between consecutive windows in seconds
        #[arg(long, default_value_t = 0.0)]
        window_overlap: f64,
        /// Minimum peak prominence on the normalized 0-100 scale
        #[arg(long, default_value_t = 50.0)]
        amplitude_threshold: f64,
        /// Minimum peak separation in milliseconds
        #[arg(long, default_value_t = 250.0)]
        distance_threshold: f64,
        /// Windows with this many peaks or fewer produce an empty row
        #[arg(long, default_value_t = 3)]
        n_required_peaks: usize,
        /// Separate the dominant wave by clustering peak shapes
        #[arg(long)]
        wave_clustering: bool,
        #[arg(long, default_value_t = 0)]
        clustering_seed: u64,
        /// Outlier preset: liberal, moderate or conservative
        #[arg(long, default_value = "moderate")]
        outlier_method: String,
        /// TOML file with explicit outlier thresholds, overriding the preset
        #[arg(long)]
        outlier_settings: Option<PathBuf>,
        /// Emit full JSON rows including per-window diagnostics
        #[arg(long)]
        json: bool,
    },
    /// Condition a raw signal: upsample, filter and smooth
    Preprocess {
        #[command(flatten)]
        input: InputOpts,
        /// Cubic-spline upsampling target in Hz; 0 disables
        #[arg(long, default_value_t = 1000)]
        resample_rate: u32,
        /// Butterworth high-pass cutoff in Hz; 0 disables
        #[arg(long, default_value_t = 0.5)]
        highpass: f64,
        /// Butterworth low-pass cutoff in Hz
        #[arg(long)]
        lowpass: Option<f64>,
        /// Savitzky-Golay polynomial order
        #[arg(long, default_value_t = 3)]
        sg_poly_order: usize,
        /// Savitzky-Golay window in milliseconds
        #[arg(long, default_value_t = 100.0)]
        sg_window: f64,
        #[arg(long)]
        no_smoothing: bool,
        /// Destination container; newline-delimited samples on stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze {
            input,
            window_width,
            window_overlap,
            amplitude_threshold,
            distance_threshold,
            n_required_peaks,
            wave_clustering,
            clustering_seed,
            outlier_method,
            outlier_settings,
            json,
        } => {
            let policy = load_outlier_policy(&outlier_method, outlier_settings.as_ref())?;
            let options = AnalysisOptions {
                window_width,
                window_overlap,
                amplitude_threshold,
                distance_threshold_ms: distance_threshold,
                n_required_peaks,
                wave_clustering,
                clustering_seed,
                outlier_policy: policy,
            };
            cmd_analyze(&input, &options, json)?
        }
        Commands::Preprocess {
            input,
            resample_rate,
            highpass,
            lowpass,
            sg_poly_order,
            sg_window,
            no_smoothing,
            out,
        } => {
            let options = PreprocessOptions {
                resample_rate: (resample_rate > 0).then_some(resample_rate),
                highpass_cutoff: (highpass > 0.0).then_some(highpass),
                lowpass_cutoff: lowpass,
                smoothing: (!no_smoothing).then_some(SmoothingSettings {
                    poly_order: sg_poly_order,
                    window_ms: sg_window,
                }),
            };
            cmd_preprocess(&input, &options, out.as_ref())?
        }
    }
    Ok(())
}

fn load_outlier_policy(method: &str, settings: Option<&PathBuf>) -> Result<OutlierPolicy> {
    match settings {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let parsed: OutlierDetectionSettings = toml::from_str(&text)
                .with_context(|| format!("{} is not a valid settings file", path.display()))?;
            Ok(OutlierPolicy::Custom(parsed))
        }
        None => Ok(OutlierPolicy::Preset(method.to_string())),
    }
}

fn cmd_analyze(input: &InputOpts, options: &AnalysisOptions, json: bool) -> Result<()> {
    let signal = input.load()?;
    let results = analyze(&signal, options)?;
    if json {
        println!("{}", serde_json::to_string(&results)?);
        return Ok(());
    }
    // CSV output carries the scalar columns; the diagnostics payload is
    // JSON-only.
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(&FRAME_COLUMNS[..FRAME_COLUMNS.len() - 1])?;
    for row in &results {
        let values = row.scalar_values();
        let mut record: Vec<String> = values[..8].iter().map(|v| csv_cell(*v)).collect();
        record.push(row.outlier.to_string());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn csv_cell(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        format!("{value}")
    }
}

fn cmd_preprocess(
    input: &InputOpts,
    options: &PreprocessOptions,
    out: Option<&PathBuf>,
) -> Result<()> {
    let signal = input.load()?;
    let conditioned = preprocess(&signal, options)?;
    match out {
        Some(path) => container::save_signal(path, &conditioned)?,
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            for sample in &conditioned.data {
                writeln!(handle, "{sample}")?;
            }
        }
    }
    Ok(())
}
