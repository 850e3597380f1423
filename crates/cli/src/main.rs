use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use timeline::NoProgress;
use tracing::info;
use tracing_subscriber::EnvFilter;
use xmeml::{Document, OptimizeOptions, OptimizeReport};

#[derive(Parser)]
#[command(name = "timeline-repack")]
#[command(about = "Repack FCP7 XML timeline clips onto the fewest non-overlapping tracks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Repack tracks and write an optimized copy of the timeline
    Optimize {
        /// Input XML file
        input: PathBuf,

        /// Output XML file (defaults to <input>_optimized.<ext> next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        kinds: KindArgs,

        /// Also write the track counts as JSON
        #[arg(long)]
        report: Option<PathBuf>,

        /// Hide the progress bar
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show the track counts optimizing would produce, without writing anything
    Analyze {
        /// Input XML file
        input: PathBuf,

        #[command(flatten)]
        kinds: KindArgs,
    },
}

#[derive(Args, Debug, Clone, Copy)]
struct KindArgs {
    /// Leave video tracks untouched
    #[arg(long)]
    no_video: bool,

    /// Leave audio tracks untouched
    #[arg(long)]
    no_audio: bool,
}

impl KindArgs {
    fn options(self) -> OptimizeOptions {
        OptimizeOptions {
            video: !self.no_video,
            audio: !self.no_audio,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    match cli.command {
        Commands::Optimize {
            input,
            output,
            kinds,
            report,
            quiet,
        } => optimize_command(input, output, kinds.options(), report, quiet),
        Commands::Analyze { input, kinds } => analyze_command(input, kinds.options()),
    }
}

fn optimize_command(
    input: PathBuf,
    output: Option<PathBuf>,
    options: OptimizeOptions,
    report_path: Option<PathBuf>,
    quiet: bool,
) -> Result<()> {
    check_input(&input, options)?;
    let output = output.unwrap_or_else(|| default_output_path(&input));

    info!("Optimizing {:?} -> {:?}", input, output);

    let bar = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(100)
    };
    bar.set_style(progress_style());

    let result = xmeml::process(&input, &output, options, &mut |percent: f64| {
        bar.set_position(percent.round() as u64)
    });
    bar.finish_and_clear();

    let report = result
        .with_context(|| format!("Failed to optimize timeline {}", input.display()))?;

    print_summary(&output, options, &report);

    if let Some(report_path) = report_path {
        write_report(&report_path, &input, &output, options, &report)?;
        info!("Report written to: {:?}", report_path);
    }

    Ok(())
}

fn analyze_command(input: PathBuf, options: OptimizeOptions) -> Result<()> {
    check_input(&input, options)?;

    let raw = std::fs::read(&input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let mut document = Document::parse_bytes(&raw)
        .with_context(|| format!("Failed to parse {}", input.display()))?;
    let report = xmeml::optimize_document(&mut document, options, &mut NoProgress)?;

    let analysis = serde_json::json!({
        "input": input,
        "options": options,
        "report": report,
    });
    println!("{}", serde_json::to_string_pretty(&analysis)?);

    Ok(())
}

fn check_input(input: &Path, options: OptimizeOptions) -> Result<()> {
    if !input.exists() {
        bail!("Input file not found: {}", input.display());
    }
    if options.is_empty() {
        bail!("Nothing to optimize: --no-video and --no-audio were both given");
    }
    Ok(())
}

/// `cut.xml` becomes `cut_optimized.xml` in the same directory.
fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("timeline");
    let name = match input.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}_optimized.{}", stem, ext),
        None => format!("{}_optimized", stem),
    };
    input.with_file_name(name)
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}%")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

fn print_summary(output: &Path, options: OptimizeOptions, report: &OptimizeReport) {
    println!("Timeline optimized and saved to: {}", output.display());
    for kind in options.kinds() {
        let counts = report.counts(kind);
        println!(
            "  {}: original tracks: {}, optimized: {}",
            kind, counts.original, counts.optimized
        );
        if counts.skipped_clips > 0 {
            println!(
                "  {}: {} clips without usable start/end were dropped",
                kind, counts.skipped_clips
            );
        }
    }
}

fn write_report(
    path: &Path,
    input: &Path,
    output: &Path,
    options: OptimizeOptions,
    report: &OptimizeReport,
) -> Result<()> {
    let results_json = serde_json::json!({
        "input": input,
        "output": output,
        "options": options,
        "report": report,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    });

    std::fs::write(path, serde_json::to_string_pretty(&results_json)?)
        .with_context(|| format!("Failed to write report {}", path.display()))?;
    Ok(())
}
