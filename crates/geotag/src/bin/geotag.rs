//! geotag CLI: locate street objects from panorama detections.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Args, Parser, Subcommand, ValueEnum};
use geotag::batch::{collect_inputs, run_batch};
use geotag::io::{DetectionFormat, RunConfig};
use geotag::locate::run_config;
use geotag::report::RunReport;
use geotag::triangulation::Linkage;
use log::info;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "geotag")]
#[command(about = "Triangulate object locations from bearings in overlapping street panoramas")]
#[command(version)]
struct Cli {
    /// Log level (off, error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit JSON log lines through `tracing`.
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Triangulate one detections file.
    Run(RunArgs),

    /// Triangulate every detections file in a directory, in parallel.
    Batch(BatchArgs),

    /// Print (or write) a config with every default filled in.
    DefaultConfig {
        /// Write to this path instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LinkageArg {
    Single,
    Average,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Coco,
    Csv,
}

#[derive(Debug, Clone, Args)]
struct CommonArgs {
    /// JSON run config; flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Camera table (JSON object keyed by panorama id).
    #[arg(long)]
    cameras: Option<PathBuf>,

    /// Detections format (default: from the file extension).
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// ICM seed; omit to seed from the clock.
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, value_enum)]
    linkage: Option<LinkageArg>,

    /// Drop COCO detections scoring below this.
    #[arg(long)]
    min_score: Option<f64>,

    /// Panorama width in pixels for CSV input.
    #[arg(long)]
    pano_width: Option<u32>,
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    /// Detections file (COCO JSON or `pano_id,center_x` CSV).
    #[arg(long)]
    detections: Option<PathBuf>,

    /// Located-objects CSV.
    #[arg(long)]
    output: Option<PathBuf>,

    /// JSON run report.
    #[arg(long)]
    report: Option<PathBuf>,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Debug, Clone, Args)]
struct BatchArgs {
    /// Directory of detection files.
    #[arg(long)]
    input_dir: PathBuf,

    /// Directory for the per-file CSVs.
    #[arg(long)]
    output_dir: PathBuf,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    match cli.command {
        Commands::Run(args) => run_single(&args),
        Commands::Batch(args) => run_many(&args),
        Commands::DefaultConfig { out } => run_default_config(out.as_deref()),
    }
}

#[cfg(feature = "tracing")]
fn init_logging(cli: &Cli) {
    if cli.json_logs {
        geotag::core::init_tracing(true, geotag::core::parse_level(&cli.log_level));
        return;
    }
    let _ = geotag::core::init_with_level(geotag::core::parse_level(&cli.log_level));
}

#[cfg(not(feature = "tracing"))]
fn init_logging(cli: &Cli) {
    let _ = geotag::core::init_with_level(geotag::core::parse_level(&cli.log_level));
}

fn resolve_config(common: &CommonArgs, detections: Option<&Path>) -> CliResult<RunConfig> {
    let mut cfg = match &common.config {
        Some(path) => RunConfig::load_json(path)?,
        None => {
            let cameras = common
                .cameras
                .as_ref()
                .ok_or("either --config or --cameras is required")?;
            RunConfig::new(String::new(), cameras.to_string_lossy())
        }
    };

    if let Some(path) = detections {
        cfg.detections_path = path.to_string_lossy().into_owned();
    }
    if let Some(path) = &common.cameras {
        cfg.cameras_path = path.to_string_lossy().into_owned();
    }
    if let Some(format) = common.format {
        cfg.detections_format = Some(match format {
            FormatArg::Coco => DetectionFormat::Coco,
            FormatArg::Csv => DetectionFormat::CenterCsv,
        });
    }
    if let Some(seed) = common.seed {
        cfg.params.seed = Some(seed);
    }
    if let Some(linkage) = common.linkage {
        cfg.params.linkage = match linkage {
            LinkageArg::Single => Linkage::Single,
            LinkageArg::Average => Linkage::Average,
        };
    }
    if let Some(min_score) = common.min_score {
        cfg.min_score = Some(min_score);
    }
    if let Some(width) = common.pano_width {
        cfg.pano_width = width;
    }
    Ok(cfg)
}

// ── run ────────────────────────────────────────────────────────────────

fn run_single(args: &RunArgs) -> CliResult<()> {
    let started = Instant::now();
    let mut cfg = resolve_config(&args.common, args.detections.as_deref())?;
    if cfg.detections_path.is_empty() {
        return Err("no detections file: pass --detections or set it in --config".into());
    }
    if let Some(out) = &args.output {
        cfg.output_path = Some(out.to_string_lossy().into_owned());
    }
    if let Some(report) = &args.report {
        cfg.report_path = Some(report.to_string_lossy().into_owned());
    }

    let result = run_config(&cfg);

    if let Some(report_path) = &cfg.report_path {
        let mut report = RunReport::new(
            &cfg,
            args.common.config.as_deref(),
            Path::new(&cfg.detections_path),
        );
        match &result {
            Ok(out) => report.set_output(out.clone()),
            Err(err) => report.set_error(err),
        }
        report.elapsed_s = started.elapsed().as_secs_f64();
        report.write_json(report_path)?;
        info!("report written to {report_path}");
    }

    let out = result?;
    info!("number of output ICM clusters: {}", out.locations.len());
    info!(
        "elapsed total time: {:.2} seconds",
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

// ── batch ──────────────────────────────────────────────────────────────

fn run_many(args: &BatchArgs) -> CliResult<()> {
    let cfg = resolve_config(&args.common, None)?;
    let inputs = collect_inputs(&args.input_dir)?;
    if inputs.is_empty() {
        return Err(format!(
            "no input files found in {}",
            args.input_dir.display()
        )
        .into());
    }

    let outcomes = run_batch(&cfg, &inputs, &args.output_dir)?;
    let mut failed = 0usize;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(out) => println!(
                "{}\t{}\t{}",
                outcome.input.display(),
                out.locations.len(),
                outcome.output.display()
            ),
            Err(err) => {
                failed += 1;
                eprintln!("{}\terror: {err}", outcome.input.display());
            }
        }
    }
    if failed > 0 {
        return Err(format!("{failed} of {} files failed", outcomes.len()).into());
    }
    Ok(())
}

// ── default-config ─────────────────────────────────────────────────────

fn run_default_config(out: Option<&Path>) -> CliResult<()> {
    let cfg = RunConfig::new("coco_instances_results.json", "panoramas.json");
    match out {
        Some(path) => {
            cfg.write_json(path)?;
            info!("default config written to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&cfg)?),
    }
    Ok(())
}
