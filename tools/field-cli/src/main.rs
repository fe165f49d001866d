use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use serde::Serialize;
use spiral_config::{tracing as trace_config, PipelineConfig};
use st_field::archive::{self, ArchiveMode};
use st_field::regress::{Evaluation, RegressorConfig, SparsityReport, StandardizedRegressor};
use st_field::window::{OutputSelection, WindowSampler, WindowShape};
use st_field::{consolidate, subset, TensorSummary};
use std::error::Error;
use std::fs;
use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

type DynError = Box<dyn Error>;

type Result<T> = std::result::Result<T, DynError>;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Consolidation and windowing driver for gridded simulation fields"
)]
struct Cli {
    /// Pipeline configuration (JSON). SPIRAL_FIELD_* variables override it
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Consolidate per-variable series files into one archive
    Merge(MergeArgs),

    /// Print shape, memory footprint and per-variable ranges of an archive
    Inspect(InspectArgs),

    /// Rewrite an archive in another mode
    Compress(CompressArgs),

    /// Write the first snapshots of an archive as an uncompressed archive
    DevSubset(DevSubsetArgs),

    /// Fit a windowed ridge regressor between two variables of an archive
    Fit(FitArgs),

    /// Copy files between directories, skipping ones already present
    Stage(StageArgs),

    /// Delete intermediate files after confirmation
    Cleanup(CleanupArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Fast,
    Compact,
}

impl From<ModeArg> for ArchiveMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Fast => ArchiveMode::Fast,
            ModeArg::Compact => ArchiveMode::Compact,
        }
    }
}

#[derive(Args)]
struct MergeArgs {
    /// Series files in label order
    #[arg(long = "series", required = true, num_args = 1.., value_hint = ValueHint::FilePath)]
    series: Vec<PathBuf>,

    /// Destination archive
    #[arg(long, value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Archive mode; defaults to the configured mode
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Re-check the merged tensor against its inputs and the written archive
    #[arg(long)]
    verify: bool,
}

#[derive(Args)]
struct InspectArgs {
    #[arg(value_hint = ValueHint::FilePath)]
    archive: PathBuf,

    /// Emit the summary as JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct CompressArgs {
    #[arg(long, value_hint = ValueHint::FilePath)]
    input: PathBuf,

    #[arg(long, value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Target mode
    #[arg(long, value_enum, default_value = "compact")]
    mode: ModeArg,

    /// Deflate level 0..=9; defaults to the configured level
    #[arg(long)]
    level: Option<u32>,
}

#[derive(Args)]
struct DevSubsetArgs {
    #[arg(long, value_hint = ValueHint::FilePath)]
    input: PathBuf,

    #[arg(long, value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Snapshots to keep; defaults to the configured count
    #[arg(long)]
    snapshots: Option<usize>,
}

#[derive(Args)]
struct FitArgs {
    #[arg(long, value_hint = ValueHint::FilePath)]
    archive: PathBuf,

    /// Variable whose windows form the features
    #[arg(long)]
    input: String,

    /// Variable predicted at each window centre
    #[arg(long)]
    target: String,

    /// Window extents "t,x,y,z"; defaults to the configured shape
    #[arg(long, value_delimiter = ',')]
    window: Option<Vec<usize>>,

    /// Write the fit report here in addition to STDOUT
    #[arg(long, value_hint = ValueHint::FilePath)]
    report: Option<PathBuf>,
}

#[derive(Args)]
struct StageArgs {
    #[arg(long, value_hint = ValueHint::DirPath)]
    from: PathBuf,

    #[arg(long, value_hint = ValueHint::DirPath)]
    to: PathBuf,

    /// File names relative to --from
    #[arg(required = true)]
    names: Vec<String>,
}

#[derive(Args)]
struct CleanupArgs {
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    files: Vec<PathBuf>,

    /// Delete without asking
    #[arg(long, action = ArgAction::SetTrue)]
    yes: bool,
}

#[derive(Serialize)]
struct FitReport {
    input: String,
    target: String,
    window_shape: [usize; 4],
    train_samples: usize,
    eval_samples: usize,
    dense: Evaluation,
    sparse: Evaluation,
    sparsity: SparsityReport,
}

fn main() {
    if let Err(err) = trace_config::init_tracing() {
        eprintln!("warning: tracing disabled: {err}");
    }
    let outcome = try_main();
    trace_config::flush_chrome_trace();
    if let Err(err) = outcome {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let config = PipelineConfig::resolve(cli.config.as_deref())?;
    match &cli.command {
        Command::Merge(args) => run_merge(&config, args),
        Command::Inspect(args) => run_inspect(args),
        Command::Compress(args) => run_compress(&config, args),
        Command::DevSubset(args) => run_dev_subset(&config, args),
        Command::Fit(args) => run_fit(&config, args),
        Command::Stage(args) => run_stage(args),
        Command::Cleanup(args) => run_cleanup(args),
    }
}

fn run_merge(config: &PipelineConfig, args: &MergeArgs) -> Result<()> {
    let series = args
        .series
        .iter()
        .map(|path| archive::load_series(path))
        .collect::<st_field::FieldResult<Vec<_>>>()?;
    let mode = args
        .mode
        .map(ArchiveMode::from)
        .unwrap_or_else(|| config.archive_mode.into());
    let tensor = consolidate::merge_to_archive(&series, &args.output, mode, args.verify)?;
    println!(
        "merged {} variables {:?} into {}",
        tensor.variable_count(),
        tensor.labels().as_slice(),
        args.output.display()
    );
    Ok(())
}

fn run_inspect(args: &InspectArgs) -> Result<()> {
    let (tensor, mode) = archive::load_with_mode(&args.archive)?;
    let summary = TensorSummary::of(&tensor);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("archive: {} ({:?})", args.archive.display(), mode);
        print!("{summary}");
    }
    Ok(())
}

fn run_compress(config: &PipelineConfig, args: &CompressArgs) -> Result<()> {
    let level = args.level.unwrap_or(config.compression_level);
    if level > 9 {
        return Err(invalid_input(format!("compression level {level} exceeds 9")));
    }
    let before = fs::metadata(&args.input)?.len();
    archive::recompress(&args.input, &args.output, args.mode.into(), level)?;
    let after = fs::metadata(&args.output)?.len();
    println!(
        "{} ({before} bytes) -> {} ({after} bytes)",
        args.input.display(),
        args.output.display()
    );
    Ok(())
}

fn run_dev_subset(config: &PipelineConfig, args: &DevSubsetArgs) -> Result<()> {
    let count = args.snapshots.unwrap_or(config.dev_snapshots);
    let subset = subset::create_dev_archive(&args.input, &args.output, count)?;
    println!(
        "wrote {} snapshots to {}",
        subset.snapshot_count(),
        args.output.display()
    );
    Ok(())
}

fn run_fit(config: &PipelineConfig, args: &FitArgs) -> Result<()> {
    let extents = match &args.window {
        Some(values) => <[usize; 4]>::try_from(values.as_slice())
            .map_err(|_| invalid_input("--window takes exactly four extents"))?,
        None => config.window_shape,
    };
    let shape = WindowShape::new(extents)?;
    let tensor = archive::load(&args.archive)?;

    // Every point whose window stays inside the tensor.
    let [t, x, y, z, _] = tensor.shape();
    let margins = shape.margins();
    let mut ranges = [0..0, 0..0, 0..0, 0..0];
    for (d, extent) in [t, x, y, z].into_iter().enumerate() {
        ranges[d] = margins[d]..extent.saturating_sub(margins[d]);
    }
    let selection = OutputSelection::from_ranges(ranges)?;

    let sampler = WindowSampler::new(shape);
    let batch = sampler.batch(&tensor, &selection, &args.input, &args.target)?;
    let (train, eval) = if config.holdout_fraction > 0.0 {
        batch.split(config.holdout_fraction, config.seed)?
    } else {
        warn!("holdout fraction is zero; evaluating on the training windows");
        (batch.clone(), batch)
    };

    let mut regressor = StandardizedRegressor::fit(&train, &RegressorConfig::from(config))?;
    let dense = regressor.evaluate(&eval)?;
    let sparsity = regressor.sparsify(config.keep_ratio)?;
    let sparse = regressor.evaluate(&eval)?;
    info!(rmse = dense.rmse, r2 = dense.r2, "evaluated regressor");

    let report = FitReport {
        input: args.input.clone(),
        target: args.target.clone(),
        window_shape: extents,
        train_samples: train.len(),
        eval_samples: eval.len(),
        dense,
        sparse,
        sparsity,
    };
    let payload = serde_json::to_string_pretty(&report)?;
    if let Some(path) = &args.report {
        ensure_parent_dir(path)?;
        fs::write(path, &payload)?;
    }
    println!("{payload}");
    Ok(())
}

fn run_stage(args: &StageArgs) -> Result<()> {
    fs::create_dir_all(&args.to)?;
    let mut copied = 0usize;
    let mut skipped = 0usize;
    for name in &args.names {
        let source = args.from.join(name);
        let destination = args.to.join(name);
        if destination.exists() {
            info!(file = %destination.display(), "already staged");
            skipped += 1;
            continue;
        }
        if !source.is_file() {
            return Err(Box::new(io::Error::new(
                ErrorKind::NotFound,
                format!("{} does not exist", source.display()),
            )));
        }
        ensure_parent_dir(&destination)?;
        fs::copy(&source, &destination)?;
        copied += 1;
    }
    println!("staged {copied} files, skipped {skipped}");
    Ok(())
}

fn run_cleanup(args: &CleanupArgs) -> Result<()> {
    let existing: Vec<&PathBuf> = args.files.iter().filter(|path| path.is_file()).collect();
    for missing in args.files.iter().filter(|path| !path.is_file()) {
        warn!(file = %missing.display(), "not found, skipping");
    }
    if existing.is_empty() {
        println!("nothing to delete");
        return Ok(());
    }
    if !args.yes && !confirm(&existing)? {
        println!("aborted, no files deleted");
        return Ok(());
    }
    for path in &existing {
        fs::remove_file(path)?;
    }
    println!("deleted {} files", existing.len());
    Ok(())
}

fn confirm(files: &[&PathBuf]) -> Result<bool> {
    let mut stdout = io::stdout();
    for path in files {
        writeln!(stdout, "  {}", path.display())?;
    }
    write!(stdout, "delete {} files? [y/N] ", files.len())?;
    stdout.flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn invalid_input(message: impl Into<String>) -> DynError {
    Box::new(io::Error::new(ErrorKind::InvalidInput, message.into()))
}

fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
