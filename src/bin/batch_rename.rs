use anyhow::Result;
use chapter_core::SamplingStrategy;
use clap::Parser;
use mkv_chapter_renamer::batch::{BatchOptions, BatchScanner};
use mkv_chapter_renamer::config::{Config, Overrides};
use mkv_chapter_renamer::{app, logging, SystemToolRunner, ToolRunner};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "mkv-chapter-batch")]
#[command(about = "Recognize and rename chapters of every MKV file in a directory")]
struct Cli {
    /// Directory containing MKV files
    directory: PathBuf,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Process files that already have a backup
    #[arg(long)]
    no_skip: bool,

    /// Files processed at once
    #[arg(short, long, default_value_t = 1)]
    workers: usize,

    /// Title preset
    #[arg(short, long)]
    template: Option<String>,

    /// Custom title format
    #[arg(long)]
    custom_template: Option<String>,

    /// Sampling strategy: start, middle, end or custom
    #[arg(short, long)]
    strategy: Option<SamplingStrategy>,

    #[arg(long)]
    offset: Option<f64>,

    #[arg(long)]
    percentage: Option<f64>,

    /// Sample length in seconds
    #[arg(short, long)]
    duration: Option<u32>,

    /// Per-chapter decode and recognition timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    #[arg(long)]
    mkvextract: Option<PathBuf>,

    #[arg(long)]
    mkvpropedit: Option<PathBuf>,

    /// Fingerprint command
    #[arg(long)]
    fingerprinter: Option<PathBuf>,

    #[arg(long)]
    no_backup: bool,

    /// Replace existing backups (only with --no-skip)
    #[arg(long)]
    overwrite_backup: bool,

    #[arg(long)]
    skip_check: bool,

    /// Recognize and report, but write nothing
    #[arg(long)]
    dry_run: bool,

    /// Also write the log to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Write a JSON report of the run
    #[arg(long)]
    report: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            template: self.template.clone(),
            custom_template: self.custom_template.clone(),
            strategy: self.strategy,
            offset: self.offset,
            percentage: self.percentage,
            duration: self.duration,
            timeout: self.timeout,
            ffmpeg: self.ffmpeg.clone(),
            mkvextract: self.mkvextract.clone(),
            mkvpropedit: self.mkvpropedit.clone(),
            fingerprinter: self.fingerprinter.clone(),
            no_backup: self.no_backup,
            skip_check: self.skip_check,
            overwrite_backup: self.overwrite_backup,
            ..Overrides::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_file.as_deref())?;

    let mut config = Config::load_or_default(cli.config.as_deref())?;
    config.merge(&cli.overrides());
    // Each file is edited in place
    config.mkv_file = None;
    config.output = None;
    config.validate()?;

    let tools = config.resolve_tools()?;
    let runner: Arc<dyn ToolRunner> = Arc::new(SystemToolRunner::new());
    let orchestrator = app::build_orchestrator(&config, &tools, runner, cli.dry_run)?;

    let options = BatchOptions {
        recursive: cli.recursive,
        skip_existing: !cli.no_skip,
        workers: cli.workers,
    };
    info!("🚀 Batch rename starting: {}", cli.directory.display());

    let cancel = CancellationToken::new();
    app::cancel_on_ctrl_c(cancel.clone());

    let scanner = BatchScanner::new(orchestrator, options);
    let report = scanner.run(&cli.directory, &cancel).await?;

    if let Some(path) = &cli.report {
        report.write_to(path)?;
    }

    let elapsed = report.finished_at - report.started_at;
    info!("🎉 Batch finished in {:.1}s", elapsed.num_milliseconds() as f64 / 1000.0);
    Ok(())
}
