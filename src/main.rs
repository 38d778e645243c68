use anyhow::{anyhow, Result};
use chapter_core::template::{sample_song, TitleTemplate, PRESETS, TOKENS};
use chapter_core::SamplingStrategy;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use mkv_chapter_renamer::config::{create_default_config, Config, Overrides};
use mkv_chapter_renamer::{app, logging, BackupRestoreManager, ChapterStore, SnapshotOutcome, SystemToolRunner, ToolRunner};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

fn cli() -> Command {
    Command::new("MKV Chapter Renamer")
        .version(env!("CARGO_PKG_VERSION"))
        .author("TigreRoll")
        .about("Recognize the song at each MKV chapter and rename the chapters")
        .arg(Arg::new("mkv-file").value_name("MKV").value_parser(value_parser!(PathBuf)).help("MKV file to process"))
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Write to this file instead of editing the input in place"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("JSON configuration file; command-line options override it"),
        )
        .arg(Arg::new("template").short('t').long("template").value_name("PRESET").help("Title preset (see --list-templates)"))
        .arg(
            Arg::new("custom-template")
                .long("custom-template")
                .value_name("FORMAT")
                .help("Custom title format, e.g. '{name} by {artists}'"),
        )
        .arg(
            Arg::new("strategy")
                .short('s')
                .long("strategy")
                .value_name("STRATEGY")
                .value_parser(["start", "middle", "end", "custom"])
                .help("Where in each chapter to sample"),
        )
        .arg(Arg::new("offset").long("offset").value_name("SECONDS").value_parser(value_parser!(f64)).help("Seconds after chapter start (start strategy)"))
        .arg(Arg::new("percentage").long("percentage").value_name("FRACTION").value_parser(value_parser!(f64)).help("Position 0.0-1.0 inside the chapter (custom strategy)"))
        .arg(Arg::new("duration").short('d').long("duration").value_name("SECONDS").value_parser(value_parser!(u32)).help("Sample length in seconds"))
        .arg(Arg::new("timeout").long("timeout").value_name("SECONDS").value_parser(value_parser!(u64)).help("Per-chapter decode and recognition timeout"))
        .arg(Arg::new("ffmpeg").long("ffmpeg").value_name("PATH").value_parser(value_parser!(PathBuf)).help("ffmpeg executable"))
        .arg(Arg::new("mkvextract").long("mkvextract").value_name("PATH").value_parser(value_parser!(PathBuf)).help("mkvextract executable"))
        .arg(Arg::new("mkvpropedit").long("mkvpropedit").value_name("PATH").value_parser(value_parser!(PathBuf)).help("mkvpropedit executable"))
        .arg(Arg::new("fingerprinter").long("fingerprinter").value_name("PATH").value_parser(value_parser!(PathBuf)).help("Fingerprint command (reads f32le samples on stdin)"))
        .arg(Arg::new("no-backup").long("no-backup").action(ArgAction::SetTrue).help("Do not back up the chapters before renaming"))
        .arg(Arg::new("overwrite-backup").long("overwrite-backup").action(ArgAction::SetTrue).help("Replace an existing backup"))
        .arg(Arg::new("skip-check").long("skip-check").action(ArgAction::SetTrue).help("Do not check that the tools exist"))
        .arg(Arg::new("restore").long("restore").action(ArgAction::SetTrue).help("Restore chapters from the backup"))
        .arg(
            Arg::new("backup-file")
                .long("backup-file")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Backup file to restore from (default: next to the MKV)"),
        )
        .arg(Arg::new("backup").long("backup").action(ArgAction::SetTrue).help("Back up the current chapters and exit"))
        .arg(Arg::new("yes").short('y').long("yes").action(ArgAction::SetTrue).help("Answer yes to confirmation prompts"))
        .arg(Arg::new("dry-run").long("dry-run").action(ArgAction::SetTrue).help("Recognize and report, but write nothing"))
        .arg(Arg::new("list-templates").long("list-templates").action(ArgAction::SetTrue).help("List title presets"))
        .arg(Arg::new("show-variables").long("show-variables").action(ArgAction::SetTrue).help("List template variables"))
        .arg(
            Arg::new("create-config")
                .long("create-config")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Write a default configuration file and exit"),
        )
        .arg(Arg::new("verbose").short('v').long("verbose").action(ArgAction::SetTrue).help("Enable verbose logging"))
}

fn overrides_from(matches: &ArgMatches) -> Result<Overrides> {
    let strategy = matches
        .get_one::<String>("strategy")
        .map(|s| s.parse::<SamplingStrategy>())
        .transpose()
        .map_err(|e| anyhow!(e))?;

    Ok(Overrides {
        mkv_file: matches.get_one::<PathBuf>("mkv-file").cloned(),
        output: matches.get_one::<PathBuf>("output").cloned(),
        template: matches.get_one::<String>("template").cloned(),
        custom_template: matches.get_one::<String>("custom-template").cloned(),
        strategy,
        offset: matches.get_one::<f64>("offset").copied(),
        percentage: matches.get_one::<f64>("percentage").copied(),
        duration: matches.get_one::<u32>("duration").copied(),
        timeout: matches.get_one::<u64>("timeout").copied(),
        ffmpeg: matches.get_one::<PathBuf>("ffmpeg").cloned(),
        mkvextract: matches.get_one::<PathBuf>("mkvextract").cloned(),
        mkvpropedit: matches.get_one::<PathBuf>("mkvpropedit").cloned(),
        fingerprinter: matches.get_one::<PathBuf>("fingerprinter").cloned(),
        no_backup: matches.get_flag("no-backup"),
        skip_check: matches.get_flag("skip-check"),
        overwrite_backup: matches.get_flag("overwrite-backup"),
    })
}

fn list_templates() {
    let sample = sample_song();
    println!("Available title presets:\n");
    for preset in PRESETS {
        let rendered = TitleTemplate::new(preset.format).render_or_fallback(&sample);
        println!("  {:<14} {}", preset.name, preset.description);
        println!("  {:<14} format:  {}", "", preset.format);
        println!("  {:<14} example: {}\n", "", rendered);
    }
}

fn show_variables() {
    println!("Template variables:\n");
    for token in TOKENS {
        let placeholder = format!("{{{}}}", token.token);
        println!("  {:<16} {:<32} e.g. {}", placeholder, token.description, token.example);
    }
    println!("\nUse {{{{ and }}}} for literal braces.");
}

fn confirm_overwrite(path: &Path, assume_yes: bool) -> bool {
    if assume_yes {
        return true;
    }
    print!("Backup {} already exists. Overwrite? [y/N] ", path.display());
    if std::io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    logging::init(matches.get_flag("verbose"), None)?;

    if matches.get_flag("list-templates") {
        list_templates();
        return Ok(());
    }
    if matches.get_flag("show-variables") {
        show_variables();
        return Ok(());
    }
    if let Some(path) = matches.get_one::<PathBuf>("create-config") {
        create_default_config(path)?;
        return Ok(());
    }

    let mut config = Config::load_or_default(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
    config.merge(&overrides_from(&matches)?);
    config.validate()?;

    let container = config.require_container()?.to_path_buf();
    if !container.is_file() {
        return Err(anyhow!("MKV file not found: {}", container.display()));
    }

    let tools = config.resolve_tools()?;
    let runner: Arc<dyn ToolRunner> = Arc::new(SystemToolRunner::new());

    let backups = BackupRestoreManager::new(ChapterStore::new(runner.clone(), &tools));
    let output = config.output_for(&container).to_path_buf();

    if matches.get_flag("restore") {
        let backup_file = matches.get_one::<PathBuf>("backup-file").map(PathBuf::as_path);
        backups.restore(&container, &output, backup_file).await?;
        return Ok(());
    }

    if matches.get_flag("backup") {
        let assume_yes = matches.get_flag("yes");
        match backups.backup_current(&container, |path| confirm_overwrite(path, assume_yes)).await? {
            SnapshotOutcome::Written(path) => info!("✅ Backup saved: {}", path.display()),
            SnapshotOutcome::Declined(path) => info!("Backup unchanged: {}", path.display()),
            _ => {}
        }
        return Ok(());
    }

    info!("🚀 MKV Chapter Renamer starting...");
    info!("📁 File: {}", container.display());
    info!("🎯 Strategy: {}, template: {}", config.recognition.strategy, config.title_template()?);

    let orchestrator = app::build_orchestrator(&config, &tools, runner, matches.get_flag("dry-run"))?;
    let cancel = CancellationToken::new();
    app::cancel_on_ctrl_c(cancel.clone());

    let start_time = std::time::Instant::now();
    let report = orchestrator.run(&container, &cancel).await?;
    info!("🎉 Finished in {:.2}s ({:?})", start_time.elapsed().as_secs_f64(), report.state);

    Ok(())
}
