//! JSON configuration, CLI overrides and validation

use crate::backup::BackupPolicy;
use crate::error::{RenameError, Result};
use chapter_core::{SamplingPolicy, SamplingStrategy, TemplateSpec, TitleTemplate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_CATALOG_ENDPOINT: &str = "https://interface.music.163.com/api/music/audio/match";

/// Persisted configuration document.
///
/// Every key is optional on disk; absent keys take their default and unknown
/// keys such as `_comments` are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Container to process
    pub mkv_file: Option<PathBuf>,

    /// Output container, defaults to editing `mkv_file` in place
    pub output: Option<PathBuf>,

    /// Preset name
    pub template: String,

    /// Raw format string, wins over `template` when non-empty
    pub custom_template: Option<String>,

    pub recognition: RecognitionConfig,
    pub tools: ToolPaths,
    pub options: OptionsConfig,
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub strategy: SamplingStrategy,
    pub offset: f64,
    pub percentage: f64,
    /// Sample length in seconds
    pub duration: u32,
    /// Per-chapter limit for decode and recognition, in seconds
    pub timeout: u64,
}

/// Tool locations, threaded explicitly into every component that runs a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub mkvextract: PathBuf,
    pub mkvpropedit: PathBuf,
    /// Fingerprint command reading f32le samples on stdin
    pub fingerprinter: Option<PathBuf>,
    pub fingerprinter_args: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionsConfig {
    pub no_backup: bool,
    pub skip_check: bool,
    pub overwrite_backup: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub endpoint: String,
    pub requests_per_second: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mkv_file: None,
            output: None,
            template: chapter_core::template::DEFAULT_PRESET.to_string(),
            custom_template: None,
            recognition: RecognitionConfig::default(),
            tools: ToolPaths::default(),
            options: OptionsConfig::default(),
            catalog: CatalogConfig::default(),
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        let policy = SamplingPolicy::default();
        Self {
            strategy: policy.strategy,
            offset: policy.offset,
            percentage: policy.percentage,
            duration: policy.duration,
            timeout: 30,
        }
    }
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            mkvextract: PathBuf::from("mkvextract"),
            mkvpropedit: PathBuf::from("mkvpropedit"),
            fingerprinter: None,
            fingerprinter_args: Vec::new(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_CATALOG_ENDPOINT.to_string(),
            requests_per_second: 2,
        }
    }
}

/// Command-line values. `None` / `false` means "not given".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub mkv_file: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub template: Option<String>,
    pub custom_template: Option<String>,
    pub strategy: Option<SamplingStrategy>,
    pub offset: Option<f64>,
    pub percentage: Option<f64>,
    pub duration: Option<u32>,
    pub timeout: Option<u64>,
    pub ffmpeg: Option<PathBuf>,
    pub mkvextract: Option<PathBuf>,
    pub mkvpropedit: Option<PathBuf>,
    pub fingerprinter: Option<PathBuf>,
    pub no_backup: bool,
    pub skip_check: bool,
    pub overwrite_backup: bool,
}

impl Config {
    /// Load a JSON configuration document
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| RenameError::io(path, e))?;
        let config: Config = serde_json::from_str(&text).map_err(|e| {
            RenameError::Configuration(format!("invalid config file {}: {}", path.display(), e))
        })?;
        info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Load `path` when given, otherwise start from defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| RenameError::Configuration(format!("cannot serialize config: {}", e)))
    }

    /// Apply command-line values; anything given on the command line wins
    pub fn merge(&mut self, overrides: &Overrides) {
        fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
            if let Some(value) = value {
                *slot = value.clone();
            }
        }

        if overrides.mkv_file.is_some() {
            self.mkv_file = overrides.mkv_file.clone();
        }
        if overrides.output.is_some() {
            self.output = overrides.output.clone();
        }
        set(&mut self.template, &overrides.template);
        if overrides.custom_template.is_some() {
            self.custom_template = overrides.custom_template.clone();
        }

        set(&mut self.recognition.strategy, &overrides.strategy);
        set(&mut self.recognition.offset, &overrides.offset);
        set(&mut self.recognition.percentage, &overrides.percentage);
        set(&mut self.recognition.duration, &overrides.duration);
        set(&mut self.recognition.timeout, &overrides.timeout);

        set(&mut self.tools.ffmpeg, &overrides.ffmpeg);
        set(&mut self.tools.mkvextract, &overrides.mkvextract);
        set(&mut self.tools.mkvpropedit, &overrides.mkvpropedit);
        if overrides.fingerprinter.is_some() {
            self.tools.fingerprinter = overrides.fingerprinter.clone();
        }

        self.options.no_backup |= overrides.no_backup;
        self.options.skip_check |= overrides.skip_check;
        self.options.overwrite_backup |= overrides.overwrite_backup;
    }

    /// Reject settings that would misbehave, before anything touches a container
    pub fn validate(&self) -> Result<()> {
        let recognition = &self.recognition;
        if recognition.duration == 0 {
            return Err(RenameError::Configuration("recognition.duration must be greater than 0".into()));
        }
        if !recognition.offset.is_finite() {
            return Err(RenameError::Configuration("recognition.offset must be a number".into()));
        }
        if !(0.0..=1.0).contains(&recognition.percentage) {
            return Err(RenameError::Configuration(format!(
                "recognition.percentage must be between 0.0 and 1.0, got {}",
                recognition.percentage
            )));
        }
        if recognition.timeout == 0 {
            return Err(RenameError::Configuration("recognition.timeout must be greater than 0".into()));
        }
        if self.catalog.requests_per_second == 0 {
            return Err(RenameError::Configuration("catalog.requests_per_second must be greater than 0".into()));
        }

        self.title_template()?;
        debug!("✅ Configuration validation passed");
        Ok(())
    }

    /// The container path, required for single-file runs
    pub fn require_container(&self) -> Result<&Path> {
        self.mkv_file
            .as_deref()
            .ok_or_else(|| RenameError::Configuration("no MKV file given (mkv_file)".into()))
    }

    /// Commit target: explicit output, else the source itself
    pub fn output_for<'a>(&'a self, source: &'a Path) -> &'a Path {
        self.output.as_deref().unwrap_or(source)
    }

    pub fn sampling_policy(&self) -> SamplingPolicy {
        SamplingPolicy {
            strategy: self.recognition.strategy,
            offset: self.recognition.offset,
            percentage: self.recognition.percentage,
            duration: self.recognition.duration,
        }
    }

    pub fn template_spec(&self) -> TemplateSpec {
        TemplateSpec::from_parts(Some(&self.template), self.custom_template.as_deref())
    }

    pub fn title_template(&self) -> Result<TitleTemplate> {
        Ok(self.template_spec().resolve()?)
    }

    pub fn chapter_timeout(&self) -> Duration {
        Duration::from_secs(self.recognition.timeout)
    }

    pub fn backup_policy(&self) -> BackupPolicy {
        if self.options.no_backup {
            BackupPolicy::Disabled
        } else if self.options.overwrite_backup {
            BackupPolicy::Overwrite
        } else {
            BackupPolicy::CreateIfMissing
        }
    }

    /// Resolve bare tool names on `PATH` unless `skip_check` is set
    pub fn resolve_tools(&self) -> Result<ToolPaths> {
        if self.options.skip_check {
            debug!("Skipping tool check");
            return Ok(self.tools.clone());
        }

        let locate = |name: &str, path: &Path| -> Result<PathBuf> {
            which::which(path).map_err(|e| {
                RenameError::Configuration(format!("{} not found ({}): {}", name, path.display(), e))
            })
        };

        let mut tools = self.tools.clone();
        tools.ffmpeg = locate("ffmpeg", &self.tools.ffmpeg)?;
        tools.mkvextract = locate("mkvextract", &self.tools.mkvextract)?;
        tools.mkvpropedit = locate("mkvpropedit", &self.tools.mkvpropedit)?;
        if let Some(fingerprinter) = &self.tools.fingerprinter {
            tools.fingerprinter = Some(locate("fingerprinter", fingerprinter)?);
        }

        info!("🔧 Tools: ffmpeg={}, mkvextract={}, mkvpropedit={}",
              tools.ffmpeg.display(), tools.mkvextract.display(), tools.mkvpropedit.display());
        Ok(tools)
    }
}

/// Write a configuration document with every key at its default plus a
/// `_comments` block describing the keys
pub fn create_default_config(path: &Path) -> Result<()> {
    let mut document = serde_json::to_value(Config::default())
        .map_err(|e| RenameError::Configuration(e.to_string()))?;

    if let Some(object) = document.as_object_mut() {
        object.insert(
            "_comments".to_string(),
            serde_json::json!({
                "mkv_file": "MKV file to process",
                "output": "Output file, empty to edit the input in place",
                "template": "Preset name: default, with_trans, full, simple, artist_first, with_id, detailed, japanese, minimal",
                "custom_template": "Custom format string, overrides template. Tokens: {name} {trans_name} {artists} {artist_first} {album} {id} {popularity}",
                "recognition.strategy": "start, middle, end or custom",
                "recognition.offset": "Seconds after chapter start (start strategy)",
                "recognition.percentage": "Position inside the chapter, 0.0 to 1.0 (custom strategy)",
                "recognition.duration": "Sample length in seconds",
                "recognition.timeout": "Per-chapter timeout in seconds",
                "tools": "Tool paths, bare names are looked up on PATH",
                "options.no_backup": "Do not write a chapter backup",
                "options.skip_check": "Do not check that tools exist",
                "options.overwrite_backup": "Replace an existing backup",
                "catalog.requests_per_second": "Rate limit for song lookups"
            }),
        );
    }

    let text = serde_json::to_string_pretty(&document)
        .map_err(|e| RenameError::Configuration(e.to_string()))?;
    std::fs::write(path, text + "\n").map_err(|e| RenameError::io(path, e))?;
    info!("💾 Default configuration written to: {}", path.display());
    Ok(())
}
