//! Shared, read-only run resources: resolved directories, configuration files
//! and the keyword dictionary.
//!
//! Any problem here is a [`ConfigurationError`] and aborts the run before
//! dispatch.

use crate::domain::error::ConfigurationError;
use crate::domain::exposure::InstrumentMode;
use crate::domain::mode::ModeKey;
use crate::keywords::Keywords;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Resolved path bundle for one night.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directories {
    pub pipeline_home: PathBuf,
    pub data_root: PathBuf,
    pub product_root: PathBuf,
    pub night: String,

    /// `<data_root>/<night>`: raw frames.
    pub data_dir: PathBuf,

    /// `<product_root>/<night>`: parent of every mode product directory.
    pub product_dir: PathBuf,

    /// `<pipeline_home>/config`.
    pub config_dir: PathBuf,
}

impl Directories {
    /// Resolve and validate the night's directories.
    ///
    /// The pipeline home and the night's raw directory must exist. The product
    /// directory is created lazily by the dispatcher.
    pub fn resolve(
        pipeline_home: impl Into<PathBuf>,
        data_root: impl Into<PathBuf>,
        product_root: impl Into<PathBuf>,
        night: &str,
    ) -> Result<Self, ConfigurationError> {
        let night = night.trim();
        if night.is_empty() {
            return Err(ConfigurationError::EmptyNight);
        }

        let pipeline_home = pipeline_home.into();
        let data_root = data_root.into();
        let product_root = product_root.into();

        if !pipeline_home.is_dir() {
            return Err(ConfigurationError::MissingDirectory {
                role: "pipeline home",
                path: pipeline_home,
            });
        }

        let data_dir = data_root.join(night);
        if !data_dir.is_dir() {
            return Err(ConfigurationError::MissingDirectory {
                role: "night data",
                path: data_dir,
            });
        }

        Ok(Self {
            config_dir: pipeline_home.join("config"),
            product_dir: product_root.join(night),
            pipeline_home,
            data_root,
            product_root,
            night: night.to_string(),
            data_dir,
        })
    }

    /// `<product_root>/<night>/<mode slug>`.
    pub fn mode_product_dir(&self, key: &ModeKey) -> PathBuf {
        self.product_dir.join(key.slug())
    }
}

/// Extra instrument-mode pattern from the settings file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModePatternSetting {
    pub pattern: String,
    pub mode: InstrumentMode,
}

/// Optional `config/opera.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineSettings {
    /// Reduction executor program.
    pub executor_program: String,

    /// Arguments placed before the per-mode parameter bundle.
    pub executor_args: Vec<String>,

    /// Per-mode timeout in seconds; 0 disables it.
    pub timeout_secs: u64,

    /// File name suffix of raw frames in the night directory.
    pub raw_suffix: String,

    /// Name of the per-mode scratch directory.
    pub scratch_dir_name: String,

    /// Instrument-mode patterns tried after the built-in ones.
    pub mode_patterns: Vec<ModePatternSetting>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            executor_program: "operaespadons".to_string(),
            executor_args: Vec::new(),
            timeout_secs: 0,
            raw_suffix: "o.fits".to_string(),
            scratch_dir_name: "tmp".to_string(),
            mode_patterns: Vec::new(),
        }
    }
}

impl PipelineSettings {
    fn validate(&self, path: &Path) -> Result<(), ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidSettings {
            path: path.to_path_buf(),
            reason,
        };

        if self.executor_program.trim().is_empty() {
            return Err(invalid("executor_program must not be empty".to_string()));
        }
        if self.raw_suffix.is_empty() {
            return Err(invalid("raw_suffix must not be empty".to_string()));
        }
        let name = self.scratch_dir_name.as_str();
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(invalid(format!(
                "scratch_dir_name '{}' must be a plain directory name",
                name
            )));
        }
        Ok(())
    }
}

/// Configuration files available to every mode's reduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFiles {
    pub config_dir: PathBuf,

    /// File name to path, for every regular file in `config_dir`.
    pub files: BTreeMap<String, PathBuf>,

    pub settings: PipelineSettings,
}

impl ConfigFiles {
    pub const SETTINGS_FILE: &'static str = "opera.toml";

    /// Index `<pipeline_home>/config` and load the optional settings file.
    pub fn locate(dirs: &Directories) -> Result<Self, ConfigurationError> {
        let config_dir = dirs.config_dir.clone();
        if !config_dir.is_dir() {
            return Err(ConfigurationError::MissingDirectory {
                role: "config",
                path: config_dir,
            });
        }

        let unreadable = |path: &Path, e: std::io::Error| ConfigurationError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let mut files = BTreeMap::new();
        for entry in std::fs::read_dir(&config_dir).map_err(|e| unreadable(&config_dir, e))? {
            let path = entry.map_err(|e| unreadable(&config_dir, e))?.path();
            if path.is_file() {
                if let Some(name) = path.file_name() {
                    files.insert(name.to_string_lossy().to_string(), path);
                }
            }
        }

        let settings = match files.get(Self::SETTINGS_FILE) {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| unreadable(path, e))?;
                let settings: PipelineSettings =
                    toml::from_str(&text).map_err(|e| ConfigurationError::InvalidSettings {
                        path: path.clone(),
                        reason: e.to_string(),
                    })?;
                settings.validate(path)?;
                settings
            }
            None => PipelineSettings::default(),
        };

        Ok(Self {
            config_dir,
            files,
            settings,
        })
    }

    pub fn get(&self, name: &str) -> Option<&Path> {
        self.files.get(name).map(PathBuf::as_path)
    }

    /// ESPaDOnS keywords extended with the configured mode patterns.
    pub fn keywords(&self) -> Result<Keywords, ConfigurationError> {
        let mut keywords = Keywords::espadons();
        for setting in &self.settings.mode_patterns {
            keywords
                .add_mode_pattern(&setting.pattern, setting.mode)
                .map_err(|e| ConfigurationError::InvalidSettings {
                    path: self.config_dir.join(Self::SETTINGS_FILE),
                    reason: format!("mode pattern '{}': {}", setting.pattern, e),
                })?;
        }
        Ok(keywords)
    }
}

/// Everything a dispatch reads and nothing it may mutate.
#[derive(Debug, Clone)]
pub struct SharedResources {
    pub dirs: Directories,
    pub config: ConfigFiles,
    pub keywords: Keywords,
}

impl SharedResources {
    /// Resolve directories, locate configuration and build the keyword
    /// dictionary.
    pub fn load(
        pipeline_home: impl Into<PathBuf>,
        data_root: impl Into<PathBuf>,
        product_root: impl Into<PathBuf>,
        night: &str,
    ) -> Result<Self, ConfigurationError> {
        let dirs = Directories::resolve(pipeline_home, data_root, product_root, night)?;
        let config = ConfigFiles::locate(&dirs)?;
        let keywords = config.keywords()?;
        Ok(Self {
            dirs,
            config,
            keywords,
        })
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.config.settings
    }
}
