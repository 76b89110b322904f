use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SeqvidError, SeqvidResult};
use crate::natural::SortOptions;
use crate::types::{Backend, Codec, ColorManagement, Quality};

/// Name of the project-local config file.
pub const CONFIG_FILE_NAME: &str = "seqvid.toml";

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct EncoderConfig {
    /// Explicit FFmpeg executable; empty or unset means auto-detect.
    pub ffmpeg_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HostConfig {
    /// Host application executable used for the host backend.
    pub binary: Option<PathBuf>,
    /// Arguments for a headless render. `{setup}`, `{output}` and `{status}`
    /// are substituted.
    pub render_args: Vec<String>,
    /// Arguments to open the setup artifact interactively.
    pub open_args: Vec<String>,
    /// Extension of the generated setup artifact.
    pub project_extension: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            binary: None,
            render_args: vec![
                "--background".to_string(),
                "{setup}".to_string(),
                "--render-anim".to_string(),
            ],
            open_args: vec!["{setup}".to_string()],
            project_extension: "json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SortConfig {
    /// Unset means follow the platform (insensitive on Windows and macOS).
    pub case_sensitive: Option<bool>,
}

impl SortConfig {
    pub fn options(&self) -> SortOptions {
        match self.case_sensitive {
            Some(flag) => SortOptions::case_sensitive(flag),
            None => SortOptions::platform(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub poll_interval_ms: u64,
    /// Grace period after a terminate request before the process is killed.
    pub cancel_timeout_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            cancel_timeout_ms: 5000,
        }
    }
}

impl SupervisorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }

    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub codec: Codec,
    pub quality: Quality,
    pub fps: f64,
    pub backend: Backend,
    pub preserve_alpha: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            codec: Codec::H264,
            quality: Quality::Medium,
            fps: 24.0,
            backend: Backend::Ffmpeg,
            preserve_alpha: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SeqvidConfig {
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub sort: SortConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub color: ColorManagement,
}

impl SeqvidConfig {
    pub fn from_toml_str(contents: &str) -> SeqvidResult<Self> {
        toml::from_str(contents).map_err(|e| SeqvidError::Config(e.to_string()))
    }

    pub fn load_from_file(path: &Path) -> SeqvidResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| SeqvidError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn save_to_file(&self, path: &Path) -> SeqvidResult<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| SeqvidError::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Config search order: `./seqvid.toml`, then `<config dir>/seqvid/config.toml`.
    pub fn default_locations() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("seqvid").join("config.toml"));
        }
        paths
    }

    /// Load the explicit file if given, else the first default location that
    /// exists, else built-in defaults. Returns where it was loaded from.
    pub fn discover(explicit: Option<&Path>) -> SeqvidResult<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load_from_file(path)?, Some(path.to_path_buf())));
        }
        for path in Self::default_locations() {
            if path.is_file() {
                return Ok((Self::load_from_file(&path)?, Some(path)));
            }
        }
        Ok((Self::default(), None))
    }
}
