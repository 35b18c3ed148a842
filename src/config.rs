//! Pipeline configuration, resolved once at process start.
//!
//! Every field has a default matching the layout the study used, so running
//! without a config file works. A YAML file may override any subset:
//!
//! ```yaml
//! data_dir: ./data
//! sample:
//!   size: 100
//!   seed: 42
//! delays:
//!   plot_ms: 1500
//! stop_on_quota: true
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Everything a stage needs besides credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of every input and output file.
    pub data_dir: PathBuf,
    pub sample: SampleConfig,
    pub delays: DelayConfig,
    pub endpoints: Endpoints,
    pub thematic: ThematicConfig,
    /// Stop a pass at the first quota rejection instead of continuing.
    pub stop_on_quota: bool,
    pub user_agent: String,
}

/// Inputs and parameters for the `sample` stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleConfig {
    /// Source CSVs relative to `data_dir`; the first is the primary dataset.
    pub inputs: Vec<PathBuf>,
    pub size: usize,
    pub seed: u64,
}

/// Pause after each external call, per source, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayConfig {
    pub plot_ms: u64,
    pub poster_ms: u64,
    pub subtitle_ms: u64,
    pub metadata_ms: u64,
    pub thematic_ms: u64,
}

/// Base URLs of the external services. Overridable for testing or mirrors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub omdb: String,
    pub tmdb: String,
    pub tmdb_images: String,
    pub opensubtitles: String,
    pub genderize: String,
}

/// Limits and template for the `thematic` stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThematicConfig {
    /// Name of the chat template in the model client's config directory.
    pub template: String,
    /// Combined text shorter than this (after trimming) is not classified.
    pub min_chars: usize,
    /// Combined text is cut to this many characters before sending.
    pub max_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            sample: SampleConfig::default(),
            delays: DelayConfig::default(),
            endpoints: Endpoints::default(),
            thematic: ThematicConfig::default(),
            stop_on_quota: false,
            user_agent: format!("film_enrich v{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            inputs: vec![
                PathBuf::from("bollywood_2010-2019.csv"),
                PathBuf::from("bollywood_meta_2010-2019.csv"),
                PathBuf::from("bollywood_ratings_2010-2019.csv"),
                PathBuf::from("bollywood_text_2010-2019.csv"),
            ],
            size: 100,
            seed: 42,
        }
    }
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            plot_ms: 1500,
            poster_ms: 1500,
            subtitle_ms: 2000,
            metadata_ms: 1500,
            thematic_ms: 2000,
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            omdb: "http://www.omdbapi.com/".into(),
            tmdb: "https://api.themoviedb.org/3/".into(),
            tmdb_images: "https://image.tmdb.org/t/p/w500".into(),
            opensubtitles: "https://api.opensubtitles.com/api/v1/".into(),
            genderize: "https://api.genderize.io/".into(),
        }
    }
}

impl Default for ThematicConfig {
    fn default() -> Self {
        Self {
            template: "thematic_coding".into(),
            min_chars: 100,
            max_chars: 12_000,
        }
    }
}

impl DelayConfig {
    /// Pause between OMDb calls.
    pub fn plot(&self) -> Duration {
        Duration::from_millis(self.plot_ms)
    }
    /// Pause between TMDB poster lookups.
    pub fn poster(&self) -> Duration {
        Duration::from_millis(self.poster_ms)
    }
    /// Pause between OpenSubtitles rows.
    pub fn subtitle(&self) -> Duration {
        Duration::from_millis(self.subtitle_ms)
    }
    /// Pause between metadata rows.
    pub fn metadata(&self) -> Duration {
        Duration::from_millis(self.metadata_ms)
    }
    /// Pause between model calls.
    pub fn thematic(&self) -> Duration {
        Duration::from_millis(self.thematic_ms)
    }
}

impl PipelineConfig {
    /// Load from `path` if given, else use defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&text)?;
        info!(path = %path.display(), "Loaded pipeline configuration");
        Ok(config)
    }

    /// Source CSVs resolved against `data_dir`, primary dataset first.
    pub fn input_paths(&self) -> Vec<PathBuf> {
        self.sample.inputs.iter().map(|p| self.data_dir.join(p)).collect()
    }

    /// `sampled/movies_sampled.csv`
    pub fn sample_path(&self) -> PathBuf {
        self.data_dir.join("sampled").join("movies_sampled.csv")
    }

    /// Directory for per-movie plot `.txt` files.
    pub fn descriptions_dir(&self) -> PathBuf {
        self.data_dir.join("descriptions")
    }

    /// `descriptions/descriptions_all.csv`
    pub fn descriptions_path(&self) -> PathBuf {
        self.descriptions_dir().join("descriptions_all.csv")
    }

    /// Directory for downloaded poster images.
    pub fn posters_dir(&self) -> PathBuf {
        self.data_dir.join("posters")
    }

    /// `posters/posters_all.csv`
    pub fn posters_path(&self) -> PathBuf {
        self.posters_dir().join("posters_all.csv")
    }

    /// Directory for downloaded `.srt` files.
    pub fn subtitles_dir(&self) -> PathBuf {
        self.data_dir.join("subtitles")
    }

    /// `subtitles/subtitles_all.csv`
    pub fn subtitles_path(&self) -> PathBuf {
        self.subtitles_dir().join("subtitles_all.csv")
    }

    /// `metadata/metadata_extended.csv`
    pub fn metadata_path(&self) -> PathBuf {
        self.data_dir.join("metadata").join("metadata_extended.csv")
    }

    /// `thematic_coding.csv`
    pub fn thematic_path(&self) -> PathBuf {
        self.data_dir.join("thematic_coding.csv")
    }

    /// `thematic_coding_clean.csv`
    pub fn thematic_clean_path(&self) -> PathBuf {
        self.data_dir.join("thematic_coding_clean.csv")
    }

    /// `violence_measure.csv`
    pub fn violence_path(&self) -> PathBuf {
        self.data_dir.join("violence_measure.csv")
    }

    /// Directory for JSON run summaries.
    pub fn runs_dir(&self) -> PathBuf {
        self.data_dir.join("runs")
    }
}

/// API keys for the external sources.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub omdb: Option<String>,
    pub tmdb: Option<String>,
    pub opensubtitles: Option<String>,
}

impl Credentials {
    /// The OMDb key, or [`ConfigError::MissingCredential`].
    pub fn omdb(&self) -> Result<&str, ConfigError> {
        require(&self.omdb, "OPENDESCRIPTION_API_KEY")
    }

    /// The TMDB key, or [`ConfigError::MissingCredential`].
    pub fn tmdb(&self) -> Result<&str, ConfigError> {
        require(&self.tmdb, "TMDB_API_KEY")
    }

    /// The OpenSubtitles key, or [`ConfigError::MissingCredential`].
    pub fn opensubtitles(&self) -> Result<&str, ConfigError> {
        require(&self.opensubtitles, "OPENSUBTITLES_API_KEY")
    }
}

fn require<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, ConfigError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingCredential(name))
}
