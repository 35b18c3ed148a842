//! Command-line interface definitions.
//!
//! One subcommand per pipeline stage. API keys can be given as flags or via
//! the environment (a `.env` file in the working directory is read first).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Credentials;

/// Command-line arguments for `film_enrich`.
///
/// # Examples
///
/// ```sh
/// film_enrich sample --size 100 --seed 42
/// film_enrich -d ./data plots
/// film_enrich --config pipeline.yaml thematic
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a pipeline YAML config
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory (overrides the config file)
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// OMDb plot description API key
    #[arg(long, env = "OPENDESCRIPTION_API_KEY", global = true, hide_env_values = true)]
    pub omdb_api_key: Option<String>,

    /// TMDB API key
    #[arg(long, env = "TMDB_API_KEY", global = true, hide_env_values = true)]
    pub tmdb_api_key: Option<String>,

    /// OpenSubtitles API key
    #[arg(long, env = "OPENSUBTITLES_API_KEY", global = true, hide_env_values = true)]
    pub opensubtitles_api_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Pipeline stages. Each runs one pass and exits.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Join the source CSVs and draw a seeded random sample
    Sample {
        /// Rows to draw (overrides the config file)
        #[arg(long)]
        size: Option<usize>,
        /// Random seed (overrides the config file)
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Fetch full plot descriptions from OMDb
    Plots,
    /// Download poster images via TMDB
    Posters,
    /// Download English subtitles from OpenSubtitles
    Subtitles,
    /// Collect director, director gender and box office
    Metadata,
    /// Code subtitle + plot text with the language model
    Thematic {
        /// Path to the model client's config.yaml (defaults to its config dir)
        #[arg(long)]
        awful_config: Option<PathBuf>,
    },
    /// Reshape thematic coding into one row per movie and theme
    Clean,
    /// Keyword-based violence coding of subtitle + plot text
    Violence,
}

impl Command {
    /// Stage name used in logs and run summary filenames.
    pub fn stage(&self) -> &'static str {
        match self {
            Command::Sample { .. } => "sample",
            Command::Plots => "plots",
            Command::Posters => "posters",
            Command::Subtitles => "subtitles",
            Command::Metadata => "metadata",
            Command::Thematic { .. } => "thematic",
            Command::Clean => "clean",
            Command::Violence => "violence",
        }
    }
}

impl Cli {
    /// API keys collected from flags and environment.
    ///
    /// Missing keys are only an error for the stage that needs them.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            omdb: self.omdb_api_key.clone(),
            tmdb: self.tmdb_api_key.clone(),
            opensubtitles: self.opensubtitles_api_key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "film_enrich",
            "--data-dir",
            "./data",
            "--omdb-api-key",
            "abc",
            "sample",
            "--size",
            "10",
        ]);

        assert_eq!(cli.data_dir, Some(PathBuf::from("./data")));
        assert_eq!(cli.command, Command::Sample { size: Some(10), seed: None });
        let credentials = cli.credentials();
        assert_eq!(credentials.omdb().unwrap(), "abc");
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["film_enrich", "plots", "-c", "/tmp/pipeline.yaml", "-d", "/tmp/data"]);

        assert_eq!(cli.command.stage(), "plots");
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/pipeline.yaml")));
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/data")));
    }

    #[test]
    fn test_thematic_config_override() {
        let cli = Cli::parse_from(["film_enrich", "thematic", "--awful-config", "/etc/aj.yaml"]);
        assert_eq!(
            cli.command,
            Command::Thematic {
                awful_config: Some(PathBuf::from("/etc/aj.yaml"))
            }
        );
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["film_enrich"]).is_err());
    }
}
