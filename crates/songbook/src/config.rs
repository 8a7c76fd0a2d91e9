//! Configuration management for Songbook
//!
//! Loads the corpus location, ranking defaults, cache capacity and the
//! embedding provider selection from a JSON file, with environment and
//! command-line overrides applied on top.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Overrides the configured corpus path when set
pub const CORPUS_ENV_VAR: &str = "SONGBOOK_CORPUS";

const CONFIG_FILE_NAMES: [&str; 2] = [".songbook.json", "songbook.json"];

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
  /// JSON corpus produced by the ingestion pipeline
  #[serde(default = "default_corpus_path")]
  pub corpus_path: PathBuf,
  /// Number of songs returned when the caller does not ask for a count
  #[serde(default = "default_top_k")]
  pub top_k: usize,
  /// Distinct corpora whose embeddings are kept live
  #[serde(default = "default_cache_capacity")]
  pub cache_capacity: usize,
  /// Which embedding backend to use
  #[serde(default)]
  pub provider: ProviderConfig,
}

/// Embedding backend selection, fixed at start-up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProviderConfig {
  /// Sentence-transformers model run through ONNX Runtime
  Onnx {
    #[serde(default = "default_model")]
    model: String,
    /// Directory holding `tokenizer.json` and `model.onnx`; skips the download
    #[serde(default)]
    model_dir: Option<PathBuf>,
    #[serde(default = "default_max_tokens")]
    max_tokens: usize,
    #[serde(default = "default_batch_size")]
    batch_size: usize,
  },
  /// Offline feature-hashing embedding
  Lexical {
    #[serde(default = "default_dimensions")]
    dimensions: usize,
  },
}

/// Provider names accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ProviderKind {
  Onnx,
  Lexical,
}

// Default value functions
fn default_corpus_path() -> PathBuf {
  PathBuf::from("combined_songs.json")
}
fn default_top_k() -> usize {
  5
}
fn default_cache_capacity() -> usize {
  1
}
fn default_model() -> String {
  "sentence-transformers/all-MiniLM-L6-v2".to_string()
}
fn default_max_tokens() -> usize {
  256
}
fn default_batch_size() -> usize {
  32
}
fn default_dimensions() -> usize {
  256
}

impl ProviderConfig {
  pub fn onnx() -> Self {
    Self::Onnx {
      model: default_model(),
      model_dir: None,
      max_tokens: default_max_tokens(),
      batch_size: default_batch_size(),
    }
  }

  pub fn lexical() -> Self {
    Self::Lexical { dimensions: default_dimensions() }
  }

  pub fn kind(&self) -> ProviderKind {
    match self {
      Self::Onnx { .. } => ProviderKind::Onnx,
      Self::Lexical { .. } => ProviderKind::Lexical,
    }
  }

  /// Default settings for `kind`, or the current settings if they already match
  pub fn with_kind(self, kind: ProviderKind) -> Self {
    if self.kind() == kind {
      return self;
    }
    match kind {
      ProviderKind::Onnx => Self::onnx(),
      ProviderKind::Lexical => Self::lexical(),
    }
  }
}

impl Default for ProviderConfig {
  #[cfg(feature = "ml-features")]
  fn default() -> Self {
    Self::onnx()
  }

  #[cfg(not(feature = "ml-features"))]
  fn default() -> Self {
    Self::lexical()
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      corpus_path: default_corpus_path(),
      top_k: default_top_k(),
      cache_capacity: default_cache_capacity(),
      provider: ProviderConfig::default(),
    }
  }
}

impl Config {
  /// Load configuration from a file
  pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
      .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: Config = serde_json::from_str(&content)
      .with_context(|| format!("Invalid config file {}", path.display()))?;
    Ok(config)
  }

  /// Load configuration from the working directory, the user config dir, or defaults.
  ///
  /// `SONGBOOK_CORPUS` replaces the corpus path of whatever was found.
  pub fn load(explicit: Option<&Path>) -> Result<Self> {
    let mut config = match explicit {
      Some(path) => Self::load_from_file(path)?,
      None => match Self::discover() {
        Some(path) => {
          bentley::verbose!("Using config {}", path.display());
          Self::load_from_file(path)?
        }
        None => Config::default(),
      },
    };

    if let Ok(corpus) = std::env::var(CORPUS_ENV_VAR) {
      if !corpus.trim().is_empty() {
        config.corpus_path = PathBuf::from(corpus);
      }
    }

    Ok(config)
  }

  fn discover() -> Option<PathBuf> {
    let local = CONFIG_FILE_NAMES.iter().map(PathBuf::from);
    let user = dirs::config_dir().map(|dir| dir.join("songbook").join("config.json"));

    local.chain(user).find(|path| path.is_file())
  }

  /// Save configuration to a file
  pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
    let content = serde_json::to_string_pretty(self)?;
    std::fs::write(path, content)?;
    Ok(())
  }
}
