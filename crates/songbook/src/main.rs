use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use songbook::config::{Config, ProviderKind};
use songbook::display;
use songbook::RecommendationService;

#[derive(Parser)]
#[command(name = "songbook")]
#[command(about = "Songbook - find songs whose lyrics match a sermon")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), ", courtesy of Kernelle Software"))]
struct Cli {
  /// Config file to use instead of the discovered one
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Corpus JSON file (overrides config and SONGBOOK_CORPUS)
  #[arg(long = "corpus", global = true)]
  corpus_path: Option<PathBuf>,

  /// Embedding backend
  #[arg(long, global = true, value_enum)]
  provider: Option<ProviderKind>,

  /// Enable verbose logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Recommend songs for a sermon or passage
  Recommend {
    /// Query text; read from stdin when neither text nor --file is given
    text: Vec<String>,
    /// Read the query from a file
    #[arg(short, long, conflicts_with = "text")]
    file: Option<PathBuf>,
    /// Number of songs to return
    #[arg(short = 'k', long)]
    top_k: Option<usize>,
    /// Print results as JSON
    #[arg(long)]
    json: bool,
    /// Print the lyrics of each song
    #[arg(short, long)]
    lyrics: bool,
  },
  /// Load the model and embed the corpus ahead of time
  Warm,
  /// Show corpus size and identity
  Corpus {
    /// Print as JSON
    #[arg(long)]
    json: bool,
  },
}

fn init_logging(verbose: bool) {
  let default = if verbose { "songbook=debug,bentley=off,warn" } else { "songbook=warn,bentley=off" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).init();

  bentley::init(if verbose { bentley::Level::Verbose } else { bentley::Level::Info });
}

fn load_config(cli: &Cli) -> Result<Config> {
  let mut config = Config::load(cli.config.as_deref())?;

  if let Some(corpus) = &cli.corpus_path {
    config.corpus_path = corpus.clone();
  }
  if let Some(kind) = cli.provider {
    config.provider = config.provider.with_kind(kind);
  }

  Ok(config)
}

async fn read_query(text: &[String], file: Option<&Path>) -> Result<String> {
  if let Some(path) = file {
    return tokio::fs::read_to_string(path)
      .await
      .with_context(|| format!("Failed to read query file {}", path.display()));
  }

  if !text.is_empty() {
    return Ok(text.join(" "));
  }

  let mut query = String::new();
  tokio::io::stdin().read_to_string(&mut query).await.context("Failed to read query from stdin")?;
  Ok(query)
}

async fn recommend(
  service: &RecommendationService,
  query: &str,
  top_k: Option<usize>,
  json: bool,
  lyrics: bool,
) -> Result<()> {
  let top_k = top_k.unwrap_or_else(|| service.default_top_k());
  let recommendations = service.recommend(query, top_k).await?;

  if json {
    println!("{}", serde_json::to_string_pretty(&recommendations)?);
  } else {
    display::display_recommendations(&recommendations, lyrics);
  }
  Ok(())
}

async fn handle(cli: Cli) -> Result<()> {
  let config = load_config(&cli)?;
  let service = RecommendationService::from_config(&config)?;

  match cli.command {
    Command::Recommend { text, file, top_k, json, lyrics } => {
      let query = read_query(&text, file.as_deref()).await?;
      recommend(&service, &query, top_k, json, lyrics).await
    }
    Command::Warm => {
      let embedded = service.warm().await?;
      bentley::success!("Embedded {} songs", embedded);
      Ok(())
    }
    Command::Corpus { json } => {
      let summary = service.summary().await?;
      if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
      } else {
        display::display_summary(&summary);
      }
      Ok(())
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  handle(cli).await
}
