//! Noticiero: ingestion pipeline for Spanish-language news

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use noticiero::{
    config::{Config, LogFormat, LoggingConfig},
    types::LanguageCode,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "noticiero")]
#[command(about = "Crawl, lemmatize and index Spanish-language news")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "noticiero.toml")]
    config: PathBuf,

    /// Data directory
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// More detail per flag; `-vv` also shows dependency logs
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the queue consumers and the ingestion orchestrators
    Run,

    /// Queue a URL for fetching
    Enqueue {
        url: String,
    },

    /// Queue the seed pages of every active website source
    Seed,

    /// Print the readability score of a text
    Readability {
        text: String,
    },

    /// Print the lemmatized form of a text
    Lemmatize {
        text: String,

        /// Language code
        #[arg(short, long, default_value = "es")]
        language: LanguageCode,
    },

    /// Rank stored documents against a label of lemmas
    ScoreLabel {
        /// Label lemma ids
        #[arg(required = true)]
        lemmas: Vec<String>,

        /// Restrict to these domains
        #[arg(short, long)]
        domain: Vec<String>,

        #[arg(long)]
        min_readability: Option<i64>,

        #[arg(long)]
        max_readability: Option<i64>,

        /// Number of results
        #[arg(short = 'k', long, default_value = "10")]
        top_k: usize,

        /// Output format (json, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show queue, link and index statistics
    Stats,

    /// Write a default configuration and source catalog
    Init {
        /// Output directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

fn init_logging(logging: &LoggingConfig, verbose: u8) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(logging.filter_directives(verbose)));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to install logger: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };
    // relative paths in the config file are resolved against its directory
    if let Some(base) = cli.config.parent().filter(|p| !p.as_os_str().is_empty()) {
        for path in [&mut config.node.data_dir, &mut config.sources.path] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        if let Some(dir) = config.corpus.dir.as_mut().filter(|d| d.is_relative()) {
            *dir = base.join(&*dir);
        }
    }
    if let Some(data_dir) = cli.data_dir {
        config.node.data_dir = data_dir;
    }

    init_logging(&config.logging, cli.verbose)?;

    match cli.command {
        Commands::Run => commands::run::run(config).await,
        Commands::Enqueue { url } => commands::links::enqueue(config, url).await,
        Commands::Seed => commands::links::seed(config).await,
        Commands::Readability { text } => commands::text::readability(text).await,
        Commands::Lemmatize { text, language } => commands::text::lemmatize(config, text, language).await,
        Commands::ScoreLabel {
            lemmas,
            domain,
            min_readability,
            max_readability,
            top_k,
            format,
        } => {
            commands::text::score_label(
                config,
                commands::text::ScoreOptions {
                    lemmas,
                    domains: domain,
                    min_readability,
                    max_readability,
                    limit: top_k,
                    format,
                },
            )
            .await
        }
        Commands::Stats => commands::stats::show_stats(config).await,
        Commands::Init { path } => commands::init::init_config(path).await,
    }
}
