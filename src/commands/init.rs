use anyhow::{Context, Result};
use noticiero::config::Config;
use std::path::PathBuf;

const SAMPLE_SOURCES: &str = r#"# Noticiero source catalog
#
# One [[source]] table per publication. `ingest_strategy` is
# "website-html-1" or "podcast-rss-1"; `paywall` is optional and takes one
# strategy: "ld-json", "classes" or "ids".

[[source]]
id = "elpais"
title = "El País"
url = "https://elpais.com"
ingest_strategy = "website-html-1"
country = "es"
language_code = "es"
should_use_url_as_seed_url = true
paywall = { strategy = "ld-json" }

# [[source]]
# id = "radio-ejemplo"
# url = "https://radio.example.es"
# ingest_strategy = "podcast-rss-1"
# language_code = "es"
# rate_limit_secs = 64800
# [[source.seeds]]
# url = "https://radio.example.es/feed.xml"
"#;

pub async fn init_config(path: PathBuf) -> Result<()> {
    std::fs::create_dir_all(&path)?;
    let config_path = path.join("noticiero.toml");
    let sources_path = path.join("sources.toml");

    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
        return Ok(());
    }

    let mut config = Config::default();
    config.node.data_dir = PathBuf::from(".noticiero");
    config.sources.path = PathBuf::from("sources.toml");
    let toml_content = format!(
        "# Noticiero configuration\n\n{}",
        toml::to_string_pretty(&config).context("Failed to serialize default config")?
    );
    std::fs::write(&config_path, toml_content)?;
    println!("Created config at {}", config_path.display());

    if !sources_path.exists() {
        std::fs::write(&sources_path, SAMPLE_SOURCES)?;
        println!("Created source catalog at {}", sources_path.display());
    }

    println!("\nNext steps:");
    println!("  1. Point [corpus] dir at a directory with words.tsv and bigrams.tsv");
    println!("  2. noticiero -c {} seed", config_path.display());
    println!("  3. noticiero -c {} run", config_path.display());
    Ok(())
}
