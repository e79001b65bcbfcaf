//! `streamsift` CLI - resolve episode pages and inspect the pipeline

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use streamsift::{
    chrome_profile, extract_media_urls, firefox_profile, FetchClient, Resolver,
};

#[derive(Parser)]
#[command(name = "streamsift")]
#[command(about = "Resolve streaming-site episode pages into playable media URLs")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve an episode page into ranked playable options
    Resolve {
        /// Episode page URL
        url: String,

        /// Emit options as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the heuristic extractor over a saved HTML file
    Extract {
        /// Path to the HTML file
        file: PathBuf,

        /// Base URL for resolving relative links
        #[arg(long)]
        base: String,
    },

    /// Print generated browser fingerprint profiles
    Fingerprint {
        /// Number of profiles to generate
        #[arg(short, long, default_value = "3")]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .with_target(false)
        .compact()
        .init();

    match cli.command {
        Commands::Resolve { url, json } => cmd_resolve(&url, json).await,
        Commands::Extract { file, base } => cmd_extract(&file, &base),
        Commands::Fingerprint { count } => {
            cmd_fingerprint(count);
            Ok(())
        }
    }
}

async fn cmd_resolve(url: &str, json: bool) -> Result<()> {
    let resolver = Resolver::new(FetchClient::new().context("failed to build HTTP client")?);

    let options = match resolver.resolve(url).await {
        Ok(options) => options,
        Err(err) if err.is_blocked() => {
            anyhow::bail!("the site is blocking requests ({err}); try again later");
        }
        Err(err) => return Err(err).context("failed to resolve episode page"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&options)?);
        return Ok(());
    }

    if options.is_empty() {
        // Not an error: the page simply exposed no playable links.
        println!("no playable links found");
        return Ok(());
    }

    for (index, option) in options.iter().enumerate() {
        println!("{:>2}. [{}] {}", index + 1, option.label, option.url);
    }
    Ok(())
}

fn cmd_extract(file: &Path, base: &str) -> Result<()> {
    let html = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    for url in extract_media_urls(&html, base) {
        println!("{url}");
    }
    Ok(())
}

fn cmd_fingerprint(count: usize) {
    for index in 0..count {
        let profile = if index % 2 == 0 {
            chrome_profile()
        } else {
            firefox_profile()
        };
        println!("Profile {}:", index + 1);
        println!("  User-Agent: {}", profile.user_agent);
        println!("  Accept-Language: {}", profile.accept_language);
        if !profile.sec_ch_ua.is_empty() {
            println!("  Sec-CH-UA: {}", profile.sec_ch_ua);
        }
        println!();
    }
}
