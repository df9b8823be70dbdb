use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use podcatcher::{
    AppContext, Episode, ImportMode, Logger, NoopReporter, ProgressEvent, ProgressReporter,
    SettingsValue, SharedProgressReporter, Source, download_episodes,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Subscribe to podcasts and keep their episodes up to date
#[derive(Parser, Debug)]
#[command(name = "podcatcher")]
#[command(about = "Subscribe to podcasts and keep their episodes up to date")]
#[command(version)]
struct Args {
    /// Directory holding sources, episodes, media files and settings
    #[arg(short, long, default_value = ".podcatcher", global = true)]
    data_dir: PathBuf,

    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode - suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a feed and load its episodes
    Subscribe {
        /// RSS feed URL
        url: String,
    },
    /// Refresh all subscribed feeds
    Refresh {
        /// Maximum number of feeds refreshed at the same time
        #[arg(short = 'c', long)]
        concurrent: Option<usize>,
    },
    /// List sources and their episodes
    List {
        /// Include played episodes
        #[arg(short, long)]
        all: bool,
    },
    /// Save episode media for offline use
    Download {
        /// Episode URIs; all unplayed episodes when omitted
        uris: Vec<String>,

        /// Maximum number of concurrent downloads
        #[arg(short = 'c', long, default_value = "3")]
        concurrent: usize,
    },
    /// Toggle the played state of an episode
    Played {
        uri: String,
    },
    /// Write the configuration to a JSON file
    Export {
        path: PathBuf,
    },
    /// Load a configuration from a JSON file, replacing the current one
    Import {
        path: PathBuf,

        /// Merge into the current configuration instead of replacing it
        #[arg(short, long)]
        merge: bool,
    },
    /// Delete all sources, episodes, media files and settings
    Reset,
    /// Read and write settings
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Print all settings
    List,
    /// Print a single setting
    Get { key: String },
    /// Store a setting; numeric values are stored as numbers
    Set { key: String, value: String },
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
    main_bar: ProgressBar,
}

impl IndicatifReporter {
    fn new() -> Self {
        let multi = MultiProgress::new();

        let main_style = ProgressStyle::default_bar()
            .template("{spinner:.green} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());

        let main_bar = multi.add(ProgressBar::new_spinner());
        main_bar.set_style(main_style);
        main_bar.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
            main_bar,
        }
    }

    fn get_or_create_bar(&self, episode_uri: &str) -> ProgressBar {
        let Ok(mut bars) = self.bars.lock() else {
            return ProgressBar::hidden();
        };

        if let Some(bar) = bars.get(episode_uri) {
            return bar.clone();
        }

        let style = ProgressStyle::default_bar()
            .template(&format!(
                "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
            ))
            .map(|style| style.progress_chars("█▓░"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());

        let bar = self.multi.add(ProgressBar::new(0));
        bar.set_style(style);
        bars.insert(episode_uri.to_string(), bar.clone());
        bar
    }

    fn finish_bar(&self, episode_uri: &str) {
        if let Ok(mut bars) = self.bars.lock()
            && let Some(bar) = bars.remove(episode_uri)
        {
            bar.finish_and_clear();
        }
    }

    fn finish(&self) {
        self.main_bar.finish_and_clear();
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::FetchingFeed { url } => {
                self.main_bar
                    .set_message(format!("{SEARCH}Fetching feed: {}", url.cyan()));
            }

            ProgressEvent::FeedParsed {
                source_title,
                total_episodes,
                ..
            } => {
                self.main_bar.set_message(format!(
                    "{HEADPHONES}{} • {} episodes",
                    source_title.bold().green(),
                    total_episodes.to_string().cyan()
                ));
            }

            ProgressEvent::SourceUpdated {
                source_uri,
                merged_episodes,
                marked_played,
            } => {
                self.multi
                    .println(format!(
                        "{SUCCESS}{} {} episodes, {} marked played",
                        source_uri.green(),
                        merged_episodes.to_string().cyan(),
                        marked_played.to_string().yellow()
                    ))
                    .ok();
            }

            ProgressEvent::SourceUpdateFailed { source_uri, error } => {
                self.multi
                    .println(format!("{FAILURE}{} - {}", source_uri.red(), error.red()))
                    .ok();
            }

            ProgressEvent::RefreshCompleted {
                succeeded_count,
                failed_count,
            } => {
                self.finish();
                println!(
                    "\n{PARTY}{} {} updated, {} failed",
                    "Refresh complete:".bold().green(),
                    succeeded_count.to_string().green().bold(),
                    if failed_count > 0 {
                        failed_count.to_string().red().bold()
                    } else {
                        failed_count.to_string().green()
                    }
                );
            }

            ProgressEvent::FileSaveStarting {
                episode_uri,
                episode_title,
                content_length,
            } => {
                let bar = self.get_or_create_bar(&episode_uri);
                bar.set_length(content_length.unwrap_or(0));
                bar.set_position(0);
                bar.set_message(truncate_title(&episode_title, 40));
            }

            ProgressEvent::FileSaveProgress {
                episode_uri,
                bytes_written,
                total_bytes,
            } => {
                let bar = self.get_or_create_bar(&episode_uri);
                if let Some(total) = total_bytes {
                    bar.set_length(total);
                }
                bar.set_position(bytes_written);
            }

            ProgressEvent::FileSaveCompleted {
                episode_uri,
                episode_title,
                bytes_written,
            } => {
                let bar = self.get_or_create_bar(&episode_uri);
                bar.set_position(bytes_written);
                self.multi
                    .println(format!(
                        "{SUCCESS}{}",
                        truncate_title(&episode_title, 60).green()
                    ))
                    .ok();
                self.finish_bar(&episode_uri);
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let truncated: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("podcatcher={default_level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_settings_value(value: &str) -> SettingsValue {
    match value.trim().parse::<f64>() {
        Ok(number) if number.is_finite() => SettingsValue::Number(number),
        _ => SettingsValue::Text(value.to_string()),
    }
}

fn print_episode(episode: &Episode) {
    let marker = if episode.playback.is_played() {
        "✓".dimmed()
    } else {
        "•".yellow()
    };
    let date = episode
        .updated
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "undated".to_string());
    let offline = if episode.is_file_saved_offline {
        " [offline]".cyan().to_string()
    } else {
        String::new()
    };

    println!(
        "  {marker} {} {}{offline}",
        date.dimmed(),
        episode.display_title()
    );
    println!("      {}", episode.uri.dimmed());
}

async fn list(context: &AppContext, all: bool) -> Result<()> {
    let mut sources = context
        .storage
        .read_sources()
        .await
        .context("Failed to read sources")?;
    sources.sort_by(Source::title_order);

    if sources.is_empty() {
        println!("No subscriptions yet.");
        return Ok(());
    }

    for source in &sources {
        println!("\n{}", source.display_title().bold().magenta());
        let episodes = context
            .storage
            .read_episodes_by_source(source)
            .await
            .with_context(|| format!("Failed to read episodes of {}", source.uri))?;

        for episode in episodes
            .iter()
            .filter(|episode| all || !episode.playback.is_played())
        {
            print_episode(episode);
        }
    }
    Ok(())
}

async fn download(
    context: &AppContext,
    uris: Vec<String>,
    concurrent: usize,
    reporter: SharedProgressReporter,
    quiet: bool,
) -> Result<bool> {
    let episodes = if uris.is_empty() {
        context
            .storage
            .read_playlist(false)
            .await
            .context("Failed to read playlist")?
            .into_iter()
            .filter(|episode| !episode.is_file_saved_offline && episode.media_url.is_some())
            .collect()
    } else {
        let mut episodes = Vec::with_capacity(uris.len());
        for uri in &uris {
            match context.storage.read_episode(uri).await? {
                Some(episode) => episodes.push(episode),
                None => bail!("Unknown episode: {uri}"),
            }
        }
        episodes
    };

    let report = download_episodes(
        context.client.as_ref(),
        &context.storage,
        episodes,
        concurrent,
        &reporter,
    )
    .await;

    if !quiet {
        println!(
            "\n{PARTY}{} {} saved, {} failed",
            "Download complete:".bold().green(),
            report.saved.len().to_string().green().bold(),
            report.failed.len().to_string().red()
        );
        for (uri, error) in &report.failed {
            println!("  {CROSS}{} - {}", uri.yellow(), error.dimmed());
        }
    }

    Ok(report.failed.is_empty() || !report.saved.is_empty())
}

async fn settings(context: &AppContext, command: SettingsCommand) -> Result<()> {
    match command {
        SettingsCommand::List => {
            let settings = context
                .storage
                .list_settings()
                .await
                .context("Failed to read settings")?;
            for (key, value) in settings {
                println!("{} = {value}", key.cyan());
            }
        }
        SettingsCommand::Get { key } => {
            match context.storage.read_settings_value(&key).await? {
                Some(value) => println!("{value}"),
                None => bail!("Setting {key} is not set"),
            }
        }
        SettingsCommand::Set { key, value } => {
            context
                .configuration
                .set(&key, parse_settings_value(&value))
                .await
                .with_context(|| format!("Failed to store setting {key}"))?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if !args.quiet {
        println!(
            "\n{}{} {}\n",
            MICROPHONE,
            "podcatcher".bold().magenta(),
            "- Podcast Aggregator".dimmed()
        );
    }

    let context = AppContext::with_data_dir(&args.data_dir, Logger::default())
        .await
        .with_context(|| format!("Failed to open {}", args.data_dir.display()))?;

    let reporter: SharedProgressReporter = if args.quiet {
        NoopReporter::shared()
    } else {
        Arc::new(IndicatifReporter::new())
    };

    match args.command {
        Command::Subscribe { url } => {
            let options = context.update_options().await?;
            let update = context
                .updater
                .subscribe(&url, &options, &reporter)
                .await
                .with_context(|| format!("Failed to subscribe to {url}"))?;
            if !args.quiet {
                println!(
                    "\n{PARTY}Subscribed to {}",
                    update.source.display_title().bold().green()
                );
            }
        }

        Command::Refresh { concurrent } => {
            let mut options = context.update_options().await?;
            if let Some(concurrent) = concurrent {
                options.max_concurrent = concurrent;
            }
            let report = context
                .updater
                .update_all_sources(&options, &reporter)
                .await
                .context("Failed to refresh sources")?;
            if !report.failed.is_empty() && report.succeeded.is_empty() {
                std::process::exit(1);
            }
        }

        Command::List { all } => list(&context, all).await?,

        Command::Download { uris, concurrent } => {
            if !download(&context, uris, concurrent, reporter, args.quiet).await? {
                std::process::exit(1);
            }
        }

        Command::Played { uri } => {
            let Some(mut episode) = context.storage.read_episode(&uri).await? else {
                bail!("Unknown episode: {uri}");
            };
            episode.toggle_playback_status();
            let episode = context.storage.write_episode(episode).await?;
            let state = if episode.playback.is_played() {
                "played".dimmed()
            } else {
                "unplayed".yellow()
            };
            println!("{} is now {state}", episode.display_title());
        }

        Command::Export { path } => {
            context
                .configuration
                .export_to_file(&path)
                .await
                .with_context(|| format!("Failed to export to {}", path.display()))?;
            println!("{SUCCESS}Exported to {}", path.display().to_string().cyan());
        }

        Command::Import { path, merge } => {
            let mode = if merge {
                ImportMode::Merge
            } else {
                ImportMode::Override
            };
            context
                .configuration
                .import_from_file(&path, mode)
                .await
                .with_context(|| format!("Failed to import {}", path.display()))?;
            println!("{SUCCESS}Imported {}", path.display().to_string().cyan());
        }

        Command::Reset => {
            context
                .configuration
                .reset_configuration()
                .await
                .context("Failed to reset storage")?;
            println!("{SUCCESS}All data removed");
        }

        Command::Settings(command) => settings(&context, command).await?,
    }

    Ok(())
}
