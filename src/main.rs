// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use podcache::{
    DownloadManager, DownloadOptions, Episode, FeedLibrary, JsonFileStore, NoopReporter,
    PlaylistLibrary, ProgressEvent, ProgressReporter, ReqwestClient, SharedProgressReporter, SharedStore,
    load_feed, plain_text,
};

// Emoji with fallback for terminals without Unicode support
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static RETRY: Emoji<'_, '_> = Emoji("🔁 ", "[~] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");

/// Manage podcast subscriptions, downloads and playlists
#[derive(Parser, Debug)]
#[command(name = "podcache")]
#[command(about = "Manage podcast subscriptions, downloads and playlists")]
#[command(version)]
struct Args {
    /// Directory holding downloads and saved state
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Retries after a failed download attempt
    #[arg(long, global = true, default_value_t = podcache::DEFAULT_MAX_RETRIES)]
    retries: u32,

    /// Log debug output to stderr
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
    /// Manage feed subscriptions
    #[command(subcommand)]
    Feeds(FeedsCommand),

    /// List the episodes of a feed (URL or local RSS file)
    Episodes { feed: String },

    /// Download one episode of a feed
    Download { feed: String, episode_id: String },

    /// List downloaded episodes
    Downloads,

    /// Delete a downloaded episode
    Delete { episode_id: String },

    /// Manage playlists
    #[command(subcommand)]
    Playlist(PlaylistCommand),
}

#[derive(Subcommand, Debug)]
enum FeedsCommand {
    List,
    Add { url: String },
    Remove { url: String },
}

#[derive(Subcommand, Debug)]
enum PlaylistCommand {
    List,
    Create {
        name: String,
    },
    Rename {
        id: String,
        name: String,
    },
    Delete {
        id: String,
    },
    Show {
        id: String,
    },
    /// Add an episode of a feed to a playlist
    Add {
        id: String,
        feed: String,
        episode_id: String,
    },
    Remove {
        id: String,
        episode_id: String,
    },
}

/// Progress reporter drawing one indicatif bar per download
struct IndicatifReporter {
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl IndicatifReporter {
    fn new() -> Self {
        Self {
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn with_bar(&self, episode_id: &str, f: impl FnOnce(&ProgressBar)) {
        let mut bars = match self.bars.lock() {
            Ok(bars) => bars,
            Err(poisoned) => poisoned.into_inner(),
        };

        let bar = bars.entry(episode_id.to_string()).or_insert_with(|| {
            let bar = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::default_bar().template(&format!(
                "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
            )) {
                bar.set_style(style.progress_chars("█▓░"));
            }
            bar
        });
        f(bar);
    }

    fn finish_bar(&self, episode_id: &str) -> Option<ProgressBar> {
        match self.bars.lock() {
            Ok(mut bars) => bars.remove(episode_id),
            Err(poisoned) => poisoned.into_inner().remove(episode_id),
        }
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::DownloadStarting {
                episode_id,
                episode_title,
                attempt,
                content_length,
                resumed_from,
            } => self.with_bar(&episode_id, |bar| {
                bar.set_length(content_length.unwrap_or(0));
                bar.set_position(resumed_from);
                let attempt = if attempt > 1 {
                    format!(" (attempt {attempt})").yellow().to_string()
                } else {
                    String::new()
                };
                bar.set_message(format!("{}{attempt}", truncate_title(&episode_title, 40)));
            }),

            ProgressEvent::DownloadProgress {
                episode_id,
                bytes_downloaded,
                total_bytes,
                ..
            } => self.with_bar(&episode_id, |bar| {
                if let Some(total) = total_bytes {
                    bar.set_length(total);
                }
                bar.set_position(bytes_downloaded);
            }),

            ProgressEvent::DownloadRetrying {
                episode_title,
                error,
                retries_left,
                ..
            } => {
                eprintln!(
                    "{RETRY}{} - {} ({} left)",
                    truncate_title(&episode_title, 30).yellow(),
                    error.dimmed(),
                    retries_left
                );
            }

            ProgressEvent::DownloadCompleted {
                episode_id,
                episode_title,
                path,
                ..
            } => {
                if let Some(bar) = self.finish_bar(&episode_id) {
                    bar.finish_and_clear();
                }
                println!(
                    "{SUCCESS}{} {}",
                    truncate_title(&episode_title, 40).green(),
                    path.display().to_string().dimmed()
                );
            }

            ProgressEvent::AlreadyDownloaded {
                episode_title,
                path,
                ..
            } => {
                println!(
                    "{SUCCESS}{} already downloaded {}",
                    truncate_title(&episode_title, 40).green(),
                    path.display().to_string().dimmed()
                );
            }

            ProgressEvent::DownloadFailed {
                episode_id,
                episode_title,
                error,
            } => {
                let message = format!(
                    "{FAILURE}{} - {}",
                    truncate_title(&episode_title, 30).red(),
                    error.red()
                );
                match self.finish_bar(&episode_id) {
                    Some(bar) => bar.abandon_with_message(message),
                    None => eprintln!("{message}"),
                }
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let head: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "podcache=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn data_dir(args: &Args) -> Result<PathBuf> {
    match &args.data_dir {
        Some(dir) => Ok(dir.clone()),
        None => dirs::data_dir()
            .map(|dir| dir.join("podcache"))
            .context("Could not determine a data directory, pass --data-dir"),
    }
}

async fn find_episode(
    client: &ReqwestClient,
    feed: &str,
    episode_id: &str,
) -> Result<Episode> {
    let podcast = load_feed(client, feed)
        .await
        .with_context(|| format!("Failed to load feed {feed}"))?;
    let episode = podcast
        .episode(episode_id)
        .map(|item| item.episode.clone())
        .ok_or_else(|| anyhow!("No episode with id {episode_id} in {}", podcast.title))?;
    Ok(episode)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let data_dir = data_dir(&args)?;
    let store: SharedStore = Arc::new(JsonFileStore::new(data_dir.join("store")));
    let client = ReqwestClient::new();

    let mut options = DownloadOptions::new(data_dir.join("podcasts"));
    options.max_retries = args.retries;
    let reporter: SharedProgressReporter = if args.quiet {
        NoopReporter::shared()
    } else {
        Arc::new(IndicatifReporter::new())
    };

    match args.command {
        Command::Feeds(command) => {
            let feeds = FeedLibrary::load(store).await;
            match command {
                FeedsCommand::List => {
                    for feed in feeds.subscriptions() {
                        println!("{HEADPHONES}{} {}", feed.title.bold(), feed.url.cyan());
                    }
                }
                FeedsCommand::Add { url } => {
                    let feed = feeds
                        .add(&client, &url)
                        .await
                        .context("Failed to subscribe")?;
                    println!("{SUCCESS}Subscribed to {}", feed.title.bold().green());
                }
                FeedsCommand::Remove { url } => {
                    if !feeds.remove(&url).await? {
                        println!("Not subscribed to {}", url.yellow());
                    }
                }
            }
        }

        Command::Episodes { feed } => {
            let podcast = load_feed(&client, &feed)
                .await
                .with_context(|| format!("Failed to load feed {feed}"))?;
            let downloads = DownloadManager::open(client.clone(), store, options).await;

            println!("\n{HEADPHONES}{}\n", podcast.title.bold().magenta());
            for item in &podcast.episodes {
                let marker = if downloads.is_downloaded(&item.episode.id) {
                    "●".green()
                } else {
                    "○".dimmed()
                };
                let date = item
                    .pub_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                println!(
                    "{marker} {} {} {}",
                    date.dimmed(),
                    item.episode.title.bold(),
                    item.duration.as_deref().unwrap_or_default().dimmed()
                );
                println!("    id: {}", item.episode.id.cyan());
                if let Some(description) = item.description.as_deref().filter(|_| !args.quiet) {
                    let text = plain_text(description);
                    println!("    {}", truncate_title(&text, 100).dimmed());
                }
            }
        }

        Command::Download { feed, episode_id } => {
            let episode = find_episode(&client, &feed, &episode_id).await?;
            let downloads = DownloadManager::open(client, store, options)
                .await
                .with_reporter(reporter);

            let path = downloads
                .download(&episode)
                .await
                .with_context(|| format!("Failed to download {}", episode.title))?;
            if !args.quiet {
                println!("{FOLDER}{}", path.display().to_string().cyan());
            }
        }

        Command::Downloads => {
            let downloads = DownloadManager::open(client, store, options).await;
            for record in downloads.downloads() {
                println!(
                    "{} {} {}",
                    record.download_date.format("%Y-%m-%d").to_string().dimmed(),
                    record.episode.title.bold(),
                    record.download_path.display().to_string().cyan()
                );
                println!("    id: {}", record.id());
            }
        }

        Command::Delete { episode_id } => {
            let downloads = DownloadManager::open(client, store, options).await;
            if !downloads.is_downloaded(&episode_id) {
                println!("Not downloaded: {}", episode_id.yellow());
                return Ok(());
            }
            downloads
                .delete_download(&episode_id)
                .await
                .context("Failed to delete download")?;
            println!("{SUCCESS}Deleted {}", episode_id.cyan());
        }

        Command::Playlist(command) => {
            let playlists = PlaylistLibrary::load(store).await;
            match command {
                PlaylistCommand::List => {
                    for playlist in playlists.playlists() {
                        println!(
                            "{} {} ({} episodes)",
                            playlist.id.dimmed(),
                            playlist.name.bold(),
                            playlist.episodes.len()
                        );
                    }
                }
                PlaylistCommand::Create { name } => {
                    let playlist = playlists.create(&name).await?;
                    println!("{SUCCESS}Created {} ({})", playlist.name.bold(), playlist.id);
                }
                PlaylistCommand::Rename { id, name } => playlists.rename(&id, &name).await?,
                PlaylistCommand::Delete { id } => playlists.delete(&id).await?,
                PlaylistCommand::Show { id } => {
                    let playlist = playlists
                        .get(&id)
                        .ok_or_else(|| anyhow!("Playlist not found: {id}"))?;
                    println!("\n{}\n", playlist.name.bold().magenta());
                    for (index, episode) in playlist.episodes.iter().enumerate() {
                        println!("{:>3}. {} {}", index + 1, episode.title, episode.id.dimmed());
                    }
                }
                PlaylistCommand::Add {
                    id,
                    feed,
                    episode_id,
                } => {
                    let episode = find_episode(&client, &feed, &episode_id).await?;
                    if !playlists.add_episode(&id, &episode).await? {
                        println!("Already in playlist: {}", episode.title.yellow());
                    }
                }
                PlaylistCommand::Remove { id, episode_id } => {
                    if !playlists.remove_episode(&id, &episode_id).await? {
                        println!("Not in playlist: {}", episode_id.yellow());
                    }
                }
            }
        }
    }

    Ok(())
}
