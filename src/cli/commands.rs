//! CLI command handlers

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap_complete::generate;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{AuthManager, ConfigAction};
use crate::config::Config;
use crate::error::TrackFailure;
use crate::extract::{AudioFormat, AudioQuality, DirectLink, ExtractionEngine, YtDlp};
use crate::resolve::{ResolverCache, YoutubeResolver};
use crate::spotify::link::playlist_id;
use crate::spotify::{LinkKind, SpotifyClient, SpotifyLink, Track};
use crate::sync::{
    LedgerStore, PipelineSettings, PlaylistDownloader, Summary, SyncProgress, TrackPipeline,
};
use crate::tagging::{ArtworkCache, ArtworkFetcher, MetadataEmbedder};
use crate::utils::format_duration;

/// Handle the `auth` command
pub async fn auth(client_id: Option<String>, client_secret: Option<String>, force: bool) -> Result<()> {
    println!("{}", "Configuring Spotify credentials...".cyan());

    let creds = AuthManager::authenticate(client_id, client_secret, force).await?;

    println!();
    println!("{}", "Authentication successful!".green().bold());
    println!("  Client ID: {}", creds.client_id);
    println!();
    println!("Credentials stored securely in system keyring.");

    Ok(())
}

/// Per-invocation overrides for the `download` command
#[derive(Debug, Default)]
pub struct DownloadOverrides {
    pub output: Option<PathBuf>,
    pub format: Option<AudioFormat>,
    pub quality: Option<AudioQuality>,
    pub workers: Option<usize>,
}

impl DownloadOverrides {
    fn apply(self, config: &mut Config) {
        if let Some(output) = self.output {
            config.output_dir = output;
        }
        if let Some(format) = self.format {
            config.audio_format = format;
        }
        if let Some(quality) = self.quality {
            config.audio_quality = quality;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
    }
}

/// Handle the `download` command
pub async fn download(url: String, overrides: DownloadOverrides) -> Result<()> {
    let mut config = Config::load()?;
    overrides.apply(&mut config);

    if let Some(link) = DirectLink::parse(&url) {
        return download_direct(&link, &config).await;
    }

    let link: SpotifyLink = url.parse()?;
    if link.kind == LinkKind::Album {
        anyhow::bail!("Album downloads are not supported yet. Download a playlist or single tracks instead.");
    }

    let ytdlp = ready_engine(&config).await?;
    let creds = AuthManager::resolve()?;
    let metadata = Arc::new(SpotifyClient::new(creds)?.with_max_retries(config.max_retries));

    let cancel = CancellationToken::new();
    watch_ctrl_c(cancel.clone());

    let downloader = PlaylistDownloader::new(
        metadata,
        Arc::new(build_pipeline(&config, Arc::new(ytdlp))?),
        LedgerStore::new(config.ledger_dir.clone(), config.ledger_ttl()),
    )
    .with_workers(config.workers)
    .with_flush_interval(config.flush_interval)
    .with_cancellation(cancel);

    match link.kind {
        LinkKind::Track => download_single(&downloader, &link.id).await,
        _ => download_playlist(&downloader, &link.id, &config).await,
    }
}

/// yt-dlp configured from `config`, checked to be runnable
async fn ready_engine(config: &Config) -> Result<YtDlp> {
    let ytdlp = YtDlp::new(config.ytdlp_path.clone())
        .with_retries(config.max_retries)
        .with_socket_timeout(Duration::from_secs(config.socket_timeout_secs))
        .with_cookie_file(config.cookie_file.clone());
    if !ytdlp.is_available().await {
        anyhow::bail!(
            "Could not run '{}'. Install yt-dlp or set ytdlp_path in {}.",
            config.ytdlp_path,
            Config::config_path()?.display()
        );
    }
    Ok(ytdlp)
}

async fn download_direct(link: &DirectLink, config: &Config) -> Result<()> {
    println!("{}", format!("Downloading from {}...", link.source).cyan());

    let pipeline = build_pipeline(config, Arc::new(ready_engine(config).await?))?;
    let path = pipeline
        .download_direct(link)
        .await
        .map_err(|failure| anyhow::Error::new(failure).context(format!("Failed to download {}", link.url)))?;

    println!();
    println!("{}", "Download complete!".green().bold());
    println!("  Saved to: {}", path.display());
    Ok(())
}

fn build_pipeline(config: &Config, engine: Arc<dyn ExtractionEngine>) -> Result<TrackPipeline> {
    let resolver = YoutubeResolver::new(engine.clone(), ResolverCache::new());
    let fetcher = ArtworkFetcher::new(
        Duration::from_secs(config.artwork_timeout_secs),
        ArtworkCache::new(),
    )?;
    let embedder = MetadataEmbedder::new(fetcher, config.embed_metadata, config.embed_artwork);

    Ok(TrackPipeline::new(
        engine,
        resolver,
        embedder,
        PipelineSettings {
            output_dir: config.output_dir.clone(),
            format: config.audio_format,
            quality: config.audio_quality,
        },
    ))
}

/// First Ctrl-C stops new tracks from starting, the second exits
fn watch_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!(
            "{}",
            "Stopping after tracks in progress finish. Press Ctrl-C again to abort.".yellow()
        );
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}

fn print_track(track: &Track) {
    println!("{}", track.name.bold());
    println!("  Artist:   {}", track.artist);
    println!("  Album:    {}", track.album);
    println!("  Duration: {}", format_duration(track.duration_ms));
}

async fn download_single(downloader: &PlaylistDownloader, track_id: &str) -> Result<()> {
    println!("{}", "Fetching track information...".cyan());

    let (track, result) = downloader.download_track(track_id).await?;
    println!();
    print_track(&track);
    println!();

    match result {
        Ok(path) => {
            println!("{}", "Download complete!".green().bold());
            println!("  Saved to: {}", path.display());
            Ok(())
        }
        Err(failure) => Err(anyhow::Error::new(failure)
            .context(format!("Failed to download {} - {}", track.artist, track.name))),
    }
}

async fn download_playlist(
    downloader: &PlaylistDownloader,
    playlist_id: &str,
    config: &Config,
) -> Result<()> {
    println!("{}", "Fetching playlist information...".cyan());

    let (tx, rx) = mpsc::channel(64);
    let display = tokio::spawn(show_progress(rx));

    let result = downloader.download_playlist(playlist_id, Some(tx)).await;
    let _ = display.await;
    let summary = result?;

    println!("  Output:    {}", config.output_dir.display());

    if summary.failed > 0 || summary.cancelled > 0 {
        println!();
        println!(
            "Progress saved. Run the same command again to resume and retry failed tracks."
        );
    }

    Ok(())
}

/// Render progress events as they arrive
async fn show_progress(mut rx: mpsc::Receiver<SyncProgress>) {
    let mut bar = ProgressBar::hidden();

    while let Some(event) = rx.recv().await {
        match event {
            SyncProgress::Started {
                playlist,
                total,
                already_completed,
            } => {
                println!();
                println!("{}", playlist.name.bold());
                println!("  Owner:  {}", playlist.owner);
                if let Some(description) = &playlist.description {
                    println!("  About:  {}", description);
                }
                println!("  Tracks: {}", total);
                if already_completed > 0 {
                    println!(
                        "  {}",
                        format!(
                            "Resuming: {} of {} tracks already downloaded",
                            already_completed, total
                        )
                        .yellow()
                    );
                }
                println!();

                bar = ProgressBar::new(total.saturating_sub(already_completed) as u64);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {prefix:.dim} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("#>-"),
                );
                bar.enable_steady_tick(Duration::from_millis(120));
            }
            SyncProgress::TrackFinished { track, result } => {
                match result {
                    Ok(_) => bar.set_message(format!("{} - {}", track.artist, track.name)),
                    Err(failure) => bar.println(format!(
                        "  {} {} - {}: {}",
                        "✗".red(),
                        track.artist,
                        track.name,
                        describe_failure(&failure)
                    )),
                }
                bar.inc(1);
            }
            SyncProgress::LedgerFlushed {
                completed,
                failed,
                is_final,
            } => {
                if !is_final {
                    bar.set_prefix(format!("(saved: {} done, {} failed)", completed, failed));
                }
            }
            SyncProgress::Complete { summary } => {
                bar.finish_and_clear();
                print_summary(&summary);
            }
        }
    }
}

fn describe_failure(failure: &TrackFailure) -> String {
    match failure {
        TrackFailure::NotFoundOnSource => "not found on YouTube".to_string(),
        TrackFailure::DownloadFailed(reason) => {
            // yt-dlp stderr can be long; the first line carries the reason
            let first_line = reason.lines().next().unwrap_or_default();
            format!("download failed ({})", first_line)
        }
    }
}

fn print_summary(summary: &Summary) {
    println!();
    if summary.is_clean() {
        println!("{}", "Download complete!".green().bold());
    } else {
        println!("{}", "Download finished with problems".yellow().bold());
    }
    println!("  Succeeded: {}", summary.succeeded.to_string().green());
    if summary.failed > 0 {
        println!("  Failed:    {}", summary.failed.to_string().red());
    } else {
        println!("  Failed:    0");
    }
    if summary.skipped > 0 {
        println!("  Skipped:   {} (downloaded earlier)", summary.skipped);
    }
    if summary.cancelled > 0 {
        println!("  Cancelled: {}", summary.cancelled);
    }
}

/// Handle the `status` command
pub async fn status(playlist: String) -> Result<()> {
    let id = playlist_id(&playlist)?;
    let config = Config::load()?;
    let store = LedgerStore::new(config.ledger_dir.clone(), config.ledger_ttl());

    match store.load(&id) {
        Some(ledger) => {
            println!("{} {}", "Playlist".bold(), id.green());
            let saved = DateTime::from_timestamp(ledger.saved_at, 0)
                .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!("  Last saved: {} ({} min ago)", saved, ledger.age().as_secs() / 60);
            println!("  Completed:  {}", ledger.completed.len());
            println!("  Failed:     {}", ledger.failed.len());
            println!("  File:       {}", store.path_for(&id).display());
        }
        None => {
            println!("{}", format!("No saved progress for playlist {}.", id).yellow());
        }
    }

    Ok(())
}

/// Handle the `config` command
pub fn config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load()?;
            println!("{} {}", "Config file:".bold(), Config::config_path()?.display());
            println!(
                "{}",
                serde_json::to_string_pretty(&config).context("Failed to serialize config")?
            );
        }
        ConfigAction::Set {
            output_dir,
            format,
            quality,
            workers,
        } => {
            let mut config = Config::load()?;
            DownloadOverrides {
                output: output_dir,
                format,
                quality,
                workers,
            }
            .apply(&mut config);
            config.save()?;
            println!("{}", "Settings saved.".green());
        }
    }
    Ok(())
}

/// Handle the `completion` command
pub fn completion(shell: clap_complete::Shell) {
    let mut cmd = <super::Cli as clap::CommandFactory>::command();
    generate(shell, &mut cmd, "spotgrab", &mut io::stdout());
}
