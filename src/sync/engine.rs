//! Playlist download orchestration

use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ledger::{LedgerStore, ProgressLedger};
use super::pipeline::TrackPipeline;
use crate::error::{SyncError, TrackFailure};
use crate::spotify::{MetadataService, Playlist, Track};

/// Progress updates sent during a playlist download
#[derive(Debug, Clone)]
pub enum SyncProgress {
    /// Track list fetched and ledger loaded
    Started {
        playlist: Playlist,
        total: usize,
        /// Tracks a previous run already completed
        already_completed: usize,
    },
    /// A track finished, successfully or not
    TrackFinished {
        track: Track,
        result: Result<PathBuf, TrackFailure>,
    },
    /// The ledger was written to disk
    LedgerFlushed {
        completed: usize,
        failed: usize,
        is_final: bool,
    },
    /// Run finished
    Complete { summary: Summary },
}

/// Result of a playlist download
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Completed by an earlier run
    pub skipped: usize,
    /// Never started because the run was cancelled
    pub cancelled: usize,
}

impl Summary {
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }
}

enum TrackOutcome {
    Finished(Result<PathBuf, TrackFailure>),
    Cancelled,
}

/// Downloads whole playlists with bounded parallelism and resumable progress
pub struct PlaylistDownloader {
    metadata: Arc<dyn MetadataService>,
    pipeline: Arc<TrackPipeline>,
    ledger_store: LedgerStore,
    workers: usize,
    flush_interval: usize,
    cancel: CancellationToken,
}

impl PlaylistDownloader {
    pub fn new(
        metadata: Arc<dyn MetadataService>,
        pipeline: Arc<TrackPipeline>,
        ledger_store: LedgerStore,
    ) -> Self {
        Self {
            metadata,
            pipeline,
            ledger_store,
            workers: 8,
            flush_interval: 10,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_flush_interval(mut self, flush_interval: usize) -> Self {
        self.flush_interval = flush_interval.max(1);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fetch and download a single track
    pub async fn download_track(
        &self,
        track_id: &str,
    ) -> Result<(Track, Result<PathBuf, TrackFailure>), SyncError> {
        let track = self
            .metadata
            .get_track(track_id)
            .await
            .map_err(|source| SyncError::MetadataFetch {
                id: track_id.to_string(),
                source,
            })?;

        let result = self.pipeline.download_track(&track).await;
        if let Err(e) = &result {
            warn!("Failed to download {} - {}: {}", track.artist, track.name, e);
        }
        Ok((track, result))
    }

    /// Download every track of a playlist not completed by a previous run
    pub async fn download_playlist(
        &self,
        playlist_id: &str,
        progress: Option<mpsc::Sender<SyncProgress>>,
    ) -> Result<Summary, SyncError> {
        let metadata_error = |source| SyncError::MetadataFetch {
            id: playlist_id.to_string(),
            source,
        };
        let playlist = self
            .metadata
            .get_playlist(playlist_id)
            .await
            .map_err(metadata_error)?;
        let tracks = self
            .metadata
            .get_playlist_tracks(playlist_id)
            .await
            .map_err(metadata_error)?;

        let mut ledger = self.ledger_store.load(playlist_id).unwrap_or_default();
        let remaining: Vec<Track> = tracks
            .iter()
            .filter(|t| !ledger.completed.contains(&t.id))
            .cloned()
            .collect();

        let mut summary = Summary {
            total: tracks.len(),
            skipped: tracks.len() - remaining.len(),
            ..Summary::default()
        };

        info!(
            "Playlist '{}': {} tracks, {} already downloaded",
            playlist.name, summary.total, summary.skipped
        );
        emit(
            &progress,
            SyncProgress::Started {
                playlist,
                total: summary.total,
                already_completed: summary.skipped,
            },
        )
        .await;

        if remaining.is_empty() {
            self.discard_ledger(playlist_id);
            emit(&progress, SyncProgress::Complete { summary: summary.clone() }).await;
            return Ok(summary);
        }

        let concurrency = self.workers.min(remaining.len());
        debug!("Downloading {} tracks with {} workers", remaining.len(), concurrency);

        let mut results = futures::stream::iter(remaining.into_iter().map(|track| {
            let pipeline = self.pipeline.clone();
            let cancel = self.cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    return (track, TrackOutcome::Cancelled);
                }
                let result = pipeline.download_track(&track).await;
                (track, TrackOutcome::Finished(result))
            }
        }))
        .buffer_unordered(concurrency);

        let mut processed = 0usize;
        while let Some((track, outcome)) = results.next().await {
            let result = match outcome {
                TrackOutcome::Cancelled => {
                    summary.cancelled += 1;
                    continue;
                }
                TrackOutcome::Finished(result) => result,
            };

            match &result {
                Ok(_) => {
                    ledger.mark_completed(&track.id);
                    summary.succeeded += 1;
                }
                Err(e) => {
                    warn!("Failed to download {} - {}: {}", track.artist, track.name, e);
                    ledger.mark_failed(&track.id);
                    summary.failed += 1;
                }
            }
            emit(&progress, SyncProgress::TrackFinished { track, result }).await;

            processed += 1;
            if processed % self.flush_interval == 0 {
                self.flush(playlist_id, &mut ledger, false, &progress).await;
            }
        }

        self.flush(playlist_id, &mut ledger, true, &progress).await;
        if ledger.failed.is_empty() && summary.cancelled == 0 {
            self.discard_ledger(playlist_id);
        } else if summary.cancelled > 0 {
            info!("Cancelled with {} tracks not started; progress saved", summary.cancelled);
        }

        info!(
            "Playlist done: {} succeeded, {} failed, {} skipped",
            summary.succeeded, summary.failed, summary.skipped
        );
        emit(&progress, SyncProgress::Complete { summary: summary.clone() }).await;
        Ok(summary)
    }

    async fn flush(
        &self,
        playlist_id: &str,
        ledger: &mut ProgressLedger,
        is_final: bool,
        progress: &Option<mpsc::Sender<SyncProgress>>,
    ) {
        if let Err(e) = self.ledger_store.save(playlist_id, ledger) {
            warn!("Failed to save progress: {:#}", e);
            return;
        }
        emit(
            progress,
            SyncProgress::LedgerFlushed {
                completed: ledger.completed.len(),
                failed: ledger.failed.len(),
                is_final,
            },
        )
        .await;
    }

    fn discard_ledger(&self, playlist_id: &str) {
        if let Err(e) = self.ledger_store.remove(playlist_id) {
            warn!("Failed to remove progress ledger: {:#}", e);
        }
    }
}

async fn emit(progress: &Option<mpsc::Sender<SyncProgress>>, event: SyncProgress) {
    if let Some(tx) = progress {
        // receiver gone just means nobody is watching
        let _ = tx.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::stub::StubEngine;
    use crate::spotify::stub::{StubMetadata, track, tracks};
    use crate::sync::pipeline::testing::pipeline;
    use std::path::Path;
    use std::time::Duration;

    const DAY: Duration = Duration::from_secs(24 * 3600);

    struct Fixture {
        _dir: tempfile::TempDir,
        output_dir: PathBuf,
        store: LedgerStore,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let output_dir = dir.path().join("music");
            let store = LedgerStore::new(dir.path().join("progress"), DAY);
            Self {
                _dir: dir,
                output_dir,
                store,
            }
        }

        fn downloader(&self, engine: Arc<StubEngine>, metadata: StubMetadata) -> PlaylistDownloader {
            PlaylistDownloader::new(
                Arc::new(metadata),
                Arc::new(pipeline(engine, &self.output_dir)),
                self.store.clone(),
            )
        }
    }

    fn url_for(track: &Track) -> String {
        StubEngine::url_for(&format!("{} {}", track.artist, track.name))
    }

    async fn collect(mut rx: mpsc::Receiver<SyncProgress>) -> Vec<SyncProgress> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn file_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_resume_only_submits_remaining() {
        let fx = Fixture::new();
        let [a, b, c]: [Track; 3] = tracks(3).try_into().unwrap();
        let mut ledger = ProgressLedger::default();
        ledger.mark_completed(&a.id);
        ledger.mark_completed(&b.id);
        fx.store.save("pl", &mut ledger).unwrap();

        let engine = Arc::new(StubEngine::always_found());
        let downloader = fx.downloader(engine.clone(), StubMetadata::new(vec![a, b, c.clone()]));

        let summary = downloader.download_playlist("pl", None).await.unwrap();
        assert_eq!(engine.downloaded_urls(), vec![url_for(&c)]);
        assert_eq!(
            summary,
            Summary {
                total: 3,
                succeeded: 1,
                failed: 0,
                skipped: 2,
                cancelled: 0,
            }
        );
        assert!(!fx.store.path_for("pl").exists());
    }

    #[tokio::test]
    async fn test_unresolvable_track_recorded_as_failed() {
        let fx = Fixture::new();
        let good = track("good", "Artist", "Song");
        let bad = track("bad", "Test Artist", "Test Song");

        let engine = StubEngine::never_found().with_hits(
            "Artist Song",
            vec![crate::extract::stub::hit("Artist - Song", Some(200.0))],
        );
        let downloader = fx.downloader(Arc::new(engine), StubMetadata::new(vec![good, bad]));

        let summary = downloader.download_playlist("pl", None).await.unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);

        let ledger = fx.store.load("pl").unwrap();
        assert!(ledger.failed.contains("bad"));
        assert!(ledger.completed.contains("good"));
        assert_eq!(file_count(&fx.output_dir), 1);
    }

    #[tokio::test]
    async fn test_periodic_flushes() {
        let fx = Fixture::new();
        let engine = Arc::new(StubEngine::always_found());
        let downloader = fx
            .downloader(engine.clone(), StubMetadata::new(tracks(20)))
            .with_workers(8)
            .with_flush_interval(10);

        let (tx, rx) = mpsc::channel(256);
        let summary = downloader.download_playlist("pl", Some(tx)).await.unwrap();
        let events = collect(rx).await;

        let flushes: Vec<bool> = events
            .iter()
            .filter_map(|e| match e {
                SyncProgress::LedgerFlushed { is_final, .. } => Some(*is_final),
                _ => None,
            })
            .collect();
        assert_eq!(flushes, vec![false, false, true]);
        assert_eq!(summary.succeeded, 20);
        assert_eq!(engine.downloaded_urls().len(), 20);
        assert!(matches!(events.first(), Some(SyncProgress::Started { total: 20, .. })));
        match events.last() {
            Some(SyncProgress::Complete { summary: reported }) => assert_eq!(reported, &summary),
            other => panic!("unexpected last event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failures_count_towards_flushes() {
        let fx = Fixture::new();
        let downloader = fx
            .downloader(Arc::new(StubEngine::never_found()), StubMetadata::new(tracks(4)))
            .with_flush_interval(2);

        let (tx, rx) = mpsc::channel(256);
        let summary = downloader.download_playlist("pl", Some(tx)).await.unwrap();
        let flushes: Vec<(usize, usize, bool)> = collect(rx)
            .await
            .into_iter()
            .filter_map(|e| match e {
                SyncProgress::LedgerFlushed {
                    completed,
                    failed,
                    is_final,
                } => Some((completed, failed, is_final)),
                _ => None,
            })
            .collect();

        assert_eq!(summary.failed, 4);
        assert_eq!(flushes, vec![(0, 2, false), (0, 4, false), (0, 4, true)]);
        assert_eq!(fx.store.load("pl").unwrap().failed.len(), 4);
    }

    #[tokio::test]
    async fn test_clean_run_deletes_ledger_and_is_not_idempotent() {
        let fx = Fixture::new();
        let engine = Arc::new(StubEngine::always_found());
        let downloader = fx.downloader(engine.clone(), StubMetadata::new(tracks(3)));

        let first = downloader.download_playlist("pl", None).await.unwrap();
        assert!(first.is_clean());
        assert!(!fx.store.path_for("pl").exists());
        assert_eq!(engine.downloaded_urls().len(), 3);

        // with the ledger gone every track is fetched again
        let second = downloader.download_playlist("pl", None).await.unwrap();
        assert_eq!(second.skipped, 0);
        assert_eq!(second.succeeded, 3);
        assert_eq!(engine.downloaded_urls().len(), 6);
    }

    #[tokio::test]
    async fn test_failed_track_succeeds_on_retry() {
        let fx = Fixture::new();
        let song = track("t1", "Artist", "Song");
        let mut ledger = ProgressLedger::default();
        ledger.mark_failed(&song.id);
        fx.store.save("pl", &mut ledger).unwrap();

        let downloader = fx.downloader(
            Arc::new(StubEngine::always_found()),
            StubMetadata::new(vec![song]),
        );
        let summary = downloader.download_playlist("pl", None).await.unwrap();

        assert_eq!(summary.succeeded, 1);
        assert!(!fx.store.path_for("pl").exists());
    }

    #[tokio::test]
    async fn test_metadata_failure_writes_nothing() {
        let fx = Fixture::new();
        let engine = Arc::new(StubEngine::always_found());
        let downloader = fx.downloader(engine.clone(), StubMetadata::failing());

        let err = downloader.download_playlist("pl", None).await.unwrap_err();
        assert!(matches!(err, SyncError::MetadataFetch { ref id, .. } if id == "pl"));
        assert!(!fx.store.path_for("pl").exists());
        assert_eq!(engine.search_count(), 0);
    }

    #[tokio::test]
    async fn test_everything_already_completed() {
        let fx = Fixture::new();
        let all = tracks(2);
        let mut ledger = ProgressLedger::default();
        for t in &all {
            ledger.mark_completed(&t.id);
        }
        fx.store.save("pl", &mut ledger).unwrap();

        let engine = Arc::new(StubEngine::always_found());
        let downloader = fx.downloader(engine.clone(), StubMetadata::new(all));
        let summary = downloader.download_playlist("pl", None).await.unwrap();

        assert_eq!(summary.skipped, 2);
        assert_eq!(engine.search_count(), 0);
        assert!(!fx.store.path_for("pl").exists());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_keeps_ledger() {
        let fx = Fixture::new();
        let engine = Arc::new(StubEngine::always_found());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let downloader = fx
            .downloader(engine.clone(), StubMetadata::new(tracks(5)))
            .with_cancellation(cancel);

        let summary = downloader.download_playlist("pl", None).await.unwrap();
        assert_eq!(summary.cancelled, 5);
        assert_eq!(summary.succeeded, 0);
        assert!(!summary.is_clean());
        assert!(engine.downloaded_urls().is_empty());
        assert!(fx.store.path_for("pl").exists());
    }

    #[tokio::test]
    async fn test_single_track_download() {
        let fx = Fixture::new();
        let downloader = fx.downloader(
            Arc::new(StubEngine::always_found()),
            StubMetadata::new(vec![track("t1", "Artist", "Song")]),
        );

        let (track, result) = downloader.download_track("t1").await.unwrap();
        assert_eq!(track.name, "Song");
        assert_eq!(result.unwrap(), fx.output_dir.join("Artist - Song.mp3"));

        assert!(matches!(
            downloader.download_track("missing").await,
            Err(SyncError::MetadataFetch { .. })
        ));
    }
}
