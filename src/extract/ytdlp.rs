//! yt-dlp subprocess engine

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::{DownloadRequest, EngineError, ExtractionEngine, SearchHit};

/// Extensions accepted when the engine's output name differs from the request
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a", "ogg", "opus"];

/// Extraction engine backed by the `yt-dlp` binary
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: String,
    retries: u32,
    socket_timeout: Duration,
    cookie_file: Option<PathBuf>,
}

/// A single line of `--dump-json --flat-playlist` output
#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    webpage_url: Option<String>,
    url: Option<String>,
}

impl YtDlp {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            retries: 3,
            socket_timeout: Duration::from_secs(30),
            cookie_file: None,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    /// Pass a Netscape-format cookie file through to yt-dlp
    pub fn with_cookie_file(mut self, cookie_file: Option<PathBuf>) -> Self {
        self.cookie_file = cookie_file;
        self
    }

    /// Check whether the binary can be executed at all
    pub async fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .output()
            .await
            .is_ok_and(|output| output.status.success())
    }

    fn common_args(&self) -> Vec<String> {
        let mut args = vec![
            "--quiet".to_string(),
            "--no-warnings".to_string(),
            "--retries".to_string(),
            self.retries.to_string(),
            "--socket-timeout".to_string(),
            self.socket_timeout.as_secs().to_string(),
        ];
        if let Some(cookies) = self.cookie_file.as_ref().filter(|p| p.exists()) {
            args.push("--cookies".to_string());
            args.push(cookies.display().to_string());
        }
        args
    }

    fn search_args(&self, query: &str, top_n: usize) -> Vec<String> {
        let mut args = vec![
            format!("ytsearch{}:{}", top_n, query),
            "--dump-json".to_string(),
            "--flat-playlist".to_string(),
        ];
        args.extend(self.common_args());
        args
    }

    fn describe_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            url.to_string(),
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
        ];
        args.extend(self.common_args());
        args
    }

    fn download_args(&self, url: &str, request: &DownloadRequest) -> Vec<String> {
        let template = request
            .output_dir
            .join(format!("{}.%(ext)s", request.file_stem));

        let mut args = vec![
            url.to_string(),
            "--format".to_string(),
            "bestaudio/best".to_string(),
            "--extract-audio".to_string(),
            "--audio-format".to_string(),
            request.format.extension().to_string(),
            "--audio-quality".to_string(),
            request.quality.ytdlp_value(request.format).to_string(),
            "--output".to_string(),
            template.display().to_string(),
            "--no-playlist".to_string(),
        ];
        args.extend(self.common_args());
        args
    }

    async fn run(&self, args: &[String]) -> Result<Vec<u8>, EngineError> {
        debug!("Running {} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| EngineError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(EngineError::Failed {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

/// Parse newline-delimited JSON search output, skipping unusable lines
fn parse_search_output(stdout: &str) -> Vec<SearchHit> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<FlatEntry>(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unparseable search line: {}", e);
                None
            }
        })
        .filter_map(|entry| {
            let url = entry
                .webpage_url
                .filter(|u| u.starts_with("http"))
                .or(entry.url.filter(|u| u.starts_with("http")))
                .or_else(|| {
                    entry
                        .id
                        .as_ref()
                        .map(|id| format!("https://www.youtube.com/watch?v={}", id))
                })?;
            Some(SearchHit {
                url,
                title: entry.title.unwrap_or_default(),
                duration: entry.duration,
            })
        })
        .collect()
}

/// Find the file yt-dlp produced for `request`
///
/// Prefers `<stem>.<format>`; post-processing may leave a different audio
/// extension behind, so any `<stem>.<audio ext>` is accepted as a fallback.
async fn locate_output(request: &DownloadRequest) -> Result<Option<PathBuf>, EngineError> {
    let expected = request
        .output_dir
        .join(format!("{}.{}", request.file_stem, request.format.extension()));
    if tokio::fs::try_exists(&expected).await? {
        return Ok(Some(expected));
    }

    let mut entries = tokio::fs::read_dir(&request.output_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if is_output_candidate(&path, &request.file_stem) {
            return Ok(Some(path));
        }
    }

    Ok(None)
}

fn is_output_candidate(path: &Path, stem: &str) -> bool {
    let stem_matches = path.file_stem().and_then(|s| s.to_str()) == Some(stem);
    let ext_matches = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
    stem_matches && ext_matches
}

#[async_trait]
impl ExtractionEngine for YtDlp {
    async fn search(&self, query: &str, top_n: usize) -> Result<Vec<SearchHit>, EngineError> {
        let stdout = self.run(&self.search_args(query, top_n)).await?;
        let hits = parse_search_output(&String::from_utf8_lossy(&stdout));
        debug!("Search '{}' returned {} results", query, hits.len());
        Ok(hits)
    }

    async fn describe(&self, url: &str) -> Result<SearchHit, EngineError> {
        let stdout = self.run(&self.describe_args(url)).await?;
        parse_search_output(&String::from_utf8_lossy(&stdout))
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::NoMetadata(url.to_string()))
    }

    async fn download(&self, url: &str, request: &DownloadRequest) -> Result<PathBuf, EngineError> {
        tokio::fs::create_dir_all(&request.output_dir).await?;
        self.run(&self.download_args(url, request)).await?;

        locate_output(request)
            .await?
            .ok_or_else(|| EngineError::MissingOutput(request.file_stem.clone()))
    }
}
