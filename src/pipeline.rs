use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::{fs, process::Command};

use crate::{
    chat::ChatTransport,
    engine::{CHANNELS, SAMPLE_RATE_HZ},
    error::PipelineError,
    request::{MaterializedTrack, MediaSource, Request},
};

/// Disposable per-track working directory, reused by name across tracks.
/// Recursively removed before and after every materialization.
pub const SCRATCH_DIR: &str = "temp_music_dir";

/// The single raw PCM artifact the broadcast engine plays from.
pub const RAW_OUTPUT: &str = "output.raw";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Downloading,
    Transcoding,
}

/// Stage reporting back into the control loop.
pub struct Progress(Box<dyn Fn(Stage) + Send + Sync>);

impl Progress {
    pub fn new(notify: impl Fn(Stage) + Send + Sync + 'static) -> Self {
        Self(Box::new(notify))
    }

    /// No-op sink.
    pub fn sink() -> Self {
        Self(Box::new(|_| {}))
    }

    pub fn stage(&self, stage: Stage) {
        (self.0)(stage)
    }
}

/// The full download+transcode step producing a playable raw-audio
/// artifact for one request. One invocation at a time; the control loop
/// never overlaps two.
#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn materialize(
        &self,
        request: &Request,
        progress: &Progress,
    ) -> Result<MaterializedTrack, PipelineError>;
}

#[derive(Clone, Debug)]
pub struct DownloadedAudio {
    pub title: String,
    /// Seconds.
    pub duration: Option<u32>,
}

/// Downloader-transcoder backend: fetch best-available audio for a URL
/// into `dest` as a lossy intermediate, reporting authoritative metadata.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, url: &str, dest: &Path) -> Result<DownloadedAudio, PipelineError>;
}

/// `yt-dlp` subprocess downloader. Extracts best audio, normalizes to mp3,
/// prints track metadata as JSON on stdout.
pub struct YtDlp {
    binary: String,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".into(),
        }
    }
}

#[async_trait]
impl Downloader for YtDlp {
    async fn download(&self, url: &str, dest: &Path) -> Result<DownloadedAudio, PipelineError> {
        #[derive(::serde::Deserialize)]
        struct Info {
            title: String,
            duration: Option<f64>,
        }

        let template = dest.join("%(title)s.%(ext)s");
        let output = Command::new(&self.binary)
            .args([
                "--no-playlist",
                "--no-warnings",
                "--extract-audio",
                "--audio-format",
                "mp3",
                "--audio-quality",
                "320K",
                "--print-json",
                "-o",
            ])
            .arg(template)
            .arg(url)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| PipelineError::Backend(err.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Backend(stderr.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .find(|line| line.trim_start().starts_with('{'))
            .ok_or(PipelineError::NotDownloaded)?;
        let info: Info = serde_json::from_str(line)?;

        Ok(DownloadedAudio {
            title: info.title,
            duration: info.duration.map(|d| d as u32),
        })
    }
}

/// Production pipeline: scratch-dir lifecycle, download (or attachment
/// fetch), then an ffmpeg transcode to the fixed raw PCM contract.
pub struct TrackPipeline {
    transport: Arc<dyn ChatTransport>,
    downloader: Arc<dyn Downloader>,
    ffmpeg: String,
    scratch: PathBuf,
    output: PathBuf,
}

impl TrackPipeline {
    pub fn new(transport: Arc<dyn ChatTransport>, downloader: Arc<dyn Downloader>) -> Self {
        Self {
            transport,
            downloader,
            ffmpeg: "ffmpeg".into(),
            scratch: PathBuf::from(SCRATCH_DIR),
            output: PathBuf::from(RAW_OUTPUT),
        }
    }

    pub fn with_paths(mut self, scratch: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        self.scratch = scratch.into();
        self.output = output.into();
        self
    }

    async fn run(
        &self,
        request: &Request,
        progress: &Progress,
    ) -> Result<MaterializedTrack, PipelineError> {
        progress.stage(Stage::Downloading);

        let (audio_path, title, duration) = match &request.source {
            MediaSource::Attachment(meta) => {
                let path = self.transport.fetch_attachment(meta, &self.scratch).await?;
                let title = meta.title.clone().unwrap_or_else(|| "Song".into());
                (path, title, meta.duration)
            }
            MediaSource::DirectLink(_) | MediaSource::Search(_) => {
                let url = request.link.as_deref().ok_or(PipelineError::NotDownloaded)?;
                let downloaded = self.downloader.download(url, &self.scratch).await?;
                let path = find_audio_file(&self.scratch)
                    .await
                    .ok_or(PipelineError::NotDownloaded)?;
                (path, downloaded.title, downloaded.duration)
            }
        };

        progress.stage(Stage::Transcoding);
        self.transcode(&audio_path).await?;

        Ok(MaterializedTrack {
            title,
            duration,
            raw_path: self.output.clone(),
        })
    }

    async fn transcode(&self, input: &Path) -> Result<(), PipelineError> {
        let output = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-y", "-i"])
            .arg(input)
            .args([
                "-vn",
                "-f",
                "s16le",
                "-acodec",
                "pcm_s16le",
                "-ac",
                &CHANNELS.to_string(),
                "-ar",
                &SAMPLE_RATE_HZ.to_string(),
            ])
            .arg(&self.output)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Transcode(stderr.trim().to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl Pipeline for TrackPipeline {
    async fn materialize(
        &self,
        request: &Request,
        progress: &Progress,
    ) -> Result<MaterializedTrack, PipelineError> {
        // clean slate in, no leaked temp files out
        clean_scratch(&self.scratch).await?;
        let result = self.run(request, progress).await;
        let _ = fs::remove_dir_all(&self.scratch).await;
        result
    }
}

async fn clean_scratch(scratch: &Path) -> Result<(), PipelineError> {
    match fs::remove_dir_all(scratch).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }
    fs::create_dir_all(scratch).await?;
    Ok(())
}

/// First downloaded audio file in the scratch directory, preferring the
/// same extension order the downloader emits.
async fn find_audio_file(dir: &Path) -> Option<PathBuf> {
    let mut entries = Vec::new();
    let mut read_dir = fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = read_dir.next_entry().await {
        entries.push(entry.path());
    }
    entries.sort();

    for ext in ["mp3", "flac", "wav", "m4a"] {
        if let Some(path) = entries
            .iter()
            .find(|path| path.extension().is_some_and(|e| e == ext))
        {
            return Some(path.clone());
        }
    }
    None
}
