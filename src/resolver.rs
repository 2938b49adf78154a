use async_trait::async_trait;
use tokio::process::Command;

use crate::error::ResolveError;

#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
}

/// Search-by-title backend. Network I/O, must never run on the control
/// loop's critical path.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ResolveError>;
}

/// Resolve a free-text query to the single best hit.
pub async fn resolve_search(
    backend: &dyn SearchBackend,
    query: &str,
) -> Result<SearchHit, ResolveError> {
    backend
        .search(query, 1)
        .await?
        .into_iter()
        .next()
        .ok_or(ResolveError::NotFound)
}

/// Recognize a direct video link, returning the canonical watch URL.
///
/// Accepts youtube.com/watch, /embed/, /v/, youtu.be short links and the
/// nocookie host, with or without a scheme. Video ids are 11 characters.
pub fn parse_video_link(input: &str) -> Option<String> {
    let input = input.trim();
    let url = match url::Url::parse(input) {
        Ok(url) => url,
        // bare "youtube.com/..." without a scheme
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            url::Url::parse(&format!("https://{input}")).ok()?
        }
        Err(_) => return None,
    };

    match url.scheme() {
        "http" | "https" => {}
        _ => return None,
    }

    let host = url.domain()?.strip_prefix("www.").unwrap_or(url.domain()?);
    let id = match host {
        "youtu.be" => url.path_segments()?.next().map(str::to_string),
        "youtube.com" | "m.youtube.com" | "youtube-nocookie.com" => {
            let path = url.path();
            if path == "/watch" {
                url.query_pairs()
                    .find_map(|(k, v)| (k == "v").then(|| v.into_owned()))
            } else {
                path.strip_prefix("/embed/")
                    .or_else(|| path.strip_prefix("/v/"))
                    .map(str::to_string)
            }
        }
        _ => return None,
    }?;

    let id = id.trim_end_matches('/');
    if id.len() != 11 || !id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_') {
        return None;
    }

    Some(format!("https://www.youtube.com/watch?v={id}"))
}

/// Search backend shelling out to `yt-dlp`'s search support. One JSON
/// object per line on stdout with `--flat-playlist`.
pub struct YtDlpSearch {
    binary: String,
}

impl Default for YtDlpSearch {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".into(),
        }
    }
}

#[async_trait]
impl SearchBackend for YtDlpSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ResolveError> {
        #[derive(::serde::Deserialize)]
        struct Entry {
            title: Option<String>,
            url: Option<String>,
        }

        let output = Command::new(&self.binary)
            .args(["--dump-json", "--flat-playlist", "--no-warnings"])
            .arg(format!("ytsearch{limit}:{query}"))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| ResolveError::Backend(err.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ResolveError::Backend(stderr.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let hits = stdout
            .lines()
            .filter_map(|line| serde_json::from_str::<Entry>(line).ok())
            .filter_map(|entry| {
                Some(SearchHit {
                    title: entry.title?,
                    link: entry.url?,
                })
            })
            .collect();

        Ok(hits)
    }
}
