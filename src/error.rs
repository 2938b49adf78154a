#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message delete forbidden")]
    DeleteForbidden,

    #[error("message not found")]
    NotFound,

    #[error("transport failure: {0}")]
    Failed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Recoverable start failure, the caller may create the call
    /// explicitly and retry.
    #[error("call start failed: {0}")]
    Start(String),

    #[error("no active call")]
    NotJoined,

    #[error("broadcast engine failure: {0}")]
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no results found")]
    NotFound,

    #[error("search backend failure: {0}")]
    Backend(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("song not downloaded, add it to the queue again")]
    NotDownloaded,

    #[error("downloader failure: {0}")]
    Backend(String),

    #[error("transcode failed: {0}")]
    Transcode(String),

    #[error("attachment fetch failed: {0}")]
    Attachment(#[from] ChatError),

    #[error("metadata parse failed: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
