use thiserror::Error;

/// Why the search-results page could not be turned into candidates.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("search provider returned status {0}")]
    Status(u16),

    #[error("search request timed out")]
    Timeout,

    #[error("search request failed: {0}")]
    Transport(String),

    #[error("run was canceled before the search request was issued")]
    Canceled,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("query is empty after removing path-hostile characters")]
    InvalidQuery,

    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("search results contained no usable image candidates")]
    NoCandidates,

    #[error("no images could be downloaded for this run")]
    DownloadFailed,

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
