use thiserror::Error;

/// Main error type for the VOD packaging core
#[derive(Error, Debug)]
pub enum VodError {
    /// `start()` was called while the manager is already running
    #[error("manager already running")]
    AlreadyRunning,

    /// Probing the media for metadata or keyframes failed; fatal to initialization
    #[error("probe failed: {0}")]
    Probe(String),

    /// Reading or writing the metadata cache failed; recovered by re-probing
    #[error("metadata cache error: {0}")]
    Cache(String),

    /// Producing a segment failed; eligible for retry on the next request
    #[error("transcode failed for segment {index}: {message}")]
    Transcode { index: usize, message: String },

    /// The readiness wait expired before initialization finished
    #[error("not ready: timeout")]
    NotReadyTimeout,

    /// The manager shut down, or initialization failed, before becoming ready
    #[error("not available: {0}")]
    Unavailable(String),

    /// Unknown segment index, or the backing file is gone after production
    #[error("segment not found: {0}")]
    SegmentNotFound(usize),

    /// A standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, VodError>;
