pub(crate) mod cache;
pub(crate) mod config;
pub(crate) mod error;
pub(crate) mod events;
pub(crate) mod manager;
pub(crate) mod playlist;
pub(crate) mod probe;
pub(crate) mod transcode;
pub(crate) mod types;

pub use config::{AudioProfile, Config, VideoProfile};
pub use error::{Result, VodError};
pub use events::{ManagerEvents, NoopEvents};
pub use manager::{Manager, ManagerBuilder};
pub use playlist::{generate_playlist, parse_segment_name, segment_name, SEGMENT_DURATION};
pub use probe::{FfprobeProber, MediaProber};
pub use transcode::{
    FfmpegTranscoder, SegmentProduced, TranscodeJob, TranscodeSink, Transcoder,
};
pub use types::{AudioMetadata, ProbeMetadata, VideoMetadata};
