//! Segment production.
//!
//! A `Transcoder` turns a contiguous run of planned segments into files
//! on disk, reporting each completed segment through a `TranscodeSink`.
//! The default implementation shells out to ffmpeg with the segment
//! muxer; a segment counts as complete once its successor file exists or
//! the process has exited cleanly, so a partially written file is never
//! reported.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};

use crate::config::{AudioProfile, VideoProfile};
use crate::error::{Result, VodError};
use crate::playlist::segment_name;

/// How often the output directory is checked for finished segments
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One contiguous run of segments to produce
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    /// Source media file
    pub media_path: PathBuf,
    /// Directory the segment files are written to
    pub transcode_dir: PathBuf,
    /// Filename prefix for the segment files
    pub segment_prefix: String,
    /// First segment index to produce (1-indexed)
    pub start_index: usize,
    /// Boundary times covering the run: segment `start_index + k` spans
    /// `[segment_times[k], segment_times[k+1])`
    pub segment_times: Vec<f64>,
    /// Video encode profile
    pub video_profile: VideoProfile,
    /// Audio encode profile
    pub audio_profile: AudioProfile,
}

impl TranscodeJob {
    /// Number of segments this job produces.
    pub fn segment_count(&self) -> usize {
        self.segment_times.len().saturating_sub(1)
    }

    /// Last segment index this job produces.
    pub fn last_index(&self) -> usize {
        self.start_index + self.segment_count().saturating_sub(1)
    }

    /// On-disk path of one of this job's segments.
    pub fn segment_path(&self, index: usize) -> PathBuf {
        self.transcode_dir
            .join(segment_name(&self.segment_prefix, index))
    }
}

/// A completed segment reported by the executor
#[derive(Debug, Clone)]
pub struct SegmentProduced {
    /// 1-indexed segment number
    pub index: usize,
    /// Path of the finished segment file
    pub path: PathBuf,
}

/// Channels the executor reports through
pub struct TranscodeSink {
    /// Completed segments, in ascending index order
    pub produced: mpsc::Sender<SegmentProduced>,
    /// Raw executor log lines (ffmpeg stderr)
    pub log: mpsc::Sender<String>,
    /// Cancellation signal; becomes `true` when the manager stops
    pub cancel: watch::Receiver<bool>,
}

/// Executor that produces segment files on disk
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Produce the job's segments, reporting each completed one through
    /// `sink.produced`. Returns once every segment is reported, the
    /// process failed, or `sink.cancel` fired.
    async fn transcode(&self, job: TranscodeJob, sink: TranscodeSink) -> Result<()>;
}

/// A transcoder backed by the `ffmpeg` CLI and its segment muxer
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    binary: PathBuf,
}

impl FfmpegTranscoder {
    /// Create a new transcoder using the given ffmpeg binary.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Build the ffmpeg argument list for a job.
    ///
    /// The input is seeked to the first boundary, so segment split points
    /// and forced keyframes are expressed relative to it.
    fn build_args(&self, job: &TranscodeJob) -> Vec<String> {
        let start = job.segment_times[0];
        let end = job.segment_times[job.segment_times.len() - 1];
        let offsets: Vec<String> = job.segment_times[1..]
            .iter()
            .map(|t| format!("{:.6}", t - start))
            .collect();
        let split_times = offsets.join(",");

        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "warning".into(),
            "-ss".into(),
            format!("{:.6}", start),
            "-i".into(),
            job.media_path.to_string_lossy().into_owned(),
            "-to".into(),
            format!("{:.6}", end - start),
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "0:a:0?".into(),
            "-vf".into(),
            format!(
                "scale={}:{}",
                job.video_profile.width, job.video_profile.height
            ),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "veryfast".into(),
            "-b:v".into(),
            format!("{}k", job.video_profile.bitrate_kbps),
            "-force_key_frames".into(),
            split_times.clone(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            format!("{}k", job.audio_profile.bitrate_kbps),
            "-ac".into(),
            "2".into(),
            "-f".into(),
            "segment".into(),
            "-segment_format".into(),
            "mpegts".into(),
            "-segment_times".into(),
            split_times,
            "-segment_start_number".into(),
            job.start_index.to_string(),
        ];
        args.push(
            job.transcode_dir
                .join(format!("{}-%05d.ts", job.segment_prefix))
                .to_string_lossy()
                .into_owned(),
        );
        args
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, job: TranscodeJob, sink: TranscodeSink) -> Result<()> {
        tokio::fs::create_dir_all(&job.transcode_dir).await?;

        let args = self.build_args(&job);
        tracing::debug!(
            start = job.start_index,
            count = job.segment_count(),
            "spawning ffmpeg"
        );

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VodError::Transcode {
                index: job.start_index,
                message: format!("failed to spawn ffmpeg: {}", e),
            })?;

        if let Some(stderr) = child.stderr.take() {
            let log = sink.log.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if log.send(line).await.is_err() {
                        break;
                    }
                }
            });
        }

        let last = job.last_index();
        let mut next = job.start_index;
        let mut cancel = sink.cancel.clone();
        let mut interval = tokio::time::interval(POLL_INTERVAL);

        let status = loop {
            tokio::select! {
                status = child.wait() => {
                    break status.map_err(|e| VodError::Transcode {
                        index: next,
                        message: format!("ffmpeg wait failed: {}", e),
                    })?;
                }
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        tracing::debug!(start = job.start_index, "transcode cancelled");
                        let _ = child.kill().await;
                        return Ok(());
                    }
                }
                _ = interval.tick() => {
                    // a segment is complete once its successor exists
                    while next < last && file_exists(&job.segment_path(next + 1)) {
                        report(&sink, &job, next).await;
                        next += 1;
                    }
                }
            }
        };

        if !status.success() {
            return Err(VodError::Transcode {
                index: next,
                message: format!("ffmpeg exited with {}", status),
            });
        }

        // clean exit: everything on disk up to the last index is complete
        while next <= last {
            if !file_exists(&job.segment_path(next)) {
                return Err(VodError::Transcode {
                    index: next,
                    message: "ffmpeg exited before producing segment".to_string(),
                });
            }
            report(&sink, &job, next).await;
            next += 1;
        }

        Ok(())
    }
}

fn file_exists(path: &Path) -> bool {
    path.exists()
}

async fn report(sink: &TranscodeSink, job: &TranscodeJob, index: usize) {
    let _ = sink
        .produced
        .send(SegmentProduced {
            index,
            path: job.segment_path(index),
        })
        .await;
}
