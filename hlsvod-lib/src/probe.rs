//! Media probing.
//!
//! Two probe modes exist: a fast container-level probe that reads format
//! and stream headers, and a slow packet scan that walks every video
//! packet to collect keyframe timestamps. The scan only runs when the
//! fast probe could not supply keyframes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::error::{Result, VodError};
use crate::types::{AudioMetadata, ProbeMetadata, VideoMetadata};

/// Adapter that extracts stream metadata from a media file
#[async_trait]
pub trait MediaProber: Send + Sync {
    /// Fast container-level probe.
    async fn probe_media(&self, path: &Path) -> Result<ProbeMetadata>;

    /// Slow full packet scan; returns keyframe presentation timestamps
    /// in seconds, in ascending order.
    async fn probe_keyframes(&self, path: &Path) -> Result<Vec<f64>>;
}

/// A prober backed by the `ffprobe` CLI
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    binary: PathBuf,
}

impl FfprobeProber {
    /// Create a new prober using the given ffprobe binary.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str], path: &Path) -> Result<Vec<u8>> {
        let output = Command::new(&self.binary)
            .args(args)
            .arg(path)
            .output()
            .await
            .map_err(|e| VodError::Probe(format!("failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(VodError::Probe(format!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn probe_media(&self, path: &Path) -> Result<ProbeMetadata> {
        let stdout = self
            .run(
                &[
                    "-v",
                    "quiet",
                    "-print_format",
                    "json",
                    "-show_format",
                    "-show_streams",
                ],
                path,
            )
            .await?;
        parse_probe_output(&stdout)
    }

    async fn probe_keyframes(&self, path: &Path) -> Result<Vec<f64>> {
        let stdout = self
            .run(
                &[
                    "-v",
                    "quiet",
                    "-select_streams",
                    "v:0",
                    "-show_entries",
                    "packet=pts_time,flags",
                    "-of",
                    "csv=print_section=0",
                ],
                path,
            )
            .await?;
        Ok(parse_keyframe_csv(&String::from_utf8_lossy(&stdout)))
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

fn parse_seconds(value: &Option<String>) -> f64 {
    value
        .as_deref()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0)
}

/// Map raw ffprobe JSON into a `ProbeMetadata`.
fn parse_probe_output(stdout: &[u8]) -> Result<ProbeMetadata> {
    let ff: FfprobeOutput = serde_json::from_slice(stdout)
        .map_err(|e| VodError::Probe(format!("ffprobe JSON parse error: {}", e)))?;

    let duration = parse_seconds(&ff.format.duration);
    let mut video = None;
    let mut audio = None;

    for stream in &ff.streams {
        match stream.codec_type.as_deref() {
            Some("video") if video.is_none() => {
                video = Some(VideoMetadata {
                    width: stream.width.unwrap_or(0),
                    height: stream.height.unwrap_or(0),
                    duration: match &stream.duration {
                        Some(_) => parse_seconds(&stream.duration),
                        None => duration,
                    },
                    // the container probe never yields keyframes; the
                    // packet scan fills them in
                    keyframe_times: None,
                });
            }
            Some("audio") if audio.is_none() => {
                audio = Some(AudioMetadata {
                    duration: match &stream.duration {
                        Some(_) => parse_seconds(&stream.duration),
                        None => duration,
                    },
                    codec_name: stream.codec_name.clone(),
                });
            }
            _ => {}
        }
    }

    Ok(ProbeMetadata {
        duration,
        video,
        audio,
    })
}

/// Extract keyframe timestamps from `pts_time,flags` CSV lines,
/// keeping packets whose flags carry the keyframe marker `K`.
fn parse_keyframe_csv(stdout: &str) -> Vec<f64> {
    let mut times: Vec<f64> = stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.trim().split(',');
            let pts = parts.next()?;
            let flags = parts.next()?;
            if flags.contains('K') {
                pts.parse().ok()
            } else {
                None
            }
        })
        .collect();
    times.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    times
}
