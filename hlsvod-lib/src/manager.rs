//! The on-demand packaging manager.
//!
//! One `Manager` owns one media file: it probes it (through the cache),
//! derives keyframe-aligned segment boundaries, publishes the VOD
//! playlist, and lazily produces each requested segment exactly once,
//! serving concurrent viewers from a single backing transcode.
//!
//! All mutable state lives behind a single mutex. Request handlers never
//! hold it while suspended: they subscribe to the readiness or per-segment
//! completion channels under the lock, release it, await, then re-acquire
//! it to read the resulting state.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::cache;
use crate::config::Config;
use crate::error::{Result, VodError};
use crate::events::{ManagerEvents, NoopEvents};
use crate::playlist;
use crate::probe::{FfprobeProber, MediaProber};
use crate::transcode::{FfmpegTranscoder, TranscodeJob, TranscodeSink, Transcoder};

/// How long a request may wait for initialization to finish
const READY_TIMEOUT: Duration = Duration::from_secs(24);

/// Terminal outcome of the asynchronous initialization sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitOutcome {
    Pending,
    Ready,
    Failed,
}

/// Per-index availability of a segment
enum SegmentState {
    NotRequested,
    Transcoding {
        done_tx: watch::Sender<bool>,
        done_rx: watch::Receiver<bool>,
    },
    Available,
    Failed,
}

/// Mutable manager state, guarded by the manager's single lock
struct Shared {
    /// Incremented on every `start()`, so waiters from a previous
    /// lifecycle are distinguishable
    epoch: u64,
    running: bool,
    ready: bool,
    init: watch::Sender<InitOutcome>,
    shutdown: watch::Sender<bool>,
    metadata: Option<Arc<crate::types::ProbeMetadata>>,
    segment_times: Arc<Vec<f64>>,
    playlist: String,
    segments: HashMap<usize, SegmentState>,
    last_requested: usize,
}

impl Shared {
    fn new() -> Self {
        let (init, _) = watch::channel(InitOutcome::Pending);
        let (shutdown, _) = watch::channel(false);
        Self {
            epoch: 0,
            running: false,
            ready: false,
            init,
            shutdown,
            metadata: None,
            segment_times: Arc::new(Vec::new()),
            playlist: String::new(),
            segments: HashMap::new(),
            last_requested: 0,
        }
    }
}

struct Inner {
    config: Config,
    prober: Arc<dyn MediaProber>,
    transcoder: Arc<dyn Transcoder>,
    events: Arc<dyn ManagerEvents>,
    segment_duration: f64,
    ready_timeout: Duration,
    state: Mutex<Shared>,
}

/// On-demand HLS packaging manager for a single media file
#[derive(Clone)]
pub struct Manager {
    inner: Arc<Inner>,
}

/// Builder for a `Manager`; collaborators default to the ffprobe/ffmpeg
/// implementations configured in `Config`
pub struct ManagerBuilder {
    config: Config,
    prober: Option<Arc<dyn MediaProber>>,
    transcoder: Option<Arc<dyn Transcoder>>,
    events: Option<Arc<dyn ManagerEvents>>,
    ready_timeout: Duration,
}

impl ManagerBuilder {
    /// Replace the metadata probe adapter.
    pub fn prober(mut self, prober: Arc<dyn MediaProber>) -> Self {
        self.prober = Some(prober);
        self
    }

    /// Replace the transcode executor.
    pub fn transcoder(mut self, transcoder: Arc<dyn Transcoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    /// Set the lifecycle observer.
    pub fn events(mut self, events: Arc<dyn ManagerEvents>) -> Self {
        self.events = Some(events);
        self
    }

    /// Override the readiness wait ceiling.
    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn build(self) -> Manager {
        let prober = self
            .prober
            .unwrap_or_else(|| Arc::new(FfprobeProber::new(self.config.ffprobe_binary.clone())));
        let transcoder = self
            .transcoder
            .unwrap_or_else(|| Arc::new(FfmpegTranscoder::new(self.config.ffmpeg_binary.clone())));
        let events = self.events.unwrap_or_else(|| Arc::new(NoopEvents));

        Manager {
            inner: Arc::new(Inner {
                config: self.config,
                prober,
                transcoder,
                events,
                segment_duration: playlist::SEGMENT_DURATION,
                ready_timeout: self.ready_timeout,
                state: Mutex::new(Shared::new()),
            }),
        }
    }
}

/// Decision taken under the lock for one segment request
enum Admission {
    Serve(PathBuf),
    Wait(watch::Receiver<bool>),
    Produce,
}

impl Manager {
    /// Create a manager with the default ffprobe/ffmpeg collaborators.
    pub fn new(config: Config) -> Manager {
        Manager::builder(config).build()
    }

    pub fn builder(config: Config) -> ManagerBuilder {
        ManagerBuilder {
            config,
            prober: None,
            transcoder: None,
            events: None,
            ready_timeout: READY_TIMEOUT,
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Whether initialization has completed for the current lifecycle.
    pub fn is_ready(&self) -> bool {
        self.inner.state.lock().ready
    }

    /// Probe metadata for the current lifecycle; `None` until
    /// initialization completes and after `stop()`.
    pub fn metadata(&self) -> Option<Arc<crate::types::ProbeMetadata>> {
        self.inner.state.lock().metadata.clone()
    }

    /// Launch asynchronous initialization: probe (through the cache),
    /// plan segments, generate the playlist, build the state table.
    ///
    /// Returns immediately; requests block on the readiness gate until
    /// the sequence finishes. Fails if the manager is already running.
    pub fn start(&self) -> Result<()> {
        let (epoch, shutdown_rx) = {
            let mut state = self.inner.state.lock();
            if state.running {
                return Err(VodError::AlreadyRunning);
            }
            state.epoch += 1;
            state.running = true;
            state.ready = false;

            let (init_tx, _) = watch::channel(InitOutcome::Pending);
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            state.init = init_tx;
            state.shutdown = shutdown_tx;

            tracing::info!(
                media = %self.inner.config.media_path.display(),
                epoch = state.epoch,
                "starting manager"
            );
            (state.epoch, shutdown_rx)
        };

        let manager = self.clone();
        tokio::spawn(async move { manager.run_init(epoch, shutdown_rx).await });
        Ok(())
    }

    async fn run_init(&self, epoch: u64, mut shutdown: watch::Receiver<bool>) {
        let result = tokio::select! {
            result = self.initialize(epoch) => result,
            _ = shutdown.wait_for(|stopping| *stopping) => {
                tracing::debug!("initialization interrupted by shutdown");
                return;
            }
        };

        match result {
            Ok(()) => {
                {
                    let mut state = self.inner.state.lock();
                    if state.epoch != epoch || !state.running {
                        return;
                    }
                    state.ready = true;
                    state.init.send_replace(InitOutcome::Ready);
                }
                tracing::info!(
                    media = %self.inner.config.media_path.display(),
                    "manager ready"
                );
                self.inner.events.on_start();
            }
            Err(err) => {
                tracing::error!(
                    media = %self.inner.config.media_path.display(),
                    error = %err,
                    "initialization failed"
                );
                {
                    let state = self.inner.state.lock();
                    if state.epoch != epoch {
                        return;
                    }
                    state.init.send_replace(InitOutcome::Failed);
                }
                self.inner.events.on_stop(Some(&err));
            }
        }
    }

    async fn initialize(&self, epoch: u64) -> Result<()> {
        let metadata = self.load_metadata().await?;

        let video = metadata
            .video
            .as_ref()
            .ok_or_else(|| VodError::Probe("media has no video stream".to_string()))?;
        let keyframes = video
            .keyframe_times
            .as_ref()
            .ok_or_else(|| VodError::Probe("media has no keyframe timestamps".to_string()))?;

        let segment_times = playlist::plan_segments(keyframes)?;
        let playlist_text = playlist::generate_playlist(
            &segment_times,
            self.inner.segment_duration,
            &self.inner.config.segment_prefix,
        );

        let mut state = self.inner.state.lock();
        if state.epoch != epoch {
            return Ok(());
        }
        state.segments = (1..segment_times.len())
            .map(|i| (i, SegmentState::NotRequested))
            .collect();
        state.segment_times = Arc::new(segment_times);
        state.playlist = playlist_text;
        state.metadata = Some(Arc::new(metadata));
        state.last_requested = 0;
        Ok(())
    }

    /// Load metadata from the cache, or probe and write it back.
    async fn load_metadata(&self) -> Result<crate::types::ProbeMetadata> {
        let config = &self.inner.config;
        if !config.cache {
            return self.fetch_metadata().await;
        }

        if let Some(cached) = cache::load(config).await {
            tracing::debug!(media = %config.media_path.display(), "metadata cache hit");
            return Ok(cached);
        }

        let metadata = self.fetch_metadata().await?;
        if let Err(err) = cache::store(config, &metadata).await {
            // advisory: a failed write never fails initialization
            tracing::warn!(
                media = %config.media_path.display(),
                error = %err,
                "failed to write metadata cache"
            );
        }
        Ok(metadata)
    }

    /// Probe the media: fast container probe, then the slow packet scan
    /// when the container probe did not yield keyframe timestamps.
    async fn fetch_metadata(&self) -> Result<crate::types::ProbeMetadata> {
        let path = &self.inner.config.media_path;
        tracing::info!(media = %path.display(), "probing media");

        let mut metadata = self.inner.prober.probe_media(path).await?;
        if let Some(video) = metadata.video.as_mut() {
            if video.keyframe_times.is_none() {
                tracing::info!(
                    media = %path.display(),
                    "container probe has no keyframes, running packet scan"
                );
                video.keyframe_times = Some(self.inner.prober.probe_keyframes(path).await?);
            }
        }
        Ok(metadata)
    }

    /// Stop the manager: cancel in-flight probe and transcode work and
    /// best-effort delete produced artifacts. Idempotent.
    pub fn stop(&self) {
        {
            let mut state = self.inner.state.lock();
            if !state.running {
                return;
            }
            state.running = false;
            state.ready = false;
            state.shutdown.send_replace(true);

            // no component retains references across a stop/start boundary
            state.metadata = None;
            state.segment_times = Arc::new(Vec::new());
            state.playlist.clear();
            state.segments = HashMap::new();
            state.last_requested = 0;
        }

        self.remove_artifacts();
        self.inner.events.on_stop(None);
        tracing::info!(
            media = %self.inner.config.media_path.display(),
            "manager stopped"
        );
    }

    /// Demote produced segments outside the sliding window around the
    /// most recently requested index back to `NotRequested` and delete
    /// their files. Never touches a segment that is transcoding.
    pub fn cleanup(&self) {
        let config = &self.inner.config;
        let mut stale: Vec<(usize, PathBuf)> = Vec::new();
        {
            let mut state = self.inner.state.lock();
            if !state.ready {
                return;
            }
            let low = state.last_requested.saturating_sub(config.segment_buffer_min);
            let high = state.last_requested + config.segment_buffer_max;

            for (&index, segment) in state.segments.iter_mut() {
                if (low..=high).contains(&index) {
                    continue;
                }
                if matches!(segment, SegmentState::Available) {
                    *segment = SegmentState::NotRequested;
                    stale.push((index, self.segment_path(index)));
                }
            }
        }

        for (index, path) in stale {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!(index, "removed segment outside window"),
                Err(err) => tracing::debug!(index, error = %err, "segment removal failed"),
            }
        }
    }

    /// Best-effort removal of every segment file this instance produced.
    fn remove_artifacts(&self) {
        let config = &self.inner.config;
        let marker = format!("{}-", config.segment_prefix);
        let entries = match std::fs::read_dir(&config.transcode_dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&marker) && name.ends_with(".ts") {
                let _ = std::fs::remove_file(entry.path());
            }
        }
    }

    /// Block until initialization finishes, the manager shuts down, or
    /// the readiness ceiling elapses. The lock is never held while
    /// suspended.
    async fn wait_until_ready(&self) -> Result<()> {
        let (mut init_rx, mut shutdown_rx) = {
            let state = self.inner.state.lock();
            if state.ready {
                return Ok(());
            }
            if !state.running {
                return Err(VodError::Unavailable("manager not running".to_string()));
            }
            (state.init.subscribe(), state.shutdown.subscribe())
        };

        let outcome = tokio::select! {
            result = init_rx.wait_for(|o| *o != InitOutcome::Pending) => match result {
                Ok(outcome) => *outcome,
                Err(_) => return Err(VodError::Unavailable("manager stopped".to_string())),
            },
            _ = shutdown_rx.wait_for(|stopping| *stopping) => {
                return Err(VodError::Unavailable("shutting down".to_string()));
            }
            _ = tokio::time::sleep(self.inner.ready_timeout) => {
                return Err(VodError::NotReadyTimeout);
            }
        };

        match outcome {
            InitOutcome::Ready => Ok(()),
            _ => Err(VodError::Unavailable(
                "initialization failed".to_string(),
            )),
        }
    }

    /// Serve the VOD playlist, waiting on the readiness gate if needed.
    pub async fn serve_playlist(&self) -> Result<String> {
        self.wait_until_ready().await?;
        let state = self.inner.state.lock();
        // a stop() may have cleared the state since the readiness wait
        if !state.ready {
            return Err(VodError::Unavailable("manager stopped".to_string()));
        }
        Ok(state.playlist.clone())
    }

    /// Serve one segment, producing it on demand.
    ///
    /// Concurrent requests for the same index share a single executor
    /// invocation and observe the same terminal state.
    pub async fn serve_segment(&self, index: usize) -> Result<Bytes> {
        self.wait_until_ready().await?;

        let (admission, job) = {
            let mut state = self.inner.state.lock();
            // a stop() may have cleared the state since the readiness wait
            if !state.ready {
                return Err(VodError::Unavailable("manager stopped".to_string()));
            }
            let admission = match state.segments.get(&index) {
                None => {
                    tracing::warn!(index, "segment index not found");
                    return Err(VodError::SegmentNotFound(index));
                }
                Some(SegmentState::Available) => Admission::Serve(self.segment_path(index)),
                Some(SegmentState::Transcoding { done_rx, .. }) => {
                    Admission::Wait(done_rx.clone())
                }
                Some(SegmentState::NotRequested) => {
                    let path = self.segment_path(index);
                    // reconcile with disk: a previous run may have left
                    // the finished file behind
                    if path.exists() {
                        state.segments.insert(index, SegmentState::Available);
                        Admission::Serve(path)
                    } else {
                        Admission::Produce
                    }
                }
                Some(SegmentState::Failed) => Admission::Produce,
            };
            state.last_requested = index;

            match admission {
                Admission::Produce => {
                    let job = self.plan_job(&state, index);
                    let done_rx = self.mark_transcoding(&mut state, &job, index);
                    (Admission::Wait(done_rx), Some(job))
                }
                other => (other, None),
            }
        };

        if let Some(job) = job {
            self.spawn_transcode(job);
        }

        match admission {
            Admission::Serve(path) => self.read_segment(index, &path).await,
            Admission::Wait(done_rx) => self.await_segment(index, done_rx).await,
            Admission::Produce => unreachable!("produce resolved above"),
        }
    }

    /// Compute the run of segments one executor invocation will produce:
    /// from `index`, extend over produceable successors up to the buffer
    /// ceiling.
    fn plan_job(&self, state: &Shared, index: usize) -> TranscodeJob {
        let config = &self.inner.config;
        let total = state.segment_times.len() - 1;
        let ceiling = index + config.segment_buffer_max.max(1) - 1;

        let mut last = index;
        while last < total && last < ceiling {
            match state.segments.get(&(last + 1)) {
                Some(SegmentState::NotRequested) | Some(SegmentState::Failed) => last += 1,
                _ => break,
            }
        }

        TranscodeJob {
            media_path: config.media_path.clone(),
            transcode_dir: config.transcode_dir.clone(),
            segment_prefix: config.segment_prefix.clone(),
            start_index: index,
            segment_times: state.segment_times[index - 1..=last].to_vec(),
            video_profile: config.video_profile.clone(),
            audio_profile: config.audio_profile.clone(),
        }
    }

    /// Mark the job's whole range as transcoding and return the
    /// completion receiver for the requested index.
    fn mark_transcoding(
        &self,
        state: &mut Shared,
        job: &TranscodeJob,
        index: usize,
    ) -> watch::Receiver<bool> {
        let mut requested_rx = None;
        for i in job.start_index..=job.last_index() {
            let (done_tx, done_rx) = watch::channel(false);
            if i == index {
                requested_rx = Some(done_rx.clone());
            }
            state.segments.insert(i, SegmentState::Transcoding { done_tx, done_rx });
        }
        // the requested index is always inside the job range
        requested_rx.unwrap_or_else(|| watch::channel(false).1)
    }

    fn spawn_transcode(&self, job: TranscodeJob) {
        let manager = self.clone();
        let (epoch, cancel) = {
            let state = self.inner.state.lock();
            (state.epoch, state.shutdown.subscribe())
        };

        tokio::spawn(async move {
            let first = job.start_index;
            let last = job.last_index();
            tracing::info!(first, last, "producing segments on demand");

            let (produced_tx, mut produced_rx) = mpsc::channel(8);
            let (log_tx, mut log_rx) = mpsc::channel(32);
            let sink = TranscodeSink {
                produced: produced_tx,
                log: log_tx,
                cancel,
            };

            let events = manager.inner.events.clone();
            let log_task = tokio::spawn(async move {
                while let Some(line) = log_rx.recv().await {
                    tracing::debug!(target: "hlsvod::ffmpeg", "{}", line);
                    events.on_cmd_log(&line);
                }
            });

            let transcoder = manager.inner.transcoder.clone();
            let exec_job = job.clone();
            let exec = tokio::spawn(async move { transcoder.transcode(exec_job, sink).await });

            while let Some(produced) = produced_rx.recv().await {
                tracing::debug!(
                    index = produced.index,
                    path = %produced.path.display(),
                    "segment produced"
                );
                manager.mark_available(epoch, produced.index);
            }

            let result = match exec.await {
                Ok(result) => result,
                Err(err) => Err(VodError::Transcode {
                    index: first,
                    message: format!("executor task failed: {}", err),
                }),
            };
            let _ = log_task.await;
            manager.finish_job(epoch, first, last, result);
        });
    }

    fn mark_available(&self, epoch: u64, index: usize) {
        let mut state = self.inner.state.lock();
        if state.epoch != epoch {
            // lifecycle changed under this job, its results are stale
            return;
        }
        if let Some(segment) = state.segments.get_mut(&index) {
            if let SegmentState::Transcoding { done_tx, .. } = segment {
                done_tx.send_replace(true);
            }
            *segment = SegmentState::Available;
        }
    }

    /// Fail every index of the job's range that never materialized. The
    /// terminal state is set before waiters are woken, so all of them
    /// observe the same one.
    fn finish_job(&self, epoch: u64, first: usize, last: usize, result: Result<()>) {
        if let Err(err) = &result {
            tracing::warn!(first, last, error = %err, "transcode job failed");
        }
        let mut state = self.inner.state.lock();
        if state.epoch != epoch {
            return;
        }
        for index in first..=last {
            if let Some(segment) = state.segments.get_mut(&index) {
                if let SegmentState::Transcoding { done_tx, .. } = segment {
                    done_tx.send_replace(true);
                    *segment = SegmentState::Failed;
                }
            }
        }
    }

    /// Wait for an in-flight segment's completion and serve its terminal
    /// state. Loops in case the segment is already being retried by the
    /// time this waiter wakes up.
    async fn await_segment(
        &self,
        index: usize,
        mut done_rx: watch::Receiver<bool>,
    ) -> Result<Bytes> {
        let mut shutdown_rx = self.inner.state.lock().shutdown.subscribe();
        loop {
            tokio::select! {
                result = done_rx.wait_for(|done| *done) => {
                    if result.is_err() {
                        return Err(VodError::Unavailable("manager stopped".to_string()));
                    }
                }
                _ = shutdown_rx.wait_for(|stopping| *stopping) => {
                    return Err(VodError::Unavailable("shutting down".to_string()));
                }
            }

            let path = {
                let state = self.inner.state.lock();
                match state.segments.get(&index) {
                    Some(SegmentState::Available) => self.segment_path(index),
                    Some(SegmentState::Failed) => {
                        return Err(VodError::Transcode {
                            index,
                            message: "segment production failed".to_string(),
                        });
                    }
                    Some(SegmentState::Transcoding { done_rx: next_rx, .. }) => {
                        done_rx = next_rx.clone();
                        continue;
                    }
                    _ => {
                        return Err(VodError::Unavailable("manager stopped".to_string()));
                    }
                }
            };
            return self.read_segment(index, &path).await;
        }
    }

    async fn read_segment(&self, index: usize, path: &std::path::Path) -> Result<Bytes> {
        match tokio::fs::read(path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(index, path = %path.display(), "segment file missing");
                Err(VodError::SegmentNotFound(index))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn segment_path(&self, index: usize) -> PathBuf {
        let config = &self.inner.config;
        config
            .transcode_dir
            .join(playlist::segment_name(&config.segment_prefix, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcode::SegmentProduced;
    use crate::types::{ProbeMetadata, VideoMetadata};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct MockProber {
        keyframes: Vec<f64>,
        delay: Duration,
        fail: bool,
        probes: AtomicUsize,
    }

    impl MockProber {
        fn new(keyframes: Vec<f64>) -> Self {
            Self {
                keyframes,
                delay: Duration::ZERO,
                fail: false,
                probes: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MediaProber for MockProber {
        async fn probe_media(&self, _path: &Path) -> Result<ProbeMetadata> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(VodError::Probe("mock probe failure".to_string()));
            }
            let duration = self.keyframes.last().copied().unwrap_or(0.0);
            Ok(ProbeMetadata {
                duration,
                video: Some(VideoMetadata {
                    width: 1280,
                    height: 720,
                    duration,
                    keyframe_times: Some(self.keyframes.clone()),
                }),
                audio: None,
            })
        }

        async fn probe_keyframes(&self, _path: &Path) -> Result<Vec<f64>> {
            Ok(self.keyframes.clone())
        }
    }

    #[derive(Default)]
    struct MockTranscoder {
        invocations: Mutex<Vec<usize>>,
        fail_first: AtomicBool,
        delay: Duration,
    }

    #[async_trait]
    impl Transcoder for MockTranscoder {
        async fn transcode(&self, job: TranscodeJob, sink: TranscodeSink) -> Result<()> {
            self.invocations.lock().push(job.start_index);
            let _ = sink.log.send("mock transcode started".to_string()).await;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail_first.swap(false, Ordering::SeqCst) {
                return Err(VodError::Transcode {
                    index: job.start_index,
                    message: "mock transcode failure".to_string(),
                });
            }
            tokio::fs::create_dir_all(&job.transcode_dir).await?;
            for index in job.start_index..=job.last_index() {
                let path = job.segment_path(index);
                tokio::fs::write(&path, format!("segment-{}", index)).await?;
                let _ = sink.produced.send(SegmentProduced { index, path }).await;
            }
            Ok(())
        }
    }

    fn test_config(dir: &Path) -> Config {
        let media = dir.join("movie.mp4");
        std::fs::write(&media, b"media").unwrap();
        Config::new(media, dir.join("transcode"), "seg")
    }

    fn test_manager(dir: &Path, keyframes: Vec<f64>) -> (Manager, Arc<MockTranscoder>) {
        let transcoder = Arc::new(MockTranscoder::default());
        let manager = Manager::builder(test_config(dir))
            .prober(Arc::new(MockProber::new(keyframes)))
            .transcoder(transcoder.clone())
            .build();
        (manager, transcoder)
    }

    #[tokio::test]
    async fn test_playlist_served_after_start() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = test_manager(dir.path(), vec![0.0, 4.8, 9.6, 14.4]);

        manager.start().unwrap();
        let playlist = manager.serve_playlist().await.unwrap();

        assert!(playlist.starts_with("#EXTM3U"));
        assert!(playlist.ends_with("#EXT-X-ENDLIST"));
        assert_eq!(playlist.matches("#EXTINF:").count(), 3);
        assert!(playlist.contains("seg-00002.ts"));
        assert!(manager.is_ready());
    }

    #[tokio::test]
    async fn test_metadata_exposed_while_ready() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = test_manager(dir.path(), vec![0.0, 4.8, 9.6, 14.4]);

        assert!(manager.metadata().is_none());
        manager.start().unwrap();
        manager.serve_playlist().await.unwrap();

        let metadata = manager.metadata().unwrap();
        assert!((metadata.duration - 14.4).abs() < 1e-9);
        assert_eq!(
            metadata.video.as_ref().unwrap().keyframe_times,
            Some(vec![0.0, 4.8, 9.6, 14.4])
        );

        manager.stop();
        assert!(manager.metadata().is_none());
    }

    #[tokio::test]
    async fn test_playlist_never_served_empty_across_stop() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = test_manager(dir.path(), vec![0.0, 4.8, 9.6]);

        manager.start().unwrap();
        manager.serve_playlist().await.unwrap();

        // hammer the playlist while stopping; a request that slips past
        // the readiness gate must still never observe the cleared state
        let mut readers = Vec::new();
        for _ in 0..16 {
            let manager = manager.clone();
            readers.push(tokio::spawn(async move { manager.serve_playlist().await }));
        }
        tokio::task::yield_now().await;
        manager.stop();

        for reader in readers {
            match reader.await.unwrap() {
                Ok(playlist) => {
                    assert!(playlist.starts_with("#EXTM3U"));
                    assert!(playlist.ends_with("#EXT-X-ENDLIST"));
                }
                Err(err) => assert!(matches!(err, VodError::Unavailable(_))),
            }
        }
    }

    #[tokio::test]
    async fn test_double_start_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = test_manager(dir.path(), vec![0.0, 4.8]);

        manager.start().unwrap();
        assert!(matches!(manager.start(), Err(VodError::AlreadyRunning)));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_rejects_requests() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = test_manager(dir.path(), vec![0.0, 4.8]);

        manager.start().unwrap();
        manager.serve_playlist().await.unwrap();
        manager.stop();
        manager.stop();

        assert!(!manager.is_ready());
        assert!(matches!(
            manager.serve_playlist().await,
            Err(VodError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = test_manager(dir.path(), vec![0.0, 4.8, 9.6]);

        manager.start().unwrap();
        manager.serve_playlist().await.unwrap();
        manager.stop();

        manager.start().unwrap();
        let playlist = manager.serve_playlist().await.unwrap();
        assert_eq!(playlist.matches("#EXTINF:").count(), 2);
    }

    #[tokio::test]
    async fn test_readiness_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let mut prober = MockProber::new(vec![0.0, 4.8]);
        prober.delay = Duration::from_secs(5);

        let manager = Manager::builder(test_config(dir.path()))
            .prober(Arc::new(prober))
            .transcoder(Arc::new(MockTranscoder::default()))
            .ready_timeout(Duration::from_millis(50))
            .build();

        manager.start().unwrap();
        assert!(matches!(
            manager.serve_playlist().await,
            Err(VodError::NotReadyTimeout)
        ));
    }

    #[tokio::test]
    async fn test_stop_before_ready_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut prober = MockProber::new(vec![0.0, 4.8]);
        prober.delay = Duration::from_secs(5);

        let manager = Manager::builder(test_config(dir.path()))
            .prober(Arc::new(prober))
            .transcoder(Arc::new(MockTranscoder::default()))
            .build();

        manager.start().unwrap();
        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.serve_playlist().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.stop();

        assert!(matches!(
            waiter.await.unwrap(),
            Err(VodError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_initialization_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut prober = MockProber::new(vec![0.0, 4.8]);
        prober.fail = true;

        let manager = Manager::builder(test_config(dir.path()))
            .prober(Arc::new(prober))
            .transcoder(Arc::new(MockTranscoder::default()))
            .build();

        manager.start().unwrap();
        assert!(matches!(
            manager.serve_playlist().await,
            Err(VodError::Unavailable(_))
        ));
        assert!(!manager.is_ready());
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = Arc::new(MockTranscoder {
            delay: Duration::from_millis(100),
            ..Default::default()
        });
        let manager = Manager::builder(test_config(dir.path()))
            .prober(Arc::new(MockProber::new(vec![0.0, 4.8, 9.6, 14.4])))
            .transcoder(transcoder.clone())
            .build();

        manager.start().unwrap();
        manager.serve_playlist().await.unwrap();

        let mut waiters = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            waiters.push(tokio::spawn(async move { manager.serve_segment(2).await }));
        }

        for waiter in waiters {
            let bytes = waiter.await.unwrap().unwrap();
            assert_eq!(&bytes[..], b"segment-2");
        }
        assert_eq!(*transcoder.invocations.lock(), vec![2]);
    }

    #[tokio::test]
    async fn test_unknown_segment_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, transcoder) = test_manager(dir.path(), vec![0.0, 4.8, 9.6, 14.4]);

        manager.start().unwrap();
        manager.serve_playlist().await.unwrap();

        assert!(matches!(
            manager.serve_segment(99).await,
            Err(VodError::SegmentNotFound(99))
        ));
        assert!(matches!(
            manager.serve_segment(0).await,
            Err(VodError::SegmentNotFound(0))
        ));
        assert!(transcoder.invocations.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_segment_is_retried_on_next_request() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, transcoder) = test_manager(dir.path(), vec![0.0, 4.8, 9.6]);
        transcoder.fail_first.store(true, Ordering::SeqCst);

        manager.start().unwrap();
        manager.serve_playlist().await.unwrap();

        assert!(matches!(
            manager.serve_segment(1).await,
            Err(VodError::Transcode { index: 1, .. })
        ));

        let bytes = manager.serve_segment(1).await.unwrap();
        assert_eq!(&bytes[..], b"segment-1");
        assert_eq!(*transcoder.invocations.lock(), vec![1, 1]);
    }

    #[tokio::test]
    async fn test_disk_reconciliation_skips_executor() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, transcoder) = test_manager(dir.path(), vec![0.0, 4.8, 9.6, 14.4]);

        let transcode_dir = dir.path().join("transcode");
        std::fs::create_dir_all(&transcode_dir).unwrap();
        std::fs::write(transcode_dir.join("seg-00002.ts"), b"leftover").unwrap();

        manager.start().unwrap();
        manager.serve_playlist().await.unwrap();

        let bytes = manager.serve_segment(2).await.unwrap();
        assert_eq!(&bytes[..], b"leftover");
        assert!(transcoder.invocations.lock().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_cache_falls_back_to_probe() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.cache = true;

        let cache_path = cache::cache_file_path(&config);
        std::fs::write(&cache_path, b"{ definitely not metadata").unwrap();

        let manager = Manager::builder(config.clone())
            .prober(Arc::new(MockProber::new(vec![0.0, 4.8, 9.6])))
            .transcoder(Arc::new(MockTranscoder::default()))
            .build();

        manager.start().unwrap();
        manager.serve_playlist().await.unwrap();

        // the corrupt entry was replaced by the fresh probe result
        let replaced: ProbeMetadata =
            serde_json::from_slice(&std::fs::read(&cache_path).unwrap()).unwrap();
        assert_eq!(
            replaced.video.unwrap().keyframe_times,
            Some(vec![0.0, 4.8, 9.6])
        );
    }

    #[tokio::test]
    async fn test_second_start_uses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.cache = true;

        let prober = Arc::new(MockProber::new(vec![0.0, 4.8, 9.6]));
        let manager = Manager::builder(config)
            .prober(prober.clone())
            .transcoder(Arc::new(MockTranscoder::default()))
            .build();

        manager.start().unwrap();
        manager.serve_playlist().await.unwrap();
        manager.stop();

        manager.start().unwrap();
        manager.serve_playlist().await.unwrap();
        assert_eq!(prober.probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cleanup_removes_segments_outside_window() {
        let dir = tempfile::tempdir().unwrap();
        let keyframes: Vec<f64> = (0..12).map(|i| i as f64 * 4.8).collect();
        let (manager, _) = test_manager(dir.path(), keyframes);

        manager.start().unwrap();
        manager.serve_playlist().await.unwrap();

        manager.serve_segment(1).await.unwrap();
        manager.serve_segment(10).await.unwrap();
        // let trailing produced events from both jobs settle
        tokio::time::sleep(Duration::from_millis(100)).await;

        manager.cleanup();

        let transcode_dir = dir.path().join("transcode");
        // window is [10 - buffer_min, 10 + buffer_max]
        assert!(!transcode_dir.join("seg-00001.ts").exists());
        assert!(transcode_dir.join("seg-00010.ts").exists());
    }

    #[tokio::test]
    async fn test_stop_interrupts_segment_waiters() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = Arc::new(MockTranscoder {
            delay: Duration::from_secs(10),
            ..Default::default()
        });
        let manager = Manager::builder(test_config(dir.path()))
            .prober(Arc::new(MockProber::new(vec![0.0, 4.8])))
            .transcoder(transcoder)
            .build();

        manager.start().unwrap();
        manager.serve_playlist().await.unwrap();

        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.serve_segment(1).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.stop();

        assert!(matches!(
            waiter.await.unwrap(),
            Err(VodError::Unavailable(_))
        ));
    }

    struct RecordingEvents {
        started: AtomicBool,
        stopped: AtomicBool,
        logs: Mutex<Vec<String>>,
    }

    impl ManagerEvents for RecordingEvents {
        fn on_start(&self) {
            self.started.store(true, Ordering::SeqCst);
        }
        fn on_cmd_log(&self, line: &str) {
            self.logs.lock().push(line.to_string());
        }
        fn on_stop(&self, _err: Option<&VodError>) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_lifecycle_events_fire() {
        let dir = tempfile::tempdir().unwrap();
        let events = Arc::new(RecordingEvents {
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            logs: Mutex::new(Vec::new()),
        });
        let manager = Manager::builder(test_config(dir.path()))
            .prober(Arc::new(MockProber::new(vec![0.0, 4.8])))
            .transcoder(Arc::new(MockTranscoder::default()))
            .events(events.clone())
            .build();

        manager.start().unwrap();
        manager.serve_playlist().await.unwrap();
        assert!(events.started.load(Ordering::SeqCst));

        manager.serve_segment(1).await.unwrap();
        assert!(events
            .logs
            .lock()
            .iter()
            .any(|l| l.contains("mock transcode started")));

        manager.stop();
        assert!(events.stopped.load(Ordering::SeqCst));
    }
}

