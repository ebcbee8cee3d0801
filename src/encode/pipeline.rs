use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::encode::artifact::{Artifact, ArtifactStore, schedule_expiry};
use crate::encode::ffmpeg::{EncodeConfig, FfmpegEncoder};
use crate::foundation::config::{PipelineConfig, ToolCommand};
use crate::foundation::core::{Fps, JobId};
use crate::foundation::error::{ReelError, ReelResult};
use crate::frame::raster::FrameRGBA;
use crate::progress::log::ProgressLog;

/// Turns an ordered stream of frames into one published artifact.
#[derive(Clone, Debug)]
pub struct EncodingPipeline {
    store: ArtifactStore,
    encoder: ToolCommand,
    fps: Fps,
    bg_rgba: [u8; 4],
    ttl: Duration,
}

impl EncodingPipeline {
    pub fn new(store: ArtifactStore, encoder: ToolCommand, fps: Fps, ttl: Duration) -> Self {
        Self {
            store,
            encoder,
            fps,
            bg_rgba: [0, 0, 0, 255],
            ttl,
        }
    }

    pub fn from_config(cfg: &PipelineConfig) -> ReelResult<Self> {
        Ok(Self::new(
            ArtifactStore::new(&cfg.artifact_dir, &cfg.base_url),
            cfg.encoder.clone(),
            cfg.output_fps()?,
            cfg.artifact_ttl(),
        )
        .with_background(cfg.background_rgba))
    }

    pub fn with_background(mut self, bg_rgba: [u8; 4]) -> Self {
        self.bg_rgba = bg_rgba;
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn fps(&self) -> Fps {
        self.fps
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Start an encoder for `job_id` at the given frame geometry.
    pub fn open(&self, job_id: JobId, width: u32, height: u32) -> ReelResult<EncoderHandle> {
        let encoder = FfmpegEncoder::spawn(EncodeConfig {
            width,
            height,
            fps: self.fps,
            out_path: self.store.partial_path(job_id),
            encoder: self.encoder.clone(),
            bg_rgba: self.bg_rgba,
        })?;
        tracing::debug!(job = %job_id, width, height, fps = %self.fps, "encoder started");
        Ok(EncoderHandle {
            job_id,
            encoder,
            store: self.store.clone(),
            ttl: self.ttl,
        })
    }

    /// Delete `artifact` once the configured ttl has passed.
    pub fn schedule_expiry(&self, artifact: &Artifact, progress: ProgressLog) -> JoinHandle<()> {
        schedule_expiry(artifact, self.ttl, progress)
    }
}

/// A running encoder for one job. Must end in [`close`](Self::close) or [`abort`](Self::abort).
pub struct EncoderHandle {
    job_id: JobId,
    encoder: FfmpegEncoder,
    store: ArtifactStore,
    ttl: Duration,
}

impl EncoderHandle {
    pub async fn write_frame(&mut self, frame: &FrameRGBA) -> ReelResult<()> {
        self.encoder.encode_frame(frame).await
    }

    pub fn frames_written(&self) -> u64 {
        self.encoder.frames_written()
    }

    /// Finish encoding and publish the artifact. On failure the partial output is removed.
    pub async fn close(self) -> ReelResult<Artifact> {
        self.close_or_cancel(&CancellationToken::new()).await
    }

    /// Like [`close`](Self::close), but kills the encoder and removes the partial output if
    /// `cancel` fires while the encoder is still finalizing.
    pub async fn close_or_cancel(mut self, cancel: &CancellationToken) -> ReelResult<Artifact> {
        let finished = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ReelError::Cancelled),
            r = self.encoder.finish() => r,
        };
        let frames = match finished {
            Ok(frames) => frames,
            Err(e) => {
                self.abort().await;
                return Err(e);
            }
        };
        let artifact = match self.store.publish(self.job_id, self.ttl).await {
            Ok(artifact) => artifact,
            Err(e) => {
                self.store.discard(self.job_id).await;
                return Err(e);
            }
        };
        tracing::info!(job = %self.job_id, frames, path = %artifact.path.display(), "artifact published");
        Ok(artifact)
    }

    /// Kill the encoder and remove its partial output.
    pub async fn abort(self) {
        self.encoder.abort().await;
        self.store.discard(self.job_id).await;
    }
}
