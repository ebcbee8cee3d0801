//! Job orchestration: render in a sandbox, decode, encode, publish.
//!
//! Pipeline per job:
//! 1. wait for an admission permit (`Queued`)
//! 2. acquire a sandbox, inject the payload, trigger and wait for its frames
//! 3. tear the sandbox down (always, before anything else happens)
//! 4. decode the first frame to learn the output geometry
//! 5. stream every frame, in order, into the encoder and publish the artifact

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::encode::artifact::Artifact;
use crate::encode::pipeline::{EncoderHandle, EncodingPipeline};
use crate::foundation::config::PipelineConfig;
use crate::foundation::core::{JobId, RenderJob, ReplayPayload};
use crate::foundation::error::{ReelError, ReelResult};
use crate::frame::decode::decode_frame;
use crate::frame::raster::{FrameRGBA, rasterize};
use crate::job::state::{JobState, JobTracker};
use crate::progress::log::{ProgressLog, ProgressSink};
use crate::sandbox::session::{FrameSequence, RenderSession, SandboxLauncher};

/// Entry point for render jobs. Cheap to clone; clones share the admission limit.
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<PipelineConfig>,
    launcher: Arc<dyn SandboxLauncher>,
    encoding: EncodingPipeline,
    admission: Arc<Semaphore>,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig, launcher: Arc<dyn SandboxLauncher>) -> ReelResult<Self> {
        config.validate()?;
        let encoding = EncodingPipeline::from_config(&config)?;
        let admission = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        Ok(Self {
            config: Arc::new(config),
            launcher,
            encoding,
            admission,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one job to completion.
    pub async fn run(
        &self,
        payload: ReplayPayload,
        sink: Arc<dyn ProgressSink>,
    ) -> ReelResult<Artifact> {
        let job = RenderJob::new(payload);
        let progress = ProgressLog::new(job.id, sink);
        self.run_job(job, progress, CancellationToken::new()).await
    }

    /// Run one job, giving up with [`ReelError::Cancelled`] when `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        payload: ReplayPayload,
        sink: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> ReelResult<Artifact> {
        let job = RenderJob::new(payload);
        let progress = ProgressLog::new(job.id, sink);
        self.run_job(job, progress, cancel).await
    }

    /// Spawn a job onto the runtime and return a handle to it.
    pub fn submit(&self, payload: ReplayPayload, sink: Arc<dyn ProgressSink>) -> JobHandle {
        let job = RenderJob::new(payload);
        let id = job.id;
        let progress = ProgressLog::new(id, sink);
        let cancel = CancellationToken::new();
        let this = self.clone();
        let task = {
            let progress = progress.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { this.run_job(job, progress, cancel).await })
        };
        JobHandle {
            id,
            progress,
            cancel,
            task,
        }
    }

    #[tracing::instrument(skip_all, fields(job = %job.id, payload_len = job.payload.len()))]
    async fn run_job(
        &self,
        job: RenderJob,
        progress: ProgressLog,
        cancel: CancellationToken,
    ) -> ReelResult<Artifact> {
        let mut tracker = JobTracker::new(progress.clone(), "Queued: waiting for a render slot");
        match self.drive(&job, &mut tracker, &cancel).await {
            Ok(artifact) => {
                let _ = self.encoding.schedule_expiry(&artifact, progress);
                Ok(artifact)
            }
            Err(e) => {
                tracker.fail(&e);
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        job: &RenderJob,
        tracker: &mut JobTracker,
        cancel: &CancellationToken,
    ) -> ReelResult<Artifact> {
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ReelError::Cancelled),
            permit = self.admission.clone().acquire_owned() => permit
                .map_err(|_| ReelError::environment_unavailable("admission closed"))?,
        };

        let frames = self.render(job, tracker, cancel).await?;
        self.encode(job.id, frames, tracker, cancel).await
    }

    /// Produce the job's frames. The session is torn down before this returns, on every path.
    async fn render(
        &self,
        job: &RenderJob,
        tracker: &mut JobTracker,
        cancel: &CancellationToken,
    ) -> ReelResult<FrameSequence> {
        tracker.advance(JobState::SessionStarting, "Starting render sandbox")?;
        let mut session = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ReelError::Cancelled),
            session = self.launcher.start(job) => session?,
        };

        let output = self
            .drive_session(session.as_mut(), job, tracker, cancel)
            .await;
        if let Err(e) = session.teardown().await {
            tracing::warn!(job = %job.id, "sandbox teardown failed: {e}");
        }
        output
    }

    async fn drive_session(
        &self,
        session: &mut dyn RenderSession,
        job: &RenderJob,
        tracker: &mut JobTracker,
        cancel: &CancellationToken,
    ) -> ReelResult<FrameSequence> {
        tracker.advance(JobState::Injecting, "Loading replay")?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ReelError::Cancelled),
            r = session.inject(&job.payload) => r?,
        }

        let timeout = self.config.render_timeout();
        tracker.advance(
            JobState::Rendering,
            format!("Rendering replay (up to {}s)", timeout.as_secs()),
        )?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ReelError::Cancelled),
            r = session.trigger() => r?,
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ReelError::Cancelled),
            frames = session.await_output(timeout) => frames,
        }
    }

    async fn encode(
        &self,
        job_id: JobId,
        frames: FrameSequence,
        tracker: &mut JobTracker,
        cancel: &CancellationToken,
    ) -> ReelResult<Artifact> {
        let total = frames.len();
        tracker.advance(JobState::Decoding, format!("Decoding {total} frames"))?;
        let mut frames = frames.into_iter().enumerate();
        let (_, head) = frames
            .next()
            .ok_or_else(|| ReelError::sandbox_fault("renderer produced no frames"))?;
        let first = decode_raster(0, &head)?;

        let fps = self.encoding.fps();
        tracker.advance(
            JobState::Encoding,
            format!(
                "Encoding {total} frames at {fps} fps ({}x{}, {:.1}s)",
                first.width,
                first.height,
                fps.frames_to_secs(total as u64)
            ),
        )?;
        let mut handle = self.encoding.open(job_id, first.width, first.height)?;
        let streamed = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ReelError::Cancelled),
            r = stream_frames(&mut handle, first, frames) => r,
        };
        if let Err(e) = streamed {
            handle.abort().await;
            return Err(e);
        }

        let artifact = handle.close_or_cancel(cancel).await?;
        tracker.advance(
            JobState::Done,
            format!(
                "Done: {} (available until {})",
                artifact.url,
                artifact.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
        )?;
        Ok(artifact)
    }
}

async fn stream_frames(
    handle: &mut EncoderHandle,
    first: FrameRGBA,
    rest: impl Iterator<Item = (usize, String)>,
) -> ReelResult<()> {
    handle.write_frame(&first).await?;
    drop(first);
    for (idx, encoded) in rest {
        let frame = decode_raster(idx, &encoded)?;
        handle
            .write_frame(&frame)
            .await
            .map_err(|e| at_frame(idx, e))?;
    }
    Ok(())
}

fn decode_raster(idx: usize, encoded: &str) -> ReelResult<FrameRGBA> {
    decode_frame(encoded)
        .and_then(|bytes| rasterize(&bytes))
        .map_err(|e| at_frame(idx, e))
}

fn at_frame(idx: usize, err: ReelError) -> ReelError {
    match err {
        ReelError::MalformedFrame(msg) => ReelError::malformed_frame(format!("frame {idx}: {msg}")),
        other => other,
    }
}

/// A job running on the runtime.
pub struct JobHandle {
    id: JobId,
    progress: ProgressLog,
    cancel: CancellationToken,
    task: JoinHandle<ReelResult<Artifact>>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn progress(&self) -> &ProgressLog {
        &self.progress
    }

    /// Ask the job to stop; it fails with [`ReelError::Cancelled`] after tearing down.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn join(self) -> ReelResult<Artifact> {
        self.task
            .await
            .map_err(|e| ReelError::Other(anyhow::anyhow!("render job task failed: {e}")))?
    }
}
