//! Replay rendering and video encoding.
//!
//! A replay payload is handed to an isolated renderer process, which publishes an ordered list of
//! encoded frames. The frames are decoded one at a time and streamed into `ffmpeg`, producing an
//! MP4 that is published under a public URL and deleted again after a fixed lifetime.
//!
//! - Build a [`PipelineConfig`] and an [`Orchestrator`] over a [`SandboxLauncher`]
//!   (normally [`ProcessSandbox`])
//! - Run jobs with [`Orchestrator::run`] or [`Orchestrator::submit`], observing progress through
//!   a [`ProgressSink`]
#![forbid(unsafe_code)]

mod foundation;

/// Encoding sinks and artifact publication.
pub mod encode;
/// Frame decoding.
pub mod frame;
/// Job orchestration and lifecycle.
pub mod job;
/// Per-job progress reporting.
pub mod progress;
/// Isolated render environments.
pub mod sandbox;

pub use crate::foundation::config::{PipelineConfig, ToolCommand};
pub use crate::foundation::core::{Fps, JobId, RenderJob, ReplayPayload};
pub use crate::foundation::error::{ErrorKind, ReelError, ReelResult};

pub use crate::encode::artifact::{Artifact, ArtifactStore};
pub use crate::encode::ffmpeg::{EncodeConfig, FfmpegEncoder};
pub use crate::encode::pipeline::{EncoderHandle, EncodingPipeline};
pub use crate::frame::decode::decode_frame;
pub use crate::frame::raster::{FrameRGBA, rasterize};
pub use crate::job::orchestrator::{JobHandle, Orchestrator};
pub use crate::job::state::{JobState, JobTracker};
pub use crate::progress::log::{NullSink, ProgressLog, ProgressSink, TracingSink, WatchSink};
pub use crate::sandbox::process::{ProcessSandbox, ProcessSession};
pub use crate::sandbox::session::{FrameSequence, RenderSession, SandboxLauncher};
