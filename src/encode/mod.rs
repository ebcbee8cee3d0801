//! Encoding sinks.
//!
//! Frames are streamed to an external `ffmpeg` in playback order and published into the artifact
//! directory once the encoder has finished.

/// Published artifacts and their expiry.
pub mod artifact;
/// `ffmpeg` process wrapper.
pub mod ffmpeg;
/// Per-job encoder lifecycle.
pub mod pipeline;
