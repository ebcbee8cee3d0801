use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;

use crate::foundation::config::ToolCommand;
use crate::foundation::core::Fps;
use crate::foundation::error::{ReelError, ReelResult};
use crate::frame::raster::FrameRGBA;

const EXIT_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct EncodeConfig {
    pub width: u32,
    pub height: u32,
    pub fps: Fps,
    pub out_path: PathBuf,
    pub encoder: ToolCommand,
    /// Background color used to flatten alpha (RGBA8, straight alpha).
    pub bg_rgba: [u8; 4],
}

impl EncodeConfig {
    pub fn validate(&self) -> ReelResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ReelError::validation(
                "encode width/height must be non-zero",
            ));
        }
        if self.fps.num == 0 || self.fps.den == 0 {
            return Err(ReelError::validation("encode fps must be non-zero"));
        }
        Ok(())
    }

    fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Streams raw RGBA8 frames into an external `ffmpeg` process producing an MP4.
///
/// The output is always h264/yuv420p with `+faststart`; odd canvas sizes are padded up to even
/// dimensions so yuv420p chroma subsampling is valid.
pub struct FfmpegEncoder {
    cfg: EncodeConfig,
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    scratch: Vec<u8>,
    frames_written: u64,
}

impl FfmpegEncoder {
    pub fn spawn(cfg: EncodeConfig) -> ReelResult<Self> {
        cfg.validate()?;
        ensure_parent_dir(&cfg.out_path)?;

        // The system `ffmpeg` binary is used rather than linking libav, so deployments only need
        // the executable.
        let mut cmd = Command::new(&cfg.encoder.program);
        cmd.args(&cfg.encoder.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-r",
            &format!("{}/{}", cfg.fps.num, cfg.fps.den),
            "-i",
            "pipe:0",
            "-an",
            "-vf",
            "pad=ceil(iw/2)*2:ceil(ih/2)*2",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
            "-f",
            "mp4",
        ])
        .arg(&cfg.out_path);

        let mut child = cmd.spawn().map_err(|e| {
            ReelError::encoder_unavailable(format!(
                "failed to spawn '{}' (is it installed and on PATH?): {e}",
                cfg.encoder.program
            ))
        })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            ReelError::encoder_unavailable("failed to open encoder stdin (unexpected)")
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| {
            ReelError::encoder_unavailable("failed to open encoder stderr (unexpected)")
        })?;
        let stderr_drain = tokio::spawn(async move {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes).await?;
            Ok(stderr_bytes)
        });

        Ok(Self {
            scratch: vec![0u8; cfg.frame_bytes()],
            cfg,
            child,
            stdin: Some(stdin),
            stderr_drain: Some(stderr_drain),
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Write one frame. Suspends while the encoder's pipe is full.
    pub async fn encode_frame(&mut self, frame: &FrameRGBA) -> ReelResult<()> {
        if frame.width != self.cfg.width || frame.height != self.cfg.height {
            return Err(ReelError::malformed_frame(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, self.cfg.width, self.cfg.height
            )));
        }
        if frame.data.len() != self.scratch.len() {
            return Err(ReelError::malformed_frame(
                "frame.data size mismatch with width*height*4",
            ));
        }

        flatten_to_opaque_rgba8(&mut self.scratch, &frame.data, self.cfg.bg_rgba)?;

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ReelError::encoding_failed("encoder is already finalized"));
        };
        if let Err(e) = stdin.write_all(&self.scratch).await {
            drop(self.stdin.take());
            let exit = self.wait_exit().await;
            return Err(ReelError::encoding_failed(format!(
                "encoder stopped accepting frames after {} frames ({e}){exit}",
                self.frames_written
            )));
        }
        self.frames_written += 1;
        Ok(())
    }

    /// Close stdin and wait for the encoder to finalize the output file.
    ///
    /// Dropping the future part-way leaves the encoder running; follow up with
    /// [`abort`](Self::abort).
    pub async fn finish(&mut self) -> ReelResult<u64> {
        if let Some(mut stdin) = self.stdin.take() {
            // A failing shutdown means the encoder already went away; its status tells why.
            let _ = stdin.shutdown().await;
        }

        let status = self.child.wait().await.map_err(|e| {
            ReelError::encoding_failed(format!("failed to wait for encoder to finish: {e}"))
        })?;
        let stderr = self.drain_stderr().await;

        if !status.success() {
            return Err(ReelError::encoding_failed(format!(
                "encoder exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }
        Ok(self.frames_written)
    }

    /// Kill the encoder without finalizing. The partial output is left for the caller to remove.
    pub async fn abort(mut self) {
        drop(self.stdin.take());
        let _ = self.child.start_kill();
        if tokio::time::timeout(EXIT_GRACE, self.child.wait())
            .await
            .is_err()
        {
            tracing::warn!(out = %self.cfg.out_path.display(), "encoder did not exit after kill");
        }
        if let Some(handle) = self.stderr_drain.take() {
            handle.abort();
        }
    }

    async fn wait_exit(&mut self) -> String {
        let status = match tokio::time::timeout(EXIT_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => status,
            _ => {
                let _ = self.child.start_kill();
                return String::new();
            }
        };
        let stderr = self.drain_stderr().await;
        format!(": encoder exited with status {status}: {}", stderr.trim())
    }

    async fn drain_stderr(&mut self) -> String {
        let Some(handle) = self.stderr_drain.take() else {
            return String::new();
        };
        match tokio::time::timeout(EXIT_GRACE, handle).await {
            Ok(Ok(Ok(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
            _ => String::new(),
        }
    }
}

/// Composite straight-alpha RGBA8 over an opaque background.
fn flatten_to_opaque_rgba8(dst: &mut [u8], src: &[u8], bg_rgba: [u8; 4]) -> ReelResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(ReelError::validation(
            "flatten_to_opaque_rgba8 expects equal-length rgba8 buffers",
        ));
    }

    let bg_r = bg_rgba[0] as u16;
    let bg_g = bg_rgba[1] as u16;
    let bg_b = bg_rgba[2] as u16;

    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let a = s[3] as u16;
        if a == 255 {
            d.copy_from_slice(s);
            continue;
        }

        let inv = 255u16 - a;
        let r = mul_div255(s[0] as u16, a) + mul_div255(bg_r, inv);
        let g = mul_div255(s[1] as u16, a) + mul_div255(bg_g, inv);
        let b = mul_div255(s[2] as u16, a) + mul_div255(bg_b, inv);

        d[0] = r.min(255) as u8;
        d[1] = g.min(255) as u8;
        d[2] = b.min(255) as u8;
        d[3] = 255;
    }

    Ok(())
}

fn mul_div255(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> ReelResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
