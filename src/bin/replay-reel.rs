use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use replay_reel::{
    Orchestrator, PipelineConfig, ProcessSandbox, ProgressSink, ReplayPayload, ToolCommand,
};

#[derive(Parser, Debug)]
#[command(name = "replay-reel", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a replay payload into an MP4 (requires the renderer and `ffmpeg`).
    Render(RenderArgs),
    /// Decode one encoded frame (data URI or base64) into an image file.
    DecodeFrame(DecodeFrameArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Replay payload file (passed to the renderer verbatim).
    #[arg(long)]
    payload: PathBuf,

    /// JSON pipeline configuration; flags and environment override it.
    #[arg(long, env = "REPLAY_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "REPLAY_RENDER_TIMEOUT_SECS")]
    render_timeout_secs: Option<u64>,

    #[arg(long, env = "REPLAY_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,

    #[arg(long, env = "REPLAY_ARTIFACT_TTL_SECS")]
    artifact_ttl_secs: Option<u64>,

    #[arg(long, env = "REPLAY_FPS")]
    fps: Option<u32>,

    #[arg(long = "max-jobs", env = "REPLAY_MAX_JOBS")]
    max_concurrent_jobs: Option<usize>,

    #[arg(long, env = "REPLAY_ARTIFACT_DIR")]
    artifact_dir: Option<PathBuf>,

    #[arg(long, env = "REPLAY_BASE_URL")]
    base_url: Option<String>,

    /// Renderer command line, e.g. `node render.js`.
    #[arg(long, env = "REPLAY_RENDERER")]
    renderer: Option<String>,

    /// Encoder command line (ffmpeg arguments are appended).
    #[arg(long, env = "REPLAY_ENCODER")]
    encoder: Option<String>,

    /// Directory for per-job sandbox scratch space (defaults to the system temp dir).
    #[arg(long, env = "REPLAY_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Keep running until the artifact expires and is deleted.
    #[arg(long)]
    wait_expiry: bool,
}

#[derive(Parser, Debug)]
struct DecodeFrameArgs {
    /// File containing one encoded frame.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output image path (bytes are written in their original container format).
    #[arg(long)]
    out: PathBuf,
}

/// Prints each new progress line to stderr.
#[derive(Default)]
struct StderrSink {
    printed: Mutex<usize>,
}

impl ProgressSink for StderrSink {
    fn deliver(&self, rendered: &str) -> anyhow::Result<()> {
        let body: Vec<&str> = rendered.lines().filter(|l| *l != "```").collect();
        let mut printed = self
            .printed
            .lock()
            .map_err(|_| anyhow::anyhow!("progress printer poisoned"))?;
        for line in body.iter().skip(*printed) {
            eprintln!("> {line}");
        }
        *printed = body.len();
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args).await,
        Command::DecodeFrame(args) => cmd_decode_frame(args),
    }
}

fn load_config(args: &RenderArgs) -> anyhow::Result<PipelineConfig> {
    let mut cfg = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(v) = args.render_timeout_secs {
        cfg.render_timeout_secs = v;
    }
    if let Some(v) = args.poll_interval_ms {
        cfg.poll_interval_ms = v;
    }
    if let Some(v) = args.artifact_ttl_secs {
        cfg.artifact_ttl_secs = v;
    }
    if let Some(v) = args.fps {
        cfg.fps = v;
    }
    if let Some(v) = args.max_concurrent_jobs {
        cfg.max_concurrent_jobs = v;
    }
    if let Some(v) = &args.artifact_dir {
        cfg.artifact_dir = v.clone();
    }
    if let Some(v) = &args.base_url {
        cfg.base_url = v.clone();
    }
    if let Some(v) = &args.renderer {
        cfg.renderer = ToolCommand::parse(v)?;
    }
    if let Some(v) = &args.encoder {
        cfg.encoder = ToolCommand::parse(v)?;
    }
    cfg.validate()?;
    Ok(cfg)
}

async fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let cfg = load_config(&args)?;
    let payload = std::fs::read_to_string(&args.payload)
        .with_context(|| format!("read payload '{}'", args.payload.display()))?;

    let mut sandbox = ProcessSandbox::new(cfg.renderer.clone(), cfg.poll_interval());
    if let Some(dir) = &args.scratch_dir {
        sandbox = sandbox.with_scratch_root(dir);
    }
    let ttl = cfg.artifact_ttl();
    let orchestrator = Orchestrator::new(cfg, Arc::new(sandbox))?;

    let artifact = orchestrator
        .run(ReplayPayload::new(payload), Arc::new(StderrSink::default()))
        .await?;
    println!("{}", artifact.url);

    if args.wait_expiry {
        // The expiry task lives on this runtime; give it a moment past the deadline.
        tokio::time::sleep(ttl + std::time::Duration::from_secs(1)).await;
    }
    Ok(())
}

fn cmd_decode_frame(args: DecodeFrameArgs) -> anyhow::Result<()> {
    let encoded = std::fs::read_to_string(&args.in_path)
        .with_context(|| format!("read frame '{}'", args.in_path.display()))?;
    let bytes = replay_reel::decode_frame(&encoded)?;
    let frame = replay_reel::rasterize(&bytes)?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(&args.out, &bytes)
        .with_context(|| format!("write frame '{}'", args.out.display()))?;

    eprintln!(
        "wrote {} ({}x{})",
        args.out.display(),
        frame.width,
        frame.height
    );
    Ok(())
}
