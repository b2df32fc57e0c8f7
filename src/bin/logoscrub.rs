use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use logoscrub::host::sim::{SimHost, SimMedia, SimSurface};
use logoscrub::host::{Event, EventKind};
use logoscrub::session::{DEFAULT_SURFACE_ID, DEFAULT_VIDEO_ID};

#[derive(Parser, Debug)]
#[command(name = "logoscrub", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Composite a single frame at one pointer position and write it as a PNG.
    Frame(FrameArgs),
    /// Sweep the pointer across the surface and write one PNG per step.
    Scrub(ScrubArgs),
}

#[derive(Parser, Debug)]
struct SourceArgs {
    /// Directory the mask path templates are resolved against.
    #[arg(long)]
    masks: PathBuf,

    /// Still image standing in for the current video frame.
    #[arg(long)]
    video: PathBuf,

    /// Optional overlay image.
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Compositor configuration JSON (partial documents keep defaults).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Backend to use.
    #[arg(long, value_enum, default_value_t = BackendChoice::Cpu)]
    backend: BackendChoice,

    /// Refresh ticks to run per output frame, so the smoothed scales settle.
    #[arg(long, default_value_t = 30)]
    ticks: usize,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    #[command(flatten)]
    src: SourceArgs,

    /// Pointer position as a fraction of the surface width.
    #[arg(long, default_value_t = 0.5)]
    x: f64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct ScrubArgs {
    #[command(flatten)]
    src: SourceArgs,

    /// Number of evenly spaced pointer positions.
    #[arg(long, default_value_t = 10)]
    steps: usize,

    /// Output directory; frames are written as `scrub_NNNNN.png`.
    #[arg(long)]
    out_dir: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendChoice {
    Cpu,
    #[cfg(feature = "gpu")]
    Gpu,
}

impl BackendChoice {
    fn kind(self) -> logoscrub::BackendKind {
        match self {
            BackendChoice::Cpu => logoscrub::BackendKind::Cpu,
            #[cfg(feature = "gpu")]
            BackendChoice::Gpu => logoscrub::BackendKind::Gpu,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Frame(args) => cmd_frame(args),
        Command::Scrub(args) => cmd_scrub(args),
    }
}

fn read_image(path: &Path) -> anyhow::Result<logoscrub::RasterImage> {
    let bytes = std::fs::read(path).with_context(|| format!("read image '{}'", path.display()))?;
    logoscrub::assets::decode::decode_image(&bytes)
        .with_context(|| format!("decode image '{}'", path.display()))
}

/// A simulated page with the surface, the video and a running compositor.
struct Stage {
    host: SimHost,
    compositor: logoscrub::Compositor,
    width: f64,
    ticks: usize,
}

impl Stage {
    fn build(src: &SourceArgs) -> anyhow::Result<Self> {
        let config = match &src.config {
            Some(p) => logoscrub::CompositorConfig::from_json_file(p)?,
            None => logoscrub::CompositorConfig::default(),
        };
        config.validate()?;

        let video = read_image(&src.video)?;
        let overlay = src.overlay.as_deref().map(read_image).transpose()?;

        let fetcher = Arc::new(logoscrub::FsFetcher::new(&src.masks));
        let masks = logoscrub::MaskCacheService::new(fetcher, &config);
        let set = masks.ensure_masks_loaded().wait();
        if set.placeholder_count() == set.len() {
            anyhow::bail!(
                "no mask frame could be loaded from '{}'",
                src.masks.display()
            );
        }

        let host = SimHost::new();
        let rect = config.canvas.rect();
        host.add_surface(
            DEFAULT_SURFACE_ID,
            SimSurface::new(rect, Some(src.backend.kind())),
        );
        let media: Rc<SimMedia> = host.add_media(DEFAULT_VIDEO_ID, SimMedia::new().with_frame(video));

        let compositor = logoscrub::initialize(
            &host,
            logoscrub::CompositorOptions {
                config,
                overlay,
                masks: Some(masks),
                ..Default::default()
            },
        )?;
        if !compositor.is_active() {
            anyhow::bail!("compositor could not start (see log)");
        }
        media.dispatch(&Event::new(EventKind::LoadedData));

        Ok(Self {
            host,
            compositor,
            width: rect.width(),
            ticks: src.ticks.max(1),
        })
    }

    fn render_at(&self, fraction: f64) -> anyhow::Result<logoscrub::FrameRGBA> {
        let x = fraction.clamp(0.0, 1.0) * self.width;
        self.host
            .sim_window()
            .dispatch(&Event::pointer(EventKind::PointerMove, x));
        let before = self.compositor.draws();
        self.host.step_frames(self.ticks);
        if self.compositor.draws() == before {
            anyhow::bail!("no frame was drawn");
        }
        Ok(self.compositor.read_frame()?.into_straight())
    }
}

fn write_png(path: &Path, frame: &logoscrub::FrameRGBA) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        path,
        &frame.data,
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", path.display()))
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let stage = Stage::build(&args.src)?;
    let frame = stage.render_at(args.x)?;
    write_png(&args.out, &frame)?;
    eprintln!(
        "wrote {} (mask frame {})",
        args.out.display(),
        stage.compositor.current_frame()
    );
    Ok(())
}

fn cmd_scrub(args: ScrubArgs) -> anyhow::Result<()> {
    let stage = Stage::build(&args.src)?;
    let steps = args.steps.max(1);
    for step in 0..steps {
        let fraction = if steps == 1 {
            0.0
        } else {
            step as f64 / (steps - 1) as f64
        };
        let frame = stage.render_at(fraction)?;
        let path = args.out_dir.join(format!("scrub_{step:05}.png"));
        write_png(&path, &frame)?;
    }
    eprintln!("wrote {steps} frames to {}", args.out_dir.display());
    stage.compositor.teardown();
    Ok(())
}
