use crate::app::{App, KillcamSettings};
use crate::operator::Operator;

use anyhow::Context;
use backend::config::{Config, DepletedPolicy};
use backend::cv::pipeline::FramePipeline;
use backend::cv::vision::{HaarDetector, TargetSelector};
use backend::cv::Camera;
use backend::launcher::mock::DryRunChannel;
use backend::launcher::usb::UsbChannel;
use backend::launcher::{ControlChannel, Launcher, LauncherModel};
use backend::Turret;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod error;
mod operator;

pub(crate) type Result<T> = std::result::Result<T, crate::error::Error>;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LauncherArg {
    /// Use the first supported launcher found on the bus
    Auto,
    Thunder,
    Original,
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Aims a USB missile launcher at faces seen by its webcam"
)]
struct Args {
    #[arg(short, long, value_enum, default_value = "auto")]
    launcher: LauncherArg,

    #[arg(short = 'i', long, default_value = "0")]
    camera: i32,

    #[arg(short, long, help = "JSON configuration file")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Fire when the target is locked")]
    arm: bool,

    #[arg(long, help = "Run the centering sequence before tracking")]
    reset: bool,

    #[arg(long, help = "Save locked-on and reaction frames for every shot")]
    killcam: bool,

    #[arg(long)]
    killcam_dir: Option<PathBuf>,

    #[arg(long, help = "Haar cascade used for detection")]
    cascade: Option<PathBuf>,

    #[arg(long, value_parser = parse_resolution, help = "Working resolution, e.g. 320x240")]
    resolution: Option<(u32, u32)>,

    #[arg(long)]
    no_display: bool,

    #[arg(long, help = "Keep aiming while waiting for a reload")]
    keep_tracking_when_empty: bool,

    #[arg(long, help = "Log launcher commands instead of sending them")]
    dry_run: bool,

    #[arg(
        short = 't',
        long,
        help = "Maximum runtime in seconds (runs indefinitely if not specified)"
    )]
    max_runtime_secs: Option<u64>,
}

fn parse_resolution(s: &str) -> std::result::Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s}"))?;
    let w = w.trim().parse().map_err(|e| format!("bad width: {e}"))?;
    let h = h.trim().parse().map_err(|e| format!("bad height: {e}"))?;
    Ok((w, h))
}

impl Args {
    fn config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => Config::default(),
        };

        if self.arm {
            config.turret.armed = true;
        }
        if self.keep_tracking_when_empty {
            config.turret.depleted_policy = DepletedPolicy::KeepTracking;
        }
        if self.killcam {
            config.killcam.enabled = true;
        }
        if let Some(dir) = &self.killcam_dir {
            config.killcam.directory = dir.clone();
        }
        if let Some(cascade) = &self.cascade {
            config.vision.cascade_path = cascade.clone();
        }
        if let Some(resolution) = self.resolution {
            config.pipeline.resolution = resolution;
        }

        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.config()?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            info!("interrupt received, finishing current cycle");
            shutdown.store(true, Ordering::SeqCst);
        })
        .context("failed to install Ctrl+C handler")?;
    }

    let model = match args.launcher {
        LauncherArg::Auto => None,
        LauncherArg::Thunder => Some(LauncherModel::Thunder),
        LauncherArg::Original => Some(LauncherModel::Original),
    };

    if args.dry_run {
        let profile = model.unwrap_or(LauncherModel::Thunder).profile();
        info!("dry run, no launcher commands will be sent");
        run(Launcher::new(DryRunChannel::default(), profile), &args, config, shutdown)
    } else {
        let (channel, profile) = match model {
            Some(model) => (UsbChannel::open(model.profile())?, model.profile()),
            None => UsbChannel::detect()?,
        };
        run(Launcher::new(channel, profile), &args, config, shutdown)
    }
}

fn run<C: ControlChannel>(
    launcher: Launcher<C>,
    args: &Args,
    config: Config,
    shutdown: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let mut turret = Turret::new(launcher, config.turret.clone());
    if args.reset {
        turret.center().context("failed to center launcher")?;
    }

    let camera = Camera::connect(args.camera)
        .with_context(|| format!("failed to open camera {}", args.camera))?;
    let detector = HaarDetector::load(&config.vision.cascade_path, &config.vision)
        .with_context(|| {
            format!(
                "failed to load cascade {}",
                config.vision.cascade_path.display()
            )
        })?;

    let (width, height) = config.pipeline.resolution;
    let pipeline = FramePipeline::spawn(camera, &config.pipeline)?;
    let selector = TargetSelector::new(detector, width, height);

    let killcam = config.killcam.enabled.then(|| KillcamSettings {
        directory: config.killcam.directory.clone(),
        reaction_delay: config.killcam.reaction_delay(),
    });

    let app = App {
        turret,
        pipeline,
        selector,
        operator: Operator::spawn(shutdown.clone(), config.pipeline.poll_interval()),
        killcam,
        display: !args.no_display,
        shutdown,
        max_runtime: args.max_runtime_secs.map(Duration::from_secs),
    };

    app.run()?;
    info!("sentinel stopped");
    Ok(())
}
