use crate::operator::Operator;
use backend::cv::killcam::Killcam;
use backend::cv::pipeline::FramePipeline;
use backend::cv::vision::{HaarDetector, TargetSelector};
use backend::launcher::ControlChannel;
use backend::{Outcome, Turret};
use opencv::highgui;
use opencv::prelude::Mat;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const WINDOW: &str = "Sentinel";

pub(crate) struct KillcamSettings {
    pub(crate) directory: PathBuf,
    pub(crate) reaction_delay: Duration,
}

pub(crate) struct App<C: ControlChannel> {
    pub(crate) turret: Turret<C>,
    pub(crate) pipeline: FramePipeline<Mat>,
    pub(crate) selector: TargetSelector<HaarDetector>,
    pub(crate) operator: Operator,
    pub(crate) killcam: Option<KillcamSettings>,
    pub(crate) display: bool,
    pub(crate) shutdown: Arc<AtomicBool>,
    pub(crate) max_runtime: Option<Duration>,
}

impl<C: ControlChannel> App<C> {
    /// Runs the control loop, then parks the turret and releases the camera
    /// however the loop ended.
    pub(crate) fn run(mut self) -> crate::Result<()> {
        let result = self.control_loop();

        if let Err(e) = self.turret.park() {
            warn!("failed to park turret: {e}");
        }
        self.pipeline.stop();
        if self.display {
            if let Err(e) = highgui::destroy_all_windows() {
                warn!("failed to close display: {e}");
            }
        }

        result
    }

    fn control_loop(&mut self) -> crate::Result<()> {
        let start = Instant::now();
        info!(
            "entering control loop ({}) - press Ctrl+C to exit",
            if self.turret.armed() { "armed" } else { "disarmed" }
        );

        while !self.shutdown.load(Ordering::SeqCst) {
            if self.max_runtime.is_some_and(|max| start.elapsed() >= max) {
                info!("max runtime reached, exiting");
                break;
            }

            let frame = self.pipeline.take_latest_frame()?;
            let selection = self.selector.select(&frame.image)?;
            debug!(
                "frame {} is {:?} old",
                frame.sequence,
                frame.captured_at.elapsed()
            );

            if self.display {
                highgui::imshow(WINDOW, &selection.annotated)?;
                highgui::wait_key(1)?;
            }

            let outcome = match &self.killcam {
                Some(settings) => {
                    let mut recorder = Killcam::new(
                        &self.pipeline,
                        &selection.annotated,
                        &settings.directory,
                        settings.reaction_delay,
                    );
                    self.turret
                        .cycle(&selection.offset, Some(&mut recorder), &mut self.operator)?
                }
                None => self
                    .turret
                    .cycle(&selection.offset, None, &mut self.operator)?,
            };

            match outcome {
                Outcome::NoTarget => debug!("no target"),
                Outcome::Tracking => debug!(
                    "tracking ({:+.3}, {:+.3})",
                    selection.offset.x_offset, selection.offset.y_offset
                ),
                Outcome::Trained => {}
                Outcome::Fired { shot, remaining } => {
                    info!("shot {shot} fired, {remaining} missiles left")
                }
                Outcome::Depleted => debug!("target locked but magazine empty"),
                Outcome::Reloaded => info!("resuming after reload"),
                Outcome::Shutdown => {
                    info!("shutdown requested");
                    break;
                }
            }
        }

        Ok(())
    }
}
