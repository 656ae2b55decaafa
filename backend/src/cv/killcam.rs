use crate::cv::pipeline::FramePipeline;
use crate::error::Error;
use crate::turret::ShotRecorder;
use opencv::core::Vector;
use opencv::imgcodecs::imwrite;
use opencv::prelude::Mat;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::info;

pub fn shot_filename(directory: &Path, shot: u32, label: &str) -> PathBuf {
    directory.join(format!("shot{shot:02}_{label}.jpg"))
}

/// Saves the locked-on frame, waits for the target to react, then saves one
/// more fresh frame from the pipeline.
pub struct Killcam<'a> {
    pipeline: &'a FramePipeline<Mat>,
    locked_on: &'a Mat,
    directory: &'a Path,
    reaction_delay: Duration,
}

impl<'a> Killcam<'a> {
    pub fn new(
        pipeline: &'a FramePipeline<Mat>,
        locked_on: &'a Mat,
        directory: &'a Path,
        reaction_delay: Duration,
    ) -> Self {
        Self {
            pipeline,
            locked_on,
            directory,
            reaction_delay,
        }
    }
}

impl ShotRecorder for Killcam<'_> {
    fn record(&mut self, shot: u32) -> crate::Result<()> {
        std::fs::create_dir_all(self.directory)?;

        save(self.locked_on, &shot_filename(self.directory, shot, "locked"))?;
        thread::sleep(self.reaction_delay);

        let reaction = self.pipeline.take_latest_frame()?;
        save(
            &reaction.image,
            &shot_filename(self.directory, shot, "reaction"),
        )?;

        info!("killcam for shot {shot} saved to {}", self.directory.display());
        Ok(())
    }
}

fn save(img: &Mat, path: &Path) -> crate::Result<()> {
    if !imwrite(&path.to_string_lossy(), img, &Vector::new())? {
        return Err(Error::Io(std::io::Error::other(format!(
            "could not write {}",
            path.display()
        ))));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::cv::pipeline::FrameSource;
    use opencv::core::{Scalar, CV_8UC3};
    use tempfile::TempDir;

    fn still() -> crate::Result<Mat> {
        Ok(Mat::new_rows_cols_with_default(
            24,
            32,
            CV_8UC3,
            Scalar::all(64.),
        )?)
    }

    struct StillSource {
        fail: bool,
    }

    impl FrameSource for StillSource {
        type Image = Mat;

        fn set_resolution(&mut self, _width: u32, _height: u32) -> crate::Result<bool> {
            Ok(true)
        }

        fn grab(&mut self) -> crate::Result<Mat> {
            if self.fail {
                return Err(Error::Capture("grab".into()));
            }
            still()
        }

        fn release(&mut self) -> crate::Result<()> {
            Ok(())
        }
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            inter_frame_delay_ms: 2,
            poll_interval_ms: 1,
            ..Default::default()
        }
    }

    #[test]
    fn saves_locked_and_reaction_frames() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("kills");
        let mut pipeline =
            FramePipeline::spawn(StillSource { fail: false }, &fast_config()).unwrap();
        let locked_on = still().unwrap();

        Killcam::new(&pipeline, &locked_on, &dir, Duration::from_millis(5))
            .record(1)
            .unwrap();
        pipeline.stop();

        for label in ["locked", "reaction"] {
            let path = shot_filename(&dir, 1, label);
            let len = std::fs::metadata(&path).unwrap().len();
            assert!(len > 0, "{} is empty", path.display());
        }
    }

    #[test]
    fn capture_failure_after_shot_is_reported() {
        let tmp = TempDir::new().unwrap();
        let pipeline =
            FramePipeline::spawn(StillSource { fail: true }, &fast_config()).unwrap();
        let locked_on = still().unwrap();

        let result = Killcam::new(&pipeline, &locked_on, tmp.path(), Duration::ZERO).record(3);

        assert!(matches!(result, Err(Error::Capture(_))));
        assert!(shot_filename(tmp.path(), 3, "locked").is_file());
        assert!(!shot_filename(tmp.path(), 3, "reaction").exists());
    }

    #[test]
    fn filenames_are_sequential_per_shot() {
        let dir = Path::new("/tmp/sentinel");
        assert_eq!(
            shot_filename(dir, 1, "locked"),
            PathBuf::from("/tmp/sentinel/shot01_locked.jpg")
        );
        assert_eq!(
            shot_filename(dir, 12, "reaction"),
            PathBuf::from("/tmp/sentinel/shot12_reaction.jpg")
        );
    }
}
