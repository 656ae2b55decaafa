use crate::cv::pipeline::FrameSource;
use crate::error::Error;
use opencv::prelude::{Mat, VideoCaptureTrait, VideoCaptureTraitConst};
use opencv::videoio::{self, VideoCapture};
use tracing::debug;

pub mod killcam;
pub mod pipeline;
pub mod vision;

/// Webcam read through OpenCV's `VideoCapture`.
pub struct Camera {
    source: VideoCapture,
}

impl Camera {
    // TODO: list cameras and connect by name instead of index
    pub fn connect(camera_id: i32) -> crate::Result<Self> {
        let source = VideoCapture::new(camera_id, videoio::CAP_ANY)?;
        if !source.is_opened()? {
            return Err(Error::CameraUnavailable(camera_id));
        }
        debug!("opened camera {camera_id}");

        Ok(Self { source })
    }
}

impl FrameSource for Camera {
    type Image = Mat;

    fn set_resolution(&mut self, width: u32, height: u32) -> crate::Result<bool> {
        self.source
            .set(videoio::CAP_PROP_FRAME_WIDTH, f64::from(width))?;
        self.source
            .set(videoio::CAP_PROP_FRAME_HEIGHT, f64::from(height))?;

        let actual_width = self.source.get(videoio::CAP_PROP_FRAME_WIDTH)?;
        let actual_height = self.source.get(videoio::CAP_PROP_FRAME_HEIGHT)?;
        debug!("camera reports {actual_width}x{actual_height}");

        Ok(actual_width as u32 == width && actual_height as u32 == height)
    }

    fn grab(&mut self) -> crate::Result<Mat> {
        if !self.source.grab()? {
            return Err(Error::Capture("grab".into()));
        }

        let mut frame = Mat::default();
        if !self.source.retrieve(&mut frame, 0)? {
            return Err(Error::Capture("retrieve".into()));
        }

        Ok(frame)
    }

    fn release(&mut self) -> crate::Result<()> {
        self.source.release()?;
        Ok(())
    }
}
