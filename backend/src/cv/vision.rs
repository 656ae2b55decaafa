use opencv::core::{Point, Rect, Scalar, Size};
use opencv::imgproc::{
    circle, cvt_color, line, rectangle, resize, COLOR_BGR2GRAY, COLOR_GRAY2BGR, INTER_AREA,
    LINE_8,
};
use opencv::objdetect::{CascadeClassifier, CascadeClassifierTrait, CascadeClassifierTraitConst};
use opencv::prelude::{Mat, MatTraitConst};
use opencv::types::VectorOfRect;
use std::fmt::{Display, Formatter};
use std::path::Path;
use tracing::{debug, trace};

use crate::config::VisionConfig;
use crate::error::Error;

fn plain_box() -> Scalar {
    Scalar::new(255., 255., 255., 0.)
}

fn reticule() -> Scalar {
    Scalar::new(0., 0., 255., 0.)
}

/// Candidate target region within one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Detection {
    pub fn area(&self) -> i64 {
        i64::from(self.width) * i64::from(self.height)
    }

    fn center(&self) -> (f64, f64) {
        (
            f64::from(self.x) + f64::from(self.width) / 2.,
            f64::from(self.y) + f64::from(self.height) / 2.,
        )
    }
}

impl From<Rect> for Detection {
    fn from(r: Rect) -> Self {
        Self {
            x: r.x,
            y: r.y,
            width: r.width,
            height: r.height,
        }
    }
}

impl From<Detection> for Rect {
    fn from(d: Detection) -> Self {
        Rect::new(d.x, d.y, d.width, d.height)
    }
}

impl Display for Detection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {} {}x{} :: {}",
            self.x,
            self.y,
            self.width,
            self.height,
            self.area()
        )
    }
}

/// Displacement of the chosen target from the frame center, as signed
/// fractions of the frame size. Positive is right/down.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TargetOffset {
    pub target_found: bool,
    pub x_offset: f64,
    pub y_offset: f64,
    /// Target height over frame height; stands in for distance.
    pub height_fraction: f64,
}

impl TargetOffset {
    pub fn none() -> Self {
        Self::default()
    }
}

/// Index of the primary target: the largest area, and among equal areas the
/// one reported last by the detector.
pub fn select_primary(detections: &[Detection]) -> Option<usize> {
    let mut order: Vec<usize> = (0..detections.len()).collect();
    order.sort_by_key(|&i| detections[i].area());
    order.last().copied()
}

pub fn target_offset(target: &Detection, frame_width: i32, frame_height: i32) -> TargetOffset {
    if frame_width <= 0 || frame_height <= 0 {
        return TargetOffset::none();
    }
    let (w, h) = (f64::from(frame_width), f64::from(frame_height));
    let (cx, cy) = target.center();

    TargetOffset {
        target_found: true,
        x_offset: (cx - w / 2.) / w,
        y_offset: (cy - h / 2.) / h,
        height_fraction: f64::from(target.height.max(0)) / h,
    }
}

/// Black-box object detector working on single-channel images.
pub trait Detector {
    fn detect(&mut self, gray: &Mat) -> crate::Result<Vec<Detection>>;
}

pub struct HaarDetector {
    classifier: CascadeClassifier,
    scale_factor: f64,
    min_neighbors: i32,
    min_size: Size,
}

impl HaarDetector {
    pub fn load(path: &Path, config: &VisionConfig) -> crate::Result<Self> {
        let classifier = CascadeClassifier::new(&path.to_string_lossy())?;
        if classifier.empty()? {
            return Err(Error::CascadeUnavailable(path.to_path_buf()));
        }

        Ok(Self {
            classifier,
            scale_factor: config.scale_factor,
            min_neighbors: config.min_neighbors,
            min_size: Size::new(config.min_target_size, config.min_target_size),
        })
    }
}

impl Detector for HaarDetector {
    fn detect(&mut self, gray: &Mat) -> crate::Result<Vec<Detection>> {
        let mut found = VectorOfRect::new();
        self.classifier.detect_multi_scale(
            gray,
            &mut found,
            self.scale_factor,
            self.min_neighbors,
            0,
            self.min_size,
            Size::default(),
        )?;

        Ok(found.iter().map(Detection::from).collect())
    }
}

/// Result of one detection pass.
pub struct Selection {
    pub offset: TargetOffset,
    pub detections: Vec<Detection>,
    pub primary: Option<usize>,
    /// Working-resolution frame with boxes and the reticule drawn on it
    pub annotated: Mat,
}

pub struct TargetSelector<D> {
    detector: D,
    working_size: Size,
}

impl<D: Detector> TargetSelector<D> {
    pub fn new(detector: D, width: u32, height: u32) -> Self {
        Self {
            detector,
            working_size: Size::new(width as i32, height as i32),
        }
    }

    pub fn select(&mut self, frame: &Mat) -> crate::Result<Selection> {
        let frame = self.fit(frame)?;

        let mut gray = Mat::default();
        cvt_color(&frame, &mut gray, COLOR_BGR2GRAY, 0)?;

        let detections = self.detector.detect(&gray)?;

        let mut annotated = Mat::default();
        cvt_color(&gray, &mut annotated, COLOR_GRAY2BGR, 0)?;

        let primary = select_primary(&detections);
        let offset = match primary {
            Some(i) => target_offset(&detections[i], frame.cols(), frame.rows()),
            None => TargetOffset::none(),
        };

        for (i, detection) in detections.iter().enumerate() {
            trace!("detection {i}: {detection}");
            if Some(i) == primary {
                draw_reticule(&mut annotated, detection)?;
            } else {
                rectangle(&mut annotated, Rect::from(*detection), plain_box(), 1, LINE_8, 0)?;
            }
        }

        if offset.target_found {
            debug!(
                "{} detections, target at ({:+.3}, {:+.3}) height {:.3}",
                detections.len(),
                offset.x_offset,
                offset.y_offset,
                offset.height_fraction
            );
        }

        Ok(Selection {
            offset,
            detections,
            primary,
            annotated,
        })
    }

    fn fit(&self, frame: &Mat) -> crate::Result<Mat> {
        if frame.size()? == self.working_size {
            return Ok(frame.clone());
        }

        let mut resized = Mat::default();
        resize(frame, &mut resized, self.working_size, 0., 0., INTER_AREA)?;
        Ok(resized)
    }
}

fn draw_reticule(img: &mut Mat, target: &Detection) -> crate::Result<()> {
    let (cx, cy) = target.center();
    let center = Point::new(cx as i32, cy as i32);
    let radius = (target.width.min(target.height) / 2).max(1);
    let arm = radius + radius / 2;
    let color = reticule();

    circle(img, center, radius, color, 2, LINE_8, 0)?;
    line(
        img,
        Point::new(center.x - arm, center.y),
        Point::new(center.x + arm, center.y),
        color,
        1,
        LINE_8,
        0,
    )?;
    line(
        img,
        Point::new(center.x, center.y - arm),
        Point::new(center.x, center.y + arm),
        color,
        1,
        LINE_8,
        0,
    )?;

    Ok(())
}
