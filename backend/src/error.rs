use crate::engage::EngagementError;
use crate::launcher::Direction;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    OpenCV(#[from] opencv::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Usb(#[from] rusb::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Engagement(#[from] EngagementError),

    #[error("launcher {vendor_id:04x}:{product_id:04x} not found")]
    LauncherNotFound { vendor_id: u16, product_id: u16 },
    #[error("no supported launcher connected")]
    NoLauncher,
    #[error("short control transfer: wrote {written} of {expected} bytes")]
    ShortTransfer { written: usize, expected: usize },
    #[error("{profile} launcher cannot move {direction}")]
    UnsupportedDirection {
        profile: &'static str,
        direction: Direction,
    },

    #[error("camera {0} could not be opened")]
    CameraUnavailable(i32),
    #[error("no cascade could be loaded from {}", .0.display())]
    CascadeUnavailable(PathBuf),
    #[error("frame {0} failed")]
    Capture(String),
    #[error("frame pipeline stopped")]
    PipelineStopped,
    #[error("frame slot lock poisoned")]
    Poisoned,
}
