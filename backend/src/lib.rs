pub mod aim;
pub mod config;
pub mod cv;
pub mod engage;
pub mod error;
pub mod launcher;
pub mod turret;

pub use turret::{Acknowledgement, Outcome, ReloadAcknowledger, ShotRecorder, Turret};

pub type Result<T> = std::result::Result<T, crate::error::Error>;
