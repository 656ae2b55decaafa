use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What the controller does while the magazine is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepletedPolicy {
    /// Stop the loop and block on the operator's reload acknowledgment.
    #[default]
    Pause,
    /// Keep aiming at targets but refuse to fire until reloaded.
    KeepTracking,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurretConfig {
    /// Offset (fraction of frame size) under which both axes count as locked
    pub lock_tolerance: f64,
    pub armed: bool,
    /// Pause after motion so the image stops smearing
    pub settle_delay_ms: u64,
    /// Mechanical re-cock time of the firing mechanism
    pub cooldown_ms: u64,
    /// Pause after the operator confirms a reload
    pub reload_recovery_ms: u64,
    pub drop_compensation_factor: f64,
    pub depleted_policy: DepletedPolicy,
}

impl Default for TurretConfig {
    fn default() -> Self {
        Self {
            lock_tolerance: 0.05,
            armed: false,
            settle_delay_ms: 200,
            cooldown_ms: 3000,
            reload_recovery_ms: 1000,
            drop_compensation_factor: 0.1,
            depleted_policy: DepletedPolicy::Pause,
        }
    }
}

impl TurretConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn reload_recovery(&self) -> Duration {
        Duration::from_millis(self.reload_recovery_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Delay between grabs; keeps the driver's internal buffer from filling
    pub inter_frame_delay_ms: u64,
    pub poll_interval_ms: u64,
    /// (width, height)
    pub resolution: (u32, u32),
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inter_frame_delay_ms: 30,
            poll_interval_ms: 10,
            resolution: (320, 240),
        }
    }
}

impl PipelineConfig {
    pub fn inter_frame_delay(&self) -> Duration {
        Duration::from_millis(self.inter_frame_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KillcamConfig {
    pub enabled: bool,
    pub directory: PathBuf,
    /// Wait between the locked-on frame and the reaction frame
    pub reaction_delay_ms: u64,
}

impl Default for KillcamConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: PathBuf::from("/tmp/sentinel"),
            reaction_delay_ms: 500,
        }
    }
}

impl KillcamConfig {
    pub fn reaction_delay(&self) -> Duration {
        Duration::from_millis(self.reaction_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub cascade_path: PathBuf,
    /// Smallest detection side in pixels
    pub min_target_size: i32,
    pub scale_factor: f64,
    pub min_neighbors: i32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            cascade_path: PathBuf::from("haarcascade_frontalface_default.xml"),
            min_target_size: 20,
            scale_factor: 1.1,
            min_neighbors: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub turret: TurretConfig,
    pub pipeline: PipelineConfig,
    pub killcam: KillcamConfig,
    pub vision: VisionConfig,
}

impl Config {
    pub fn load(path: &Path) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> crate::Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sentinel.json");
        std::fs::write(
            &path,
            r#"{ "turret": { "armed": true, "cooldown_ms": 1500, "depleted_policy": "keep_tracking" } }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert!(config.turret.armed);
        assert_eq!(config.turret.cooldown(), Duration::from_millis(1500));
        assert_eq!(config.turret.depleted_policy, DepletedPolicy::KeepTracking);
        assert_eq!(config.turret.lock_tolerance, 0.05);
        assert_eq!(config.pipeline, PipelineConfig::default());
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sentinel.json");
        let mut config = Config::default();
        config.killcam.enabled = true;
        config.pipeline.resolution = (640, 480);
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ turret: ").unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(crate::error::Error::Json(_))
        ));
    }
}
