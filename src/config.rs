use crate::types::Config;
use crate::zone::ZoneSet;
use anyhow::{bail, Context, Result};
use std::fs;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path))?;
        Ok(config)
    }

    /// Rejects settings the counting session cannot start with.
    pub fn validate(&self) -> Result<()> {
        let s = &self.session;

        if let Some(fps) = s.frame_rate {
            if !(fps.is_finite() && fps > 0.0) {
                bail!("session.frame_rate must be positive, got {}", fps);
            }
        }
        if !(s.scale_m_per_px.is_finite() && s.scale_m_per_px > 0.0) {
            bail!(
                "session.scale_m_per_px must be positive, got {}",
                s.scale_m_per_px
            );
        }
        if s.speed_sample_interval == 0 {
            bail!("session.speed_sample_interval must be at least 1");
        }
        if !(0.0..=1.0).contains(&s.confidence_threshold) {
            bail!(
                "session.confidence_threshold must be within [0, 1], got {}",
                s.confidence_threshold
            );
        }
        if !(0.0..=1.0).contains(&s.iou_threshold) {
            bail!(
                "session.iou_threshold must be within [0, 1], got {}",
                s.iou_threshold
            );
        }
        if self.input.extensions.is_empty() {
            bail!("input.extensions must list at least one extension");
        }

        // Builds and discards the zones: polygon and mode checks live there
        ZoneSet::from_config(&self.zones).context("Invalid zones configuration")?;

        Ok(())
    }
}
