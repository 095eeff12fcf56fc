use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::search::{AlphaSearch, NoTargetPolicy};
use crate::service::MatchSettings;

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("KINMATCH_CONFIG_PATH").unwrap_or("/usr/local/etc/kinmatch/config.toml"))
});

pub static DATA_PREFIX: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("KINMATCH_DATA_PREFIX").unwrap_or("/usr/local/share/kinmatch"))
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model_path: PathBuf,
    pub database_path: PathBuf,
    pub top_k: usize,
    pub alpha_step: f32,
    pub no_target: NoTargetPolicy,
    pub default_alpha: f32,
    pub min_face_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_path: DATA_PREFIX.join("face_recognition_sface_2021dec.onnx"),
            database_path: DATA_PREFIX.join("children.bin"),
            top_k: 5,
            alpha_step: 0.01,
            no_target: NoTargetPolicy::Default,
            default_alpha: 0.5,
            min_face_size: kinmatch_vision::encoder::DEFAULT_MIN_FACE_SIZE,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            anyhow::bail!("top_k must be at least 1");
        }
        if !(AlphaSearch::MIN_STEP..=1.0).contains(&self.alpha_step) {
            anyhow::bail!(
                "alpha_step must lie in [{}, 1], got {}",
                AlphaSearch::MIN_STEP,
                self.alpha_step
            );
        }
        if !(0.0..=1.0).contains(&self.default_alpha) {
            anyhow::bail!("default_alpha must lie in [0, 1], got {}", self.default_alpha);
        }
        Ok(())
    }

    pub fn settings(&self) -> MatchSettings {
        MatchSettings {
            alpha_step: self.alpha_step,
            no_target: self.no_target,
            default_alpha: self.default_alpha,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validating config {}", path.display()))?;
    Ok(cfg)
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(cfg.top_k, 5);
        assert_eq!(cfg.no_target, NoTargetPolicy::Default);
        assert_eq!(cfg.default_alpha, 0.5);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etc/config.toml");
        let cfg = Config {
            top_k: 3,
            no_target: NoTargetPolicy::Fail,
            ..Config::default()
        };
        save_config(&cfg, Some(&path)).unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.top_k, 3);
        assert_eq!(loaded.no_target, NoTargetPolicy::Fail);
        assert_eq!(loaded.database_path, cfg.database_path);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "no_target = \"fail\"\nalpha_step = 0.05\n").unwrap();

        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.no_target, NoTargetPolicy::Fail);
        assert_eq!(cfg.alpha_step, 0.05);
        assert_eq!(cfg.top_k, 5);
    }

    #[test]
    fn test_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        for body in [
            "top_k = 0",
            "alpha_step = 0.0",
            "alpha_step = 1e-12",
            "default_alpha = 1.5",
        ] {
            std::fs::write(&path, body).unwrap();
            assert!(load_config(Some(&path)).is_err(), "{body}");
        }
    }
}
