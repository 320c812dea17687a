// src/config/validate.rs

use crate::config::model::{BackendSection, ConfigFile, MatchSection, RawConfigFile};
use crate::errors::{DevwatchError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::DevwatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_match(&cfg.match_rules)?;
    validate_backend(&cfg.backend)?;
    Ok(())
}

fn validate_match(section: &MatchSection) -> Result<()> {
    if let Some(key) = section.properties.keys().find(|k| k.trim().is_empty()) {
        return Err(DevwatchError::ConfigError(format!(
            "[match.properties] has an empty key ({key:?})"
        )));
    }

    if let Some(key) = section.attributes.keys().find(|k| k.trim().is_empty()) {
        return Err(DevwatchError::ConfigError(format!(
            "[match.attributes] has an empty key ({key:?})"
        )));
    }

    if section.tags.iter().any(|t| t.trim().is_empty()) {
        return Err(DevwatchError::ConfigError(
            "[match].tags must not contain empty tags".to_string(),
        ));
    }

    if section.subsystem.contains('/') {
        return Err(DevwatchError::ConfigError(format!(
            "[match].subsystem is not a subsystem name: {:?}",
            section.subsystem
        )));
    }

    Ok(())
}

fn validate_backend(section: &BackendSection) -> Result<()> {
    for (name, path) in [
        ("sysfs_root", &section.sysfs_root),
        ("udev_data_dir", &section.udev_data_dir),
    ] {
        if !path.is_absolute() {
            return Err(DevwatchError::ConfigError(format!(
                "[backend].{name} must be an absolute path (got {path:?})"
            )));
        }
    }
    Ok(())
}
