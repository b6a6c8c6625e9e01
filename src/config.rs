use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{ImageSize, UserRef};
use crate::error::BackupError;

pub const DEFAULT_CONFIG_FILE: &str = "mo-backup.json";
pub const DEFAULT_BASE_URL: &str = "https://mushroomobserver.org";
pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub image_size: Option<ImageSize>,
    #[serde(default)]
    pub backup_archive: Option<String>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Values given on the command line; each one wins over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub user: Option<String>,
    pub image_size: Option<ImageSize>,
    pub backup_archive: Option<String>,
    pub page_size: Option<usize>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub user: UserRef,
    pub image_size: ImageSize,
    pub backup_archive: Utf8PathBuf,
    pub page_size: usize,
    pub base_url: String,
    pub timeout: Option<Duration>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `mo-backup.json` when present, and applies `overrides`.
    /// An explicit path must exist; the default file is optional.
    pub fn resolve(
        path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, BackupError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| BackupError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content)
                .map_err(|err| BackupError::ConfigParse(err.to_string()))?
        };

        Self::resolve_config(config, overrides)
    }

    pub fn resolve_config(
        config: Config,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, BackupError> {
        let user: UserRef = overrides
            .user
            .or(config.user)
            .ok_or(BackupError::MissingUser)?
            .parse()?;

        let image_size = overrides
            .image_size
            .or(config.image_size)
            .unwrap_or(ImageSize::Orig);

        let backup_archive = overrides
            .backup_archive
            .or(config.backup_archive)
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|| default_archive_path(&user));

        let page_size = overrides
            .page_size
            .or(config.page_size)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 {
            return Err(BackupError::InvalidConfig(
                "page_size must be at least 1".to_string(),
            ));
        }

        let base_url = overrides
            .base_url
            .or(config.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(BackupError::InvalidConfig(format!(
                "base_url must be an http(s) URL: {base_url}"
            )));
        }

        Ok(ResolvedConfig {
            user,
            image_size,
            backup_archive,
            page_size,
            base_url,
            timeout: overrides
                .timeout_secs
                .or(config.timeout_secs)
                .map(Duration::from_secs),
        })
    }
}

pub fn default_archive_path(user: &UserRef) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{user}-mo-bkp.zip"))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults_fill_in_everything_but_user() {
        let config = Config {
            user: Some("dwilderness".to_string()),
            ..Config::default()
        };

        let resolved = ConfigLoader::resolve_config(config, ConfigOverrides::default()).unwrap();
        assert_eq!(resolved.user.as_str(), "dwilderness");
        assert_eq!(resolved.image_size, ImageSize::Orig);
        assert_eq!(resolved.backup_archive.as_str(), "dwilderness-mo-bkp.zip");
        assert_eq!(resolved.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(resolved.base_url, DEFAULT_BASE_URL);
        assert!(resolved.timeout.is_none());
    }

    #[test]
    fn missing_user_is_rejected() {
        let err = ConfigLoader::resolve_config(Config::default(), ConfigOverrides::default())
            .unwrap_err();
        assert_matches!(err, BackupError::MissingUser);
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let overrides = ConfigOverrides {
            user: Some("4786".to_string()),
            page_size: Some(0),
            ..ConfigOverrides::default()
        };
        let err = ConfigLoader::resolve_config(Config::default(), overrides).unwrap_err();
        assert_matches!(err, BackupError::InvalidConfig(_));
    }
}
