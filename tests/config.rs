use std::fs;

use assert_matches::assert_matches;

use mo_backup::config::{Config, ConfigLoader, ConfigOverrides, DEFAULT_BASE_URL};
use mo_backup::domain::ImageSize;
use mo_backup::error::BackupError;

#[test]
fn parse_config_file_with_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mo-backup.json");
    fs::write(
        &path,
        r#"{
            "user": "4786",
            "image_size": "1280",
            "page_size": 25,
            "base_url": "http://localhost:3000/",
            "timeout_secs": 90
        }"#,
    )
    .unwrap();

    let overrides = ConfigOverrides {
        image_size: Some(ImageSize::Px480),
        ..ConfigOverrides::default()
    };
    let resolved = ConfigLoader::resolve(path.to_str(), overrides).unwrap();

    assert_eq!(resolved.user.as_str(), "4786");
    assert_eq!(resolved.image_size, ImageSize::Px480);
    assert_eq!(resolved.page_size, 25);
    assert_eq!(resolved.base_url, "http://localhost:3000");
    assert_eq!(resolved.backup_archive.as_str(), "4786-mo-bkp.zip");
    assert_eq!(resolved.timeout.map(|t| t.as_secs()), Some(90));
}

#[test]
fn explicit_missing_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let err = ConfigLoader::resolve(path.to_str(), ConfigOverrides::default()).unwrap_err();
    assert_matches!(err, BackupError::ConfigRead(_));
}

#[test]
fn bad_image_size_fails_to_parse() {
    let err = serde_json::from_str::<Config>(r#"{ "image_size": "320" }"#).unwrap_err();
    assert!(err.to_string().contains("unknown variant"));
}

#[test]
fn archive_override_wins() {
    let config = Config {
        user: Some("alsmith".to_string()),
        backup_archive: Some("from-file.zip".to_string()),
        ..Config::default()
    };
    let overrides = ConfigOverrides {
        backup_archive: Some("backups/alsmith.zip".to_string()),
        ..ConfigOverrides::default()
    };
    let resolved = ConfigLoader::resolve_config(config, overrides).unwrap();
    assert_eq!(resolved.backup_archive.as_str(), "backups/alsmith.zip");
    assert_eq!(resolved.base_url, DEFAULT_BASE_URL);
}

#[test]
fn non_http_base_url_is_rejected() {
    let overrides = ConfigOverrides {
        user: Some("alsmith".to_string()),
        base_url: Some("ftp://mushroomobserver.org".to_string()),
        ..ConfigOverrides::default()
    };
    let err = ConfigLoader::resolve_config(Config::default(), overrides).unwrap_err();
    assert_matches!(err, BackupError::InvalidConfig(_));
}

#[test]
fn timeout_override_wins() {
    let config = Config {
        user: Some("alsmith".to_string()),
        timeout_secs: Some(90),
        ..Config::default()
    };
    let overrides = ConfigOverrides {
        timeout_secs: Some(5),
        ..ConfigOverrides::default()
    };
    let resolved = ConfigLoader::resolve_config(config, overrides).unwrap();
    assert_eq!(resolved.timeout, Some(std::time::Duration::from_secs(5)));
}
