use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum BackupError {
    #[error("invalid observation id: {0}")]
    InvalidObservationId(String),

    #[error("invalid image size: {0} (expected one of 480, 640, 1280, orig)")]
    InvalidImageSize(String),

    #[error("invalid user: {0:?}")]
    InvalidUser(String),

    #[error("no user configured; set `user` in mo-backup.json or pass --user")]
    #[diagnostic(help("e.g. `mo-backup --user dwilderness`"))]
    MissingUser,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("couldn't find MO user {user} (status {status})")]
    UserNotFound { user: String, status: u16 },

    #[error("catalog request failed: {0}")]
    CatalogHttp(String),

    #[error("catalog returned status {status}: {message}")]
    CatalogStatus { status: u16, message: String },

    #[error("unexpected catalog response: {0}")]
    MalformedResponse(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("archive already holds snapshot entry {0}")]
    #[diagnostic(help("remove the entry or write the snapshot to another archive"))]
    SnapshotExists(String),

    #[error("failed to install signal handler: {0}")]
    SignalHandler(String),

    #[error("interrupted; the archive was closed after the last complete observation")]
    Interrupted,

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
