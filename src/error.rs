use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModsyncError {
    #[error("No such file {0:?}")]
    MissingFile(PathBuf),
    #[error(transparent)]
    IoError(#[from] io::Error),
    #[error("{0}")]
    MiscError(String),
    #[error(transparent)]
    ZipError(#[from] zip::result::ZipError),
    #[error("Error parsing JSON: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Error parsing config: {0}")]
    ConfigError(#[from] json5::Error),
    #[error("Browser error: {0}")]
    BrowserError(#[from] chromiumoxide::error::CdpError),
    #[error("Invalid version string '{0}'")]
    InvalidVersion(String),
    #[error("Timed out waiting for {0}")]
    Timeout(String),
    #[error("Refusing to use {0:?} as the temp directory: {1}")]
    UnsafeTempDir(PathBuf, String),
    #[error("Error resolving link: {0}")]
    UrlError(#[from] url::ParseError),
    #[error("No mods directory configured and none could be located")]
    MissingModsDir,
}
