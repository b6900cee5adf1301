use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("path does not exist: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("{engine} command `{command}` failed ({status}): {stderr}")]
    Engine {
        engine: &'static str,
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("{0}")]
    ArtifactNotFound(String),

    #[error("artifact upload failed: {name} ({} failed items)", failed_items.len())]
    UploadFailed {
        name: String,
        failed_items: Vec<PathBuf>,
    },

    #[error("{0} is not supported")]
    UnsupportedEngine(String),

    #[error("failed to start {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("digest mismatch for {}", path.display())]
    Integrity { path: PathBuf },

    #[error("{url} returned {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
}

pub type Result<T> = std::result::Result<T, Error>;
