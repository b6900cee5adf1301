//! Artifact store capabilities.
//!
//! The orchestration in [`crate::image_artifact`] only needs an [`ArtifactUploader`]
//! and an [`ArtifactDownloader`]. [`StoreUploader`] and [`StoreDownloader`] adapt any
//! [`ArtifactStore`] to those seams; [`github::WorkflowRunDownloader`] fetches from a
//! specific workflow run instead.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub mod github;
mod hashfile;
pub mod local;

pub use local::LocalArtifactStore;

pub trait ArtifactUploader {
    /// Upload `file` under `name` and return the stored artifact name.
    fn upload(&self, name: &str, file: &Path, retention_days: u32) -> Result<String>;
}

pub trait ArtifactDownloader {
    /// Download artifact `name` below `base_dir` and return the directory holding its files.
    fn download(&self, name: &str, base_dir: &Path) -> Result<PathBuf>;
}

impl<F> ArtifactUploader for F
where
    F: Fn(&str, &Path, u32) -> Result<String>,
{
    fn upload(&self, name: &str, file: &Path, retention_days: u32) -> Result<String> {
        self(name, file, retention_days)
    }
}

impl<F> ArtifactDownloader for F
where
    F: Fn(&str, &Path) -> Result<PathBuf>,
{
    fn download(&self, name: &str, base_dir: &Path) -> Result<PathBuf> {
        self(name, base_dir)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Days until the artifact expires; 0 uses the store default.
    pub retention_days: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadResponse {
    pub artifact_name: String,
    pub size: u64,
    pub failed_items: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResponse {
    pub artifact_name: String,
    pub download_path: PathBuf,
}

pub trait ArtifactStore {
    /// Store `files` as artifact `name`, keeping their paths relative to `root_dir`.
    ///
    /// Files that could not be stored are reported in
    /// [`UploadResponse::failed_items`] rather than failing the call.
    fn upload_artifact(
        &self,
        name: &str,
        files: &[PathBuf],
        root_dir: &Path,
        options: &UploadOptions,
    ) -> Result<UploadResponse>;

    fn download_artifact(&self, name: &str, destination: &Path) -> Result<DownloadResponse>;
}

pub struct StoreUploader<S> {
    store: S,
}

impl<S: ArtifactStore> StoreUploader<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: ArtifactStore> ArtifactUploader for StoreUploader<S> {
    fn upload(&self, name: &str, file: &Path, retention_days: u32) -> Result<String> {
        if !file.exists() {
            return Err(Error::PathNotFound(file.to_owned()));
        }

        let root_dir = file.parent().unwrap_or(Path::new(""));
        let options = UploadOptions { retention_days };
        let response = self
            .store
            .upload_artifact(name, &[file.to_owned()], root_dir, &options)?;

        if !response.failed_items.is_empty() {
            return Err(Error::UploadFailed {
                name: name.to_owned(),
                failed_items: response.failed_items,
            });
        }

        tracing::info!(artifact = %response.artifact_name, size = response.size, "artifact uploaded");
        Ok(name.to_owned())
    }
}

pub struct StoreDownloader<S> {
    store: S,
}

impl<S: ArtifactStore> StoreDownloader<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: ArtifactStore> ArtifactDownloader for StoreDownloader<S> {
    fn download(&self, name: &str, base_dir: &Path) -> Result<PathBuf> {
        if !base_dir.exists() {
            return Err(Error::PathNotFound(base_dir.to_owned()));
        }

        let response = self.store.download_artifact(name, base_dir)?;
        tracing::info!(
            artifact = %response.artifact_name,
            path = %response.download_path.display(),
            "artifact downloaded"
        );
        Ok(response.download_path)
    }
}
