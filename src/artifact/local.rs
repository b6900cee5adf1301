//! Directory-backed artifact store.
//!
//! Layout below the store root:
//!
//! ```text
//! <root>/<name>.json        metadata (files, sizes, digests, retention)
//! <root>/<name>/<relpath>   stored files
//! ```

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use super::hashfile::HashedFile;
use super::{ArtifactStore, DownloadResponse, UploadOptions, UploadResponse};
use crate::error::{Error, Result};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactMetadata {
    name: String,
    retention_days: u32,
    created_at: u64,
    files: Vec<StoredFile>,
}

impl ArtifactMetadata {
    fn is_expired(&self, now: u64) -> bool {
        self.retention_days > 0
            && now > self
                .created_at
                .saturating_add(u64::from(self.retention_days).saturating_mul(SECONDS_PER_DAY))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredFile {
    path: PathBuf,
    size: u64,
    digest: String,
}

#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn artifact_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn metadata_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }

    fn read_metadata(&self, name: &str) -> Result<ArtifactMetadata> {
        let file = match fs::File::open(self.metadata_path(name)) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::ArtifactNotFound(format!(
                    "no artifact {name} in {}",
                    self.root.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_reader(io::BufReader::new(file))?)
    }

    fn write_metadata(&self, metadata: &ArtifactMetadata) -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        serde_json::to_writer_pretty(&mut tmp, metadata)?;
        tmp.persist(self.metadata_path(&metadata.name))
            .map_err(|e| e.error)?;
        Ok(())
    }

    /// Move the staged files to `<root>/<name>`, dropping the previous contents.
    fn replace_artifact(&self, name: &str, staged: &Path) -> Result<()> {
        let dir = self.artifact_dir(name);
        let trash = tempfile::TempDir::new_in(&self.root)?;
        if dir.exists() {
            fs::rename(&dir, trash.path().join(name))?;
        }
        fs::rename(staged, &dir)?;
        Ok(())
    }
}

impl ArtifactStore for LocalArtifactStore {
    fn upload_artifact(
        &self,
        name: &str,
        files: &[PathBuf],
        root_dir: &Path,
        options: &UploadOptions,
    ) -> Result<UploadResponse> {
        fs::create_dir_all(&self.root)?;
        let staging = tempfile::TempDir::new_in(&self.root)?;

        let mut stored = Vec::new();
        let mut failed_items = Vec::new();
        let mut size = 0;

        for file in expand_files(files, &mut failed_items) {
            let Some(relative) = relative_path(&file, root_dir) else {
                tracing::warn!(file = %file.display(), root = %root_dir.display(), "file is outside the artifact root");
                failed_items.push(file);
                continue;
            };

            let dest = staging.path().join(&relative);
            let copied = copy_hashed(&file, &dest)
                .and_then(|(tmp, file_size, digest)| persist(tmp, &dest).map(|()| (file_size, digest)));
            match copied {
                Ok((file_size, digest)) => {
                    size += file_size;
                    stored.push(StoredFile {
                        path: relative,
                        size: file_size,
                        digest,
                    });
                }
                Err(e) => {
                    tracing::warn!(file = %file.display(), error = %e, "failed to store file");
                    failed_items.push(file);
                }
            }
        }

        // A partial upload leaves any previous artifact of the same name in place.
        if failed_items.is_empty() {
            self.replace_artifact(name, staging.path())?;
            self.write_metadata(&ArtifactMetadata {
                name: name.to_owned(),
                retention_days: options.retention_days,
                created_at: now(),
                files: stored,
            })?;
        }

        Ok(UploadResponse {
            artifact_name: name.to_owned(),
            size,
            failed_items,
        })
    }

    fn download_artifact(&self, name: &str, destination: &Path) -> Result<DownloadResponse> {
        let metadata = self.read_metadata(name)?;
        if metadata.is_expired(now()) {
            return Err(Error::ArtifactNotFound(format!(
                "artifact {name} expired after {} days",
                metadata.retention_days
            )));
        }

        let dir = self.artifact_dir(name);
        let mut verified = Vec::with_capacity(metadata.files.len());
        for file in &metadata.files {
            if !is_normal_relative(&file.path) {
                return Err(Error::Integrity { path: dir.join(&file.path) });
            }
            let target = destination.join(&file.path);
            let (tmp, _, digest) = copy_hashed(&dir.join(&file.path), &target)?;
            if digest != file.digest {
                return Err(Error::Integrity { path: target });
            }
            verified.push((tmp, target));
        }

        for (tmp, target) in verified {
            persist(tmp, &target)?;
        }

        Ok(DownloadResponse {
            artifact_name: name.to_owned(),
            download_path: destination.to_owned(),
        })
    }
}

/// Directories are replaced by the regular files below them.
fn expand_files(files: &[PathBuf], failed_items: &mut Vec<PathBuf>) -> Vec<PathBuf> {
    let mut expanded = Vec::new();
    for file in files {
        if !file.is_dir() {
            expanded.push(file.clone());
            continue;
        }
        for entry in WalkDir::new(file).sort_by_file_name() {
            match entry {
                Ok(e) if e.file_type().is_file() => expanded.push(e.into_path()),
                Ok(_) => {}
                Err(e) => failed_items.push(e.path().unwrap_or(file.as_path()).to_owned()),
            }
        }
    }
    expanded
}

fn relative_path(file: &Path, root_dir: &Path) -> Option<PathBuf> {
    let relative = file.strip_prefix(root_dir).ok()?;
    is_normal_relative(relative).then(|| relative.to_owned())
}

fn is_normal_relative(path: &Path) -> bool {
    path.file_name().is_some() && path.components().all(|c| matches!(c, Component::Normal(_)))
}

/// Copy `src` into a temporary file next to `dest`, returning it with the size and
/// digest of the copied bytes. Nothing is written at `dest` until [`persist`].
fn copy_hashed(src: &Path, dest: &Path) -> io::Result<(NamedTempFile, u64, String)> {
    let parent = dest.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;

    let mut reader = fs::File::open(src)?;
    let mut writer = HashedFile::new(NamedTempFile::new_in(parent)?);
    io::copy(&mut reader, &mut writer)?;

    writer.finish()
}

fn persist(tmp: NamedTempFile, dest: &Path) -> io::Result<()> {
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
