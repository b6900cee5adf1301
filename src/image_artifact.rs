use std::path::{Path, PathBuf};

use crate::artifact::{ArtifactDownloader, ArtifactUploader};
use crate::engine::ContainerEngine;
use crate::error::Result;
use crate::naming::{resolve_artifact_name, resolve_package_name};

/// Moves images between the local engine and an artifact store.
///
/// `foo:latest` is saved to `<work_dir>/foo_latest` and uploaded as
/// `action_image_artifact_foo_latest`. A later job downloads that artifact and loads
/// `<download dir>/foo_latest`.
pub struct ImageArtifacts {
    engine: ContainerEngine,
    work_dir: PathBuf,
}

impl ImageArtifacts {
    pub fn new(engine: ContainerEngine) -> Self {
        Self {
            engine,
            work_dir: std::env::temp_dir(),
        }
    }

    pub fn with_work_dir<P: Into<PathBuf>>(mut self, work_dir: P) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Package `image` and upload it, returning the artifact name.
    ///
    /// The package file stays in the work directory if the upload fails.
    pub fn upload<U>(&self, image: &str, uploader: &U, retention_days: u32) -> Result<String>
    where
        U: ArtifactUploader + ?Sized,
    {
        let package_path = self.work_dir.join(resolve_package_name(image));
        let package_path = self.engine.package_image(image, &package_path)?;
        tracing::info!(image, package = %package_path.display(), "image packaged");

        let artifact_name = resolve_artifact_name(image);
        uploader.upload(&artifact_name, &package_path, retention_days)?;
        Ok(artifact_name)
    }

    /// Download the artifact for `image` and load it, returning the package path.
    pub fn download<D>(&self, image: &str, downloader: &D) -> Result<PathBuf>
    where
        D: ArtifactDownloader + ?Sized,
    {
        let download_dir = downloader.download(&resolve_artifact_name(image), &self.work_dir)?;

        let package_path = download_dir.join(resolve_package_name(image));
        self.engine.load_image(&package_path)?;
        tracing::info!(image, package = %package_path.display(), "image loaded");
        Ok(package_path)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::cell::RefCell;
    use std::fs;

    use super::*;
    use crate::artifact::{LocalArtifactStore, StoreDownloader, StoreUploader};
    use crate::engine::EngineKind;
    use crate::engine::tests::working_engine;
    use crate::error::Error;

    fn setup(dir: &Path) -> ImageArtifacts {
        let engine = ContainerEngine::new(EngineKind::Docker).with_program(working_engine(dir));
        ImageArtifacts::new(engine).with_work_dir(dir)
    }

    #[test]
    fn test_upload() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = setup(dir.path());

        let calls = RefCell::new(Vec::new());
        let uploader = |name: &str, file: &Path, days: u32| -> Result<String> {
            calls.borrow_mut().push((name.to_owned(), file.to_owned(), days));
            Ok(name.to_owned())
        };

        let name = artifacts.upload("foo:latest", &uploader, 3).unwrap();
        assert_eq!(name, "action_image_artifact_foo_latest");
        assert_eq!(
            *calls.borrow(),
            vec![(name, dir.path().join("foo_latest"), 3)]
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("foo_latest")).unwrap(),
            "foo:latest\n"
        );
    }

    #[test]
    fn test_upload_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = setup(dir.path());

        let uploader = |name: &str, file: &Path, _days: u32| -> Result<String> {
            Err(Error::UploadFailed {
                name: name.to_owned(),
                failed_items: vec![file.to_owned()],
            })
        };

        match artifacts.upload("foo:latest", &uploader, 0) {
            Err(Error::UploadFailed { name, .. }) => assert_eq!(name, "action_image_artifact_foo_latest"),
            other => panic!("unexpected result: {other:?}"),
        }
        // The package is not cleaned up after a failed upload.
        assert!(dir.path().join("foo_latest").exists());
    }

    #[test]
    fn test_download() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = setup(dir.path());

        let fetched = dir.path().join("fetched");
        fs::create_dir(&fetched).unwrap();
        fs::write(fetched.join("my-repo_app_v1.0"), "pkg").unwrap();

        let downloader = |name: &str, base: &Path| -> Result<PathBuf> {
            assert_eq!(name, "action_image_artifact_my-repo_app_v1.0");
            assert_eq!(base, dir.path());
            Ok(base.join("fetched"))
        };

        let path = artifacts.download("my-repo/app:v1.0", &downloader).unwrap();
        assert_eq!(path, fetched.join("my-repo_app_v1.0"));

        let calls = fs::read_to_string(dir.path().join("calls.log")).unwrap();
        assert_eq!(calls, format!("load -i {}\n", path.display()));
    }

    #[test]
    fn test_download_layout_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = setup(dir.path());

        let downloader = |_name: &str, base: &Path| -> Result<PathBuf> { Ok(base.to_owned()) };

        match artifacts.download("foo:latest", &downloader) {
            Err(Error::PathNotFound(p)) => assert_eq!(p, dir.path().join("foo_latest")),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!dir.path().join("calls.log").exists());
    }

    #[test]
    fn test_round_trip_through_local_store() {
        let upload_dir = tempfile::tempdir().unwrap();
        let download_dir = tempfile::tempdir().unwrap();
        let store_dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(store_dir.path());

        let name = setup(upload_dir.path())
            .upload("foo:latest", &StoreUploader::new(store.clone()), 0)
            .unwrap();
        assert_eq!(name, "action_image_artifact_foo_latest");

        let path = setup(download_dir.path())
            .download("foo:latest", &StoreDownloader::new(store))
            .unwrap();
        assert_eq!(path, download_dir.path().join("foo_latest"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "foo:latest\n");
    }
}
