use anyhow::Context;
use clap::Parser;

use artifact::github::{GithubClient, WorkflowRunDownloader};
use artifact::{ArtifactDownloader, LocalArtifactStore, StoreDownloader, StoreUploader};
use engine::{ContainerEngine, EngineKind};
use image_artifact::ImageArtifacts;

mod args;
mod artifact;
mod engine;
mod error;
mod image_artifact;
mod logging;
mod naming;

fn image_artifacts(global: &args::GlobalArgs) -> anyhow::Result<ImageArtifacts> {
    let mut engine = ContainerEngine::new(global.engine.parse::<EngineKind>()?);
    if let Some(path) = &global.engine_path {
        engine = engine.with_program(path);
    }

    let engine_kind = engine.kind();
    let mut artifacts = ImageArtifacts::new(engine);
    if let Some(dir) = &global.dir {
        artifacts = artifacts.with_work_dir(dir);
    }
    tracing::debug!(engine = %engine_kind, work_dir = %artifacts.work_dir().display(), "configured");
    Ok(artifacts)
}

fn workflow_downloader(
    args: &args::WorkflowRunArgs,
    workflow: &str,
) -> anyhow::Result<Box<dyn ArtifactDownloader>> {
    let (owner, repo) = args.owner_repo().ok_or_else(|| {
        error::Error::Config("--repository must be given as OWNER/REPO".to_owned())
    })?;
    let client = GithubClient::new(args.token.clone())?.with_api_url(&args.api_url);
    let filter = args.run_filter();
    let downloader =
        WorkflowRunDownloader::new(client, owner, repo, workflow).with_filter(move |run| filter.matches(run));
    Ok(Box::new(downloader))
}

fn run(args: args::Args) -> anyhow::Result<()> {
    match args.command {
        args::Command::Names { image } => {
            println!("{}", naming::ImageNames::resolve(&image));
        }
        args::Command::Upload(upload) => {
            let artifacts = image_artifacts(&args.global)?;
            let uploader = StoreUploader::new(LocalArtifactStore::new(&upload.store));
            let name = artifacts
                .upload(&upload.image, &uploader, upload.retention_days)
                .with_context(|| format!("Failed to upload image {}", upload.image))?;
            println!("{name}");
        }
        args::Command::Download(download) => {
            let artifacts = image_artifacts(&args.global)?;
            let downloader: Box<dyn ArtifactDownloader> = match (&download.workflow_run.workflow, &download.store) {
                (Some(workflow), _) => workflow_downloader(&download.workflow_run, workflow)?,
                (None, Some(store)) => Box::new(StoreDownloader::new(LocalArtifactStore::new(store))),
                (None, None) => anyhow::bail!("Either --store or --workflow is required"),
            };
            let path = artifacts
                .download(&download.image, downloader.as_ref())
                .with_context(|| format!("Failed to download image {}", download.image))?;
            println!("{}", path.display());
        }
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = args::Args::parse();
    logging::init_logging(args.global.log_format)?;

    run(args)
}
