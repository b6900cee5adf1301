use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::artifact::github::{DEFAULT_API_URL, RunFilter};
use crate::logging::LogFormat;

/// Move container images between CI jobs as build artifacts.
#[derive(Parser)]
#[command(version)]
pub struct Args {
    #[clap(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the package and artifact names derived from an image
    Names {
        image: String,
    },
    /// Save an image and upload it as an artifact; prints the artifact name
    Upload(UploadArgs),
    /// Download an image artifact and load it; prints the package path
    Download(DownloadArgs),
}

#[derive(ClapArgs)]
pub struct GlobalArgs {
    /// container engine: docker or podman
    #[clap(long, env = "IMAGE_ARTIFACT_ENGINE", default_value = "docker", global = true)]
    pub engine: String,

    /// engine executable, instead of looking it up on PATH
    #[clap(long, env = "IMAGE_ARTIFACT_ENGINE_PATH", global = true)]
    pub engine_path: Option<PathBuf>,

    /// directory for image packages [default: system temp dir]
    #[clap(long, env = "IMAGE_ARTIFACT_DIR", global = true)]
    pub dir: Option<PathBuf>,

    /// log output format
    #[clap(long, env = "IMAGE_ARTIFACT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,
}

#[derive(ClapArgs)]
pub struct UploadArgs {
    pub image: String,

    /// artifact store directory
    #[clap(long, env = "IMAGE_ARTIFACT_STORE")]
    pub store: PathBuf,

    /// days to keep the artifact, 0 for the store default
    #[clap(long, default_value_t = 0)]
    pub retention_days: u32,
}

#[derive(ClapArgs)]
pub struct DownloadArgs {
    pub image: String,

    /// artifact store directory, ignored when --workflow is given
    #[clap(long, env = "IMAGE_ARTIFACT_STORE", required_unless_present = "workflow")]
    pub store: Option<PathBuf>,

    #[clap(flatten)]
    pub workflow_run: WorkflowRunArgs,
}

#[derive(ClapArgs)]
pub struct WorkflowRunArgs {
    /// download from the newest run of this workflow instead of a store
    #[clap(long)]
    pub workflow: Option<String>,

    /// repository as OWNER/REPO
    #[clap(long, env = "GITHUB_REPOSITORY")]
    pub repository: Option<String>,

    #[clap(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[clap(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// only consider runs on this branch
    #[clap(long, requires = "workflow")]
    pub branch: Option<String>,

    /// only consider runs triggered by this event
    #[clap(long, requires = "workflow")]
    pub event: Option<String>,

    /// only consider runs for this commit
    #[clap(long, requires = "workflow")]
    pub sha: Option<String>,

    /// only consider runs with this conclusion, e.g. success
    #[clap(long, requires = "workflow")]
    pub conclusion: Option<String>,
}

impl WorkflowRunArgs {
    pub fn run_filter(&self) -> RunFilter {
        RunFilter {
            branch: self.branch.clone(),
            event: self.event.clone(),
            head_sha: self.sha.clone(),
            conclusion: self.conclusion.clone(),
        }
    }

    pub fn owner_repo(&self) -> Option<(&str, &str)> {
        let (owner, repo) = self.repository.as_deref()?.split_once('/')?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some((owner, repo))
    }
}
