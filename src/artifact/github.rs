//! Download artifacts produced by another workflow run through the GitHub REST API.
//!
//! <https://docs.github.com/en/rest/actions/workflow-runs#list-workflow-runs-for-a-repository>
//! <https://docs.github.com/en/rest/actions/artifacts#list-workflow-run-artifacts>

use std::fs;
use std::path::{Path, PathBuf};

use reqwest::blocking::{Client, Response};
use reqwest::header;
use serde::Deserialize;

use super::ArtifactDownloader;
use crate::error::{Error, Result};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub head_branch: Option<String>,
    #[serde(default)]
    pub head_sha: String,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub conclusion: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtifactInfo {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub size_in_bytes: u64,
    #[serde(default)]
    pub expired: bool,
}

#[derive(Deserialize)]
struct WorkflowRunList {
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Deserialize)]
struct ArtifactList {
    artifacts: Vec<ArtifactInfo>,
}

/// The subset of the Actions REST API needed to fetch an artifact from a run.
pub trait WorkflowApi {
    /// Runs of the repository, newest first.
    fn list_workflow_runs(&self, owner: &str, repo: &str) -> Result<Vec<WorkflowRun>>;

    fn list_run_artifacts(&self, owner: &str, repo: &str, run_id: u64) -> Result<Vec<ArtifactInfo>>;

    /// Raw zip archive of the artifact.
    fn download_artifact_zip(&self, owner: &str, repo: &str, artifact_id: u64) -> Result<Vec<u8>>;
}

pub struct GithubClient {
    client: Client,
    api_url: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(token: Option<String>) -> Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            api_url: DEFAULT_API_URL.to_owned(),
            token,
        })
    }

    pub fn with_api_url<S: Into<String>>(mut self, api_url: S) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_owned();
        self
    }

    fn get(&self, path: &str) -> Result<Response> {
        let url = format!("{}{}", self.api_url, path);
        tracing::debug!(url = %url, "github api request");

        let mut request = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(token) = self.token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus { url, status });
        }
        Ok(response)
    }
}

impl WorkflowApi for GithubClient {
    fn list_workflow_runs(&self, owner: &str, repo: &str) -> Result<Vec<WorkflowRun>> {
        let list: WorkflowRunList = self
            .get(&format!("/repos/{owner}/{repo}/actions/runs?per_page=100"))?
            .json()?;
        Ok(list.workflow_runs)
    }

    fn list_run_artifacts(&self, owner: &str, repo: &str, run_id: u64) -> Result<Vec<ArtifactInfo>> {
        let list: ArtifactList = self
            .get(&format!("/repos/{owner}/{repo}/actions/runs/{run_id}/artifacts?per_page=100"))?
            .json()?;
        Ok(list.artifacts)
    }

    fn download_artifact_zip(&self, owner: &str, repo: &str, artifact_id: u64) -> Result<Vec<u8>> {
        // The API answers with a redirect to blob storage; reqwest drops the
        // Authorization header when following it to another host.
        let bytes = self
            .get(&format!("/repos/{owner}/{repo}/actions/artifacts/{artifact_id}/zip"))?
            .bytes()?;
        Ok(bytes.to_vec())
    }
}

/// Declarative run filter; every field that is set must match.
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub branch: Option<String>,
    pub event: Option<String>,
    pub head_sha: Option<String>,
    pub conclusion: Option<String>,
}

impl RunFilter {
    pub fn matches(&self, run: &WorkflowRun) -> bool {
        fn check(expected: &Option<String>, actual: Option<&str>) -> bool {
            expected.as_deref().is_none_or(|e| actual == Some(e))
        }

        check(&self.branch, run.head_branch.as_deref())
            && check(&self.event, Some(run.event.as_str()))
            && check(&self.head_sha, Some(run.head_sha.as_str()))
            && check(&self.conclusion, run.conclusion.as_deref())
    }
}

type RunPredicate = Box<dyn Fn(&WorkflowRun) -> bool>;

/// Downloads an artifact from the newest run of `workflow` that passes the filter.
pub struct WorkflowRunDownloader<A> {
    api: A,
    owner: String,
    repo: String,
    workflow: String,
    filter: RunPredicate,
}

impl<A: WorkflowApi> WorkflowRunDownloader<A> {
    pub fn new(api: A, owner: &str, repo: &str, workflow: &str) -> Self {
        Self {
            api,
            owner: owner.to_owned(),
            repo: repo.to_owned(),
            workflow: workflow.to_owned(),
            filter: Box::new(|_| true),
        }
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&WorkflowRun) -> bool + 'static,
    {
        self.filter = Box::new(filter);
        self
    }

    fn find_run(&self) -> Result<u64> {
        let workflow = self.workflow.trim();
        let runs = self.api.list_workflow_runs(&self.owner, &self.repo)?;
        runs.iter()
            .filter(|run| run.name.as_deref() == Some(workflow))
            .find(|run| (self.filter)(run))
            .map(|run| run.id)
            .ok_or_else(|| {
                Error::ArtifactNotFound(format!(
                    "no workflow runs for {workflow} found with provided filter"
                ))
            })
    }

    fn find_artifact(&self, run_id: u64, name: &str) -> Result<ArtifactInfo> {
        let artifacts = self.api.list_run_artifacts(&self.owner, &self.repo, run_id)?;
        artifacts
            .into_iter()
            .find(|artifact| artifact.name == name && !artifact.expired)
            .ok_or_else(|| {
                Error::ArtifactNotFound(format!(
                    "no artifact {name} found for {} in run {run_id}",
                    self.workflow.trim()
                ))
            })
    }
}

impl<A: WorkflowApi> ArtifactDownloader for WorkflowRunDownloader<A> {
    fn download(&self, name: &str, base_dir: &Path) -> Result<PathBuf> {
        let name = name.trim();
        let run_id = self.find_run()?;
        let artifact = self.find_artifact(run_id, name)?;
        tracing::info!(
            artifact = name,
            run_id,
            artifact_id = artifact.id,
            size = artifact.size_in_bytes,
            "downloading artifact from workflow run"
        );

        let data = self.api.download_artifact_zip(&self.owner, &self.repo, artifact.id)?;
        if !base_dir.exists() {
            return Err(Error::PathNotFound(base_dir.to_owned()));
        }

        let extract_dir = base_dir.join(name);
        let zip_path = base_dir.join(format!("{name}.zip"));
        fs::write(&zip_path, &data)?;
        extract_zip(&zip_path, &extract_dir)?;

        Ok(extract_dir)
    }
}

fn extract_zip(zip_path: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    archive.extract(dest)?;
    Ok(())
}
