// Copyright (c) The junit-annotate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Find the check run for the current job and overwrite its output.
//!
//! Check runs are never created here: the run for a job already exists by the time the job's
//! steps execute, and only its output is replaced.

use crate::aggregate::{Aggregate, Annotation, AnnotationLevel};
use serde::{Deserialize, Serialize};
use std::{fmt, num::NonZeroU32, str::FromStr, time::Duration};
use thiserror::Error;
use tracing::{debug, info, warn};

/// The title of the check run output, also used for the run-summary annotation.
pub const OUTPUT_TITLE: &str = "JUnit Results";

/// The synthetic path the run-summary annotation is attached to.
pub const SUMMARY_ANNOTATION_PATH: &str = "test";

/// The maximum number of annotations GitHub accepts in a single update.
pub const MAX_ANNOTATIONS_PER_UPDATE: usize = 50;

/// A repository on GitHub, parsed from `owner/name`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RepoId {
    /// The user or organization that owns the repository.
    pub owner: String,

    /// The name of the repository.
    pub name: String,
}

impl FromStr for RepoId {
    type Err = ParseRepoIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self {
                    owner: owner.to_owned(),
                    name: name.to_owned(),
                })
            }
            _ => Err(ParseRepoIdError {
                input: s.to_owned(),
            }),
        }
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// An error that occurred while parsing a [`RepoId`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("invalid repository `{input}`: expected `owner/name`")]
pub struct ParseRepoIdError {
    input: String,
}

/// A check run as returned by the GitHub API.
///
/// Only the fields used here are deserialized.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct CheckRun {
    /// The check run's ID.
    pub id: u64,

    /// The check run's name. For runs created by GitHub Actions, this is the job name.
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct CheckRunList {
    check_runs: Vec<CheckRun>,
}

/// The output written to a check run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CheckRunOutput {
    /// The title of the output.
    pub title: String,

    /// The summary shown at the top of the check run.
    pub summary: String,

    /// Annotations, with the run-summary annotation first.
    pub annotations: Vec<OutputAnnotation>,
}

impl CheckRunOutput {
    /// Builds the output for an aggregated run.
    ///
    /// The overall level is computed from the final totals only.
    pub fn from_aggregate(aggregate: &Aggregate) -> Self {
        let summary = aggregate.summary.to_string();
        let summary_annotation = OutputAnnotation {
            path: SUMMARY_ANNOTATION_PATH.to_owned(),
            start_line: NonZeroU32::MIN,
            end_line: NonZeroU32::MIN,
            annotation_level: aggregate.summary.level(),
            title: Some(OUTPUT_TITLE.to_owned()),
            message: summary.clone(),
        };

        let annotations = std::iter::once(summary_annotation)
            .chain(aggregate.annotations.iter().map(OutputAnnotation::from))
            .collect();

        Self {
            title: OUTPUT_TITLE.to_owned(),
            summary,
            annotations,
        }
    }
}

/// An annotation in the form the GitHub API expects.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct OutputAnnotation {
    /// The path of the file, relative to the repository root.
    pub path: String,

    /// The first line of the annotation.
    pub start_line: NonZeroU32,

    /// The last line of the annotation.
    pub end_line: NonZeroU32,

    /// The severity.
    #[serde(serialize_with = "serialize_level")]
    pub annotation_level: AnnotationLevel,

    /// A short title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// The annotation text.
    pub message: String,
}

impl From<&Annotation> for OutputAnnotation {
    fn from(annotation: &Annotation) -> Self {
        Self {
            path: annotation.path.clone(),
            start_line: annotation.line,
            end_line: annotation.line,
            annotation_level: annotation.level,
            title: annotation.title.clone(),
            message: annotation.message.clone(),
        }
    }
}

fn serialize_level<S: serde::Serializer>(
    level: &AnnotationLevel,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(level.as_str())
}

#[derive(Serialize)]
struct UpdateCheckRun<'a> {
    output: &'a CheckRunOutput,
}

/// Access to check runs.
///
/// Implemented by [`GitHubClient`] for the real API.
pub trait CheckRunClient {
    /// Lists the check runs named `check_name` for `git_ref`.
    fn list_for_ref(
        &self,
        repo: &RepoId,
        git_ref: &str,
        check_name: &str,
    ) -> Result<Vec<CheckRun>, CheckRunClientError>;

    /// Replaces the output of the given check run.
    fn update(
        &self,
        repo: &RepoId,
        check_run_id: u64,
        output: &CheckRunOutput,
    ) -> Result<(), CheckRunClientError>;
}

/// An error returned by a [`CheckRunClient`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CheckRunClientError {
    /// The request could not be sent, or the response could not be read.
    #[error("request to `{url}` failed")]
    Transport {
        /// The URL requested.
        url: String,

        /// The underlying error.
        #[source]
        err: Box<ureq::Error>,
    },

    /// The server returned an unsuccessful status.
    #[error("request to `{url}` returned HTTP {status}: {body}")]
    Status {
        /// The URL requested.
        url: String,

        /// The HTTP status code.
        status: u16,

        /// The response body, for diagnostics.
        body: String,
    },
}

/// A [`CheckRunClient`] that talks to the GitHub REST API.
pub struct GitHubClient {
    agent: ureq::Agent,
    api_url: String,
    token: String,
}

impl GitHubClient {
    const TIMEOUT: Duration = Duration::from_secs(60);
    const API_VERSION: &'static str = "2022-11-28";
    const USER_AGENT: &'static str = concat!("junit-annotate/", env!("CARGO_PKG_VERSION"));

    /// Creates a new client for the API at `api_url`, authenticating with `token`.
    pub fn new(api_url: &str, token: impl Into<String>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Self::TIMEOUT))
            .http_status_as_error(false)
            .build();

        Self {
            agent: config.into(),
            api_url: api_url.trim_end_matches('/').to_owned(),
            token: token.into(),
        }
    }

    fn authorization(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn check_status(
        url: &str,
        response: &mut ureq::http::Response<ureq::Body>,
    ) -> Result<(), CheckRunClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response
            .body_mut()
            .read_to_string()
            .unwrap_or_else(|err| format!("(failed to read response body: {err})"));
        Err(CheckRunClientError::Status {
            url: url.to_owned(),
            status: status.as_u16(),
            body,
        })
    }
}

impl fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the token.
        f.debug_struct("GitHubClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl CheckRunClient for GitHubClient {
    fn list_for_ref(
        &self,
        repo: &RepoId,
        git_ref: &str,
        check_name: &str,
    ) -> Result<Vec<CheckRun>, CheckRunClientError> {
        let url = format!(
            "{}/repos/{}/{}/commits/{git_ref}/check-runs",
            self.api_url, repo.owner, repo.name
        );
        debug!("listing check runs: GET {url} (check_name={check_name})");

        let transport = |err| CheckRunClientError::Transport {
            url: url.clone(),
            err: Box::new(err),
        };

        let mut response = self
            .agent
            .get(&url)
            .header("Authorization", self.authorization())
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", Self::API_VERSION)
            .header("User-Agent", Self::USER_AGENT)
            .query("check_name", check_name)
            .query("per_page", "100")
            .call()
            .map_err(transport)?;
        Self::check_status(&url, &mut response)?;

        let list: CheckRunList = response.body_mut().read_json().map_err(transport)?;
        Ok(list.check_runs)
    }

    fn update(
        &self,
        repo: &RepoId,
        check_run_id: u64,
        output: &CheckRunOutput,
    ) -> Result<(), CheckRunClientError> {
        let url = format!(
            "{}/repos/{}/{}/check-runs/{check_run_id}",
            self.api_url, repo.owner, repo.name
        );
        debug!(
            "updating check run: PATCH {url} ({} annotations)",
            output.annotations.len()
        );

        let mut response = self
            .agent
            .patch(&url)
            .header("Authorization", self.authorization())
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", Self::API_VERSION)
            .header("User-Agent", Self::USER_AGENT)
            .send_json(UpdateCheckRun { output })
            .map_err(|err| CheckRunClientError::Transport {
                url: url.clone(),
                err: Box::new(err),
            })?;
        Self::check_status(&url, &mut response)
    }
}

/// Identifies the check run to update.
#[derive(Clone, Debug)]
pub struct CheckRunTarget<'a> {
    /// The repository the commit lives in.
    pub repo: &'a RepoId,

    /// The commit the check run is attached to.
    pub commit: &'a str,

    /// The job name, which is also the check run's name.
    pub job: &'a str,
}

/// An error that occurred while reconciling output with a check run.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Listing check runs failed.
    #[error("failed to list check runs for commit `{commit}`")]
    Lookup {
        /// The commit.
        commit: String,

        /// The underlying error.
        #[source]
        err: CheckRunClientError,
    },

    /// No check run matched the job.
    #[error("no check run named `{job}` found for commit `{commit}`")]
    NotFound {
        /// The job name.
        job: String,

        /// The commit.
        commit: String,
    },

    /// Updating the check run failed.
    #[error("failed to update check run {check_run_id}")]
    Update {
        /// The check run.
        check_run_id: u64,

        /// The underlying error.
        #[source]
        err: CheckRunClientError,
    },
}

/// Finds the check run for `target`.
///
/// If several runs match, the first one is used.
pub fn find_check_run(
    client: &dyn CheckRunClient,
    target: &CheckRunTarget<'_>,
) -> Result<CheckRun, ReconcileError> {
    let runs = client
        .list_for_ref(target.repo, target.commit, target.job)
        .map_err(|err| ReconcileError::Lookup {
            commit: target.commit.to_owned(),
            err,
        })?;

    // The API filters by name already, but filter again so a client that ignores the filter
    // can't select the wrong run.
    let mut matching = runs.into_iter().filter(|run| run.name == target.job);
    let Some(first) = matching.next() else {
        return Err(ReconcileError::NotFound {
            job: target.job.to_owned(),
            commit: target.commit.to_owned(),
        });
    };

    let others = matching.count();
    if others > 0 {
        warn!(
            "found {} check runs named `{}` for commit `{}`, using the first (id {})",
            others + 1,
            target.job,
            target.commit,
            first.id,
        );
    }
    Ok(first)
}

/// Writes `output` to the check run for `target`, returning the ID of the updated run.
///
/// This is the only remote side effect of a run.
pub fn reconcile(
    client: &dyn CheckRunClient,
    target: &CheckRunTarget<'_>,
    output: &CheckRunOutput,
) -> Result<u64, ReconcileError> {
    let run = find_check_run(client, target)?;
    info!(
        "updating check run `{}` (id {}) for {}@{}",
        run.name, run.id, target.repo, target.commit
    );

    if output.annotations.len() > MAX_ANNOTATIONS_PER_UPDATE {
        warn!(
            "{} annotations exceed the limit of {MAX_ANNOTATIONS_PER_UPDATE} per update; \
             GitHub may reject the update",
            output.annotations.len(),
        );
    }

    client
        .update(target.repo, run.id, output)
        .map_err(|err| ReconcileError::Update {
            check_run_id: run.id,
            err,
        })?;
    Ok(run.id)
}
