// Copyright (c) The junit-annotate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration, read from flags or the GitHub Actions environment.
//!
//! Action inputs arrive as `INPUT_<NAME>` environment variables, and the workflow context as
//! `GITHUB_*` variables. Flags take precedence over both.

use crate::{
    checks::RepoId,
    errors::{ExpectedError, Result},
};
use camino::Utf8PathBuf;
use clap::Args;
use std::fmt;

/// The default GitHub REST API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Raw configuration, as parsed by clap.
#[derive(Clone, Debug, Default, Args)]
#[command(next_help_heading = "Action inputs")]
pub(crate) struct ActionConfig {
    /// Glob patterns for report files, one per line
    ///
    /// Blank lines and lines starting with `#` are ignored. Lines starting with `!` exclude
    /// matching files.
    #[arg(long, value_name = "PATTERNS", env = "INPUT_PATH")]
    pub(crate) path: Option<String>,

    /// Maximum number of failing or erroring tests to annotate
    #[arg(long, value_name = "N", env = "INPUT_NUMFAILURES")]
    pub(crate) num_failures: Option<String>,

    /// Token used to authenticate with the GitHub API
    #[arg(long, value_name = "TOKEN", env = "INPUT_ACCESS-TOKEN", hide_env_values = true)]
    pub(crate) access_token: Option<String>,

    /// Commit whose check run is updated [default: $GITHUB_SHA]
    #[arg(long, value_name = "SHA", env = "INPUT_COMMITSHA")]
    pub(crate) commit_sha: Option<String>,

    #[arg(long, env = "GITHUB_SHA", hide = true)]
    pub(crate) github_sha: Option<String>,

    #[command(flatten)]
    pub(crate) context: WorkflowContext,

    /// Print the check run update as JSON instead of sending it
    #[arg(long, env = "JUNIT_ANNOTATE_DRY_RUN")]
    pub(crate) dry_run: bool,
}

/// The workflow context the action runs in.
#[derive(Clone, Debug, Default, Args)]
#[command(next_help_heading = "Workflow context")]
pub(crate) struct WorkflowContext {
    /// Name of the job, which is also the name of its check run
    #[arg(long, value_name = "NAME", env = "GITHUB_JOB")]
    pub(crate) job: Option<String>,

    /// Checkout root, stripped from file paths in reports
    #[arg(long, value_name = "DIR", env = "GITHUB_WORKSPACE")]
    pub(crate) workspace: Option<Utf8PathBuf>,

    /// Repository, as `owner/name`
    #[arg(long, value_name = "OWNER/NAME", env = "GITHUB_REPOSITORY")]
    pub(crate) repository: Option<String>,

    /// Base URL of the GitHub REST API
    #[arg(long, value_name = "URL", env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    pub(crate) api_url: String,
}

/// Validated configuration for a run.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Report file patterns, one per line.
    pub patterns: String,

    /// The maximum number of case annotations.
    pub max_annotations: usize,

    /// The checkout root, if known.
    pub workspace_root: Option<Utf8PathBuf>,

    /// Where results are published.
    pub publish: Publish,
}

/// Where results are published.
#[derive(Clone, Debug)]
pub enum Publish {
    /// Print the update payload to stdout.
    DryRun,

    /// Update the check run for the job.
    CheckRun(RemoteConfig),
}

/// The check run to update and how to reach it.
#[derive(Clone)]
pub struct RemoteConfig {
    /// The repository.
    pub repo: RepoId,

    /// The commit.
    pub commit: String,

    /// The job, which names the check run.
    pub job: String,

    /// The API endpoint.
    pub api_url: String,

    /// The access token. Never logged.
    pub token: String,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("repo", &self.repo)
            .field("commit", &self.commit)
            .field("job", &self.job)
            .field("api_url", &self.api_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl ActionConfig {
    /// Validates the configuration.
    pub(crate) fn resolve(self) -> Result<RunConfig> {
        let patterns = required(self.path, "path", "--path", "INPUT_PATH")?;
        let num_failures = required(
            self.num_failures,
            "numFailures",
            "--num-failures",
            "INPUT_NUMFAILURES",
        )?;
        let max_annotations = parse_num_failures(&num_failures)?;

        // The runner sets GITHUB_WORKSPACE, but an empty value means no prefix stripping.
        let workspace_root = self
            .context
            .workspace
            .filter(|workspace| !workspace.as_str().trim().is_empty());

        let publish = if self.dry_run {
            Publish::DryRun
        } else {
            let token = required(
                self.access_token,
                "access-token",
                "--access-token",
                "INPUT_ACCESS-TOKEN",
            )?;
            let commit = match non_empty(self.commit_sha) {
                Some(commit) => commit,
                None => required(self.github_sha, "commitSha", "--commit-sha", "INPUT_COMMITSHA")?,
            };
            let job = required(self.context.job, "job", "--job", "GITHUB_JOB")?;
            let repository = required(
                self.context.repository,
                "repository",
                "--repository",
                "GITHUB_REPOSITORY",
            )?;
            let repo = repository.parse::<RepoId>().map_err(|err| {
                ExpectedError::invalid_input_with("could not parse repository", err)
            })?;

            Publish::CheckRun(RemoteConfig {
                repo,
                commit,
                job,
                api_url: self.context.api_url,
                token,
            })
        };

        Ok(RunConfig {
            patterns,
            max_annotations,
            workspace_root,
            publish,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn required(value: Option<String>, name: &str, flag: &str, env: &str) -> Result<String> {
    non_empty(value).ok_or_else(|| {
        ExpectedError::invalid_input(format!(
            "`{name}` is required (pass {flag} or set {env})"
        ))
    })
}

/// Parses the annotation limit: a non-negative integer, with surrounding whitespace allowed.
pub(crate) fn parse_num_failures(input: &str) -> Result<usize> {
    input.trim().parse::<usize>().map_err(|err| {
        ExpectedError::invalid_input_with(
            format!("`numFailures` must be a non-negative integer, got `{input}`"),
            err,
        )
    })
}
