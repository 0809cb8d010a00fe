// Copyright (c) The junit-annotate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    checks::{CheckRunClientError, ReconcileError},
    exit_codes::AnnotateExitCode,
    locate::LocateError,
    output::NO_HEADING,
};
use camino::Utf8PathBuf;
use junit_ingest::ParseReportError;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

/// An error that ends a run.
///
/// Every variant is reported through both stderr and the workflow failure channel, and maps to a
/// distinct exit code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExpectedError {
    /// The configuration was missing or invalid.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// What was wrong.
        message: String,

        /// The underlying error, if any.
        #[source]
        err: Option<Box<dyn Error + Send + Sync>>,
    },

    /// Report files could not be located.
    #[error("failed to locate report files")]
    LocateFailed {
        /// The underlying error.
        #[source]
        err: LocateError,
    },

    /// A report file could not be read.
    #[error("failed to read report `{path}`")]
    ReportReadFailed {
        /// The report path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// A report file was not well-formed XML.
    #[error("failed to parse report `{path}`")]
    ReportParseFailed {
        /// The report path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: ParseReportError,
    },

    /// Listing check runs failed.
    #[error("failed to look up check runs for commit `{commit}`")]
    CheckRunLookupFailed {
        /// The commit.
        commit: String,

        /// The underlying error.
        #[source]
        err: CheckRunClientError,
    },

    /// No check run exists for the job.
    #[error("no check run named `{job}` found for commit `{commit}`")]
    CheckRunNotFound {
        /// The job name.
        job: String,

        /// The commit.
        commit: String,
    },

    /// Updating the check run failed.
    #[error("failed to update check run {check_run_id}")]
    CheckRunUpdateFailed {
        /// The check run.
        check_run_id: u64,

        /// The underlying error.
        #[source]
        err: CheckRunClientError,
    },

    /// Writing to stdout failed.
    #[error("failed to write output")]
    WriteOutputFailed {
        /// The underlying error.
        #[source]
        err: std::io::Error,
    },
}

impl ExpectedError {
    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            err: None,
        }
    }

    pub(crate) fn invalid_input_with(
        message: impl Into<String>,
        err: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self::InvalidInput {
            message: message.into(),
            err: Some(err.into()),
        }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::InvalidInput { .. } => AnnotateExitCode::INVALID_INPUT,
            Self::LocateFailed { .. } => AnnotateExitCode::LOCATE_FAILED,
            Self::ReportReadFailed { .. } => AnnotateExitCode::REPORT_READ_FAILED,
            Self::ReportParseFailed { .. } => AnnotateExitCode::REPORT_PARSE_FAILED,
            Self::CheckRunLookupFailed { .. } => AnnotateExitCode::CHECK_RUN_LOOKUP_FAILED,
            Self::CheckRunNotFound { .. } => AnnotateExitCode::CHECK_RUN_NOT_FOUND,
            Self::CheckRunUpdateFailed { .. } => AnnotateExitCode::CHECK_RUN_UPDATE_FAILED,
            Self::WriteOutputFailed { .. } => AnnotateExitCode::WRITE_OUTPUT_ERROR,
        }
    }

    /// Returns the message for the workflow failure channel: this error followed by its causes.
    pub fn failure_message(&self) -> String {
        let mut message = self.to_string();
        let mut next_error = self.source();
        while let Some(err) = next_error {
            message.push_str("\nCaused by:\n  ");
            message.push_str(&err.to_string());
            next_error = err.source();
        }
        message
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self) {
        let mut next_error = match self {
            Self::InvalidInput { message, err } => {
                error!("invalid input: {message}");
                err.as_deref().map(|err| err as &dyn Error)
            }
            Self::LocateFailed { err } => {
                error!("failed to locate report files");
                Some(err as &dyn Error)
            }
            Self::ReportReadFailed { path, err } => {
                error!("failed to read report `{path}`");
                Some(err as &dyn Error)
            }
            Self::ReportParseFailed { path, err } => {
                error!("report `{path}` is not well-formed XML");
                Some(err as &dyn Error)
            }
            Self::CheckRunLookupFailed { commit, err } => {
                error!("failed to look up check runs for commit `{commit}`");
                Some(err as &dyn Error)
            }
            Self::CheckRunNotFound { job, commit } => {
                error!(
                    "no check run named `{job}` found for commit `{commit}` \
                     (is the job name correct?)"
                );
                None
            }
            Self::CheckRunUpdateFailed { check_run_id, err } => {
                error!("failed to update check run {check_run_id}");
                Some(err as &dyn Error)
            }
            Self::WriteOutputFailed { err } => {
                error!("failed to write output");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}

impl From<ReconcileError> for ExpectedError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Lookup { commit, err } => Self::CheckRunLookupFailed { commit, err },
            ReconcileError::NotFound { job, commit } => Self::CheckRunNotFound { job, commit },
            ReconcileError::Update { check_run_id, err } => {
                Self::CheckRunUpdateFailed { check_run_id, err }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn failure_message_includes_causes() {
        let err = ExpectedError::CheckRunUpdateFailed {
            check_run_id: 42,
            err: CheckRunClientError::Status {
                url: "https://api.github.com/repos/o/r/check-runs/42".to_owned(),
                status: 422,
                body: "Validation Failed".to_owned(),
            },
        };
        assert_eq!(
            err.failure_message(),
            "failed to update check run 42\n\
             Caused by:\n  \
             request to `https://api.github.com/repos/o/r/check-runs/42` returned HTTP 422: \
             Validation Failed"
        );
    }

    #[test]
    fn not_found_has_no_causes() {
        let err: ExpectedError = ReconcileError::NotFound {
            job: "test".to_owned(),
            commit: "abc123".to_owned(),
        }
        .into();
        assert_eq!(
            err.failure_message(),
            "no check run named `test` found for commit `abc123`"
        );
        assert_eq!(
            err.process_exit_code(),
            AnnotateExitCode::CHECK_RUN_NOT_FOUND
        );
    }

    #[test]
    fn exit_codes_are_distinct() {
        let errors = [
            ExpectedError::invalid_input("x"),
            ExpectedError::LocateFailed {
                err: LocateError::CurrentDir(std::io::Error::other("x")),
            },
            ExpectedError::ReportReadFailed {
                path: "r.xml".into(),
                err: std::io::Error::other("x"),
            },
            ExpectedError::ReportParseFailed {
                path: "r.xml".into(),
                err: ParseReportError::NoRootElement,
            },
            ExpectedError::CheckRunLookupFailed {
                commit: "c".to_owned(),
                err: CheckRunClientError::Status {
                    url: "u".to_owned(),
                    status: 500,
                    body: String::new(),
                },
            },
            ExpectedError::CheckRunNotFound {
                job: "j".to_owned(),
                commit: "c".to_owned(),
            },
            ExpectedError::CheckRunUpdateFailed {
                check_run_id: 1,
                err: CheckRunClientError::Status {
                    url: "u".to_owned(),
                    status: 500,
                    body: String::new(),
                },
            },
            ExpectedError::WriteOutputFailed {
                err: std::io::Error::other("x"),
            },
        ];

        let mut codes: Vec<_> = errors.iter().map(ExpectedError::process_exit_code).collect();
        assert!(codes.iter().all(|&code| code != 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
