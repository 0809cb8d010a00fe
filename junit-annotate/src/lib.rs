// Copyright (c) The junit-annotate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Publish JUnit test results as annotations on a GitHub check run.
//!
//! `junit-annotate` runs as a step in a GitHub Actions job. It finds JUnit XML reports with glob
//! patterns, reads them with [`junit_ingest`], sums up the results across every suite, and
//! replaces the output of the job's check run with a one-line summary and an annotation for each
//! of the first few failing or erroring tests.
//!
//! Inputs are read from flags or from the `INPUT_*` and `GITHUB_*` environment variables the
//! runner sets. Failures are reported as an `::error::` workflow command on stdout and exit with
//! one of the codes in [`AnnotateExitCode`].

#![warn(missing_docs)]

pub mod aggregate;
pub mod checks;
mod config;
mod dispatch;
mod errors;
mod exit_codes;
pub mod locate;
mod output;

pub use config::{DEFAULT_API_URL, Publish, RemoteConfig, RunConfig};
#[doc(hidden)]
pub use dispatch::*;
pub use errors::ExpectedError;
pub use exit_codes::AnnotateExitCode;
pub use output::{OutputWriter, error_command};
