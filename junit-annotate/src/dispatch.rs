// Copyright (c) The junit-annotate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command-line entry point and the run pipeline.

use crate::{
    aggregate::{Aggregate, Aggregator},
    checks::{CheckRunClient, CheckRunOutput, CheckRunTarget, GitHubClient, reconcile},
    config::{ActionConfig, Publish, RemoteConfig, RunConfig},
    errors::{ExpectedError, Result},
    exit_codes::AnnotateExitCode,
    locate::{LocateError, ReportLocator},
    output::{Color, OutputOpts, OutputWriter, clap_styles, error_command},
};
use camino::Utf8PathBuf;
use clap::Parser;
use junit_ingest::{NormalizeOptions, parse_report};
use std::io::Write;
use tracing::{debug, info, warn};

/// Publish JUnit test results as annotations on a GitHub check run.
///
/// Reads every report matching the given patterns, sums up the results, and replaces the output
/// of the check run for the current job with a summary and one annotation per failing test.
#[derive(Debug, Parser)]
#[command(
    version,
    styles = clap_styles::style(),
    max_term_width = 100,
)]
pub struct AnnotateApp {
    #[command(flatten)]
    output: OutputOpts,

    #[command(flatten)]
    config: ActionConfig,
}

impl AnnotateApp {
    /// Sets up logging.
    pub fn init_output(&self) {
        self.output.init();
    }

    /// Executes the app.
    ///
    /// Returns the exit code.
    pub fn exec(self, output_writer: &mut OutputWriter) -> Result<i32> {
        let config = self.config.resolve()?;
        let locator = ReportLocator::from_current_dir(&config.patterns)
            .map_err(|err| ExpectedError::LocateFailed { err })?;

        run(&config, &locator, output_writer)?;
        Ok(AnnotateExitCode::OK)
    }
}

/// Runs the pipeline: aggregate every report, then publish the result.
///
/// Nothing remote is touched until every report has been read.
pub(crate) fn run(
    config: &RunConfig,
    locator: &ReportLocator,
    output_writer: &mut OutputWriter,
) -> Result<Aggregate> {
    if locator.is_empty() {
        warn!("`path` has no patterns, only blank lines and comments");
    }
    let aggregate = collect_reports(locator.files(), config)?;
    let output = CheckRunOutput::from_aggregate(&aggregate);

    match &config.publish {
        Publish::DryRun => write_dry_run(&output, output_writer)?,
        Publish::CheckRun(remote) => {
            let client = GitHubClient::new(&remote.api_url, remote.token.as_str());
            update_check_run(&client, remote, &output)?;
        }
    }

    Ok(aggregate)
}

/// Reads, parses and aggregates reports one at a time, in the order `files` produces them.
pub(crate) fn collect_reports(
    files: impl Iterator<Item = Result<Utf8PathBuf, LocateError>>,
    config: &RunConfig,
) -> Result<Aggregate> {
    let mut options = NormalizeOptions::new();
    if let Some(workspace_root) = &config.workspace_root {
        options.set_workspace_root(workspace_root.clone());
    }

    let mut aggregator = Aggregator::new(config.max_annotations);
    let mut file_count = 0_usize;

    for path in files {
        let path = path.map_err(|err| ExpectedError::LocateFailed { err })?;
        debug!("reading report {path}");

        let contents = fs_err::read(&path).map_err(|err| ExpectedError::ReportReadFailed {
            path: path.clone(),
            err,
        })?;
        let suites = parse_report(&contents, &options).map_err(|err| {
            ExpectedError::ReportParseFailed {
                path: path.clone(),
                err,
            }
        })?;
        if suites.is_empty() {
            debug!("{path}: no test suites found");
        }

        let report_path = options.relativize(path.as_str());
        aggregator.add_suites(&report_path, &suites);
        file_count += 1;
    }

    let aggregate = aggregator.finish();
    if file_count == 0 {
        warn!("no report files matched the given patterns");
    }
    info!(
        "read {file_count} report files ({} suites): {}",
        aggregate.suite_count, aggregate.summary
    );
    if aggregate.omitted_annotations > 0 {
        info!(
            "annotated the first {} failing tests, {} more not annotated",
            aggregate.annotations.len(),
            aggregate.omitted_annotations,
        );
    }

    Ok(aggregate)
}

fn write_dry_run(output: &CheckRunOutput, output_writer: &mut OutputWriter) -> Result<()> {
    let mut writer = output_writer.stdout_writer();
    write_json(&mut writer, output).map_err(|err| ExpectedError::WriteOutputFailed { err })
}

fn write_json(writer: &mut impl Write, output: &CheckRunOutput) -> std::io::Result<()> {
    serde_json::to_writer_pretty(&mut *writer, output)?;
    writeln!(writer)?;
    writer.flush()
}

/// Writes `output` to the check run described by `remote`.
pub(crate) fn update_check_run(
    client: &dyn CheckRunClient,
    remote: &RemoteConfig,
    output: &CheckRunOutput,
) -> Result<u64> {
    let target = CheckRunTarget {
        repo: &remote.repo,
        commit: &remote.commit,
        job: &remote.job,
    };
    let check_run_id = reconcile(client, &target, output)?;
    info!("check run {check_run_id} updated");
    Ok(check_run_id)
}

/// Reports a failure on the workflow failure channel (stdout) and on stderr.
fn report_failure(err: &ExpectedError, output_writer: &mut OutputWriter) {
    let mut writer = output_writer.stdout_writer();
    // The process is exiting with an error either way.
    let _ = writeln!(writer, "{}", error_command(&err.failure_message()));
    let _ = writer.flush();
    drop(writer);

    err.display_to_stderr();
}

/// Main entry point.
pub fn main_impl() -> ! {
    let mut output_writer = OutputWriter::default();

    match AnnotateApp::try_parse() {
        Ok(app) => {
            app.init_output();
            match app.exec(&mut output_writer) {
                Ok(code) => std::process::exit(code),
                Err(err) => {
                    report_failure(&err, &mut output_writer);
                    std::process::exit(err.process_exit_code())
                }
            }
        }
        Err(err) => std::process::exit(handle_clap_error(err, &mut output_writer)),
    }
}

fn handle_clap_error(err: clap::Error, output_writer: &mut OutputWriter) -> i32 {
    use clap::error::ErrorKind;

    match err.kind() {
        ErrorKind::DisplayHelp
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        | ErrorKind::DisplayVersion => {
            // Printing help can only fail if stdout is closed.
            let _ = err.print();
            err.exit_code()
        }
        _ => {
            Color::Auto.init(false);
            let err = ExpectedError::invalid_input_with("could not parse arguments", err);
            report_failure(&err, output_writer);
            err.process_exit_code()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aggregate::Summary,
        checks::{CheckRun, CheckRunClientError, RepoId},
    };
    use camino_tempfile::Utf8TempDir;
    use clap::CommandFactory;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    static REPORT_A: &str = indoc! {r#"
        <?xml version="1.0" encoding="UTF-8"?>
        <testsuites>
            <testsuite name="a" tests="3" failures="1" errors="0" skipped="0" time="1.2">
                <testcase name="testA0" file="src/a_test"/>
                <testcase name="testA" file="src/a_test" line="10">
                    <failure message="expected 1, got 2">assert failed at a_test:10</failure>
                </testcase>
                <testcase name="testA2" file="src/a_test"/>
            </testsuite>
        </testsuites>
    "#};

    static REPORT_B: &str = indoc! {r#"
        <testsuite name="b" tests="2" failures="0" errors="1" skipped="1" time="0.5">
            <testcase name="testB" line="5">
                <error message="boom">panicked</error>
            </testcase>
            <testcase name="testB1"><skipped/></testcase>
        </testsuite>
    "#};

    fn workspace(files: &[(&str, &str)]) -> Utf8TempDir {
        let dir = camino_tempfile::Builder::new()
            .prefix("junit-annotate-dispatch")
            .tempdir()
            .expect("tempdir created");
        for (name, contents) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                fs_err::create_dir_all(parent).expect("parent created");
            }
            fs_err::write(&path, contents).expect("report written");
        }
        dir
    }

    fn dry_run_config(dir: &Utf8TempDir, max_annotations: usize) -> RunConfig {
        RunConfig {
            patterns: "reports/*.xml".to_owned(),
            max_annotations,
            workspace_root: Some(dir.path().to_owned()),
            publish: Publish::DryRun,
        }
    }

    fn test_writer() -> OutputWriter {
        OutputWriter::Test { stdout: Vec::new() }
    }

    #[test]
    fn verify_app() {
        AnnotateApp::command().debug_assert();
    }

    #[test]
    fn two_reports_dry_run() {
        let dir = workspace(&[("reports/a.xml", REPORT_A), ("reports/b.xml", REPORT_B)]);
        let config = dry_run_config(&dir, 5);
        let locator = ReportLocator::new(&config.patterns, dir.path()).expect("valid patterns");
        let mut writer = test_writer();

        let aggregate = run(&config, &locator, &mut writer).expect("run succeeds");
        assert_eq!(aggregate.summary.tests, 5);
        assert_eq!(aggregate.summary.failed, 1);
        assert_eq!(aggregate.summary.errored, 1);
        assert_eq!(aggregate.summary.skipped, 1);
        assert!((aggregate.summary.duration_seconds - 1.7).abs() < 1e-9);

        let printed: serde_json::Value =
            serde_json::from_str(writer.captured_stdout()).expect("stdout is JSON");
        let annotations = printed["annotations"].as_array().expect("annotations array");
        assert_eq!(annotations.len(), 3);
        assert_eq!(annotations[0]["path"], "test");
        assert_eq!(annotations[0]["annotation_level"], "failure");
        assert_eq!(annotations[1]["path"], "src/a_test");
        assert_eq!(annotations[1]["start_line"], 10);
        assert_eq!(
            annotations[1]["message"],
            "testA failed: expected 1, got 2\n\nassert failed at a_test:10"
        );
        // testB declares no file, so it points at its report.
        assert_eq!(annotations[2]["path"], "reports/b.xml");
        assert_eq!(annotations[2]["start_line"], 5);
        assert_eq!(printed["summary"], annotations[0]["message"]);
    }

    #[test]
    fn report_path_without_workspace_root() {
        let dir = workspace(&[("reports/b.xml", REPORT_B)]);
        let config = RunConfig {
            workspace_root: None,
            ..dry_run_config(&dir, 5)
        };
        let locator = ReportLocator::new(&config.patterns, dir.path()).expect("valid patterns");

        let aggregate = collect_reports(locator.files(), &config).expect("collect succeeds");
        let expected = dir.path().join("reports/b.xml");
        assert_eq!(aggregate.annotations[0].path, expected.as_str());
    }

    #[test]
    fn zero_annotations() {
        let dir = workspace(&[("reports/a.xml", REPORT_A), ("reports/b.xml", REPORT_B)]);
        let config = dry_run_config(&dir, 0);
        let locator = ReportLocator::new(&config.patterns, dir.path()).expect("valid patterns");

        let aggregate = collect_reports(locator.files(), &config).expect("collect succeeds");
        assert_eq!(aggregate.annotations, Vec::new());
        assert_eq!(aggregate.omitted_annotations, 2);
        assert_eq!(
            CheckRunOutput::from_aggregate(&aggregate).annotations.len(),
            1
        );
    }

    #[test]
    fn no_matching_files() {
        let dir = workspace(&[]);
        let config = dry_run_config(&dir, 5);
        let locator = ReportLocator::new(&config.patterns, dir.path()).expect("valid patterns");

        let aggregate = collect_reports(locator.files(), &config).expect("collect succeeds");
        assert_eq!(aggregate.summary, Summary::default());
        assert_eq!(aggregate.summary.level().as_str(), "notice");
    }

    #[test]
    fn malformed_report_names_path() {
        let dir = workspace(&[("reports/a.xml", REPORT_A), ("reports/bad.xml", "<testsuite>")]);
        let config = dry_run_config(&dir, 5);
        let locator = ReportLocator::new(&config.patterns, dir.path()).expect("valid patterns");
        let mut writer = test_writer();

        let err = run(&config, &locator, &mut writer).expect_err("bad report fails the run");
        match &err {
            ExpectedError::ReportParseFailed { path, .. } => {
                assert_eq!(path, &dir.path().join("reports/bad.xml"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(writer.captured_stdout(), "", "nothing published");
    }

    #[test]
    fn unreadable_report() {
        let dir = workspace(&[]);
        let config = dry_run_config(&dir, 5);
        let missing = dir.path().join("reports/gone.xml");

        let err = collect_reports(std::iter::once(Ok(missing.clone())), &config)
            .expect_err("missing file fails");
        assert!(
            matches!(err, ExpectedError::ReportReadFailed { ref path, .. } if path == &missing),
            "unexpected error: {err:?}"
        );
        assert_eq!(
            err.process_exit_code(),
            AnnotateExitCode::REPORT_READ_FAILED
        );
    }

    struct RecordingClient {
        runs: Vec<CheckRun>,
        updates: RefCell<Vec<u64>>,
    }

    impl CheckRunClient for RecordingClient {
        fn list_for_ref(
            &self,
            _repo: &RepoId,
            _git_ref: &str,
            _check_name: &str,
        ) -> Result<Vec<CheckRun>, CheckRunClientError> {
            Ok(self.runs.clone())
        }

        fn update(
            &self,
            _repo: &RepoId,
            check_run_id: u64,
            _output: &CheckRunOutput,
        ) -> Result<(), CheckRunClientError> {
            self.updates.borrow_mut().push(check_run_id);
            Ok(())
        }
    }

    fn remote(job: &str) -> RemoteConfig {
        RemoteConfig {
            repo: "octo/app".parse().expect("valid repo"),
            commit: "abc123".to_owned(),
            job: job.to_owned(),
            api_url: crate::config::DEFAULT_API_URL.to_owned(),
            token: "s3cr3t".to_owned(),
        }
    }

    #[test]
    fn update_check_run_for_job() {
        let client = RecordingClient {
            runs: vec![CheckRun {
                id: 99,
                name: "test".to_owned(),
            }],
            updates: RefCell::new(Vec::new()),
        };
        let output = CheckRunOutput::from_aggregate(&Aggregator::new(5).finish());

        let id = update_check_run(&client, &remote("test"), &output).expect("update succeeds");
        assert_eq!(id, 99);
        assert_eq!(client.updates.borrow().as_slice(), [99]);

        let err = update_check_run(&client, &remote("lint"), &output).expect_err("no such job");
        assert_eq!(
            err.process_exit_code(),
            AnnotateExitCode::CHECK_RUN_NOT_FOUND
        );
        assert_eq!(
            err.failure_message(),
            "no check run named `lint` found for commit `abc123`"
        );
    }

    #[test]
    fn failure_is_reported_on_stdout() {
        let mut writer = test_writer();
        let err = ExpectedError::invalid_input("`path` is required\n(pass --path)");
        report_failure(&err, &mut writer);
        assert_eq!(
            writer.captured_stdout(),
            "::error::invalid input: `path` is required%0A(pass --path)\n"
        );
    }

    #[test]
    fn exec_from_flags() {
        let dir = workspace(&[("reports/a.xml", REPORT_A)]);
        let pattern = format!("{}/reports/*.xml", dir.path());
        let app = AnnotateApp::try_parse_from([
            "junit-annotate",
            "--path",
            &pattern,
            "--num-failures",
            " 2 ",
            "--workspace",
            dir.path().as_str(),
            "--dry-run",
        ])
        .expect("arguments parse");

        let mut writer = test_writer();
        assert_eq!(app.exec(&mut writer).expect("exec succeeds"), 0);
        let stdout = writer.captured_stdout();
        assert!(stdout.contains(r#""path": "src/a_test""#), "stdout: {stdout}");
    }
}
