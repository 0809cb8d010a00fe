// Copyright (c) The junit-annotate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fold normalized suites into run totals and a bounded list of annotations.

use junit_ingest::{Case, CaseStatus, Suite};
use std::{fmt, num::NonZeroU32};

/// Totals across every suite seen in a run.
///
/// Only ever changed by adding a suite, so the totals are the field-wise sums of the suites'
/// declared counts, saturating at `u64::MAX`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Summary {
    /// The total number of tests.
    pub tests: u64,

    /// The total number of skipped tests.
    pub skipped: u64,

    /// The total number of failed tests.
    pub failed: u64,

    /// The total number of errored tests.
    pub errored: u64,

    /// The total time taken, in seconds.
    pub duration_seconds: f64,
}

impl Summary {
    fn add_suite(&mut self, suite: &Suite) {
        self.tests = self.tests.saturating_add(suite.tests);
        self.skipped = self.skipped.saturating_add(suite.skipped);
        self.failed = self.failed.saturating_add(suite.failures);
        self.errored = self.errored.saturating_add(suite.errors);
        self.duration_seconds += suite.time;
    }

    /// Returns true if any test failed or errored.
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.errored > 0
    }

    /// Returns the level for an annotation describing the whole run.
    pub fn level(&self) -> AnnotationLevel {
        if self.has_failures() {
            AnnotationLevel::Failure
        } else {
            AnnotationLevel::Notice
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ran {} tests in {:.3} seconds: {} errored, {} failed, {} skipped.",
            self.tests, self.duration_seconds, self.errored, self.failed, self.skipped,
        )
    }
}

/// The severity of an annotation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AnnotationLevel {
    /// Informational.
    Notice,

    /// Something failed.
    Failure,
}

impl AnnotationLevel {
    /// Returns the name GitHub uses for this level.
    pub fn as_str(self) -> &'static str {
        match self {
            AnnotationLevel::Notice => "notice",
            AnnotationLevel::Failure => "failure",
        }
    }
}

/// A marker on a file and line, shown on the check run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Annotation {
    /// The path of the file, relative to the workspace root.
    pub path: String,

    /// The line in the file.
    pub line: NonZeroU32,

    /// The severity.
    pub level: AnnotationLevel,

    /// A short title.
    pub title: Option<String>,

    /// The annotation text.
    pub message: String,
}

impl Annotation {
    /// Builds the annotation for a case that failed or errored, or returns `None` for a case that
    /// passed.
    ///
    /// `report_path` is used when neither the case nor its suite declared a file.
    pub fn for_case(case: &Case, report_path: &str) -> Option<Self> {
        let CaseStatus::NonSuccess {
            kind,
            message,
            detail,
        } = &case.status
        else {
            return None;
        };

        Some(Self {
            path: case
                .source_file
                .clone()
                .unwrap_or_else(|| report_path.to_owned()),
            line: case.line(),
            level: AnnotationLevel::Failure,
            title: Some(case.name.clone()),
            message: format!("{} {}: {message}\n\n{detail}", case.name, kind.verb()),
        })
    }
}

/// The result of aggregating a run.
#[derive(Clone, Debug, PartialEq)]
pub struct Aggregate {
    /// Totals across all suites.
    pub summary: Summary,

    /// Annotations for the first failing or erroring cases, in the order they were seen.
    pub annotations: Vec<Annotation>,

    /// The number of failing or erroring cases that did not get an annotation because the limit
    /// was reached.
    pub omitted_annotations: usize,

    /// The number of suites aggregated.
    pub suite_count: usize,
}

/// Accumulates suites one at a time.
///
/// Suites must be added in the order they are encountered: annotations are kept for the first
/// `max_annotations` failing or erroring cases, so the selection depends on order even though the
/// totals do not.
#[derive(Clone, Debug)]
pub struct Aggregator {
    max_annotations: usize,
    summary: Summary,
    annotations: Vec<Annotation>,
    omitted_annotations: usize,
    suite_count: usize,
}

impl Aggregator {
    /// Creates a new aggregator that keeps at most `max_annotations` case annotations.
    pub fn new(max_annotations: usize) -> Self {
        Self {
            max_annotations,
            summary: Summary::default(),
            annotations: Vec::new(),
            omitted_annotations: 0,
            suite_count: 0,
        }
    }

    /// Adds a suite read from the report at `report_path` (relative to the workspace root).
    pub fn add_suite(&mut self, report_path: &str, suite: &Suite) {
        self.summary.add_suite(suite);
        self.suite_count += 1;

        for case in suite.non_success_cases() {
            if self.annotations.len() >= self.max_annotations {
                self.omitted_annotations += 1;
                continue;
            }
            if let Some(annotation) = Annotation::for_case(case, report_path) {
                self.annotations.push(annotation);
            }
        }
    }

    /// Adds several suites read from the same report.
    pub fn add_suites<'a>(
        &mut self,
        report_path: &str,
        suites: impl IntoIterator<Item = &'a Suite>,
    ) {
        for suite in suites {
            self.add_suite(report_path, suite);
        }
    }

    /// Finishes aggregation.
    pub fn finish(self) -> Aggregate {
        Aggregate {
            summary: self.summary,
            annotations: self.annotations,
            omitted_annotations: self.omitted_annotations,
            suite_count: self.suite_count,
        }
    }
}
