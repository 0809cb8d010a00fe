// Copyright (c) The junit-annotate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::num::NonZeroU32;

/// Represents a single testsuite, normalized from a JUnit report.
///
/// The counts are the ones *declared* by the report, not recomputed from `cases`: many tools
/// emit counts for tests that have no `<testcase>` element, and the declared numbers are what
/// should be summed.
#[derive(Clone, Debug, Default, PartialEq)]
#[non_exhaustive]
pub struct Suite {
    /// The name of this testsuite, or an empty string if none was declared.
    pub name: String,

    /// The file path declared at the suite level, relative to the workspace root.
    pub file_path: Option<String>,

    /// The total number of tests declared by this testsuite.
    pub tests: u64,

    /// The number of tests in this suite that errored.
    ///
    /// An "error" is usually some sort of *unexpected* issue in a test.
    pub errors: u64,

    /// The number of tests in this suite that failed.
    ///
    /// A "failure" is usually some sort of *expected* issue in a test.
    pub failures: u64,

    /// The number of tests in this suite that were skipped.
    pub skipped: u64,

    /// The overall time taken by the testsuite, in seconds.
    ///
    /// Always finite and non-negative.
    pub time: f64,

    /// The testcases that form this testsuite, in document order.
    pub cases: Vec<Case>,
}

impl Suite {
    /// Creates a new, empty `Suite`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Adds a testcase to this suite.
    ///
    /// The declared counts are left alone, since they are read from the report rather than
    /// derived from the cases.
    pub fn add_case(&mut self, case: Case) -> &mut Self {
        self.cases.push(case);
        self
    }

    /// Returns an iterator over the cases that failed or errored.
    pub fn non_success_cases(&self) -> impl Iterator<Item = &Case> {
        self.cases.iter().filter(|case| !case.status.is_success())
    }
}

/// Represents a single testcase.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct Case {
    /// The name of the testcase.
    pub name: String,

    /// The source file the testcase lives in, relative to the workspace root.
    ///
    /// Taken from the testcase if declared there, otherwise from the enclosing suite.
    pub source_file: Option<String>,

    /// The line the testcase is declared at, if known.
    pub line_number: Option<NonZeroU32>,

    /// The status of this test.
    pub status: CaseStatus,
}

impl Case {
    /// Creates a new testcase with no location.
    pub fn new(name: impl Into<String>, status: CaseStatus) -> Self {
        Self {
            name: name.into(),
            source_file: None,
            line_number: None,
            status,
        }
    }

    /// Sets the source file.
    pub fn set_source_file(&mut self, source_file: impl Into<String>) -> &mut Self {
        self.source_file = Some(source_file.into());
        self
    }

    /// Sets the line number.
    pub fn set_line_number(&mut self, line_number: NonZeroU32) -> &mut Self {
        self.line_number = Some(line_number);
        self
    }

    /// Returns the line to report this testcase at, defaulting to the first line of the file.
    pub fn line(&self) -> NonZeroU32 {
        self.line_number.unwrap_or(NonZeroU32::MIN)
    }
}

/// Represents the outcome of a testcase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaseStatus {
    /// This testcase passed, or carried no failure or error payload.
    Success,

    /// This testcase did not pass.
    NonSuccess {
        /// Whether this testcase failed in an expected way (failure) or an unexpected way (error).
        kind: NonSuccessKind,

        /// The short failure message.
        message: String,

        /// The full failure text. Equal to `message` if the report had nothing longer.
        detail: String,
    },
}

impl CaseStatus {
    /// Creates a new `CaseStatus` that represents a successful test.
    pub fn success() -> Self {
        CaseStatus::Success
    }

    /// Creates a new `CaseStatus` that represents an unsuccessful test.
    pub fn non_success(
        kind: NonSuccessKind,
        message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        CaseStatus::NonSuccess {
            kind,
            message: message.into(),
            detail: detail.into(),
        }
    }

    /// Returns true if the testcase passed.
    pub fn is_success(&self) -> bool {
        matches!(self, CaseStatus::Success)
    }

    /// Returns the kind of non-success, if any.
    pub fn non_success_kind(&self) -> Option<NonSuccessKind> {
        match self {
            CaseStatus::Success => None,
            CaseStatus::NonSuccess { kind, .. } => Some(*kind),
        }
    }
}

/// The way in which a testcase did not pass.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NonSuccessKind {
    /// This is an expected failure. Read from `failure`.
    Failure,

    /// This is an unexpected error. Read from `error`.
    Error,
}

impl NonSuccessKind {
    /// Returns the past-tense verb for this kind: "failed" or "errored".
    pub fn verb(self) -> &'static str {
        match self {
            NonSuccessKind::Failure => "failed",
            NonSuccessKind::Error => "errored",
        }
    }
}
