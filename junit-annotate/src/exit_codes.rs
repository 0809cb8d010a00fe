// Copyright (c) The junit-annotate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `junit-annotate` failures.
///
/// A run either updates the check run completely or fails with one of these codes. Unknown or
/// unexpected failures result in exit code 1, and panics in exit code 101.
pub enum AnnotateExitCode {}

impl AnnotateExitCode {
    /// The check run was updated.
    pub const OK: i32 = 0;

    /// An input was missing or invalid.
    pub const INVALID_INPUT: i32 = 96;

    /// Searching for report files produced an error.
    pub const LOCATE_FAILED: i32 = 97;

    /// A report file could not be read.
    pub const REPORT_READ_FAILED: i32 = 98;

    /// A report file was not well-formed XML.
    pub const REPORT_PARSE_FAILED: i32 = 99;

    /// Listing check runs for the commit failed.
    pub const CHECK_RUN_LOOKUP_FAILED: i32 = 100;

    /// No check run with the job's name exists for the commit.
    pub const CHECK_RUN_NOT_FOUND: i32 = 102;

    /// Updating the check run failed.
    pub const CHECK_RUN_UPDATE_FAILED: i32 = 103;

    /// Writing data to stdout or stderr produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}
