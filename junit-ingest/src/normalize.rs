// Copyright (c) The junit-annotate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turn a parsed document into [`Suite`] records.

use crate::{
    errors::ParseReportError,
    parse::{parse_document, XmlDocument, XmlElement},
    Case, CaseStatus, NonSuccessKind, Suite,
};
use camino::{Utf8Path, Utf8PathBuf};
use std::num::NonZeroU32;

static TESTSUITES_TAG: &str = "testsuites";
static TESTSUITE_TAG: &str = "testsuite";
static TESTCASE_TAG: &str = "testcase";
static FAILURE_TAG: &str = "failure";
static ERROR_TAG: &str = "error";

static NO_FAILURE_MESSAGE: &str = "no failure message";

/// Options for [`normalize_document`].
#[derive(Clone, Debug, Default)]
pub struct NormalizeOptions {
    workspace_root: Option<Utf8PathBuf>,
}

impl NormalizeOptions {
    /// Creates a new set of options with no workspace root.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the workspace root. Paths in the report that start with this root are made relative
    /// to it.
    pub fn set_workspace_root(&mut self, workspace_root: impl Into<Utf8PathBuf>) -> &mut Self {
        self.workspace_root = Some(workspace_root.into());
        self
    }

    /// Makes `path` relative to the workspace root.
    ///
    /// A path under the root loses the root prefix and any separators it leaves behind. Any other
    /// path is kept as given, apart from leading `./` components.
    pub fn relativize(&self, path: &str) -> String {
        let path = path.trim();
        let under_root = self.workspace_root.as_deref().and_then(|root| {
            let rel = Utf8Path::new(path).strip_prefix(root).ok()?;
            let rel = rel.as_str().trim_start_matches(['/', '\\']);
            // The root itself stays as given.
            (!rel.is_empty()).then_some(rel)
        });

        let mut rel = under_root.unwrap_or(path);
        while let Some(rest) = rel.strip_prefix("./") {
            rel = rest;
        }
        rel.to_owned()
    }
}

/// Reads `input` and normalizes it into a list of suites.
///
/// This is [`parse_document`] followed by [`normalize_document`].
pub fn parse_report(
    input: &[u8],
    options: &NormalizeOptions,
) -> Result<Vec<Suite>, ParseReportError> {
    let document = parse_document(input)?;
    Ok(normalize_document(&document, options))
}

/// Normalizes a parsed document into a list of suites, in document order.
///
/// Accepts both a `<testsuites>` root wrapping any number of `<testsuite>` elements and a bare
/// `<testsuite>` root. Roots with any other name contribute nothing.
pub fn normalize_document(document: &XmlDocument, options: &NormalizeOptions) -> Vec<Suite> {
    document
        .roots
        .iter()
        .flat_map(suite_elements)
        .map(|element| normalize_suite(element, options))
        .collect()
}

/// Returns the `<testsuite>` elements a root element stands for.
fn suite_elements(root: &XmlElement) -> Vec<&XmlElement> {
    if root.name == TESTSUITES_TAG {
        root.children_named(TESTSUITE_TAG).collect()
    } else if root.name == TESTSUITE_TAG {
        vec![root]
    } else {
        Vec::new()
    }
}

fn normalize_suite(element: &XmlElement, options: &NormalizeOptions) -> Suite {
    let file_path = element
        .non_empty_attr("filepath")
        .or_else(|| element.non_empty_attr("file"))
        .map(|path| options.relativize(path));

    let skipped = match element.attr("skipped") {
        Some(skipped) => parse_count(skipped),
        None => element.attr("disabled").map_or(0, parse_count),
    };

    let cases = element
        .children_named(TESTCASE_TAG)
        .map(|case| normalize_case(case, file_path.as_deref(), options))
        .collect();

    Suite {
        name: element.attr("name").unwrap_or_default().to_owned(),
        tests: element.attr("tests").map_or(0, parse_count),
        errors: element.attr("errors").map_or(0, parse_count),
        failures: element.attr("failures").map_or(0, parse_count),
        skipped,
        time: element.attr("time").map_or(0.0, parse_seconds),
        file_path,
        cases,
    }
}

fn normalize_case(
    element: &XmlElement,
    suite_file_path: Option<&str>,
    options: &NormalizeOptions,
) -> Case {
    let source_file = element
        .non_empty_attr("file")
        .map(|path| options.relativize(path))
        .or_else(|| suite_file_path.map(str::to_owned));

    let line_number = element
        .non_empty_attr("line")
        .or_else(|| element.non_empty_attr("lineno"))
        .and_then(parse_line);

    let status = match FailurePayload::from_case(element) {
        Some((kind, payload)) => {
            let (message, detail) = payload.into_message_and_detail();
            CaseStatus::NonSuccess {
                kind,
                message,
                detail,
            }
        }
        None => CaseStatus::Success,
    };

    Case {
        name: element.attr("name").unwrap_or_default().to_owned(),
        source_file,
        line_number,
        status,
    }
}

/// The body of a `<failure>` or `<error>` element.
///
/// Report generators either write the whole message as element text, or put a short summary in
/// a `message` attribute with the full output (often a stack trace) as element text.
#[derive(Clone, Debug, PartialEq, Eq)]
enum FailurePayload {
    /// Only text, no `message` attribute.
    Text(String),

    /// A `message` attribute, and possibly a body.
    Structured {
        message: String,
        body: Option<String>,
    },

    /// Neither text nor a message.
    Empty { ty: Option<String> },
}

impl FailurePayload {
    fn from_case(case: &XmlElement) -> Option<(NonSuccessKind, Self)> {
        let (kind, element) = case
            .first_child_named(FAILURE_TAG)
            .map(|element| (NonSuccessKind::Failure, element))
            .or_else(|| {
                case.first_child_named(ERROR_TAG)
                    .map(|element| (NonSuccessKind::Error, element))
            })?;
        Some((kind, Self::from_element(element)))
    }

    fn from_element(element: &XmlElement) -> Self {
        let body = element.non_empty_text().map(str::to_owned);
        match (element.non_empty_attr("message"), body) {
            (Some(message), body) => FailurePayload::Structured {
                message: message.to_owned(),
                body,
            },
            (None, Some(text)) => FailurePayload::Text(text),
            (None, None) => FailurePayload::Empty {
                ty: element.non_empty_attr("type").map(str::to_owned),
            },
        }
    }

    fn into_message_and_detail(self) -> (String, String) {
        match self {
            FailurePayload::Text(text) => (text.clone(), text),
            FailurePayload::Structured { message, body } => {
                let detail = body.unwrap_or_else(|| message.clone());
                (message, detail)
            }
            FailurePayload::Empty { ty } => {
                let message = ty.unwrap_or_else(|| NO_FAILURE_MESSAGE.to_owned());
                (message.clone(), message)
            }
        }
    }
}

/// Parses a count, treating anything that isn't a non-negative number as 0.
///
/// Some generators write counts as floats ("3.0"), so those are accepted and truncated.
fn parse_count(input: &str) -> u64 {
    let input = input.trim();
    if let Ok(count) = input.parse::<u64>() {
        return count;
    }
    match input.parse::<f64>() {
        Ok(count) if count.is_finite() && count > 0.0 => count as u64,
        _ => 0,
    }
}

/// Parses a duration in seconds, treating anything that isn't a finite non-negative number as 0.
fn parse_seconds(input: &str) -> f64 {
    match input.trim().parse::<f64>() {
        Ok(seconds) if seconds.is_finite() && seconds > 0.0 => seconds,
        _ => 0.0,
    }
}

/// Parses a line number. Line 0 and non-numeric values are treated as unknown.
fn parse_line(input: &str) -> Option<NonZeroU32> {
    input.trim().parse::<NonZeroU32>().ok()
}
