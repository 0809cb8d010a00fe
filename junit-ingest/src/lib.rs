// Copyright (c) The junit-annotate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read JUnit reports into a normalized model.
//!
//! JUnit XML comes in many dialects: some tools wrap suites in a `<testsuites>` element and some
//! emit a bare `<testsuite>`, some put failure text in a `message` attribute and some only in the
//! element body, and file and line attributes are present or not depending on the tool. This
//! crate reads any well-formed XML document into a generic element tree with
//! [`parse_document`], and then [`normalize_document`] turns that tree into [`Suite`] and
//! [`Case`] records that downstream code can consume without caring about the dialect.
//!
//! Only malformed XML is an error. Documents that are well-formed but have an unexpected shape
//! normalize to as much as can be recognized, possibly nothing.

#![warn(missing_docs)]

mod errors;
mod normalize;
mod parse;
mod report;

pub use errors::ParseReportError;
pub use normalize::*;
pub use parse::*;
pub use report::*;
