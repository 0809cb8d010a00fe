// Copyright (c) The junit-annotate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use thiserror::Error;

/// An error that occurs while reading a JUnit document.
///
/// Returned by [`parse_document`](crate::parse_document) and
/// [`parse_report`](crate::parse_report). Only produced for input that is not well-formed XML;
/// unexpected document shapes are never errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseReportError {
    /// The XML reader rejected the input.
    #[error("malformed XML at byte {position}")]
    Xml {
        /// The byte offset at which the error was detected.
        position: u64,

        /// The underlying error.
        #[source]
        err: quick_xml::Error,
    },

    /// The input contained no elements at all.
    #[error("document has no root element")]
    NoRootElement,

    /// The input ended while an element was still open.
    #[error("element `{name}` is not closed at end of document")]
    UnclosedElement {
        /// The name of the innermost open element.
        name: String,
    },
}

impl ParseReportError {
    pub(crate) fn xml(position: u64, err: impl Into<quick_xml::Error>) -> Self {
        Self::Xml {
            position,
            err: err.into(),
        }
    }
}
