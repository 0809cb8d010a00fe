// Copyright (c) The junit-annotate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read an XML document into a generic element tree.

use crate::errors::ParseReportError;
use indexmap::IndexMap;
use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};

/// A parsed XML document.
///
/// Well-formed documents have exactly one root element, but the reader is lenient and keeps
/// every top-level element it finds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XmlDocument {
    /// The top-level elements, in document order.
    pub roots: Vec<XmlElement>,
}

impl XmlDocument {
    /// Returns the first root element.
    pub fn root(&self) -> Option<&XmlElement> {
        self.roots.first()
    }
}

/// An element in an [`XmlDocument`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// The local name of the element, without any namespace prefix.
    pub name: String,

    /// The element's attributes, keyed by local name, in document order.
    pub attributes: IndexMap<String, String>,

    /// Child elements, in document order.
    pub children: Vec<XmlElement>,

    /// Text and CDATA content directly inside this element, concatenated. `None` if there was
    /// none.
    pub text: Option<String>,
}

impl XmlElement {
    /// Creates a new element with no attributes, children or text.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Returns the value of the given attribute.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Returns the value of the given attribute, treating empty or whitespace-only values as
    /// absent.
    pub fn non_empty_attr(&self, name: &str) -> Option<&str> {
        self.attr(name)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Returns an iterator over the children with the given name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Returns the first child with the given name.
    pub fn first_child_named(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Returns the text content, treating whitespace-only text as absent.
    pub fn non_empty_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    fn push_text(&mut self, text: &str) {
        match &mut self.text {
            Some(existing) => existing.push_str(text),
            None => self.text = Some(text.to_owned()),
        }
    }
}

/// Reads `input` into an [`XmlDocument`].
///
/// Comments, processing instructions, the XML declaration and doctypes are skipped. Returns an
/// error if the input is not well-formed.
pub fn parse_document(input: &[u8]) -> Result<XmlDocument, ParseReportError> {
    let mut reader = Reader::from_reader(input);
    let config = reader.config_mut();
    config.trim_text(true);
    config.check_end_names = true;

    let mut document = XmlDocument::default();
    // Elements that have been opened but not yet closed, innermost last.
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut buf = Vec::new();

    loop {
        let position = reader.buffer_position() as u64;
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|err| ParseReportError::xml(position, err))?;

        match event {
            Event::Start(start) => {
                let element = read_start(&start, position)?;
                stack.push(element);
            }
            Event::Empty(start) => {
                let element = read_start(&start, position)?;
                attach(element, &mut stack, &mut document);
            }
            Event::End(_) => {
                // quick-xml checks that end names match, so an end tag always has an open
                // element here.
                if let Some(element) = stack.pop() {
                    attach(element, &mut stack, &mut document);
                }
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|err| ParseReportError::xml(position, err))?;
                if let Some(parent) = stack.last_mut() {
                    parent.push_text(&text);
                }
            }
            Event::CData(cdata) => {
                let data = cdata.into_inner();
                if let Some(parent) = stack.last_mut() {
                    parent.push_text(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }

        buf.clear();
    }

    if let Some(open) = stack.pop() {
        return Err(ParseReportError::UnclosedElement { name: open.name });
    }
    if document.roots.is_empty() {
        return Err(ParseReportError::NoRootElement);
    }

    Ok(document)
}

fn read_start(start: &BytesStart<'_>, position: u64) -> Result<XmlElement, ParseReportError> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut element = XmlElement::new(name);

    for attr in start.attributes() {
        let attr = attr.map_err(|err| ParseReportError::xml(position, err))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| ParseReportError::xml(position, err))?;
        element.attributes.insert(key, value.into_owned());
    }

    Ok(element)
}

fn attach(element: XmlElement, stack: &mut [XmlElement], document: &mut XmlDocument) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => document.roots.push(element),
    }
}
