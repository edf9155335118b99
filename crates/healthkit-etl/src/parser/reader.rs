//! Element-at-a-time reader over the export document
//!
//! The export is read as an XML event stream. Only the direct children of the
//! `<HealthData>` root are materialized, one at a time, and each is dropped by
//! the caller once converted. Nothing about earlier elements is retained.

use std::io::{BufReader, Read};

use xml::reader::{EventReader, ParserConfig, XmlEvent};

use crate::error::{EtlError, Result};

pub const ROOT_ELEMENT: &str = "HealthData";
pub const RECORD_ELEMENT: &str = "Record";
pub const WORKOUT_ELEMENT: &str = "Workout";

/// One materialized element: attributes plus, when captured, its subtree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceElement {
    pub name: String,
    /// 1-based position among the root's children
    pub index: u64,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<SourceElement>,
}

impl SourceElement {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Children with the given element name, in document order
    pub fn children_named<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a SourceElement> + 'n
    where
        'a: 'n,
    {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First child with the given name; the result borrows only from `self`
    pub fn child(&self, name: &str) -> Option<&SourceElement> {
        self.children_named(name).next()
    }
}

/// How much of a top-level element to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    /// Attributes and the full subtree (workouts: routes and statistics live in children)
    Subtree,
    /// Attributes only; children are skipped (records: metadata lists can be long)
    Attributes,
    /// Name only
    NameOnly,
}

impl Capture {
    fn for_element(name: &str) -> Self {
        match name {
            WORKOUT_ELEMENT => Capture::Subtree,
            RECORD_ELEMENT => Capture::Attributes,
            _ => Capture::NameOnly,
        }
    }
}

/// Forward-only reader yielding the root's children one at a time
///
/// The sequence is finite and cannot be restarted. Any XML error is fatal and
/// ends the sequence.
pub struct ExportReader<R: Read> {
    events: EventReader<BufReader<R>>,
    index: u64,
    finished: bool,
}

impl<R: Read> ExportReader<R> {
    /// Start reading and check that the document root is `<HealthData>`.
    ///
    /// Fails before any element is produced if the document is empty, not XML,
    /// or has a different root.
    pub fn new(reader: R) -> Result<Self> {
        let events = ParserConfig::new()
            .trim_whitespace(true)
            .ignore_comments(true)
            .create_reader(BufReader::new(reader));
        let mut this = Self {
            events,
            index: 0,
            finished: false,
        };

        loop {
            match this.next_event()? {
                XmlEvent::StartElement { name, .. } => {
                    if name.local_name != ROOT_ELEMENT {
                        return Err(EtlError::malformed(
                            0,
                            format!("expected <{}> root, found <{}>", ROOT_ELEMENT, name.local_name),
                        ));
                    }
                    return Ok(this);
                }
                XmlEvent::EndDocument => {
                    return Err(EtlError::malformed(0, "document has no root element"));
                }
                _ => {}
            }
        }
    }

    /// Number of top-level elements read so far
    pub fn elements_read(&self) -> u64 {
        self.index
    }

    /// Read the next top-level element, or `None` once the root has closed
    pub fn next_element(&mut self) -> Result<Option<SourceElement>> {
        if self.finished {
            return Ok(None);
        }
        loop {
            match self.next_event()? {
                XmlEvent::StartElement {
                    name, attributes, ..
                } => {
                    self.index += 1;
                    let capture = Capture::for_element(&name.local_name);
                    let mut element = SourceElement {
                        name: name.local_name,
                        index: self.index,
                        attributes: Vec::new(),
                        children: Vec::new(),
                    };
                    if capture != Capture::NameOnly {
                        element.attributes = attributes
                            .into_iter()
                            .map(|a| (a.name.local_name, a.value))
                            .collect();
                    }
                    match capture {
                        Capture::Subtree => self.read_children(&mut element)?,
                        _ => self.skip_children()?,
                    }
                    return Ok(Some(element));
                }
                XmlEvent::EndElement { .. } => {
                    self.finish_document()?;
                    return Ok(None);
                }
                XmlEvent::EndDocument => {
                    return Err(self.malformed("document ended inside the root element"));
                }
                _ => {}
            }
        }
    }

    fn read_children(&mut self, parent: &mut SourceElement) -> Result<()> {
        loop {
            match self.next_event()? {
                XmlEvent::StartElement {
                    name, attributes, ..
                } => {
                    let mut child = SourceElement {
                        name: name.local_name,
                        index: parent.index,
                        attributes: attributes
                            .into_iter()
                            .map(|a| (a.name.local_name, a.value))
                            .collect(),
                        children: Vec::new(),
                    };
                    self.read_children(&mut child)?;
                    parent.children.push(child);
                }
                XmlEvent::EndElement { .. } => return Ok(()),
                XmlEvent::EndDocument => {
                    return Err(self.malformed("document ended inside an element"));
                }
                _ => {}
            }
        }
    }

    fn skip_children(&mut self) -> Result<()> {
        let mut depth = 0usize;
        loop {
            match self.next_event()? {
                XmlEvent::StartElement { .. } => depth += 1,
                XmlEvent::EndElement { .. } => {
                    if depth == 0 {
                        return Ok(());
                    }
                    depth -= 1;
                }
                XmlEvent::EndDocument => {
                    return Err(self.malformed("document ended inside an element"));
                }
                _ => {}
            }
        }
    }

    /// Drain trailing events so content after the root is still checked
    fn finish_document(&mut self) -> Result<()> {
        loop {
            if let XmlEvent::EndDocument = self.next_event()? {
                self.finished = true;
                return Ok(());
            }
        }
    }

    fn next_event(&mut self) -> Result<XmlEvent> {
        match self.events.next() {
            Ok(event) => Ok(event),
            Err(e) => {
                self.finished = true;
                Err(self.malformed(e.to_string()))
            }
        }
    }

    fn malformed(&self, msg: impl Into<String>) -> EtlError {
        EtlError::malformed(self.index, msg)
    }
}
