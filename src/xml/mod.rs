//! Minimal in-memory XML tree for the two documents the patcher touches.
//!
//! Parsing and writing go through `quick-xml`; the tree itself knows nothing
//! about syntax. Attribute values and text are kept in their raw escaped
//! form so untouched content is written back byte-identical. Whitespace-only
//! text is dropped on parse and the writer re-indents with four spaces.

mod path;

pub use path::{ElementPath, Step};

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use std::borrow::Cow;
use thiserror::Error;

/// XML tree errors
#[derive(Error, Debug)]
pub enum XmlError {
    /// Reader rejected the input
    #[error("syntax error at byte {position}: {reason}")]
    Syntax {
        /// Byte offset reported by the reader
        position: u64,
        /// Reader message
        reason: String,
    },

    /// Input has no root element
    #[error("document has no root element")]
    NoRoot,

    /// Start/end tags do not balance
    #[error("unbalanced tags: {0}")]
    Unbalanced(String),

    /// Names or values are not UTF-8
    #[error("invalid UTF-8 in document")]
    Encoding,

    /// Writer failed
    #[error("failed to serialize document: {0}")]
    Write(String),

    /// Malformed element path
    #[error("invalid element path '{0}'")]
    InvalidPath(String),
}

/// Content of an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Child element
    Element(Element),
    /// Character data, raw (escaped) form
    Text(String),
    /// CDATA section
    CData(String),
    /// Comment body
    Comment(String),
    /// Processing instruction body
    ProcessingInstruction(String),
}

/// Items outside the root element
#[derive(Debug, Clone, PartialEq, Eq)]
enum Misc {
    Comment(String),
    ProcessingInstruction(String),
    DocType(String),
}

/// An XML element with ordered attributes and children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    /// Create an element with no attributes or children
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder form of [`Element::set_attr`]
    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Qualified name, including any namespace prefix
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unescaped attribute value
    pub fn attr(&self, name: &str) -> Option<Cow<'_, str>> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, raw)| quick_xml::escape::unescape(raw).unwrap_or(Cow::Borrowed(raw.as_str())))
    }

    /// Attribute names and raw values in document order
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Set an attribute, keeping its position if it already exists.
    ///
    /// Returns false when the attribute already had this value.
    pub fn set_attr(&mut self, name: &str, value: &str) -> bool {
        let raw = quick_xml::escape::escape(value).into_owned();
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some((_, existing)) if *existing == raw => false,
            Some((_, existing)) => {
                *existing = raw;
                true
            }
            None => {
                self.attributes.push((name.to_string(), raw));
                true
            }
        }
    }

    /// All child nodes
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Child elements only
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Append a child element after all existing children
    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// First descendant reachable through `path`, searching every branch
    pub fn find(&self, path: &ElementPath) -> Option<&Element> {
        let mut trail = Vec::with_capacity(path.steps().len());
        if self.locate(path.steps(), &mut trail) {
            self.at(&trail)
        } else {
            None
        }
    }

    /// Mutable form of [`Element::find`]
    pub fn find_mut(&mut self, path: &ElementPath) -> Option<&mut Element> {
        let mut trail = Vec::with_capacity(path.steps().len());
        if self.locate(path.steps(), &mut trail) {
            self.at_mut(&trail)
        } else {
            None
        }
    }

    /// First descendant (depth-first, document order) satisfying `predicate`
    pub fn find_by<P>(&self, predicate: P) -> Option<&Element>
    where
        P: Fn(&Element) -> bool + Copy,
    {
        for child in self.elements() {
            if predicate(child) {
                return Some(child);
            }
            if let Some(found) = child.find_by(predicate) {
                return Some(found);
            }
        }
        None
    }

    /// Return the first child matching `step`, appending `make()` when none does.
    ///
    /// The flag is true when the child was created.
    pub fn ensure_child<F>(&mut self, step: &Step, make: F) -> (&mut Element, bool)
    where
        F: FnOnce() -> Element,
    {
        let existing = self
            .children
            .iter()
            .position(|n| matches!(n, Node::Element(e) if step.matches(e)));
        let (index, created) = match existing {
            Some(index) => (index, false),
            None => {
                self.children.push(Node::Element(make()));
                (self.children.len() - 1, true)
            }
        };
        match &mut self.children[index] {
            Node::Element(e) => (e, created),
            _ => unreachable!("index always points at an element"),
        }
    }

    // Fills `trail` with child indices leading to a match.
    fn locate(&self, steps: &[Step], trail: &mut Vec<usize>) -> bool {
        let Some((step, rest)) = steps.split_first() else {
            return true;
        };
        for (index, node) in self.children.iter().enumerate() {
            if let Node::Element(child) = node
                && step.matches(child)
            {
                trail.push(index);
                if child.locate(rest, trail) {
                    return true;
                }
                trail.pop();
            }
        }
        false
    }

    fn at(&self, trail: &[usize]) -> Option<&Element> {
        trail.iter().try_fold(self, |el, &i| match el.children.get(i) {
            Some(Node::Element(child)) => Some(child),
            _ => None,
        })
    }

    fn at_mut(&mut self, trail: &[usize]) -> Option<&mut Element> {
        trail.iter().try_fold(self, |el, &i| match el.children.get_mut(i) {
            Some(Node::Element(child)) => Some(child),
            _ => None,
        })
    }
}

/// A parsed document: root element plus surrounding comments/PIs/doctype
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    prolog: Vec<Misc>,
    root: Element,
    epilog: Vec<Misc>,
}

impl Document {
    /// Document with only a root element
    pub fn new(root: Element) -> Self {
        Self {
            prolog: Vec::new(),
            root,
            epilog: Vec::new(),
        }
    }

    /// Root element
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Mutable root element
    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    /// Parse a document from text
    pub fn parse(text: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(text);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        let mut prolog = Vec::new();
        let mut epilog = Vec::new();

        loop {
            let event = reader.read_event().map_err(|e| XmlError::Syntax {
                position: reader.buffer_position() as u64,
                reason: e.to_string(),
            })?;

            match event {
                Event::Start(start) => stack.push(element_from_start(&start)?),
                Event::Empty(start) => {
                    let element = element_from_start(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(end) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| XmlError::Unbalanced(utf8(end.name().as_ref()).unwrap_or_default()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                // Indentation only; real text is kept verbatim
                Event::Text(text) if text.iter().all(u8::is_ascii_whitespace) => {}
                Event::Text(text) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Text(utf8(&text)?));
                    }
                }
                Event::CData(data) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::CData(utf8(&data)?));
                    }
                }
                Event::Comment(comment) => {
                    let body = utf8(&comment)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Comment(body)),
                        None if root.is_none() => prolog.push(Misc::Comment(body)),
                        None => epilog.push(Misc::Comment(body)),
                    }
                }
                Event::PI(pi) => {
                    let body = utf8(&pi)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::ProcessingInstruction(body)),
                        None if root.is_none() => prolog.push(Misc::ProcessingInstruction(body)),
                        None => epilog.push(Misc::ProcessingInstruction(body)),
                    }
                }
                Event::DocType(doctype) => prolog.push(Misc::DocType(utf8(&doctype)?)),
                // Rewritten documents always carry a fresh utf-8 declaration.
                Event::Decl(_) => {}
                Event::Eof => break,
            }
        }

        if let Some(open) = stack.last() {
            return Err(XmlError::Unbalanced(format!("<{}> is never closed", open.name)));
        }

        Ok(Self {
            prolog,
            root: root.ok_or(XmlError::NoRoot)?,
            epilog,
        })
    }

    /// Serialize with an XML declaration and four-space indentation
    pub fn to_bytes(&self) -> Result<Vec<u8>, XmlError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
        emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        for misc in &self.prolog {
            write_misc(&mut writer, misc)?;
        }
        write_element(&mut writer, &self.root)?;
        for misc in &self.epilog {
            write_misc(&mut writer, misc)?;
        }
        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        Ok(bytes)
    }
}

fn utf8(bytes: &[u8]) -> Result<String, XmlError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| XmlError::Encoding)
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element, XmlError> {
    let mut element = Element::new(utf8(start.name().as_ref())?);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Syntax {
            position: 0,
            reason: e.to_string(),
        })?;
        // A raw `"` only occurs in a single-quoted value; the writer always uses double quotes
        let raw = utf8(&attr.value)?.replace('"', "&quot;");
        element.attributes.push((utf8(attr.key.as_ref())?, raw));
    }
    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => {
            return Err(XmlError::Unbalanced(format!(
                "second root element <{}>",
                element.name
            )));
        }
    }
    Ok(())
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), XmlError> {
    writer
        .write_event(event)
        .map_err(|e| XmlError::Write(e.to_string()))
}

fn write_misc(writer: &mut Writer<Vec<u8>>, misc: &Misc) -> Result<(), XmlError> {
    match misc {
        Misc::Comment(body) => emit(writer, Event::Comment(BytesText::from_escaped(body.as_str()))),
        Misc::ProcessingInstruction(body) => emit(writer, Event::PI(BytesPI::new(body.as_str()))),
        Misc::DocType(body) => emit(writer, Event::DocType(BytesText::from_escaped(body.as_str()))),
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<(), XmlError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, raw) in &element.attributes {
        start.push_attribute(Attribute {
            key: QName(key.as_bytes()),
            value: Cow::Borrowed(raw.as_bytes()),
        });
    }

    if element.children.is_empty() {
        return emit(writer, Event::Empty(start));
    }

    emit(writer, Event::Start(start))?;
    for child in &element.children {
        match child {
            Node::Element(e) => write_element(writer, e)?,
            Node::Text(raw) => emit(writer, Event::Text(BytesText::from_escaped(raw.as_str())))?,
            Node::CData(data) => emit(writer, Event::CData(BytesCData::new(data.as_str())))?,
            Node::Comment(body) => emit(writer, Event::Comment(BytesText::from_escaped(body.as_str())))?,
            Node::ProcessingInstruction(body) => emit(writer, Event::PI(BytesPI::new(body.as_str())))?,
        }
    }
    emit(writer, Event::End(BytesEnd::new(element.name.as_str())))
}
