//! XML metadata document.
//!
//! The document is a plain element tree. Nodes are addressed with
//! slash-separated paths relative to the root element:
//!
//! ```text
//! Metadata/Information/Image/SizeX
//! Metadata/DisplaySetting/Channels/Channel[1]/Color           (0-based position)
//! Metadata/DisplaySetting/Channels/Channel[@Id=Channel:1]/Color
//! ```
//!
//! Comments, processing instructions and the XML declaration are dropped on
//! parse. Text is kept as written, including leading and trailing spaces;
//! whitespace-only runs (indentation between elements) are dropped. Mixed
//! content is not preserved: an element keeps the concatenation of its text
//! runs.

use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::MetadataError;

/// Root element name of a new document
pub const ROOT_ELEMENT: &str = "ImageDocument";

// =============================================================================
// XmlNode
// =============================================================================

/// An XML element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlNode {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            text: String::new(),
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some((_, v)) => *v = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    /// First child named `name`.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn push_child(&mut self, child: XmlNode) -> &mut XmlNode {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    fn find_child(&self, step: &PathStep) -> Option<usize> {
        let mut position = 0;
        for (i, child) in self.children.iter().enumerate() {
            if child.name != step.name {
                continue;
            }
            match &step.predicate {
                Predicate::None => return Some(i),
                Predicate::Index(n) => {
                    if position == *n {
                        return Some(i);
                    }
                    position += 1;
                }
                Predicate::Attribute(attr, value) => {
                    if child.attribute(attr) == Some(value.as_str()) {
                        return Some(i);
                    }
                }
            }
        }
        None
    }
}

// =============================================================================
// Paths
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    None,
    Index(usize),
    Attribute(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PathStep {
    name: String,
    predicate: Predicate,
}

fn invalid_path(path: &str, message: impl Into<String>) -> MetadataError {
    MetadataError::InvalidPath {
        path: path.to_string(),
        message: message.into(),
    }
}

/// Split a path into steps, ignoring `/` inside predicates.
fn parse_path(path: &str) -> Result<Vec<PathStep>, MetadataError> {
    let mut raw_steps = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in path.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| invalid_path(path, "unbalanced ']'"))?
            }
            '/' if depth == 0 => {
                raw_steps.push(&path[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(invalid_path(path, "unbalanced '['"));
    }
    raw_steps.push(&path[start..]);

    raw_steps
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(|s| parse_step(path, s))
        .collect()
}

fn parse_step(path: &str, step: &str) -> Result<PathStep, MetadataError> {
    let (name, predicate) = match step.find('[') {
        None => (step, Predicate::None),
        Some(open) => {
            let inner = step[open + 1..]
                .strip_suffix(']')
                .ok_or_else(|| invalid_path(path, format!("malformed step '{}'", step)))?;

            let predicate = if let Some(attr) = inner.strip_prefix('@') {
                let (key, value) = attr
                    .split_once('=')
                    .ok_or_else(|| invalid_path(path, format!("missing '=' in '{}'", step)))?;
                let value = value.trim_matches(|c| c == '\'' || c == '"');
                Predicate::Attribute(key.to_string(), value.to_string())
            } else {
                let n = inner
                    .parse::<usize>()
                    .map_err(|_| invalid_path(path, format!("bad index in '{}'", step)))?;
                Predicate::Index(n)
            };
            (&step[..open], predicate)
        }
    };

    if name.is_empty() {
        return Err(invalid_path(path, "empty element name"));
    }

    Ok(PathStep {
        name: name.to_string(),
        predicate,
    })
}

// =============================================================================
// MetadataDocument
// =============================================================================

/// The metadata document of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataDocument {
    root: XmlNode,
}

impl Default for MetadataDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataDocument {
    /// An empty `<ImageDocument><Metadata/></ImageDocument>`.
    pub fn new() -> Self {
        let mut root = XmlNode::new(ROOT_ELEMENT);
        root.push_child(XmlNode::new("Metadata"));
        Self { root }
    }

    pub fn root(&self) -> &XmlNode {
        &self.root
    }

    /// Parse an XML string.
    ///
    /// # Errors
    /// `Parse` on malformed XML, unbalanced tags or a missing root element.
    pub fn parse(xml: &str) -> Result<Self, MetadataError> {
        let mut reader = Reader::from_str(xml);

        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root: Option<XmlNode> = None;
        let mut buf = Vec::new();

        loop {
            let position = reader.buffer_position();
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| MetadataError::Parse(format!("at {}: {}", position, e)))?;

            match event {
                Event::Start(e) => stack.push(element_from(&e)?),
                Event::Empty(e) => {
                    let node = element_from(&e)?;
                    attach(&mut stack, &mut root, node)?;
                }
                Event::End(e) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| MetadataError::Parse("unexpected closing tag".into()))?;
                    if node.name.as_bytes() != e.name().as_ref() {
                        return Err(MetadataError::Parse(format!(
                            "closing tag '{}' does not match '{}'",
                            String::from_utf8_lossy(e.name().as_ref()),
                            node.name
                        )));
                    }
                    attach(&mut stack, &mut root, node)?;
                }
                Event::Text(t) => {
                    if let Some(current) = stack.last_mut() {
                        let text = t
                            .unescape()
                            .map_err(|e| MetadataError::Parse(e.to_string()))?;
                        if !text.trim().is_empty() {
                            current.text.push_str(&text);
                        }
                    }
                }
                Event::CData(t) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&t));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(MetadataError::Parse(format!(
                "unclosed element '{}'",
                stack[stack.len() - 1].name
            )));
        }

        root.map(|root| Self { root })
            .ok_or_else(|| MetadataError::Parse("document has no root element".into()))
    }

    /// Serialize to an indented UTF-8 XML string.
    pub fn to_xml(&self) -> Result<String, MetadataError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| MetadataError::Serialize(e.to_string()))?;
        write_node(&mut writer, &self.root)?;

        String::from_utf8(writer.into_inner().into_inner())
            .map_err(|e| MetadataError::Serialize(e.to_string()))
    }

    pub fn node(&self, path: &str) -> Option<&XmlNode> {
        let steps = parse_path(path).ok()?;
        let mut node = &self.root;
        for step in &steps {
            let i = node.find_child(step)?;
            node = &node.children[i];
        }
        Some(node)
    }

    pub fn node_mut(&mut self, path: &str) -> Option<&mut XmlNode> {
        let steps = parse_path(path).ok()?;
        let mut node = &mut self.root;
        for step in &steps {
            let i = node.find_child(step)?;
            node = &mut node.children[i];
        }
        Some(node)
    }

    /// The node at `path`, creating missing elements on the way.
    ///
    /// Attribute predicates create an element carrying that attribute. An
    /// index predicate may only create the next element in sequence.
    pub fn ensure(&mut self, path: &str) -> Result<&mut XmlNode, MetadataError> {
        let steps = parse_path(path)?;
        let mut node = &mut self.root;
        for step in &steps {
            let i = match node.find_child(step) {
                Some(i) => i,
                None => {
                    let mut child = XmlNode::new(step.name.clone());
                    match &step.predicate {
                        Predicate::None => {}
                        Predicate::Attribute(k, v) => child.set_attribute(k.clone(), v.clone()),
                        Predicate::Index(n) => {
                            let existing = node.children_named(&step.name).count();
                            if *n != existing {
                                return Err(invalid_path(
                                    path,
                                    format!(
                                        "cannot create {}[{}]: only {} exist",
                                        step.name, n, existing
                                    ),
                                ));
                            }
                        }
                    }
                    node.children.push(child);
                    node.children.len() - 1
                }
            };
            node = &mut node.children[i];
        }
        Ok(node)
    }

    /// Text of the node at `path`.
    pub fn get_text(&self, path: &str) -> Option<&str> {
        self.node(path).map(|n| n.text())
    }

    /// Set the text of the node at `path`, creating it if needed.
    pub fn set_text(&mut self, path: &str, text: impl Into<String>) -> Result<(), MetadataError> {
        self.ensure(path)?.set_text(text);
        Ok(())
    }

    pub fn get_attribute(&self, path: &str, name: &str) -> Option<&str> {
        self.node(path).and_then(|n| n.attribute(name))
    }

    pub fn set_attribute(
        &mut self,
        path: &str,
        name: &str,
        value: impl Into<String>,
    ) -> Result<(), MetadataError> {
        self.ensure(path)?.set_attribute(name, value);
        Ok(())
    }

    /// Remove the node at `path`. Returns whether a node was removed.
    /// The root cannot be removed.
    pub fn remove(&mut self, path: &str) -> bool {
        let Ok(mut steps) = parse_path(path) else {
            return false;
        };
        let Some(last) = steps.pop() else {
            return false;
        };

        let mut node = &mut self.root;
        for step in &steps {
            match node.find_child(step) {
                Some(i) => node = &mut node.children[i],
                None => return false,
            }
        }
        match node.find_child(&last) {
            Some(i) => {
                node.children.remove(i);
                true
            }
            None => false,
        }
    }

    /// Parse the text at `path` as a number.
    pub fn get_parsed<T: std::str::FromStr>(
        &self,
        path: &str,
    ) -> Result<Option<T>, MetadataError> {
        match self.get_text(path).map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => text.parse().map(Some).map_err(|_| MetadataError::InvalidValue {
                path: path.to_string(),
                message: format!("cannot parse '{}'", text),
            }),
        }
    }
}

fn element_from(e: &BytesStart<'_>) -> Result<XmlNode, MetadataError> {
    let mut node = XmlNode::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes() {
        let attr = attr.map_err(|e| MetadataError::Parse(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| MetadataError::Parse(e.to_string()))?;
        node.attributes.push((
            String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
            value.into_owned(),
        ));
    }
    Ok(node)
}

fn attach(
    stack: &mut [XmlNode],
    root: &mut Option<XmlNode>,
    node: XmlNode,
) -> Result<(), MetadataError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(node);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(node);
            Ok(())
        }
        None => Err(MetadataError::Parse("multiple root elements".into())),
    }
}

fn write_node<W: std::io::Write>(
    writer: &mut Writer<W>,
    node: &XmlNode,
) -> Result<(), MetadataError> {
    let map = |e: quick_xml::Error| MetadataError::Serialize(e.to_string());

    let mut start = BytesStart::new(node.name.as_str());
    for (k, v) in &node.attributes {
        start.push_attribute((k.as_str(), v.as_str()));
    }

    if node.children.is_empty() && node.text.is_empty() {
        return writer.write_event(Event::Empty(start)).map_err(map);
    }

    writer.write_event(Event::Start(start)).map_err(map)?;
    if !node.text.is_empty() {
        writer
            .write_event(Event::Text(BytesText::new(&node.text)))
            .map_err(map)?;
    }
    for child in &node.children {
        write_node(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(node.name.as_str())))
        .map_err(map)
}
