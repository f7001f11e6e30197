//! In-memory XML tree used as the queryable document for XML source formats.
//!
//! Source files are parsed with `quick-xml`'s event reader into a flat arena of
//! nodes stored in document order. Node ids are indices into that arena, so a
//! node id is cheap to copy and document order is id order.
//!
//! Element and attribute names are either kept as written (`mets:file`) or
//! reduced to their local part (`record`), depending on the
//! [`NamespaceMode`] used when parsing. In [`NamespaceMode::Strip`] mode the
//! `xmlns` declarations are dropped as well, so MARCXML written with a default
//! namespace, a `marc:` prefix, or no namespace all produce the same tree.
//!
//! # Examples
//!
//! ```
//! use ds_import::xml_document::{NamespaceMode, XmlDocument};
//!
//! let doc = XmlDocument::parse_str(
//!     r#"<marc:record xmlns:marc="http://www.loc.gov/MARC21/slim">
//!          <marc:controlfield tag="001">12345</marc:controlfield>
//!        </marc:record>"#,
//!     NamespaceMode::Strip,
//! )
//! .unwrap();
//!
//! let root = doc.root_element().unwrap();
//! assert_eq!(doc.name(root), Some("record"));
//! ```

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Index of a node inside an [`XmlDocument`].
pub type NodeId = usize;

/// How element and attribute names are recorded while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamespaceMode {
    /// Drop prefixes and `xmlns` declarations (MARC, TEI)
    #[default]
    Strip,
    /// Keep qualified names and declarations verbatim (METS)
    Preserve,
}

/// Node payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The document node; parent of the root element
    Document,
    /// An element with its attributes in source order
    Element {
        /// Element name
        name: String,
        /// `(name, value)` pairs
        attributes: Vec<(String, String)>,
    },
    /// Character data (text or CDATA)
    Text(String),
}

/// A node in the arena.
#[derive(Debug, Clone)]
pub struct Node {
    /// Node payload
    pub kind: NodeKind,
    /// Parent node, `None` only for the document node
    pub parent: Option<NodeId>,
    /// Child nodes in document order
    pub children: Vec<NodeId>,
}

/// Parsed XML document.
///
/// Documents are immutable once parsed; queries only read them.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    nodes: Vec<Node>,
    mode: NamespaceMode,
}

impl XmlDocument {
    /// The id of the document node.
    pub const DOCUMENT: NodeId = 0;

    /// Parse an XML string.
    ///
    /// Whitespace-only text between elements is discarded. Text containing
    /// entities that cannot be resolved is kept as written.
    ///
    /// # Errors
    ///
    /// Returns a diagnostic message if the input is not well-formed or contains
    /// no root element.
    pub fn parse_str(xml: &str, mode: NamespaceMode) -> Result<Self, String> {
        let mut reader = Reader::from_str(xml);
        let mut doc = XmlDocument {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
            mode,
        };
        let mut open: Vec<NodeId> = vec![Self::DOCUMENT];

        loop {
            let event = reader
                .read_event()
                .map_err(|e| format!("{e} at byte {}", reader.buffer_position()))?;
            let parent = open.last().copied().unwrap_or(Self::DOCUMENT);

            match event {
                Event::Start(start) => {
                    let id = doc.push_element(parent, &start, mode)?;
                    open.push(id);
                },
                Event::Empty(start) => {
                    doc.push_element(parent, &start, mode)?;
                },
                Event::End(_) => {
                    if open.len() <= 1 {
                        return Err(format!(
                            "unexpected closing tag at byte {}",
                            reader.buffer_position()
                        ));
                    }
                    open.pop();
                },
                Event::Text(text) => {
                    let value = text
                        .unescape()
                        .map(Cow::into_owned)
                        .unwrap_or_else(|_| String::from_utf8_lossy(&text).into_owned());
                    doc.push_text(parent, value);
                },
                Event::CData(data) => {
                    let value = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    doc.push_text(parent, value);
                },
                Event::Eof => break,
                Event::Decl(_) | Event::PI(_) | Event::Comment(_) | Event::DocType(_) => {},
            }
        }

        if open.len() > 1 {
            let unclosed = doc.name(open[open.len() - 1]).unwrap_or_default();
            return Err(format!("unexpected end of document: <{unclosed}> is not closed"));
        }
        if doc.root_element().is_none() {
            return Err("document has no root element".to_string());
        }
        Ok(doc)
    }

    fn push_element(
        &mut self,
        parent: NodeId,
        start: &BytesStart<'_>,
        mode: NamespaceMode,
    ) -> Result<NodeId, String> {
        if parent == Self::DOCUMENT && self.root_element().is_some() {
            return Err("document has more than one root element".to_string());
        }

        let name = match mode {
            NamespaceMode::Strip => lossy(start.local_name().as_ref()),
            NamespaceMode::Preserve => lossy(start.name().as_ref()),
        };

        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| format!("bad attribute on <{name}>: {e}"))?;
            let key = attribute.key.as_ref();
            let is_declaration = key == b"xmlns" || key.starts_with(b"xmlns:");
            let key = match mode {
                NamespaceMode::Strip if is_declaration => continue,
                NamespaceMode::Strip => lossy(attribute.key.local_name().as_ref()),
                NamespaceMode::Preserve => lossy(key),
            };
            let value = attribute
                .unescape_value()
                .map(Cow::into_owned)
                .unwrap_or_else(|_| lossy(&attribute.value));
            attributes.push((key, value));
        }

        Ok(self.push(parent, NodeKind::Element { name, attributes }))
    }

    fn push_text(&mut self, parent: NodeId, value: String) {
        if parent == Self::DOCUMENT || value.trim().is_empty() {
            return;
        }
        self.push(parent, NodeKind::Text(value));
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }

    /// Namespace handling used when the document was parsed.
    #[must_use]
    pub fn namespace_mode(&self) -> NamespaceMode {
        self.mode
    }

    /// Total number of nodes, including the document node.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the document holds only the document node.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Access a node by id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// The single top-level element.
    #[must_use]
    pub fn root_element(&self) -> Option<NodeId> {
        self.nodes[Self::DOCUMENT]
            .children
            .iter()
            .copied()
            .find(|&id| self.is_element(id))
    }

    /// Whether `id` is an element node.
    #[must_use]
    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(
            self.nodes.get(id).map(|n| &n.kind),
            Some(NodeKind::Element { .. })
        )
    }

    /// Element name, or `None` for non-element nodes.
    #[must_use]
    pub fn name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes.get(id)?.kind {
            NodeKind::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Attributes of an element, empty for other nodes.
    #[must_use]
    pub fn attributes(&self, id: NodeId) -> &[(String, String)] {
        match self.nodes.get(id).map(|n| &n.kind) {
            Some(NodeKind::Element { attributes, .. }) => attributes,
            _ => &[],
        }
    }

    /// Value of the named attribute.
    #[must_use]
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Child nodes in document order.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map_or(&[][..], |n| n.children.as_slice())
    }

    /// Child elements in document order.
    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(|&child| self.is_element(child))
    }

    /// Parent node.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id)?.parent
    }

    /// Nearest ancestor-or-self element named `name`.
    #[must_use]
    pub fn enclosing(&self, id: NodeId, name: &str) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if self.name(node) == Some(name) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    /// All descendants of `id` (not including `id`) in document order.
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Text of a text node, `None` for other nodes.
    #[must_use]
    pub fn text_value(&self, id: NodeId) -> Option<&str> {
        match &self.nodes.get(id)?.kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Concatenated text of a node and all its descendants.
    #[must_use]
    pub fn string_value(&self, id: NodeId) -> String {
        if let Some(text) = self.text_value(id) {
            return text.to_string();
        }
        self.descendants(id)
            .into_iter()
            .filter_map(|node| self.text_value(node))
            .collect()
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
