//! Owned XML tree for FCP7 interchange files.
//!
//! Text and attribute values are kept exactly as they appear in the source
//! (still escaped), so anything the optimizer never looks at is written back
//! unchanged. Values that are read for their meaning go through
//! [`Element::text`], which unescapes on demand.
//!
//! Input in any encoding the declaration or a byte order mark names is
//! decoded up front; the tree and its output are always UTF-8.

use encoding_rs::{Encoding, UTF_8};
use quick_xml::escape::{escape, unescape};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::borrow::Cow;
use std::str::FromStr;
use tracing::debug;

use crate::{Result, XmemlError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

impl Default for Declaration {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            encoding: Some("UTF-8".to_string()),
            standalone: None,
        }
    }
}

impl Declaration {
    fn from_event(decl: &BytesDecl<'_>) -> Result<Self> {
        let version = utf8(&decl.version()?)?;
        let encoding = match decl.encoding() {
            Some(value) => Some(utf8(&value?)?),
            None => None,
        };
        let standalone = match decl.standalone() {
            Some(value) => Some(utf8(&value?)?),
            None => None,
        };
        Ok(Self {
            version,
            encoding,
            standalone,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Raw, still-escaped character data.
    Text(String),
    CData(String),
    Comment(String),
    Instruction(String),
    DocType(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// `(key, raw value)` in source order.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Element holding a single text node; `text` is escaped on the way in.
    pub fn with_text(name: impl Into<String>, text: &str) -> Self {
        let mut element = Self::new(name);
        element.children.push(Node::Text(escape(text).into_owned()));
        element
    }

    pub fn attribute(&self, key: &str) -> Option<String> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, raw)| unescape(raw).ok().map(|v| v.into_owned()))
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|node| match node {
            Node::Element(e) if e.name == name => Some(e),
            _ => None,
        })
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.elements().filter(move |e| e.name == name)
    }

    /// Consume the element, yielding its direct children called `name`.
    pub fn into_children_named<'a>(self, name: &'a str) -> impl Iterator<Item = Element> + 'a {
        self.children.into_iter().filter_map(move |node| match node {
            Node::Element(e) if e.name == name => Some(e),
            _ => None,
        })
    }

    /// Unescaped character data directly inside this element.
    pub fn text(&self) -> Result<String> {
        let mut out = String::new();
        for node in &self.children {
            match node {
                Node::Text(raw) => out.push_str(&unescape(raw)?),
                Node::CData(data) => out.push_str(data),
                _ => {}
            }
        }
        Ok(out)
    }

    pub fn child_text(&self, name: &str) -> Option<Result<String>> {
        self.child(name).map(Element::text)
    }

    pub fn push_element(&mut self, element: Element) {
        self.children.push(Node::Element(element));
    }

    /// Detach every direct child called `name`, in order.
    ///
    /// Whitespace-only text that immediately follows a detached child goes with
    /// it, so removing a run of indented siblings leaves no blank lines behind.
    pub fn take_children_named(&mut self, name: &str) -> Vec<Element> {
        let mut taken = Vec::new();
        let mut kept = Vec::with_capacity(self.children.len());
        let mut in_tail = false;

        for node in self.children.drain(..) {
            match node {
                Node::Element(e) if e.name == name => {
                    taken.push(e);
                    in_tail = true;
                }
                Node::Text(raw) if in_tail && raw.trim().is_empty() => {}
                other => {
                    in_tail = false;
                    kept.push(other);
                }
            }
        }

        self.children = kept;
        taken
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub declaration: Option<Declaration>,
    /// Doctype, comments and whitespace before the root element.
    pub prolog: Vec<Node>,
    pub root: Element,
    pub epilog: Vec<Node>,
}

impl Document {
    /// Parse raw file contents, decoding them first when they are not UTF-8.
    ///
    /// A transcoded document gets `encoding="UTF-8"` in its declaration so the
    /// written bytes match their label.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self> {
        let encoding = detect_encoding(bytes)?;
        let (xml, encoding, had_errors) = encoding.decode(bytes);
        if had_errors {
            return Err(XmemlError::Decode {
                encoding: encoding.name(),
            });
        }

        let mut document = Self::parse_str(&xml)?;
        if encoding != UTF_8 {
            debug!("Decoded {} input", encoding.name());
            if let Some(declaration) = document.declaration.as_mut() {
                declaration.encoding = Some(UTF_8.name().to_string());
            }
        }
        Ok(document)
    }

    pub fn parse_str(xml: &str) -> Result<Self> {
        let xml = xml.strip_prefix('\u{feff}').unwrap_or(xml);
        let mut reader = Reader::from_str(xml);

        let mut declaration = None;
        let mut prolog = Vec::new();
        let mut epilog = Vec::new();
        let mut root: Option<Element> = None;
        let mut open: Vec<Element> = Vec::new();

        loop {
            let event = reader.read_event().map_err(|source| XmemlError::Parse {
                position: reader.buffer_position() as u64,
                source,
            })?;

            let node = match event {
                Event::Eof => break,
                Event::Decl(decl) => {
                    if open.is_empty() && root.is_none() {
                        declaration = Some(Declaration::from_event(&decl)?);
                    }
                    continue;
                }
                Event::Start(start) => {
                    open.push(element_from_start(&start)?);
                    continue;
                }
                // The reader rejects end tags that close nothing
                Event::End(_) => match open.pop() {
                    Some(element) => Node::Element(element),
                    None => continue,
                },
                Event::Empty(start) => Node::Element(element_from_start(&start)?),
                Event::Text(text) => Node::Text(utf8(&text)?),
                Event::CData(data) => Node::CData(utf8(&data)?),
                Event::Comment(comment) => Node::Comment(utf8(&comment)?),
                Event::PI(pi) => Node::Instruction(utf8(&pi)?),
                Event::DocType(doctype) => Node::DocType(utf8(&doctype)?),
            };

            if let Some(parent) = open.last_mut() {
                parent.children.push(node);
                continue;
            }

            match node {
                Node::Element(element) => {
                    if root.is_some() {
                        return Err(XmemlError::MultipleRoots(element.name));
                    }
                    root = Some(element);
                }
                other if root.is_none() => prolog.push(other),
                other => epilog.push(other),
            }
        }

        if let Some(unclosed) = open.pop() {
            return Err(XmemlError::UnexpectedEof(unclosed.name));
        }
        let root = root.ok_or(XmemlError::MissingRoot)?;

        Ok(Self {
            declaration,
            prolog,
            root,
            epilog,
        })
    }

    /// Serialize the document. A UTF-8 declaration is written when the source
    /// had none.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());

        let decl = self.declaration.clone().unwrap_or_default();
        writer.write_event(Event::Decl(BytesDecl::new(
            &decl.version,
            decl.encoding.as_deref(),
            decl.standalone.as_deref(),
        )))?;
        if self.declaration.is_none() {
            writer.get_mut().push(b'\n');
        }

        for node in &self.prolog {
            write_node(&mut writer, node)?;
        }
        write_element(&mut writer, &self.root)?;
        for node in &self.epilog {
            write_node(&mut writer, node)?;
        }

        Ok(writer.into_inner())
    }

    pub fn to_xml_string(&self) -> Result<String> {
        String::from_utf8(self.to_bytes()?).map_err(|e| XmemlError::Utf8(e.utf8_error()))
    }
}

impl FromStr for Document {
    type Err = XmemlError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_str(s)
    }
}

/// Encoding of a raw document: a byte order mark wins, then the declaration's
/// `encoding`, then UTF-8.
pub fn detect_encoding(bytes: &[u8]) -> Result<&'static Encoding> {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return Ok(encoding);
    }

    let mut reader = Reader::from_reader(bytes);
    let Ok(Event::Decl(decl)) = reader.read_event() else {
        return Ok(UTF_8);
    };
    let Some(label) = decl.encoding() else {
        return Ok(UTF_8);
    };
    let label = label?;
    match decl.encoder() {
        // A declaration readable as ASCII rules out UTF-16 without a BOM
        Some(encoding) => Ok(encoding.output_encoding()),
        None => Err(XmemlError::UnsupportedEncoding(
            String::from_utf8_lossy(&label).into_owned(),
        )),
    }
}

fn utf8(bytes: &[u8]) -> Result<String> {
    Ok(std::str::from_utf8(bytes)?.to_owned())
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element> {
    let mut element = Element::new(utf8(start.name().as_ref())?);
    for attribute in start.attributes() {
        let attribute = attribute?;
        element
            .attributes
            .push((utf8(attribute.key.as_ref())?, utf8(&attribute.value)?));
    }
    Ok(element)
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, raw) in &element.attributes {
        // Values from single-quoted source attributes may hold bare `"`
        let raw: Cow<'_, str> = if raw.contains('"') {
            Cow::Owned(raw.replace('"', "&quot;"))
        } else {
            Cow::Borrowed(raw)
        };
        // Byte tuples are written verbatim; the value is already escaped
        start.push_attribute((key.as_bytes(), raw.as_bytes()));
    }

    if element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        write_node(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &Node) -> Result<()> {
    match node {
        Node::Element(element) => write_element(writer, element)?,
        Node::Text(raw) => writer.write_event(Event::Text(BytesText::from_escaped(raw.as_str())))?,
        Node::CData(data) => writer.write_event(Event::CData(BytesCData::new(data.as_str())))?,
        Node::Comment(raw) => {
            writer.write_event(Event::Comment(BytesText::from_escaped(raw.as_str())))?
        }
        Node::DocType(raw) => {
            writer.write_event(Event::DocType(BytesText::from_escaped(raw.as_str())))?
        }
        Node::Instruction(raw) => {
            let out = writer.get_mut();
            out.extend_from_slice(b"<?");
            out.extend_from_slice(raw.as_bytes());
            out.extend_from_slice(b"?>");
        }
    }
    Ok(())
}
