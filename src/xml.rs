// src/xml.rs

//! Small XML document writer
//!
//! Thin wrapper over `quick_xml::Writer` producing indented documents from
//! nested `start`/`element`/`end` calls. Text is escaped by quick-xml.

use crate::error::{Error, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

pub struct XmlWriter {
    inner: Writer<Vec<u8>>,
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlWriter {
    pub fn new() -> Self {
        Self {
            inner: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    /// `<?xml version="1.0" encoding="UTF-8"?>`, optionally standalone
    pub fn declaration(&mut self, standalone: bool) -> Result<&mut Self> {
        let decl = BytesDecl::new("1.0", Some("UTF-8"), standalone.then_some("yes"));
        self.write(Event::Decl(decl))
    }

    pub fn start(&mut self, name: &str) -> Result<&mut Self> {
        self.write(Event::Start(BytesStart::new(name)))
    }

    pub fn end(&mut self, name: &str) -> Result<&mut Self> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    /// `<name>text</name>`
    pub fn element(&mut self, name: &str, text: &str) -> Result<&mut Self> {
        self.start(name)?;
        self.write(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    /// `<name/>`
    pub fn empty(&mut self, name: &str) -> Result<&mut Self> {
        self.write(Event::Empty(BytesStart::new(name)))
    }

    pub fn finish(self) -> Result<String> {
        String::from_utf8(self.inner.into_inner())
            .map_err(|e| Error::XmlError(format!("Writer produced invalid UTF-8: {e}")))
    }

    fn write(&mut self, event: Event<'_>) -> Result<&mut Self> {
        self.inner
            .write_event(event)
            .map_err(|e| Error::XmlError(e.to_string()))?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_document() {
        let mut w = XmlWriter::new();
        w.start("category").unwrap();
        w.element("name", "MathWorks R2021a").unwrap();
        w.empty("priority").unwrap();
        w.end("category").unwrap();
        let xml = w.finish().unwrap();
        assert_eq!(
            xml,
            "<category>\n  <name>MathWorks R2021a</name>\n  <priority/>\n</category>"
        );
    }

    #[test]
    fn test_text_is_escaped() {
        let mut w = XmlWriter::new();
        w.element("name", "A & <B>").unwrap();
        assert_eq!(w.finish().unwrap(), "<name>A &amp; &lt;B&gt;</name>");
    }

    #[test]
    fn test_declaration() {
        let mut w = XmlWriter::new();
        w.declaration(true).unwrap();
        w.empty("contents").unwrap();
        let xml = w.finish().unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#));
        assert!(xml.ends_with("<contents/>"));
    }
}
