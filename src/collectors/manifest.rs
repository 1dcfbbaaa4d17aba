//! Module manifests.
//!
//! A manifest is a tab-indented XML report written incrementally next to
//! the evidence it describes. Tags are tracked on a stack so that
//! [`Manifest::close`] can always emit the closing structure, which keeps
//! the document well-formed when a module stops part way through.

use std::io::{self, Write};
use std::path::Path;

use log::warn;

use crate::models::SealedEvidence;
use crate::utils::evidence::EvidenceWriter;

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Escape text for use as XML character data or attribute value.
pub fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn tabs(level: usize) -> String {
    "\t".repeat(level)
}

pub struct Manifest {
    writer: Option<EvidenceWriter>,
    open_tags: Vec<(String, usize)>,
    error: Option<io::Error>,
}

impl Manifest {
    /// Create a manifest file and write the XML declaration.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let mut writer = EvidenceWriter::create(path, false)?;
        writer.write_all(XML_DECLARATION.as_bytes())?;
        Ok(Self {
            writer: Some(writer),
            open_tags: Vec::new(),
            error: None,
        })
    }

    fn emit(&mut self, text: &str) {
        if self.error.is_some() {
            return;
        }
        let result = match self.writer.as_mut() {
            Some(writer) => writer.write_all(text.as_bytes()),
            None => Err(io::Error::new(io::ErrorKind::Other, "manifest already closed")),
        };
        if let Err(e) = result {
            warn!("Manifest write failed: {}", e);
            self.error = Some(e);
        }
    }

    /// Number of tags currently open.
    pub fn depth(&self) -> usize {
        self.open_tags.len()
    }

    /// `<name>` at `level`, left open.
    pub fn start_tag(&mut self, name: &str, level: usize) {
        self.emit(&format!("{}<{}>\n", tabs(level), name));
        self.open_tags.push((name.to_string(), level));
    }

    /// `<name a="b">` at `level`, left open.
    pub fn start_tag_with_attributes(&mut self, name: &str, level: usize, attributes: &[(&str, &str)]) {
        self.emit(&format!("{}<{}{}>\n", tabs(level), name, render_attributes(attributes)));
        self.open_tags.push((name.to_string(), level));
    }

    /// Close the innermost open tag, which must be `name`.
    ///
    /// A mismatched name is logged and the innermost tag is closed anyway so
    /// the document stays balanced.
    pub fn end_tag(&mut self, name: &str, level: usize) {
        match self.open_tags.pop() {
            Some((open, open_level)) => {
                if open != name || open_level != level {
                    warn!("Manifest end tag {} does not match open tag {}", name, open);
                }
                self.emit(&format!("{}</{}>\n", tabs(open_level), open));
            }
            None => warn!("Manifest end tag {} without open tag", name),
        }
    }

    /// Close open tags until only `depth` remain.
    pub fn unwind_to(&mut self, depth: usize) {
        while self.open_tags.len() > depth {
            if let Some((name, level)) = self.open_tags.pop() {
                self.emit(&format!("{}</{}>\n", tabs(level), name));
            }
        }
    }

    /// `<name>value</name>` at `level`.
    pub fn complete_tag(&mut self, name: &str, level: usize, value: impl std::fmt::Display) {
        let value = escape_xml(&value.to_string());
        self.emit(&format!("{}<{}>{}</{}>\n", tabs(level), name, value, name));
    }

    /// `<name a="b">value</name>` at `level`.
    pub fn complete_tag_with_attributes(
        &mut self,
        name: &str,
        level: usize,
        attributes: &[(&str, &str)],
        value: impl std::fmt::Display,
    ) {
        let value = escape_xml(&value.to_string());
        self.emit(&format!(
            "{}<{}{}>{}</{}>\n",
            tabs(level),
            name,
            render_attributes(attributes),
            value,
            name
        ));
    }

    /// Close every open tag and seal the file.
    ///
    /// Returns the first write error seen during the manifest's lifetime.
    pub fn close(mut self) -> io::Result<SealedEvidence> {
        while let Some((name, level)) = self.open_tags.pop() {
            self.emit(&format!("{}</{}>\n", tabs(level), name));
        }
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        match self.writer.take() {
            Some(writer) => writer.close(),
            None => Err(io::Error::new(io::ErrorKind::Other, "manifest already closed")),
        }
    }
}

impl Drop for Manifest {
    fn drop(&mut self) {
        if self.writer.is_none() {
            return;
        }
        while let Some((name, level)) = self.open_tags.pop() {
            self.emit(&format!("{}</{}>\n", tabs(level), name));
        }
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.close() {
                warn!("Failed to close manifest: {}", e);
            }
        }
    }
}

fn render_attributes(attributes: &[(&str, &str)]) -> String {
    attributes
        .iter()
        .map(|(key, value)| format!(" {}=\"{}\"", key, escape_xml(value)))
        .collect()
}
