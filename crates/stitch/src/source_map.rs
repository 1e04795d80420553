//! Source-tracked output text and Source Map V3 emission
//!
//! The bundler produces a tree of [`SourceNode`]s instead of a flat string.
//! Verbatim slices remember where they came from, so flattening the tree can
//! produce the text and the mappings in one pass.

use std::rc::Rc;

use cow_utils::CowUtils;
use rustc_hash::FxHashMap as HashMap;
use serde_json::json;

use crate::{file_registry::FileRegistry, types::FileId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceNode {
    /// Text with no origin, such as closure wrappers
    Generated(String),
    /// A verbatim slice starting at `offset` in `file`
    Original {
        file: FileId,
        offset: usize,
        text: String,
    },
    /// Text standing in for the original range starting at `offset`
    Replacement {
        file: FileId,
        offset: usize,
        text: String,
    },
    Group(Vec<Rc<SourceNode>>),
}

impl SourceNode {
    pub fn generated(text: impl Into<String>) -> Rc<Self> {
        Rc::new(Self::Generated(text.into()))
    }

    /// The output text without mappings
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        self.write_text(&mut out);
        out
    }

    fn write_text(&self, out: &mut String) {
        match self {
            Self::Generated(text)
            | Self::Original { text, .. }
            | Self::Replacement { text, .. } => out.push_str(text),
            Self::Group(children) => {
                for child in children {
                    child.write_text(out);
                }
            }
        }
    }
}

/// Flattened output of one package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flattened {
    pub code: String,
    /// Source Map V3 JSON
    pub map: String,
}

/// VLQ-encode a signed integer and append it to `out`
fn vlq_encode(value: i64, out: &mut String) {
    const B64: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    #[allow(clippy::cast_sign_loss)]
    let mut rest = (if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    }) as u64;
    loop {
        let mut digit = (rest & 0x1f) as u8;
        rest >>= 5;
        if rest > 0 {
            digit |= 0x20;
        }
        out.push(B64[digit as usize] as char);
        if rest == 0 {
            break;
        }
    }
}

/// Byte offset to (line, UTF-16 column), both 0-based
struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|&(_, byte)| byte == b'\n')
                .map(|(index, _)| index + 1),
        );
        Self { line_starts }
    }

    fn position(&self, source: &str, offset: usize) -> (u32, u32) {
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let start = self.line_starts[line];
        let column = source
            .get(start..offset)
            .map_or(0, |prefix| prefix.encode_utf16().count());
        (line as u32, column as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    generated_line: u32,
    generated_column: u32,
    source: u32,
    line: u32,
    column: u32,
}

struct MapWriter<'a> {
    registry: &'a FileRegistry,
    code: String,
    line: u32,
    column: u32,
    segments: Vec<Segment>,
    indexes: HashMap<FileId, LineIndex>,
}

impl<'a> MapWriter<'a> {
    fn new(registry: &'a FileRegistry) -> Self {
        Self {
            registry,
            code: String::new(),
            line: 0,
            column: 0,
            segments: Vec::new(),
            indexes: HashMap::default(),
        }
    }

    fn push_text(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += ch.len_utf16() as u32;
            }
        }
        self.code.push_str(text);
    }

    fn map_here(&mut self, file: FileId, offset: usize) {
        let registry = self.registry;
        let source = &registry.get(file).source;
        let index = self
            .indexes
            .entry(file)
            .or_insert_with(|| LineIndex::new(source));
        let (line, column) = index.position(source, offset);
        let segment = Segment {
            generated_line: self.line,
            generated_column: self.column,
            source: file.as_u32(),
            line,
            column,
        };
        if self.segments.last() != Some(&segment) {
            self.segments.push(segment);
        }
    }

    fn write(&mut self, node: &SourceNode) {
        match node {
            SourceNode::Generated(text) => self.push_text(text),
            SourceNode::Replacement { file, offset, text } => {
                if !text.is_empty() {
                    self.map_here(*file, *offset);
                }
                self.push_text(text);
            }
            SourceNode::Original { file, offset, text } => {
                let mut consumed = 0;
                for piece in text.split_inclusive('\n') {
                    self.map_here(*file, offset + consumed);
                    self.push_text(piece);
                    consumed += piece.len();
                }
            }
            SourceNode::Group(children) => {
                for child in children {
                    self.write(child);
                }
            }
        }
    }

    fn mappings(&self) -> String {
        let mut out = String::new();
        let mut line = 0;
        let mut previous_column = 0i64;
        let mut previous = (0i64, 0i64, 0i64);
        let mut first_on_line = true;

        for segment in &self.segments {
            while line < segment.generated_line {
                out.push(';');
                line += 1;
                previous_column = 0;
                first_on_line = true;
            }
            if !first_on_line {
                out.push(',');
            }
            first_on_line = false;

            let column = i64::from(segment.generated_column);
            let current = (
                i64::from(segment.source),
                i64::from(segment.line),
                i64::from(segment.column),
            );
            vlq_encode(column - previous_column, &mut out);
            vlq_encode(current.0 - previous.0, &mut out);
            vlq_encode(current.1 - previous.1, &mut out);
            vlq_encode(current.2 - previous.2, &mut out);
            previous_column = column;
            previous = current;
        }
        out
    }
}

/// Produce the text of `root` and a source map naming `file` as its output
pub fn flatten(root: &SourceNode, registry: &FileRegistry, file: &str) -> Flattened {
    let mut writer = MapWriter::new(registry);
    writer.write(root);

    let sources: Vec<String> = registry
        .files()
        .iter()
        .map(|source| {
            source
                .path
                .to_string_lossy()
                .cow_replace('\\', "/")
                .into_owned()
        })
        .collect();
    let contents: Vec<&str> = registry
        .files()
        .iter()
        .map(|source| source.source.as_str())
        .collect();

    let map = json!({
        "version": 3,
        "file": file,
        "sources": sources,
        "sourcesContent": contents,
        "names": [],
        "mappings": writer.mappings(),
    });

    Flattened {
        code: writer.code,
        map: map.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vlq() {
        let mut out = String::new();
        for value in [0, 1, -1, 16, 123] {
            vlq_encode(value, &mut out);
            out.push(' ');
        }
        assert_eq!(out, "A C D gB 2H ");
    }

    #[test]
    fn test_line_index_counts_utf16() {
        let source = "a\n\u{1F600}b";
        let index = LineIndex::new(source);
        assert_eq!(index.position(source, 0), (0, 0));
        assert_eq!(index.position(source, 2), (1, 0));
        assert_eq!(index.position(source, 6), (1, 2));
    }

    #[test]
    fn test_text_of_nested_groups() {
        let inner = Rc::new(SourceNode::Group(vec![
            SourceNode::generated("b"),
            SourceNode::generated("c"),
        ]));
        let root = SourceNode::Group(vec![SourceNode::generated("a"), inner]);
        assert_eq!(root.to_text(), "abc");
    }
}
