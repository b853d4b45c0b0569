use serde::{Deserialize, Serialize};
use std::path::Path;

use super::symbols::{FileAnalysis, SymbolKind};
use crate::text::truncate_chars;

const TEXT_HEADER_LINES: usize = 2;
const TEXT_HEADER_LINE_CHARS: usize = 160;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolEntry {
    pub name: String,
    pub kind: SymbolKind,
    pub line: usize,
    pub end_line: usize,
    pub signature: String,
}

/// One file in the whole-file index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub path: String,
    pub header: String,
    pub symbols: Vec<String>,
    pub symbol_entries: Vec<SymbolEntry>,
    pub content: String,
}

impl Document {
    /// Embedding input; also the string hashed for the cache.
    pub fn embedding_text(&self) -> String {
        let mut parts = vec![self.path.clone()];
        if !self.header.is_empty() {
            parts.push(self.header.clone());
        }
        if !self.symbols.is_empty() {
            parts.push(self.symbols.join(" "));
        }
        if !self.content.is_empty() {
            parts.push(self.content.clone());
        }
        parts.join("\n")
    }

    /// Text the keyword scorer matches against.
    pub fn keyword_text(&self) -> String {
        format!(
            "{} {} {} {}",
            self.path,
            self.header,
            self.symbols.join(" "),
            self.content
        )
    }
}

/// One symbol in the identifier index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierDocument {
    pub id: String,
    pub path: String,
    pub header: String,
    pub name: String,
    pub kind: SymbolKind,
    pub line: usize,
    pub end_line: usize,
    pub signature: String,
    pub parent_name: Option<String>,
    pub text: String,
}

impl IdentifierDocument {
    pub fn new(
        path: &str,
        header: &str,
        entry: &SymbolEntry,
        parent_name: Option<&str>,
    ) -> Self {
        let mut parts = vec![
            entry.name.clone(),
            entry.kind.as_str().to_string(),
            entry.signature.clone(),
            path.to_string(),
        ];
        if !header.is_empty() {
            parts.push(header.to_string());
        }
        if let Some(parent) = parent_name {
            parts.push(format!("in {}", parent));
        }
        Self {
            id: format!("{}:{}:{}", path, entry.name, entry.line),
            path: path.to_string(),
            header: header.to_string(),
            name: entry.name.clone(),
            kind: entry.kind,
            line: entry.line,
            end_line: entry.end_line,
            signature: entry.signature.clone(),
            parent_name: parent_name.map(str::to_string),
            text: parts.join("\n"),
        }
    }

    pub fn keyword_text(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.name,
            self.signature,
            self.path,
            self.header,
            self.parent_name.as_deref().unwrap_or("")
        )
    }
}

/// Non-code files indexed by header and raw text rather than symbols.
pub fn is_text_document(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with(".env") || name.ends_with(".lock") {
        return true;
    }
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("md" | "markdown" | "yaml" | "yml" | "json" | "toml")
    )
}

/// First non-blank lines, each truncated.
pub fn text_header(content: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(TEXT_HEADER_LINES)
        .map(|l| truncate_chars(l, TEXT_HEADER_LINE_CHARS).to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn text_document(path: &str, content: &str, max_chars: usize) -> Document {
    Document {
        path: path.to_string(),
        header: text_header(content),
        symbols: Vec::new(),
        symbol_entries: Vec::new(),
        content: truncate_chars(content, max_chars).to_string(),
    }
}

/// Whole-file document plus one identifier document per symbol.
pub fn code_documents(
    path: &str,
    analysis: &FileAnalysis,
    max_chars: usize,
) -> (Document, Vec<IdentifierDocument>) {
    let mut entries = Vec::new();
    let mut identifiers = Vec::new();
    for (node, parent) in analysis.flatten() {
        let entry = SymbolEntry {
            name: node.name.clone(),
            kind: node.kind,
            line: node.line,
            end_line: node.end_line,
            signature: node.signature.clone(),
        };
        identifiers.push(IdentifierDocument::new(path, &analysis.header, &entry, parent));
        entries.push(entry);
    }

    let signatures = entries
        .iter()
        .map(|e| e.signature.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let doc = Document {
        path: path.to_string(),
        header: analysis.header.clone(),
        symbols: entries.iter().map(|e| e.name.clone()).collect(),
        content: truncate_chars(&signatures, max_chars).to_string(),
        symbol_entries: entries,
    };
    (doc, identifiers)
}
