use anyhow::{anyhow, Result};
use std::path::Path;
use tree_sitter::{Language, Parser};

use super::extract::{extract_symbols, leading_comment_header};
use super::symbols::FileAnalysis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageId {
    Typescript,
    Tsx,
    Javascript,
    Rust,
    Python,
    Go,
}

pub fn language_id_for_path(path: &Path) -> Option<LanguageId> {
    match path.extension().and_then(|s| s.to_str()) {
        Some("ts") | Some("mts") | Some("cts") => Some(LanguageId::Typescript),
        Some("tsx") => Some(LanguageId::Tsx),
        Some("js") | Some("jsx") | Some("mjs") | Some("cjs") => Some(LanguageId::Javascript),
        Some("rs") => Some(LanguageId::Rust),
        Some("py") | Some("pyi") => Some(LanguageId::Python),
        Some("go") => Some(LanguageId::Go),
        _ => None,
    }
}

pub fn language_for_id(id: LanguageId) -> Language {
    match id {
        LanguageId::Typescript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        LanguageId::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        LanguageId::Javascript => tree_sitter_javascript::LANGUAGE.into(),
        LanguageId::Rust => tree_sitter_rust::LANGUAGE.into(),
        LanguageId::Python => tree_sitter_python::LANGUAGE.into(),
        LanguageId::Go => tree_sitter_go::LANGUAGE.into(),
    }
}

pub fn parser_for_id(id: LanguageId) -> Result<Parser> {
    let mut parser = Parser::new();
    parser.set_language(&language_for_id(id))?;
    Ok(parser)
}

/// Turns one source file into a header plus a symbol tree.
pub trait StructuralParser: Send + Sync {
    fn is_supported(&self, path: &Path) -> bool;

    fn analyze(&self, path: &Path, source: &str) -> Result<FileAnalysis>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TreeSitterParser;

impl StructuralParser for TreeSitterParser {
    fn is_supported(&self, path: &Path) -> bool {
        language_id_for_path(path).is_some()
    }

    fn analyze(&self, path: &Path, source: &str) -> Result<FileAnalysis> {
        let lang = language_id_for_path(path)
            .ok_or_else(|| anyhow!("Unsupported source file: {}", path.display()))?;
        let mut parser = parser_for_id(lang)?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| anyhow!("Failed to parse {}", path.display()))?;
        Ok(FileAnalysis {
            header: leading_comment_header(source),
            symbols: extract_symbols(lang, tree.root_node(), source),
            line_count: source.lines().count(),
        })
    }
}
