use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Struct,
    Enum,
    Interface,
    Type,
    Trait,
    Const,
    Variable,
    Export,
}

impl SymbolKind {
    pub const ALL: [SymbolKind; 11] = [
        SymbolKind::Function,
        SymbolKind::Method,
        SymbolKind::Class,
        SymbolKind::Struct,
        SymbolKind::Enum,
        SymbolKind::Interface,
        SymbolKind::Type,
        SymbolKind::Trait,
        SymbolKind::Const,
        SymbolKind::Variable,
        SymbolKind::Export,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Class => "class",
            SymbolKind::Struct => "struct",
            SymbolKind::Enum => "enum",
            SymbolKind::Interface => "interface",
            SymbolKind::Type => "type",
            SymbolKind::Trait => "trait",
            SymbolKind::Const => "const",
            SymbolKind::Variable => "variable",
            SymbolKind::Export => "export",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "function" | "fn" | "func" => Some(SymbolKind::Function),
            "method" => Some(SymbolKind::Method),
            "class" => Some(SymbolKind::Class),
            "struct" => Some(SymbolKind::Struct),
            "enum" => Some(SymbolKind::Enum),
            "interface" => Some(SymbolKind::Interface),
            "type" | "type_alias" => Some(SymbolKind::Type),
            "trait" => Some(SymbolKind::Trait),
            "const" | "constant" => Some(SymbolKind::Const),
            "variable" | "var" | "let" => Some(SymbolKind::Variable),
            "export" => Some(SymbolKind::Export),
            _ => None,
        }
    }

    /// Kinds whose uses look like `name(`.
    pub fn is_callable(self) -> bool {
        matches!(self, SymbolKind::Function | SymbolKind::Method)
    }

    /// Kinds that may own member symbols in the tree.
    pub fn can_own_members(self) -> bool {
        matches!(
            self,
            SymbolKind::Class
                | SymbolKind::Struct
                | SymbolKind::Enum
                | SymbolKind::Interface
                | SymbolKind::Type
                | SymbolKind::Trait
        )
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolNode {
    pub name: String,
    pub kind: SymbolKind,
    /// 1-based.
    pub line: usize,
    pub end_line: usize,
    pub signature: String,
    pub children: Vec<SymbolNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub header: String,
    pub symbols: Vec<SymbolNode>,
    pub line_count: usize,
}

impl FileAnalysis {
    /// Depth-first flattening paired with the enclosing symbol's name.
    pub fn flatten(&self) -> Vec<(&SymbolNode, Option<&str>)> {
        let mut out = Vec::new();
        for symbol in &self.symbols {
            push_flat(symbol, None, &mut out);
        }
        out
    }
}

fn push_flat<'a>(
    node: &'a SymbolNode,
    parent: Option<&'a str>,
    out: &mut Vec<(&'a SymbolNode, Option<&'a str>)>,
) {
    out.push((node, parent));
    for child in &node.children {
        push_flat(child, Some(node.name.as_str()), out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_round_trips_through_its_name() {
        for kind in SymbolKind::ALL {
            assert_eq!(SymbolKind::parse(kind.as_str()), Some(kind));
            assert_eq!(kind.to_string(), kind.as_str());
        }
        assert_eq!(SymbolKind::parse("nonsense"), None);
    }

    #[test]
    fn only_functions_and_methods_are_callable() {
        let callable: Vec<_> = SymbolKind::ALL
            .into_iter()
            .filter(|k| k.is_callable())
            .collect();
        assert_eq!(callable, vec![SymbolKind::Function, SymbolKind::Method]);
    }

    #[test]
    fn flatten_reports_parent_names() {
        let analysis = FileAnalysis {
            header: String::new(),
            symbols: vec![SymbolNode {
                name: "Server".into(),
                kind: SymbolKind::Struct,
                line: 1,
                end_line: 3,
                signature: "pub struct Server".into(),
                children: vec![SymbolNode {
                    name: "start".into(),
                    kind: SymbolKind::Method,
                    line: 5,
                    end_line: 7,
                    signature: "pub fn start(&self)".into(),
                    children: vec![],
                }],
            }],
            line_count: 7,
        };
        let flat = analysis.flatten();
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0].1, None);
        assert_eq!(flat[1].0.name, "start");
        assert_eq!(flat[1].1, Some("Server"));
    }
}
