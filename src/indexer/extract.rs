use tree_sitter::Node;

use super::parser::LanguageId;
use super::symbols::{SymbolKind, SymbolNode};
use crate::text::truncate_chars;

const MAX_SIGNATURE_CHARS: usize = 200;
const MAX_HEADER_LINE_CHARS: usize = 160;
const HEADER_LINES: usize = 2;

#[derive(Debug, Clone, Copy)]
enum Rule {
    /// Named declaration without tracked members.
    Leaf(SymbolKind),
    /// Named declaration whose `body` holds member declarations.
    Container(SymbolKind),
    /// Rust `impl` block; members attach to the implemented type.
    Impl,
    /// Go method; attaches to its receiver type.
    ReceiverMethod,
    /// Wrapper around a declaration (`export`, decorators).
    Unwrap,
    /// Variable-style declaration lists.
    Bindings,
    /// Go `type` groups.
    TypeSpecs,
    /// Module body whose items count as top level.
    Descend,
}

fn rule_for(lang: LanguageId, kind: &str) -> Option<Rule> {
    use SymbolKind as K;
    match lang {
        LanguageId::Rust => match kind {
            "function_item" | "function_signature_item" => Some(Rule::Leaf(K::Function)),
            "struct_item" | "union_item" => Some(Rule::Leaf(K::Struct)),
            "enum_item" => Some(Rule::Leaf(K::Enum)),
            "trait_item" => Some(Rule::Container(K::Trait)),
            "type_item" => Some(Rule::Leaf(K::Type)),
            "const_item" | "static_item" => Some(Rule::Leaf(K::Const)),
            "impl_item" => Some(Rule::Impl),
            "mod_item" => Some(Rule::Descend),
            _ => None,
        },
        LanguageId::Typescript | LanguageId::Tsx | LanguageId::Javascript => match kind {
            "function_declaration" | "generator_function_declaration" => {
                Some(Rule::Leaf(K::Function))
            }
            "class_declaration" | "abstract_class_declaration" | "class" => {
                Some(Rule::Container(K::Class))
            }
            "interface_declaration" => Some(Rule::Leaf(K::Interface)),
            "type_alias_declaration" => Some(Rule::Leaf(K::Type)),
            "enum_declaration" => Some(Rule::Leaf(K::Enum)),
            "method_definition" | "method_signature" | "abstract_method_signature" => {
                Some(Rule::Leaf(K::Method))
            }
            "lexical_declaration" | "variable_declaration" => Some(Rule::Bindings),
            "export_statement" => Some(Rule::Unwrap),
            _ => None,
        },
        LanguageId::Python => match kind {
            "function_definition" => Some(Rule::Leaf(K::Function)),
            "class_definition" => Some(Rule::Container(K::Class)),
            "decorated_definition" => Some(Rule::Unwrap),
            "expression_statement" => Some(Rule::Bindings),
            _ => None,
        },
        LanguageId::Go => match kind {
            "function_declaration" => Some(Rule::Leaf(K::Function)),
            "method_declaration" => Some(Rule::ReceiverMethod),
            "type_declaration" => Some(Rule::TypeSpecs),
            "const_declaration" | "var_declaration" => Some(Rule::Bindings),
            _ => None,
        },
    }
}

struct Ctx<'s> {
    lang: LanguageId,
    source: &'s str,
    /// Members found away from their owner, keyed by owner name.
    detached: Vec<(String, SymbolNode)>,
}

/// Builds the symbol tree for a parsed file. Function bodies are never
/// entered, so local helpers and closures are not reported.
pub fn extract_symbols(lang: LanguageId, root: Node<'_>, source: &str) -> Vec<SymbolNode> {
    let mut ctx = Ctx {
        lang,
        source,
        detached: Vec::new(),
    };
    let mut top = Vec::new();
    collect(&mut ctx, root, false, &mut top);

    for (owner, member) in std::mem::take(&mut ctx.detached) {
        match top
            .iter_mut()
            .find(|s| s.name == owner && s.kind.can_own_members())
        {
            Some(parent) => parent.children.push(member),
            None => top.push(member),
        }
    }

    sort_by_line(&mut top);
    top
}

fn sort_by_line(nodes: &mut [SymbolNode]) {
    nodes.sort_by_key(|n| n.line);
    for n in nodes.iter_mut() {
        sort_by_line(&mut n.children);
    }
}

fn collect(ctx: &mut Ctx<'_>, parent: Node<'_>, member: bool, out: &mut Vec<SymbolNode>) {
    let mut cursor = parent.walk();
    let children: Vec<Node<'_>> = parent.named_children(&mut cursor).collect();
    for node in children {
        let Some(rule) = rule_for(ctx.lang, node.kind()) else {
            continue;
        };
        match rule {
            Rule::Leaf(kind) => {
                if let Some(name) = field_text(node, "name", ctx.source) {
                    out.push(symbol(name, member_kind(kind, member), node, ctx.source));
                }
            }
            Rule::Container(kind) => {
                if let Some(name) = field_text(node, "name", ctx.source) {
                    let mut sym = symbol(name, kind, node, ctx.source);
                    if let Some(body) = node.child_by_field_name("body") {
                        collect(ctx, body, true, &mut sym.children);
                    }
                    out.push(sym);
                }
            }
            Rule::Impl => {
                let Some(owner) = node
                    .child_by_field_name("type")
                    .map(|t| bare_type_name(node_text(t, ctx.source)))
                else {
                    continue;
                };
                if let Some(body) = node.child_by_field_name("body") {
                    let mut members = Vec::new();
                    collect(ctx, body, true, &mut members);
                    ctx.detached
                        .extend(members.into_iter().map(|m| (owner.clone(), m)));
                }
            }
            Rule::ReceiverMethod => {
                let Some(name) = field_text(node, "name", ctx.source) else {
                    continue;
                };
                let sym = symbol(name, SymbolKind::Method, node, ctx.source);
                match go_receiver_type(node, ctx.source) {
                    Some(owner) => ctx.detached.push((owner, sym)),
                    None => out.push(sym),
                }
            }
            Rule::Unwrap => {
                collect(ctx, node, member, out);
                if ctx.lang != LanguageId::Python {
                    collect_export_clause(node, ctx.source, out);
                }
            }
            Rule::Bindings => collect_bindings(ctx, node, member, out),
            Rule::TypeSpecs => collect_go_types(node, ctx.source, out),
            Rule::Descend => {
                if let Some(body) = node.child_by_field_name("body") {
                    collect(ctx, body, member, out);
                }
            }
        }
    }
}

fn member_kind(kind: SymbolKind, member: bool) -> SymbolKind {
    if member && kind == SymbolKind::Function {
        SymbolKind::Method
    } else {
        kind
    }
}

fn collect_bindings(ctx: &Ctx<'_>, node: Node<'_>, member: bool, out: &mut Vec<SymbolNode>) {
    let source = ctx.source;
    let mut cursor = node.walk();
    match ctx.lang {
        LanguageId::Typescript | LanguageId::Tsx | LanguageId::Javascript => {
            let is_const = node.child(0).map(|c| c.kind()) == Some("const");
            for decl in node.named_children(&mut cursor) {
                if decl.kind() != "variable_declarator" {
                    continue;
                }
                let Some(name_node) = decl.child_by_field_name("name") else {
                    continue;
                };
                if name_node.kind() != "identifier" {
                    continue;
                }
                let value_kind = decl.child_by_field_name("value").map(|v| v.kind());
                let kind = match value_kind {
                    Some("arrow_function") | Some("function_expression") | Some("function") => {
                        SymbolKind::Function
                    }
                    Some("class") => SymbolKind::Class,
                    _ if is_const => SymbolKind::Const,
                    _ => SymbolKind::Variable,
                };
                let mut sym = symbol(
                    node_text(name_node, source).to_string(),
                    member_kind(kind, member),
                    decl,
                    source,
                );
                sym.signature = signature_of(node, source);
                out.push(sym);
            }
        }
        LanguageId::Python => {
            for assignment in node.named_children(&mut cursor) {
                if assignment.kind() != "assignment" {
                    continue;
                }
                let Some(left) = assignment.child_by_field_name("left") else {
                    continue;
                };
                if left.kind() != "identifier" {
                    continue;
                }
                let name = node_text(left, source).to_string();
                let kind = if is_screaming_case(&name) {
                    SymbolKind::Const
                } else {
                    SymbolKind::Variable
                };
                out.push(symbol(name, kind, assignment, source));
            }
        }
        LanguageId::Go => {
            let kind = if node.kind() == "const_declaration" {
                SymbolKind::Const
            } else {
                SymbolKind::Variable
            };
            for spec in node.named_children(&mut cursor) {
                if spec.kind() != "const_spec" && spec.kind() != "var_spec" {
                    continue;
                }
                if let Some(name) = field_text(spec, "name", source) {
                    out.push(symbol(name, kind, spec, source));
                }
            }
        }
        LanguageId::Rust => {}
    }
}

fn collect_go_types(node: Node<'_>, source: &str, out: &mut Vec<SymbolNode>) {
    let mut cursor = node.walk();
    for spec in node.named_children(&mut cursor) {
        if spec.kind() != "type_spec" && spec.kind() != "type_alias" {
            continue;
        }
        let Some(name) = field_text(spec, "name", source) else {
            continue;
        };
        let kind = match spec.child_by_field_name("type").map(|t| t.kind()) {
            Some("struct_type") => SymbolKind::Struct,
            Some("interface_type") => SymbolKind::Interface,
            _ => SymbolKind::Type,
        };
        let mut sym = symbol(name, kind, spec, source);
        if !sym.signature.starts_with("type ") {
            sym.signature = format!("type {}", sym.signature);
        }
        out.push(sym);
    }
}

fn collect_export_clause(node: Node<'_>, source: &str, out: &mut Vec<SymbolNode>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() != "export_clause" {
            continue;
        }
        let mut inner = child.walk();
        for spec in child.named_children(&mut inner) {
            if spec.kind() != "export_specifier" {
                continue;
            }
            let name = spec
                .child_by_field_name("alias")
                .or_else(|| spec.child_by_field_name("name"))
                .map(|n| node_text(n, source).to_string());
            if let Some(name) = name {
                let mut sym = symbol(name, SymbolKind::Export, spec, source);
                sym.signature = signature_of(node, source);
                out.push(sym);
            }
        }
    }
}

fn go_receiver_type(node: Node<'_>, source: &str) -> Option<String> {
    let receiver = node.child_by_field_name("receiver")?;
    let mut cursor = receiver.walk();
    let param = receiver
        .named_children(&mut cursor)
        .find(|c| c.kind() == "parameter_declaration")?;
    let ty = param.child_by_field_name("type")?;
    let name = bare_type_name(node_text(ty, source));
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// `&mut foo::Bar<T>` and `*Bar[T]` both become `Bar`.
fn bare_type_name(raw: &str) -> String {
    let trimmed = raw.trim_start_matches(['&', '*', ' ']).trim_start_matches("mut ");
    let cut = trimmed
        .find(['<', '['])
        .map(|i| &trimmed[..i])
        .unwrap_or(trimmed);
    cut.rsplit("::")
        .next()
        .unwrap_or(cut)
        .rsplit('.')
        .next()
        .unwrap_or(cut)
        .trim()
        .to_string()
}

fn is_screaming_case(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_alphabetic())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn symbol(name: String, kind: SymbolKind, node: Node<'_>, source: &str) -> SymbolNode {
    SymbolNode {
        name,
        kind,
        line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        signature: signature_of(node, source),
        children: Vec::new(),
    }
}

fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

fn field_text(node: Node<'_>, field: &str, source: &str) -> Option<String> {
    node.child_by_field_name(field)
        .map(|n| node_text(n, source).to_string())
        .filter(|s| !s.is_empty())
}

/// First line of the declaration, cut before any opening brace.
fn signature_of(node: Node<'_>, source: &str) -> String {
    let text = node_text(node, source);
    let first = text.lines().next().unwrap_or("");
    let cut = first.split('{').next().unwrap_or(first).trim();
    truncate_chars(cut, MAX_SIGNATURE_CHARS).to_string()
}

const LINE_COMMENT_PREFIXES: &[&str] = &["///", "//!", "//", "#", "--"];

/// First lines of leading comment text, markers stripped, joined by a space.
pub fn leading_comment_header(source: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut block_end: Option<&str> = None;

    for raw in source.lines() {
        if lines.len() >= HEADER_LINES {
            break;
        }
        let line = raw.trim();

        if let Some(end) = block_end {
            let (body, closed) = match line.find(end) {
                Some(idx) => (&line[..idx], true),
                None => (line, false),
            };
            push_header_line(&mut lines, body.trim_start_matches('*'));
            if closed {
                block_end = None;
            }
            continue;
        }

        if line.is_empty() || line.starts_with("#!") {
            if lines.is_empty() {
                continue;
            }
            break;
        }

        if let Some((open, close)) = [("/**", "*/"), ("/*", "*/"), ("\"\"\"", "\"\"\""), ("'''", "'''")]
            .iter()
            .find(|(open, _)| line.starts_with(open))
        {
            let rest = &line[open.len()..];
            match rest.find(close) {
                Some(idx) => push_header_line(&mut lines, &rest[..idx]),
                None => {
                    push_header_line(&mut lines, rest);
                    block_end = Some(close);
                }
            }
            continue;
        }

        match LINE_COMMENT_PREFIXES.iter().find(|p| line.starts_with(*p)) {
            Some(prefix) => push_header_line(&mut lines, &line[prefix.len()..]),
            None => break,
        }
    }

    lines.join(" ")
}

fn push_header_line(lines: &mut Vec<String>, text: &str) {
    let text = text.trim();
    if text.is_empty() || lines.len() >= HEADER_LINES {
        return;
    }
    lines.push(truncate_chars(text, MAX_HEADER_LINE_CHARS).to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::parser::{parser_for_id, LanguageId};
    use test_case::test_case;

    fn extract(lang: LanguageId, src: &str) -> Vec<SymbolNode> {
        let mut parser = parser_for_id(lang).unwrap();
        let tree = parser.parse(src, None).unwrap();
        extract_symbols(lang, tree.root_node(), src)
    }

    fn names(nodes: &[SymbolNode]) -> Vec<(&str, SymbolKind)> {
        nodes.iter().map(|n| (n.name.as_str(), n.kind)).collect()
    }

    #[test]
    fn rust_impl_methods_attach_to_their_struct() {
        let src = r#"
pub struct Server {
    port: u16,
}

impl Server {
    pub fn start(&self) -> Result<()> {
        let inner = || 1;
        Ok(())
    }
}

impl Missing {
    fn orphan(&self) {}
}

pub const LIMIT: usize = 3;
"#;
        let syms = extract(LanguageId::Rust, src);
        assert_eq!(
            names(&syms),
            vec![
                ("Server", SymbolKind::Struct),
                ("orphan", SymbolKind::Method),
                ("LIMIT", SymbolKind::Const),
            ]
        );
        let server = &syms[0];
        assert_eq!(names(&server.children), vec![("start", SymbolKind::Method)]);
        assert_eq!(
            server.children[0].signature,
            "pub fn start(&self) -> Result<()>"
        );
        assert_eq!(server.children[0].line, 7);
        assert_eq!(server.children[0].end_line, 10);
    }

    #[test]
    fn rust_trait_members_are_methods() {
        let src = "pub trait Store {\n    fn get(&self, k: &str) -> Option<String>;\n}\n";
        let syms = extract(LanguageId::Rust, src);
        assert_eq!(names(&syms), vec![("Store", SymbolKind::Trait)]);
        assert_eq!(names(&syms[0].children), vec![("get", SymbolKind::Method)]);
    }

    #[test]
    fn typescript_exports_classes_and_bindings() {
        let src = r#"
export class AuthService {
  verifyToken(token: string): boolean {
    return true;
  }
}
export const handler = async (req: Request) => {
  return 1;
};
export interface Session { id: string }
type Id = string;
const MAX = 3;
export { handler as main };
"#;
        let syms = extract(LanguageId::Typescript, src);
        assert_eq!(
            names(&syms),
            vec![
                ("AuthService", SymbolKind::Class),
                ("handler", SymbolKind::Function),
                ("Session", SymbolKind::Interface),
                ("Id", SymbolKind::Type),
                ("MAX", SymbolKind::Const),
                ("main", SymbolKind::Export),
            ]
        );
        assert_eq!(
            names(&syms[0].children),
            vec![("verifyToken", SymbolKind::Method)]
        );
        assert_eq!(
            syms[1].signature,
            "const handler = async (req: Request) =>"
        );
    }

    #[test]
    fn python_classes_decorators_and_constants() {
        let src = r#"
TIMEOUT = 30
cache = {}

class Repo:
    def load(self):
        def inner():
            pass
        return 1

@app.route("/")
def index():
    return "ok"
"#;
        let syms = extract(LanguageId::Python, src);
        assert_eq!(
            names(&syms),
            vec![
                ("TIMEOUT", SymbolKind::Const),
                ("cache", SymbolKind::Variable),
                ("Repo", SymbolKind::Class),
                ("index", SymbolKind::Function),
            ]
        );
        assert_eq!(names(&syms[2].children), vec![("load", SymbolKind::Method)]);
    }

    #[test]
    fn go_methods_attach_to_receiver_struct() {
        let src = r#"package main

type Server struct {
	port int
}

type Handler interface {
	Serve()
}

func (s *Server) Start() error {
	return nil
}

func main() {}

const Version = "1"
"#;
        let syms = extract(LanguageId::Go, src);
        assert_eq!(
            names(&syms),
            vec![
                ("Server", SymbolKind::Struct),
                ("Handler", SymbolKind::Interface),
                ("main", SymbolKind::Function),
                ("Version", SymbolKind::Const),
            ]
        );
        assert_eq!(names(&syms[0].children), vec![("Start", SymbolKind::Method)]);
        assert_eq!(syms[0].signature, "type Server struct");
    }

    #[test_case("// Auth helpers.\n// JWT only.\n// ignored\nfn x() {}", "Auth helpers. JWT only."; "line comments")]
    #[test_case("/**\n * Payment processing.\n */\nexport {}", "Payment processing."; "jsdoc block")]
    #[test_case("#!/usr/bin/env python\n\"\"\"Math utils.\"\"\"\n", "Math utils."; "shebang then docstring")]
    #[test_case("fn main() {}\n// late comment", ""; "no leading comment")]
    #[test_case("# Title\n\n# after blank", "Title"; "blank line ends header")]
    fn header_extraction(src: &str, expected: &str) {
        assert_eq!(leading_comment_header(src), expected);
    }

    #[test]
    fn long_header_lines_are_truncated() {
        let src = format!("// {}\n", "a".repeat(500));
        assert_eq!(leading_comment_header(&src).chars().count(), MAX_HEADER_LINE_CHARS);
    }

    #[test_case("&mut foo::Bar<T>", "Bar"; "rust path with generics")]
    #[test_case("*Server", "Server"; "go pointer receiver")]
    #[test_case("List[T]", "List"; "go generic receiver")]
    fn bare_type_names(raw: &str, expected: &str) {
        assert_eq!(bare_type_name(raw), expected);
    }
}
