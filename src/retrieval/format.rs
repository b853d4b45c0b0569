use super::callsites::CallSiteReport;
use super::files::FileHit;
use super::identifiers::IdentifierHit;
use super::ranking::{normalize_threshold, percent, HybridOptions, Scores};
use crate::navigator::ClusterTree;

const SYMBOLS_PER_FILE: usize = 6;
const FILES_PER_LEAF: usize = 12;

fn plural(n: usize, one: &str, many: &str) -> String {
    format!("{} {}", n, if n == 1 { one } else { many })
}

pub fn score_line(scores: &Scores) -> String {
    let mut line = format!(
        "combined {:.1}% | semantic {:.1}% | keyword {:.1}%",
        percent(scores.combined),
        percent(scores.semantic),
        percent(scores.keyword)
    );
    if scores.raw_semantic < 0.0 {
        line.push_str(&format!(" (raw semantic {:.1}%)", percent(scores.raw_semantic)));
    }
    line
}

/// Explicit empty result, naming the filters that were active.
pub fn no_matches(query: &str, options: &HybridOptions) -> String {
    let mut filters = Vec::new();
    for (name, value) in [
        ("semantic", options.min_semantic_score),
        ("keyword", options.min_keyword_score),
        ("combined", options.min_combined_score),
    ] {
        let v = normalize_threshold(value);
        if v > 0.0 {
            filters.push(format!("min {name} {:.1}%", percent(v)));
        }
    }
    if options.require_keyword_match {
        filters.push("keyword match required".to_string());
    }
    if options.require_semantic_match {
        filters.push("semantic match required".to_string());
    }
    let mut out = format!("No matches for \"{query}\"");
    if !filters.is_empty() {
        out.push_str(&format!(" ({})", filters.join(", ")));
    }
    out.push('\n');
    out
}

pub fn file_report(query: &str, hits: &[FileHit], options: &HybridOptions) -> String {
    if hits.is_empty() {
        return no_matches(query, options);
    }
    let mut out = format!(
        "{} for \"{query}\"\n",
        plural(hits.len(), "result", "results")
    );
    for (i, hit) in hits.iter().enumerate() {
        out.push_str(&format!("\n{}. {}\n", i + 1, hit.path));
        out.push_str(&format!("   {}\n", score_line(&hit.scores)));
        if !hit.header.is_empty() {
            out.push_str(&format!("   {}\n", hit.header));
        }
        if !hit.matched_symbols.is_empty() {
            let symbols: Vec<String> = hit
                .matched_symbols
                .iter()
                .take(SYMBOLS_PER_FILE)
                .map(|s| format!("{} ({} {}-{})", s.name, s.kind, s.line, s.end_line))
                .collect();
            out.push_str(&format!("   symbols: {}\n", symbols.join(", ")));
        }
    }
    out
}

pub fn call_sites_block(report: &CallSiteReport, indent: &str) -> String {
    let mut out = format!(
        "{indent}calls {}/{}\n",
        report.sites.len(),
        report.total
    );
    for site in &report.sites {
        out.push_str(&format!(
            "{indent}  {}:{}  {}  [{:.1}%]\n",
            site.path,
            site.line,
            site.text,
            percent(site.scores.combined)
        ));
    }
    out
}

pub fn identifier_report(query: &str, hits: &[IdentifierHit], options: &HybridOptions) -> String {
    if hits.is_empty() {
        return no_matches(query, options);
    }
    let mut out = format!(
        "{} for \"{query}\"\n",
        plural(hits.len(), "result", "results")
    );
    for (i, hit) in hits.iter().enumerate() {
        let ident = &hit.identifier;
        out.push_str(&format!(
            "\n{}. {} ({})  {}:{}-{}\n",
            i + 1,
            ident.name,
            ident.kind,
            ident.path,
            ident.line,
            ident.end_line
        ));
        out.push_str(&format!("   {}\n", score_line(&hit.scores)));
        if !ident.signature.is_empty() {
            out.push_str(&format!("   {}\n", ident.signature));
        }
        if let Some(parent) = &ident.parent_name {
            out.push_str(&format!("   in {parent}\n"));
        }
        if let Some(calls) = &hit.calls {
            out.push_str(&call_sites_block(calls, "   "));
        }
    }
    out
}

pub fn call_site_report(name: &str, location: &str, report: &CallSiteReport) -> String {
    if report.total == 0 {
        return format!("No call sites for {name} ({location})\n");
    }
    let mut out = format!(
        "{} of {name} ({location}), showing {}\n",
        plural(report.total, "call site", "call sites"),
        report.sites.len()
    );
    for (i, site) in report.sites.iter().enumerate() {
        out.push_str(&format!("\n{}. {}:{}\n", i + 1, site.path, site.line));
        out.push_str(&format!("   {}\n", score_line(&site.scores)));
        for line in site.snippet.lines() {
            out.push_str(&format!("   | {line}\n"));
        }
    }
    out
}

pub fn navigation_report(tree: &ClusterTree) -> String {
    let files = tree.file_count(ClusterTree::ROOT);
    if files == 0 {
        return "No indexed files to navigate\n".to_string();
    }
    let leaves = tree.leaves().count();
    format!(
        "{} in {} (depth {})\n\n{}",
        plural(files, "file", "files"),
        plural(leaves, "cluster", "clusters"),
        tree.max_depth(),
        tree.render(FILES_PER_LEAF)
    )
}

/// Report for a search the provider could not serve.
pub fn unavailable(what: &str, reason: &str) -> String {
    format!("{what} unavailable: {reason}\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::{SymbolEntry, SymbolKind};
    use crate::retrieval::callsites::CallSite;

    fn scores(combined: f32) -> Scores {
        Scores {
            semantic: combined,
            raw_semantic: combined,
            keyword: 0.5,
            combined,
        }
    }

    #[test]
    fn empty_results_say_so_with_active_filters() {
        let options = HybridOptions {
            min_combined_score: 90.0,
            require_keyword_match: true,
            ..HybridOptions::default()
        };
        assert_eq!(
            file_report("quantum flux", &[], &options),
            "No matches for \"quantum flux\" (min combined 90.0%, keyword match required)\n"
        );
        assert_eq!(
            no_matches("x", &HybridOptions::default()),
            "No matches for \"x\"\n"
        );
    }

    #[test]
    fn file_results_list_scores_and_symbols() {
        let hits = vec![FileHit {
            path: "src/auth/jwt.ts".into(),
            header: "JWT authentication".into(),
            matched_symbols: vec![SymbolEntry {
                name: "verifyToken".into(),
                kind: SymbolKind::Function,
                line: 12,
                end_line: 30,
                signature: "export function verifyToken()".into(),
            }],
            scores: scores(0.8123),
        }];
        let text = file_report("verify token", &hits, &HybridOptions::default());
        assert!(text.starts_with("1 result for \"verify token\"\n"));
        assert!(text.contains("1. src/auth/jwt.ts\n"));
        assert!(text.contains("combined 81.2% | semantic 81.2% | keyword 50.0%"));
        assert!(text.contains("symbols: verifyToken (function 12-30)"));
    }

    #[test]
    fn negative_cosine_is_shown_raw() {
        let s = Scores {
            semantic: 0.0,
            raw_semantic: -0.25,
            keyword: 1.0,
            combined: 0.25,
        };
        assert!(score_line(&s).ends_with("(raw semantic -25.0%)"));
    }

    #[test]
    fn call_site_blocks_show_shown_over_total() {
        let report = CallSiteReport {
            sites: vec![CallSite {
                path: "src/api.rs".into(),
                line: 2,
                text: "if verify(t) {".into(),
                snippet: "fn login() {\n    if verify(t) {".into(),
                scores: scores(0.7),
            }],
            total: 50,
        };
        let block = call_sites_block(&report, "   ");
        assert!(block.starts_with("   calls 1/50\n"));
        assert!(block.contains("src/api.rs:2  if verify(t) {  [70.0%]"));

        let full = call_site_report("verify", "src/auth.rs:1", &report);
        assert!(full.starts_with("50 call sites of verify (src/auth.rs:1), showing 1\n"));
        assert!(full.contains("   |     if verify(t) {\n"));
    }
}
