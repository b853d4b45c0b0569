use ignore::WalkBuilder;
use std::path::PathBuf;
use tracing::warn;

use crate::path::RepoPaths;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub relative_path: String,
    pub is_directory: bool,
    pub depth: usize,
}

#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Root-relative subtree to restrict the walk to.
    pub target_path: Option<String>,
    pub depth_limit: Option<usize>,
    pub include_directories: bool,
}

/// Gitignore-aware walk of the root (or a subtree of it), sorted by
/// relative path. Ignored prefixes are pruned before descent.
pub fn walk(paths: &RepoPaths, options: &WalkOptions) -> Vec<WalkEntry> {
    let start = match options.target_path.as_deref() {
        Some(target) if !target.is_empty() && target != "." => paths.absolute(target),
        _ => paths.root().to_path_buf(),
    };

    let filter_paths = paths.clone();
    let mut builder = WalkBuilder::new(&start);
    builder
        .hidden(false)
        .git_ignore(true)
        .git_exclude(true)
        .require_git(false)
        .follow_links(false)
        .filter_entry(move |entry| match filter_paths.relative(entry.path()) {
            Ok(rel) => rel == "." || !filter_paths.is_ignored(&rel),
            Err(_) => false,
        });
    if let Some(depth) = options.depth_limit {
        builder.max_depth(Some(depth));
    }

    let mut out = Vec::new();
    for entry in builder.build() {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                warn!("skipping entry: {err}");
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }
        let is_directory = entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
        let is_file = entry.file_type().map(|ft| ft.is_file()).unwrap_or(false);
        if !is_file && !(is_directory && options.include_directories) {
            continue;
        }
        let Ok(relative_path) = paths.relative(entry.path()) else {
            continue;
        };
        out.push(WalkEntry {
            path: entry.path().to_path_buf(),
            relative_path,
            is_directory,
            depth: entry.depth(),
        });
    }

    out.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/auth")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::write(root.join("src/auth/jwt.ts"), "export {}").unwrap();
        fs::write(root.join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(root.join("node_modules/pkg/index.js"), "x").unwrap();
        fs::write(root.join("README.md"), "# hi").unwrap();
        fs::write(root.join("debug.log"), "noise").unwrap();
        fs::write(root.join(".gitignore"), "*.log\n").unwrap();
        dir
    }

    fn repo(dir: &tempfile::TempDir) -> RepoPaths {
        let root = dunce::canonicalize(dir.path()).unwrap();
        RepoPaths::new(root, &["node_modules".to_string()])
    }

    #[test]
    fn walks_sorted_and_honors_ignores() {
        let dir = tree();
        let rels: Vec<String> = walk(&repo(&dir), &WalkOptions::default())
            .into_iter()
            .map(|e| e.relative_path)
            .collect();
        assert_eq!(
            rels,
            vec![".gitignore", "README.md", "src/auth/jwt.ts", "src/main.rs"]
        );
    }

    #[test]
    fn target_path_and_depth_limit_restrict_the_walk() {
        let dir = tree();
        let opts = WalkOptions {
            target_path: Some("src".into()),
            depth_limit: Some(1),
            include_directories: true,
        };
        let entries = walk(&repo(&dir), &opts);
        let rels: Vec<(&str, bool)> = entries
            .iter()
            .map(|e| (e.relative_path.as_str(), e.is_directory))
            .collect();
        assert_eq!(rels, vec![("src/auth", true), ("src/main.rs", false)]);
        assert!(entries.iter().all(|e| e.depth == 1));
    }
}
