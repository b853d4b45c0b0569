use serde::Serialize;

pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterNode {
    pub label: String,
    pub path_pattern: Option<String>,
    /// Set on leaves only.
    pub files: Vec<String>,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
    pub depth: usize,
}

impl ClusterNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Cluster hierarchy stored as a flat arena; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterTree {
    nodes: Vec<ClusterNode>,
}

impl ClusterTree {
    pub fn with_root(label: impl Into<String>, path_pattern: Option<String>) -> Self {
        Self {
            nodes: vec![ClusterNode {
                label: label.into(),
                path_pattern,
                files: Vec::new(),
                children: Vec::new(),
                parent: None,
                depth: 0,
            }],
        }
    }

    pub const ROOT: NodeId = 0;

    pub fn add_child(
        &mut self,
        parent: NodeId,
        label: impl Into<String>,
        path_pattern: Option<String>,
    ) -> NodeId {
        let id = self.nodes.len();
        let depth = self.nodes[parent].depth + 1;
        self.nodes.push(ClusterNode {
            label: label.into(),
            path_pattern,
            files: Vec::new(),
            children: Vec::new(),
            parent: Some(parent),
            depth,
        });
        self.nodes[parent].children.push(id);
        id
    }

    pub fn set_files(&mut self, node: NodeId, files: Vec<String>) {
        self.nodes[node].files = files;
    }

    pub fn set_label(&mut self, node: NodeId, label: impl Into<String>) {
        self.nodes[node].label = label.into();
    }

    pub fn node(&self, id: NodeId) -> &ClusterNode {
        &self.nodes[id]
    }

    pub fn root(&self) -> &ClusterNode {
        &self.nodes[Self::ROOT]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn leaves(&self) -> impl Iterator<Item = &ClusterNode> {
        self.nodes.iter().filter(|n| n.is_leaf())
    }

    /// Leaf files in depth-first order.
    pub fn all_files(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut stack = vec![Self::ROOT];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            out.extend(node.files.iter().map(String::as_str));
            stack.extend(node.children.iter().rev());
        }
        out
    }

    pub fn max_depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    /// Indented outline; leaves list up to `files_per_leaf` files.
    pub fn render(&self, files_per_leaf: usize) -> String {
        let mut out = String::new();
        let mut stack = vec![Self::ROOT];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            let indent = "  ".repeat(node.depth);
            let count = self.file_count(id);
            out.push_str(&format!("{indent}- {} ({count} files)", node.label));
            if let Some(pattern) = &node.path_pattern {
                if pattern != &node.label {
                    out.push_str(&format!(" [{pattern}]"));
                }
            }
            out.push('\n');
            if node.is_leaf() {
                for file in node.files.iter().take(files_per_leaf) {
                    out.push_str(&format!("{indent}    {file}\n"));
                }
                if node.files.len() > files_per_leaf {
                    out.push_str(&format!(
                        "{indent}    ... {} more\n",
                        node.files.len() - files_per_leaf
                    ));
                }
            }
            stack.extend(node.children.iter().rev());
        }
        out
    }

    pub fn file_count(&self, id: NodeId) -> usize {
        let node = &self.nodes[id];
        node.files.len()
            + node
                .children
                .iter()
                .map(|&c| self.file_count(c))
                .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ClusterTree {
        let mut tree = ClusterTree::with_root("repo", None);
        let a = tree.add_child(ClusterTree::ROOT, "auth", Some("src/auth/**".into()));
        let b = tree.add_child(ClusterTree::ROOT, "docs", Some("**/*.md".into()));
        tree.set_files(a, vec!["src/auth/jwt.rs".into(), "src/auth/session.rs".into()]);
        tree.set_files(b, vec!["README.md".into()]);
        tree
    }

    #[test]
    fn arena_tracks_parents_and_depth() {
        let tree = sample();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.node(1).parent, Some(ClusterTree::ROOT));
        assert_eq!(tree.node(2).depth, 1);
        assert!(!tree.root().is_leaf());
        assert_eq!(tree.leaves().count(), 2);
        assert_eq!(tree.max_depth(), 1);
    }

    #[test]
    fn all_files_walks_children_in_order() {
        let tree = sample();
        assert_eq!(
            tree.all_files(),
            vec!["src/auth/jwt.rs", "src/auth/session.rs", "README.md"]
        );
        assert_eq!(tree.file_count(ClusterTree::ROOT), 3);
    }

    #[test]
    fn render_truncates_long_leaves() {
        let tree = sample();
        let text = tree.render(1);
        assert!(text.starts_with("- repo (3 files)\n"));
        assert!(text.contains("  - auth (2 files) [src/auth/**]\n"));
        assert!(text.contains("      src/auth/jwt.rs\n"));
        assert!(text.contains("      ... 1 more\n"));
        assert!(!text.contains("session.rs"));
    }
}
