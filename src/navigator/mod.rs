//! Hierarchical file taxonomy built from embedding geometry alone.

pub mod labels;
pub mod patterns;
pub mod spectral;
pub mod tree;

pub use labels::{Completion, OllamaGenerator, SiblingGroup, TextGenerator};
pub use patterns::path_pattern;
pub use tree::{ClusterNode, ClusterTree, NodeId};

use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigatorOptions {
    pub max_depth: usize,
    pub max_clusters: usize,
    /// Groups at or below this many files are not split further.
    pub leaf_size: usize,
}

impl Default for NavigatorOptions {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_clusters: 8,
            leaf_size: 8,
        }
    }
}

impl NavigatorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_depth: config.navigator_max_depth,
            max_clusters: config.navigator_max_clusters,
            leaf_size: config.navigator_leaf_size,
        }
    }

    pub fn with_overrides(
        self,
        max_depth: Option<usize>,
        max_clusters: Option<usize>,
        leaf_size: Option<usize>,
    ) -> Self {
        Self {
            max_depth: max_depth.unwrap_or(self.max_depth),
            max_clusters: max_clusters.unwrap_or(self.max_clusters).max(2),
            leaf_size: leaf_size.unwrap_or(self.leaf_size).max(1),
        }
    }
}

pub struct Navigator {
    options: NavigatorOptions,
    labeler: Option<Arc<dyn TextGenerator>>,
}

impl Navigator {
    pub fn new(options: NavigatorOptions, labeler: Option<Arc<dyn TextGenerator>>) -> Self {
        Self { options, labeler }
    }

    pub fn options(&self) -> NavigatorOptions {
        self.options
    }

    /// Same labeler, different shape knobs.
    pub fn with_options(&self, options: NavigatorOptions) -> Self {
        Self {
            options,
            labeler: self.labeler.clone(),
        }
    }

    /// Clusters `files` (aligned with `vectors`) into a labeled tree. Every
    /// file lands in exactly one leaf.
    pub async fn build(
        &self,
        root_label: &str,
        files: &[String],
        vectors: &[Vec<f32>],
    ) -> ClusterTree {
        let n = files.len().min(vectors.len());
        let mut tree = ClusterTree::with_root(root_label, path_pattern(&files[..n]));
        let leaf_size = self.options.leaf_size.max(1);

        let mut queue: VecDeque<(NodeId, Vec<usize>)> = VecDeque::new();
        queue.push_back((ClusterTree::ROOT, (0..n).collect()));

        while let Some((node, members)) = queue.pop_front() {
            let depth = tree.node(node).depth;
            if members.len() <= leaf_size || depth >= self.options.max_depth {
                tree.set_files(node, members.iter().map(|&i| files[i].clone()).collect());
                continue;
            }

            let member_vectors: Vec<Vec<f32>> =
                members.iter().map(|&i| vectors[i].clone()).collect();
            let max_clusters = self.options.max_clusters;
            let partition = tokio::task::spawn_blocking(move || {
                let refs: Vec<&[f32]> = member_vectors.iter().map(Vec::as_slice).collect();
                spectral::spectral_partition(&refs, max_clusters)
            });
            let groups = match partition.await {
                Ok(groups) => groups,
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        members = members.len(),
                        "Spectral partition failed"
                    );
                    Vec::new()
                }
            };
            if groups.len() < 2 {
                tree.set_files(node, members.iter().map(|&i| files[i].clone()).collect());
                continue;
            }

            let siblings: Vec<SiblingGroup> = groups
                .iter()
                .map(|group| {
                    let group_files: Vec<String> =
                        group.iter().map(|&g| files[members[g]].clone()).collect();
                    SiblingGroup {
                        pattern: path_pattern(&group_files),
                        files: group_files,
                    }
                })
                .collect();
            let names = labels::label_siblings(self.labeler.as_deref(), &siblings).await;

            for ((group, sibling), name) in groups.iter().zip(siblings).zip(names) {
                let child = tree.add_child(node, name, sibling.pattern);
                queue.push_back((child, group.iter().map(|&g| members[g]).collect()));
            }
        }

        tracing::debug!(
            files = n,
            nodes = tree.len(),
            depth = tree.max_depth(),
            "Cluster tree built"
        );
        tree
    }
}
