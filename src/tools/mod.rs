//! MCP tool definitions

use rust_mcp_sdk::macros;
use serde::{Deserialize, Serialize};

#[macros::mcp_tool(
    name = "semantic_search",
    description = "Hybrid semantic + keyword search over whole files. Thresholds accept a fraction (0.5) or a percentage (50)."
)]
#[derive(Debug, Clone, Default, Deserialize, Serialize, macros::JsonSchema)]
pub struct SemanticSearchTool {
    pub query: String,
    pub top_k: Option<u32>,
    pub path: Option<String>,
    pub semantic_weight: Option<f32>,
    pub keyword_weight: Option<f32>,
    pub min_semantic_score: Option<f32>,
    pub min_keyword_score: Option<f32>,
    pub min_combined_score: Option<f32>,
    pub require_keyword_match: Option<bool>,
    pub require_semantic_match: Option<bool>,
}

#[macros::mcp_tool(
    name = "search_identifiers",
    description = "Hybrid search over functions, classes, types and other identifiers, optionally with ranked call sites per result."
)]
#[derive(Debug, Clone, Default, Deserialize, Serialize, macros::JsonSchema)]
pub struct SearchIdentifiersTool {
    pub query: String,
    pub top_k: Option<u32>,
    pub path: Option<String>,
    /// function, method, class, struct, enum, interface, type, trait, const, variable, export
    pub kinds: Option<Vec<String>>,
    pub top_calls_per_identifier: Option<u32>,
    pub semantic_weight: Option<f32>,
    pub keyword_weight: Option<f32>,
    pub min_semantic_score: Option<f32>,
    pub min_keyword_score: Option<f32>,
    pub min_combined_score: Option<f32>,
    pub require_keyword_match: Option<bool>,
    pub require_semantic_match: Option<bool>,
}

#[macros::mcp_tool(
    name = "find_call_sites",
    description = "Ranked call sites of a named identifier, with the total number of occurrences."
)]
#[derive(Debug, Clone, Default, Deserialize, Serialize, macros::JsonSchema)]
pub struct FindCallSitesTool {
    pub name: String,
    pub path: Option<String>,
    pub query: Option<String>,
    pub limit: Option<u32>,
}

#[macros::mcp_tool(
    name = "navigate",
    description = "Cluster indexed files into a labeled hierarchy by embedding similarity."
)]
#[derive(Debug, Clone, Default, Deserialize, Serialize, macros::JsonSchema)]
pub struct NavigateTool {
    pub path: Option<String>,
    pub max_depth: Option<u32>,
    pub max_clusters: Option<u32>,
    pub leaf_size: Option<u32>,
}

#[macros::mcp_tool(
    name = "refresh_index",
    description = "Re-embed specific files, or rebuild both indexes when no files are given."
)]
#[derive(Debug, Clone, Default, Deserialize, Serialize, macros::JsonSchema)]
pub struct RefreshIndexTool {
    pub files: Option<Vec<String>>,
}

#[macros::mcp_tool(
    name = "index_stats",
    description = "Return index statistics (documents, identifiers, cache hits, change tracking)."
)]
#[derive(Debug, Clone, Default, Deserialize, Serialize, macros::JsonSchema)]
pub struct IndexStatsTool {}

#[macros::mcp_tool(
    name = "create_restore_point",
    description = "Back up files before editing them. Returns the restore point id."
)]
#[derive(Debug, Clone, Default, Deserialize, Serialize, macros::JsonSchema)]
pub struct CreateRestorePointTool {
    pub files: Vec<String>,
    pub message: Option<String>,
}

#[macros::mcp_tool(
    name = "list_restore_points",
    description = "List restore points, newest first."
)]
#[derive(Debug, Clone, Default, Deserialize, Serialize, macros::JsonSchema)]
pub struct ListRestorePointsTool {}

#[macros::mcp_tool(
    name = "restore",
    description = "Restore the files of a restore point by id."
)]
#[derive(Debug, Clone, Default, Deserialize, Serialize, macros::JsonSchema)]
pub struct RestoreTool {
    pub id: String,
}
