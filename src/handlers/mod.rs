//! MCP tool handlers

use crate::config::Config;
use crate::indexer::SymbolKind;
use crate::retrieval::{
    CallSiteRequest, HybridOptions, IdentifierRequest, NavigateRequest, SearchRequest,
};
use crate::tools::*;
use anyhow::{anyhow, Result};
use rust_mcp_sdk::schema::{CallToolError, CallToolRequestParams};
use serde::de::DeserializeOwned;
use serde_json::json;

pub use state::AppState;

mod state;

const DEFAULT_CALL_SITE_LIMIT: u32 = 10;

/// Parse tool arguments from MCP request
pub fn parse_tool_args<T: DeserializeOwned>(
    params: &CallToolRequestParams,
) -> std::result::Result<T, CallToolError> {
    let args = params.arguments.clone().unwrap_or_default();
    let args = serde_json::Value::Object(args);
    serde_json::from_value(args)
        .map_err(|err| CallToolError::invalid_arguments(&params.name, Some(err.to_string())))
}

/// Convert internal error to MCP tool error
pub fn tool_internal_error(err: anyhow::Error) -> CallToolError {
    CallToolError::from_message(format!("{err:#}"))
}

/// Ranking knobs shared by the search tools.
struct Knobs {
    top_k: Option<u32>,
    semantic_weight: Option<f32>,
    keyword_weight: Option<f32>,
    min_semantic_score: Option<f32>,
    min_keyword_score: Option<f32>,
    min_combined_score: Option<f32>,
    require_keyword_match: Option<bool>,
    require_semantic_match: Option<bool>,
}

impl Knobs {
    fn options(&self, config: &Config) -> HybridOptions {
        let base = HybridOptions::from_config(config);
        HybridOptions {
            semantic_weight: self.semantic_weight.unwrap_or(base.semantic_weight),
            keyword_weight: self.keyword_weight.unwrap_or(base.keyword_weight),
            min_semantic_score: self.min_semantic_score.unwrap_or(base.min_semantic_score),
            min_keyword_score: self.min_keyword_score.unwrap_or(base.min_keyword_score),
            min_combined_score: self.min_combined_score.unwrap_or(base.min_combined_score),
            require_keyword_match: self
                .require_keyword_match
                .unwrap_or(base.require_keyword_match),
            require_semantic_match: self
                .require_semantic_match
                .unwrap_or(base.require_semantic_match),
            top_k: self.top_k.map(|k| k as usize).unwrap_or(base.top_k).max(1),
        }
    }
}

pub fn search_options(config: &Config, tool: &SemanticSearchTool) -> HybridOptions {
    Knobs {
        top_k: tool.top_k,
        semantic_weight: tool.semantic_weight,
        keyword_weight: tool.keyword_weight,
        min_semantic_score: tool.min_semantic_score,
        min_keyword_score: tool.min_keyword_score,
        min_combined_score: tool.min_combined_score,
        require_keyword_match: tool.require_keyword_match,
        require_semantic_match: tool.require_semantic_match,
    }
    .options(config)
}

pub fn identifier_options(config: &Config, tool: &SearchIdentifiersTool) -> HybridOptions {
    Knobs {
        top_k: tool.top_k,
        semantic_weight: tool.semantic_weight,
        keyword_weight: tool.keyword_weight,
        min_semantic_score: tool.min_semantic_score,
        min_keyword_score: tool.min_keyword_score,
        min_combined_score: tool.min_combined_score,
        require_keyword_match: tool.require_keyword_match,
        require_semantic_match: tool.require_semantic_match,
    }
    .options(config)
}

pub fn parse_kinds(raw: Option<&[String]>) -> Result<Vec<SymbolKind>> {
    raw.unwrap_or_default()
        .iter()
        .map(|k| {
            SymbolKind::parse(k).ok_or_else(|| {
                let known: Vec<&str> = SymbolKind::ALL.iter().map(|k| k.as_str()).collect();
                anyhow!("Unknown kind `{}` (expected one of {})", k, known.join(", "))
            })
        })
        .collect()
}

/// Handle semantic_search tool
pub async fn handle_semantic_search(state: &AppState, tool: SemanticSearchTool) -> Result<String> {
    let options = search_options(&state.config, &tool);
    state
        .retriever
        .search(&SearchRequest {
            query: tool.query,
            path: tool.path,
            options,
        })
        .await
}

/// Handle search_identifiers tool
pub async fn handle_search_identifiers(
    state: &AppState,
    tool: SearchIdentifiersTool,
) -> Result<String> {
    let options = identifier_options(&state.config, &tool);
    let kinds = parse_kinds(tool.kinds.as_deref())?;
    state
        .retriever
        .search_identifiers(&IdentifierRequest {
            query: tool.query,
            path: tool.path,
            kinds,
            options,
            top_calls_per_identifier: tool.top_calls_per_identifier.unwrap_or(0) as usize,
        })
        .await
}

/// Handle find_call_sites tool
pub async fn handle_find_call_sites(state: &AppState, tool: FindCallSitesTool) -> Result<String> {
    state
        .retriever
        .find_call_sites(&CallSiteRequest {
            name: tool.name,
            path: tool.path,
            query: tool.query,
            limit: tool.limit.unwrap_or(DEFAULT_CALL_SITE_LIMIT) as usize,
        })
        .await
}

/// Handle navigate tool
pub async fn handle_navigate(state: &AppState, tool: NavigateTool) -> Result<String> {
    state
        .retriever
        .navigate(&NavigateRequest {
            path: tool.path,
            max_depth: tool.max_depth.map(|v| v as usize),
            max_clusters: tool.max_clusters.map(|v| v as usize),
            leaf_size: tool.leaf_size.map(|v| v as usize),
        })
        .await
}

/// Handle refresh_index tool
pub async fn handle_refresh_index(state: &AppState, tool: RefreshIndexTool) -> Result<String> {
    state
        .retriever
        .refresh(tool.files.as_deref().unwrap_or_default())
        .await
}

/// Handle index_stats tool
pub async fn handle_index_stats(state: &AppState) -> Result<serde_json::Value> {
    let index = state.retriever.stats().await;
    let tracker = match &state.tracker {
        Some(tracker) => serde_json::to_value(tracker.status().await)?,
        None => json!({ "enabled": false }),
    };
    Ok(json!({
        "index": index,
        "tracker": tracker,
    }))
}

/// Handle create_restore_point tool
pub async fn handle_create_restore_point(
    state: &AppState,
    tool: CreateRestorePointTool,
) -> Result<serde_json::Value> {
    let point = state
        .restore
        .create(&tool.files, tool.message.as_deref().unwrap_or(""))
        .await?;
    Ok(serde_json::to_value(point)?)
}

/// Handle list_restore_points tool
pub async fn handle_list_restore_points(state: &AppState) -> Result<serde_json::Value> {
    Ok(json!({ "restore_points": state.restore.list().await }))
}

/// Handle restore tool
pub async fn handle_restore(state: &AppState, tool: RestoreTool) -> Result<serde_json::Value> {
    let point = state.restore.restore(&tool.id).await?;
    state.retriever.invalidate().await;
    Ok(json!({
        "ok": true,
        "restored": point,
    }))
}
