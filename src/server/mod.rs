//! MCP server setup and handler implementation

use crate::handlers::*;
use crate::tools::*;
use async_trait::async_trait;
use rust_mcp_sdk::{
    mcp_server::ServerHandler,
    schema::{
        CallToolError, CallToolRequestParams, CallToolResult, ListToolsResult,
        PaginatedRequestParams, RpcError,
    },
    McpServer,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct NavigatorHandler {
    pub state: Arc<AppState>,
}

fn text_result(text: String) -> CallToolResult {
    CallToolResult::text_content(vec![text.into()])
}

fn json_result(value: &serde_json::Value) -> CallToolResult {
    text_result(serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string()))
}

#[async_trait]
impl ServerHandler for NavigatorHandler {
    async fn handle_list_tools_request(
        &self,
        _request: Option<PaginatedRequestParams>,
        _runtime: Arc<dyn McpServer>,
    ) -> std::result::Result<ListToolsResult, RpcError> {
        Ok(ListToolsResult {
            tools: vec![
                SemanticSearchTool::tool(),
                SearchIdentifiersTool::tool(),
                FindCallSitesTool::tool(),
                NavigateTool::tool(),
                RefreshIndexTool::tool(),
                IndexStatsTool::tool(),
                CreateRestorePointTool::tool(),
                ListRestorePointsTool::tool(),
                RestoreTool::tool(),
            ],
            meta: None,
            next_cursor: None,
        })
    }

    async fn handle_call_tool_request(
        &self,
        params: CallToolRequestParams,
        _runtime: Arc<dyn McpServer>,
    ) -> std::result::Result<CallToolResult, CallToolError> {
        let state = &self.state;
        match params.name.as_str() {
            "semantic_search" => {
                let tool: SemanticSearchTool = parse_tool_args(&params)?;
                let report = handle_semantic_search(state, tool)
                    .await
                    .map_err(tool_internal_error)?;
                Ok(text_result(report))
            }
            "search_identifiers" => {
                let tool: SearchIdentifiersTool = parse_tool_args(&params)?;
                let report = handle_search_identifiers(state, tool)
                    .await
                    .map_err(tool_internal_error)?;
                Ok(text_result(report))
            }
            "find_call_sites" => {
                let tool: FindCallSitesTool = parse_tool_args(&params)?;
                let report = handle_find_call_sites(state, tool)
                    .await
                    .map_err(tool_internal_error)?;
                Ok(text_result(report))
            }
            "navigate" => {
                let tool: NavigateTool = parse_tool_args(&params)?;
                let report = handle_navigate(state, tool)
                    .await
                    .map_err(tool_internal_error)?;
                Ok(text_result(report))
            }
            "refresh_index" => {
                let tool: RefreshIndexTool = parse_tool_args(&params)?;
                let report = handle_refresh_index(state, tool)
                    .await
                    .map_err(tool_internal_error)?;
                Ok(text_result(report))
            }
            "index_stats" => {
                let result = handle_index_stats(state)
                    .await
                    .map_err(tool_internal_error)?;
                Ok(json_result(&result))
            }
            "create_restore_point" => {
                let tool: CreateRestorePointTool = parse_tool_args(&params)?;
                let result = handle_create_restore_point(state, tool)
                    .await
                    .map_err(tool_internal_error)?;
                Ok(json_result(&result))
            }
            "list_restore_points" => {
                let result = handle_list_restore_points(state)
                    .await
                    .map_err(tool_internal_error)?;
                Ok(json_result(&result))
            }
            "restore" => {
                let tool: RestoreTool = parse_tool_args(&params)?;
                let result = handle_restore(state, tool)
                    .await
                    .map_err(tool_internal_error)?;
                Ok(json_result(&result))
            }
            _ => Err(CallToolError::unknown_tool(params.name)),
        }
    }
}
