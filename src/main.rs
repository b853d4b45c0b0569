use rust_mcp_sdk::{
    error::{McpSdkError, SdkResult},
    mcp_server::{server_runtime, McpServerOptions, ToMcpServerHandler},
    schema::{
        Implementation, InitializeResult, ProtocolVersion, ServerCapabilities,
        ServerCapabilitiesTools,
    },
    McpServer, StdioTransport, TransportOptions,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use semantic_code_navigator::cli::{print_help, print_version, wants_help, wants_version};
use semantic_code_navigator::config::Config;
use semantic_code_navigator::handlers::AppState;
use semantic_code_navigator::server::NavigatorHandler;

#[tokio::main]
async fn main() -> SdkResult<()> {
    let args = std::env::args().collect::<Vec<_>>();
    if wants_help(&args) {
        print_help();
        return Ok(());
    }
    if wants_version(&args) {
        print_version();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting semantic-code-navigator"
    );

    if let Err(err) = run().await {
        error!(error = %err, "Server exited with error");
        return Err(err);
    }
    Ok(())
}

fn internal(err: anyhow::Error) -> McpSdkError {
    McpSdkError::Internal {
        description: format!("{err:#}"),
    }
}

async fn run() -> SdkResult<()> {
    let config = Arc::new(Config::from_env().map_err(internal)?);

    info!(
        base_dir = %config.base_dir.display(),
        cache_dir = %config.cache_dir.display(),
        embeddings_backend = ?config.embeddings_backend,
        embeddings_model = %config.embeddings_model,
        embedding_batch_size = config.embedding_batch_size,
        index_ttl_secs = config.index_ttl_secs,
        rank_semantic_weight = config.rank_semantic_weight,
        rank_keyword_weight = config.rank_keyword_weight,
        navigator_max_depth = config.navigator_max_depth,
        navigator_max_clusters = config.navigator_max_clusters,
        labels_enabled = config.labels_enabled,
        watch_mode = config.watch_mode,
        watch_debounce_ms = config.watch_debounce_ms,
        restore_max_points = config.restore_max_points,
        "Loaded config"
    );

    let state = Arc::new(AppState::from_config(config.clone()).map_err(internal)?);

    info!(
        embeddings_backend = ?config.embeddings_backend,
        watch_mode = state.tracker.is_some(),
        "Initialized components"
    );

    let server_details = InitializeResult {
        server_info: Implementation {
            name: "semantic-code-navigator".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            title: Some("Semantic Code Navigator".into()),
            description: Some(
                "Hybrid semantic search, call sites and clustered navigation over a local repository"
                    .into(),
            ),
            icons: vec![],
            website_url: None,
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools { list_changed: None }),
            ..Default::default()
        },
        protocol_version: ProtocolVersion::V2025_11_25.into(),
        instructions: None,
        meta: None,
    };

    let transport = StdioTransport::new(TransportOptions::default())?;
    let handler = NavigatorHandler { state }.to_mcp_server_handler();

    let server = server_runtime::create_server(McpServerOptions {
        server_details,
        transport,
        handler,
        task_store: None,
        client_task_store: None,
    });

    info!("Starting MCP stdio server");
    server.start().await
}
