//! MCP server exposing the knowledge base, over stdio or streamable HTTP.
//!
//! Provides [`serve_stdio`] and [`serve_http`], which wire the configured
//! vector store and embedding service into a [`KnowledgeTools`] handler.

pub mod add_document;
pub mod check_knowledge_status;
pub mod handler;
pub mod search_knowledge_base;

use std::sync::{Arc, RwLock};

use anyhow::Result;
use rmcp::ServiceExt;

use crate::config::RagentConfig;
use crate::embedding::EmbeddingRetriever;

pub use handler::KnowledgeTools;

/// Open the store and embedding client once; every session shares them.
fn setup_shared_state(config: RagentConfig) -> Result<KnowledgeTools> {
    let retriever = Arc::new(EmbeddingRetriever::from_config(&config)?);
    tracing::info!(
        backend = %config.storage.backend,
        embedding = %config.embedding.endpoint,
        "knowledge base ready"
    );
    Ok(KnowledgeTools::new(
        retriever,
        Arc::new(config),
        Arc::new(RwLock::new(None)),
    ))
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: RagentConfig) -> Result<()> {
    tracing::info!("starting ragent MCP server on stdio");

    let tools = setup_shared_state(config)?;
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over streamable HTTP at `/mcp`.
pub async fn serve_http(config: RagentConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %bind_addr, "starting ragent MCP server on HTTP");

    let tools = setup_shared_state(config)?;

    let service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(tools.clone()),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}
