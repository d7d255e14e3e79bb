//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.

use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

use pulso_core::Engine;

use crate::tools::{
    CacheClearParams, CacheMetadataParams, CacheSnapshotGetParams, CacheSnapshotParams, DomainRegisterParams,
    SessionSetParams, WebChangedParams, WebFetchParams, cache, domains, session, web_changed, web_fetch,
};

/// The main MCP server handler for pulso.
#[derive(Clone)]
pub struct PulsoServer {
    engine: Arc<Engine>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl PulsoServer {
    /// Create a new server handler around a shared engine.
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine, tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Fetch a URL through the cache. Serves cached content while it is within the domain's TTL, otherwise fetches with the domain's driver, retries and fallback. Returns content plus change-tracking metadata."
    )]
    async fn web_fetch(&self, params: Parameters<WebFetchParams>) -> Result<CallToolResult, McpError> {
        web_fetch::fetch_impl(&self.engine, params.0).await
    }

    #[tool(
        description = "Report whether the most recent fetch of a URL changed its content. Does not fetch; call web_fetch first."
    )]
    async fn web_changed(&self, params: Parameters<WebChangedParams>) -> Result<CallToolResult, McpError> {
        web_changed::changed_impl(&self.engine, params.0).await
    }

    #[tool(description = "Get cache metadata (hash, fetch time, change time, change count) and snapshot history for a URL.")]
    async fn cache_metadata(&self, params: Parameters<CacheMetadataParams>) -> Result<CallToolResult, McpError> {
        cache::metadata_impl(&self.engine, params.0).await
    }

    #[tool(description = "Save an immutable versioned copy of a URL's cached content. Returns the snapshot id.")]
    async fn cache_snapshot(&self, params: Parameters<CacheSnapshotParams>) -> Result<CallToolResult, McpError> {
        cache::snapshot_impl(&self.engine, params.0).await
    }

    #[tool(description = "Read a snapshot by id.")]
    async fn cache_snapshot_get(&self, params: Parameters<CacheSnapshotGetParams>) -> Result<CallToolResult, McpError> {
        cache::snapshot_get_impl(&self.engine, params.0).await
    }

    #[tool(
        description = "Clear cache entries by url, domain or session. Without a session the current one applies; all = true spans every session and alone clears everything. Snapshots are kept."
    )]
    async fn cache_clear(&self, params: Parameters<CacheClearParams>) -> Result<CallToolResult, McpError> {
        cache::clear_impl(&self.engine, params.0).await
    }

    #[tool(description = "Register or replace the fetch policy (TTL, driver, retries, fallback) for a domain pattern.")]
    async fn domain_register(&self, params: Parameters<DomainRegisterParams>) -> Result<CallToolResult, McpError> {
        domains::register_impl(&self.engine, params.0).await
    }

    #[tool(description = "List registered domain policies.")]
    async fn domain_list(&self) -> Result<CallToolResult, McpError> {
        domains::list_impl(&self.engine).await
    }

    #[tool(description = "Get the current cache session id.")]
    async fn session_get(&self) -> Result<CallToolResult, McpError> {
        session::get_impl(&self.engine).await
    }

    #[tool(description = "Set the current cache session id used when a call does not name one.")]
    async fn session_set(&self, params: Parameters<SessionSetParams>) -> Result<CallToolResult, McpError> {
        session::set_impl(&self.engine, params.0).await
    }
}

impl ServerHandler for PulsoServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "pulso".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Register domain policies with domain_register, then fetch with web_fetch. Content is cached per session."
                    .into(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
