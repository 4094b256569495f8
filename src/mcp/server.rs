use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use rmcp::{
    model::*, service::RequestContext, ErrorData as McpError, RoleServer, ServerHandler,
    ServiceExt,
};
use serde_json::Value;

use crate::mcp::registry::{unknown_tool_envelope, ToolHandler};
use crate::mcp::transport::{NamedRegistry, ToolAdapter, TransportBackend, TransportError};

const BACKEND: &str = "rmcp";

/// MCP server over stdio, built on rmcp.
///
/// Tools are registered by explicit name and description; every call result
/// carries the tool's envelope as structured content.
#[derive(Clone, Default)]
pub struct SkyServer {
    tools: Vec<Tool>,
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl SkyServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_ref()).collect()
    }

    /// Route a call to its handler and wrap the envelope for the wire.
    pub async fn invoke(&self, name: &str, arguments: Option<JsonObject>) -> CallToolResult {
        let envelope = match self.handlers.get(name) {
            Some(handler) => {
                let args = arguments.map(Value::Object).unwrap_or(Value::Null);
                handler.call(args).await
            }
            None => unknown_tool_envelope(name, &self.tool_names()),
        };
        if envelope.is_ok() {
            CallToolResult::structured(envelope.to_value())
        } else {
            CallToolResult::structured_error(envelope.to_value())
        }
    }
}

impl NamedRegistry for SkyServer {
    fn register_named(
        &mut self,
        name: &str,
        description: &str,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), TransportError> {
        let schema = match handler.input_schema() {
            Value::Object(schema) => schema,
            other => {
                return Err(TransportError::Registration {
                    backend: BACKEND,
                    tool: name.to_string(),
                    message: format!("input schema is not an object: {other}"),
                })
            }
        };
        if self.handlers.contains_key(name) {
            return Err(TransportError::Registration {
                backend: BACKEND,
                tool: name.to_string(),
                message: "already registered".into(),
            });
        }
        self.tools.push(Tool::new(
            name.to_string(),
            description.to_string(),
            Arc::new(schema),
        ));
        self.handlers.insert(name.to_string(), handler);
        Ok(())
    }
}

impl TransportBackend for SkyServer {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn adapter(&mut self) -> ToolAdapter<'_> {
        ToolAdapter::Named(self)
    }

    fn serve(self: Box<Self>) -> BoxFuture<'static, Result<(), TransportError>> {
        Box::pin(async move {
            let tools = self.tools.len();
            tracing::info!("Starting sky-gateway MCP server v{}", env!("CARGO_PKG_VERSION"));

            let transport = (tokio::io::stdin(), tokio::io::stdout());
            let service = ServiceExt::serve(*self, transport)
                .await
                .map_err(|e| TransportError::Serve(e.to_string()))?;
            tracing::info!("MCP server listening on stdio ({} tools)", tools);

            tokio::select! {
                quit = service.waiting() => {
                    quit.map_err(|e| TransportError::Serve(e.to_string()))?;
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutdown signal received");
                }
            }

            tracing::info!("MCP server shutting down");
            Ok(())
        })
    }
}

impl ServerHandler for SkyServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "sky-gateway".to_string(),
                title: Some("SKY Materials Gateway".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                r#"# SKY Materials Gateway

Every tool returns an envelope: {ok, data, error, meta, provenance}.
On failure, error.type is one of missing_env, file_not_found, invalid_input,
permission_denied, file_too_large, mp_api_error, upstream_timeout,
upstream_rate_limited, runtime_error.

## Start here
- capabilities: available assets, credentials and versions
- self_check: deterministic readiness report

## Local
- read_cif / read_cif_path: structure metadata
- search_similar_by_composition / search_similar_by_structure_*: nearest materials
- analyze_synthesis_parameters: temperatures, durations, methods, atmospheres

## Networked
- get_material_properties, get_synthesis_recipes, recursive_synthesis_search
- discover_synthesis_report: expensive and nondeterministic

Paths are resolved inside allowed roots only.
"#
                .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: self.tools.clone(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.invoke(request.name.as_ref(), request.arguments).await)
    }
}
