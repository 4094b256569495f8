//! Fallback transport: JSON-RPC 2.0 with `Content-Length` framing.
//!
//! Handlers are registered positionally; each tool is listed under the name
//! and description its handler reports.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin,
    Stdout,
};
use tracing::{debug, info, warn};

use crate::mcp::registry::{unknown_tool_envelope, ToolHandler};
use crate::mcp::transport::{PositionalRegistry, ToolAdapter, TransportBackend, TransportError};

const BACKEND: &str = "json-rpc";

/// Largest request body accepted.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    /// Absent on notifications.
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

impl JsonRpcResponse {
    fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Framed JSON-RPC server over any buffered reader and writer.
pub struct FramedJsonRpc<R, W> {
    reader: R,
    writer: W,
    tools: ToolTable,
    max_body_bytes: usize,
}

/// Registered handlers, in registration order.
#[derive(Default)]
struct ToolTable {
    handlers: Vec<Arc<dyn ToolHandler>>,
}

impl FramedJsonRpc<BufReader<Stdin>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> FramedJsonRpc<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            tools: ToolTable::default(),
            max_body_bytes: MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    pub fn tool_names(&self) -> Vec<&'static str> {
        self.tools.names()
    }

    /// Serve requests until the reader reaches end of input.
    pub async fn run(self) -> Result<(), TransportError> {
        let Self {
            mut reader,
            mut writer,
            tools,
            max_body_bytes,
        } = self;
        info!("JSON-RPC server listening on stdio ({} tools)", tools.handlers.len());

        while let Some(body) = read_framed(&mut reader, max_body_bytes).await? {
            if let Some(response) = tools.handle_body(&body).await {
                let payload = serde_json::to_vec(&response)
                    .map_err(|e| TransportError::Serve(e.to_string()))?;
                write_framed(&mut writer, &payload).await?;
            }
        }
        info!("JSON-RPC peer closed the stream");
        Ok(())
    }
}

impl ToolTable {
    fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    async fn handle_body(&self, body: &[u8]) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "unparseable JSON-RPC request");
                return Some(JsonRpcResponse::error(Value::Null, PARSE_ERROR, "parse error"));
            }
        };
        let Some(id) = request.id else {
            debug!(method = %request.method, "notification");
            return None;
        };
        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                "jsonrpc must be \"2.0\"",
            ));
        }

        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::result(id, initialize_result()),
            "ping" => JsonRpcResponse::result(id, json!({})),
            "tools/list" => JsonRpcResponse::result(id, self.list_result()),
            "tools/call" => {
                let params = request.params.unwrap_or(Value::Null);
                match serde_json::from_value::<ToolCallParams>(params) {
                    Ok(params) => JsonRpcResponse::result(id, self.call(params).await),
                    Err(e) => JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string()),
                }
            }
            other => JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("method not found: {other}")),
        };
        Some(response)
    }

    fn list_result(&self) -> Value {
        let tools: Vec<Value> = self
            .handlers
            .iter()
            .map(|h| {
                json!({
                    "name": h.name(),
                    "description": h.description(),
                    "inputSchema": h.input_schema(),
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    async fn call(&self, params: ToolCallParams) -> Value {
        let handler = self.handlers.iter().find(|h| h.name() == params.name);
        let envelope = match handler {
            Some(handler) => handler.call(params.arguments).await,
            None => unknown_tool_envelope(&params.name, &self.names()),
        };
        let structured = envelope.to_value();
        json!({
            "content": [{ "type": "text", "text": structured.to_string() }],
            "structuredContent": structured,
            "isError": !envelope.is_ok(),
        })
    }
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": {} },
        "serverInfo": {
            "name": "sky-gateway",
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

impl<R, W> PositionalRegistry for FramedJsonRpc<R, W> {
    fn register(&mut self, handler: Arc<dyn ToolHandler>) -> Result<(), TransportError> {
        let name = handler.name();
        if self.tools.handlers.iter().any(|h| h.name() == name) {
            return Err(TransportError::Registration {
                backend: BACKEND,
                tool: name.to_string(),
                message: "already registered".into(),
            });
        }
        self.tools.handlers.push(handler);
        Ok(())
    }
}

impl<R, W> TransportBackend for FramedJsonRpc<R, W>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn adapter(&mut self) -> ToolAdapter<'_> {
        ToolAdapter::Positional(self)
    }

    fn serve(self: Box<Self>) -> BoxFuture<'static, Result<(), TransportError>> {
        Box::pin((*self).run())
    }
}

/// Read one framed body. `Ok(None)` on a clean end of input between frames.
async fn read_framed<R>(reader: &mut R, max_body_bytes: usize) -> Result<Option<Vec<u8>>, TransportError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut line = String::new();
    let mut saw_header = false;
    loop {
        line.clear();
        let bytes = reader.read_line(&mut line).await?;
        if bytes == 0 {
            if saw_header {
                return Err(TransportError::Serve("stream closed mid-frame".into()));
            }
            return Ok(None);
        }
        if line.trim().is_empty() {
            if saw_header {
                break;
            }
            continue;
        }
        saw_header = true;
        if let Some((key, value)) = line.split_once(':') {
            if key.trim().eq_ignore_ascii_case("content-length") {
                let parsed = value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| TransportError::Serve("invalid content length".into()))?;
                content_length = Some(parsed);
            }
        }
    }
    let len = content_length.ok_or_else(|| TransportError::Serve("missing content length".into()))?;
    if len > max_body_bytes {
        return Err(TransportError::Serve("payload too large".into()));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

async fn write_framed<W>(writer: &mut W, payload: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let header = format!("Content-Length: {}\r\n\r\n", payload.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
