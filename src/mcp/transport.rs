//! Binding the tool registry onto a transport backend.
//!
//! Backends are tried in a fixed preference order. A backend that fails to
//! initialise, or rejects a registration, is skipped with a warning; if none
//! binds, startup fails. Exactly one backend serves per process.

use std::fmt;
use std::sync::Arc;

use clap::ValueEnum;
use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{info, warn};

use crate::mcp::registry::{ToolDescriptor, ToolHandler, ToolRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// MCP over stdio via rmcp.
    Rmcp,
    /// Content-Length framed JSON-RPC 2.0 over stdio.
    JsonRpc,
}

impl TransportKind {
    pub const PREFERENCE: [TransportKind; 2] = [TransportKind::Rmcp, TransportKind::JsonRpc];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Rmcp => "rmcp",
            TransportKind::JsonRpc => "json-rpc",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("backend {backend} failed to initialise: {message}")]
    Init {
        backend: &'static str,
        message: String,
    },
    #[error("backend {backend} rejected tool '{tool}': {message}")]
    Registration {
        backend: &'static str,
        tool: String,
        message: String,
    },
    #[error("no transport backend could be initialised (tried: {})", .0.join(", "))]
    NoBackend(Vec<String>),
    #[error("transport failed: {0}")]
    Serve(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Registration that takes an explicit name and description per tool.
pub trait NamedRegistry {
    fn register_named(
        &mut self,
        name: &str,
        description: &str,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), TransportError>;
}

/// Registration that takes only the handler; name and description are
/// inferred from it.
pub trait PositionalRegistry {
    fn register(&mut self, handler: Arc<dyn ToolHandler>) -> Result<(), TransportError>;
}

/// The registration convention a backend exposes.
pub enum ToolAdapter<'a> {
    Named(&'a mut dyn NamedRegistry),
    Positional(&'a mut dyn PositionalRegistry),
}

impl ToolAdapter<'_> {
    pub fn register(&mut self, descriptor: &ToolDescriptor) -> Result<(), TransportError> {
        match self {
            ToolAdapter::Named(registry) => registry.register_named(
                descriptor.name,
                descriptor.description,
                descriptor.handler.clone(),
            ),
            ToolAdapter::Positional(registry) => registry.register(descriptor.handler.clone()),
        }
    }
}

pub trait TransportBackend: Send {
    fn name(&self) -> &'static str;

    fn adapter(&mut self) -> ToolAdapter<'_>;

    /// Serve until the peer disconnects or the process is interrupted.
    fn serve(self: Box<Self>) -> BoxFuture<'static, Result<(), TransportError>>;
}

pub type BackendFactory = Box<dyn FnOnce() -> Result<Box<dyn TransportBackend>, TransportError>>;

/// Register every descriptor on the first backend that accepts them all.
pub fn bind(
    registry: &ToolRegistry,
    factories: Vec<(TransportKind, BackendFactory)>,
) -> Result<Box<dyn TransportBackend>, TransportError> {
    let mut tried = Vec::new();

    for (kind, factory) in factories {
        tried.push(kind.to_string());
        let mut backend = match factory() {
            Ok(backend) => backend,
            Err(e) => {
                warn!(backend = %kind, error = %e, "transport backend unavailable, falling back");
                continue;
            }
        };

        let registered = {
            let mut adapter = backend.adapter();
            registry
                .descriptors()
                .iter()
                .try_for_each(|d| adapter.register(d))
        };
        if let Err(e) = registered {
            warn!(backend = %kind, error = %e, "tool registration failed, falling back");
            continue;
        }

        info!(backend = backend.name(), tools = registry.len(), "transport bound");
        return Ok(backend);
    }

    Err(TransportError::NoBackend(tried))
}

/// Factories for `only`, or for every backend in preference order.
pub fn default_backends(only: Option<TransportKind>) -> Vec<(TransportKind, BackendFactory)> {
    let kinds: Vec<TransportKind> = match only {
        Some(kind) => vec![kind],
        None => TransportKind::PREFERENCE.to_vec(),
    };
    kinds
        .into_iter()
        .map(|kind| {
            let factory: BackendFactory = match kind {
                TransportKind::Rmcp => Box::new(|| {
                    Ok(Box::new(crate::mcp::server::SkyServer::new()) as Box<dyn TransportBackend>)
                }),
                TransportKind::JsonRpc => Box::new(|| {
                    Ok(Box::new(crate::mcp::stdio::FramedJsonRpc::stdio())
                        as Box<dyn TransportBackend>)
                }),
            };
            (kind, factory)
        })
        .collect()
}
