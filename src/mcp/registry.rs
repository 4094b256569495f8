//! Tool registry and dispatch.
//!
//! The registry is a fixed, ordered list of [`ToolDescriptor`]s built once at
//! startup. Transports bind it (see [`crate::mcp::transport`]) and route every
//! call through [`ToolHandler::call`], which always yields an [`Envelope`].

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info_span, Instrument};

use crate::envelope::{tool_meta, Envelope};
use crate::error::ToolFailure;
use crate::mcp::tools::{self, SkyTools};
use crate::mcp::types::{
    AnalyzeTextRequest, CifPathRequest, CompositionSearchRequest, DiscoverReportRequest,
    MaterialPropertiesRequest, NoArgs, ReadCifRequest, RecursiveSearchRequest,
    StructureCifSearchRequest, StructurePathSearchRequest, SynthesisRecipesRequest,
};

/// A callable tool. Implementations never fail outward: every outcome,
/// including malformed arguments, is an envelope.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Name the handler answers to when a backend infers it.
    fn name(&self) -> &'static str;

    /// Description a backend may infer alongside the name.
    fn description(&self) -> &'static str {
        ""
    }

    /// JSON schema of the accepted arguments.
    fn input_schema(&self) -> Value;

    async fn call(&self, args: Value) -> Envelope;
}

type Invoke<Req> = Arc<dyn Fn(SkyTools, Req) -> BoxFuture<'static, Envelope> + Send + Sync>;

/// Adapts a typed `SkyTools` method to [`ToolHandler`].
pub struct TypedTool<Req> {
    name: &'static str,
    description: &'static str,
    tools: SkyTools,
    schema: Value,
    invoke: Invoke<Req>,
    _request: PhantomData<fn(Req)>,
}

impl<Req> TypedTool<Req>
where
    Req: DeserializeOwned + JsonSchema + Send + 'static,
{
    pub fn new<F, Fut>(
        name: &'static str,
        description: &'static str,
        tools: SkyTools,
        f: F,
    ) -> Self
    where
        F: Fn(SkyTools, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Envelope> + Send + 'static,
    {
        let schema = serde_json::to_value(schemars::schema_for!(Req)).unwrap_or(Value::Null);
        Self {
            name,
            description,
            tools,
            schema,
            invoke: Arc::new(move |tools, req| f(tools, req).boxed()),
            _request: PhantomData,
        }
    }
}

#[async_trait]
impl<Req> ToolHandler for TypedTool<Req>
where
    Req: DeserializeOwned + JsonSchema + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        self.description
    }

    fn input_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn call(&self, args: Value) -> Envelope {
        let args = if args.is_null() { json!({}) } else { args };
        match serde_json::from_value::<Req>(args) {
            Ok(request) => (self.invoke)(self.tools.clone(), request).await,
            Err(e) => ToolFailure::from(e).into_envelope(tool_meta(self.name, &[])),
        }
    }
}

/// Wraps a handler with a tracing span and turns panics into
/// `runtime_error` envelopes.
struct Guarded {
    inner: Arc<dyn ToolHandler>,
}

#[async_trait]
impl ToolHandler for Guarded {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn description(&self) -> &'static str {
        self.inner.description()
    }

    fn input_schema(&self) -> Value {
        self.inner.input_schema()
    }

    async fn call(&self, args: Value) -> Envelope {
        let name = self.inner.name();
        let span = info_span!("tool", name);
        match AssertUnwindSafe(self.inner.call(args))
            .catch_unwind()
            .instrument(span)
            .await
        {
            Ok(envelope) => envelope,
            Err(panic) => {
                let cause = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(tool = name, %cause, "tool handler panicked");
                ToolFailure::runtime_from("Tool handler panicked.", cause)
                    .into_envelope(tool_meta(name, &[]))
            }
        }
    }
}

/// One exposed operation: explicit name and description plus its handler.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool '{0}' registered twice")]
    Duplicate(String),
    #[error("descriptor '{descriptor}' wraps handler named '{handler}'")]
    NameMismatch { descriptor: String, handler: String },
}

/// The fixed, ordered tool set of one process.
pub struct ToolRegistry {
    descriptors: Vec<ToolDescriptor>,
    index: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    pub fn new(descriptors: Vec<ToolDescriptor>) -> Result<Self, RegistryError> {
        let mut index = HashMap::with_capacity(descriptors.len());
        let mut guarded = Vec::with_capacity(descriptors.len());

        for (i, d) in descriptors.into_iter().enumerate() {
            if d.handler.name() != d.name {
                return Err(RegistryError::NameMismatch {
                    descriptor: d.name.to_string(),
                    handler: d.handler.name().to_string(),
                });
            }
            if index.insert(d.name, i).is_some() {
                return Err(RegistryError::Duplicate(d.name.to_string()));
            }
            guarded.push(ToolDescriptor {
                name: d.name,
                description: d.description,
                handler: Arc::new(Guarded { inner: d.handler }),
            });
        }

        Ok(Self {
            descriptors: guarded,
            index,
        })
    }

    /// The twelve materials tools, in registration order.
    pub fn standard(sky: SkyTools) -> Result<Self, RegistryError> {
        Self::new(standard_descriptors(sky))
    }

    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.descriptors.iter().map(|d| d.name).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.descriptors[i])
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Invoke a tool by name. Unknown names yield an `invalid_input` envelope.
    pub async fn dispatch(&self, name: &str, args: Value) -> Envelope {
        match self.get(name) {
            Some(d) => d.handler.call(args).await,
            None => unknown_tool_envelope(name, &self.names()),
        }
    }
}

pub fn unknown_tool_envelope(name: &str, available: &[&str]) -> Envelope {
    ToolFailure::invalid_input(format!("Unknown tool: {name}"))
        .with_details(json!({ "available": available }))
        .into_envelope(tool_meta(name, &[]))
}

fn descriptor<Req, F, Fut>(
    sky: &SkyTools,
    name: &'static str,
    description: &'static str,
    f: F,
) -> ToolDescriptor
where
    Req: DeserializeOwned + JsonSchema + Send + 'static,
    F: Fn(SkyTools, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Envelope> + Send + 'static,
{
    ToolDescriptor {
        name,
        description,
        handler: Arc::new(TypedTool::new(name, description, sky.clone(), f)),
    }
}

fn standard_descriptors(sky: SkyTools) -> Vec<ToolDescriptor> {
    vec![
        descriptor(
            &sky,
            tools::CAPABILITIES,
            "Report available assets, env vars, and versions.",
            |t, _: NoArgs| async move { t.capabilities().await },
        ),
        descriptor(
            &sky,
            tools::SEARCH_BY_COMPOSITION,
            "Find similar materials by composition.",
            |t, r: CompositionSearchRequest| async move { t.search_similar_by_composition(r).await },
        ),
        descriptor(
            &sky,
            tools::SEARCH_BY_STRUCTURE_CIF,
            "Find similar materials by CIF text (canonical).",
            |t, r: StructureCifSearchRequest| async move {
                t.search_similar_by_structure_cif(r).await
            },
        ),
        descriptor(
            &sky,
            tools::SEARCH_BY_STRUCTURE_PATH,
            "Find similar materials by CIF file path (local-only).",
            |t, r: StructurePathSearchRequest| async move {
                t.search_similar_by_structure_path(r).await
            },
        ),
        descriptor(
            &sky,
            tools::READ_CIF,
            "Read CIF text and return structure metadata.",
            |t, r: ReadCifRequest| async move { t.read_cif(r).await },
        ),
        descriptor(
            &sky,
            tools::READ_CIF_PATH,
            "Read CIF file path and return structure metadata (local-only).",
            |t, r: CifPathRequest| async move { t.read_cif_path(r).await },
        ),
        descriptor(
            &sky,
            tools::GET_MATERIAL_PROPERTIES,
            "Fetch Materials Project properties.",
            |t, r: MaterialPropertiesRequest| async move { t.get_material_properties(r).await },
        ),
        descriptor(
            &sky,
            tools::GET_SYNTHESIS_RECIPES,
            "Retrieve synthesis recipes for a formula.",
            |t, r: SynthesisRecipesRequest| async move { t.get_synthesis_recipes(r).await },
        ),
        descriptor(
            &sky,
            tools::ANALYZE_SYNTHESIS_PARAMETERS,
            "Extract synthesis parameters from text.",
            |t, r: AnalyzeTextRequest| async move { t.analyze_synthesis_parameters(r).await },
        ),
        descriptor(
            &sky,
            tools::RECURSIVE_SYNTHESIS_SEARCH,
            "Recursive synthesis search using similarity neighbors.",
            |t, r: RecursiveSearchRequest| async move { t.recursive_synthesis_search(r).await },
        ),
        descriptor(
            &sky,
            tools::DISCOVER_SYNTHESIS_REPORT,
            "Expensive, networked, nondeterministic synthesis report.",
            |t, r: DiscoverReportRequest| async move { t.discover_synthesis_report(r).await },
        ),
        descriptor(
            &sky,
            tools::SELF_CHECK,
            "Run deterministic checks for MCP readiness.",
            |t, _: NoArgs| async move { t.self_check().await },
        ),
    ]
}
