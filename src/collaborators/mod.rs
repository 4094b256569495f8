//! External collaborators the materials tools call into.
//!
//! Each collaborator sits behind a narrow async trait so the tools can be
//! exercised with fakes. Implementations return a typed
//! [`CollaboratorError`]; they never panic on bad upstream data.

pub mod materials_project;
pub mod openai;
pub mod report;
pub mod similarity;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::chem::{Composition, Structure};
use crate::config::{
    ConfigProvider, DEFAULT_LLM_MODEL, DEFAULT_MP_API_ENDPOINT, DEFAULT_OPENAI_BASE_URL,
    LLM_MODEL_ENV, MP_API_ENDPOINT_ENV, OPENAI_BASE_URL_ENV,
};

pub use materials_project::MaterialsProjectClient;
pub use openai::OpenAiSynthesisAgent;
pub use report::HtmlReportRenderer;
pub use similarity::JsonIndexSearch;

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollaboratorError {
    #[error("{0} not found in environment.")]
    MissingEnv(String),

    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("Malformed dataset: {0}")]
    Dataset(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0} request timed out.")]
    Timeout(String),

    #[error("{0} rate limit exceeded.")]
    RateLimited(String),

    /// Materials database failure (transport, status or payload).
    #[error("Materials Project error: {0}")]
    MaterialsApi(String),

    /// Any other upstream service failure.
    #[error("Upstream error: {0}")]
    Upstream(String),
}

/// One neighbour as reported by a similarity collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub material_id: String,
    pub formula: String,
    pub distance: f64,
}

/// Input of a similarity query.
#[derive(Debug, Clone, Copy)]
pub enum SearchQuery<'a> {
    Composition(&'a Composition),
    Structure(&'a Structure),
}

#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    /// Up to `n` neighbours from `dataset`, in any order.
    async fn query(
        &self,
        dataset: &Path,
        query: SearchQuery<'_>,
        n: usize,
    ) -> Result<Vec<Neighbor>, CollaboratorError>;
}

/// Property record returned by the materials database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialSummary {
    pub material_id: String,
    #[serde(default)]
    pub formula_pretty: Option<String>,
    #[serde(default)]
    pub band_gap: Option<f64>,
    #[serde(default)]
    pub density: Option<f64>,
    #[serde(default)]
    pub formation_energy_per_atom: Option<f64>,
    #[serde(default)]
    pub energy_above_hull: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
}

#[async_trait]
pub trait MaterialsDatabase: Send + Sync {
    async fn summaries(
        &self,
        api_key: &str,
        material_ids: &[String],
    ) -> Result<Vec<MaterialSummary>, CollaboratorError>;

    /// Raw synthesis recipe documents for a target formula.
    async fn synthesis_recipes(
        &self,
        api_key: &str,
        formula: &str,
    ) -> Result<Vec<Value>, CollaboratorError>;
}

/// LLM-backed synthesis discovery: free text in, analysis text out.
#[async_trait]
pub trait SynthesisAgent: Send + Sync {
    async fn discover(&self, api_key: &str, query: &str) -> Result<String, CollaboratorError>;
}

/// Turns an analysis into a standalone HTML document.
pub trait ReportRenderer: Send + Sync {
    fn render(&self, query: &str, analysis: &str) -> String;
}

const MP_TIMEOUT: Duration = Duration::from_secs(30);
const LLM_TIMEOUT: Duration = Duration::from_secs(180);

/// The set of collaborators a tool server is built with.
#[derive(Clone)]
pub struct Collaborators {
    pub similarity: Arc<dyn SimilaritySearch>,
    pub materials: Arc<dyn MaterialsDatabase>,
    pub agent: Arc<dyn SynthesisAgent>,
    pub renderer: Arc<dyn ReportRenderer>,
}

impl Collaborators {
    /// Default implementations, with endpoints taken from `config`.
    pub fn from_config(config: &dyn ConfigProvider) -> Result<Self, CollaboratorError> {
        let mp_endpoint = config
            .var(MP_API_ENDPOINT_ENV)
            .unwrap_or_else(|| DEFAULT_MP_API_ENDPOINT.to_string());
        let llm_base = config
            .var(OPENAI_BASE_URL_ENV)
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string());
        let model = config
            .var(LLM_MODEL_ENV)
            .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string());

        Ok(Self {
            similarity: Arc::new(JsonIndexSearch::default()),
            materials: Arc::new(MaterialsProjectClient::new(mp_endpoint, MP_TIMEOUT)?),
            agent: Arc::new(OpenAiSynthesisAgent::new(llm_base, model, LLM_TIMEOUT)?),
            renderer: Arc::new(HtmlReportRenderer),
        })
    }
}

/// Map a transport failure from a named service.
pub(crate) fn classify_reqwest(
    service: &str,
    err: &reqwest::Error,
    upstream: fn(String) -> CollaboratorError,
) -> CollaboratorError {
    if err.is_timeout() {
        return CollaboratorError::Timeout(service.to_string());
    }
    if err.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
        return CollaboratorError::RateLimited(service.to_string());
    }
    upstream(err.to_string())
}

/// Map a non-success HTTP status from a named service.
pub(crate) fn classify_status(
    service: &str,
    status: reqwest::StatusCode,
    body: &str,
    upstream: fn(String) -> CollaboratorError,
) -> CollaboratorError {
    match status {
        reqwest::StatusCode::TOO_MANY_REQUESTS => CollaboratorError::RateLimited(service.to_string()),
        reqwest::StatusCode::REQUEST_TIMEOUT | reqwest::StatusCode::GATEWAY_TIMEOUT => {
            CollaboratorError::Timeout(service.to_string())
        }
        _ => {
            let snippet: String = body.chars().take(200).collect();
            upstream(format!("HTTP {status}: {snippet}"))
        }
    }
}
