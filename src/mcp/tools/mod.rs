//! Materials tools exposed through the gateway.
//!
//! Each handler validates its own input, calls collaborators, and returns an
//! [`Envelope`]. Handlers compute `Result<_, ToolFailure>` internally and
//! translate it exactly once in [`respond`].

pub mod analysis;
pub mod inventory;
pub mod materials;
pub mod recursive;
pub mod report;
pub mod similarity;
pub mod structure;

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::assets::AssetSpec;
use crate::chem::Composition;
use crate::collaborators::Collaborators;
use crate::config::ConfigProvider;
use crate::envelope::{make_ok, tool_meta, Envelope, ErrorType, Fields};
use crate::error::ToolFailure;
use crate::sandbox::{PathSandbox, ResolvedPath};

pub const CAPABILITIES: &str = "capabilities";
pub const SEARCH_BY_COMPOSITION: &str = "search_similar_by_composition";
pub const SEARCH_BY_STRUCTURE_CIF: &str = "search_similar_by_structure_cif";
pub const SEARCH_BY_STRUCTURE_PATH: &str = "search_similar_by_structure_path";
pub const READ_CIF: &str = "read_cif";
pub const READ_CIF_PATH: &str = "read_cif_path";
pub const GET_MATERIAL_PROPERTIES: &str = "get_material_properties";
pub const GET_SYNTHESIS_RECIPES: &str = "get_synthesis_recipes";
pub const ANALYZE_SYNTHESIS_PARAMETERS: &str = "analyze_synthesis_parameters";
pub const RECURSIVE_SYNTHESIS_SEARCH: &str = "recursive_synthesis_search";
pub const DISCOVER_SYNTHESIS_REPORT: &str = "discover_synthesis_report";
pub const SELF_CHECK: &str = "self_check";

/// Every exposed tool, in registration order.
pub const TOOL_NAMES: [&str; 12] = [
    CAPABILITIES,
    SEARCH_BY_COMPOSITION,
    SEARCH_BY_STRUCTURE_CIF,
    SEARCH_BY_STRUCTURE_PATH,
    READ_CIF,
    READ_CIF_PATH,
    GET_MATERIAL_PROPERTIES,
    GET_SYNTHESIS_RECIPES,
    ANALYZE_SYNTHESIS_PARAMETERS,
    RECURSIVE_SYNTHESIS_SEARCH,
    DISCOVER_SYNTHESIS_REPORT,
    SELF_CHECK,
];

/// Successful tool payload together with its provenance.
pub(crate) type ToolOutput<T> = Result<(T, Fields), ToolFailure>;

/// Shared state for all tool handlers.
#[derive(Clone)]
pub struct SkyTools {
    pub(crate) config: Arc<dyn ConfigProvider>,
    pub(crate) collaborators: Collaborators,
}

impl SkyTools {
    pub fn new(config: Arc<dyn ConfigProvider>, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
        }
    }

    pub fn config(&self) -> &dyn ConfigProvider {
        self.config.as_ref()
    }

    /// Resolve a caller-supplied path through the sandbox using the current
    /// configuration.
    pub(crate) fn resolve_path(&self, raw: &str) -> Result<ResolvedPath, ToolFailure> {
        Ok(PathSandbox::new(self.config()).resolve(raw)?)
    }

    /// Locate a required dataset or fail with `file_not_found`.
    pub(crate) fn require_asset(&self, spec: &AssetSpec) -> Result<std::path::PathBuf, ToolFailure> {
        spec.locate(self.config()).ok_or_else(|| {
            ToolFailure::new(ErrorType::FileNotFound, "Required asset not found.")
                .with_details(spec.missing_details(self.config()))
        })
    }

    pub(crate) fn require_mp_key(&self) -> Result<String, ToolFailure> {
        self.config()
            .mp_api_key()
            .ok_or_else(|| ToolFailure::missing_env("MP_API_KEY not found in environment."))
    }
}

/// Parse a required, non-blank formula.
pub(crate) fn parse_formula(formula: &str) -> Result<Composition, ToolFailure> {
    if formula.trim().is_empty() {
        return Err(ToolFailure::invalid_input("Formula is required."));
    }
    Ok(Composition::parse(formula)?)
}

/// Translate a tool result into its envelope.
pub(crate) fn respond<T: Serialize>(tool: &str, warnings: &[&str], result: ToolOutput<T>) -> Envelope {
    let meta = tool_meta(tool, warnings);
    match result {
        Ok((data, provenance)) => make_ok(data, meta, provenance),
        Err(failure) => {
            debug!(tool, error_type = %failure.error_type, "{}", failure.message);
            failure.into_envelope(meta)
        }
    }
}
