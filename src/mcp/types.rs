use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default neighbour count for similarity searches.
pub const DEFAULT_TOP_N: usize = 10;

/// Maximum neighbour count a caller may request.
pub const MAX_TOP_N: usize = 500;

pub const DEFAULT_MAX_RECIPES: usize = 5;
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Upper bound on recursive search depth.
pub const MAX_DEPTH: usize = 6;

pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.7;
pub const DEFAULT_INITIAL_NEIGHBORS: usize = 30;

fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

fn default_max_recipes() -> usize {
    DEFAULT_MAX_RECIPES
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_min_confidence() -> f64 {
    DEFAULT_MIN_CONFIDENCE
}

fn default_initial_neighbors() -> usize {
    DEFAULT_INITIAL_NEIGHBORS
}

/// Tools that take no arguments.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct NoArgs {}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReadCifRequest {
    /// CIF document text
    #[serde(default)]
    pub cif: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CifPathRequest {
    /// Path to a local CIF file under an allowed root
    #[serde(default)]
    pub cif_path: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CompositionSearchRequest {
    /// Chemical formula, e.g. "Fe2O3"
    #[serde(default)]
    pub formula: String,
    /// Number of neighbours to return (default: 10)
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct StructureCifSearchRequest {
    /// CIF document text
    #[serde(default)]
    pub cif: String,
    /// Number of neighbours to return (default: 10)
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct StructurePathSearchRequest {
    /// Path to a local CIF file under an allowed root
    #[serde(default)]
    pub cif_path: String,
    /// Number of neighbours to return (default: 10)
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct MaterialPropertiesRequest {
    /// Materials Project identifiers, e.g. ["mp-19770"]
    #[serde(default)]
    pub material_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SynthesisRecipesRequest {
    /// Target chemical formula
    #[serde(default)]
    pub formula: String,
    /// Maximum number of recipes to return (default: 5)
    #[serde(default = "default_max_recipes")]
    pub max_recipes: usize,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AnalyzeTextRequest {
    /// Free-text synthesis procedure
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RecursiveSearchRequest {
    /// Target chemical formula
    #[serde(default)]
    pub formula: String,
    /// Neighbour expansion levels (default: 3)
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Minimum neighbour similarity to follow, 0..=1 (default: 0.7)
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Neighbours fetched per expanded formula (default: 30)
    #[serde(default = "default_initial_neighbors")]
    pub n_initial_neighbors: usize,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DiscoverReportRequest {
    /// Material or synthesis question
    #[serde(default)]
    pub query: String,
    /// Also write a standalone HTML report (default: false)
    #[serde(default)]
    pub html: bool,
}

/// One ranked similarity hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedNeighbor {
    pub rank: usize,
    pub material_id: String,
    pub formula: String,
    pub distance: f64,
    pub similarity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NeighborList {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub num_results: usize,
    pub neighbors: Vec<RankedNeighbor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaterialRecord {
    pub material_id: String,
    pub formula_pretty: Option<String>,
    pub band_gap: Option<f64>,
    pub density: Option<f64>,
    pub formation_energy_per_atom: Option<f64>,
    pub energy_above_hull: Option<f64>,
    pub volume: Option<f64>,
    pub mp_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeList {
    pub target_formula: String,
    pub recipes_found: usize,
    pub recipes: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesisParameters {
    #[serde(rename = "temperatures_C")]
    pub temperatures_c: Vec<String>,
    pub time_durations: Vec<String>,
    pub synthesis_methods: Vec<String>,
    pub atmosphere: Vec<String>,
    pub has_heating: bool,
    pub text_length: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SynthesisReport {
    pub analysis_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<String>,
}

/// A neighbour formula visited during recursive search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExploredFormula {
    pub formula: String,
    pub material_id: String,
    pub depth: usize,
    pub similarity: f64,
    /// Formula whose neighbour list produced this one.
    pub parent: String,
    pub recipes_found: usize,
}

/// Recipes attributed to the formula they were found for.
#[derive(Debug, Clone, Serialize)]
pub struct RecipeSource {
    pub formula: String,
    pub depth: usize,
    pub similarity: f64,
    pub recipes: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecursiveSearchResult {
    pub target_formula: String,
    pub found: bool,
    /// Level at which recipes were found, or the deepest level explored.
    pub depth_reached: usize,
    pub recipes_found: usize,
    pub explored: Vec<ExploredFormula>,
    pub sources: Vec<RecipeSource>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetFlags {
    pub composition_embedding: bool,
    pub structure_embedding: bool,
    pub recipes_dataset: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetFiles {
    pub composition_embeddings: Vec<String>,
    pub structure_embeddings: Vec<String>,
    pub recipes_datasets: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvFlags {
    pub mp_api_key: bool,
    pub openai_api_key: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CapabilitiesAssets {
    #[serde(flatten)]
    pub flags: AssetFlags,
    pub files: AssetFiles,
}

#[derive(Debug, Clone, Serialize)]
pub struct Versions {
    pub sky_version: String,
    pub mcp_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    pub assets: CapabilitiesAssets,
    pub env: EnvFlags,
    pub versions: Versions,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelfCheckReport {
    pub tools: Vec<String>,
    pub assets: AssetFlags,
    /// From permission bits only; not an access check for this process.
    pub report_dir_writable: bool,
    pub env: EnvFlags,
}
