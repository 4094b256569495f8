//! Test harness for tool invocations.
//!
//! Each TestHarness owns an isolated temporary directory that serves as the
//! working directory, repository root and asset root. Remote collaborators
//! are replaced by in-memory fakes; local similarity search is real.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;

use sky_gateway::collaborators::{
    CollaboratorError, Collaborators, HtmlReportRenderer, JsonIndexSearch, MaterialSummary,
    MaterialsDatabase, SynthesisAgent,
};
use sky_gateway::config::StaticConfig;
use sky_gateway::mcp::{SkyTools, ToolRegistry};

/// In-memory materials database.
#[derive(Default)]
pub struct FakeMaterials {
    pub summaries: Vec<MaterialSummary>,
    /// Recipes keyed by the formula string the tool passes through.
    pub recipes: HashMap<String, Vec<Value>>,
    pub error: Option<CollaboratorError>,
    pub calls: Mutex<Vec<String>>,
}

#[async_trait]
impl MaterialsDatabase for FakeMaterials {
    async fn summaries(
        &self,
        _api_key: &str,
        material_ids: &[String],
    ) -> Result<Vec<MaterialSummary>, CollaboratorError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("summaries:{}", material_ids.join(",")));
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        Ok(self
            .summaries
            .iter()
            .filter(|s| material_ids.contains(&s.material_id))
            .cloned()
            .collect())
    }

    async fn synthesis_recipes(
        &self,
        _api_key: &str,
        formula: &str,
    ) -> Result<Vec<Value>, CollaboratorError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("recipes:{formula}"));
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        Ok(self.recipes.get(formula).cloned().unwrap_or_default())
    }
}

/// Synthesis agent with a canned reply.
pub struct FakeAgent {
    pub reply: Result<String, CollaboratorError>,
}

impl Default for FakeAgent {
    fn default() -> Self {
        Self {
            reply: Ok("Fe2O3 is made by calcination at 900 °C in air.".to_string()),
        }
    }
}

#[async_trait]
impl SynthesisAgent for FakeAgent {
    async fn discover(&self, _api_key: &str, _query: &str) -> Result<String, CollaboratorError> {
        self.reply.clone()
    }
}

/// Test harness that manages an isolated working directory.
///
/// The directory is automatically cleaned up when the harness is dropped.
pub struct TestHarness {
    /// Temporary directory (kept alive while harness exists)
    pub temp_dir: TempDir,
    pub vars: Vec<(String, String)>,
    pub materials: Arc<FakeMaterials>,
    pub agent: Arc<FakeAgent>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        std::fs::create_dir_all(temp_dir.path().join("assets/embedding"))
            .expect("Failed to create assets directory");
        Self {
            temp_dir,
            vars: Vec::new(),
            materials: Arc::new(FakeMaterials::default()),
            agent: Arc::new(FakeAgent::default()),
        }
    }

    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_materials(mut self, materials: FakeMaterials) -> Self {
        self.materials = Arc::new(materials);
        self
    }

    pub fn with_agent(mut self, agent: FakeAgent) -> Self {
        self.agent = Arc::new(agent);
        self
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root().join("assets")
    }

    /// Write `contents` at `rel` under the root, creating parents.
    pub fn write_file(&self, rel: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(&path, contents).expect("Failed to write test file");
        path
    }

    pub fn write_composition_index(&self, entries: Value) -> PathBuf {
        self.write_file(
            "assets/embedding/mp_dataset_composition.json",
            entries.to_string(),
        )
    }

    pub fn write_structure_index(&self, entries: Value) -> PathBuf {
        self.write_file(
            "assets/embedding/mp_dataset_structure.json",
            entries.to_string(),
        )
    }

    pub fn write_recipes(&self, entries: Value) -> PathBuf {
        self.write_file("assets/mp_synthesis_recipes.json", entries.to_string())
    }

    pub fn config(&self) -> StaticConfig {
        self.vars
            .iter()
            .fold(StaticConfig::new(self.root()), |config, (k, v)| {
                config.with_var(k, v.as_str())
            })
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            similarity: Arc::new(JsonIndexSearch::default()),
            materials: self.materials.clone(),
            agent: self.agent.clone(),
            renderer: Arc::new(HtmlReportRenderer),
        }
    }

    pub fn tools(&self) -> SkyTools {
        SkyTools::new(Arc::new(self.config()), self.collaborators())
    }

    pub fn registry(&self) -> ToolRegistry {
        ToolRegistry::standard(self.tools()).expect("standard registry")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Minimal P1 CIF for a single iron atom in a cubic cell.
pub const IRON_CIF: &str = "data_Fe
_cell_length_a 2.87
_cell_length_b 2.87
_cell_length_c 2.87
_cell_angle_alpha 90
_cell_angle_beta 90
_cell_angle_gamma 90
loop_
_atom_site_type_symbol
_atom_site_fract_x
_atom_site_fract_y
_atom_site_fract_z
Fe 0 0 0
Fe 0.5 0.5 0.5
";
