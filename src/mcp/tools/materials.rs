use std::cmp::Ordering;
use std::path::Path;

use serde_json::Value;

use crate::assets::RECIPES_DATASET;
use crate::chem::Composition;
use crate::envelope::{provenance_ids, Envelope, Source};
use crate::error::ToolFailure;
use crate::mcp::tools::{
    parse_formula, respond, SkyTools, ToolOutput, GET_MATERIAL_PROPERTIES, GET_SYNTHESIS_RECIPES,
};
use crate::mcp::types::{MaterialPropertiesRequest, MaterialRecord, RecipeList, SynthesisRecipesRequest};

const MP_MATERIAL_URL: &str = "https://materialsproject.org/materials";

/// Recipes matched for one target, before truncation.
#[derive(Debug, Clone)]
pub(crate) struct RecipeMatch {
    pub recipes: Vec<Value>,
    pub source: Source,
}

impl SkyTools {
    pub async fn get_material_properties(&self, request: MaterialPropertiesRequest) -> Envelope {
        respond(
            GET_MATERIAL_PROPERTIES,
            &[],
            self.material_properties(request).await,
        )
    }

    pub async fn get_synthesis_recipes(&self, request: SynthesisRecipesRequest) -> Envelope {
        respond(GET_SYNTHESIS_RECIPES, &[], self.synthesis_recipes(request).await)
    }

    async fn material_properties(
        &self,
        request: MaterialPropertiesRequest,
    ) -> ToolOutput<Vec<MaterialRecord>> {
        let ids: Vec<String> = request
            .material_ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        if ids.is_empty() {
            return Err(ToolFailure::invalid_input(
                "material_ids must be a non-empty list.",
            ));
        }
        let api_key = self.require_mp_key()?;

        let summaries = self
            .collaborators
            .materials
            .summaries(&api_key, &ids)
            .await
            .map_err(|e| {
                ToolFailure::from_collaborator(
                    "Failed to fetch material properties from Materials Project.",
                    e,
                )
            })?;

        let mut records: Vec<MaterialRecord> = summaries
            .into_iter()
            .map(|doc| MaterialRecord {
                mp_url: format!("{MP_MATERIAL_URL}/{}", doc.material_id),
                material_id: doc.material_id,
                formula_pretty: doc.formula_pretty,
                band_gap: doc.band_gap,
                density: doc.density,
                formation_energy_per_atom: doc.formation_energy_per_atom,
                energy_above_hull: doc.energy_above_hull,
                volume: doc.volume,
            })
            .collect();
        records.sort_by(|a, b| a.material_id.cmp(&b.material_id));

        let provenance = provenance_ids(Source::Mp, records.iter().map(|r| r.material_id.clone()));
        Ok((records, provenance))
    }

    async fn synthesis_recipes(&self, request: SynthesisRecipesRequest) -> ToolOutput<RecipeList> {
        let target = parse_formula(&request.formula)?;
        let matched = self.find_recipes(&request.formula, &target).await?;

        // Local matches report the full count; remote results are capped first.
        let (recipes_found, recipes) = match matched.source {
            Source::Local => {
                let total = matched.recipes.len();
                (total, truncate(matched.recipes, request.max_recipes))
            }
            _ => {
                let capped = truncate(matched.recipes, request.max_recipes);
                (capped.len(), capped)
            }
        };
        Ok((
            RecipeList {
                target_formula: request.formula,
                recipes_found,
                recipes,
            },
            provenance_ids(matched.source, Vec::<String>::new()),
        ))
    }

    /// Recipes for `target`, sorted deterministically. The local dataset wins
    /// when present; otherwise the materials database is queried.
    pub(crate) async fn find_recipes(
        &self,
        formula: &str,
        target: &Composition,
    ) -> Result<RecipeMatch, ToolFailure> {
        if let Some(path) = RECIPES_DATASET.locate(self.config()) {
            let mut recipes = load_local_recipes(&path, target).await?;
            recipes.sort_by(compare_recipes);
            return Ok(RecipeMatch {
                recipes,
                source: Source::Local,
            });
        }

        let api_key = self.require_mp_key()?;
        let mut recipes = self
            .collaborators
            .materials
            .synthesis_recipes(&api_key, formula)
            .await
            .map_err(|e| {
                ToolFailure::from_collaborator(
                    "Recipe retrieval failed. The Materials Project recipe route may be unavailable.",
                    e,
                )
            })?;
        recipes.sort_by(compare_recipes);
        Ok(RecipeMatch {
            recipes,
            source: Source::Mp,
        })
    }
}

fn truncate(mut recipes: Vec<Value>, max: usize) -> Vec<Value> {
    recipes.truncate(max);
    recipes
}

async fn load_local_recipes(path: &Path, target: &Composition) -> Result<Vec<Value>, ToolFailure> {
    let load_failed = |e: &dyn std::fmt::Display| {
        ToolFailure::runtime_from("Failed to load local synthesis dataset.", e)
    };
    let raw = tokio::fs::read(path).await.map_err(|e| load_failed(&e))?;
    let all: Vec<Value> = serde_json::from_slice(&raw).map_err(|e| load_failed(&e))?;

    let wanted = target.reduced_formula();
    Ok(all
        .into_iter()
        .filter(|recipe| {
            recipe
                .get("target_formula")
                .and_then(Value::as_str)
                .filter(|f| !f.is_empty())
                .and_then(|f| Composition::parse(f).ok())
                .is_some_and(|c| c.reduced_formula() == wanted)
        })
        .collect())
}

fn recipe_key(recipe: &Value) -> [&str; 4] {
    let field = |name: &str| recipe.get(name).and_then(Value::as_str).unwrap_or("");
    [
        field("target_formula"),
        field("doi"),
        field("paragraph_string"),
        field("reaction_string"),
    ]
}

/// Order by `(target_formula, doi, paragraph_string, reaction_string)`.
/// Non-object entries sort by their JSON text after every object.
fn compare_recipes(a: &Value, b: &Value) -> Ordering {
    match (a.is_object(), b.is_object()) {
        (true, true) => recipe_key(a).cmp(&recipe_key(b)),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.to_string().cmp(&b.to_string()),
    }
}
