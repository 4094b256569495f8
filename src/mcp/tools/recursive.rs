use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::assets::{COMPOSITION_INDEX, RECIPES_DATASET};
use crate::chem::Composition;
use crate::envelope::{provenance_ids, Envelope, ErrorType, Source};
use crate::error::ToolFailure;
use crate::mcp::tools::{parse_formula, respond, SkyTools, ToolOutput, RECURSIVE_SYNTHESIS_SEARCH};
use crate::mcp::types::{
    CompositionSearchRequest, ExploredFormula, RecipeSource, RecursiveSearchRequest,
    RecursiveSearchResult, DEFAULT_MAX_RECIPES, MAX_DEPTH, MAX_TOP_N,
};

/// A candidate formula for the next level, keyed by its reduced formula.
struct Candidate {
    formula: String,
    composition: Composition,
    material_id: String,
    similarity: f64,
    parent: String,
}

impl SkyTools {
    /// Look for recipes for a formula, widening to similar compositions one
    /// level at a time until some level yields recipes.
    pub async fn recursive_synthesis_search(&self, request: RecursiveSearchRequest) -> Envelope {
        let result = self.recursive_search(request).await.map_err(|failure| {
            if failure.error_type == ErrorType::RuntimeError {
                let cause = failure.message.clone();
                ToolFailure::runtime_from("Recursive synthesis search failed.", cause)
            } else {
                failure
            }
        });
        respond(RECURSIVE_SYNTHESIS_SEARCH, &[], result)
    }

    async fn recursive_search(
        &self,
        request: RecursiveSearchRequest,
    ) -> ToolOutput<RecursiveSearchResult> {
        let target = parse_formula(&request.formula)?;
        validate_limits(&request)?;
        self.require_asset(&COMPOSITION_INDEX)?;
        if RECIPES_DATASET.locate(self.config()).is_none() {
            self.require_mp_key()?;
        }

        let mut result = RecursiveSearchResult {
            target_formula: request.formula.clone(),
            found: false,
            depth_reached: 0,
            recipes_found: 0,
            explored: Vec::new(),
            sources: Vec::new(),
        };

        let direct = self.find_recipes(&request.formula, &target).await?;
        if !direct.recipes.is_empty() {
            result.found = true;
            result.recipes_found = direct.recipes.len();
            result.sources.push(RecipeSource {
                formula: request.formula.clone(),
                depth: 0,
                similarity: 1.0,
                recipes: cap(direct.recipes),
            });
            return Ok((result, provenance_ids(Source::Computed, Vec::<String>::new())));
        }

        let mut visited: BTreeSet<String> = BTreeSet::from([target.reduced_formula()]);
        let mut frontier = vec![request.formula.clone()];

        for depth in 1..=request.max_depth {
            if frontier.is_empty() {
                break;
            }
            let level = self
                .expand_level(&frontier, &request, &mut visited)
                .await?;
            debug!(depth, candidates = level.len(), "recursive search level");
            result.depth_reached = depth;

            for candidate in &level {
                let found = self
                    .find_recipes(&candidate.formula, &candidate.composition)
                    .await?;
                result.explored.push(ExploredFormula {
                    formula: candidate.formula.clone(),
                    material_id: candidate.material_id.clone(),
                    depth,
                    similarity: candidate.similarity,
                    parent: candidate.parent.clone(),
                    recipes_found: found.recipes.len(),
                });
                if !found.recipes.is_empty() {
                    result.recipes_found += found.recipes.len();
                    result.sources.push(RecipeSource {
                        formula: candidate.formula.clone(),
                        depth,
                        similarity: candidate.similarity,
                        recipes: cap(found.recipes),
                    });
                }
            }

            if !result.sources.is_empty() {
                result.found = true;
                break;
            }
            frontier = level.into_iter().map(|c| c.formula).collect();
        }

        Ok((result, provenance_ids(Source::Computed, Vec::<String>::new())))
    }

    /// Neighbours of every frontier formula above the confidence threshold,
    /// one entry per unseen reduced formula, best similarity first.
    async fn expand_level(
        &self,
        frontier: &[String],
        request: &RecursiveSearchRequest,
        visited: &mut BTreeSet<String>,
    ) -> Result<Vec<Candidate>, ToolFailure> {
        let mut level: BTreeMap<String, Candidate> = BTreeMap::new();

        for parent in frontier {
            let (neighbors, _) = self
                .composition_neighbors(CompositionSearchRequest {
                    formula: parent.clone(),
                    top_n: request.n_initial_neighbors,
                })
                .await?;

            for neighbor in neighbors.neighbors {
                if neighbor.similarity < request.min_confidence {
                    continue;
                }
                // Index entries with unparseable formulas cannot be looked up.
                let Ok(composition) = Composition::parse(&neighbor.formula) else {
                    continue;
                };
                let reduced = composition.reduced_formula();
                if visited.contains(&reduced) {
                    continue;
                }
                let better = level.get(&reduced).map_or(true, |seen| {
                    neighbor.similarity > seen.similarity
                        || (neighbor.similarity == seen.similarity
                            && neighbor.material_id < seen.material_id)
                });
                if better {
                    level.insert(
                        reduced,
                        Candidate {
                            formula: neighbor.formula,
                            composition,
                            material_id: neighbor.material_id,
                            similarity: neighbor.similarity,
                            parent: parent.clone(),
                        },
                    );
                }
            }
        }

        visited.extend(level.keys().cloned());
        let mut level: Vec<Candidate> = level.into_values().collect();
        level.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.formula.cmp(&b.formula))
                .then_with(|| a.material_id.cmp(&b.material_id))
        });
        Ok(level)
    }
}

fn validate_limits(request: &RecursiveSearchRequest) -> Result<(), ToolFailure> {
    if request.max_depth > MAX_DEPTH {
        return Err(ToolFailure::invalid_input(format!(
            "max_depth must be at most {MAX_DEPTH}."
        )));
    }
    if !(0.0..=1.0).contains(&request.min_confidence) {
        return Err(ToolFailure::invalid_input(
            "min_confidence must be between 0 and 1.",
        ));
    }
    if request.n_initial_neighbors == 0 || request.n_initial_neighbors > MAX_TOP_N {
        return Err(ToolFailure::invalid_input(format!(
            "n_initial_neighbors must be between 1 and {MAX_TOP_N}."
        )));
    }
    Ok(())
}

fn cap(mut recipes: Vec<serde_json::Value>) -> Vec<serde_json::Value> {
    recipes.truncate(DEFAULT_MAX_RECIPES);
    recipes
}
