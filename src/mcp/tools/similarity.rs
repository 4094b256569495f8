use crate::assets::{COMPOSITION_INDEX, STRUCTURE_INDEX};
use crate::chem::Structure;
use crate::collaborators::{Neighbor, SearchQuery};
use crate::envelope::{provenance_ids, Envelope, Fields, Source};
use crate::error::ToolFailure;
use crate::mcp::tools::{
    parse_formula, respond, SkyTools, ToolOutput, SEARCH_BY_COMPOSITION, SEARCH_BY_STRUCTURE_CIF,
    SEARCH_BY_STRUCTURE_PATH,
};
use crate::mcp::types::{
    CompositionSearchRequest, NeighborList, RankedNeighbor, StructureCifSearchRequest,
    StructurePathSearchRequest, MAX_TOP_N,
};
use crate::utils::math::similarity_from_distance;

const SEARCH_FAILED: &str = "Similarity search failed.";

impl SkyTools {
    pub async fn search_similar_by_composition(&self, request: CompositionSearchRequest) -> Envelope {
        respond(
            SEARCH_BY_COMPOSITION,
            &[],
            self.composition_neighbors(request).await,
        )
    }

    pub async fn search_similar_by_structure_cif(
        &self,
        request: StructureCifSearchRequest,
    ) -> Envelope {
        let result = match Structure::from_cif(&request.cif) {
            Ok(structure) => self.structure_neighbors(&structure, request.top_n).await,
            Err(e) => Err(e.into()),
        };
        respond(SEARCH_BY_STRUCTURE_CIF, &[], result)
    }

    pub async fn search_similar_by_structure_path(
        &self,
        request: StructurePathSearchRequest,
    ) -> Envelope {
        let result = match self.load_structure_file(&request.cif_path).await {
            Ok(structure) => self.structure_neighbors(&structure, request.top_n).await,
            Err(failure) => Err(failure),
        };
        respond(SEARCH_BY_STRUCTURE_PATH, &[], result)
    }

    pub(crate) async fn composition_neighbors(
        &self,
        request: CompositionSearchRequest,
    ) -> ToolOutput<NeighborList> {
        let composition = parse_formula(&request.formula)?;
        let top_n = check_top_n(request.top_n)?;
        let dataset = self.require_asset(&COMPOSITION_INDEX)?;
        let neighbors = self
            .collaborators
            .similarity
            .query(&dataset, SearchQuery::Composition(&composition), top_n)
            .await
            .map_err(|e| ToolFailure::from_collaborator(SEARCH_FAILED, e))?;
        Ok(neighbor_output(Some(request.formula), neighbors))
    }

    async fn structure_neighbors(&self, structure: &Structure, top_n: usize) -> ToolOutput<NeighborList> {
        let top_n = check_top_n(top_n)?;
        let dataset = self.require_asset(&STRUCTURE_INDEX)?;
        let neighbors = self
            .collaborators
            .similarity
            .query(&dataset, SearchQuery::Structure(structure), top_n)
            .await
            .map_err(|e| ToolFailure::from_collaborator(SEARCH_FAILED, e))?;
        Ok(neighbor_output(None, neighbors))
    }
}

fn check_top_n(top_n: usize) -> Result<usize, ToolFailure> {
    if top_n == 0 || top_n > MAX_TOP_N {
        return Err(ToolFailure::invalid_input(format!(
            "top_n must be between 1 and {MAX_TOP_N}."
        )));
    }
    Ok(top_n)
}

/// Sort by `(distance, material_id, formula)` regardless of collaborator
/// order, then assign ranks from 1.
pub(crate) fn rank_neighbors(mut neighbors: Vec<Neighbor>) -> Vec<RankedNeighbor> {
    neighbors.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.material_id.cmp(&b.material_id))
            .then_with(|| a.formula.cmp(&b.formula))
    });
    neighbors
        .into_iter()
        .enumerate()
        .map(|(i, n)| RankedNeighbor {
            rank: i + 1,
            similarity: similarity_from_distance(n.distance),
            material_id: n.material_id,
            formula: n.formula,
            distance: n.distance,
        })
        .collect()
}

fn neighbor_output(query: Option<String>, neighbors: Vec<Neighbor>) -> (NeighborList, Fields) {
    let ranked = rank_neighbors(neighbors);
    let provenance = provenance_ids(Source::Computed, ranked.iter().map(|n| n.material_id.clone()));
    (
        NeighborList {
            query,
            num_results: ranked.len(),
            neighbors: ranked,
        },
        provenance,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(id: &str, formula: &str, d: f64) -> Neighbor {
        Neighbor {
            material_id: id.into(),
            formula: formula.into(),
            distance: d,
        }
    }

    #[test]
    fn test_rank_neighbors_total_order() {
        let ranked = rank_neighbors(vec![
            n("mp-3", "B", 0.5),
            n("mp-2", "Z", 0.1),
            n("mp-2", "A", 0.1),
            n("mp-1", "C", 0.5),
        ]);
        let order: Vec<(&str, &str)> = ranked
            .iter()
            .map(|r| (r.material_id.as_str(), r.formula.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![("mp-2", "A"), ("mp-2", "Z"), ("mp-1", "C"), ("mp-3", "B")]
        );
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[3].rank, 4);
        assert!((ranked[0].similarity - 1.0 / 1.1).abs() < 1e-12);
    }

    #[test]
    fn test_check_top_n() {
        assert!(check_top_n(0).is_err());
        assert!(check_top_n(1).is_ok());
        assert!(check_top_n(MAX_TOP_N).is_ok());
        assert!(check_top_n(MAX_TOP_N + 1).is_err());
    }
}
