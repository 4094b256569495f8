//! Nearest-neighbour search over a local JSON index.
//!
//! The index is a JSON array of `{material_id, formula, lattice?}` records,
//! where `lattice` is `[a, b, c, alpha, beta, gamma]`. Composition features are
//! atomic fractions per element; structure features append the lattice
//! parameters scaled to roughly unit range. Loaded indexes are cached per path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{CollaboratorError, Neighbor, SearchQuery, SimilaritySearch};
use crate::chem::{Composition, Structure};
use crate::utils::math::euclidean_distance;

const LENGTH_SCALE: f64 = 10.0;
const ANGLE_SCALE: f64 = 180.0;

#[derive(Debug, Deserialize)]
struct IndexRecord {
    material_id: String,
    formula: String,
    #[serde(default)]
    lattice: Option<[f64; 6]>,
}

#[derive(Debug)]
struct IndexedMaterial {
    material_id: String,
    formula: String,
    fractions: Vec<f64>,
    lattice: Option<[f64; 6]>,
}

impl IndexedMaterial {
    fn structure_features(&self) -> Option<Vec<f64>> {
        self.lattice.map(|l| with_lattice(&self.fractions, l))
    }
}

fn with_lattice(fractions: &[f64], l: [f64; 6]) -> Vec<f64> {
    let mut v = fractions.to_vec();
    v.extend([
        l[0] / LENGTH_SCALE,
        l[1] / LENGTH_SCALE,
        l[2] / LENGTH_SCALE,
        l[3] / ANGLE_SCALE,
        l[4] / ANGLE_SCALE,
        l[5] / ANGLE_SCALE,
    ]);
    v
}

fn structure_query_features(structure: &Structure) -> Result<Vec<f64>, CollaboratorError> {
    let comp = structure
        .composition()
        .map_err(|e| CollaboratorError::InvalidInput(e.to_string()))?;
    let l = structure.lattice();
    Ok(with_lattice(
        &comp.fraction_vector(),
        [l.a, l.b, l.c, l.alpha, l.beta, l.gamma],
    ))
}

type Index = Arc<Vec<IndexedMaterial>>;

/// Default [`SimilaritySearch`] backed by JSON index files.
pub struct JsonIndexSearch {
    indexes: Cache<PathBuf, Index>,
}

impl Default for JsonIndexSearch {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

impl JsonIndexSearch {
    pub fn new(ttl: Duration) -> Self {
        Self {
            indexes: Cache::builder().max_capacity(8).time_to_live(ttl).build(),
        }
    }

    async fn index(&self, dataset: &Path) -> Result<Index, CollaboratorError> {
        let path = dataset.to_path_buf();
        self.indexes
            .try_get_with(path.clone(), load_index(path))
            .await
            .map_err(|e| (*e).clone())
    }
}

async fn load_index(path: PathBuf) -> Result<Index, CollaboratorError> {
    let raw = tokio::fs::read(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CollaboratorError::DatasetNotFound(path.display().to_string())
        } else {
            CollaboratorError::Dataset(format!("{}: {e}", path.display()))
        }
    })?;
    let records: Vec<IndexRecord> = serde_json::from_slice(&raw)
        .map_err(|e| CollaboratorError::Dataset(format!("{}: {e}", path.display())))?;

    let total = records.len();
    let materials: Vec<IndexedMaterial> = records
        .into_iter()
        .filter_map(|r| match Composition::parse(&r.formula) {
            Ok(comp) => Some(IndexedMaterial {
                fractions: comp.fraction_vector(),
                material_id: r.material_id,
                formula: r.formula,
                lattice: r.lattice,
            }),
            Err(e) => {
                warn!(material_id = %r.material_id, "Skipping index entry: {}", e);
                None
            }
        })
        .collect();
    debug!(path = %path.display(), total, usable = materials.len(), "Loaded similarity index");
    Ok(Arc::new(materials))
}

#[async_trait]
impl SimilaritySearch for JsonIndexSearch {
    async fn query(
        &self,
        dataset: &Path,
        query: SearchQuery<'_>,
        n: usize,
    ) -> Result<Vec<Neighbor>, CollaboratorError> {
        let index = self.index(dataset).await?;

        let mut scored: Vec<Neighbor> = match query {
            SearchQuery::Composition(comp) => {
                let q = comp.fraction_vector();
                index
                    .iter()
                    .map(|m| neighbor(m, euclidean_distance(&q, &m.fractions)))
                    .collect()
            }
            SearchQuery::Structure(structure) => {
                let q = structure_query_features(structure)?;
                index
                    .iter()
                    .filter_map(|m| {
                        m.structure_features()
                            .map(|f| neighbor(m, euclidean_distance(&q, &f)))
                    })
                    .collect()
            }
        };

        scored.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.material_id.cmp(&b.material_id))
        });
        scored.truncate(n);
        Ok(scored)
    }
}

fn neighbor(m: &IndexedMaterial, distance: f64) -> Neighbor {
    Neighbor {
        material_id: m.material_id.clone(),
        formula: m.formula.clone(),
        distance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_index(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("mp_dataset_composition.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn test_composition_query_ranks_exact_match_first() {
        let tmp = TempDir::new().unwrap();
        let path = write_index(
            tmp.path(),
            r#"[
                {"material_id": "mp-2", "formula": "FeO"},
                {"material_id": "mp-1", "formula": "Fe2O3"},
                {"material_id": "mp-3", "formula": "NaCl"},
                {"material_id": "mp-4", "formula": "Qq2"}
            ]"#,
        );
        let search = JsonIndexSearch::default();
        let comp = Composition::parse("Fe4O6").unwrap();
        let out = search
            .query(&path, SearchQuery::Composition(&comp), 2)
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].material_id, "mp-1");
        assert!(out[0].distance.abs() < 1e-12);
        assert_eq!(out[1].material_id, "mp-2");
    }

    #[tokio::test]
    async fn test_structure_query_skips_entries_without_lattice() {
        let tmp = TempDir::new().unwrap();
        let path = write_index(
            tmp.path(),
            r#"[
                {"material_id": "mp-1", "formula": "NaCl", "lattice": [5.64, 5.64, 5.64, 90, 90, 90]},
                {"material_id": "mp-2", "formula": "NaCl"}
            ]"#,
        );
        let lattice = crate::chem::cif::Lattice::new(5.64, 5.64, 5.64, 90.0, 90.0, 90.0).unwrap();
        let structure = Structure::new(
            lattice,
            vec![
                crate::chem::cif::Site {
                    element: "Na".into(),
                    frac_coords: [0.0; 3],
                    occupancy: 1.0,
                },
                crate::chem::cif::Site {
                    element: "Cl".into(),
                    frac_coords: [0.5; 3],
                    occupancy: 1.0,
                },
            ],
        )
        .unwrap();
        let out = JsonIndexSearch::default()
            .query(&path, SearchQuery::Structure(&structure), 10)
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].material_id, "mp-1");
    }

    #[tokio::test]
    async fn test_missing_and_malformed_index() {
        let tmp = TempDir::new().unwrap();
        let comp = Composition::parse("Fe").unwrap();
        let search = JsonIndexSearch::default();

        let err = search
            .query(&tmp.path().join("nope.json"), SearchQuery::Composition(&comp), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::DatasetNotFound(_)));

        let bad = write_index(tmp.path(), "{not json");
        let err = search
            .query(&bad, SearchQuery::Composition(&comp), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Dataset(_)));
    }
}
