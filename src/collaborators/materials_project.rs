//! Materials Project REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{classify_reqwest, classify_status, CollaboratorError, MaterialSummary, MaterialsDatabase};

const SERVICE: &str = "Materials Project";
const API_KEY_HEADER: &str = "X-API-KEY";
const SUMMARY_FIELDS: &str =
    "material_id,formula_pretty,band_gap,density,formation_energy_per_atom,energy_above_hull,volume";

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

pub struct MaterialsProjectClient {
    http: Client,
    endpoint: String,
}

impl MaterialsProjectClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, CollaboratorError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollaboratorError::MaterialsApi(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        api_key: &str,
        route: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, CollaboratorError> {
        let url = format!("{}/{}", self.endpoint, route);
        debug!(%url, "Materials Project request");
        let response = self
            .http
            .get(&url)
            .header(API_KEY_HEADER, api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| classify_reqwest(SERVICE, &e, CollaboratorError::MaterialsApi))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(SERVICE, status, &body, CollaboratorError::MaterialsApi));
        }
        let page: Page<T> = response
            .json()
            .await
            .map_err(|e| classify_reqwest(SERVICE, &e, CollaboratorError::MaterialsApi))?;
        Ok(page.data)
    }
}

#[async_trait]
impl MaterialsDatabase for MaterialsProjectClient {
    async fn summaries(
        &self,
        api_key: &str,
        material_ids: &[String],
    ) -> Result<Vec<MaterialSummary>, CollaboratorError> {
        let ids = material_ids.join(",");
        self.get(
            api_key,
            "materials/summary/",
            &[("material_ids", ids.as_str()), ("_fields", SUMMARY_FIELDS)],
        )
        .await
    }

    async fn synthesis_recipes(
        &self,
        api_key: &str,
        formula: &str,
    ) -> Result<Vec<Value>, CollaboratorError> {
        self.get(api_key, "materials/synthesis/", &[("target_formula", formula)])
            .await
    }
}
