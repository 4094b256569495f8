use std::path::Path;

use crate::assets::{COMPOSITION_INDEX, RECIPES_DATASET, STRUCTURE_INDEX};
use crate::envelope::{provenance_ids, Envelope, Source};
use crate::mcp::tools::{respond, SkyTools, CAPABILITIES, SELF_CHECK, TOOL_NAMES};
use crate::mcp::types::{
    AssetFiles, AssetFlags, Capabilities, CapabilitiesAssets, EnvFlags, SelfCheckReport, Versions,
};

/// Protocol library the preferred transport is built on.
const MCP_LIBRARY_VERSION: &str = "rmcp 0.14";

impl SkyTools {
    fn asset_flags(&self) -> AssetFlags {
        let config = self.config();
        AssetFlags {
            composition_embedding: COMPOSITION_INDEX.locate(config).is_some(),
            structure_embedding: STRUCTURE_INDEX.locate(config).is_some(),
            recipes_dataset: RECIPES_DATASET.locate(config).is_some(),
        }
    }

    fn env_flags(&self) -> EnvFlags {
        EnvFlags {
            mp_api_key: self.config().mp_api_key().is_some(),
            openai_api_key: self.config().openai_api_key().is_some(),
        }
    }

    /// Available assets, credential presence and versions.
    pub async fn capabilities(&self) -> Envelope {
        let config = self.config();
        let data = Capabilities {
            assets: CapabilitiesAssets {
                flags: self.asset_flags(),
                files: AssetFiles {
                    composition_embeddings: COMPOSITION_INDEX.list(config),
                    structure_embeddings: STRUCTURE_INDEX.list(config),
                    recipes_datasets: RECIPES_DATASET.list(config),
                },
            },
            env: self.env_flags(),
            versions: Versions {
                sky_version: env!("CARGO_PKG_VERSION").to_string(),
                mcp_version: MCP_LIBRARY_VERSION.to_string(),
            },
        };
        respond(
            CAPABILITIES,
            &[],
            Ok((data, provenance_ids(Source::Local, Vec::<String>::new()))),
        )
    }

    /// Deterministic readiness report. Never touches the network.
    pub async fn self_check(&self) -> Envelope {
        let mut tools: Vec<String> = TOOL_NAMES.iter().map(|s| s.to_string()).collect();
        tools.sort();
        let data = SelfCheckReport {
            tools,
            assets: self.asset_flags(),
            report_dir_writable: dir_writable(&self.config().reports_dir()),
            env: self.env_flags(),
        };
        respond(
            SELF_CHECK,
            &[],
            Ok((data, provenance_ids(Source::Local, Vec::<String>::new()))),
        )
    }
}

/// Whether `dir` (or, if it does not exist yet, its parent) looks writable.
///
/// Only the permission bits are consulted (on Unix, any write bit), not an
/// access check for the current user, so a directory writable by its owner
/// alone is reported writable to other users too.
fn dir_writable(dir: &Path) -> bool {
    let target = if dir.exists() {
        Some(dir)
    } else {
        dir.parent()
    };
    target
        .and_then(|p| std::fs::metadata(p).ok())
        .is_some_and(|m| m.is_dir() && !m.permissions().readonly())
}
