use crate::chem::{Structure, StructureSummary};
use crate::envelope::{provenance_ids, Envelope, Source};
use crate::error::ToolFailure;
use crate::mcp::tools::{respond, SkyTools, ToolOutput, READ_CIF, READ_CIF_PATH};
use crate::mcp::types::{CifPathRequest, ReadCifRequest};

impl SkyTools {
    /// Parse CIF text into a structure summary.
    pub async fn read_cif(&self, request: ReadCifRequest) -> Envelope {
        respond(READ_CIF, &[], summarize(Structure::from_cif(&request.cif)))
    }

    /// Sandbox-resolve a CIF path, then summarise it.
    pub async fn read_cif_path(&self, request: CifPathRequest) -> Envelope {
        let result = self
            .load_structure_file(&request.cif_path)
            .await
            .and_then(|s| summarize(Ok(s)));
        respond(READ_CIF_PATH, &[], result)
    }

    /// Read a structure from a sandboxed path. Parse failures of a file the
    /// caller pointed at are reported as `runtime_error`.
    pub(crate) async fn load_structure_file(&self, raw: &str) -> Result<Structure, ToolFailure> {
        let resolved = self.resolve_path(raw)?;
        let text = tokio::fs::read_to_string(resolved.path())
            .await
            .map_err(|e| ToolFailure::runtime_from("Failed to read CIF file.", e))?;
        Structure::from_cif(&text).map_err(|e| ToolFailure::runtime_from("Failed to read CIF file.", e))
    }
}

fn summarize(
    parsed: Result<Structure, crate::chem::CifError>,
) -> ToolOutput<StructureSummary> {
    let summary = parsed?.summary()?;
    Ok((summary, provenance_ids(Source::Local, Vec::<String>::new())))
}
