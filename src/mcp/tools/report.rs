use std::path::Path;

use tracing::info;

use crate::artifact::{build_artifact_path, write_atomically};
use crate::envelope::{provenance_outputs, Envelope, ErrorType, Source};
use crate::error::ToolFailure;
use crate::mcp::tools::{respond, SkyTools, ToolOutput, DISCOVER_SYNTHESIS_REPORT};
use crate::mcp::types::{DiscoverReportRequest, SynthesisReport};

const REPORT_WARNINGS: [&str; 3] = ["networked", "nondeterministic", "may incur cost"];

impl SkyTools {
    /// Ask the synthesis agent about `query`, optionally persisting an HTML
    /// report under the reports directory.
    pub async fn discover_synthesis_report(&self, request: DiscoverReportRequest) -> Envelope {
        let Some(api_key) = self.config().openai_api_key() else {
            return respond::<SynthesisReport>(
                DISCOVER_SYNTHESIS_REPORT,
                &[],
                Err(ToolFailure::missing_env(
                    "OPENAI_API_KEY or OPENAI_MDG_API_KEY not found in environment.",
                )),
            );
        };
        respond(
            DISCOVER_SYNTHESIS_REPORT,
            &REPORT_WARNINGS,
            self.synthesis_report(&api_key, request).await,
        )
    }

    async fn synthesis_report(
        &self,
        api_key: &str,
        request: DiscoverReportRequest,
    ) -> ToolOutput<SynthesisReport> {
        if request.query.trim().is_empty() {
            return Err(ToolFailure::invalid_input("query is required."));
        }

        let analysis_text = self
            .collaborators
            .agent
            .discover(api_key, &request.query)
            .await
            .map_err(|e| relabel(ToolFailure::from_collaborator(REPORT_FAILED, e)))?;

        let mut report = SynthesisReport {
            analysis_text,
            report_path: None,
        };
        if request.html {
            let html = self
                .collaborators
                .renderer
                .render(&request.query, &report.analysis_text);
            let path = build_artifact_path(&request.query, &self.config().reports_dir());
            write_atomically(&path, &html)?;
            let relative = relative_to(&path, &self.config().current_dir());
            info!(path = %relative, "wrote synthesis report");
            report.report_path = Some(relative);
        }

        let provenance = provenance_outputs(Source::OpenAi, report.report_path.clone());
        Ok((report, provenance))
    }
}

const REPORT_FAILED: &str = "Synthesis report generation failed.";

/// Agent failures other than timeouts and rate limits are generic runtime
/// failures of this tool.
fn relabel(failure: ToolFailure) -> ToolFailure {
    match failure.error_type {
        ErrorType::UpstreamTimeout | ErrorType::UpstreamRateLimited | ErrorType::MissingEnv => {
            failure
        }
        _ => ToolFailure::runtime(REPORT_FAILED).with_details(failure.details),
    }
}

/// `path` relative to `base` when it lies beneath it, else as given.
fn relative_to(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_relative_to() {
        let base = Path::new("/work");
        assert_eq!(
            relative_to(Path::new("/work/sky_reports/a.html"), base),
            Path::new("sky_reports").join("a.html").to_string_lossy()
        );
        assert_eq!(relative_to(Path::new("/elsewhere/a.html"), base), "/elsewhere/a.html");
    }

    #[test]
    fn test_relabel_keeps_upstream_kinds() {
        let timeout = ToolFailure::new(ErrorType::UpstreamTimeout, REPORT_FAILED);
        assert_eq!(relabel(timeout).error_type, ErrorType::UpstreamTimeout);

        let other = ToolFailure::new(ErrorType::MpApiError, REPORT_FAILED).with_details(json!("boom"));
        let relabeled = relabel(other);
        assert_eq!(relabeled.error_type, ErrorType::RuntimeError);
        assert_eq!(relabeled.details, json!("boom"));
    }
}
