//! Tool command handlers: list, call and self-check.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

use crate::cli::output::{
    output_json, print_flag, print_header, print_hint, print_kv, print_success, print_table,
    OutputMode,
};
use crate::envelope::Envelope;
use crate::init::AppContext;
use crate::mcp::tools::SELF_CHECK;

#[derive(Serialize)]
struct ToolListing<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: Value,
}

pub fn handle_list(ctx: &AppContext, mode: OutputMode) {
    match mode {
        OutputMode::Json => {
            let listing: Vec<ToolListing<'_>> = ctx
                .registry
                .descriptors()
                .iter()
                .map(|d| ToolListing {
                    name: d.name,
                    description: d.description,
                    input_schema: d.handler.input_schema(),
                })
                .collect();
            output_json(&listing);
        }
        OutputMode::Human => {
            let rows = ctx
                .registry
                .descriptors()
                .iter()
                .map(|d| vec![d.name.to_string(), d.description.to_string()])
                .collect();
            print_table(&["Tool", "Description"], rows);
        }
    }
}

/// Parse `--args`; absent means no arguments.
fn parse_args(raw: Option<&str>) -> Result<Value> {
    match raw {
        None => Ok(Value::Null),
        Some(raw) => serde_json::from_str(raw).context("--args must be a JSON object"),
    }
}

pub async fn handle_call(
    ctx: &AppContext,
    tool: &str,
    raw_args: Option<&str>,
    mode: OutputMode,
) -> Result<()> {
    let args = parse_args(raw_args)?;
    let envelope = ctx.registry.dispatch(tool, args).await;
    print_envelope(&envelope, mode);
    ensure_ok(&envelope)
}

pub async fn handle_self_check(ctx: &AppContext, mode: OutputMode) -> Result<()> {
    let envelope = ctx.registry.dispatch(SELF_CHECK, Value::Null).await;
    if mode == OutputMode::Json || !envelope.is_ok() {
        print_envelope(&envelope, mode);
        return ensure_ok(&envelope);
    }

    let data = envelope.data();
    let flag = |section: &str, key: &str| data[section][key].as_bool().unwrap_or(false);

    print_header("Self-check");
    print_kv(
        "tools",
        &data["tools"].as_array().map_or(0, |t| t.len()).to_string(),
    );
    print_flag("composition embedding", flag("assets", "composition_embedding"));
    print_flag("structure embedding", flag("assets", "structure_embedding"));
    print_flag("recipes dataset", flag("assets", "recipes_dataset"));
    print_flag(
        "report dir writable",
        data["report_dir_writable"].as_bool().unwrap_or(false),
    );
    print_flag("MP_API_KEY", flag("env", "mp_api_key"));
    print_flag("OpenAI key", flag("env", "openai_api_key"));
    Ok(())
}

fn print_envelope(envelope: &Envelope, mode: OutputMode) {
    if mode == OutputMode::Json {
        output_json(&envelope.to_value());
        return;
    }
    match envelope.error() {
        None => {
            print_success(
                envelope
                    .meta()
                    .get("tool")
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
            );
            output_json(envelope.data());
        }
        Some(error) => {
            print_header(&format!("{}: {}", error.error_type, error.message));
            if !error.details.is_null() {
                output_json(&error.details);
            }
            print_hint("Run with --json for the full envelope.");
        }
    }
}

fn ensure_ok(envelope: &Envelope) -> Result<()> {
    match envelope.error() {
        None => Ok(()),
        Some(error) => anyhow::bail!("tool failed with {}", error.error_type),
    }
}
