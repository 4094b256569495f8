//! Every registered tool answers with a well-formed envelope, whatever the
//! input, and the registry exposes exactly the expected surface.

mod common;

use common::TestHarness;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use sky_gateway::envelope::validate_value;
use sky_gateway::mcp::tools::TOOL_NAMES;
use sky_gateway::ErrorType;

fn assert_contract(tool: &str, envelope: &Value) {
    validate_value(envelope).unwrap_or_else(|e| panic!("{tool}: {e}\n{envelope:#}"));
    assert_eq!(envelope["meta"]["tool"], json!(tool), "{tool}");
    assert!(envelope["meta"]["version"].is_string(), "{tool}");
    assert!(envelope["meta"]["warnings"].is_array(), "{tool}");
    if envelope["ok"] == json!(true) {
        assert!(envelope["error"].is_null(), "{tool}");
    } else {
        assert!(envelope["data"].is_null(), "{tool}");
        let kind = envelope["error"]["type"].as_str().unwrap();
        assert!(kind.parse::<ErrorType>().is_ok(), "{tool}: {kind}");
    }
}

#[test]
fn test_registry_surface() {
    let harness = TestHarness::new();
    let registry = harness.registry();
    assert_eq!(registry.names(), TOOL_NAMES.to_vec());
    for d in registry.descriptors() {
        assert!(!d.description.is_empty(), "{}", d.name);
        assert_eq!(d.handler.input_schema()["type"], json!("object"), "{}", d.name);
    }
}

#[tokio::test]
async fn test_every_tool_with_empty_arguments() {
    let harness = TestHarness::new();
    let registry = harness.registry();

    for name in TOOL_NAMES {
        let envelope = registry.dispatch(name, json!({})).await.to_value();
        assert_contract(name, &envelope);
    }
}

#[tokio::test]
async fn test_every_tool_with_null_and_garbage_arguments() {
    let harness = TestHarness::new();
    let registry = harness.registry();

    for name in TOOL_NAMES {
        let envelope = registry.dispatch(name, Value::Null).await.to_value();
        assert_contract(name, &envelope);

        let envelope = registry.dispatch(name, json!([1, 2, 3])).await.to_value();
        assert_contract(name, &envelope);
        if !matches!(name, "capabilities" | "self_check") {
            assert_eq!(envelope["error"]["type"], json!("invalid_input"), "{name}");
        }
    }
}

#[tokio::test]
async fn test_unknown_tool_is_invalid_input() {
    let harness = TestHarness::new();
    let envelope = harness
        .registry()
        .dispatch("make_coffee", json!({}))
        .await
        .to_value();
    assert_contract("make_coffee", &envelope);
    assert_eq!(envelope["error"]["type"], json!("invalid_input"));
    assert_eq!(
        envelope["error"]["details"]["available"].as_array().unwrap().len(),
        TOOL_NAMES.len()
    );
}

#[tokio::test]
async fn test_capabilities_lists_are_sorted() {
    let harness = TestHarness::new();
    harness.write_file("assets/embedding/z_composition_v2.json", "[]");
    harness.write_file("assets/embedding/a_composition_v1.json", "[]");
    harness.write_file("assets/embedding/mp_dataset_structure.json", "[]");

    let envelope = harness
        .registry()
        .dispatch("capabilities", json!({}))
        .await
        .to_value();
    assert_eq!(envelope["ok"], json!(true));

    let data = &envelope["data"];
    assert_eq!(
        data["assets"]["files"]["composition_embeddings"],
        json!(["a_composition_v1.json", "z_composition_v2.json"])
    );
    assert_eq!(data["assets"]["composition_embedding"], json!(true));
    assert_eq!(data["assets"]["structure_embedding"], json!(true));
    assert_eq!(data["assets"]["recipes_dataset"], json!(false));
    assert_eq!(data["env"], json!({"mp_api_key": false, "openai_api_key": false}));
    assert_eq!(envelope["provenance"]["source"], json!("local"));
}

#[tokio::test]
async fn test_self_check_is_deterministic() {
    let harness = TestHarness::new().with_var("MP_API_KEY", "k");
    let registry = harness.registry();

    let first = registry.dispatch("self_check", json!({})).await.to_value();
    let second = registry.dispatch("self_check", json!({})).await.to_value();
    assert_eq!(first, second);

    let data = &first["data"];
    let mut expected: Vec<&str> = TOOL_NAMES.to_vec();
    expected.sort();
    assert_eq!(data["tools"], json!(expected));
    assert_eq!(data["report_dir_writable"], json!(true));
    assert_eq!(data["env"]["mp_api_key"], json!(true));
    assert!(!harness.root().join("sky_reports").exists());
}
