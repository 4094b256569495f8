//! Backend selection and a full framed JSON-RPC session over the standard
//! tool registry.

mod common;

use std::io::Cursor;

use common::harness::IRON_CIF;
use common::TestHarness;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use sky_gateway::mcp::stdio::FramedJsonRpc;
use sky_gateway::mcp::transport::BackendFactory;
use sky_gateway::mcp::tools::TOOL_NAMES;
use sky_gateway::mcp::{bind, SkyServer, TransportBackend, TransportError, TransportKind};
use tokio::io::AsyncReadExt;

fn frame(message: Value) -> Vec<u8> {
    let body = message.to_string();
    format!("Content-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
}

fn parse_frames(mut raw: &str) -> Vec<Value> {
    let mut out = Vec::new();
    while let Some((header, rest)) = raw.split_once("\r\n\r\n") {
        let len: usize = header
            .trim()
            .strip_prefix("Content-Length:")
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        out.push(serde_json::from_str(&rest[..len]).unwrap());
        raw = &rest[len..];
    }
    out
}

fn failing_rmcp() -> BackendFactory {
    Box::new(|| {
        Err(TransportError::Init {
            backend: "rmcp",
            message: "unavailable".into(),
        })
    })
}

#[tokio::test]
async fn test_falls_back_to_framed_json_rpc() {
    let harness = TestHarness::new();
    harness.write_file("fe.cif", IRON_CIF);
    let registry = harness.registry();

    let mut input = Vec::new();
    input.extend(frame(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}})));
    input.extend(frame(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})));
    input.extend(frame(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})));
    input.extend(frame(json!({
        "jsonrpc": "2.0", "id": 3, "method": "tools/call",
        "params": {"name": "read_cif_path", "arguments": {"cif_path": "fe.cif"}}
    })));
    input.extend(frame(json!({
        "jsonrpc": "2.0", "id": 4, "method": "tools/call",
        "params": {"name": "make_coffee", "arguments": {}}
    })));

    let (writer, mut client) = tokio::io::duplex(1 << 20);
    let backend = FramedJsonRpc::new(Cursor::new(input), writer);
    let factories: Vec<(TransportKind, BackendFactory)> = vec![
        (TransportKind::Rmcp, failing_rmcp()),
        (
            TransportKind::JsonRpc,
            Box::new(move || Ok(Box::new(backend) as Box<dyn TransportBackend>)),
        ),
    ];

    let bound = bind(&registry, factories).unwrap();
    assert_eq!(bound.name(), "json-rpc");
    bound.serve().await.unwrap();

    let mut raw = String::new();
    client.read_to_string(&mut raw).await.unwrap();
    let responses = parse_frames(&raw);
    assert_eq!(responses.len(), 4);

    assert_eq!(responses[0]["id"], json!(1));
    assert_eq!(responses[0]["result"]["serverInfo"]["name"], json!("sky-gateway"));

    let listed: Vec<&str> = responses[1]["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(listed, TOOL_NAMES.to_vec());

    let call = &responses[2]["result"];
    assert_eq!(call["isError"], json!(false));
    assert_eq!(call["structuredContent"]["data"]["reduced_formula"], json!("Fe"));
    let text: Value =
        serde_json::from_str(call["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(text, call["structuredContent"]);

    let unknown = &responses[3]["result"];
    assert_eq!(unknown["isError"], json!(true));
    assert_eq!(
        unknown["structuredContent"]["error"]["type"],
        json!("invalid_input")
    );
}

#[test]
fn test_no_backend() {
    let harness = TestHarness::new();
    let err = match bind(&harness.registry(), vec![(TransportKind::Rmcp, failing_rmcp())]) {
        Ok(_) => panic!("expected bind to fail"),
        Err(e) => e,
    };
    assert!(matches!(err, TransportError::NoBackend(ref tried) if tried == &["rmcp"]));
}

#[test]
fn test_rmcp_is_preferred() {
    let harness = TestHarness::new();
    let factories: Vec<(TransportKind, BackendFactory)> = vec![
        (
            TransportKind::Rmcp,
            Box::new(|| Ok(Box::new(SkyServer::new()) as Box<dyn TransportBackend>)),
        ),
        (
            TransportKind::JsonRpc,
            Box::new(|| -> Result<Box<dyn TransportBackend>, TransportError> {
                panic!("fallback should not be constructed")
            }),
        ),
    ];
    let bound = match bind(&harness.registry(), factories) {
        Ok(bound) => bound,
        Err(e) => panic!("bind failed: {e}"),
    };
    assert_eq!(bound.name(), "rmcp");
}
