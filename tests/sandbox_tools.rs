//! Path-taking tools go through the sandbox before touching the filesystem.

mod common;

use common::harness::IRON_CIF;
use common::TestHarness;
use serde_json::json;
use sky_gateway::ErrorType;

async fn read_cif_path(harness: &TestHarness, path: &str) -> sky_gateway::Envelope {
    harness
        .registry()
        .dispatch("read_cif_path", json!({ "cif_path": path }))
        .await
}

#[tokio::test]
async fn test_reads_file_inside_root() {
    let harness = TestHarness::new();
    harness.write_file("structures/fe.cif", IRON_CIF);

    let envelope = read_cif_path(&harness, "structures/fe.cif").await;
    assert!(envelope.is_ok(), "{:?}", envelope.error());
    assert_eq!(envelope.data()["num_sites"], json!(2));
    assert_eq!(envelope.data()["reduced_formula"], json!("Fe"));
}

#[tokio::test]
async fn test_traversal_is_rejected() {
    let harness = TestHarness::new();
    let envelope = read_cif_path(&harness, "../../etc/passwd").await;
    assert!(matches!(
        envelope.error_type(),
        Some(ErrorType::PermissionDenied) | Some(ErrorType::InvalidInput)
    ));
}

#[tokio::test]
async fn test_missing_file() {
    let harness = TestHarness::new();
    let envelope = read_cif_path(&harness, "nope.cif").await;
    assert_eq!(envelope.error_type(), Some(ErrorType::FileNotFound));
}

#[tokio::test]
async fn test_blank_path() {
    let harness = TestHarness::new();
    let envelope = read_cif_path(&harness, "   ").await;
    assert_eq!(envelope.error_type(), Some(ErrorType::InvalidInput));
}

#[tokio::test]
async fn test_file_over_default_limit() {
    let harness = TestHarness::new();
    harness.write_file("big.cif", vec![b'#'; 2_000_001]);

    let envelope = read_cif_path(&harness, "big.cif").await;
    assert_eq!(envelope.error_type(), Some(ErrorType::FileTooLarge));
}

#[tokio::test]
async fn test_file_over_configured_limit() {
    let harness = TestHarness::new().with_var("SKY_MCP_MAX_FILE_BYTES", "16");
    harness.write_file("fe.cif", IRON_CIF);

    let envelope = read_cif_path(&harness, "fe.cif").await;
    assert_eq!(envelope.error_type(), Some(ErrorType::FileTooLarge));
}

#[tokio::test]
async fn test_directory_is_not_a_file() {
    let harness = TestHarness::new();
    std::fs::create_dir_all(harness.root().join("dir.cif")).unwrap();
    let envelope = read_cif_path(&harness, "dir.cif").await;
    assert!(!envelope.is_ok());
}

#[tokio::test]
async fn test_extra_allowed_root() {
    let outside = tempfile::TempDir::new().unwrap();
    let cif = outside.path().join("fe.cif");
    std::fs::write(&cif, IRON_CIF).unwrap();
    let cif = cif.to_string_lossy().into_owned();

    let harness = TestHarness::new();
    let envelope = read_cif_path(&harness, &cif).await;
    assert_eq!(envelope.error_type(), Some(ErrorType::PermissionDenied));

    let harness = TestHarness::new()
        .with_var("SKY_MCP_ALLOWED_ROOTS", &outside.path().to_string_lossy());
    let envelope = read_cif_path(&harness, &cif).await;
    assert!(envelope.is_ok(), "{:?}", envelope.error());
}

#[tokio::test]
async fn test_unparseable_file_is_runtime_error() {
    let harness = TestHarness::new();
    harness.write_file("junk.cif", "not a cif");
    let envelope = read_cif_path(&harness, "junk.cif").await;
    assert_eq!(envelope.error_type(), Some(ErrorType::RuntimeError));
}

#[tokio::test]
async fn test_structure_path_search_checks_path_before_asset() {
    let harness = TestHarness::new();
    let envelope = harness
        .registry()
        .dispatch(
            "search_similar_by_structure_path",
            json!({ "cif_path": "../../etc/passwd" }),
        )
        .await;
    assert_eq!(envelope.error_type(), Some(ErrorType::PermissionDenied));

    harness.write_file("fe.cif", IRON_CIF);
    let envelope = harness
        .registry()
        .dispatch("search_similar_by_structure_path", json!({ "cif_path": "fe.cif" }))
        .await;
    assert_eq!(envelope.error_type(), Some(ErrorType::FileNotFound));
    assert_eq!(envelope.error().unwrap().message, "Required asset not found.");
}

#[tokio::test]
async fn test_path_below_regular_file_is_not_found() {
    let harness = TestHarness::new();
    harness.write_file("a.cif", IRON_CIF);
    let envelope = read_cif_path(&harness, "a.cif/child.cif").await;
    assert_eq!(envelope.error_type(), Some(ErrorType::FileNotFound));
}
