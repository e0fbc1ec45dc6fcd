mod helpers;

use std::sync::Arc;

use helpers::{index_from_rows, offline_client, test_analyzer, test_catalog, unit, StubEmbedding};
use icpc_coder::analyze::Analyzer;
use icpc_coder::config::AppConfig;
use icpc_coder::error::AnalyzeError;

#[test]
fn from_parts_rejects_catalog_index_mismatch() {
    let catalog = test_catalog();
    // One row fewer than the catalog has entries.
    let rows: Vec<Vec<f32>> = (0..catalog.len() - 1).map(unit).collect();
    let index = index_from_rows(&rows);

    let err = Analyzer::from_parts(
        catalog,
        index,
        Arc::new(StubEmbedding),
        offline_client(),
        &AppConfig::default(),
    )
    .err()
    .expect("mismatched index must be rejected");
    assert!(err.to_string().contains("rebuild"));
}

#[test]
fn from_parts_rejects_dimension_mismatch() {
    let catalog = test_catalog();
    // Rows with the wrong width for the stub's dimension count.
    let rows: Vec<Vec<f32>> = (0..catalog.len()).map(|_| vec![1.0, 0.0]).collect();
    let index = index_from_rows(&rows);

    let err = Analyzer::from_parts(
        catalog,
        index,
        Arc::new(StubEmbedding),
        offline_client(),
        &AppConfig::default(),
    )
    .err()
    .expect("mismatched dimension must be rejected");
    assert!(err.to_string().contains("dimension"));
}

#[tokio::test]
async fn empty_note_fails_before_any_provider_work() {
    let analyzer = test_analyzer(Arc::new(StubEmbedding));
    let err = analyzer.analyze("   \n ").await.unwrap_err();
    assert!(matches!(err, AnalyzeError::EmptyNote));
}

#[tokio::test]
async fn missing_provider_surfaces_on_first_call() {
    // The analyzer builds fine without credentials; the failure belongs to
    // the completion call.
    let analyzer = test_analyzer(Arc::new(StubEmbedding));
    let err = analyzer.analyze("Hoste 5 dager, feber 38.2").await.unwrap_err();
    assert!(matches!(err, AnalyzeError::NoProvider));
}

#[tokio::test]
async fn streaming_path_reports_missing_provider_too() {
    let analyzer = test_analyzer(Arc::new(StubEmbedding));
    let err = analyzer
        .analyze_streaming("Hoste 5 dager, feber 38.2")
        .await
        .err()
        .expect("no provider configured");
    assert!(matches!(err, AnalyzeError::NoProvider));
}
