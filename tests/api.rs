use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use ml_lifecycle_mapper::{
    api::router,
    config::Settings,
    data::{corpus::Document, export},
    nlp::labels::{Dimension, LabelResult, LabelValue},
    pipeline::join,
};
use serde_json::Value;
use tower::ServiceExt;

fn settings_with_records() -> (tempfile::TempDir, Settings) {
    let root = tempfile::tempdir().unwrap();
    let settings = Settings::rooted(root.path());
    let mut labeled = Document::new("10.1/a", "Supervised learning for defect detection.");
    labeled.labels.insert(
        Dimension::Paradigm,
        LabelResult {
            value: LabelValue::Label("supervised".into()),
            confidence: 0.5,
            sources: Vec::new(),
        },
    );
    let records = vec![join(&labeled), join(&Document::new("10.1/b", ""))];
    export::write_records(&settings.outputs_dir, &records).unwrap();
    (root, settings)
}

async fn get(settings: Settings, uri: &str) -> (StatusCode, Value) {
    let response = router(settings)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn records_can_be_filtered_by_label() {
    let (_root, settings) = settings_with_records();
    let (status, body) = get(settings.clone(), "/records?paradigm=supervised").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["records"][0]["id"], "10.1/a");

    let (_, body) = get(settings, "/records?paradigm=unclassified").await;
    assert_eq!(body["records"][0]["id"], "10.1/b");
}

#[tokio::test]
async fn single_record_and_missing_record() {
    let (_root, settings) = settings_with_records();
    let (status, body) = get(settings.clone(), "/records/10.1%2Fa").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paradigm"], "supervised");

    let (status, _) = get(settings, "/records/absent").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn clusters_are_not_found_before_a_run() {
    let (_root, settings) = settings_with_records();
    let (status, _) = get(settings, "/clusters").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
