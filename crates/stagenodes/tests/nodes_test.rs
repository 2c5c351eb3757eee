// crates/stagenodes/tests/nodes_test.rs

use stagecore::{
    InputBundle, PipelineError, PipelineSettings, RunError, StageDescriptor, Value,
};
use stageruntime::{ParallelismAdvisory, Pipeline, StageRegistry, StageStatus};
use std::sync::Arc;

static ADVISORY: ParallelismAdvisory = ParallelismAdvisory::new();

fn pipeline() -> Pipeline {
    let mut registry = StageRegistry::new();
    stagenodes::register_all(&mut registry);
    Pipeline::new(Arc::new(registry), PipelineSettings::default()).with_advisory(&ADVISORY)
}

fn example() -> Vec<StageDescriptor> {
    vec![
        StageDescriptor::new("source", "input.bundle")
            .with_parameter("required", serde_json::json!(["name"]))
            .then("left")
            .then("right"),
        StageDescriptor::new("left", "product.constant")
            .with_parameter("key", "left")
            .with_parameter("value", serde_json::json!({"gain": 2.0}))
            .then("join"),
        StageDescriptor::new("right", "time.delay")
            .with_parameter("delay_ms", 10)
            .then("join"),
        StageDescriptor::new("join", "product.merge")
            .with_parameter("inputs", serde_json::json!(["input.name", "left"]))
            .with_parameter("output", "summary")
            .then("report"),
        StageDescriptor::new("report", "debug.log").with_parameter("message", "done"),
    ]
}

#[tokio::test]
async fn test_registers_standard_stage_types() {
    let mut registry = StageRegistry::new();
    stagenodes::register_all(&mut registry);

    assert_eq!(
        registry.list_stage_types(),
        vec![
            "debug.log",
            "input.bundle",
            "product.constant",
            "product.merge",
            "time.delay"
        ]
    );
    assert!(registry.get_metadata("input.bundle").unwrap().input_capable);
}

#[tokio::test]
async fn test_example_pipeline_merges_input_and_constants() {
    let pipeline = pipeline();
    pipeline.build(&example()).await.unwrap();

    let bundle = InputBundle::new().with("name", "run-7");
    let outcome = pipeline.run(Some(&bundle)).await.unwrap();

    assert!(outcome.is_success(), "{:?}", outcome.failed);
    assert_eq!(
        pipeline.store().serialize_all()["summary"],
        serde_json::json!({"input.name": "run-7", "left": {"gain": 2.0}})
    );
    assert_eq!(
        pipeline.store().entry("summary").unwrap().producer.as_deref(),
        Some("join")
    );
}

#[tokio::test]
async fn test_missing_required_input_is_rejected() {
    let pipeline = pipeline();
    pipeline.build(&example()).await.unwrap();

    let err = pipeline.run(Some(&InputBundle::new())).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Run(RunError::InputRejected { ref id, .. }) if id == "source"
    ));
}

#[tokio::test]
async fn test_merge_reports_missing_product() {
    let pipeline = pipeline();
    pipeline
        .build(&[
            StageDescriptor::new("merge", "product.merge")
                .with_parameter("inputs", serde_json::json!(["nope"]))
                .with_parameter("output", "out")
                .then("report"),
            StageDescriptor::new("report", "debug.log"),
        ])
        .await
        .unwrap();

    let outcome = pipeline.run(None).await.unwrap();
    assert_eq!(outcome.status("merge"), Some(StageStatus::Failed));
    assert_eq!(outcome.status("report"), Some(StageStatus::Skipped));
    assert_eq!(pipeline.store().get("out"), None);
}

#[tokio::test]
async fn test_lenient_merge_skips_missing_products() {
    let pipeline = pipeline();
    pipeline
        .build(&[
            StageDescriptor::new("k", "product.constant")
                .with_parameter("key", "present")
                .with_parameter("value", 1)
                .then("merge"),
            StageDescriptor::new("merge", "product.merge")
                .with_parameter("inputs", serde_json::json!(["present", "absent"]))
                .with_parameter("output", "out")
                .with_parameter("require_all", false),
        ])
        .await
        .unwrap();

    pipeline.run(None).await.unwrap();
    let out = pipeline.store().get("out").unwrap();
    let out = out.as_object().unwrap();
    assert_eq!(out.get("present"), Some(&Value::Integer(1)));
    assert!(out.get("absent").is_none());
}

#[tokio::test]
async fn test_bad_parameters_fail_the_build() {
    let pipeline = pipeline();

    let err = pipeline
        .build(&[StageDescriptor::new("d", "time.delay").with_parameter("delay_ms", -5)])
        .await
        .unwrap_err();
    assert!(err.is_stage_creation());

    let err = pipeline
        .build(&[StageDescriptor::new("c", "product.constant")])
        .await
        .unwrap_err();
    assert!(err.is_stage_creation());
}
