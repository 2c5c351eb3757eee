// crates/stageruntime/tests/build_test.rs

mod common;

use common::{chain, diamond, record, test_registry, ExecutionLog};
use stagecore::{BuildError, StageDescriptor, StageError};
use stageruntime::GraphBuilder;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn registry() -> (stageruntime::StageRegistry, Arc<AtomicUsize>) {
    let created = Arc::new(AtomicUsize::new(0));
    (test_registry(&ExecutionLog::default(), &created, 1), created)
}

#[tokio::test]
async fn test_degree_invariants_hold_for_diamond() {
    let (registry, _) = registry();
    let graph = GraphBuilder::new(&registry)
        .without_advisory()
        .build(&diamond())
        .await
        .unwrap();

    let ids: Vec<&str> = graph.stage_ids().collect();
    let zero_in = ids.iter().filter(|id| graph.in_degree(id) == Some(0)).count();
    let out_sum: usize = ids.iter().map(|id| graph.out_degree(id).unwrap()).sum();
    let in_sum: usize = ids.iter().map(|id| graph.in_degree(id).unwrap()).sum();

    assert_eq!(graph.start_nodes().len(), zero_in);
    assert_eq!(out_sum, graph.edge_count());
    assert_eq!(in_sum, graph.edge_count());
    assert_eq!(graph.edge_count(), 4);
    assert_eq!(graph.in_degree("d"), Some(2));
    assert_eq!(graph.successors("a"), Some(vec!["b", "c"]));
    assert!(graph.is_branching());
}

#[tokio::test]
async fn test_start_nodes_follow_declaration_order() {
    let (registry, _) = registry();
    let descriptors = vec![
        record("sink"),
        record("zeta").then("sink"),
        record("alpha").then("sink"),
        record("mid").then("sink"),
    ];
    let graph = GraphBuilder::new(&registry)
        .without_advisory()
        .build(&descriptors)
        .await
        .unwrap();

    assert_eq!(graph.start_nodes(), vec!["zeta", "alpha", "mid"]);
    let order = graph.topological_order();
    assert_eq!(order.last(), Some(&"sink"));
}

#[tokio::test]
async fn test_duplicate_id_is_rejected() {
    let (registry, created) = registry();
    let descriptors = vec![record("a"), record("b"), record("a")];

    let err = GraphBuilder::new(&registry)
        .without_advisory()
        .build(&descriptors)
        .await
        .unwrap_err();

    assert_eq!(err, BuildError::DuplicateId("a".to_string()));
    assert!(err.is_config_validation());
    assert_eq!(created.load(Ordering::SeqCst), 0, "no stage may be created");
}

#[tokio::test]
async fn test_empty_id_and_empty_pipeline_are_rejected() {
    let (registry, _) = registry();
    let builder = GraphBuilder::new(&registry).without_advisory();

    let err = builder.build(&[record("a"), record("")]).await.unwrap_err();
    assert_eq!(err, BuildError::EmptyId { position: 1 });

    let err = builder.build(&[]).await.unwrap_err();
    assert_eq!(err, BuildError::EmptyPipeline);
}

#[tokio::test]
async fn test_dangling_edge_is_rejected() {
    let (registry, _) = registry();
    let descriptors = vec![record("a").then("b"), record("b").then("ghost")];

    let err = GraphBuilder::new(&registry)
        .without_advisory()
        .build(&descriptors)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        BuildError::DanglingEdge {
            from: "b".to_string(),
            to: "ghost".to_string()
        }
    );
}

#[tokio::test]
async fn test_cycles_are_rejected() {
    let (registry, created) = registry();
    let builder = GraphBuilder::new(&registry).without_advisory();

    let two_cycle = vec![record("a").then("b"), record("b").then("a")];
    let err = builder.build(&two_cycle).await.unwrap_err();
    assert!(matches!(err, BuildError::CyclicGraph(_)), "got {:?}", err);

    // A cycle below a valid start node still has a start node, but must fail
    let tail_cycle = vec![
        record("start").then("x"),
        record("x").then("y"),
        record("y").then("x"),
    ];
    let err = builder.build(&tail_cycle).await.unwrap_err();
    assert!(matches!(err, BuildError::CyclicGraph(_)));

    let self_loop = vec![record("solo").then("solo")];
    let err = builder.build(&self_loop).await.unwrap_err();
    assert_eq!(err, BuildError::CyclicGraph("solo".to_string()));

    assert_eq!(created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_type_identifies_stage() {
    let (registry, _) = registry();
    let descriptors = vec![record("a").then("b"), StageDescriptor::new("b", "no.such.type")];

    let err = GraphBuilder::new(&registry)
        .without_advisory()
        .build(&descriptors)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        BuildError::UnknownType {
            id: "b".to_string(),
            stage_type: "no.such.type".to_string()
        }
    );
    assert!(err.is_stage_creation());
}

#[tokio::test]
async fn test_initialize_and_factory_failures_abort_build() {
    let (registry, _) = registry();
    let builder = GraphBuilder::new(&registry).without_advisory();

    let err = builder
        .build(&[record("a"), StageDescriptor::new("bad", "test.broken")])
        .await
        .unwrap_err();
    match err {
        BuildError::StageCreationFailed {
            id,
            stage_type,
            source,
        } => {
            assert_eq!(id, "bad");
            assert_eq!(stage_type, "test.broken");
            assert!(matches!(source, StageError::InitializationFailed(_)));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let err = builder
        .build(&[StageDescriptor::new("f", "test.unbuildable")])
        .await
        .unwrap_err();
    assert!(matches!(err, BuildError::StageCreationFailed { ref id, .. } if id == "f"));
}

#[tokio::test]
async fn test_invalid_parameters_fail_initialize() {
    let (registry, _) = registry();
    let bad = record("a").with_parameter("delay_ms", "soon");

    let err = GraphBuilder::new(&registry)
        .without_advisory()
        .build(&[bad])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BuildError::StageCreationFailed {
            source: StageError::Configuration(_),
            ..
        }
    ));
}

#[tokio::test]
async fn test_input_capable_stages_are_classified() {
    let (registry, _) = registry();
    let descriptors = vec![
        StageDescriptor::new("in", "test.capture").then("a"),
        record("a"),
    ];

    let graph = GraphBuilder::new(&registry)
        .without_advisory()
        .build(&descriptors)
        .await
        .unwrap();

    assert_eq!(graph.input_stage_ids(), vec!["in"]);
    assert_eq!(graph.stage_name("in"), Some("CaptureStage"));
    assert_eq!(graph.stage_type("a"), Some("test.record"));
}

#[tokio::test]
async fn test_linear_chain_is_not_branching() {
    let (registry, _) = registry();
    let graph = GraphBuilder::new(&registry)
        .without_advisory()
        .build(&chain(&["a", "b", "c"]))
        .await
        .unwrap();

    assert!(!graph.is_branching());
    assert_eq!(graph.start_nodes(), vec!["a"]);
    assert_eq!(graph.topological_order(), vec!["a", "b", "c"]);
}
