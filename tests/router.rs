//! End-to-end tests for the query router over the in-memory store.
//!
//! These tests exercise both edge encodings, predicate pushdown, batched
//! endpoint resolution and the write paths.

use std::sync::Arc;

use docgraph::backend::HealthStatus;
use docgraph::{
    properties, BatchMode, Compare, Direction, EdgeMapping, Element, ElementId, GraphConfig, GraphError,
    InMemoryBackend, Predicates, PropertyKey, PropertyMap, QueryRouter, RequestKind, TypeLayout, Value,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn no_props() -> PropertyMap {
    PropertyMap::new()
}

fn id(s: &str) -> ElementId {
    ElementId::new(s)
}

/// person embeds OUT "created" edges to software and OUT "knows" edges to
/// person; software is standalone.
fn modern(config: GraphConfig) -> (Arc<InMemoryBackend>, QueryRouter) {
    init_tracing();
    let backend = Arc::new(InMemoryBackend::new());
    let router = QueryRouter::builder(config, backend.clone())
        .embedded(
            "person",
            vec![
                EdgeMapping::new("created", "software", Direction::Out, "created"),
                EdgeMapping::new("knows", "person", Direction::Out, "knows"),
            ],
        )
        .standalone("software")
        .build()
        .unwrap();
    (backend, router)
}

// ─────────────────────────────────────────────────────────────────────────────
// STARTUP
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_build_creates_index_and_waits_for_health() {
    let (backend, _router) = modern(GraphConfig::default());
    assert_eq!(backend.request_count(RequestKind::IndexExists), 1);
    assert_eq!(backend.request_count(RequestKind::CreateIndex), 1);
    assert_eq!(backend.request_count(RequestKind::ClusterHealth), 1);
}

#[test]
fn test_health_timeout_is_fatal() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.set_health(HealthStatus::Red);
    let result = QueryRouter::builder(GraphConfig::default(), backend)
        .standalone("software")
        .build();
    assert!(matches!(result, Err(GraphError::Startup(_))));
}

#[test]
fn test_label_used_for_vertices_and_edges_rejected_per_label() {
    let backend = Arc::new(InMemoryBackend::new());
    let result = QueryRouter::builder(GraphConfig::default(), backend)
        .standalone("knows")
        .standalone_edges("knows")
        .build();
    assert!(matches!(result, Err(GraphError::InvalidConfig(_))));
}

#[test]
fn test_invalid_mapping_surfaces_at_build() {
    let backend = Arc::new(InMemoryBackend::new());
    let result = QueryRouter::builder(GraphConfig::default(), backend)
        .embedded("person", vec![EdgeMapping::new("knows", "person", Direction::Both, "knows")])
        .build();
    assert!(matches!(result, Err(GraphError::InvalidMapping(_))));
}

// ─────────────────────────────────────────────────────────────────────────────
// VERTICES
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_add_vertex_and_read_back() {
    let (_backend, router) = modern(GraphConfig::default());
    router
        .add_vertex(Some(id("1")), "person", [("name", Value::from("marko")), ("age", Value::from(29))])
        .unwrap();

    let marko = router.vertex(&id("1")).unwrap().expect("vertex stored");
    assert_eq!(marko.label(), "person");
    assert_eq!(marko.value("name"), Some(Value::from("marko")));
    assert_eq!(marko.value("age"), Some(Value::Int(29)));
    assert!(router.vertex(&id("404")).unwrap().is_none());
}

#[test]
fn test_duplicate_vertex_id_rejected() {
    let (_backend, router) = modern(GraphConfig::default());
    router.add_vertex(Some(id("1")), "person", no_props()).unwrap();
    let again = router.add_vertex(Some(id("1")), "person", no_props());
    assert!(matches!(again, Err(GraphError::AlreadyExists { .. })));
}

#[test]
fn test_unknown_label_and_reserved_key_rejected() {
    let (backend, router) = modern(GraphConfig::default());
    let before = backend.write_count();

    assert!(matches!(
        router.add_vertex(None, "robot", no_props()),
        Err(GraphError::UnknownLabel(_))
    ));
    assert!(matches!(
        router.add_vertex(None, "person", [("~label", "x")]),
        Err(GraphError::InvalidProperty { .. })
    ));
    // the embedded field name is not a property key
    assert!(matches!(
        router.add_vertex(None, "person", [("knows", "x")]),
        Err(GraphError::InvalidProperty { .. })
    ));
    assert_eq!(backend.write_count(), before);
}

#[test]
fn test_property_update_and_removal() {
    let (backend, router) = modern(GraphConfig::default());
    let v = router
        .add_vertex(Some(id("1")), "person", [("name", "marko"), ("city", "santa fe")])
        .unwrap();

    v.set_property("name", "marko a.").unwrap();
    assert_eq!(v.remove_property("city").unwrap(), Some(Value::from("santa fe")));
    assert_eq!(v.remove_property("city").unwrap(), None);

    let stored = backend.get("graph", "person", "1").unwrap();
    assert_eq!(stored.source["name"], serde_json::json!("marko a."));
    assert!(stored.source["city"].is_null());

    let reloaded = router.vertex(&id("1")).unwrap().unwrap();
    assert_eq!(reloaded.value("name"), Some(Value::from("marko a.")));
    assert_eq!(reloaded.value("city"), None);
}

#[test]
fn test_removed_vertex_rejects_mutation_without_writing() {
    let (backend, router) = modern(GraphConfig::default());
    let v = router.add_vertex(Some(id("1")), "person", no_props()).unwrap();
    v.remove().unwrap();
    assert!(backend.get("graph", "person", "1").is_none());

    let before = backend.write_count();
    assert!(matches!(
        v.set_property("name", "ghost"),
        Err(GraphError::ElementRemoved { .. })
    ));
    assert!(v.remove().is_err());
    assert_eq!(backend.write_count(), before);
}

#[test]
fn test_schema_template_installed_once() {
    let (backend, router) = modern(GraphConfig::default());
    router.add_vertex(None, "person", no_props()).unwrap();
    router.add_vertex(None, "person", no_props()).unwrap();
    assert_eq!(backend.request_count(RequestKind::PutMapping), 1);
    assert!(backend.mapping("graph", "person").is_some());
}

#[test]
fn test_rejected_template_does_not_block_writes() {
    let (backend, router) = modern(GraphConfig::default());
    backend.reject_mappings(true);
    router.add_vertex(Some(id("3")), "software", [("name", "lop")]).unwrap();
    router.add_vertex(Some(id("5")), "software", [("name", "ripple")]).unwrap();
    assert_eq!(backend.request_count(RequestKind::PutMapping), 1);
    assert!(backend.get("graph", "software", "5").is_some());
}

// ─────────────────────────────────────────────────────────────────────────────
// EMBEDDED EDGES
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_created_edge_embedded_in_person() {
    let (backend, router) = modern(GraphConfig::default());
    let marko = router.add_vertex(Some(id("1")), "person", [("name", "marko")]).unwrap();
    let lop = router.add_vertex(Some(id("3")), "software", [("name", "lop")]).unwrap();

    let edge = router
        .add_edge(&marko, &lop, "created", Some(id("9")), [("weight", 0.4)])
        .unwrap();
    assert!(edge.is_embedded());
    assert_eq!(edge.out_id(), &id("1"));
    assert_eq!(edge.in_id(), &id("3"));

    let doc = backend.get("graph", "person", "1").unwrap();
    let groups = doc.source["created"].as_array().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["~eid"], serde_json::json!("9"));
    assert_eq!(groups[0]["~vid"], serde_json::json!("3"));
    assert_eq!(groups[0]["weight"], serde_json::json!(0.4));
    // the empty knows group is still written as an array
    assert_eq!(doc.source["knows"], serde_json::json!([]));
    // no edge document was written
    assert!(backend.get("graph", "created", "9").is_none());
}

#[test]
fn test_embedded_round_trip_resolves_far_endpoint() {
    let (_backend, router) = modern(GraphConfig::default());
    let marko = router.add_vertex(Some(id("1")), "person", [("name", "marko")]).unwrap();
    let lop = router.add_vertex(Some(id("3")), "software", [("name", "lop")]).unwrap();
    router.add_edge(&marko, &lop, "created", Some(id("9")), [("weight", 0.4)]).unwrap();

    let loaded = router.vertex(&id("1")).unwrap().unwrap();
    let edges = loaded.inner_edges(Direction::Out, &[], &Predicates::new()).unwrap();
    assert_eq!(edges.len(), 1);
    let edge = &edges[0];
    assert_eq!(edge.label(), "created");
    assert_eq!(edge.id(), &id("9"));
    assert_eq!(edge.value("weight"), Some(Value::Float(0.4)));

    let far = edge.in_vertex().unwrap().expect("lop exists");
    assert_eq!(far.value("name"), Some(Value::from("lop")));
    assert_eq!(edge.out_vertex().unwrap().unwrap().id(), &id("1"));
}

#[test]
fn test_no_container_fails_without_writes() {
    let (backend, router) = modern(GraphConfig::default());
    let lop = router.add_vertex(Some(id("3")), "software", no_props()).unwrap();
    let ripple = router.add_vertex(Some(id("5")), "software", no_props()).unwrap();
    let before = backend.write_count();

    let result = router.add_edge(&lop, &ripple, "dependsOn", Some(id("e1")), no_props());
    match result {
        Err(GraphError::NoEdgeContainer { label, out_id, in_id, edge_id }) => {
            assert_eq!(label, "dependsOn");
            assert_eq!(out_id, id("3"));
            assert_eq!(in_id, id("5"));
            assert_eq!(edge_id, id("e1"));
        }
        other => panic!("expected NoEdgeContainer, got {:?}", other.map(|e| e.id().clone())),
    }
    assert_eq!(backend.write_count(), before);
}

#[test]
fn test_mapping_requires_matching_other_label() {
    let (_backend, router) = modern(GraphConfig::default());
    let marko = router.add_vertex(Some(id("1")), "person", no_props()).unwrap();
    let vadas = router.add_vertex(Some(id("2")), "person", no_props()).unwrap();
    // "created" only embeds towards software
    assert!(matches!(
        router.add_edge(&marko, &vadas, "created", None, no_props()),
        Err(GraphError::NoEdgeContainer { .. })
    ));
    assert!(router.add_edge(&marko, &vadas, "knows", None, no_props()).is_ok());
}

#[test]
fn test_duplicate_inner_edge_id_rejected() {
    let (_backend, router) = modern(GraphConfig::default());
    let marko = router.add_vertex(Some(id("1")), "person", no_props()).unwrap();
    let lop = router.add_vertex(Some(id("3")), "software", no_props()).unwrap();
    router.add_edge(&marko, &lop, "created", Some(id("9")), no_props()).unwrap();
    assert!(matches!(
        router.add_edge(&marko, &lop, "created", Some(id("9")), no_props()),
        Err(GraphError::AlreadyExists { .. })
    ));
    assert_eq!(marko.inner_edges(Direction::Both, &[], &Predicates::new()).unwrap().len(), 1);
}

#[test]
fn test_embedded_edge_property_and_removal() {
    let (backend, router) = modern(GraphConfig::default());
    let marko = router.add_vertex(Some(id("1")), "person", no_props()).unwrap();
    let lop = router.add_vertex(Some(id("3")), "software", no_props()).unwrap();
    let edge = router.add_edge(&marko, &lop, "created", Some(id("9")), [("weight", 0.4)]).unwrap();

    edge.set_property("weight", 1.0).unwrap();
    let groups = backend.get("graph", "person", "1").unwrap().source["created"].clone();
    assert_eq!(groups[0]["weight"], serde_json::json!(1.0));

    edge.remove().unwrap();
    let doc = backend.get("graph", "person", "1").unwrap();
    assert_eq!(doc.source["created"], serde_json::json!([]));
    assert!(edge.set_property("weight", 2.0).is_err());
}

#[test]
fn test_dangling_reference_resolves_to_none() {
    let (_backend, router) = modern(GraphConfig::default());
    let marko = router.add_vertex(Some(id("1")), "person", no_props()).unwrap();
    let peter = router.add_vertex(Some(id("6")), "person", no_props()).unwrap();
    router.add_edge(&marko, &peter, "knows", Some(id("k1")), no_props()).unwrap();
    peter.remove().unwrap();

    let loaded = router.vertex(&id("1")).unwrap().unwrap();
    let edges = loaded.inner_edges(Direction::Out, &["knows".to_string()], &Predicates::new()).unwrap();
    assert_eq!(edges.len(), 1);
    assert!(edges[0].in_vertex().unwrap().is_none());
}

#[test]
fn test_vertex_from_other_configuration_cannot_embed() {
    init_tracing();
    let backend = Arc::new(InMemoryBackend::new());
    let old = QueryRouter::builder(GraphConfig::default(), backend.clone())
        .embedded("person", vec![EdgeMapping::new("created", "software", Direction::Out, "created")])
        .standalone("software")
        .build()
        .unwrap();
    let current = QueryRouter::builder(GraphConfig::default(), backend.clone())
        .embedded("person", vec![EdgeMapping::new("knows", "person", Direction::Out, "knows")])
        .standalone("software")
        .build()
        .unwrap();

    let marko = old.add_vertex(Some(id("1")), "person", no_props()).unwrap();
    let lop = current.add_vertex(Some(id("3")), "software", no_props()).unwrap();
    let before = backend.write_count();

    // the old mapping set would store this edge; the current one cannot
    assert!(matches!(
        current.add_edge(&marko, &lop, "created", Some(id("9")), no_props()),
        Err(GraphError::NoEdgeContainer { .. })
    ));
    assert_eq!(backend.write_count(), before);
    assert_eq!(backend.get("graph", "person", "1").unwrap().source["created"], serde_json::json!([]));

    // a handle loaded through the current router embeds under its mappings
    let reloaded = current.vertex(&id("1")).unwrap().unwrap();
    let vadas = current.add_vertex(Some(id("2")), "person", no_props()).unwrap();
    assert!(current.add_edge(&reloaded, &vadas, "knows", None, no_props()).unwrap().is_embedded());
}

#[test]
fn test_vertex_owned_by_another_router_cannot_embed() {
    let backend = Arc::new(InMemoryBackend::new());
    let build = || {
        QueryRouter::builder(GraphConfig::default(), backend.clone())
            .embedded("person", vec![EdgeMapping::new("created", "software", Direction::Out, "created")])
            .standalone("software")
            .build()
            .unwrap()
    };
    let first = build();
    let second = build();

    let marko = first.add_vertex(Some(id("1")), "person", no_props()).unwrap();
    let lop = second.add_vertex(Some(id("3")), "software", no_props()).unwrap();
    assert!(matches!(
        second.add_edge(&marko, &lop, "created", None, no_props()),
        Err(GraphError::NoEdgeContainer { .. })
    ));
    assert!(first.add_edge(&marko, &lop, "created", None, no_props()).is_ok());
}

#[test]
fn test_inner_edge_write_keeps_changes_from_other_handles() {
    let (backend, router) = modern(GraphConfig::default());
    let marko = router.add_vertex(Some(id("1")), "person", [("age", 29)]).unwrap();
    let lop = router.add_vertex(Some(id("3")), "software", no_props()).unwrap();
    let vadas = router.add_vertex(Some(id("2")), "person", no_props()).unwrap();
    router.add_edge(&marko, &lop, "created", Some(id("9")), no_props()).unwrap();

    // change the property and drop the created edge through a loaded copy
    let copy = router.vertex(&id("1")).unwrap().unwrap();
    copy.set_property("age", 30).unwrap();
    let created = copy.inner_edges(Direction::Out, &["created".to_string()], &Predicates::new()).unwrap();
    created[0].remove().unwrap();

    // the original handle still caches age 29 and edge 9
    router.add_edge(&marko, &vadas, "knows", Some(id("7")), no_props()).unwrap();

    let doc = backend.get("graph", "person", "1").unwrap();
    assert_eq!(doc.source["age"], serde_json::json!(30));
    assert_eq!(doc.source["created"], serde_json::json!([]));
    assert_eq!(doc.source["knows"].as_array().map(Vec::len), Some(1));
}

// ─────────────────────────────────────────────────────────────────────────────
// LAZY RESOLUTION
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_far_endpoints_fetched_in_one_multi_get() {
    let (backend, router) = modern(GraphConfig::default());
    let marko = router.add_vertex(Some(id("1")), "person", no_props()).unwrap();
    let lop = router.add_vertex(Some(id("3")), "software", no_props()).unwrap();
    let ripple = router.add_vertex(Some(id("5")), "software", no_props()).unwrap();
    let vadas = router.add_vertex(Some(id("2")), "person", no_props()).unwrap();
    let gone = router.add_vertex(Some(id("4")), "person", no_props()).unwrap();
    router.add_edge(&marko, &lop, "created", None, no_props()).unwrap();
    router.add_edge(&marko, &ripple, "created", None, no_props()).unwrap();
    router.add_edge(&marko, &vadas, "knows", None, no_props()).unwrap();
    router.add_edge(&marko, &gone, "knows", None, no_props()).unwrap();
    gone.remove().unwrap();

    let loaded = router.vertex(&id("1")).unwrap().unwrap();
    backend.clear_requests();

    let edges = loaded.inner_edges(Direction::Out, &[], &Predicates::new()).unwrap();
    assert_eq!(edges.len(), 4);
    let resolved: Vec<_> = edges.iter().map(|e| e.in_vertex().unwrap()).collect();

    assert_eq!(backend.request_count(RequestKind::MultiGet), 1);
    let requests = backend.requests();
    let mut fetched = requests[0].ids.clone();
    fetched.sort();
    assert_eq!(fetched, vec!["2", "3", "4", "5"]);
    assert_eq!(resolved.iter().filter(|v| v.is_none()).count(), 1);
}

#[test]
fn test_vertex_refs_share_one_window() {
    let (backend, router) = modern(GraphConfig::default());
    router.add_vertex(Some(id("1")), "person", [("name", "marko")]).unwrap();
    router.add_vertex(Some(id("2")), "person", [("name", "vadas")]).unwrap();
    backend.clear_requests();

    let a = router.vertex_ref("1", "person").unwrap();
    let b = router.vertex_ref("2", "person").unwrap();
    let c = router.vertex_ref("1", "person").unwrap();
    assert_eq!(a.resolve().unwrap().unwrap().value("name"), Some(Value::from("marko")));
    assert_eq!(b.resolve().unwrap().unwrap().value("name"), Some(Value::from("vadas")));
    assert!(c.resolve().unwrap().is_some());
    assert_eq!(backend.request_count(RequestKind::MultiGet), 1);
    assert_eq!(backend.requests()[0].ids, vec!["1", "2"]);

    // the sealed window is replaced, not reused
    let d = router.vertex_ref("2", "person").unwrap();
    assert!(d.resolve().unwrap().is_some());
    assert_eq!(backend.request_count(RequestKind::MultiGet), 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// TRAVERSAL
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_in_edges_found_inside_other_documents() {
    let (backend, router) = modern(GraphConfig::default());
    let marko = router.add_vertex(Some(id("1")), "person", [("name", "marko")]).unwrap();
    let josh = router.add_vertex(Some(id("4")), "person", [("name", "josh")]).unwrap();
    let lop = router.add_vertex(Some(id("3")), "software", [("name", "lop")]).unwrap();
    let ripple = router.add_vertex(Some(id("5")), "software", [("name", "ripple")]).unwrap();
    router.add_edge(&marko, &lop, "created", None, [("weight", 0.4)]).unwrap();
    router.add_edge(&josh, &lop, "created", None, [("weight", 0.4)]).unwrap();
    router.add_edge(&josh, &ripple, "created", None, [("weight", 1.0)]).unwrap();
    backend.clear_requests();

    let grouped = router
        .edges_bulk(&[lop.clone(), ripple.clone()], Direction::In, &[], &Predicates::new())
        .unwrap();
    assert_eq!(backend.request_count(RequestKind::Search), 1);
    assert_eq!(grouped[&id("3")].len(), 2);
    assert_eq!(grouped[&id("5")].len(), 1);

    // seeds are reused as loaded endpoints
    let creators: Vec<_> = grouped[&id("3")]
        .iter()
        .map(|e| e.in_vertex().unwrap().unwrap().id().clone())
        .collect();
    assert!(creators.iter().all(|c| c == &id("3")));
    assert_eq!(backend.request_count(RequestKind::MultiGet), 0);
}

#[test]
fn test_vertex_edges_both_directions_without_duplicates() {
    let (_backend, router) = modern(GraphConfig::default());
    let marko = router.add_vertex(Some(id("1")), "person", no_props()).unwrap();
    let vadas = router.add_vertex(Some(id("2")), "person", no_props()).unwrap();
    router.add_edge(&marko, &vadas, "knows", Some(id("k1")), no_props()).unwrap();
    router.add_edge(&marko, &marko, "knows", Some(id("self")), no_props()).unwrap();

    let out = router.vertex_edges(&marko, Direction::Out, &[], &Predicates::new()).unwrap();
    assert_eq!(out.len(), 2);

    let into_vadas = router.vertex_edges(&vadas, Direction::In, &[], &Predicates::new()).unwrap();
    assert_eq!(into_vadas.len(), 1);
    assert_eq!(into_vadas[0].out_id(), &id("1"));

    let both = router.vertex_edges(&marko, Direction::Both, &[], &Predicates::new()).unwrap();
    let mut ids: Vec<_> = both.iter().map(|e| e.id().as_str().to_string()).collect();
    ids.sort();
    assert_eq!(ids, vec!["k1", "self"]);
}

#[test]
fn test_vertex_edges_window_applies_after_merge() {
    let (_backend, router) = modern(GraphConfig::default());
    let marko = router.add_vertex(Some(id("1")), "person", no_props()).unwrap();
    for n in 0..4 {
        let sw = router.add_vertex(Some(id(&format!("s{}", n))), "software", no_props()).unwrap();
        router.add_edge(&marko, &sw, "created", None, [("weight", n)]).unwrap();
    }
    let edges = router
        .vertex_edges(&marko, Direction::Out, &[], &Predicates::new().range(1, 3))
        .unwrap();
    assert_eq!(edges.len(), 2);

    let heavy = router
        .vertex_edges(
            &marko,
            Direction::Out,
            &["created".to_string()],
            &Predicates::new().has("weight", Compare::Gte(Value::Int(2))),
        )
        .unwrap();
    assert_eq!(heavy.len(), 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// STANDALONE EDGES
// ─────────────────────────────────────────────────────────────────────────────

fn with_standalone_edges() -> (Arc<InMemoryBackend>, QueryRouter) {
    let backend = Arc::new(InMemoryBackend::new());
    let router = QueryRouter::builder(GraphConfig::default(), backend.clone())
        .embedded(
            "person",
            vec![EdgeMapping::new("created", "software", Direction::Out, "created")],
        )
        .standalone("software")
        .standalone_edges("knows")
        .standalone_edges("dependsOn")
        .build()
        .unwrap();
    (backend, router)
}

#[test]
fn test_standalone_edge_routed_by_out_id() {
    let (backend, router) = with_standalone_edges();
    let marko = router.add_vertex(Some(id("1")), "person", no_props()).unwrap();
    let vadas = router.add_vertex(Some(id("2")), "person", no_props()).unwrap();

    let edge = router.add_edge(&marko, &vadas, "knows", Some(id("7")), [("weight", 0.5)]).unwrap();
    assert!(!edge.is_embedded());

    let doc = backend.get("graph", "knows", "7").unwrap();
    assert_eq!(doc.routing.as_deref(), Some("1"));
    assert_eq!(doc.source["~out"], serde_json::json!("1"));
    assert_eq!(doc.source["~in"], serde_json::json!("2"));
    assert_eq!(doc.source["~outLabel"], serde_json::json!("person"));
    assert_eq!(doc.source["~inLabel"], serde_json::json!("person"));
}

#[test]
fn test_embedding_preferred_over_standalone_label() {
    let (backend, router) = with_standalone_edges();
    let lop = router.add_vertex(Some(id("3")), "software", no_props()).unwrap();
    let ripple = router.add_vertex(Some(id("5")), "software", no_props()).unwrap();
    let marko = router.add_vertex(Some(id("1")), "person", no_props()).unwrap();

    let dep = router.add_edge(&ripple, &lop, "dependsOn", None, no_props()).unwrap();
    assert!(!dep.is_embedded());
    let created = router.add_edge(&marko, &lop, "created", None, no_props()).unwrap();
    assert!(created.is_embedded());
    assert!(backend.documents("graph").iter().all(|d| d.doc_type != "created"));
}

#[test]
fn test_edges_by_ids_across_encodings_in_request_order() {
    let (_backend, router) = with_standalone_edges();
    let marko = router.add_vertex(Some(id("1")), "person", no_props()).unwrap();
    let vadas = router.add_vertex(Some(id("2")), "person", no_props()).unwrap();
    let lop = router.add_vertex(Some(id("3")), "software", no_props()).unwrap();
    router.add_edge(&marko, &vadas, "knows", Some(id("7")), no_props()).unwrap();
    router.add_edge(&marko, &lop, "created", Some(id("9")), no_props()).unwrap();

    let found = router.edges_by_ids(&[id("9"), id("missing"), id("7")]).unwrap();
    let ids: Vec<_> = found.iter().map(|e| e.id().as_str()).collect();
    assert_eq!(ids, vec!["9", "7"]);
    assert!(found[0].is_embedded());
    assert!(!found[1].is_embedded());
}

#[test]
fn test_standalone_adjacency_and_mutation() {
    let (backend, router) = with_standalone_edges();
    let marko = router.add_vertex(Some(id("1")), "person", no_props()).unwrap();
    let vadas = router.add_vertex(Some(id("2")), "person", no_props()).unwrap();
    let josh = router.add_vertex(Some(id("4")), "person", no_props()).unwrap();
    let k1 = router.add_edge(&marko, &vadas, "knows", Some(id("7")), [("weight", 0.5)]).unwrap();
    router.add_edge(&marko, &josh, "knows", Some(id("8")), [("weight", 1.0)]).unwrap();

    let out = router.vertex_edges(&marko, Direction::Out, &["knows".to_string()], &Predicates::new()).unwrap();
    assert_eq!(out.len(), 2);
    let into_josh = router.vertex_edges(&josh, Direction::In, &[], &Predicates::new()).unwrap();
    assert_eq!(into_josh.len(), 1);
    assert_eq!(into_josh[0].id(), &id("8"));

    k1.set_property("weight", 0.75).unwrap();
    assert_eq!(
        backend.get("graph", "knows", "7").unwrap().source["weight"],
        serde_json::json!(0.75)
    );
    k1.remove().unwrap();
    assert!(backend.get("graph", "knows", "7").is_none());
}

#[test]
fn test_all_edges_merges_encodings() {
    let (_backend, router) = with_standalone_edges();
    let marko = router.add_vertex(Some(id("1")), "person", no_props()).unwrap();
    let vadas = router.add_vertex(Some(id("2")), "person", no_props()).unwrap();
    let lop = router.add_vertex(Some(id("3")), "software", no_props()).unwrap();
    router.add_edge(&marko, &vadas, "knows", None, no_props()).unwrap();
    router.add_edge(&marko, &lop, "created", None, no_props()).unwrap();

    let all: Vec<_> = router.edges().unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(all.len(), 2);

    let created: Vec<_> = router
        .edges_matching(&Predicates::new().has(PropertyKey::Label, Compare::Eq("created".into())))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(created.len(), 1);
    assert!(created[0].is_embedded());
}

// ─────────────────────────────────────────────────────────────────────────────
// QUERIES
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_window_upper_bound_caps_search() {
    let (backend, router) = modern(GraphConfig::default().with_scroll_size(2));
    for n in 0..7 {
        router.add_vertex(Some(id(&format!("s{}", n))), "software", no_props()).unwrap();
    }
    backend.clear_requests();

    let preds = Predicates::new()
        .has(PropertyKey::Label, Compare::Eq("software".into()))
        .limit(3);
    let found: Vec<_> = router.vertices_matching(&preds).unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(found.len(), 3);
    assert_eq!(backend.request_count(RequestKind::Search), 1);
    assert_eq!(backend.request_count(RequestKind::Scroll), 1);
}

#[test]
fn test_scroll_pages_through_everything() {
    let (backend, router) = modern(GraphConfig::default().with_scroll_size(3));
    for n in 0..7 {
        router.add_vertex(Some(id(&format!("s{}", n))), "software", no_props()).unwrap();
    }
    backend.clear_requests();

    let preds = Predicates::new().has(PropertyKey::Label, Compare::Eq("software".into()));
    let found: Vec<_> = router.vertices_matching(&preds).unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(found.len(), 7);
    assert_eq!(backend.request_count(RequestKind::Search), 1);
    assert_eq!(backend.request_count(RequestKind::Scroll), 3);
}

#[test]
fn test_contains_evaluated_locally_before_window() {
    let (_backend, router) = modern(GraphConfig::default());
    router.add_vertex(Some(id("3")), "software", [("name", "lop")]).unwrap();
    router.add_vertex(Some(id("5")), "software", [("name", "ripple")]).unwrap();
    router.add_vertex(Some(id("7")), "software", [("name", "loop")]).unwrap();

    let preds = Predicates::new()
        .has(PropertyKey::Label, Compare::Eq("software".into()))
        .has("name", Compare::Contains("op".into()))
        .range(1, 3);
    let found: Vec<_> = router.vertices_matching(&preds).unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id(), &id("7"));
}

#[test]
fn test_plain_label_key_queries_user_property() {
    let (_backend, router) = modern(GraphConfig::default());
    router.add_vertex(Some(id("3")), "software", [("label", "draft")]).unwrap();
    router.add_vertex(Some(id("5")), "software", [("label", "final")]).unwrap();
    router.add_vertex(Some(id("1")), "person", no_props()).unwrap();

    let preds = Predicates::new().has("label", Compare::Eq("draft".into()));
    let found: Vec<_> = router.vertices_matching(&preds).unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id(), &id("3"));
    assert_eq!(found[0].label(), "software");
}

#[test]
fn test_vertices_by_ids_preserves_request_order() {
    let (_backend, router) = modern(GraphConfig::default());
    router.add_vertex(Some(id("1")), "person", no_props()).unwrap();
    router.add_vertex(Some(id("3")), "software", no_props()).unwrap();
    router.add_vertex(Some(id("2")), "person", no_props()).unwrap();

    let found = router.vertices_by_ids(&[id("3"), id("nope"), id("1"), id("2")]).unwrap();
    let ids: Vec<_> = found.iter().map(|v| v.id().as_str()).collect();
    assert_eq!(ids, vec!["3", "1", "2"]);
}

#[test]
fn test_range_predicates_pushed_down() {
    let (_backend, router) = modern(GraphConfig::default());
    router.add_vertex(Some(id("1")), "person", [("age", 29)]).unwrap();
    router.add_vertex(Some(id("2")), "person", [("age", 27)]).unwrap();
    router.add_vertex(Some(id("4")), "person", [("age", 32)]).unwrap();
    router.add_vertex(Some(id("6")), "person", [("age", 35)]).unwrap();

    let preds = Predicates::new()
        .has(PropertyKey::Label, Compare::Eq("person".into()))
        .has("age", Compare::Between(Value::Int(28), Value::Int(35)));
    let mut ids: Vec<String> = router
        .vertices_matching(&preds)
        .unwrap()
        .map(|v| v.map(|v| v.id().as_str().to_string()))
        .collect::<Result<_, _>>()
        .unwrap();
    ids.sort();
    assert_eq!(ids, vec!["1", "4"]);
}

// ─────────────────────────────────────────────────────────────────────────────
// BULK MODE
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_bulk_mode_defers_writes_and_last_write_wins() {
    let (backend, router) = modern(GraphConfig::default().with_batch_mode(BatchMode::Bulk));
    let before = backend.write_count();

    let v = router.add_vertex(Some(id("1")), "person", [("name", "first")]).unwrap();
    v.set_property("name", "second").unwrap();
    v.set_property("name", "third").unwrap();
    assert_eq!(backend.write_count(), before);
    assert!(backend.get("graph", "person", "1").is_none());

    assert_eq!(router.commit().unwrap(), 3);
    assert_eq!(backend.request_count(RequestKind::Bulk), 1);
    assert_eq!(
        backend.get("graph", "person", "1").unwrap().source["name"],
        serde_json::json!("third")
    );
    assert_eq!(router.commit().unwrap(), 0);
}

#[test]
fn test_bulk_conflict_surfaces_on_commit() {
    let (_backend, router) = modern(GraphConfig::default().with_batch_mode(BatchMode::Bulk));
    router.add_vertex(Some(id("1")), "person", no_props()).unwrap();
    router.add_vertex(Some(id("1")), "person", no_props()).unwrap();
    assert!(matches!(router.commit(), Err(GraphError::BulkFailed { failures }) if failures.len() == 1));
}

// ─────────────────────────────────────────────────────────────────────────────
// SHARED LAYOUT
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_shared_layout_discriminates_by_fields() {
    let layout = TypeLayout::Shared {
        doc_type: "element".to_string(),
    };
    let backend = Arc::new(InMemoryBackend::new());
    let router = QueryRouter::builder(GraphConfig::default().with_layout(layout), backend.clone())
        .embedded(
            "person",
            vec![EdgeMapping::new("created", "software", Direction::Out, "created")],
        )
        .standalone("software")
        .standalone_edges("knows")
        .build()
        .unwrap();

    let marko = router.add_vertex(Some(id("1")), "person", [("name", "marko")]).unwrap();
    let vadas = router.add_vertex(Some(id("2")), "person", [("name", "vadas")]).unwrap();
    let lop = router.add_vertex(Some(id("3")), "software", [("name", "lop")]).unwrap();
    router.add_edge(&marko, &vadas, "knows", Some(id("7")), no_props()).unwrap();
    router.add_edge(&marko, &lop, "created", Some(id("9")), no_props()).unwrap();

    assert!(backend.documents("graph").iter().all(|d| d.doc_type == "element"));
    let doc = backend.get("graph", "element", "1").unwrap();
    assert_eq!(doc.source["~label"], serde_json::json!("person"));
    assert_eq!(doc.source["~kind"], serde_json::json!("vertex"));

    let people: Vec<_> = router
        .vertices_matching(&Predicates::new().has(PropertyKey::Label, Compare::Eq("person".into())))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(people.len(), 2);

    let vertices: Vec<_> = router.vertices().unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(vertices.len(), 3);

    let edges: Vec<_> = router.edges().unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(edges.len(), 2);
}

#[test]
fn test_clear_all_data() {
    let (backend, router) = modern(GraphConfig::default());
    router.add_vertex(None, "person", no_props()).unwrap();
    router.add_vertex(None, "software", no_props()).unwrap();
    assert_eq!(router.clear_all_data().unwrap(), 2);
    assert!(backend.documents("graph").is_empty());
}

#[test]
fn test_round_trips_are_timed() {
    let (_backend, router) = modern(GraphConfig::default());
    router.add_vertex(Some(id("1")), "person", no_props()).unwrap();
    let _ = router.vertex(&id("1")).unwrap();
    assert!(router.timing().stats("write").map(|s| s.count).unwrap_or(0) >= 1);
    assert!(router.timing().stats("search").is_some());
}

#[test]
fn test_properties_helper() {
    let props = properties([("a", 1), ("b", 2)]);
    assert_eq!(props.get("b"), Some(&Value::Int(2)));
}
