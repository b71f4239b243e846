//! Tests for live and snapshot path resolution

use super::{init_tracing, sample_app, sample_tree, APP_ID};
use crate::config::ResolverConfig;
use crate::errors::{AutomationError, ErrorKind, NativeError};
use crate::path::ElementPath;
use crate::platforms::memory::{InMemoryDirectory, MemoryEngine, MemoryTree, NodeSpec};
use crate::resolver::PathResolver;
use crate::tree_builder::SnapshotBuilder;
use std::sync::Arc;
use std::time::Duration;

const CLOSE_PATH: &str = r#"app://com.example.App/AXWindow/AXButton[@AXTitle="Close"]"#;

fn resolver(tree: &MemoryTree) -> PathResolver {
    PathResolver::new(
        Arc::new(MemoryEngine::new(tree.clone())),
        Arc::new(InMemoryDirectory::from_tree(tree)),
        &ResolverConfig::default(),
    )
}

fn path(raw: &str) -> ElementPath {
    ElementPath::parse(raw).unwrap()
}

#[test]
fn test_unique_match_resolves() {
    init_tracing();
    let tree = sample_tree();
    let handle = resolver(&tree).resolve(&path(CLOSE_PATH)).unwrap();

    let close = tree.find("AXButton", Some("Close")).unwrap();
    assert!(handle.is_within(&tree.handle(close), 0));
    assert_eq!(handle.title().unwrap().as_deref(), Some("Close"));
}

#[test]
fn test_two_matches_are_ambiguous() {
    init_tracing();
    let tree = sample_tree();
    let window = tree.find("AXWindow", None).unwrap();
    tree.add_child(window, NodeSpec::new("AXButton").title("Close"));

    let err = resolver(&tree).resolve(&path(CLOSE_PATH)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Ambiguous);
    match err {
        AutomationError::Ambiguous {
            segment_index,
            matches,
            ..
        } => {
            assert_eq!(segment_index, 1);
            assert_eq!(matches, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_index_picks_among_matches() {
    let tree = sample_tree();
    let window = tree.find("AXWindow", None).unwrap();
    tree.add_child(window, NodeSpec::new("AXButton").title("Close").attr("AXIdentifier", "second"));

    let indexed = format!("{CLOSE_PATH}[1]");
    let handle = resolver(&tree).resolve(&path(&indexed)).unwrap();
    assert_eq!(
        handle.string_attribute("AXIdentifier").unwrap().as_deref(),
        Some("second")
    );

    let out_of_range = format!("{CLOSE_PATH}[2]");
    let err = resolver(&tree).resolve(&path(&out_of_range)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_missing_segment_reports_its_position() {
    let tree = sample_tree();
    let err = resolver(&tree)
        .resolve(&path("app://com.example.App/AXWindow/AXSlider"))
        .unwrap_err();
    match err {
        AutomationError::SegmentNotFound {
            segment_index,
            segment,
            ..
        } => {
            assert_eq!(segment_index, 1);
            assert_eq!(segment, "AXSlider");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err_kind_of("app://com.example.App/AXWindow/AXSlider"), ErrorKind::NotFound);
}

fn err_kind_of(raw: &str) -> ErrorKind {
    resolver(&sample_tree()).resolve(&path(raw)).unwrap_err().kind()
}

#[test]
fn test_unknown_application_is_not_found() {
    let err = resolver(&sample_tree())
        .resolve(&path("app://com.example.Missing/AXWindow"))
        .unwrap_err();
    assert!(matches!(err, AutomationError::ApplicationNotFound(_)));
}

#[test]
fn test_application_by_name_and_pid() {
    let tree = sample_tree();
    for id in ["Example", "example", "100", APP_ID] {
        let raw = format!("app://{id}/AXWindow");
        let handle = resolver(&tree).resolve(&path(&raw)).unwrap();
        assert_eq!(handle.role().unwrap(), "AXWindow", "resolving via {id}");
    }
}

#[test]
fn test_focused_and_system_roots() {
    let tree = sample_tree();
    let r = resolver(&tree);
    let window = r.resolve(&path("ax://focused/AXWindow")).unwrap();
    assert_eq!(window.title().unwrap().as_deref(), Some("Document"));

    let via_system = r
        .resolve(&path(r#"ax://system/AXApplication[@title="Example"]/AXWindow"#))
        .unwrap();
    assert!(via_system.is_within(&window, 0));
}

#[test]
fn test_identifier_and_contains_predicates() {
    let tree = sample_tree();
    let r = resolver(&tree);
    let field = r
        .resolve(&path(r#"app://Example/AXWindow/AXTextField[@id="name"]"#))
        .unwrap();
    assert_eq!(field.role().unwrap(), "AXTextField");

    let covered = r
        .resolve(&path(r#"app://Example/AXWindow/AXGroup/*[@title~="cover"]"#))
        .unwrap();
    assert_eq!(covered.title().unwrap().as_deref(), Some("Covered"));
}

#[test]
fn test_transient_children_read_is_retried_once() {
    let tree = sample_tree();
    let app = tree.find("AXApplication", None).unwrap();
    tree.inject_transient(app, 1);
    let handle = resolver(&tree).resolve(&path(CLOSE_PATH));
    assert!(handle.is_ok(), "{handle:?}");

    // Two failures in a row exhaust the single retry.
    tree.inject_transient(app, 2);
    let err = resolver(&tree).resolve(&path(CLOSE_PATH)).unwrap_err();
    assert_eq!(err.native_error(), Some(NativeError::CannotComplete));
    assert_eq!(err.kind(), ErrorKind::Platform);
}

#[test]
fn test_removed_children_are_skipped() {
    let tree = sample_tree();
    let plain = tree.find("AXButton", Some("Plain")).unwrap();
    tree.remove(plain);
    let err = resolver(&tree)
        .resolve(&path(r#"app://Example/AXWindow/AXButton[@title="Plain"]"#))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test(start_paused = true)]
async fn test_zero_timeout_fails_before_first_segment() {
    let tree = sample_tree();
    let r = resolver(&tree).with_timeout(Duration::ZERO);
    let err = r.resolve(&path(CLOSE_PATH)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);

    // A root-only path has no segment to time out on.
    assert!(r.resolve(&path("app://Example")).is_ok());
}

#[test]
fn test_timeout_bounds_a_wide_level() {
    let buttons = (0..40).map(|i| NodeSpec::new("AXButton").title(&format!("Button {i}")));
    let tree = MemoryTree::with_applications([NodeSpec::application("Wide", 300)
        .bundle_id("com.example.Wide")
        .child(NodeSpec::new("AXWindow").children(buttons))]);
    for i in 0..40 {
        let id = tree.find("AXButton", Some(&format!("Button {i}"))).unwrap();
        tree.slow_reads(id, Duration::from_millis(5));
    }

    let r = resolver(&tree).with_timeout(Duration::from_millis(50));
    let err = r
        .resolve(&path(r#"app://Wide/AXWindow/AXButton[@AXTitle="Button 39"]"#))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(err.to_string().contains("segment 1"), "{err}");
}

#[test]
fn test_snapshot_resolution_matches_live_resolution() {
    let tree = MemoryTree::with_applications([sample_app()]);
    let app = tree.find("AXApplication", None).unwrap();
    let snapshot = SnapshotBuilder::default()
        .build(&tree.handle(app), true, 10)
        .unwrap();

    let node = PathResolver::resolve_in_snapshot(&snapshot, &path(CLOSE_PATH)).unwrap();
    assert_eq!(node.title.as_deref(), Some("Close"));
    assert_eq!(node.parent().unwrap().role, "AXWindow");

    let err = PathResolver::resolve_in_snapshot(&snapshot, &path("app://x/AXWindow/AXButton"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Ambiguous);
}

#[test]
fn test_invalid_element_error_kind() {
    let err = AutomationError::native("reading role", NativeError::InvalidUIElement);
    assert_eq!(err.kind(), ErrorKind::Invalid);
    assert_eq!(err.context().native_code, Some(-25202));
}
