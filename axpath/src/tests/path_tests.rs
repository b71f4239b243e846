//! Tests for the path language

use crate::errors::ErrorKind;
use crate::path::{normalize_attribute, ElementPath, MatchOp, Predicate, RootSelector, Segment};

#[test]
fn test_parse_application_path() {
    let path = ElementPath::parse(r#"app://com.example.App/AXWindow/AXButton[@AXTitle="Close"]"#)
        .unwrap();

    assert_eq!(
        path.root(),
        &RootSelector::Application("com.example.App".to_string())
    );
    assert_eq!(path.segments().len(), 2);
    assert_eq!(path.segments()[0].role, "AXWindow");
    assert_eq!(path.segments()[1].role, "AXButton");
    assert_eq!(
        path.segments()[1].predicates,
        vec![Predicate::equals("AXTitle", "Close")]
    );
    assert_eq!(path.segments()[1].index, None);
}

#[test]
fn test_parse_system_and_focused_roots() {
    let system = ElementPath::parse("ax://system").unwrap();
    assert_eq!(system.root(), &RootSelector::SystemWide);
    assert!(system.is_root());

    let focused = ElementPath::parse("ax://focused/AXWindow[0]/").unwrap();
    assert_eq!(focused.root(), &RootSelector::FocusedApplication);
    assert_eq!(focused.segments()[0].index, Some(0));
}

#[test]
fn test_attribute_prefix_is_optional() {
    let short = ElementPath::parse(r#"ax://focused/AXButton[@title="OK"]"#).unwrap();
    let long = ElementPath::parse(r#"ax://focused/AXButton[@AXTitle="OK"]"#).unwrap();
    assert_eq!(short, long);
    assert_eq!(normalize_attribute("id"), "AXIdentifier");
    assert_eq!(normalize_attribute("placeholderValue"), "AXPlaceholderValue");
    assert_eq!(normalize_attribute("AXSubrole"), "AXSubrole");
}

#[test]
fn test_contains_predicate_and_index() {
    let path = ElementPath::parse(r#"app://Mail/AXWindow/*[@title~="Inbox"][2]"#).unwrap();
    let segment = &path.segments()[1];
    assert!(segment.matches_role("AXAnything"));
    assert_eq!(segment.predicates[0].op, MatchOp::Contains);
    assert_eq!(segment.index, Some(2));
    assert!(segment.predicates[0].matches(Some("Inbox (3)")));
    assert!(!segment.predicates[0].matches(None));
}

#[test]
fn test_escaped_quotes_survive_round_trip() {
    let raw = r#"app://Notes/AXWindow[@AXTitle="Say \"hi\" \\ bye"]"#;
    let path = ElementPath::parse(raw).unwrap();
    assert_eq!(
        path.segments()[0].predicates[0].value,
        r#"Say "hi" \ bye"#
    );
    assert_eq!(path.to_string(), raw);
    assert_eq!(ElementPath::parse(&path.to_string()).unwrap(), path);
}

#[test]
fn test_display_is_canonical_cache_key() {
    let path = ElementPath::parse(r#"app://com.example.App/AXWindow/AXButton[@title="Close"]"#)
        .unwrap();
    assert_eq!(
        path.cache_key(),
        r#"app://com.example.App/AXWindow/AXButton[@AXTitle="Close"]"#
    );
}

#[test]
fn test_malformed_paths_are_invalid() {
    for raw in [
        "",
        "file://x/AXWindow",
        "ax://nowhere/AXWindow",
        "app:///AXWindow",
        "ax://system//AXWindow",
        r#"ax://system/AXButton[@AXTitle="unterminated]"#,
        "ax://system/AXButton[1][2]",
        "ax://system/AX Button",
        "ax://system/AXButton[x]",
        "ax://system/AXButton[0]x",
        r#"app://Mail/AXWindow[@AXTitle="Inbox"]?"#,
    ] {
        let err = ElementPath::parse(raw).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid, "expected Invalid for {raw:?}");
    }
}

#[test]
fn test_trailing_garbage_names_the_character() {
    let err = ElementPath::parse("ax://system/AXButton[0]x").unwrap_err();
    assert!(err.to_string().contains("unexpected `x`"), "{err}");
}

#[test]
fn test_child_and_parent_navigation() {
    let root = ElementPath::new(RootSelector::SystemWide, Vec::new());
    let child = root.child(Segment::role("AXApplication").with_title("Finder"));
    assert_eq!(child.to_string(), r#"ax://system/AXApplication[@AXTitle="Finder"]"#);
    assert_eq!(child.parent(), Some(root.clone()));
    assert_eq!(root.parent(), None);
}

#[test]
fn test_role_match_ignores_ax_prefix_case() {
    let segment = Segment::role("button");
    assert!(segment.matches_role("AXButton"));
    assert!(!segment.matches_role("AXButtonGroup"));
}

#[test]
fn test_serde_uses_string_form() {
    let path = ElementPath::parse("app://Finder/AXWindow[1]").unwrap();
    let json = serde_json::to_string(&path).unwrap();
    assert_eq!(json, r#""app://Finder/AXWindow[1]""#);
    let back: ElementPath = serde_json::from_str(&json).unwrap();
    assert_eq!(back, path);
}
