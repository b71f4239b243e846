use super::{init_tracing, menu_item, sample_tree, service_for, APP_ID, APP_PID};
use crate::element::{AttributeValue, Point, ATTR_CMD_CHAR, ATTR_VALUE};
use crate::errors::{AttemptOutcome, AutomationError, ErrorKind, NativeError, Tier};
use crate::input::{Key, MouseButton, MouseEventKind};
use crate::interaction::{scroll_steps, ScrollDirection, Target};
use crate::path::ElementPath;
use crate::platforms::memory::{MemoryTree, NodeSpec, ACTION_CANCEL, ACTION_PRESS};

fn target(raw: &str) -> Target {
    Target::Path(ElementPath::parse(raw).unwrap())
}

fn button(title: &str) -> Target {
    target(&format!(
        r#"app://{APP_ID}/AXWindow/AXButton[@AXTitle="{title}"]"#
    ))
}

#[tokio::test(start_paused = true)]
async fn test_native_press_needs_no_input() {
    init_tracing();
    let (mut service, backend) = service_for(sample_tree());
    let result = service.click(&button("Close")).await.unwrap();

    assert_eq!(result.tier, Tier::NativeAction);
    assert_eq!(result.action, "click");
    let close = backend.tree.find("AXButton", Some("Close")).unwrap();
    assert_eq!(backend.tree.actions_on(close), vec![ACTION_PRESS.to_string()]);
    assert_eq!(backend.tree.action_log().len(), 1);
    assert!(backend.input.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_actionless_button_gets_one_click_at_center() {
    let (mut service, backend) = service_for(sample_tree());
    let result = service.click(&button("Plain")).await.unwrap();

    assert_eq!(result.tier, Tier::SyntheticInput);
    assert_eq!(result.coordinates, Some(Point::new(240.0, 215.0)));
    let clicks = backend.input.clicks();
    assert_eq!(clicks.len(), 2);
    assert_eq!(clicks[0].kind, MouseEventKind::Down);
    assert_eq!(clicks[1].kind, MouseEventKind::Up);
    assert!(clicks.iter().all(|c| c.position == Point::new(240.0, 215.0)));
    assert!(clicks.iter().all(|c| c.button == MouseButton::Left));

    assert_eq!(result.attempts[0].tier, Tier::NativeAction);
    assert_eq!(result.attempts[0].outcome, AttemptOutcome::Skipped);
}

#[tokio::test(start_paused = true)]
async fn test_covered_center_clicks_an_interior_offset() {
    let (mut service, backend) = service_for(sample_tree());
    let covered = target(r#"app://com.example.App/AXWindow/AXGroup/AXButton[@title="Covered"]"#);
    let result = service.click(&covered).await.unwrap();

    assert_eq!(result.tier, Tier::OffsetProbe);
    assert_eq!(result.coordinates, Some(Point::new(525.0, 200.0)));
    let tiers: Vec<Tier> = result.attempts.iter().map(|a| a.tier).collect();
    assert_eq!(
        tiers,
        [
            Tier::NativeAction,
            Tier::SyntheticInput,
            Tier::MenuPath,
            Tier::OffsetProbe
        ]
    );
    assert_eq!(result.attempts[2].outcome, AttemptOutcome::Skipped);
    let clicks = backend.input.clicks();
    assert_eq!(clicks.len(), 2);
    assert!(clicks.iter().all(|c| c.position == Point::new(525.0, 200.0)));
}

#[tokio::test(start_paused = true)]
async fn test_zero_size_element_outside_menus_fails_without_input() {
    let (mut service, backend) = service_for(sample_tree());
    let err = service.click(&button("Ghost")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unsupported);
    match &err {
        AutomationError::ActionFailed { attempts, .. } => {
            let outcomes: Vec<(Tier, AttemptOutcome)> =
                attempts.iter().map(|a| (a.tier, a.outcome)).collect();
            assert_eq!(
                outcomes,
                [
                    (Tier::NativeAction, AttemptOutcome::Skipped),
                    (Tier::SyntheticInput, AttemptOutcome::Skipped),
                    (Tier::MenuPath, AttemptOutcome::Failed),
                    (Tier::OffsetProbe, AttemptOutcome::Skipped),
                ]
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(backend.input.events().is_empty());
    assert!(backend.tree.action_log().is_empty());
}

/// Menus that are always expanded, so items can be resolved by path.
fn expanded_menu_tree() -> MemoryTree {
    let export = NodeSpec::new("AXMenuItem")
        .title("Export")
        .actions(&[ACTION_PRESS, ACTION_CANCEL])
        .child(NodeSpec::new("AXMenu").children([menu_item("PDF"), menu_item("PNG")]));
    let file = NodeSpec::new("AXMenuBarItem")
        .title("File")
        .actions(&[ACTION_PRESS, ACTION_CANCEL])
        .child(NodeSpec::new("AXMenu").children([
            menu_item("New").attr(ATTR_CMD_CHAR, "N"),
            export,
        ]));
    MemoryTree::with_applications([NodeSpec::application("Example", APP_PID)
        .bundle_id(APP_ID)
        .child(NodeSpec::new("AXMenuBar").child(file))])
}

#[tokio::test(start_paused = true)]
async fn test_zero_size_menu_item_falls_back_to_menu_path() {
    let tree = expanded_menu_tree();
    let pdf = tree.find("AXMenuItem", Some("PDF")).unwrap();
    tree.fail_next_action(pdf, ACTION_PRESS, NativeError::CannotComplete);
    let (mut service, backend) = service_for(tree);

    let pdf_path = target(
        r#"app://com.example.App/AXMenuBar/AXMenuBarItem[@title="File"]/AXMenu/AXMenuItem[@title="Export"]/AXMenu/AXMenuItem[@title="PDF"]"#,
    );
    let result = service.click(&pdf_path).await.unwrap();

    assert_eq!(result.tier, Tier::MenuPath);
    let outcomes: Vec<(Tier, AttemptOutcome)> =
        result.attempts.iter().map(|a| (a.tier, a.outcome)).collect();
    assert_eq!(
        outcomes,
        [
            (Tier::NativeAction, AttemptOutcome::Failed),
            (Tier::SyntheticInput, AttemptOutcome::Skipped),
            (Tier::MenuPath, AttemptOutcome::Succeeded),
        ]
    );
    assert_eq!(backend.tree.actions_on(pdf), vec![ACTION_PRESS.to_string()]);
    assert!(backend.input.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_native_press_surfaces_last_error_kind() {
    let tree = sample_tree();
    let close = tree.find("AXButton", Some("Close")).unwrap();
    tree.fail_action(close, ACTION_PRESS, NativeError::CannotComplete);
    let (mut service, backend) = service_for(tree);
    // Falls through to a synthetic click on the visible button.
    let result = service.click(&button("Close")).await.unwrap();
    assert_eq!(result.tier, Tier::SyntheticInput);
    assert_eq!(result.attempts[0].outcome, AttemptOutcome::Failed);
    assert_eq!(result.attempts[0].native_code, Some(-25204));
    assert_eq!(backend.input.clicks().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_double_and_right_click_synthesize_without_native_actions() {
    let (mut service, backend) = service_for(sample_tree());

    let result = service.double_click(&button("Close")).await.unwrap();
    assert_eq!(result.tier, Tier::SyntheticInput);
    let clicks = backend.input.clicks();
    assert_eq!(clicks.len(), 4);
    assert_eq!(clicks[2].click_count, 2);
    assert_eq!(clicks[3].click_count, 2);
    assert!(clicks.iter().all(|c| c.position == Point::new(117.0, 112.0)));

    backend.input.clear();
    service.right_click(&button("Plain")).await.unwrap();
    let clicks = backend.input.clicks();
    assert_eq!(clicks.len(), 2);
    assert!(clicks.iter().all(|c| c.button == MouseButton::Right));
}

#[tokio::test(start_paused = true)]
async fn test_position_targets_click_exactly_there() {
    let (mut service, backend) = service_for(sample_tree());

    let on_plain = Target::Position(Point::new(210.0, 205.0));
    let result = service.click(&on_plain).await.unwrap();
    assert_eq!(result.tier, Tier::SyntheticInput);
    assert_eq!(result.coordinates, Some(Point::new(210.0, 205.0)));

    backend.input.clear();
    let nowhere = Target::Position(Point::new(5.0, 5.0));
    let result = service.click(&nowhere).await.unwrap();
    assert_eq!(result.tier, Tier::SyntheticInput);
    assert!(result.attempts.is_empty());
    assert!(backend
        .input
        .clicks()
        .iter()
        .all(|c| c.position == Point::new(5.0, 5.0)));
}

#[tokio::test(start_paused = true)]
async fn test_scroll_repeats_native_page_action() {
    assert_eq!(scroll_steps(0.35), 3);
    assert_eq!(scroll_steps(0.0), 1);
    assert_eq!(scroll_steps(7.0), 10);

    let (mut service, backend) = service_for(sample_tree());
    let area = target("app://com.example.App/AXWindow/AXScrollArea");
    let result = service
        .scroll(&area, ScrollDirection::Down, 0.35)
        .await
        .unwrap();

    assert_eq!(result.tier, Tier::ScrollAction);
    let scroll_area = backend.tree.find("AXScrollArea", None).unwrap();
    assert_eq!(
        backend.tree.actions_on(scroll_area),
        vec!["AXScrollDownByPage".to_string(); 3]
    );
    assert!(backend.input.scroll_events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_native_scroll_wheels_only_the_rest() {
    let (mut service, backend) = service_for(sample_tree());
    let scroll_area = backend.tree.find("AXScrollArea", None).unwrap();
    backend.tree.fail_action_after(
        scroll_area,
        "AXScrollDownByPage",
        2,
        NativeError::CannotComplete,
    );

    let area = target("app://com.example.App/AXWindow/AXScrollArea");
    let result = service
        .scroll(&area, ScrollDirection::Down, 0.35)
        .await
        .unwrap();

    assert_eq!(result.tier, Tier::ScrollWheel);
    assert_eq!(backend.tree.actions_on(scroll_area).len(), 2);
    let wheel = backend.input.scroll_events();
    assert_eq!(wheel.len(), 1);
    assert_eq!((wheel[0].delta_x, wheel[0].delta_y), (0, -1));

    let native = &result.attempts[0];
    assert_eq!(native.tier, Tier::ScrollAction);
    assert_eq!(native.outcome, AttemptOutcome::Failed);
    assert!(native.detail.ends_with("after 2 of 3 steps"), "{}", native.detail);
}

#[tokio::test(start_paused = true)]
async fn test_scroll_falls_back_to_wheel() {
    let (mut service, backend) = service_for(sample_tree());
    let result = service
        .scroll(&button("Plain"), ScrollDirection::Down, 0.5)
        .await
        .unwrap();

    assert_eq!(result.tier, Tier::ScrollWheel);
    let wheel = backend.input.scroll_events();
    assert_eq!(wheel.len(), 1);
    assert_eq!(wheel[0].position, Point::new(240.0, 215.0));
    assert_eq!((wheel[0].delta_x, wheel[0].delta_y), (0, -5));

    let err = service
        .scroll(&button("Ghost"), ScrollDirection::Up, 0.5)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
}

#[tokio::test(start_paused = true)]
async fn test_type_into_text_field_sets_value() {
    let (mut service, backend) = service_for(sample_tree());
    let field = target(r#"app://com.example.App/AXWindow/AXTextField[@id="name"]"#);
    let result = service.type_text(&field, "hello").await.unwrap();

    assert_eq!(result.tier, Tier::SetValue);
    let node = backend.tree.find("AXTextField", None).unwrap();
    assert_eq!(
        backend.tree.attribute(node, ATTR_VALUE),
        Some(AttributeValue::from("hello"))
    );
    assert!(backend.input.key_events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_type_falls_back_to_keystrokes() {
    let tree = sample_tree();
    let node = tree.find("AXTextField", None).unwrap();
    tree.fail_set(node, ATTR_VALUE, NativeError::CannotComplete);
    let (mut service, backend) = service_for(tree);

    let field = target(r#"app://com.example.App/AXWindow/AXTextField[@id="name"]"#);
    let result = service.type_text(&field, "hi").await.unwrap();
    assert_eq!(result.tier, Tier::Keystrokes);
    assert_eq!(result.attempts[0].outcome, AttemptOutcome::Failed);

    let keys = backend.input.key_events();
    assert_eq!(keys.len(), 4);
    assert_eq!(keys[0].key, Key::Char('h'));
    assert!(keys[0].down);
    assert!(!keys[1].down);
    assert_eq!(keys[2].key, Key::Char('i'));
    // Focus was requested before typing.
    assert!(backend
        .tree
        .set_log()
        .iter()
        .any(|(id, name, _)| *id == node && name == "AXFocused"));
}

#[tokio::test(start_paused = true)]
async fn test_press_key_sends_modifiers() {
    let (mut service, backend) = service_for(sample_tree());
    let result = service.press_key(None, "cmd+shift+s").await.unwrap();
    assert_eq!(result.tier, Tier::Keystrokes);

    let keys = backend.input.key_events();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0].key, Key::Char('s'));
    assert!(keys.iter().all(|k| k.modifiers.command && k.modifiers.shift));
    assert!(keys.iter().all(|k| !k.modifiers.option && !k.modifiers.control));

    let err = service.press_key(None, "cmd+shift").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
}

#[tokio::test(start_paused = true)]
async fn test_drag_between_element_centers() {
    let (mut service, backend) = service_for(sample_tree());
    let field = target(r#"app://com.example.App/AXWindow/AXTextField[@id="name"]"#);
    let result = service.drag(&button("Plain"), &field).await.unwrap();
    assert_eq!(result.coordinates, Some(Point::new(400.0, 312.0)));

    let mouse = backend.input.mouse_events();
    let down = mouse.iter().find(|m| m.kind == MouseEventKind::Down).unwrap();
    let up = mouse.iter().rev().find(|m| m.kind == MouseEventKind::Up).unwrap();
    assert_eq!(down.position, Point::new(240.0, 215.0));
    assert_eq!(up.position, Point::new(400.0, 312.0));
    assert!(mouse.iter().filter(|m| m.kind == MouseEventKind::Dragged).count() >= 1);

    let err = service.drag(&button("Ghost"), &field).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
}

#[tokio::test(start_paused = true)]
async fn test_perform_action_rejects_unadvertised_actions() {
    let (mut service, backend) = service_for(sample_tree());
    let err = service
        .perform_action(&button("Plain"), "AXIncrement")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
    assert!(backend.tree.action_log().is_empty());

    let result = service.perform_action(&button("Close"), "AXPress").unwrap();
    assert_eq!(result.tier, Tier::NativeAction);
    assert_eq!(result.action, "AXPress");
}
