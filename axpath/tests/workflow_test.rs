use axpath::element::{AttributeValue, ATTR_CMD_CHAR, ATTR_VALUE};
use axpath::platforms::memory::{MemoryBackend, MemoryTree, NodeSpec, ACTION_CANCEL, ACTION_PRESS};
use axpath::{
    AccessibilityService, ActionRequest, AutomationError, ElementPath, ErrorKind, ServiceConfig,
    Target, Tier,
};
use tracing::{info, Level};

const NOTES: &str = "com.example.Notes";
const NOTES_PID: i32 = 4242;

/// Test helper to setup logging for debugging
fn setup_logging() {
    let _ = tracing_subscriber::fmt::Subscriber::builder()
        .with_max_level(Level::DEBUG)
        .try_init();
}

fn notes_app() -> NodeSpec {
    let file_menu = NodeSpec::new("AXMenuBarItem")
        .title("File")
        .actions(&[ACTION_PRESS, ACTION_CANCEL])
        .lazy()
        .child(NodeSpec::new("AXMenu").children([
            NodeSpec::new("AXMenuItem")
                .title("New Note")
                .attr(ATTR_CMD_CHAR, "N")
                .action(ACTION_PRESS),
            NodeSpec::new("AXMenuItem")
                .title("Save")
                .attr(ATTR_CMD_CHAR, "S")
                .action(ACTION_PRESS),
        ]));

    NodeSpec::application("Notes", NOTES_PID)
        .bundle_id(NOTES)
        .children([
            NodeSpec::new("AXMenuBar").child(file_menu),
            NodeSpec::new("AXWindow")
                .title("Untitled")
                .frame(0.0, 0.0, 640.0, 480.0)
                .children([
                    NodeSpec::new("AXToolbar")
                        .frame(0.0, 0.0, 640.0, 40.0)
                        .children([
                            NodeSpec::new("AXButton")
                                .title("Save")
                                .frame(10.0, 8.0, 60.0, 24.0)
                                .action(ACTION_PRESS),
                            NodeSpec::new("AXButton")
                                .title("Share")
                                .frame(80.0, 8.0, 60.0, 24.0),
                        ]),
                    NodeSpec::new("AXTextArea")
                        .attr("AXIdentifier", "body")
                        .frame(0.0, 40.0, 640.0, 440.0)
                        .settable(ATTR_VALUE),
                ]),
        ])
}

fn calculator_app() -> NodeSpec {
    NodeSpec::application("Calculator", 77).bundle_id("com.example.Calculator").child(
        NodeSpec::new("AXWindow").title("Calculator").child(
            NodeSpec::new("AXButton")
                .title("Clear")
                .frame(20.0, 20.0, 40.0, 40.0)
                .action(ACTION_PRESS),
        ),
    )
}

fn quick_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.interaction.pointer_settle_ms = 0;
    config.interaction.double_click_interval_ms = 0;
    config.interaction.key_interval_ms = 0;
    config.interaction.drag_step_delay_ms = 0;
    config.interaction.scroll_step_delay_ms = 0;
    config.menu.settle_ms = 0;
    config
}

fn start(tree: MemoryTree) -> (AccessibilityService, MemoryBackend) {
    let backend = MemoryBackend::new(tree);
    let service = AccessibilityService::with_backend(backend.platform(), quick_config());
    (service, backend)
}

#[tokio::test(start_paused = true)]
async fn test_write_and_save_a_note() -> Result<(), AutomationError> {
    setup_logging();
    let tree = MemoryTree::with_applications([notes_app()]);
    let (mut service, backend) = start(tree.clone());

    let body: ElementPath =
        r#"app://com.example.Notes/AXWindow/AXTextArea[@AXIdentifier="body"]"#.parse()?;
    let typed = service
        .type_text(&Target::Path(body), "Buy milk")
        .await?;
    assert_eq!(typed.tier, Tier::SetValue);

    let area = tree.find("AXTextArea", None).unwrap();
    assert_eq!(
        tree.attribute(area, ATTR_VALUE),
        Some(AttributeValue::String("Buy milk".to_string()))
    );

    let save: ElementPath =
        r#"app://com.example.Notes/AXWindow/AXToolbar/AXButton[@AXTitle="Save"]"#.parse()?;
    let clicked = service.click(&Target::Path(save)).await?;
    info!("Save clicked via {}", clicked.tier);
    assert_eq!(clicked.tier, Tier::NativeAction);

    let saved = service.activate_menu("Notes", "File > Save").await?;
    assert_eq!(saved.tier, Tier::MenuPath);

    let presses: Vec<String> = backend
        .tree
        .action_log()
        .into_iter()
        .map(|(_, action)| action)
        .collect();
    assert_eq!(presses, [ACTION_PRESS, ACTION_PRESS, ACTION_PRESS]);
    assert!(backend.tree.open_menus().is_empty());
    assert!(backend.input.events().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_json_requests_drive_the_same_operations() {
    setup_logging();
    let (mut service, backend) = start(MemoryTree::with_applications([notes_app()]));

    let script = [
        r#"{ "action": "type_text", "target": { "path": "app://com.example.Notes/AXWindow/AXTextArea" }, "text": "hello" }"#,
        r#"{ "action": "click", "target": { "path": "app://com.example.Notes/AXWindow/AXToolbar/AXButton[@AXTitle=\"Share\"]" } }"#,
        r#"{ "action": "press_key", "key": "cmd+s" }"#,
        r#"{ "action": "activate_menu", "application": "com.example.Notes", "path": "File > New" }"#,
    ];

    let mut tiers = Vec::new();
    for raw in script {
        let request: ActionRequest = serde_json::from_str(raw).unwrap();
        let response = service.execute(request).await;
        assert!(response.success, "{raw}: {:?}", response.error);
        tiers.push(response.result.unwrap().tier);
    }
    assert_eq!(
        tiers,
        [
            Tier::SetValue,
            Tier::SyntheticInput,
            Tier::Keystrokes,
            Tier::MenuPath
        ]
    );

    // Share has no press action, so it was clicked at its centre.
    let clicks = backend.input.clicks();
    assert_eq!((clicks[0].position.x, clicks[0].position.y), (110.0, 20.0));
    assert!(!backend.input.key_events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_applications_are_addressed_independently() -> Result<(), AutomationError> {
    let tree = MemoryTree::with_applications([notes_app(), calculator_app()]);
    let (mut service, backend) = start(tree.clone());

    let clear: ElementPath =
        r#"app://Calculator/AXWindow/AXButton[@AXTitle="Clear"]"#.parse()?;
    service.click(&Target::Path(clear)).await?;
    let clear_id = tree.find("AXButton", Some("Clear")).unwrap();
    assert_eq!(backend.tree.actions_on(clear_id), [ACTION_PRESS]);

    // Only Notes has a menu bar.
    assert_eq!(service.application_menus("Notes")?.len(), 1);
    let err = service.application_menus("77").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    backend.engine.set_focused(77);
    let focused: ElementPath = "ax://focused/AXWindow".parse()?;
    let window = service.resolve(&focused)?;
    assert_eq!(window.title().unwrap().as_deref(), Some("Calculator"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_paths_feed_back_into_actions() -> Result<(), AutomationError> {
    let (mut service, backend) = start(MemoryTree::with_applications([notes_app()]));
    let root: ElementPath = "app://com.example.Notes".parse()?;
    let snapshot = service.snapshot(&root, true, Some(6))?;

    let share = snapshot
        .find_all(|n| n.title.as_deref() == Some("Share"))
        .pop()
        .unwrap();
    let path = ElementPath::for_snapshot(root.root().clone(), &share);
    assert_eq!(
        path.to_string(),
        r#"app://com.example.Notes/AXWindow/AXToolbar/AXButton[@AXTitle="Share"]"#
    );

    service.click(&Target::Path(path)).await?;
    assert_eq!(backend.input.clicks().len(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_menu_shortcuts_and_cleanup() -> Result<(), AutomationError> {
    let (service, backend) = start(MemoryTree::with_applications([notes_app()]));
    let items = service.menu_items(NOTES, "File").await?;
    let shortcuts: Vec<Option<&str>> = items.iter().map(|i| i.shortcut.as_deref()).collect();
    assert_eq!(shortcuts, [Some("Cmd+N"), Some("Cmd+S")]);
    assert!(backend.tree.open_menus().is_empty());

    let err = service.activate_menu(NOTES, "File > Print").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(backend.tree.open_menus().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_health_of_an_empty_desktop() {
    let (service, _backend) = start(MemoryTree::with_applications(Vec::<NodeSpec>::new()));
    let health = service.health_check();
    assert!(health.trusted);
    assert!(!health.can_enumerate_elements);
    info!("Health: {:?}", health);
}
