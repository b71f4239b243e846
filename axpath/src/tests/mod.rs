mod cache_tests;
mod interaction_tests;
mod path_tests;
mod resolver_tests;

use crate::config::ServiceConfig;
use crate::element::ATTR_CMD_CHAR;
use crate::platforms::memory::{MemoryBackend, MemoryTree, NodeSpec, ACTION_CANCEL, ACTION_PRESS};
use crate::AccessibilityService;

// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .try_init();
}

pub const APP_ID: &str = "com.example.App";
pub const APP_PID: i32 = 100;

pub fn menu_bar_item(title: &str, items: Vec<NodeSpec>) -> NodeSpec {
    NodeSpec::new("AXMenuBarItem")
        .title(title)
        .actions(&[ACTION_PRESS, ACTION_CANCEL])
        .lazy()
        .child(NodeSpec::new("AXMenu").children(items))
}

pub fn menu_item(title: &str) -> NodeSpec {
    NodeSpec::new("AXMenuItem").title(title).action(ACTION_PRESS)
}

pub fn submenu(title: &str, items: Vec<NodeSpec>) -> NodeSpec {
    NodeSpec::new("AXMenuItem")
        .title(title)
        .actions(&[ACTION_PRESS, ACTION_CANCEL])
        .lazy()
        .child(NodeSpec::new("AXMenu").children(items))
}

pub fn menu_bar() -> NodeSpec {
    NodeSpec::new("AXMenuBar").children([
        menu_bar_item("Apple", vec![menu_item("About This Mac")]),
        menu_bar_item(
            "File",
            vec![
                menu_item("New").attr(ATTR_CMD_CHAR, "N"),
                menu_item("Open…").attr(ATTR_CMD_CHAR, "O"),
                NodeSpec::new("AXMenuItem"),
                submenu("Export", vec![menu_item("PDF"), menu_item("PNG")]),
                menu_item("Save As…")
                    .attr(ATTR_CMD_CHAR, "s")
                    .attr("AXMenuItemCmdModifiers", 1.0),
            ],
        ),
        menu_bar_item("Edit", vec![menu_item("Undo").attr(ATTR_CMD_CHAR, "Z")]),
    ])
}

/// A document window with one control per interaction case.
pub fn window() -> NodeSpec {
    NodeSpec::new("AXWindow")
        .title("Document")
        .frame(100.0, 100.0, 800.0, 600.0)
        .children([
            NodeSpec::new("AXButton")
                .title("Close")
                .frame(110.0, 105.0, 14.0, 14.0)
                .action(ACTION_PRESS),
            NodeSpec::new("AXButton")
                .title("Plain")
                .frame(200.0, 200.0, 80.0, 30.0),
            NodeSpec::new("AXTextField")
                .attr("AXIdentifier", "name")
                .frame(300.0, 300.0, 200.0, 24.0)
                .settable("AXValue")
                .settable("AXFocused"),
            NodeSpec::new("AXScrollArea")
                .frame(100.0, 400.0, 800.0, 300.0)
                .actions(&["AXScrollDownByPage", "AXScrollUpByPage"]),
            NodeSpec::new("AXButton").title("Ghost"),
            NodeSpec::new("AXGroup")
                .frame(500.0, 150.0, 100.0, 100.0)
                .children([
                    NodeSpec::new("AXButton")
                        .title("Covered")
                        .frame(500.0, 150.0, 100.0, 100.0),
                    NodeSpec::new("AXImage")
                        .title("Overlay")
                        .frame(540.0, 190.0, 20.0, 20.0),
                ]),
        ])
}

pub fn sample_app() -> NodeSpec {
    NodeSpec::application("Example", APP_PID)
        .bundle_id(APP_ID)
        .children([menu_bar(), window()])
}

pub fn sample_tree() -> MemoryTree {
    MemoryTree::with_applications([sample_app()])
}

/// Defaults with every delay shortened; tests also run on a paused clock.
pub fn fast_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.interaction.pointer_settle_ms = 0;
    config.interaction.double_click_interval_ms = 0;
    config.interaction.key_interval_ms = 0;
    config.interaction.drag_step_delay_ms = 0;
    config.interaction.scroll_step_delay_ms = 0;
    config.menu.settle_ms = 10;
    config
}

pub fn service_for(tree: MemoryTree) -> (AccessibilityService, MemoryBackend) {
    let backend = MemoryBackend::new(tree);
    let service = AccessibilityService::with_backend(backend.platform(), fast_config());
    (service, backend)
}
