use crate::element::NativeHandle;
use crate::errors::{AutomationError, MenuError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const ACTION_PRESS: &str = "AXPress";
pub const ACTION_CANCEL: &str = "AXCancel";

/// Where one menu operation stands. Lives only as long as the call that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "depth", rename_all = "snake_case")]
pub enum MenuState {
    Closed,
    TopLevelOpen,
    SubmenuOpen(usize),
}

/// Dismisses a menu this call opened, on every exit path, unless disarmed.
struct OpenMenuGuard {
    element: NativeHandle,
    armed: bool,
}

impl Drop for OpenMenuGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.element.perform_action(ACTION_CANCEL) {
            Ok(()) => debug!("Dismissed menu"),
            Err(e) => warn!("Failed to dismiss menu: {} ({})", e, e.name()),
        }
    }
}

/// Tracks the state transitions of one open/read/activate sequence.
pub(crate) struct MenuSession {
    state: MenuState,
    transitions: Vec<MenuState>,
    guard: Option<OpenMenuGuard>,
}

impl MenuSession {
    pub(crate) fn new() -> Self {
        Self {
            state: MenuState::Closed,
            transitions: vec![MenuState::Closed],
            guard: None,
        }
    }

    pub(crate) fn state(&self) -> MenuState {
        self.state
    }

    fn enter(&mut self, state: MenuState) {
        self.state = state;
        self.transitions.push(state);
    }

    /// Closed → TopLevelOpen. The menu will be dismissed when the session ends.
    pub(crate) fn open_top_level(
        &mut self,
        item: &NativeHandle,
        title: &str,
    ) -> Result<(), AutomationError> {
        press(item, title)?;
        self.guard = Some(OpenMenuGuard {
            element: item.clone(),
            armed: true,
        });
        self.enter(MenuState::TopLevelOpen);
        Ok(())
    }

    pub(crate) fn open_submenu(
        &mut self,
        item: &NativeHandle,
        title: &str,
        depth: usize,
    ) -> Result<(), AutomationError> {
        press(item, title)?;
        self.enter(MenuState::SubmenuOpen(depth));
        Ok(())
    }

    /// A pressed item closes its own menu; nothing is left to dismiss.
    pub(crate) fn activate(
        &mut self,
        item: &NativeHandle,
        title: &str,
    ) -> Result<(), AutomationError> {
        press(item, title)?;
        if let Some(guard) = self.guard.as_mut() {
            guard.armed = false;
        }
        self.guard = None;
        self.enter(MenuState::Closed);
        Ok(())
    }

    /// Dismiss anything still open and hand back the recorded transitions.
    pub(crate) fn finish(mut self) -> Vec<MenuState> {
        if self.guard.take().is_some() {
            self.enter(MenuState::Closed);
        }
        std::mem::take(&mut self.transitions)
    }
}

fn press(item: &NativeHandle, title: &str) -> Result<(), AutomationError> {
    item.perform_action(ACTION_PRESS).map_err(|e| {
        debug!("Pressing menu item '{}' failed: {}", title, e);
        if e.is_invalid_element() {
            AutomationError::Menu(MenuError::MenuItemNotFound(title.to_string()))
        } else {
            AutomationError::native(format!("pressing menu item '{title}'"), e)
        }
    })
}
