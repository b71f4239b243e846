//! macOS backend over the AX client API, CGEvent and NSWorkspace.

mod directory;
mod element;
mod input;

pub use directory::RunningApplications;
pub use element::MacOSElement;
pub use input::CGEventInput;

use crate::element::{NativeHandle, Point};
use crate::errors::AutomationError;
use crate::platforms::AccessibilityEngine;
use accessibility::AXUIElement;
use accessibility_sys::{AXIsProcessTrusted, AXUIElementCopyElementAtPosition, AXUIElementRef};
use core_foundation::base::TCFType;
use element::check;
use tracing::debug;

const ATTR_FOCUSED_APPLICATION: &str = "AXFocusedApplication";

pub struct MacOSEngine {
    system: MacOSElement,
}

impl Default for MacOSEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MacOSEngine {
    pub fn new() -> Self {
        Self {
            system: MacOSElement::new(AXUIElement::system_wide()),
        }
    }
}

impl AccessibilityEngine for MacOSEngine {
    fn system_wide(&self) -> Result<NativeHandle, AutomationError> {
        Ok(NativeHandle::new(self.system.clone()))
    }

    fn focused_application(&self) -> Result<NativeHandle, AutomationError> {
        NativeHandle::new(self.system.clone())
            .element_attribute(ATTR_FOCUSED_APPLICATION)
            .map_err(|e| AutomationError::native("reading focused application", e))?
            .ok_or_else(|| AutomationError::ApplicationNotFound("focused application".to_string()))
    }

    fn application(&self, pid: i32) -> Result<NativeHandle, AutomationError> {
        debug!("Creating application element for pid {}", pid);
        Ok(MacOSElement::handle(AXUIElement::application(pid)))
    }

    fn element_at_position(&self, position: Point) -> Result<NativeHandle, AutomationError> {
        let mut hit: AXUIElementRef = std::ptr::null_mut();
        let code = unsafe {
            AXUIElementCopyElementAtPosition(
                self.system.ax().as_concrete_TypeRef(),
                position.x as f32,
                position.y as f32,
                &mut hit,
            )
        };
        check(code).map_err(|e| AutomationError::native("hit-testing", e))?;
        if hit.is_null() {
            return Err(AutomationError::ElementNotFound(format!(
                "nothing at ({}, {})",
                position.x, position.y
            )));
        }
        Ok(MacOSElement::handle(unsafe {
            AXUIElement::wrap_under_create_rule(hit)
        }))
    }

    fn is_trusted(&self) -> bool {
        unsafe { AXIsProcessTrusted() }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
