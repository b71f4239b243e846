use crate::element::{NativeHandle, Point};
use crate::errors::AutomationError;
use crate::input::InputBackend;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod memory;

#[cfg(target_os = "macos")]
pub mod macos;

/// A running application as reported by the OS process directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessHandle {
    pub pid: i32,
    pub bundle_id: Option<String>,
    pub name: Option<String>,
}

impl ProcessHandle {
    /// Bundle id, then localized name (case-insensitive), then numeric pid.
    pub fn matches(&self, id: &str) -> bool {
        self.bundle_id.as_deref() == Some(id)
            || self
                .name
                .as_deref()
                .is_some_and(|n| n.eq_ignore_ascii_case(id))
            || id.parse::<i32>().is_ok_and(|pid| pid == self.pid)
    }
}

/// Looks up running applications; lifecycle management lives elsewhere.
pub trait ApplicationDirectory: Send + Sync {
    fn find_running_application(&self, id: &str) -> Option<ProcessHandle>;
}

/// The common trait that all platform-specific engines must implement
pub trait AccessibilityEngine: Send + Sync {
    /// The system-wide accessibility root
    fn system_wide(&self) -> Result<NativeHandle, AutomationError>;

    fn focused_application(&self) -> Result<NativeHandle, AutomationError>;

    /// Application root for a process id
    fn application(&self, pid: i32) -> Result<NativeHandle, AutomationError>;

    /// Hit-test: the deepest element at a screen position
    fn element_at_position(&self, position: Point) -> Result<NativeHandle, AutomationError>;

    /// Whether this process holds accessibility permission
    fn is_trusted(&self) -> bool;

    /// Enable downcasting to concrete engine types
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Everything a service needs from the host platform.
#[derive(Clone)]
pub struct PlatformBackend {
    pub engine: Arc<dyn AccessibilityEngine>,
    pub directory: Arc<dyn ApplicationDirectory>,
    pub input: Arc<dyn InputBackend>,
}

/// Create the appropriate backend for the current platform
pub fn create_backend() -> Result<PlatformBackend, AutomationError> {
    #[cfg(target_os = "macos")]
    {
        Ok(PlatformBackend {
            engine: Arc::new(macos::MacOSEngine::new()),
            directory: Arc::new(macos::RunningApplications),
            input: Arc::new(macos::CGEventInput::new()?),
        })
    }
    #[cfg(not(target_os = "macos"))]
    {
        Err(AutomationError::UnsupportedPlatform(
            "Current platform is not supported".to_string(),
        ))
    }
}

/// Create the appropriate engine for the current platform
pub fn create_engine() -> Result<Arc<dyn AccessibilityEngine>, AutomationError> {
    create_backend().map(|backend| backend.engine)
}
