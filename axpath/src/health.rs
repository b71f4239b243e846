//! Health check for accessibility API availability.
//!
//! Verifies the permission flag and that the system-wide and focused roots answer basic
//! reads. Nothing here performs an action.

use crate::platforms::AccessibilityEngine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};

/// Overall system health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Everything is working correctly
    Healthy,
    /// Permission granted but part of the tree is unreadable
    Degraded,
    /// No usable accessibility access
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,

    /// Whether this process holds accessibility permission
    pub trusted: bool,

    /// Whether the system-wide root answered a role read
    pub system_root_accessible: bool,

    /// Whether the focused application's root exposes children
    pub can_enumerate_elements: bool,

    /// Time taken to perform the health check in milliseconds
    pub check_duration_ms: u64,

    pub platform: String,

    pub error_message: Option<String>,

    pub diagnostics: HashMap<String, serde_json::Value>,
}

impl HealthCheckResult {
    fn new() -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            trusted: false,
            system_root_accessible: false,
            can_enumerate_elements: false,
            check_duration_ms: 0,
            platform: std::env::consts::OS.to_string(),
            error_message: None,
            diagnostics: HashMap::new(),
        }
    }

    /// Update the overall status based on component health
    pub fn update_status(&mut self) {
        self.status = if self.trusted && self.system_root_accessible && self.can_enumerate_elements
        {
            HealthStatus::Healthy
        } else if self.trusted {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        };
    }

    pub fn add_diagnostic(&mut self, key: impl Into<String>, value: impl Serialize) {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.diagnostics.insert(key.into(), json_value);
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Probe `engine` and report what works.
pub fn check_engine(engine: &dyn AccessibilityEngine) -> HealthCheckResult {
    let start = Instant::now();
    let mut result = HealthCheckResult::new();

    result.trusted = engine.is_trusted();
    if !result.trusted {
        result.error_message = Some("Accessibility permission not granted".to_string());
        result.check_duration_ms = start.elapsed().as_millis() as u64;
        result.update_status();
        warn!("Health check: process is not trusted");
        return result;
    }

    match engine.system_wide().and_then(|root| {
        root.role()
            .map_err(|e| crate::errors::AutomationError::native("system-wide role", e))
    }) {
        Ok(role) => {
            result.system_root_accessible = true;
            result.add_diagnostic("system_root_role", role);
        }
        Err(e) => {
            result.error_message = Some(format!("System-wide root unreadable: {e}"));
            result.add_diagnostic("system_root_error", e.kind());
        }
    }

    match engine.focused_application() {
        Ok(app) => {
            if let Ok(Some(title)) = app.title() {
                result.add_diagnostic("focused_application", title);
            }
            match app.children() {
                Ok(children) => {
                    result.can_enumerate_elements = true;
                    result.add_diagnostic("focused_application_children", children.len());
                }
                Err(e) => {
                    result.add_diagnostic("enumeration_error", e.name());
                    result
                        .error_message
                        .get_or_insert_with(|| format!("Cannot enumerate children: {e}"));
                }
            }
        }
        Err(e) => {
            result
                .error_message
                .get_or_insert_with(|| format!("No focused application: {e}"));
        }
    }

    result.check_duration_ms = start.elapsed().as_millis() as u64;
    result.add_diagnostic("check_duration_ms", result.check_duration_ms);
    result.update_status();
    debug!("Health check finished: {:?}", result.status);
    result
}
