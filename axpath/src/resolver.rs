use crate::config::ResolverConfig;
use crate::element::NativeHandle;
use crate::errors::{AutomationError, NativeError};
use crate::path::{ElementPath, RootSelector, Segment};
use crate::platforms::{AccessibilityEngine, ApplicationDirectory};
use crate::snapshot::ElementSnapshot;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Walks an [`ElementPath`] against the live tree, one segment at a time.
///
/// Resolution is strict: a segment matching several children without an explicit index
/// fails with [`AutomationError::Ambiguous`] rather than picking the first one.
#[derive(Clone)]
pub struct PathResolver {
    engine: Arc<dyn AccessibilityEngine>,
    directory: Arc<dyn ApplicationDirectory>,
    timeout: Duration,
}

impl PathResolver {
    pub fn new(
        engine: Arc<dyn AccessibilityEngine>,
        directory: Arc<dyn ApplicationDirectory>,
        config: &ResolverConfig,
    ) -> Self {
        Self {
            engine,
            directory,
            timeout: config.timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn engine(&self) -> &Arc<dyn AccessibilityEngine> {
        &self.engine
    }

    pub fn resolve_root(&self, root: &RootSelector) -> Result<NativeHandle, AutomationError> {
        match root {
            RootSelector::SystemWide => self.engine.system_wide(),
            RootSelector::FocusedApplication => self.engine.focused_application(),
            RootSelector::Application(id) => {
                let process = self
                    .directory
                    .find_running_application(id)
                    .ok_or_else(|| AutomationError::ApplicationNotFound(id.clone()))?;
                debug!("Resolved application '{}' to pid {}", id, process.pid);
                self.engine.application(process.pid)
            }
        }
    }

    #[instrument(level = "debug", skip(self, path), fields(path = %path))]
    pub fn resolve(&self, path: &ElementPath) -> Result<NativeHandle, AutomationError> {
        let deadline = Instant::now() + self.timeout;
        let mut current = self.resolve_root(path.root())?;

        for (index, segment) in path.segments().iter().enumerate() {
            let timed_out = || {
                AutomationError::Timeout(format!(
                    "Resolving {path} exceeded {:?} at segment {index} (`{segment}`)",
                    self.timeout
                ))
            };
            if Instant::now() >= deadline {
                return Err(timed_out());
            }

            let children = children_with_retry(&current).map_err(|e| {
                AutomationError::native(format!("reading children for segment {index}"), e)
            })?;
            let mut matches = Vec::new();
            for child in children {
                // Wide levels cost one read per child and predicate.
                if Instant::now() >= deadline {
                    return Err(timed_out());
                }
                if handle_matches(segment, &child) {
                    matches.push(child);
                }
            }
            current = select(path, index, segment, matches)?;
        }

        Ok(current)
    }

    /// Same walk over an already captured snapshot; `root` stands for the path's root.
    pub fn resolve_in_snapshot(
        root: &Arc<ElementSnapshot>,
        path: &ElementPath,
    ) -> Result<Arc<ElementSnapshot>, AutomationError> {
        let mut current = root.clone();
        for (index, segment) in path.segments().iter().enumerate() {
            let matches: Vec<Arc<ElementSnapshot>> = segment
                .filter_snapshots(&current.children)
                .into_iter()
                .cloned()
                .collect();
            current = select(path, index, segment, matches)?;
        }
        Ok(current)
    }
}

fn children_with_retry(element: &NativeHandle) -> Result<Vec<NativeHandle>, NativeError> {
    match element.children() {
        Err(e) if e.is_transient() => element.children(),
        other => other,
    }
}

/// Unreadable children never match.
fn handle_matches(segment: &Segment, child: &NativeHandle) -> bool {
    let role = match child.role() {
        Ok(role) => role,
        Err(e) => {
            debug!("Skipping unreadable child: {}", e.name());
            return false;
        }
    };
    segment.matches(&role, |name| child.string_attribute(name).ok().flatten())
}

fn select<T>(
    path: &ElementPath,
    segment_index: usize,
    segment: &Segment,
    mut matches: Vec<T>,
) -> Result<T, AutomationError> {
    let not_found = || AutomationError::SegmentNotFound {
        path: path.to_string(),
        segment_index,
        segment: segment.to_string(),
    };
    match (matches.len(), segment.index) {
        (0, _) => Err(not_found()),
        (n, Some(i)) if i < n => Ok(matches.swap_remove(i)),
        (_, Some(_)) => Err(not_found()),
        (1, None) => Ok(matches.swap_remove(0)),
        (n, None) => Err(AutomationError::Ambiguous {
            path: path.to_string(),
            segment_index,
            segment: segment.to_string(),
            matches: n,
        }),
    }
}
