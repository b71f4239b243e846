//! Snapshot building from live native handles

use crate::config::SnapshotConfig;
use crate::element::{
    AttributeValue, NativeHandle, ATTR_CMD_CHAR, ATTR_CMD_MODIFIERS, ATTR_DESCRIPTION,
    ATTR_ENABLED, ATTR_EXPANDED, ATTR_FOCUSED, ATTR_IDENTIFIER, ATTR_SELECTED, ATTR_SUBROLE,
    ATTR_TITLE, ATTR_VALUE,
};
use crate::errors::{AutomationError, NativeError};
use crate::snapshot::ElementSnapshot;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};
use tracing::{debug, instrument};

const BOOL_ATTRIBUTES: &[&str] = &[ATTR_FOCUSED, ATTR_ENABLED, ATTR_SELECTED, ATTR_EXPANDED];
const EXTRA_ATTRIBUTES: &[&str] = &[ATTR_SUBROLE, ATTR_CMD_CHAR, ATTR_CMD_MODIFIERS];

/// Counters collected while building one snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildStats {
    pub elements_processed: usize,
    pub max_depth_reached: usize,
    pub subtrees_skipped: usize,
    pub retries: usize,
}

pub struct SnapshotOutcome {
    pub root: Arc<ElementSnapshot>,
    pub stats: BuildStats,
}

/// Context for tracking tree building progress and stats
struct TreeBuildingContext {
    recursive: bool,
    max_depth: usize,
    stats: BuildStats,
}

impl TreeBuildingContext {
    fn increment_element_count(&mut self) {
        self.stats.elements_processed += 1;
    }

    fn update_max_depth(&mut self, depth: usize) {
        self.stats.max_depth_reached = self.stats.max_depth_reached.max(depth);
    }

    fn should_descend(&self, depth: usize) -> bool {
        self.recursive && depth < self.max_depth
    }
}

/// Fields read from one native node before its snapshot is assembled.
struct NodeData {
    role: String,
    title: Option<String>,
    value: Option<String>,
    description: Option<String>,
    frame: crate::element::Frame,
    identifier: String,
    attributes: BTreeMap<String, AttributeValue>,
    actions: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    config: SnapshotConfig,
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new(SnapshotConfig::default())
    }
}

impl SnapshotBuilder {
    pub fn new(config: SnapshotConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    pub fn build(
        &self,
        element: &NativeHandle,
        recursive: bool,
        max_depth: usize,
    ) -> Result<Arc<ElementSnapshot>, AutomationError> {
        self.build_with_stats(element, recursive, max_depth)
            .map(|outcome| outcome.root)
    }

    /// Build a snapshot; only a failure on `element` itself is fatal, failing children
    /// are dropped from the result.
    #[instrument(level = "debug", skip(self, element))]
    pub fn build_with_stats(
        &self,
        element: &NativeHandle,
        recursive: bool,
        max_depth: usize,
    ) -> Result<SnapshotOutcome, AutomationError> {
        let mut context = TreeBuildingContext {
            recursive,
            max_depth: max_depth.min(self.config.depth_limit),
            stats: BuildStats::default(),
        };

        let data = self
            .read_node_with_retry(element, &mut context)
            .map_err(|e| AutomationError::native("snapshot root", e))?;
        let root = self.assemble(element, data, Weak::new(), 0, &mut context);

        debug!(
            elements = context.stats.elements_processed,
            depth = context.stats.max_depth_reached,
            skipped = context.stats.subtrees_skipped,
            "snapshot built"
        );
        Ok(SnapshotOutcome {
            root,
            stats: context.stats,
        })
    }

    fn assemble(
        &self,
        element: &NativeHandle,
        data: NodeData,
        parent: Weak<ElementSnapshot>,
        depth: usize,
        context: &mut TreeBuildingContext,
    ) -> Arc<ElementSnapshot> {
        context.increment_element_count();
        context.update_max_depth(depth);

        Arc::new_cyclic(|me: &Weak<ElementSnapshot>| {
            let mut children = Vec::new();
            if context.should_descend(depth) {
                match self.children_with_retry(element, context) {
                    Ok(child_handles) => {
                        for child in child_handles {
                            match self.read_node_with_retry(&child, context) {
                                Ok(child_data) => children.push(self.assemble(
                                    &child,
                                    child_data,
                                    me.clone(),
                                    depth + 1,
                                    context,
                                )),
                                Err(e) => {
                                    debug!(
                                        "Failed to read child element: {}. Skipping subtree.",
                                        e
                                    );
                                    context.stats.subtrees_skipped += 1;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        debug!(
                            "Failed to get children for element: {}. Proceeding with no children.",
                            e
                        );
                        context.stats.subtrees_skipped += 1;
                    }
                }
            }

            ElementSnapshot {
                role: data.role,
                title: data.title,
                value: data.value,
                description: data.description,
                frame: data.frame,
                identifier: data.identifier,
                attributes: data.attributes,
                actions: data.actions,
                children,
                parent,
            }
        })
    }

    fn children_with_retry(
        &self,
        element: &NativeHandle,
        context: &mut TreeBuildingContext,
    ) -> Result<Vec<NativeHandle>, NativeError> {
        match element.children() {
            Err(e) if e.is_transient() => {
                context.stats.retries += 1;
                element.children()
            }
            other => other,
        }
    }

    fn read_node_with_retry(
        &self,
        element: &NativeHandle,
        context: &mut TreeBuildingContext,
    ) -> Result<NodeData, NativeError> {
        match read_node(element, &self.config) {
            Err(e) if e.is_transient() => {
                context.stats.retries += 1;
                read_node(element, &self.config)
            }
            other => other,
        }
    }
}

/// Role must be readable (or absent); everything else is best-effort.
fn read_node(element: &NativeHandle, config: &SnapshotConfig) -> Result<NodeData, NativeError> {
    let role = element.role()?;
    let title = element.string_attribute(ATTR_TITLE).ok().flatten();
    let value = if config.include_values {
        element.string_attribute(ATTR_VALUE).ok().flatten()
    } else {
        None
    };
    let description = element.string_attribute(ATTR_DESCRIPTION).ok().flatten();
    let frame = element.frame().unwrap_or_default();

    let mut attributes = BTreeMap::new();
    for name in BOOL_ATTRIBUTES {
        if let Ok(Some(flag)) = element.bool_attribute(name) {
            attributes.insert((*name).to_string(), AttributeValue::Bool(flag));
        }
    }
    for name in EXTRA_ATTRIBUTES {
        if let Ok(Some(value)) = element.attribute(name) {
            attributes.insert((*name).to_string(), value);
        }
    }

    let actions = if config.include_actions {
        element
            .action_names()
            .unwrap_or_default()
            .into_iter()
            .collect()
    } else {
        BTreeSet::new()
    };

    let identifier = match element.string_attribute(ATTR_IDENTIFIER).ok().flatten() {
        Some(id) if !id.is_empty() => id,
        _ => synthesize_identifier(&role, title.as_deref(), element.address()),
    };

    Ok(NodeData {
        role,
        title,
        value,
        description,
        frame,
        identifier,
        attributes,
        actions,
    })
}

/// Hash of role, title and the node's opaque address. Stable within one snapshot only.
pub(crate) fn synthesize_identifier(role: &str, title: Option<&str>, address: usize) -> String {
    let mut to_hash = String::new();
    to_hash.push_str(role);
    to_hash.push('\u{1f}');
    if let Some(t) = title {
        to_hash.push_str(t);
    }
    to_hash.push('\u{1f}');
    to_hash.push_str(&address.to_string());

    let hash = blake3::hash(to_hash.as_bytes());
    let hex = hash.to_hex();
    format!("{}-{}", role, &hex.as_str()[..12])
}
