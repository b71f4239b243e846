//! Immutable element trees captured from the live accessibility tree.

use crate::element::{AttributeValue, Frame};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Weak};

/// Read-only copy of one accessibility node and its captured subtree.
///
/// Children are owned; the parent link is a weak back-reference, so a subtree handed out
/// on its own still knows where it came from for as long as the root is alive.
#[derive(Serialize)]
pub struct ElementSnapshot {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub frame: Frame,
    /// Explicit native identifier, else synthesized; only unique within one snapshot.
    pub identifier: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeValue>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub actions: BTreeSet<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Arc<ElementSnapshot>>,
    #[serde(skip)]
    pub(crate) parent: Weak<ElementSnapshot>,
}

impl fmt::Debug for ElementSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug_struct = f.debug_struct("ElementSnapshot");
        debug_struct.field("role", &self.role);
        if let Some(ref title) = self.title {
            debug_struct.field("title", title);
        }
        debug_struct.field("identifier", &self.identifier);
        debug_struct.field("frame", &self.frame);
        if !self.children.is_empty() {
            debug_struct.field("children", &self.children);
        }
        debug_struct.finish()
    }
}

impl ElementSnapshot {
    pub fn parent(&self) -> Option<Arc<ElementSnapshot>> {
        self.parent.upgrade()
    }

    pub fn bool_attribute(&self, name: &str) -> Option<bool> {
        self.attributes.get(name).and_then(|v| v.as_bool())
    }

    pub fn string_attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(|v| v.as_str())
    }

    pub fn is_enabled(&self) -> bool {
        self.bool_attribute(crate::element::ATTR_ENABLED)
            .unwrap_or(true)
    }

    pub fn supports_action(&self, action: &str) -> bool {
        self.actions.contains(action)
    }

    /// Attribute lookup used by path predicates; covers both the named fields and the
    /// attribute map.
    pub fn lookup(&self, name: &str) -> Option<String> {
        match name {
            crate::element::ATTR_ROLE => Some(self.role.clone()),
            crate::element::ATTR_TITLE => self.title.clone(),
            crate::element::ATTR_VALUE => self.value.clone(),
            crate::element::ATTR_DESCRIPTION => self.description.clone(),
            crate::element::ATTR_IDENTIFIER => Some(self.identifier.clone()),
            other => self.attributes.get(other).map(|v| v.to_text()),
        }
    }

    /// Depth-first, pre-order, excluding `self`.
    pub fn descendants(&self) -> Vec<Arc<ElementSnapshot>> {
        let mut out = Vec::new();
        let mut stack: Vec<Arc<ElementSnapshot>> = self.children.iter().rev().cloned().collect();
        while let Some(node) = stack.pop() {
            stack.extend(node.children.iter().rev().cloned());
            out.push(node);
        }
        out
    }

    pub fn find_all<F>(&self, predicate: F) -> Vec<Arc<ElementSnapshot>>
    where
        F: Fn(&ElementSnapshot) -> bool,
    {
        self.descendants()
            .into_iter()
            .filter(|n| predicate(n))
            .collect()
    }

    pub fn find_by_role(&self, role: &str) -> Vec<Arc<ElementSnapshot>> {
        self.find_all(|n| n.role == role)
    }

    pub fn first_child_with_role(&self, role: &str) -> Option<&Arc<ElementSnapshot>> {
        self.children.iter().find(|c| c.role == role)
    }

    /// Chain of ancestors from the snapshot root down to `self` (inclusive).
    pub fn path_from_root(self: &Arc<Self>) -> Vec<Arc<ElementSnapshot>> {
        let mut chain = vec![self.clone()];
        let mut current = self.parent();
        while let Some(node) = current {
            current = node.parent();
            chain.push(node);
        }
        chain.reverse();
        chain
    }

    pub fn count(&self) -> usize {
        1 + self.children.iter().map(|c| c.count()).sum::<usize>()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
