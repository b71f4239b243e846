use crate::config::MenuConfig;
use crate::element::{ATTR_CMD_CHAR, ATTR_CMD_MODIFIERS};
use crate::snapshot::ElementSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

pub const PATH_SEPARATOR: &str = " > ";

/// Cached, non-authoritative view of an application's menus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuHierarchy {
    pub application_id: String,
    /// Top-level menu title → every item path beneath it (`"File > Open Recent > Clear"`)
    pub menus: BTreeMap<String, Vec<String>>,
    pub total_items: usize,
    pub explored_depth: usize,
}

impl MenuHierarchy {
    /// Canonical stored path equal to `components` ignoring case.
    pub fn find_path(&self, components: &[String]) -> Option<Vec<String>> {
        let top = components.first()?;
        let (title, paths) = self
            .menus
            .iter()
            .find(|(title, _)| title.eq_ignore_ascii_case(top))?;
        if components.len() == 1 {
            return Some(vec![title.clone()]);
        }
        paths.iter().find_map(|path| {
            let parts: Vec<&str> = path.split(PATH_SEPARATOR).collect();
            let same = parts.len() == components.len()
                && parts
                    .iter()
                    .zip(components)
                    .all(|(a, b)| a.eq_ignore_ascii_case(b));
            same.then(|| parts.iter().map(|p| p.to_string()).collect())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactMenuItem {
    pub path: String,
    pub title: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<String>,
    pub has_submenu: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<CompactMenuItem>>,
    /// Path string that resolves to the underlying element
    pub element_path: String,
}

/// TTL key-value store for explored hierarchies, keyed by application id.
pub trait MenuHierarchyCache: Send + Sync {
    fn get(&self, key: &str) -> Option<MenuHierarchy>;
    fn set(&self, key: &str, value: MenuHierarchy);
    fn invalidate(&self, key: &str);
    fn clear(&self);
}

pub struct InMemoryMenuCache {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, (MenuHierarchy, Instant)>>,
}

impl InMemoryMenuCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &MenuConfig) -> Self {
        Self::new(config.hierarchy_ttl(), 32)
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, (MenuHierarchy, Instant)>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MenuHierarchyCache for InMemoryMenuCache {
    fn get(&self, key: &str) -> Option<MenuHierarchy> {
        let mut entries = self.entries();
        match entries.get(key) {
            Some((value, stored)) if stored.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: MenuHierarchy) {
        let mut entries = self.entries();
        if entries.len() >= self.max_entries && !entries.contains_key(key) {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, (_, stored))| *stored)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }
        entries.insert(key.to_string(), (value, Instant::now()));
    }

    fn invalidate(&self, key: &str) {
        self.entries().remove(key);
    }

    fn clear(&self) {
        self.entries().clear();
    }
}

/// Separators, dividers and grouping containers are not selectable items.
pub fn is_separator(node: &ElementSnapshot) -> bool {
    let role = node.role.as_str();
    if role.contains("Separator") || role.contains("Splitter") || role == "AXGroup" {
        return true;
    }
    let title = node.title.as_deref().map(str::trim).unwrap_or("");
    if title.is_empty() {
        return node.children.is_empty() && node.string_attribute(ATTR_CMD_CHAR).is_none();
    }
    title.chars().all(|c| matches!(c, '-' | '_' | '\u{2014}' | '\u{2013}' | '\u{2500}'))
}

/// `AXMenuItemCmdModifiers` bits: shift 1, option 2, control 4, "no command" 8.
pub fn render_shortcut(node: &ElementSnapshot) -> Option<String> {
    let key = node
        .string_attribute(ATTR_CMD_CHAR)
        .map(str::trim)
        .filter(|k| !k.is_empty())?;
    let bits = node
        .attributes
        .get(ATTR_CMD_MODIFIERS)
        .and_then(|v| v.as_number())
        .unwrap_or(0.0) as u32;

    let mut parts = Vec::new();
    if bits & 8 == 0 {
        parts.push("Cmd".to_string());
    }
    if bits & 4 != 0 {
        parts.push("Ctrl".to_string());
    }
    if bits & 2 != 0 {
        parts.push("Option".to_string());
    }
    if bits & 1 != 0 {
        parts.push("Shift".to_string());
    }
    parts.push(key.to_uppercase());
    Some(parts.join("+"))
}
