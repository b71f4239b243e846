//! Menu bar navigation.
//!
//! Listing and hierarchy exploration read snapshots only. Reading a closed menu's items and
//! activating an item physically open menus; every such call ends with the menu closed.

mod hierarchy;
mod session;

pub use hierarchy::{
    is_separator, render_shortcut, CompactMenuItem, InMemoryMenuCache, MenuHierarchy,
    MenuHierarchyCache, PATH_SEPARATOR,
};
pub use session::MenuState;

use crate::config::MenuConfig;
use crate::element::{NativeHandle, ATTR_ENABLED, ATTR_MENU_BAR, ATTR_TITLE};
use crate::errors::{AutomationError, MenuError};
use crate::path::{ElementPath, RootSelector, Segment};
use crate::snapshot::ElementSnapshot;
use crate::tree_builder::SnapshotBuilder;
use serde::{Deserialize, Serialize};
use session::MenuSession;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

pub const ROLE_MENU_BAR: &str = "AXMenuBar";
pub const ROLE_MENU_BAR_ITEM: &str = "AXMenuBarItem";
pub const ROLE_MENU: &str = "AXMenu";
pub const ROLE_MENU_ITEM: &str = "AXMenuItem";

/// Outcome of a successful activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuActivation {
    /// Titles actually matched, top-level menu first
    pub path: Vec<String>,
    pub transitions: Vec<MenuState>,
}

pub struct MenuNavigator {
    builder: SnapshotBuilder,
    config: MenuConfig,
    cache: Arc<dyn MenuHierarchyCache>,
}

impl MenuNavigator {
    pub fn new(
        builder: SnapshotBuilder,
        config: MenuConfig,
        cache: Arc<dyn MenuHierarchyCache>,
    ) -> Self {
        Self {
            builder,
            config,
            cache,
        }
    }

    pub fn config(&self) -> &MenuConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<dyn MenuHierarchyCache> {
        &self.cache
    }

    /// The application's menu bar: the `AXMenuBar` attribute, else a child with that role.
    pub fn menu_bar(&self, app: &NativeHandle) -> Result<NativeHandle, AutomationError> {
        if let Ok(Some(bar)) = app.element_attribute(ATTR_MENU_BAR) {
            return Ok(bar);
        }
        let children = app
            .children()
            .map_err(|e| AutomationError::native("reading application children", e))?;
        children
            .into_iter()
            .find(|c| c.role().ok().as_deref() == Some(ROLE_MENU_BAR))
            .ok_or_else(|| {
                let name = app
                    .title()
                    .ok()
                    .flatten()
                    .or_else(|| app.process_id().ok().map(|p| p.to_string()))
                    .unwrap_or_default();
                MenuError::MenuBarNotFound(name).into()
            })
    }

    /// Top-level menus, from a shallow snapshot of the menu bar.
    #[instrument(level = "debug", skip(self, app))]
    pub fn get_application_menus(
        &self,
        app: &NativeHandle,
        app_id: &str,
    ) -> Result<Vec<CompactMenuItem>, AutomationError> {
        let bar = self.menu_bar(app)?;
        let snapshot = self.builder.build(&bar, true, 1)?;
        Ok(snapshot
            .children
            .iter()
            .filter(|c| !is_separator(c))
            .filter_map(|c| {
                let title = c.title.clone().filter(|t| !t.is_empty())?;
                Some(compact_item(app_id, c, title.clone(), title, false))
            })
            .collect())
    }

    /// Items of one top-level menu. Opens the menu only when its items are not already
    /// exposed, and always closes what it opened.
    #[instrument(level = "debug", skip(self, app))]
    pub async fn get_menu_items(
        &self,
        app: &NativeHandle,
        app_id: &str,
        menu_title: &str,
    ) -> Result<Vec<CompactMenuItem>, AutomationError> {
        let bar = self.menu_bar(app)?;
        let (top, top_title) = find_top_level(&bar, menu_title)?;

        let mut session = MenuSession::new();
        // The root keeps the bar and bar item alive for the items' parent links.
        let (_root, menu) = match self.exposed_menu(&bar, &top_title)? {
            Some(exposed) => exposed,
            None => {
                session.open_top_level(&top, &top_title)?;
                self.wait_for_menu(&top_title, || self.exposed_menu(&bar, &top_title))
                    .await?
            }
        };

        let items = menu
            .children
            .iter()
            .filter(|c| !is_separator(c))
            .filter_map(|c| {
                let title = c.title.clone().filter(|t| !t.is_empty())?;
                let path = format!("{top_title}{PATH_SEPARATOR}{title}");
                Some(compact_item(app_id, c, path, title, true))
            })
            .collect::<Vec<_>>();

        let transitions = session.finish();
        debug!(
            "Read {} items from '{}' ({:?})",
            items.len(),
            top_title,
            transitions
        );
        Ok(items)
    }

    /// Every item path reachable through already exposed subtrees, up to the configured
    /// depth. Never opens a menu. Cached per application.
    #[instrument(level = "debug", skip(self, app))]
    pub fn get_complete_menu_hierarchy(
        &self,
        app: &NativeHandle,
        app_id: &str,
    ) -> Result<MenuHierarchy, AutomationError> {
        if let Some(cached) = self.cache.get(app_id) {
            debug!("Menu hierarchy cache hit for {}", app_id);
            return Ok(cached);
        }

        let levels = self.config.hierarchy_depth.max(1);
        let bar = self.menu_bar(app)?;
        // bar → bar item → menu → item → menu → item …
        let snapshot = self.builder.build(&bar, true, 1 + 2 * levels)?;

        let mut hierarchy = MenuHierarchy {
            application_id: app_id.to_string(),
            menus: Default::default(),
            total_items: 0,
            explored_depth: 0,
        };
        for top in snapshot.children.iter().filter(|c| !is_separator(c)) {
            let Some(title) = top.title.clone().filter(|t| !t.is_empty()) else {
                continue;
            };
            let mut paths = Vec::new();
            let mut depth = 0;
            if let Some(menu) = top.first_child_with_role(ROLE_MENU) {
                collect_paths(menu, &title, 1, levels, &mut paths, &mut depth);
            }
            hierarchy.total_items += paths.len();
            hierarchy.explored_depth = hierarchy.explored_depth.max(depth);
            hierarchy.menus.insert(title, paths);
        }

        info!(
            "Explored {} menu items across {} menus for {}",
            hierarchy.total_items,
            hierarchy.menus.len(),
            app_id
        );
        self.cache.set(app_id, hierarchy.clone());
        Ok(hierarchy)
    }

    /// Activate `File > Export > PDF`-style paths.
    #[instrument(level = "debug", skip(self, app))]
    pub async fn activate_menu_item_by_path(
        &self,
        app: &NativeHandle,
        app_id: &str,
        path: &str,
    ) -> Result<MenuActivation, AutomationError> {
        let mut components = parse_menu_path(path)?;
        if let Some(canonical) = self
            .cache
            .get(app_id)
            .and_then(|h| h.find_path(&components))
        {
            components = canonical;
        }
        self.activate_titles(app, &components).await
    }

    /// Same as [`Self::activate_menu_item_by_path`] with already split titles.
    pub async fn activate_titles(
        &self,
        app: &NativeHandle,
        titles: &[String],
    ) -> Result<MenuActivation, AutomationError> {
        if titles.len() < 2 {
            return Err(MenuError::InvalidMenuPath(titles.join(PATH_SEPARATOR)).into());
        }
        let bar = self.menu_bar(app)?;
        let (top, top_title) = find_top_level(&bar, &titles[0])?;
        let mut matched = vec![top_title.clone()];

        let mut session = MenuSession::new();
        let mut container = match live_menu_of(&top) {
            Some(menu) => menu,
            None => {
                session.open_top_level(&top, &top_title)?;
                self.wait_for_live_menu(&top, &top_title).await?
            }
        };

        for (depth, wanted) in titles.iter().enumerate().skip(1) {
            let (item, title) = match_live_item(&container, wanted)?;
            matched.push(title.clone());

            if depth == titles.len() - 1 {
                session.activate(&item, &title)?;
                break;
            }

            container = match live_menu_of(&item) {
                Some(menu) => menu,
                None => {
                    session.open_submenu(&item, &title, depth)?;
                    self.wait_for_live_menu(&item, &title).await?
                }
            };
        }

        let state = session.state();
        let transitions = session.finish();
        info!(
            "Activated menu item {} (final state {:?})",
            matched.join(PATH_SEPARATOR),
            state
        );
        Ok(MenuActivation {
            path: matched,
            transitions,
        })
    }

    /// The snapshot root and the `AXMenu` under the top-level item titled `title`, if that
    /// menu already has items. Captured deep enough to see one level of submenu items.
    fn exposed_menu(
        &self,
        bar: &NativeHandle,
        title: &str,
    ) -> Result<Option<(Arc<ElementSnapshot>, Arc<ElementSnapshot>)>, AutomationError> {
        // bar → bar item → menu → item → submenu → submenu item
        let snapshot = self.builder.build(bar, true, 5)?;
        let menu = match_title(snapshot.children.iter().map(|c| c.title.as_deref()), title)
            .and_then(|position| snapshot.children.get(position))
            .and_then(|top| top.first_child_with_role(ROLE_MENU))
            .filter(|menu| !menu.children.is_empty())
            .cloned();
        Ok(menu.map(|menu| (snapshot, menu)))
    }

    async fn wait_for_menu<F>(
        &self,
        title: &str,
        exposed: F,
    ) -> Result<(Arc<ElementSnapshot>, Arc<ElementSnapshot>), AutomationError>
    where
        F: Fn() -> Result<Option<(Arc<ElementSnapshot>, Arc<ElementSnapshot>)>, AutomationError>,
    {
        let deadline = Instant::now() + self.config.open_timeout();
        loop {
            tokio::time::sleep(self.config.settle()).await;
            if let Some(found) = exposed()? {
                return Ok(found);
            }
            if Instant::now() >= deadline {
                return Err(MenuError::TimeoutWaitingForMenu(title.to_string()).into());
            }
        }
    }

    async fn wait_for_live_menu(
        &self,
        item: &NativeHandle,
        title: &str,
    ) -> Result<NativeHandle, AutomationError> {
        let deadline = Instant::now() + self.config.open_timeout();
        loop {
            tokio::time::sleep(self.config.settle()).await;
            if let Some(menu) = live_menu_of(item) {
                return Ok(menu);
            }
            if Instant::now() >= deadline {
                return Err(MenuError::TimeoutWaitingForMenu(title.to_string()).into());
            }
        }
    }
}

/// Split `"File > Export > PDF"`; empty components are rejected.
pub fn parse_menu_path(path: &str) -> Result<Vec<String>, AutomationError> {
    let components: Vec<String> = path.split('>').map(|c| c.trim().to_string()).collect();
    if components.len() < 2 || components.iter().any(|c| c.is_empty()) {
        return Err(MenuError::InvalidMenuPath(path.to_string()).into());
    }
    Ok(components)
}

/// Exact title, then case-insensitive, then case-insensitive substring.
pub fn match_title<'a, I>(candidates: I, wanted: &str) -> Option<usize>
where
    I: IntoIterator<Item = Option<&'a str>> + Clone,
{
    let lower = wanted.to_lowercase();
    let find = |pred: &dyn Fn(&str) -> bool| {
        candidates
            .clone()
            .into_iter()
            .position(|t| t.is_some_and(pred))
    };
    find(&|t: &str| t == wanted)
        .or_else(|| find(&|t: &str| t.to_lowercase() == lower))
        .or_else(|| find(&|t: &str| t.to_lowercase().contains(&lower)))
}

fn find_top_level(
    bar: &NativeHandle,
    wanted: &str,
) -> Result<(NativeHandle, String), AutomationError> {
    let children = bar
        .children()
        .map_err(|e| AutomationError::native("reading menu bar", e))?;
    let titles: Vec<Option<String>> = children.iter().map(|c| c.title().ok().flatten()).collect();
    let position = match_title(titles.iter().map(|t| t.as_deref()), wanted)
        .ok_or_else(|| MenuError::MenuItemNotFound(wanted.to_string()))?;
    let title = titles[position].clone().unwrap_or_default();
    Ok((children[position].clone(), title))
}

/// The `AXMenu` child of a live item when it exposes at least one entry.
fn live_menu_of(item: &NativeHandle) -> Option<NativeHandle> {
    let menu = item
        .children()
        .ok()?
        .into_iter()
        .find(|c| c.role().ok().as_deref() == Some(ROLE_MENU))?;
    let has_items = menu.children().map(|c| !c.is_empty()).unwrap_or(false);
    has_items.then_some(menu)
}

fn match_live_item(
    container: &NativeHandle,
    wanted: &str,
) -> Result<(NativeHandle, String), AutomationError> {
    let children = container
        .children()
        .map_err(|e| AutomationError::native("reading menu items", e))?;
    let titled: Vec<(NativeHandle, Option<String>)> = children
        .into_iter()
        .map(|c| {
            let title = c.title().ok().flatten().filter(|t| !t.trim().is_empty());
            (c, title)
        })
        .collect();
    let position = match_title(titled.iter().map(|(_, t)| t.as_deref()), wanted)
        .ok_or_else(|| MenuError::MenuItemNotFound(wanted.to_string()))?;
    let (item, title) = titled[position].clone();
    Ok((item, title.unwrap_or_default()))
}

fn collect_paths(
    menu: &ElementSnapshot,
    prefix: &str,
    level: usize,
    max_level: usize,
    out: &mut Vec<String>,
    deepest: &mut usize,
) {
    for item in menu.children.iter().filter(|c| !is_separator(c)) {
        let Some(title) = item.title.as_deref().filter(|t| !t.is_empty()) else {
            continue;
        };
        let path = format!("{prefix}{PATH_SEPARATOR}{title}");
        *deepest = (*deepest).max(level);
        out.push(path.clone());
        if level < max_level {
            if let Some(submenu) = item.first_child_with_role(ROLE_MENU) {
                collect_paths(submenu, &path, level + 1, max_level, out, deepest);
            }
        }
    }
}

fn compact_item(
    app_id: &str,
    node: &Arc<ElementSnapshot>,
    path: String,
    title: String,
    with_children: bool,
) -> CompactMenuItem {
    let submenu = node
        .first_child_with_role(ROLE_MENU)
        .filter(|m| !m.children.is_empty());
    let children = if with_children {
        submenu.map(|menu| {
            menu.children
                .iter()
                .filter(|c| !is_separator(c))
                .filter_map(|c| {
                    let child_title = c.title.clone().filter(|t| !t.is_empty())?;
                    let child_path = format!("{path}{PATH_SEPARATOR}{child_title}");
                    Some(compact_item(app_id, c, child_path, child_title, false))
                })
                .collect()
        })
    } else {
        None
    };

    CompactMenuItem {
        enabled: node.bool_attribute(ATTR_ENABLED).unwrap_or(true),
        shortcut: render_shortcut(node),
        has_submenu: submenu.is_some()
            || node.first_child_with_role(ROLE_MENU).is_some()
            || node.role == ROLE_MENU_BAR_ITEM,
        children,
        element_path: element_path_for(app_id, node).to_string(),
        path,
        title,
    }
}

/// `app://<id>/AXMenuBar/…` for a node inside a snapshot rooted at the menu bar.
fn element_path_for(app_id: &str, node: &Arc<ElementSnapshot>) -> ElementPath {
    let root = RootSelector::Application(app_id.to_string());
    let relative = ElementPath::for_snapshot(root.clone(), node);
    let mut segments = vec![Segment::role(ROLE_MENU_BAR)];
    segments.extend(relative.segments().iter().cloned());
    ElementPath::new(root, segments)
}

/// Titles from the menu bar down to `element`, if it sits inside one.
pub fn titles_to_menu_bar(element: &NativeHandle, max_hops: usize) -> Option<Vec<String>> {
    let mut titles = Vec::new();
    let mut current = Some(element.clone());
    for _ in 0..=max_hops {
        let node = current?;
        let role = node.role().ok()?;
        if role == ROLE_MENU_BAR {
            titles.reverse();
            return Some(titles);
        }
        if role == ROLE_MENU_ITEM || role == ROLE_MENU_BAR_ITEM {
            if let Ok(Some(title)) = node.string_attribute(ATTR_TITLE) {
                if !title.is_empty() {
                    titles.push(title);
                }
            }
        }
        current = node.parent().ok().flatten();
    }
    None
}
