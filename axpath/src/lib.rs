//! Path-addressed automation of desktop applications through accessibility APIs.
//!
//! Elements are addressed by hierarchical paths such as
//! `app://com.apple.TextEdit/AXWindow[0]/AXButton[@AXTitle="Close"]`, resolved against the live
//! accessibility tree, and acted upon through an ordered chain of fallback strategies.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub mod actions;
pub mod cache;
pub mod config;
pub mod element;
pub mod errors;
pub mod health;
pub mod input;
pub mod interaction;
pub mod menu;
pub mod path;
pub mod platforms;
pub mod resolver;
pub mod snapshot;
#[cfg(test)]
mod tests;
pub mod tree_builder;

pub use actions::{ActionRequest, ActionResponse, ErrorPayload, TargetSpec};
pub use cache::{CacheStats, HandleCache};
pub use config::ServiceConfig;
pub use element::{Frame, NativeHandle, Point, Size};
pub use errors::{AutomationError, ErrorKind, NativeError, Tier, TierAttempt};
pub use health::{HealthCheckResult, HealthStatus};
pub use interaction::{ActionResult, ClickKind, ResolvedTarget, ScrollDirection, Target};
pub use menu::{CompactMenuItem, MenuHierarchy, MenuHierarchyCache, MenuNavigator};
pub use path::{ElementPath, RootSelector, Segment};
pub use platforms::{AccessibilityEngine, ApplicationDirectory, PlatformBackend, ProcessHandle};
pub use snapshot::ElementSnapshot;
pub use tree_builder::SnapshotBuilder;

use input::InputQueue;
use interaction::InteractionEngine;
use menu::InMemoryMenuCache;
use resolver::PathResolver;

/// The main entry point: resolves paths, captures snapshots, and performs actions.
///
/// One instance owns its handle cache, so mutating calls take `&mut self`. Separate instances
/// may be used concurrently; synthetic input from all of them is serialized.
pub struct AccessibilityService {
    config: ServiceConfig,
    engine: Arc<dyn AccessibilityEngine>,
    resolver: PathResolver,
    cache: HandleCache,
    builder: SnapshotBuilder,
    menus: Arc<MenuNavigator>,
    interaction: InteractionEngine,
}

impl AccessibilityService {
    /// Service over the host platform's accessibility API.
    #[instrument(skip(config))]
    pub fn new(config: ServiceConfig) -> Result<Self, AutomationError> {
        let backend = platforms::create_backend()?;
        Ok(Self::with_backend(backend, config))
    }

    pub fn with_backend(backend: PlatformBackend, config: ServiceConfig) -> Self {
        let cache = Arc::new(InMemoryMenuCache::from_config(&config.menu));
        Self::with_menu_cache(backend, config, cache)
    }

    /// Like [`Self::with_backend`] with a caller-supplied menu hierarchy store.
    pub fn with_menu_cache(
        backend: PlatformBackend,
        config: ServiceConfig,
        menu_cache: Arc<dyn MenuHierarchyCache>,
    ) -> Self {
        let builder = SnapshotBuilder::new(config.snapshot.clone());
        let menus = Arc::new(MenuNavigator::new(
            builder.clone(),
            config.menu.clone(),
            menu_cache,
        ));
        let input = InputQueue::new(backend.input, config.interaction.clone());
        let interaction = InteractionEngine::new(
            backend.engine.clone(),
            input,
            menus.clone(),
            config.interaction.clone(),
        );

        Self {
            resolver: PathResolver::new(
                backend.engine.clone(),
                backend.directory,
                &config.resolver,
            ),
            cache: HandleCache::from_config(&config.cache),
            engine: backend.engine,
            builder,
            menus,
            interaction,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn AccessibilityEngine> {
        &self.engine
    }

    fn ensure_trusted(&self) -> Result<(), AutomationError> {
        if self.engine.is_trusted() {
            Ok(())
        } else {
            Err(AutomationError::PermissionDenied(
                "Accessibility access is not granted to this process".to_string(),
            ))
        }
    }

    /// Resolve a path to a live handle, consulting the cache first.
    #[instrument(skip(self, path), fields(path = %path))]
    pub fn resolve(&mut self, path: &ElementPath) -> Result<NativeHandle, AutomationError> {
        self.ensure_trusted()?;
        self.lookup(path)
    }

    fn lookup(&mut self, path: &ElementPath) -> Result<NativeHandle, AutomationError> {
        if !self.config.cache.enabled {
            return self.resolver.resolve(path);
        }
        let key = path.cache_key();
        if let Some(handle) = self.cache.get(&key) {
            debug!("Cache hit for {}", key);
            return Ok(handle);
        }
        let handle = self.resolver.resolve(path)?;
        self.cache.put(key, handle.clone());
        Ok(handle)
    }

    pub fn resolve_target(&mut self, target: &Target) -> Result<ResolvedTarget, AutomationError> {
        self.ensure_trusted()?;
        self.lookup_target(target)
    }

    fn lookup_target(&mut self, target: &Target) -> Result<ResolvedTarget, AutomationError> {
        match target {
            Target::Path(path) => self.lookup(path).map(ResolvedTarget::Element),
            Target::Position(point) => {
                let element = match self.engine.element_at_position(*point) {
                    Ok(element) => Some(element),
                    Err(e) => {
                        debug!("Nothing hit-tests at ({}, {}): {}", point.x, point.y, e);
                        None
                    }
                };
                Ok(ResolvedTarget::Point {
                    point: *point,
                    element,
                })
            }
        }
    }

    /// Capture the subtree at `path`. `depth` defaults to the configured snapshot depth.
    #[instrument(skip(self, path), fields(path = %path))]
    pub fn snapshot(
        &mut self,
        path: &ElementPath,
        recursive: bool,
        depth: Option<usize>,
    ) -> Result<Arc<ElementSnapshot>, AutomationError> {
        self.ensure_trusted()?;
        let element = self.lookup(path)?;
        let depth = depth.unwrap_or(self.config.snapshot.default_depth);
        let result = self.builder.build(&element, recursive, depth);
        self.evict_on_invalid(Some(path), result)
    }

    /// Drop the cache entry for a path whose handle turned out to be stale.
    fn evict_on_invalid<T>(
        &mut self,
        path: Option<&ElementPath>,
        result: Result<T, AutomationError>,
    ) -> Result<T, AutomationError> {
        if let (Err(e), Some(path)) = (&result, path) {
            if e.kind() == ErrorKind::Invalid && self.cache.invalidate(&path.cache_key()) {
                warn!("Evicted cached handle for {} after: {}", path, e);
            }
        }
        result
    }

    async fn run_click(
        &mut self,
        target: &Target,
        kind: ClickKind,
    ) -> Result<ActionResult, AutomationError> {
        self.ensure_trusted()?;
        let resolved = self.lookup_target(target)?;
        let result = self.interaction.click(&resolved, kind).await;
        self.evict_on_invalid(target_path(target), result)
    }

    #[instrument(skip(self, target), fields(target = %target))]
    pub async fn click(&mut self, target: &Target) -> Result<ActionResult, AutomationError> {
        self.run_click(target, ClickKind::Single).await
    }

    #[instrument(skip(self, target), fields(target = %target))]
    pub async fn double_click(&mut self, target: &Target) -> Result<ActionResult, AutomationError> {
        self.run_click(target, ClickKind::Double).await
    }

    #[instrument(skip(self, target), fields(target = %target))]
    pub async fn right_click(&mut self, target: &Target) -> Result<ActionResult, AutomationError> {
        self.run_click(target, ClickKind::Right).await
    }

    #[instrument(skip(self, target, text), fields(target = %target))]
    pub async fn type_text(
        &mut self,
        target: &Target,
        text: &str,
    ) -> Result<ActionResult, AutomationError> {
        self.ensure_trusted()?;
        let resolved = self.lookup_target(target)?;
        let result = self.interaction.type_text(&resolved, text).await;
        self.evict_on_invalid(target_path(target), result)
    }

    /// `amount` is a 0..1 fraction, mapped to between 1 and 10 steps.
    #[instrument(skip(self, target), fields(target = %target))]
    pub async fn scroll(
        &mut self,
        target: &Target,
        direction: ScrollDirection,
        amount: f64,
    ) -> Result<ActionResult, AutomationError> {
        self.ensure_trusted()?;
        let resolved = self.lookup_target(target)?;
        let result = self.interaction.scroll(&resolved, direction, amount).await;
        self.evict_on_invalid(target_path(target), result)
    }

    #[instrument(skip(self, from, to), fields(from = %from, to = %to))]
    pub async fn drag(&mut self, from: &Target, to: &Target) -> Result<ActionResult, AutomationError> {
        self.ensure_trusted()?;
        let start = self.lookup_target(from)?;
        let end = self.lookup_target(to)?;
        let result = self.interaction.drag(&start, &end).await;
        let result = self.evict_on_invalid(target_path(from), result);
        self.evict_on_invalid(target_path(to), result)
    }

    /// Press a key combination such as `cmd+shift+s`, optionally focusing `target` first.
    #[instrument(skip(self, target))]
    pub async fn press_key(
        &mut self,
        target: Option<&Target>,
        combo: &str,
    ) -> Result<ActionResult, AutomationError> {
        self.ensure_trusted()?;
        let resolved = match target {
            Some(target) => Some(self.lookup_target(target)?),
            None => None,
        };
        let result = self.interaction.press_key(resolved.as_ref(), combo).await;
        self.evict_on_invalid(target.and_then(target_path), result)
    }

    /// Invoke a named native action such as `AXIncrement`.
    #[instrument(skip(self, target), fields(target = %target))]
    pub fn perform_action(
        &mut self,
        target: &Target,
        action: &str,
    ) -> Result<ActionResult, AutomationError> {
        self.ensure_trusted()?;
        let resolved = self.lookup_target(target)?;
        let result = match resolved.element() {
            Some(element) => self.interaction.perform_action(element, action),
            None => Err(AutomationError::ElementNotFound(format!(
                "no element at {target}"
            ))),
        };
        self.evict_on_invalid(target_path(target), result)
    }

    fn application(&self, app_id: &str) -> Result<NativeHandle, AutomationError> {
        self.resolver
            .resolve_root(&RootSelector::Application(app_id.to_string()))
    }

    /// Top-level menus of an application's menu bar.
    #[instrument(skip(self))]
    pub fn application_menus(&self, app_id: &str) -> Result<Vec<CompactMenuItem>, AutomationError> {
        self.ensure_trusted()?;
        let app = self.application(app_id)?;
        self.menus.get_application_menus(&app, app_id)
    }

    /// Items of one top-level menu; the menu is closed again before this returns.
    #[instrument(skip(self))]
    pub async fn menu_items(
        &self,
        app_id: &str,
        menu_title: &str,
    ) -> Result<Vec<CompactMenuItem>, AutomationError> {
        self.ensure_trusted()?;
        let app = self.application(app_id)?;
        self.menus.get_menu_items(&app, app_id, menu_title).await
    }

    #[instrument(skip(self))]
    pub fn menu_hierarchy(&self, app_id: &str) -> Result<MenuHierarchy, AutomationError> {
        self.ensure_trusted()?;
        let app = self.application(app_id)?;
        self.menus.get_complete_menu_hierarchy(&app, app_id)
    }

    /// Activate a `File > Export > PDF`-style menu path.
    #[instrument(skip(self))]
    pub async fn activate_menu(
        &self,
        app_id: &str,
        path: &str,
    ) -> Result<ActionResult, AutomationError> {
        self.ensure_trusted()?;
        let app = self.application(app_id)?;
        let activation = self
            .menus
            .activate_menu_item_by_path(&app, app_id, path)
            .await?;
        let details = format!("Activated {}", activation.path.join(menu::PATH_SEPARATOR));
        info!("{}", details);
        let mut result = ActionResult::new("activate_menu", Tier::MenuPath, details);
        result
            .attempts
            .push(TierAttempt::succeeded(Tier::MenuPath, result.details.clone()));
        Ok(result)
    }

    /// Run one JSON-shaped request. Failures come back as a structured payload.
    pub async fn execute(&mut self, request: ActionRequest) -> ActionResponse {
        let name = request.name();
        let result = self.dispatch(request).await;
        if let Err(e) = &result {
            warn!("{} failed: {}", name, e);
        }
        ActionResponse::from(result)
    }

    async fn dispatch(&mut self, request: ActionRequest) -> Result<ActionResult, AutomationError> {
        match request {
            ActionRequest::Click { target } => self.click(&target.to_target()?).await,
            ActionRequest::DoubleClick { target } => self.double_click(&target.to_target()?).await,
            ActionRequest::RightClick { target } => self.right_click(&target.to_target()?).await,
            ActionRequest::TypeText { target, text } => {
                self.type_text(&target.to_target()?, &text).await
            }
            ActionRequest::Scroll {
                target,
                direction,
                amount,
            } => self.scroll(&target.to_target()?, direction, amount).await,
            ActionRequest::Drag { from, to } => {
                self.drag(&from.to_target()?, &to.to_target()?).await
            }
            ActionRequest::PressKey { target, key } => {
                let target = target.as_ref().map(TargetSpec::to_target).transpose()?;
                self.press_key(target.as_ref(), &key).await
            }
            ActionRequest::PerformAction { target, name } => {
                self.perform_action(&target.to_target()?, &name)
            }
            ActionRequest::ActivateMenu { application, path } => {
                self.activate_menu(&application, &path).await
            }
        }
    }

    pub fn health_check(&self) -> HealthCheckResult {
        health::check_engine(self.engine.as_ref())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Forget every cached handle and menu hierarchy.
    pub fn invalidate(&mut self) {
        self.cache.clear();
        self.menus.cache().clear();
    }
}

fn target_path(target: &Target) -> Option<&ElementPath> {
    match target {
        Target::Path(path) => Some(path),
        Target::Position(_) => None,
    }
}
