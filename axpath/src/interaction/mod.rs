//! Semantic actions against resolved elements, with tiered fallback.

pub mod strategy;

use crate::config::InteractionConfig;
use crate::element::{AttributeValue, NativeHandle, Point, ATTR_FOCUSED, ATTR_VALUE};
use crate::errors::{AutomationError, ErrorKind, NativeError, Tier, TierAttempt};
use crate::input::{InputQueue, KeyCombo};
use crate::menu::MenuNavigator;
use crate::path::ElementPath;
use crate::platforms::AccessibilityEngine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use strategy::{default_click_strategies, ClickContext, ClickStrategy, StrategyOutcome};
use tracing::{debug, info, instrument, warn};

pub const TEXT_INPUT_ROLES: &[&str] = &[
    "AXTextField",
    "AXTextArea",
    "AXSearchField",
    "AXSecureTextField",
    "AXComboBox",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickKind {
    Single,
    Double,
    Right,
}

impl ClickKind {
    pub fn native_action(&self) -> &'static str {
        match self {
            ClickKind::Single => "AXPress",
            ClickKind::Double => "AXOpen",
            ClickKind::Right => "AXShowMenu",
        }
    }
}

impl fmt::Display for ClickKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClickKind::Single => "click",
            ClickKind::Double => "double-click",
            ClickKind::Right => "right-click",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    /// Native action names to try, in order of preference.
    pub fn native_actions(&self) -> &'static [&'static str] {
        match self {
            ScrollDirection::Up => &["AXScrollUpByPage", "AXScrollUp"],
            ScrollDirection::Down => &["AXScrollDownByPage", "AXScrollDown"],
            ScrollDirection::Left => &["AXScrollLeftByPage", "AXScrollLeft"],
            ScrollDirection::Right => &["AXScrollRightByPage", "AXScrollRight"],
        }
    }

    /// Wheel line deltas `(dx, dy)` for `count` steps.
    pub fn wheel_deltas(&self, count: u32) -> (i32, i32) {
        let n = count as i32;
        match self {
            ScrollDirection::Down => (0, -n),
            ScrollDirection::Up => (0, n),
            ScrollDirection::Left => (n, 0),
            ScrollDirection::Right => (-n, 0),
        }
    }
}

impl std::str::FromStr for ScrollDirection {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(ScrollDirection::Up),
            "down" => Ok(ScrollDirection::Down),
            "left" => Ok(ScrollDirection::Left),
            "right" => Ok(ScrollDirection::Right),
            other => Err(AutomationError::InvalidArgument(format!(
                "Unknown scroll direction '{other}'"
            ))),
        }
    }
}

/// `amount` is clamped to 0..1, then `clamp(trunc(amount * 10), 1, 10)`.
pub fn scroll_steps(amount: f64) -> u32 {
    let amount = if amount.is_nan() { 0.0 } else { amount.clamp(0.0, 1.0) };
    ((amount * 10.0).trunc() as u32).clamp(1, 10)
}

/// What an interaction is aimed at, before resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Path(ElementPath),
    Position(Point),
}

impl From<ElementPath> for Target {
    fn from(path: ElementPath) -> Self {
        Target::Path(path)
    }
}

impl From<Point> for Target {
    fn from(point: Point) -> Self {
        Target::Position(point)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Path(path) => write!(f, "{path}"),
            Target::Position(p) => write!(f, "({}, {})", p.x, p.y),
        }
    }
}

/// A target after resolution.
#[derive(Debug, Clone)]
pub enum ResolvedTarget {
    Element(NativeHandle),
    /// Raw coordinate; `element` is whatever hit-tested there, if anything.
    Point {
        point: Point,
        element: Option<NativeHandle>,
    },
}

impl ResolvedTarget {
    pub fn element(&self) -> Option<&NativeHandle> {
        match self {
            ResolvedTarget::Element(e) => Some(e),
            ResolvedTarget::Point { element, .. } => element.as_ref(),
        }
    }

    pub fn point(&self) -> Option<Point> {
        match self {
            ResolvedTarget::Point { point, .. } => Some(*point),
            ResolvedTarget::Element(_) => None,
        }
    }
}

/// Result of an interaction: which tier finished it and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action: String,
    pub tier: Tier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Point>,
    pub details: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<TierAttempt>,
}

impl ActionResult {
    pub(crate) fn new(action: impl Into<String>, tier: Tier, details: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            tier,
            coordinates: None,
            details: details.into(),
            attempts: Vec::new(),
        }
    }
}

pub struct InteractionEngine {
    engine: Arc<dyn AccessibilityEngine>,
    input: InputQueue,
    menus: Arc<MenuNavigator>,
    config: InteractionConfig,
    strategies: Vec<Box<dyn ClickStrategy>>,
}

impl InteractionEngine {
    pub fn new(
        engine: Arc<dyn AccessibilityEngine>,
        input: InputQueue,
        menus: Arc<MenuNavigator>,
        config: InteractionConfig,
    ) -> Self {
        Self {
            engine,
            input,
            menus,
            config,
            strategies: default_click_strategies(),
        }
    }

    /// Replace the click fallback chain.
    pub fn with_strategies(mut self, strategies: Vec<Box<dyn ClickStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn input(&self) -> &InputQueue {
        &self.input
    }

    #[instrument(level = "debug", skip(self, target))]
    pub async fn click(
        &self,
        target: &ResolvedTarget,
        kind: ClickKind,
    ) -> Result<ActionResult, AutomationError> {
        let action = kind.to_string();

        let Some(element) = target.element() else {
            // Nothing hit-tests at the coordinate: plain synthetic input there.
            let point = target.point().ok_or_else(|| {
                AutomationError::Internal("coordinate target without a point".to_string())
            })?;
            self.synthesize_at(point, kind).await?;
            let mut result = ActionResult::new(
                action,
                Tier::SyntheticInput,
                format!("Synthesized {kind} at ({}, {})", point.x, point.y),
            );
            result.coordinates = Some(point);
            return Ok(result);
        };

        let actions = element.action_names().unwrap_or_else(|e| {
            debug!("Could not read actions: {}", e.name());
            Vec::new()
        });
        let frame = element.frame().unwrap_or_default();
        let ctx = ClickContext {
            element,
            kind,
            frame,
            actions: &actions,
            point: target.point(),
            engine: self.engine.as_ref(),
            input: &self.input,
            menus: self.menus.as_ref(),
        };

        let mut attempts = Vec::new();
        let mut last_error: Option<AutomationError> = None;
        for strategy in &self.strategies {
            let tier = strategy.tier();
            match strategy.attempt(&ctx).await {
                StrategyOutcome::Completed {
                    coordinates,
                    details,
                } => {
                    info!("{} completed via {}", action, tier);
                    attempts.push(TierAttempt::succeeded(tier, details.clone()));
                    return Ok(ActionResult {
                        action,
                        tier,
                        coordinates,
                        details,
                        attempts,
                    });
                }
                StrategyOutcome::NotApplicable(reason) => {
                    debug!("{} skipped: {}", tier, reason);
                    attempts.push(TierAttempt::skipped(tier, reason));
                }
                StrategyOutcome::Failed(error) => {
                    warn!("{} failed: {}", tier, error);
                    attempts.push(TierAttempt::failed(tier, &error));
                    last_error = Some(error);
                }
            }
        }

        Err(AutomationError::ActionFailed {
            action,
            kind: last_error
                .map(|e| e.kind())
                .unwrap_or(ErrorKind::Unsupported),
            attempts,
        })
    }

    async fn synthesize_at(&self, point: Point, kind: ClickKind) -> Result<(), AutomationError> {
        match kind {
            ClickKind::Single => self.input.click(point, crate::input::MouseButton::Left).await,
            ClickKind::Double => self.input.double_click(point).await,
            ClickKind::Right => {
                self.input
                    .click(point, crate::input::MouseButton::Right)
                    .await
            }
        }
    }

    /// Text roles get `AXValue` set directly; everything else is focused and typed into.
    #[instrument(level = "debug", skip(self, target, text))]
    pub async fn type_text(
        &self,
        target: &ResolvedTarget,
        text: &str,
    ) -> Result<ActionResult, AutomationError> {
        let mut attempts = Vec::new();

        if let Some(element) = target.element() {
            let role = element
                .role()
                .map_err(|e| AutomationError::native("reading role", e))?;
            if TEXT_INPUT_ROLES.contains(&role.as_str()) {
                match element.set_attribute(ATTR_VALUE, AttributeValue::from(text)) {
                    Ok(()) => {
                        let details = format!("Set AXValue on {role}");
                        attempts.push(TierAttempt::succeeded(Tier::SetValue, details.clone()));
                        let mut result = ActionResult::new("type_text", Tier::SetValue, details);
                        result.attempts = attempts;
                        return Ok(result);
                    }
                    Err(e) => {
                        let error = AutomationError::native("setting AXValue", e);
                        debug!("Direct value set failed, typing instead: {}", error);
                        attempts.push(TierAttempt::failed(Tier::SetValue, &error));
                    }
                }
            } else {
                attempts.push(TierAttempt::skipped(
                    Tier::SetValue,
                    format!("{role} is not a text input role"),
                ));
            }

            if let Err(e) = element.set_attribute(ATTR_FOCUSED, AttributeValue::Bool(true)) {
                debug!("Could not focus element before typing: {}", e.name());
            }
        } else if let Some(point) = target.point() {
            self.input
                .click(point, crate::input::MouseButton::Left)
                .await?;
        }

        match self.input.type_text(text).await {
            Ok(()) => {
                let details = format!("Typed {} characters", text.chars().count());
                attempts.push(TierAttempt::succeeded(Tier::Keystrokes, details.clone()));
                let mut result = ActionResult::new("type_text", Tier::Keystrokes, details);
                result.coordinates = target.point();
                result.attempts = attempts;
                Ok(result)
            }
            Err(error) => {
                attempts.push(TierAttempt::failed(Tier::Keystrokes, &error));
                Err(AutomationError::ActionFailed {
                    action: "type_text".to_string(),
                    kind: error.kind(),
                    attempts,
                })
            }
        }
    }

    /// Repeated native scroll actions, else one wheel event at the element center.
    #[instrument(level = "debug", skip(self, target))]
    pub async fn scroll(
        &self,
        target: &ResolvedTarget,
        direction: ScrollDirection,
        amount: f64,
    ) -> Result<ActionResult, AutomationError> {
        let count = scroll_steps(amount);
        // Steps still owed to the wheel fallback.
        let mut remaining = count;
        let mut attempts = Vec::new();

        if let (Some(element), None) = (target.element(), target.point()) {
            let supported = element.action_names().unwrap_or_default();
            let native = direction
                .native_actions()
                .iter()
                .find(|a| supported.iter().any(|s| s == *a));

            match native {
                Some(action) => match self.repeat_action(element, action, count).await {
                    Ok(()) => {
                        let details = format!("Performed {action} {count} times");
                        attempts.push(TierAttempt::succeeded(Tier::ScrollAction, details.clone()));
                        let mut result = ActionResult::new("scroll", Tier::ScrollAction, details);
                        result.attempts = attempts;
                        return Ok(result);
                    }
                    Err((done, error)) => {
                        warn!(
                            "Native scroll failed after {} of {} steps, falling back to wheel: {}",
                            done, count, error
                        );
                        let mut attempt = TierAttempt::failed(Tier::ScrollAction, &error);
                        attempt.detail = format!("{} after {done} of {count} steps", attempt.detail);
                        attempts.push(attempt);
                        remaining = count - done;
                    }
                },
                None => attempts.push(TierAttempt::skipped(
                    Tier::ScrollAction,
                    "no native scroll action advertised",
                )),
            }
        }

        let position = match (target.point(), target.element()) {
            (Some(point), _) => point,
            (None, Some(element)) => {
                let frame = element.frame().unwrap_or_default();
                if frame.is_degenerate() {
                    attempts.push(TierAttempt::skipped(
                        Tier::ScrollWheel,
                        "zero-size frame, no usable position",
                    ));
                    return Err(AutomationError::ActionFailed {
                        action: "scroll".to_string(),
                        kind: ErrorKind::Unsupported,
                        attempts,
                    });
                }
                frame.center()
            }
            (None, None) => {
                return Err(AutomationError::Internal(
                    "scroll target has neither element nor point".to_string(),
                ))
            }
        };

        let (dx, dy) = direction.wheel_deltas(remaining);
        match self.input.scroll(position, dx, dy).await {
            Ok(()) => {
                let details = format!("Posted wheel event ({dx}, {dy})");
                attempts.push(TierAttempt::succeeded(Tier::ScrollWheel, details.clone()));
                let mut result = ActionResult::new("scroll", Tier::ScrollWheel, details);
                result.coordinates = Some(position);
                result.attempts = attempts;
                Ok(result)
            }
            Err(error) => {
                attempts.push(TierAttempt::failed(Tier::ScrollWheel, &error));
                Err(AutomationError::ActionFailed {
                    action: "scroll".to_string(),
                    kind: error.kind(),
                    attempts,
                })
            }
        }
    }

    async fn repeat_action(
        &self,
        element: &NativeHandle,
        action: &str,
        count: u32,
    ) -> Result<(), (u32, AutomationError)> {
        let delay = Duration::from_millis(self.config.scroll_step_delay_ms);
        for i in 0..count {
            if i > 0 {
                tokio::time::sleep(delay).await;
            }
            element
                .perform_action(action)
                .map_err(|e| (i, AutomationError::native(action, e)))?;
        }
        Ok(())
    }

    /// Down at the source center, interpolated drags, up at the destination center.
    #[instrument(level = "debug", skip(self, from, to))]
    pub async fn drag(
        &self,
        from: &ResolvedTarget,
        to: &ResolvedTarget,
    ) -> Result<ActionResult, AutomationError> {
        let start = drag_point(from)?;
        let end = drag_point(to)?;
        self.input.drag(start, end).await?;

        let mut result = ActionResult::new(
            "drag",
            Tier::SyntheticInput,
            format!("Dragged ({}, {}) to ({}, {})", start.x, start.y, end.x, end.y),
        );
        result.coordinates = Some(end);
        Ok(result)
    }

    #[instrument(level = "debug", skip(self, target))]
    pub async fn press_key(
        &self,
        target: Option<&ResolvedTarget>,
        combo: &str,
    ) -> Result<ActionResult, AutomationError> {
        let combo = KeyCombo::parse(combo)?;
        if let Some(element) = target.and_then(|t| t.element()) {
            if let Err(e) = element.set_attribute(ATTR_FOCUSED, AttributeValue::Bool(true)) {
                debug!("Could not focus target before key press: {}", e.name());
            }
        }
        self.input.press(&combo).await?;
        Ok(ActionResult::new(
            "press_key",
            Tier::Keystrokes,
            format!("Pressed {combo}"),
        ))
    }

    /// Invoke a named native action; elements that do not advertise it are rejected up front.
    #[instrument(level = "debug", skip(self, element))]
    pub fn perform_action(
        &self,
        element: &NativeHandle,
        action: &str,
    ) -> Result<ActionResult, AutomationError> {
        let supported = element
            .action_names()
            .map_err(|e| AutomationError::native("reading actions", e))?;
        if !supported.iter().any(|a| a == action) {
            return Err(AutomationError::native(
                format!("performing {action}"),
                NativeError::ActionUnsupported,
            ));
        }
        element
            .perform_action(action)
            .map_err(|e| AutomationError::native(format!("performing {action}"), e))?;
        Ok(ActionResult::new(
            action,
            Tier::NativeAction,
            format!("Performed {action}"),
        ))
    }
}

fn drag_point(target: &ResolvedTarget) -> Result<Point, AutomationError> {
    if let Some(point) = target.point() {
        return Ok(point);
    }
    let element = target
        .element()
        .ok_or_else(|| AutomationError::Internal("empty drag target".to_string()))?;
    let frame = element
        .frame()
        .map_err(|e| AutomationError::native("reading frame", e))?;
    if frame.is_degenerate() {
        return Err(AutomationError::UnsupportedOperation(
            "cannot drag from or to a zero-size element".to_string(),
        ));
    }
    Ok(frame.center())
}
