//! Click fallback tiers. Each strategy decides for itself whether it applies, so the chain
//! is just an ordered list tried until one completes.

use super::ClickKind;
use crate::element::{Frame, NativeHandle, Point};
use crate::errors::{AutomationError, NativeError, Tier};
use crate::input::{InputQueue, MouseButton};
use crate::menu::{titles_to_menu_bar, MenuNavigator};
use crate::platforms::AccessibilityEngine;
use async_trait::async_trait;
use tracing::debug;

/// How far up the tree an element may sit below its menu bar or hit-test target.
const MAX_ANCESTOR_HOPS: usize = 32;

/// Interior points tried, as fractions of the frame, when the center is covered.
const PROBE_OFFSETS: &[(f64, f64)] = &[
    (0.25, 0.5),
    (0.75, 0.5),
    (0.5, 0.25),
    (0.5, 0.75),
    (0.15, 0.15),
    (0.85, 0.15),
    (0.15, 0.85),
    (0.85, 0.85),
];

pub enum StrategyOutcome {
    Completed {
        coordinates: Option<Point>,
        details: String,
    },
    NotApplicable(String),
    Failed(AutomationError),
}

/// Everything a tier may look at or use for one click.
pub struct ClickContext<'a> {
    pub element: &'a NativeHandle,
    pub kind: ClickKind,
    pub frame: Frame,
    pub actions: &'a [String],
    /// Raw coordinate target: click here instead of the element's center.
    pub point: Option<Point>,
    pub engine: &'a dyn AccessibilityEngine,
    pub input: &'a InputQueue,
    pub menus: &'a MenuNavigator,
}

#[async_trait]
pub trait ClickStrategy: Send + Sync {
    fn tier(&self) -> Tier;
    async fn attempt(&self, ctx: &ClickContext<'_>) -> StrategyOutcome;
}

/// The default chain, in order.
pub fn default_click_strategies() -> Vec<Box<dyn ClickStrategy>> {
    vec![
        Box::new(NativeActionStrategy),
        Box::new(SyntheticInputStrategy),
        Box::new(MenuPathStrategy),
        Box::new(OffsetProbeStrategy),
    ]
}

pub struct NativeActionStrategy;

#[async_trait]
impl ClickStrategy for NativeActionStrategy {
    fn tier(&self) -> Tier {
        Tier::NativeAction
    }

    async fn attempt(&self, ctx: &ClickContext<'_>) -> StrategyOutcome {
        let action = ctx.kind.native_action();
        if !ctx.actions.iter().any(|a| a == action) {
            return StrategyOutcome::NotApplicable(format!("{action} not advertised"));
        }
        match ctx.element.perform_action(action) {
            Ok(()) => StrategyOutcome::Completed {
                coordinates: None,
                details: format!("Performed {action}"),
            },
            Err(e) => StrategyOutcome::Failed(AutomationError::native(action, e)),
        }
    }
}

async fn synthesize(ctx: &ClickContext<'_>, at: Point) -> Result<(), AutomationError> {
    match ctx.kind {
        ClickKind::Single => ctx.input.click(at, MouseButton::Left).await,
        ClickKind::Double => ctx.input.double_click(at).await,
        ClickKind::Right => ctx.input.click(at, MouseButton::Right).await,
    }
}

/// True when the element under `point` is the target or lies inside it.
fn hits_target(ctx: &ClickContext<'_>, point: Point) -> Option<bool> {
    match ctx.engine.element_at_position(point) {
        Ok(hit) => Some(hit.is_within(ctx.element, MAX_ANCESTOR_HOPS)),
        Err(e) => {
            debug!("Hit-test at ({}, {}) failed: {}", point.x, point.y, e);
            None
        }
    }
}

pub struct SyntheticInputStrategy;

#[async_trait]
impl ClickStrategy for SyntheticInputStrategy {
    fn tier(&self) -> Tier {
        Tier::SyntheticInput
    }

    async fn attempt(&self, ctx: &ClickContext<'_>) -> StrategyOutcome {
        let (at, verify) = match ctx.point {
            Some(point) => (point, false),
            None if ctx.frame.is_degenerate() => {
                return StrategyOutcome::NotApplicable(
                    "zero-size frame, no usable position".to_string(),
                )
            }
            None => (ctx.frame.center(), true),
        };

        // An unverifiable hit-test still gets the click.
        if verify && hits_target(ctx, at) == Some(false) {
            return StrategyOutcome::NotApplicable(format!(
                "center ({}, {}) is covered by another element",
                at.x, at.y
            ));
        }

        match synthesize(ctx, at).await {
            Ok(()) => StrategyOutcome::Completed {
                coordinates: Some(at),
                details: format!("Synthesized {} at ({}, {})", ctx.kind, at.x, at.y),
            },
            Err(e) => StrategyOutcome::Failed(e),
        }
    }
}

pub struct OffsetProbeStrategy;

#[async_trait]
impl ClickStrategy for OffsetProbeStrategy {
    fn tier(&self) -> Tier {
        Tier::OffsetProbe
    }

    async fn attempt(&self, ctx: &ClickContext<'_>) -> StrategyOutcome {
        if ctx.point.is_some() {
            return StrategyOutcome::NotApplicable("explicit coordinate target".to_string());
        }
        if ctx.frame.is_degenerate() {
            return StrategyOutcome::NotApplicable(
                "zero-size frame, no usable position".to_string(),
            );
        }

        for (fx, fy) in PROBE_OFFSETS {
            let point = ctx.frame.offset(*fx, *fy);
            if hits_target(ctx, point) == Some(true) {
                return match synthesize(ctx, point).await {
                    Ok(()) => StrategyOutcome::Completed {
                        coordinates: Some(point),
                        details: format!(
                            "Synthesized {} at probed offset ({fx}, {fy})",
                            ctx.kind
                        ),
                    },
                    Err(e) => StrategyOutcome::Failed(e),
                };
            }
        }
        StrategyOutcome::Failed(AutomationError::UnsupportedOperation(
            "no interior point hit-tests to the element".to_string(),
        ))
    }
}

/// Zero-size menu items are activated by walking their title path from the menu bar.
pub struct MenuPathStrategy;

#[async_trait]
impl ClickStrategy for MenuPathStrategy {
    fn tier(&self) -> Tier {
        Tier::MenuPath
    }

    async fn attempt(&self, ctx: &ClickContext<'_>) -> StrategyOutcome {
        if ctx.point.is_some() || !ctx.frame.is_degenerate() {
            return StrategyOutcome::NotApplicable("element has usable geometry".to_string());
        }
        if ctx.kind != ClickKind::Single {
            return StrategyOutcome::NotApplicable(format!(
                "{} cannot be expressed as menu activation",
                ctx.kind
            ));
        }

        let Some(titles) = titles_to_menu_bar(ctx.element, MAX_ANCESTOR_HOPS) else {
            return StrategyOutcome::Failed(AutomationError::native(
                "zero-size element outside a menu bar",
                NativeError::ActionUnsupported,
            ));
        };
        let Some(app) = ctx.element.ancestor_with_role("AXApplication", MAX_ANCESTOR_HOPS) else {
            return StrategyOutcome::Failed(AutomationError::UnsupportedOperation(
                "menu item has no owning application".to_string(),
            ));
        };

        match ctx.menus.activate_titles(&app, &titles).await {
            Ok(activation) => StrategyOutcome::Completed {
                coordinates: None,
                details: format!("Activated menu path {}", activation.path.join(" > ")),
            },
            Err(e) => StrategyOutcome::Failed(e),
        }
    }
}
