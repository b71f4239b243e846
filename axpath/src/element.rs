//! Live native accessibility handles and the geometry they report.

use crate::errors::NativeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;

pub const ATTR_ROLE: &str = "AXRole";
pub const ATTR_SUBROLE: &str = "AXSubrole";
pub const ATTR_TITLE: &str = "AXTitle";
pub const ATTR_VALUE: &str = "AXValue";
pub const ATTR_DESCRIPTION: &str = "AXDescription";
pub const ATTR_IDENTIFIER: &str = "AXIdentifier";
pub const ATTR_FRAME: &str = "AXFrame";
pub const ATTR_POSITION: &str = "AXPosition";
pub const ATTR_SIZE: &str = "AXSize";
pub const ATTR_FOCUSED: &str = "AXFocused";
pub const ATTR_ENABLED: &str = "AXEnabled";
pub const ATTR_SELECTED: &str = "AXSelected";
pub const ATTR_EXPANDED: &str = "AXExpanded";
pub const ATTR_MENU_BAR: &str = "AXMenuBar";
pub const ATTR_CMD_CHAR: &str = "AXMenuItemCmdChar";
pub const ATTR_CMD_MODIFIERS: &str = "AXMenuItemCmdModifiers";

pub const ROLE_UNKNOWN: &str = "unknown";

/// A point in global screen coordinates (top-left origin).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Frame {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Frame {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_parts(origin: Point, size: Size) -> Self {
        Self::new(origin.x, origin.y, size.width, size.height)
    }

    /// Zero width or height. Menu-style controls frequently report this.
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, point: Point) -> bool {
        !self.is_degenerate()
            && point.x >= self.x
            && point.x < self.x + self.width
            && point.y >= self.y
            && point.y < self.y + self.height
    }

    /// A point at fractional offsets (0..1) inside the frame.
    pub fn offset(&self, fx: f64, fy: f64) -> Point {
        Point::new(self.x + self.width * fx, self.y + self.height * fy)
    }
}

/// A decoded attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Number(f64),
    String(String),
    Point(Point),
    Size(Size),
    Frame(Frame),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            AttributeValue::Number(n) => Some(*n != 0.0),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            AttributeValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Textual form used by path predicates.
    pub fn to_text(&self) -> String {
        match self {
            AttributeValue::Bool(b) => b.to_string(),
            AttributeValue::Number(n) if n.fract() == 0.0 => format!("{}", *n as i64),
            AttributeValue::Number(n) => n.to_string(),
            AttributeValue::String(s) => s.clone(),
            AttributeValue::Point(p) => format!("{},{}", p.x, p.y),
            AttributeValue::Size(s) => format!("{}x{}", s.width, s.height),
            AttributeValue::Frame(f) => format!("{},{},{}x{}", f.x, f.y, f.width, f.height),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        AttributeValue::Number(n)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

/// Interface for platform-specific native element implementations
pub trait NativeElementImpl: Send + Sync + Debug {
    /// Opaque address, stable for the lifetime of the native node.
    fn address(&self) -> usize;
    /// `Ok(None)` when the element does not carry the attribute.
    fn attribute(&self, name: &str) -> Result<Option<AttributeValue>, NativeError>;
    fn element_attribute(&self, name: &str) -> Result<Option<NativeHandle>, NativeError>;
    fn children(&self) -> Result<Vec<NativeHandle>, NativeError>;
    fn parent(&self) -> Result<Option<NativeHandle>, NativeError>;
    fn action_names(&self) -> Result<Vec<String>, NativeError>;
    fn perform_action(&self, action: &str) -> Result<(), NativeError>;
    fn set_attribute(&self, name: &str, value: AttributeValue) -> Result<(), NativeError>;
    fn process_id(&self) -> Result<i32, NativeError>;
    fn same_element(&self, other: &dyn NativeElementImpl) -> bool;
    fn as_any(&self) -> &dyn std::any::Any;
}

/// A reference to a live accessibility node.
///
/// Valid only while the underlying control exists; every accessor can fail with
/// [`NativeError::InvalidUIElement`] once it is gone.
#[derive(Clone)]
pub struct NativeHandle {
    inner: Arc<dyn NativeElementImpl>,
}

impl Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl PartialEq for NativeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.same_element(other.inner.as_ref())
    }
}

impl NativeHandle {
    pub fn new(inner: impl NativeElementImpl + 'static) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn as_impl(&self) -> &dyn NativeElementImpl {
        self.inner.as_ref()
    }

    pub fn address(&self) -> usize {
        self.inner.address()
    }

    pub fn attribute(&self, name: &str) -> Result<Option<AttributeValue>, NativeError> {
        match self.inner.attribute(name) {
            Err(e) if e.is_missing_value() => Ok(None),
            other => other,
        }
    }

    pub fn string_attribute(&self, name: &str) -> Result<Option<String>, NativeError> {
        Ok(self.attribute(name)?.map(|v| match v {
            AttributeValue::String(s) => s,
            other => other.to_text(),
        }))
    }

    pub fn bool_attribute(&self, name: &str) -> Result<Option<bool>, NativeError> {
        Ok(self.attribute(name)?.and_then(|v| v.as_bool()))
    }

    pub fn role(&self) -> Result<String, NativeError> {
        Ok(self
            .string_attribute(ATTR_ROLE)?
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| ROLE_UNKNOWN.to_string()))
    }

    pub fn title(&self) -> Result<Option<String>, NativeError> {
        self.string_attribute(ATTR_TITLE)
    }

    /// Explicit `AXFrame`, else `AXPosition` + `AXSize`, else zero.
    pub fn frame(&self) -> Result<Frame, NativeError> {
        if let Some(AttributeValue::Frame(frame)) = self.attribute(ATTR_FRAME)? {
            return Ok(frame);
        }
        let position = match self.attribute(ATTR_POSITION)? {
            Some(AttributeValue::Point(p)) => Some(p),
            _ => None,
        };
        let size = match self.attribute(ATTR_SIZE)? {
            Some(AttributeValue::Size(s)) => Some(s),
            _ => None,
        };
        match (position, size) {
            (Some(p), Some(s)) => Ok(Frame::from_parts(p, s)),
            _ => Ok(Frame::default()),
        }
    }

    pub fn element_attribute(&self, name: &str) -> Result<Option<NativeHandle>, NativeError> {
        match self.inner.element_attribute(name) {
            Err(e) if e.is_missing_value() => Ok(None),
            other => other,
        }
    }

    pub fn children(&self) -> Result<Vec<NativeHandle>, NativeError> {
        match self.inner.children() {
            Err(e) if e.is_missing_value() => Ok(Vec::new()),
            other => other,
        }
    }

    pub fn parent(&self) -> Result<Option<NativeHandle>, NativeError> {
        match self.inner.parent() {
            Err(e) if e.is_missing_value() => Ok(None),
            other => other,
        }
    }

    pub fn action_names(&self) -> Result<Vec<String>, NativeError> {
        match self.inner.action_names() {
            Err(e) if e.is_missing_value() => Ok(Vec::new()),
            other => other,
        }
    }

    pub fn supports_action(&self, action: &str) -> Result<bool, NativeError> {
        Ok(self.action_names()?.iter().any(|a| a == action))
    }

    pub fn perform_action(&self, action: &str) -> Result<(), NativeError> {
        self.inner.perform_action(action)
    }

    pub fn set_attribute(&self, name: &str, value: AttributeValue) -> Result<(), NativeError> {
        self.inner.set_attribute(name, value)
    }

    pub fn process_id(&self) -> Result<i32, NativeError> {
        self.inner.process_id()
    }

    /// Cheap liveness probe: a single role read.
    pub fn is_alive(&self) -> bool {
        match self.inner.attribute(ATTR_ROLE) {
            Ok(_) => true,
            Err(e) => !e.is_invalid_element() && e.is_missing_value(),
        }
    }

    /// Walk parents until an element with `role` is found (self included).
    pub fn ancestor_with_role(&self, role: &str, max_hops: usize) -> Option<NativeHandle> {
        let mut current = Some(self.clone());
        for _ in 0..=max_hops {
            let node = current?;
            if node.role().ok().as_deref() == Some(role) {
                return Some(node);
            }
            current = node.parent().ok().flatten();
        }
        None
    }

    /// True when `self` is `other` or one of its descendants.
    pub fn is_within(&self, other: &NativeHandle, max_hops: usize) -> bool {
        let mut current = Some(self.clone());
        for _ in 0..=max_hops {
            match current {
                Some(node) if &node == other => return true,
                Some(node) => current = node.parent().ok().flatten(),
                None => return false,
            }
        }
        false
    }
}
