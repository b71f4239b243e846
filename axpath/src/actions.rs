//! JSON request/response surface for the service.

use crate::element::Point;
use crate::errors::{AutomationError, ErrorContext, ErrorKind};
use crate::interaction::{ActionResult, ScrollDirection, Target};
use crate::path::ElementPath;
use serde::{Deserialize, Serialize};

/// Path string or raw screen coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetSpec {
    Path { path: String },
    Position { x: f64, y: f64 },
}

impl TargetSpec {
    pub fn to_target(&self) -> Result<Target, AutomationError> {
        match self {
            TargetSpec::Path { path } => Ok(Target::Path(ElementPath::parse(path)?)),
            TargetSpec::Position { x, y } => Ok(Target::Position(Point::new(*x, *y))),
        }
    }
}

fn default_scroll_amount() -> f64 {
    0.5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionRequest {
    Click {
        target: TargetSpec,
    },
    DoubleClick {
        target: TargetSpec,
    },
    RightClick {
        target: TargetSpec,
    },
    TypeText {
        target: TargetSpec,
        text: String,
    },
    Scroll {
        target: TargetSpec,
        direction: ScrollDirection,
        #[serde(default = "default_scroll_amount")]
        amount: f64,
    },
    Drag {
        from: TargetSpec,
        to: TargetSpec,
    },
    PressKey {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<TargetSpec>,
        key: String,
    },
    PerformAction {
        target: TargetSpec,
        name: String,
    },
    ActivateMenu {
        application: String,
        path: String,
    },
}

impl ActionRequest {
    pub fn name(&self) -> &'static str {
        match self {
            ActionRequest::Click { .. } => "click",
            ActionRequest::DoubleClick { .. } => "double_click",
            ActionRequest::RightClick { .. } => "right_click",
            ActionRequest::TypeText { .. } => "type_text",
            ActionRequest::Scroll { .. } => "scroll",
            ActionRequest::Drag { .. } => "drag",
            ActionRequest::PressKey { .. } => "press_key",
            ActionRequest::PerformAction { .. } => "perform_action",
            ActionRequest::ActivateMenu { .. } => "activate_menu",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default)]
    pub context: ErrorContext,
}

impl From<&AutomationError> for ErrorPayload {
    fn from(error: &AutomationError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            context: error.context(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ActionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl ActionResponse {
    pub fn ok(result: ActionResult) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(error: &AutomationError) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(ErrorPayload::from(error)),
        }
    }
}

impl From<Result<ActionResult, AutomationError>> for ActionResponse {
    fn from(result: Result<ActionResult, AutomationError>) -> Self {
        match result {
            Ok(r) => ActionResponse::ok(r),
            Err(e) => ActionResponse::failed(&e),
        }
    }
}
