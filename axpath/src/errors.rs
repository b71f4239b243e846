use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error codes reported by the native accessibility API (`AXError`).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NativeError {
    #[error("accessibility request failed")]
    Failure,
    #[error("illegal argument")]
    IllegalArgument,
    #[error("invalid UI element")]
    InvalidUIElement,
    #[error("invalid UI element observer")]
    InvalidUIElementObserver,
    #[error("request cannot complete")]
    CannotComplete,
    #[error("attribute unsupported")]
    AttributeUnsupported,
    #[error("action unsupported")]
    ActionUnsupported,
    #[error("notification unsupported")]
    NotificationUnsupported,
    #[error("not implemented")]
    NotImplemented,
    #[error("notification already registered")]
    NotificationAlreadyRegistered,
    #[error("notification not registered")]
    NotificationNotRegistered,
    #[error("accessibility API disabled")]
    APIDisabled,
    #[error("no value")]
    NoValue,
    #[error("parameterized attribute unsupported")]
    ParameterizedAttributeUnsupported,
    #[error("not enough precision")]
    NotEnoughPrecision,
    #[error("unknown accessibility error {0}")]
    Unknown(i32),
}

impl NativeError {
    /// Map a raw `AXError` value. `0` (success) maps to `None`.
    pub fn from_code(code: i32) -> Option<Self> {
        let err = match code {
            0 => return None,
            -25200 => Self::Failure,
            -25201 => Self::IllegalArgument,
            -25202 => Self::InvalidUIElement,
            -25203 => Self::InvalidUIElementObserver,
            -25204 => Self::CannotComplete,
            -25205 => Self::AttributeUnsupported,
            -25206 => Self::ActionUnsupported,
            -25207 => Self::NotificationUnsupported,
            -25208 => Self::NotImplemented,
            -25209 => Self::NotificationAlreadyRegistered,
            -25210 => Self::NotificationNotRegistered,
            -25211 => Self::APIDisabled,
            -25212 => Self::NoValue,
            -25213 => Self::ParameterizedAttributeUnsupported,
            -25214 => Self::NotEnoughPrecision,
            other => Self::Unknown(other),
        };
        Some(err)
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::Failure => -25200,
            Self::IllegalArgument => -25201,
            Self::InvalidUIElement => -25202,
            Self::InvalidUIElementObserver => -25203,
            Self::CannotComplete => -25204,
            Self::AttributeUnsupported => -25205,
            Self::ActionUnsupported => -25206,
            Self::NotificationUnsupported => -25207,
            Self::NotImplemented => -25208,
            Self::NotificationAlreadyRegistered => -25209,
            Self::NotificationNotRegistered => -25210,
            Self::APIDisabled => -25211,
            Self::NoValue => -25212,
            Self::ParameterizedAttributeUnsupported => -25213,
            Self::NotEnoughPrecision => -25214,
            Self::Unknown(code) => *code,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Failure => "kAXErrorFailure",
            Self::IllegalArgument => "kAXErrorIllegalArgument",
            Self::InvalidUIElement => "kAXErrorInvalidUIElement",
            Self::InvalidUIElementObserver => "kAXErrorInvalidUIElementObserver",
            Self::CannotComplete => "kAXErrorCannotComplete",
            Self::AttributeUnsupported => "kAXErrorAttributeUnsupported",
            Self::ActionUnsupported => "kAXErrorActionUnsupported",
            Self::NotificationUnsupported => "kAXErrorNotificationUnsupported",
            Self::NotImplemented => "kAXErrorNotImplemented",
            Self::NotificationAlreadyRegistered => "kAXErrorNotificationAlreadyRegistered",
            Self::NotificationNotRegistered => "kAXErrorNotificationNotRegistered",
            Self::APIDisabled => "kAXErrorAPIDisabled",
            Self::NoValue => "kAXErrorNoValue",
            Self::ParameterizedAttributeUnsupported => "kAXErrorParameterizedAttributeUnsupported",
            Self::NotEnoughPrecision => "kAXErrorNotEnoughPrecision",
            Self::Unknown(_) => "kAXErrorUnknown",
        }
    }

    /// The attribute simply has no value on this element.
    pub fn is_missing_value(&self) -> bool {
        matches!(self, Self::NoValue | Self::AttributeUnsupported)
    }

    /// Worth exactly one retry: the target application was busy.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::CannotComplete)
    }

    /// The referenced node no longer exists.
    pub fn is_invalid_element(&self) -> bool {
        matches!(self, Self::InvalidUIElement)
    }
}

/// Coarse classification surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Ambiguous,
    Unsupported,
    Invalid,
    Timeout,
    PermissionDenied,
    Platform,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Ambiguous => "ambiguous",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Invalid => "invalid",
            ErrorKind::Timeout => "timeout",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::Platform => "platform",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl From<NativeError> for ErrorKind {
    fn from(err: NativeError) -> Self {
        match err {
            NativeError::InvalidUIElement | NativeError::IllegalArgument => ErrorKind::Invalid,
            NativeError::AttributeUnsupported
            | NativeError::ActionUnsupported
            | NativeError::NotImplemented
            | NativeError::ParameterizedAttributeUnsupported => ErrorKind::Unsupported,
            NativeError::APIDisabled => ErrorKind::PermissionDenied,
            NativeError::NoValue => ErrorKind::NotFound,
            _ => ErrorKind::Platform,
        }
    }
}

/// One strategy in an interaction fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    NativeAction,
    SyntheticInput,
    MenuPath,
    OffsetProbe,
    SetValue,
    Keystrokes,
    ScrollAction,
    ScrollWheel,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::NativeAction => "native-action",
            Tier::SyntheticInput => "synthetic-input",
            Tier::MenuPath => "menu-path",
            Tier::OffsetProbe => "offset-probe",
            Tier::SetValue => "set-value",
            Tier::Keystrokes => "keystrokes",
            Tier::ScrollAction => "scroll-action",
            Tier::ScrollWheel => "scroll-wheel",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Skipped,
    Failed,
    Succeeded,
}

/// What happened when one tier was tried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierAttempt {
    pub tier: Tier,
    pub outcome: AttemptOutcome,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_name: Option<String>,
}

impl TierAttempt {
    pub fn skipped(tier: Tier, detail: impl Into<String>) -> Self {
        Self {
            tier,
            outcome: AttemptOutcome::Skipped,
            detail: detail.into(),
            native_code: None,
            native_name: None,
        }
    }

    pub fn failed(tier: Tier, error: &AutomationError) -> Self {
        let native = error.native_error();
        Self {
            tier,
            outcome: AttemptOutcome::Failed,
            detail: error.to_string(),
            native_code: native.map(|e| e.code()),
            native_name: native.map(|e| e.name().to_string()),
        }
    }

    pub fn succeeded(tier: Tier, detail: impl Into<String>) -> Self {
        Self {
            tier,
            outcome: AttemptOutcome::Succeeded,
            detail: detail.into(),
            native_code: None,
            native_name: None,
        }
    }
}

fn summarize_attempts(attempts: &[TierAttempt]) -> String {
    attempts
        .iter()
        .map(|a| match a.native_name.as_deref() {
            Some(name) => format!("{} ({}, {})", a.tier, a.detail, name),
            None => format!("{} ({})", a.tier, a.detail),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MenuError {
    #[error("Menu bar not found for application '{0}'")]
    MenuBarNotFound(String),

    #[error("Menu item not found: {0}")]
    MenuItemNotFound(String),

    #[error("Invalid menu path: {0}")]
    InvalidMenuPath(String),

    #[error("Timed out waiting for menu '{0}' to open")]
    TimeoutWaitingForMenu(String),
}

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("No element matches segment {segment_index} (`{segment}`) of {path}")]
    SegmentNotFound {
        path: String,
        segment_index: usize,
        segment: String,
    },

    #[error("Segment {segment_index} (`{segment}`) of {path} matches {matches} elements; add an index to disambiguate")]
    Ambiguous {
        path: String,
        segment_index: usize,
        segment: String,
        matches: usize,
    },

    #[error("Application not found: {0}")]
    ApplicationNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Element is no longer valid: {0}")]
    StaleElement(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Accessibility API error during {operation}: {source} ({})", .source.name())]
    Native {
        operation: String,
        #[source]
        source: NativeError,
    },

    #[error("{action} failed: {}", summarize_attempts(.attempts))]
    ActionFailed {
        action: String,
        kind: ErrorKind,
        attempts: Vec<TierAttempt>,
    },

    #[error(transparent)]
    Menu(#[from] MenuError),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AutomationError {
    pub fn native(operation: impl Into<String>, source: NativeError) -> Self {
        AutomationError::Native {
            operation: operation.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AutomationError::ElementNotFound(_)
            | AutomationError::SegmentNotFound { .. }
            | AutomationError::ApplicationNotFound(_) => ErrorKind::NotFound,
            AutomationError::Ambiguous { .. } => ErrorKind::Ambiguous,
            AutomationError::InvalidPath(_)
            | AutomationError::InvalidArgument(_)
            | AutomationError::StaleElement(_) => ErrorKind::Invalid,
            AutomationError::UnsupportedOperation(_) | AutomationError::UnsupportedPlatform(_) => {
                ErrorKind::Unsupported
            }
            AutomationError::Timeout(_) => ErrorKind::Timeout,
            AutomationError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            AutomationError::Native { source, .. } => ErrorKind::from(*source),
            AutomationError::ActionFailed { kind, .. } => *kind,
            AutomationError::Menu(menu) => match menu {
                MenuError::MenuBarNotFound(_) | MenuError::MenuItemNotFound(_) => {
                    ErrorKind::NotFound
                }
                MenuError::InvalidMenuPath(_) => ErrorKind::Invalid,
                MenuError::TimeoutWaitingForMenu(_) => ErrorKind::Timeout,
            },
            AutomationError::PlatformError(_) => ErrorKind::Platform,
            AutomationError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The underlying native error, if one caused this failure.
    pub fn native_error(&self) -> Option<NativeError> {
        match self {
            AutomationError::Native { source, .. } => Some(*source),
            AutomationError::ActionFailed { attempts, .. } => attempts
                .iter()
                .rev()
                .find_map(|a| a.native_code.and_then(NativeError::from_code)),
            _ => None,
        }
    }

    pub fn attempts(&self) -> &[TierAttempt] {
        match self {
            AutomationError::ActionFailed { attempts, .. } => attempts,
            _ => &[],
        }
    }

    pub fn context(&self) -> ErrorContext {
        let native = self.native_error();
        let segment_index = match self {
            AutomationError::SegmentNotFound { segment_index, .. }
            | AutomationError::Ambiguous { segment_index, .. } => Some(*segment_index),
            _ => None,
        };
        ErrorContext {
            native_code: native.map(|e| e.code()),
            native_name: native.map(|e| e.name().to_string()),
            segment_index,
            tiers: self.attempts().to_vec(),
        }
    }
}

/// Diagnostics attached to every surfaced error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tiers: Vec<TierAttempt>,
}
