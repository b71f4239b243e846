//! Low-level synthetic input: event types, the backend seam, and the serializing queue.

use crate::config::InteractionConfig;
use crate::element::Point;
use crate::errors::AutomationError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// One gate for the whole process: synthetic sequences from different services must never
/// interleave.
static INPUT_GATE: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseEventKind {
    Down,
    Up,
    Moved,
    Dragged,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Modifiers {
    pub command: bool,
    pub shift: bool,
    pub option: bool,
    pub control: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        command: false,
        shift: false,
        option: false,
        control: false,
    };

    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MouseEvent {
    pub kind: MouseEventKind,
    pub button: MouseButton,
    pub position: Point,
    pub click_count: u32,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamedKey {
    Return,
    Tab,
    Space,
    Delete,
    ForwardDelete,
    Escape,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    PageUp,
    PageDown,
    F(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Char(char),
    Named(NamedKey),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{c}"),
            Key::Named(named) => {
                let s = match named {
                    NamedKey::Return => "return",
                    NamedKey::Tab => "tab",
                    NamedKey::Space => "space",
                    NamedKey::Delete => "delete",
                    NamedKey::ForwardDelete => "forwarddelete",
                    NamedKey::Escape => "escape",
                    NamedKey::Left => "left",
                    NamedKey::Right => "right",
                    NamedKey::Up => "up",
                    NamedKey::Down => "down",
                    NamedKey::Home => "home",
                    NamedKey::End => "end",
                    NamedKey::PageUp => "pageup",
                    NamedKey::PageDown => "pagedown",
                    NamedKey::F(n) => return write!(f, "f{n}"),
                };
                f.write_str(s)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: Key,
    pub down: bool,
    pub modifiers: Modifiers,
}

/// Wheel deltas are in lines; positive `delta_y` scrolls up, positive `delta_x` left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollEvent {
    pub position: Point,
    pub delta_x: i32,
    pub delta_y: i32,
}

/// Anything a backend was asked to post, in order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    Mouse(MouseEvent),
    Key(KeyEvent),
    Scroll(ScrollEvent),
}

/// Posts raw events to the OS.
pub trait InputBackend: Send + Sync {
    fn post_mouse_event(&self, event: &MouseEvent) -> Result<(), AutomationError>;
    fn post_key_event(&self, event: &KeyEvent) -> Result<(), AutomationError>;
    fn post_scroll_event(&self, event: &ScrollEvent) -> Result<(), AutomationError>;
}

/// A parsed key combination such as `cmd+shift+s` or `return`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCombo {
    pub key: Key,
    pub modifiers: Modifiers,
}

impl KeyCombo {
    pub fn parse(input: &str) -> Result<Self, AutomationError> {
        let mut modifiers = Modifiers::NONE;
        let mut key = None;

        let parts: Vec<&str> = input.split('+').map(str::trim).collect();
        // `cmd++` means the plus key itself
        let parts: Vec<&str> = if input.trim_end().ends_with("++") {
            let mut p = parts[..parts.len().saturating_sub(2)].to_vec();
            p.push("+");
            p
        } else {
            parts
        };

        for part in parts {
            if part.is_empty() {
                return Err(AutomationError::InvalidArgument(format!(
                    "Empty key in combo '{input}'"
                )));
            }
            match part.to_ascii_lowercase().as_str() {
                "cmd" | "command" | "meta" | "super" => modifiers.command = true,
                "shift" => modifiers.shift = true,
                "alt" | "option" | "opt" => modifiers.option = true,
                "ctrl" | "control" => modifiers.control = true,
                other => {
                    if key.is_some() {
                        return Err(AutomationError::InvalidArgument(format!(
                            "Key combo '{input}' names more than one key"
                        )));
                    }
                    key = Some(parse_key(other, part).ok_or_else(|| {
                        AutomationError::InvalidArgument(format!(
                            "Unknown key '{part}' in combo '{input}'"
                        ))
                    })?);
                }
            }
        }

        let key = key.ok_or_else(|| {
            AutomationError::InvalidArgument(format!("Key combo '{input}' has no key"))
        })?;
        Ok(Self { key, modifiers })
    }
}

fn parse_key(lower: &str, original: &str) -> Option<Key> {
    let named = match lower {
        "return" | "enter" => NamedKey::Return,
        "tab" => NamedKey::Tab,
        "space" => NamedKey::Space,
        "delete" | "backspace" => NamedKey::Delete,
        "forwarddelete" | "del" => NamedKey::ForwardDelete,
        "escape" | "esc" => NamedKey::Escape,
        "left" => NamedKey::Left,
        "right" => NamedKey::Right,
        "up" => NamedKey::Up,
        "down" => NamedKey::Down,
        "home" => NamedKey::Home,
        "end" => NamedKey::End,
        "pageup" => NamedKey::PageUp,
        "pagedown" => NamedKey::PageDown,
        f if f.len() > 1 && f.starts_with('f') => match f[1..].parse::<u8>() {
            Ok(n) if (1..=20).contains(&n) => NamedKey::F(n),
            _ => return None,
        },
        _ => {
            let mut chars = original.chars();
            return match (chars.next(), chars.next()) {
                (Some(c), None) => Some(Key::Char(c)),
                _ => None,
            };
        }
    };
    Some(Key::Named(named))
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.command {
            f.write_str("cmd+")?;
        }
        if self.modifiers.control {
            f.write_str("ctrl+")?;
        }
        if self.modifiers.option {
            f.write_str("alt+")?;
        }
        if self.modifiers.shift {
            f.write_str("shift+")?;
        }
        write!(f, "{}", self.key)
    }
}

/// Serializes composite input sequences through the process-wide gate.
#[derive(Clone)]
pub struct InputQueue {
    backend: Arc<dyn InputBackend>,
    config: InteractionConfig,
}

impl InputQueue {
    pub fn new(backend: Arc<dyn InputBackend>, config: InteractionConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &Arc<dyn InputBackend> {
        &self.backend
    }

    fn mouse(
        &self,
        kind: MouseEventKind,
        button: MouseButton,
        position: Point,
        count: u32,
    ) -> Result<(), AutomationError> {
        self.backend.post_mouse_event(&MouseEvent {
            kind,
            button,
            position,
            click_count: count,
            modifiers: Modifiers::NONE,
        })
    }

    async fn settle(&self) {
        if self.config.pointer_settle_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.pointer_settle_ms)).await;
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn click(&self, position: Point, button: MouseButton) -> Result<(), AutomationError> {
        let _gate = INPUT_GATE.lock().await;
        self.mouse(MouseEventKind::Moved, MouseButton::Left, position, 0)?;
        self.settle().await;
        self.mouse(MouseEventKind::Down, button, position, 1)?;
        self.mouse(MouseEventKind::Up, button, position, 1)
    }

    /// Two down/up pairs; the second carries click-count 2.
    #[instrument(level = "debug", skip(self))]
    pub async fn double_click(&self, position: Point) -> Result<(), AutomationError> {
        let _gate = INPUT_GATE.lock().await;
        self.mouse(MouseEventKind::Moved, MouseButton::Left, position, 0)?;
        self.settle().await;
        self.mouse(MouseEventKind::Down, MouseButton::Left, position, 1)?;
        self.mouse(MouseEventKind::Up, MouseButton::Left, position, 1)?;
        tokio::time::sleep(Duration::from_millis(self.config.double_click_interval_ms)).await;
        self.mouse(MouseEventKind::Down, MouseButton::Left, position, 2)?;
        self.mouse(MouseEventKind::Up, MouseButton::Left, position, 2)
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn drag(&self, from: Point, to: Point) -> Result<(), AutomationError> {
        let _gate = INPUT_GATE.lock().await;
        let steps = self.config.drag_steps.max(1);
        let step_delay = Duration::from_millis(self.config.drag_step_delay_ms);

        self.mouse(MouseEventKind::Moved, MouseButton::Left, from, 0)?;
        self.mouse(MouseEventKind::Down, MouseButton::Left, from, 1)?;
        for i in 1..=steps {
            let t = f64::from(i) / f64::from(steps);
            let point = Point::new(from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t);
            self.mouse(MouseEventKind::Dragged, MouseButton::Left, point, 1)?;
            tokio::time::sleep(step_delay).await;
        }
        self.mouse(MouseEventKind::Up, MouseButton::Left, to, 1)
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn scroll(
        &self,
        position: Point,
        delta_x: i32,
        delta_y: i32,
    ) -> Result<(), AutomationError> {
        let _gate = INPUT_GATE.lock().await;
        self.mouse(MouseEventKind::Moved, MouseButton::Left, position, 0)?;
        self.backend.post_scroll_event(&ScrollEvent {
            position,
            delta_x,
            delta_y,
        })
    }

    /// One down/up per character with the configured inter-key delay.
    #[instrument(level = "debug", skip(self, text), fields(chars = text.chars().count()))]
    pub async fn type_text(&self, text: &str) -> Result<(), AutomationError> {
        let _gate = INPUT_GATE.lock().await;
        let interval = Duration::from_millis(self.config.key_interval_ms);
        for c in text.chars() {
            let key = match c {
                '\n' | '\r' => Key::Named(NamedKey::Return),
                '\t' => Key::Named(NamedKey::Tab),
                other => Key::Char(other),
            };
            self.key_pair(key, Modifiers::NONE)?;
            tokio::time::sleep(interval).await;
        }
        debug!("typed {} characters", text.chars().count());
        Ok(())
    }

    #[instrument(level = "debug", skip(self, combo), fields(combo = %combo))]
    pub async fn press(&self, combo: &KeyCombo) -> Result<(), AutomationError> {
        let _gate = INPUT_GATE.lock().await;
        self.key_pair(combo.key, combo.modifiers)
    }

    fn key_pair(&self, key: Key, modifiers: Modifiers) -> Result<(), AutomationError> {
        self.backend.post_key_event(&KeyEvent {
            key,
            down: true,
            modifiers,
        })?;
        self.backend.post_key_event(&KeyEvent {
            key,
            down: false,
            modifiers,
        })
    }
}
