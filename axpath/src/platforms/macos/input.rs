use crate::errors::AutomationError;
use crate::input::{
    InputBackend, Key, KeyEvent, Modifiers, MouseButton, MouseEvent, MouseEventKind, NamedKey,
    ScrollEvent,
};
use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTapLocation, CGEventType, CGKeyCode, CGMouseButton, EventField,
    ScrollEventUnit,
};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use core_graphics::geometry::CGPoint;

/// Posts events at the HID tap. A fresh event source is created per event.
pub struct CGEventInput;

impl CGEventInput {
    pub fn new() -> Result<Self, AutomationError> {
        source()?;
        Ok(Self)
    }
}

fn source() -> Result<CGEventSource, AutomationError> {
    CGEventSource::new(CGEventSourceStateID::HIDSystemState).map_err(|_| {
        AutomationError::PlatformError("Failed to create CGEventSource".to_string())
    })
}

fn flags(modifiers: &Modifiers) -> CGEventFlags {
    let mut flags = CGEventFlags::CGEventFlagNull;
    if modifiers.command {
        flags |= CGEventFlags::CGEventFlagCommand;
    }
    if modifiers.shift {
        flags |= CGEventFlags::CGEventFlagShift;
    }
    if modifiers.option {
        flags |= CGEventFlags::CGEventFlagAlternate;
    }
    if modifiers.control {
        flags |= CGEventFlags::CGEventFlagControl;
    }
    flags
}

fn mouse_type(kind: MouseEventKind, button: MouseButton) -> CGEventType {
    match (kind, button) {
        (MouseEventKind::Down, MouseButton::Left) => CGEventType::LeftMouseDown,
        (MouseEventKind::Up, MouseButton::Left) => CGEventType::LeftMouseUp,
        (MouseEventKind::Down, MouseButton::Right) => CGEventType::RightMouseDown,
        (MouseEventKind::Up, MouseButton::Right) => CGEventType::RightMouseUp,
        (MouseEventKind::Dragged, MouseButton::Left) => CGEventType::LeftMouseDragged,
        (MouseEventKind::Dragged, MouseButton::Right) => CGEventType::RightMouseDragged,
        (MouseEventKind::Moved, _) => CGEventType::MouseMoved,
    }
}

/// ANSI virtual key codes.
fn named_keycode(key: NamedKey) -> Option<CGKeyCode> {
    let code = match key {
        NamedKey::Return => 36,
        NamedKey::Tab => 48,
        NamedKey::Space => 49,
        NamedKey::Delete => 51,
        NamedKey::Escape => 53,
        NamedKey::ForwardDelete => 117,
        NamedKey::Home => 115,
        NamedKey::PageUp => 116,
        NamedKey::End => 119,
        NamedKey::PageDown => 121,
        NamedKey::Left => 123,
        NamedKey::Right => 124,
        NamedKey::Down => 125,
        NamedKey::Up => 126,
        NamedKey::F(n) => match n {
            1 => 122,
            2 => 120,
            3 => 99,
            4 => 118,
            5 => 96,
            6 => 97,
            7 => 98,
            8 => 100,
            9 => 101,
            10 => 109,
            11 => 103,
            12 => 111,
            _ => return None,
        },
    };
    Some(code)
}

fn char_keycode(c: char) -> Option<CGKeyCode> {
    let code = match c.to_ascii_lowercase() {
        'a' => 0,
        's' => 1,
        'd' => 2,
        'f' => 3,
        'h' => 4,
        'g' => 5,
        'z' => 6,
        'x' => 7,
        'c' => 8,
        'v' => 9,
        'b' => 11,
        'q' => 12,
        'w' => 13,
        'e' => 14,
        'r' => 15,
        'y' => 16,
        't' => 17,
        '1' => 18,
        '2' => 19,
        '3' => 20,
        '4' => 21,
        '6' => 22,
        '5' => 23,
        '=' => 24,
        '9' => 25,
        '7' => 26,
        '-' => 27,
        '8' => 28,
        '0' => 29,
        ']' => 30,
        'o' => 31,
        'u' => 32,
        '[' => 33,
        'i' => 34,
        'p' => 35,
        'l' => 37,
        'j' => 38,
        '\'' => 39,
        'k' => 40,
        ';' => 41,
        '\\' => 42,
        ',' => 43,
        '/' => 44,
        'n' => 45,
        'm' => 46,
        '.' => 47,
        '`' => 50,
        _ => return None,
    };
    Some(code)
}

fn post(event: Result<CGEvent, ()>, what: &str) -> Result<(), AutomationError> {
    let event = event
        .map_err(|_| AutomationError::PlatformError(format!("Failed to create {what} event")))?;
    event.post(CGEventTapLocation::HID);
    Ok(())
}

impl InputBackend for CGEventInput {
    fn post_mouse_event(&self, event: &MouseEvent) -> Result<(), AutomationError> {
        let button = match event.button {
            MouseButton::Left => CGMouseButton::Left,
            MouseButton::Right => CGMouseButton::Right,
        };
        let cg = CGEvent::new_mouse_event(
            source()?,
            mouse_type(event.kind, event.button),
            CGPoint::new(event.position.x, event.position.y),
            button,
        );
        if let Ok(cg) = &cg {
            if event.click_count > 0 {
                cg.set_integer_value_field(
                    EventField::MOUSE_EVENT_CLICK_STATE,
                    i64::from(event.click_count),
                );
            }
            if !event.modifiers.is_empty() {
                cg.set_flags(flags(&event.modifiers));
            }
        }
        post(cg, "mouse")
    }

    fn post_key_event(&self, event: &KeyEvent) -> Result<(), AutomationError> {
        let (code, text) = match event.key {
            Key::Named(named) => (
                named_keycode(named).ok_or_else(|| {
                    AutomationError::InvalidArgument(format!("No key code for {}", event.key))
                })?,
                None,
            ),
            // Unmapped characters go through as unicode text on key code 0.
            Key::Char(c) => match char_keycode(c) {
                Some(code) if !c.is_ascii_uppercase() => (code, None),
                Some(code) => (code, Some(c)),
                None => (0, Some(c)),
            },
        };
        let cg = CGEvent::new_keyboard_event(source()?, code, event.down);
        if let Ok(cg) = &cg {
            if let Some(c) = text {
                cg.set_string(&c.to_string());
            }
            cg.set_flags(flags(&event.modifiers));
        }
        post(cg, "keyboard")
    }

    fn post_scroll_event(&self, event: &ScrollEvent) -> Result<(), AutomationError> {
        let cg = CGEvent::new_scroll_event(
            source()?,
            ScrollEventUnit::LINE,
            2,
            event.delta_y,
            event.delta_x,
            0,
        );
        if let Ok(cg) = &cg {
            cg.set_location(CGPoint::new(event.position.x, event.position.y));
        }
        post(cg, "scroll")
    }
}
