// src/keys.rs

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Represents a keyboard modifier.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Modifiers: u8 {
        const SHIFT = 1 << 0;
        const CONTROL = 1 << 1;
        const ALT = 1 << 2;
        const SUPER = 1 << 3;
    }
}

/// Abstract key representation handed upward to the caller.
///
/// Raw platform keysyms never leave this crate; the event pump normalizes
/// everything a playback frontend cares about into this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum KeySymbol {
    /// Printable character, already filtered to the passthrough set.
    Char(char),

    // Function keys
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,

    // Navigation block
    Left,
    Right,
    Up,
    Down,
    PageUp,
    PageDown,
    Home,
    End,
    Insert,
    Delete,

    // Editing / control
    Enter,
    Backspace,
    Tab,
    Escape,

    // Keypad
    Keypad0,
    Keypad1,
    Keypad2,
    Keypad3,
    Keypad4,
    Keypad5,
    Keypad6,
    Keypad7,
    Keypad8,
    Keypad9,
    KeypadEnter,
    KeypadPlus,
    KeypadMinus,
    KeypadMultiply,
    KeypadDivide,
    KeypadDecimal,

    // Multimedia keys (XF86 keysyms on X11)
    Menu,
    Play,
    Pause,
    Stop,
    Prev,
    Next,
    Mute,
    VolumeDown,
    VolumeUp,

    /// Unidentified key.
    #[default]
    Unknown,
}

/// Represents mouse buttons, numbered the X11 way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    ScrollUp,
    ScrollDown,
    /// Buttons beyond the standard five, by raw index.
    Other(u8),
}

impl MouseButton {
    /// Maps a raw X11 button index (1-based) to the abstract button.
    pub fn from_x11(button: u32) -> Self {
        match button {
            1 => MouseButton::Left,
            2 => MouseButton::Middle,
            3 => MouseButton::Right,
            4 => MouseButton::ScrollUp,
            5 => MouseButton::ScrollDown,
            other => MouseButton::Other(other.min(u8::MAX as u32) as u8),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mouse_button_mapping_covers_standard_buttons() {
        assert_eq!(MouseButton::from_x11(1), MouseButton::Left);
        assert_eq!(MouseButton::from_x11(3), MouseButton::Right);
        assert_eq!(MouseButton::from_x11(5), MouseButton::ScrollDown);
        assert_eq!(MouseButton::from_x11(8), MouseButton::Other(8));
    }
}
