// src/x11/event.rs
#![allow(non_snake_case)] // Allow non-snake case for X11 types

//! Event pump for one eye's connection.
//!
//! Drains pending X events without blocking and translates them to
//! [`VoEvent`]s. Geometry is re-read from the server on ConfigureNotify
//! rather than trusted from the event, MapNotify lifts the fullscreen
//! transition guard, and pointer activity drives the cursor autohide
//! debounce.

use super::screen::ScreenState;
use crate::events::VoEvent;
use crate::keys::{KeySymbol, Modifiers, MouseButton};
use std::mem;
use std::time::{Duration, Instant};

use libc::{c_char, c_int, c_uint};
use x11::keysym;
use x11::xlib;

/// Pointer idle time before the cursor is hidden again.
const CURSOR_HIDE_DELAY: Duration = Duration::from_secs(1);

/// Converts an X11 modifier state mask to the abstract modifier set.
pub(super) fn modifiers_from_state(state: c_uint) -> Modifiers {
    let mut mods = Modifiers::empty();
    if state & xlib::ShiftMask != 0 {
        mods |= Modifiers::SHIFT;
    }
    if state & xlib::ControlMask != 0 {
        mods |= Modifiers::CONTROL;
    }
    if state & xlib::Mod1Mask != 0 {
        mods |= Modifiers::ALT;
    }
    if state & xlib::Mod4Mask != 0 {
        mods |= Modifiers::SUPER;
    }
    mods
}

/// Normalizes an X keysym (plus the looked-up text, for the printable
/// fallback) to the abstract key set.
pub(super) fn keysym_to_symbol(sym: xlib::KeySym, text: &str) -> KeySymbol {
    match sym as c_uint {
        keysym::XK_F1 => KeySymbol::F1,
        keysym::XK_F2 => KeySymbol::F2,
        keysym::XK_F3 => KeySymbol::F3,
        keysym::XK_F4 => KeySymbol::F4,
        keysym::XK_F5 => KeySymbol::F5,
        keysym::XK_F6 => KeySymbol::F6,
        keysym::XK_F7 => KeySymbol::F7,
        keysym::XK_F8 => KeySymbol::F8,
        keysym::XK_F9 => KeySymbol::F9,
        keysym::XK_F10 => KeySymbol::F10,
        keysym::XK_F11 => KeySymbol::F11,
        keysym::XK_F12 => KeySymbol::F12,

        keysym::XK_Left => KeySymbol::Left,
        keysym::XK_Right => KeySymbol::Right,
        keysym::XK_Up => KeySymbol::Up,
        keysym::XK_Down => KeySymbol::Down,
        keysym::XK_Page_Up => KeySymbol::PageUp,
        keysym::XK_Page_Down => KeySymbol::PageDown,
        keysym::XK_Home => KeySymbol::Home,
        keysym::XK_End => KeySymbol::End,
        keysym::XK_Insert => KeySymbol::Insert,
        keysym::XK_Delete => KeySymbol::Delete,

        keysym::XK_Return => KeySymbol::Enter,
        keysym::XK_BackSpace => KeySymbol::Backspace,
        keysym::XK_Tab => KeySymbol::Tab,
        keysym::XK_Escape => KeySymbol::Escape,

        keysym::XK_KP_0 | keysym::XK_KP_Insert => KeySymbol::Keypad0,
        keysym::XK_KP_1 | keysym::XK_KP_End => KeySymbol::Keypad1,
        keysym::XK_KP_2 | keysym::XK_KP_Down => KeySymbol::Keypad2,
        keysym::XK_KP_3 | keysym::XK_KP_Page_Down => KeySymbol::Keypad3,
        keysym::XK_KP_4 | keysym::XK_KP_Left => KeySymbol::Keypad4,
        keysym::XK_KP_5 | keysym::XK_KP_Begin => KeySymbol::Keypad5,
        keysym::XK_KP_6 | keysym::XK_KP_Right => KeySymbol::Keypad6,
        keysym::XK_KP_7 | keysym::XK_KP_Home => KeySymbol::Keypad7,
        keysym::XK_KP_8 | keysym::XK_KP_Up => KeySymbol::Keypad8,
        keysym::XK_KP_9 | keysym::XK_KP_Page_Up => KeySymbol::Keypad9,
        keysym::XK_KP_Enter => KeySymbol::KeypadEnter,
        keysym::XK_KP_Add => KeySymbol::KeypadPlus,
        keysym::XK_KP_Subtract => KeySymbol::KeypadMinus,
        keysym::XK_KP_Multiply => KeySymbol::KeypadMultiply,
        keysym::XK_KP_Divide => KeySymbol::KeypadDivide,
        keysym::XK_KP_Decimal | keysym::XK_KP_Delete => KeySymbol::KeypadDecimal,

        keysym::XK_Menu => KeySymbol::Menu,
        keysym::XF86XK_AudioPlay => KeySymbol::Play,
        keysym::XF86XK_AudioPause => KeySymbol::Pause,
        keysym::XF86XK_AudioStop => KeySymbol::Stop,
        keysym::XF86XK_AudioPrev => KeySymbol::Prev,
        keysym::XF86XK_AudioNext => KeySymbol::Next,
        keysym::XF86XK_AudioMute => KeySymbol::Mute,
        keysym::XF86XK_AudioLowerVolume => KeySymbol::VolumeDown,
        keysym::XF86XK_AudioRaiseVolume => KeySymbol::VolumeUp,

        _ => match text.chars().next() {
            Some(ch) if !ch.is_control() => KeySymbol::Char(ch),
            _ => KeySymbol::Unknown,
        },
    }
}

/// Drains this eye's pending events into `out`.
pub(super) fn pump(screen: &mut ScreenState, out: &mut Vec<VoEvent>) {
    let side = screen.side;

    // Hide-after-idle check runs once per pump, before the drain, so a quiet
    // pointer disappears even while other events keep arriving.
    if screen.mouse_autohide {
        if let Some(deadline) = screen.cursor_show_deadline {
            if Instant::now() >= deadline {
                screen.window().hide_cursor(screen.connection());
                screen.cursor_show_deadline = None;
            }
        }
    }

    loop {
        // SAFETY: Xlib FFI; XPending > 0 guarantees XNextEvent fills the
        // struct without blocking.
        let xev = unsafe {
            if xlib::XPending(screen.connection().display()) == 0 {
                break;
            }
            let mut xev: xlib::XEvent = mem::zeroed();
            xlib::XNextEvent(screen.connection().display(), &mut xev);
            xev
        };

        // SAFETY: each arm reads only the union field matching the checked
        // discriminant.
        unsafe {
            match xev.type_ {
                xlib::Expose => out.push(VoEvent::Expose { side }),
                xlib::ConfigureNotify => {
                    if screen.window().id() == 0 {
                        continue;
                    }
                    // The event's coordinates are parent-relative; ask the
                    // server for the authoritative root-relative geometry.
                    let rect = screen.window().query_geometry(screen.connection());
                    if screen.note_configure(rect) {
                        out.push(VoEvent::Resize {
                            side,
                            width: rect.width,
                            height: rect.height,
                        });
                    }
                }
                xlib::KeyPress => {
                    let mut key_event = xev.key;
                    let mut buf = [0 as c_char; 32];
                    let mut keysym: xlib::KeySym = 0;
                    let len = xlib::XLookupString(
                        &mut key_event,
                        buf.as_mut_ptr(),
                        buf.len() as c_int,
                        &mut keysym,
                        std::ptr::null_mut(),
                    );
                    let bytes: Vec<u8> = buf[..len.max(0) as usize]
                        .iter()
                        .map(|&c| c as u8)
                        .collect();
                    let text = String::from_utf8_lossy(&bytes);
                    out.push(VoEvent::Key {
                        side,
                        symbol: keysym_to_symbol(keysym, &text),
                        modifiers: modifiers_from_state(key_event.state),
                    });
                }
                xlib::MotionNotify => note_pointer_activity(screen),
                xlib::ButtonPress => {
                    note_pointer_activity(screen);
                    out.push(VoEvent::MouseButtonPress {
                        side,
                        button: MouseButton::from_x11(xev.button.button),
                    });
                }
                xlib::ButtonRelease => {
                    note_pointer_activity(screen);
                    out.push(VoEvent::MouseButtonRelease {
                        side,
                        button: MouseButton::from_x11(xev.button.button),
                    });
                }
                xlib::MapNotify => screen.note_mapped(),
                xlib::ClientMessage => {
                    let message = xev.client_message;
                    if message.message_type == screen.atoms().wm_protocols
                        && message.data.get_long(0) as xlib::Atom
                            == screen.atoms().wm_delete_window
                    {
                        out.push(VoEvent::CloseRequested { side });
                    }
                }
                _ => {}
            }
        }
    }
}

/// Pointer moved or clicked: show the cursor and restart the hide timer.
fn note_pointer_activity(screen: &mut ScreenState) {
    if !screen.mouse_autohide {
        return;
    }
    screen.window().show_cursor(screen.connection());
    screen.cursor_show_deadline = Some(Instant::now() + CURSOR_HIDE_DELAY);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_state_translation() {
        assert_eq!(modifiers_from_state(0), Modifiers::empty());
        assert_eq!(
            modifiers_from_state(xlib::ShiftMask | xlib::ControlMask),
            Modifiers::SHIFT | Modifiers::CONTROL
        );
        assert_eq!(modifiers_from_state(xlib::Mod1Mask), Modifiers::ALT);
        assert_eq!(modifiers_from_state(xlib::Mod4Mask), Modifiers::SUPER);
        // Lock and other mod bits are deliberately ignored.
        assert_eq!(modifiers_from_state(xlib::LockMask), Modifiers::empty());
    }

    #[test]
    fn named_keys_take_priority_over_lookup_text() {
        assert_eq!(
            keysym_to_symbol(keysym::XK_Escape as xlib::KeySym, "\u{1b}"),
            KeySymbol::Escape
        );
        assert_eq!(
            keysym_to_symbol(keysym::XK_Return as xlib::KeySym, "\r"),
            KeySymbol::Enter
        );
        assert_eq!(
            keysym_to_symbol(keysym::XK_F11 as xlib::KeySym, ""),
            KeySymbol::F11
        );
    }

    #[test]
    fn printable_keys_pass_through_as_chars() {
        assert_eq!(
            keysym_to_symbol(keysym::XK_q as xlib::KeySym, "q"),
            KeySymbol::Char('q')
        );
        assert_eq!(
            keysym_to_symbol(keysym::XK_space as xlib::KeySym, " "),
            KeySymbol::Char(' ')
        );
    }

    #[test]
    fn media_keys_map_to_playback_controls() {
        assert_eq!(
            keysym_to_symbol(keysym::XF86XK_AudioPlay as xlib::KeySym, ""),
            KeySymbol::Play
        );
        assert_eq!(
            keysym_to_symbol(keysym::XF86XK_AudioMute as xlib::KeySym, ""),
            KeySymbol::Mute
        );
    }

    #[test]
    fn unknown_keysyms_without_text_are_unknown() {
        assert_eq!(keysym_to_symbol(0, ""), KeySymbol::Unknown);
        // Control characters are not printable passthrough.
        assert_eq!(keysym_to_symbol(0, "\u{7}"), KeySymbol::Unknown);
    }
}
