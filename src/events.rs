// src/events.rs

//! Upward notifications emitted by the backend.
//!
//! These are consumed by the playback frontend; they carry no Xlib types.

use crate::keys::{KeySymbol, Modifiers, MouseButton};
use crate::x11::screen::Side;

/// An event originating from one eye's display connection.
#[derive(Debug, Clone, PartialEq)]
pub enum VoEvent {
    /// The window's backing area needs to be repainted.
    Expose { side: Side },
    /// The window manager granted (or imposed) a new geometry.
    ///
    /// This is the sole source of truth for the externally visible display
    /// size; requested geometry is never reported directly.
    Resize {
        side: Side,
        width: u32,
        height: u32,
    },
    /// A keyboard key was pressed, normalized to the abstract key set.
    Key {
        side: Side,
        symbol: KeySymbol,
        modifiers: Modifiers,
    },
    /// A mouse button went down.
    MouseButtonPress { side: Side, button: MouseButton },
    /// A mouse button was released.
    MouseButtonRelease { side: Side, button: MouseButton },
    /// The window manager asked us to close (WM_DELETE_WINDOW).
    CloseRequested { side: Side },
}
