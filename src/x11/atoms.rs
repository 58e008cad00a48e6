// src/x11/atoms.rs
#![allow(non_snake_case)] // Allow non-snake case for X11 types

//! Interned wire atoms for window-manager negotiation.
//!
//! Names follow the freedesktop NetWM hint spec and the legacy GNOME
//! window-layering spec exactly; interoperability depends on the strings
//! matching byte for byte.

use super::connection::Connection;
use anyhow::Result;
use log::trace;

use libc::c_char;
use x11::xlib;

/// All atoms the negotiation core needs, interned once per connection.
#[derive(Debug, Clone, Copy)]
pub struct Atoms {
    /// `_NET_SUPPORTED` on the root window lists the modern state atoms.
    pub net_supported: xlib::Atom,
    /// `_NET_WM_STATE` client-message type.
    pub net_wm_state: xlib::Atom,
    pub net_wm_state_fullscreen: xlib::Atom,
    pub net_wm_state_above: xlib::Atom,
    pub net_wm_state_stays_on_top: xlib::Atom,
    pub net_wm_state_below: xlib::Atom,
    /// `_NET_WM_PID`, advertised on our windows for the WM's benefit.
    pub net_wm_pid: xlib::Atom,
    /// `_WIN_PROTOCOLS` on the root window marks legacy layering support.
    pub win_protocols: xlib::Atom,
    /// `_WIN_LAYER`, the legacy numeric stacking hint.
    pub win_layer: xlib::Atom,
    pub win_hints: xlib::Atom,
    pub wm_protocols: xlib::Atom,
    pub wm_delete_window: xlib::Atom,
    /// `_MOTIF_WM_HINTS`, used for decoration control.
    pub motif_wm_hints: xlib::Atom,
}

impl Atoms {
    /// Interns every negotiation atom on the given connection.
    pub fn new(connection: &Connection) -> Result<Self> {
        let display = connection.display();
        // XInternAtom with only_if_exists = False always returns a valid
        // atom, creating it server-side if needed.
        let intern = |name: &[u8]| -> xlib::Atom {
            // SAFETY: `display` is valid for the life of `connection`; `name`
            // is a NUL-terminated byte literal.
            unsafe { xlib::XInternAtom(display, name.as_ptr() as *const c_char, xlib::False) }
        };

        let atoms = Atoms {
            net_supported: intern(b"_NET_SUPPORTED\0"),
            net_wm_state: intern(b"_NET_WM_STATE\0"),
            net_wm_state_fullscreen: intern(b"_NET_WM_STATE_FULLSCREEN\0"),
            net_wm_state_above: intern(b"_NET_WM_STATE_ABOVE\0"),
            net_wm_state_stays_on_top: intern(b"_NET_WM_STATE_STAYS_ON_TOP\0"),
            net_wm_state_below: intern(b"_NET_WM_STATE_BELOW\0"),
            net_wm_pid: intern(b"_NET_WM_PID\0"),
            win_protocols: intern(b"_WIN_PROTOCOLS\0"),
            win_layer: intern(b"_WIN_LAYER\0"),
            win_hints: intern(b"_WIN_HINTS\0"),
            wm_protocols: intern(b"WM_PROTOCOLS\0"),
            wm_delete_window: intern(b"WM_DELETE_WINDOW\0"),
            motif_wm_hints: intern(b"_MOTIF_WM_HINTS\0"),
        };
        trace!("Interned WM negotiation atoms on display {:p}", display);
        Ok(atoms)
    }
}
