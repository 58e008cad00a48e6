// src/x11/layer.rs
#![allow(non_snake_case)] // Allow non-snake case for X11 types

//! Stacking-order negotiation across the two WM protocol generations.
//!
//! The effective policy selects exactly one strategy: the legacy `_WIN_LAYER`
//! numeric hint, the modern `_NET_WM_STATE` message with one target state, or
//! nothing at all (a window manager with no stacking protocol is accepted
//! silently). All sends are asynchronous; nothing waits for acknowledgement.

use super::atoms::Atoms;
use super::connection::Connection;
use super::wm::{EffectivePolicy, WmCapabilities, WIN_LAYER_NORMAL};
use log::{debug, trace};
use std::mem;
use std::ptr;

use libc::{c_int, c_long, c_uchar, c_ulong};
use x11::xlib;

/// `_NET_WM_STATE` client-message actions.
pub const NET_WM_STATE_REMOVE: c_long = 0;
pub const NET_WM_STATE_ADD: c_long = 1;

/// The one protocol chosen for stacking requests on a screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerStrategy {
    /// Legacy GNOME numeric layering hint.
    Legacy,
    /// Modern state protocol, with the single target state atom to use.
    Netwm(xlib::Atom),
    /// No supported stacking protocol; requests become no-ops.
    NoOp,
}

/// Selects the stacking strategy once from the effective policy.
///
/// Legacy layering wins when effective; otherwise the modern state is chosen
/// by priority STAYS_ON_TOP > ABOVE > FULLSCREEN > BELOW. A policy where only
/// BELOW is supported does not occur in practice, but the ordering makes the
/// choice total anyway.
pub fn select_strategy(policy: &EffectivePolicy, atoms: &Atoms) -> LayerStrategy {
    if policy.caps.contains(WmCapabilities::LAYER) {
        LayerStrategy::Legacy
    } else if policy.caps.contains(WmCapabilities::STAYS_ON_TOP) {
        LayerStrategy::Netwm(atoms.net_wm_state_stays_on_top)
    } else if policy.caps.contains(WmCapabilities::ABOVE) {
        LayerStrategy::Netwm(atoms.net_wm_state_above)
    } else if policy.caps.contains(WmCapabilities::FULLSCREEN) {
        LayerStrategy::Netwm(atoms.net_wm_state_fullscreen)
    } else if policy.caps.contains(WmCapabilities::BELOW) {
        LayerStrategy::Netwm(atoms.net_wm_state_below)
    } else {
        LayerStrategy::NoOp
    }
}

/// Reads the window's current `_WIN_LAYER` value, defaulting to the normal
/// layer when the property is absent.
fn get_gnome_layer(connection: &Connection, atoms: &Atoms, window: xlib::Window) -> u64 {
    let mut actual_type: xlib::Atom = 0;
    let mut actual_format: c_int = 0;
    let mut nitems: c_ulong = 0;
    let mut bytes_after: c_ulong = 0;
    let mut prop: *mut c_uchar = ptr::null_mut();

    // SAFETY: display and window are valid; out-pointers reference locals.
    let status = unsafe {
        xlib::XGetWindowProperty(
            connection.display(),
            window,
            atoms.win_layer,
            0,
            16384,
            xlib::False,
            xlib::AnyPropertyType as xlib::Atom,
            &mut actual_type,
            &mut actual_format,
            &mut nitems,
            &mut bytes_after,
            &mut prop,
        )
    };

    let mut layer = WIN_LAYER_NORMAL;
    if status == xlib::Success as c_int && nitems > 0 && !prop.is_null() {
        // SAFETY: the property is a short per the legacy spec; read the first.
        layer = unsafe { *(prop as *const u16) } as u64;
        debug!("Original window layer is {}", layer);
    }
    if !prop.is_null() {
        // SAFETY: prop was allocated by Xlib.
        unsafe { xlib::XFree(prop as *mut _) };
    }
    layer
}

/// Sends one stacking request for the window, using whichever protocol the
/// policy made effective.
///
/// `elevate` true requests fullscreen-appropriate stacking; false requests
/// default stacking (the legacy path then restores the original layer, which
/// is captured lazily, at most once, before the first override).
pub fn request_layer(
    connection: &Connection,
    atoms: &Atoms,
    window: xlib::Window,
    policy: &EffectivePolicy,
    elevate: bool,
    original_layer: &mut Option<u64>,
) {
    match select_strategy(policy, atoms) {
        LayerStrategy::Legacy => {
            if original_layer.is_none() {
                *original_layer = Some(get_gnome_layer(connection, atoms, window));
            }
            let target = if elevate {
                policy.fs_layer
            } else {
                original_layer.unwrap_or(WIN_LAYER_NORMAL)
            };

            // SAFETY: composing and sending a client message; display, root
            // and window are valid, the struct is fully initialized.
            unsafe {
                let mut xev: xlib::XClientMessageEvent = mem::zeroed();
                xev.type_ = xlib::ClientMessage;
                xev.display = connection.display();
                xev.window = window;
                xev.message_type = atoms.win_layer;
                xev.format = 32;
                xev.data.set_long(0, target as c_long);
                xev.data.set_long(1, xlib::CurrentTime as c_long);
                debug!("Layered style stacking request (layer {})", target);
                xlib::XSendEvent(
                    connection.display(),
                    connection.root(),
                    xlib::False,
                    xlib::SubstructureNotifyMask,
                    &mut xev as *mut xlib::XClientMessageEvent as *mut xlib::XEvent,
                );
            }
        }
        LayerStrategy::Netwm(state_atom) => {
            // SAFETY: as above; one fully initialized client message.
            unsafe {
                let mut xev: xlib::XClientMessageEvent = mem::zeroed();
                xev.type_ = xlib::ClientMessage;
                xev.display = connection.display();
                xev.window = window;
                xev.message_type = atoms.net_wm_state;
                xev.format = 32;
                xev.data.set_long(
                    0,
                    if elevate {
                        NET_WM_STATE_ADD
                    } else {
                        NET_WM_STATE_REMOVE
                    },
                );
                xev.data.set_long(1, state_atom as c_long);
                debug!(
                    "NetWM style stacking request (elevate {}, state atom {})",
                    elevate, state_atom
                );
                xlib::XSendEvent(
                    connection.display(),
                    connection.root(),
                    xlib::False,
                    xlib::SubstructureRedirectMask,
                    &mut xev as *mut xlib::XClientMessageEvent as *mut xlib::XEvent,
                );
            }
        }
        LayerStrategy::NoOp => {
            trace!("No stacking protocol effective; layer request dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_atoms() -> Atoms {
        Atoms {
            net_supported: 100,
            net_wm_state: 101,
            net_wm_state_fullscreen: 102,
            net_wm_state_above: 103,
            net_wm_state_stays_on_top: 104,
            net_wm_state_below: 105,
            net_wm_pid: 106,
            win_protocols: 107,
            win_layer: 108,
            win_hints: 109,
            wm_protocols: 110,
            wm_delete_window: 111,
            motif_wm_hints: 112,
        }
    }

    fn policy(caps: WmCapabilities) -> EffectivePolicy {
        EffectivePolicy {
            caps,
            ..EffectivePolicy::default()
        }
    }

    #[test]
    fn legacy_layering_takes_precedence() {
        let atoms = fake_atoms();
        let p = policy(WmCapabilities::LAYER | WmCapabilities::FULLSCREEN);
        assert_eq!(select_strategy(&p, &atoms), LayerStrategy::Legacy);
    }

    #[test]
    fn stays_on_top_beats_above() {
        let atoms = fake_atoms();
        let p = policy(WmCapabilities::STAYS_ON_TOP | WmCapabilities::ABOVE);
        assert_eq!(
            select_strategy(&p, &atoms),
            LayerStrategy::Netwm(atoms.net_wm_state_stays_on_top)
        );
    }

    #[test]
    fn above_beats_fullscreen_beats_below() {
        let atoms = fake_atoms();
        let p = policy(WmCapabilities::ABOVE | WmCapabilities::FULLSCREEN | WmCapabilities::BELOW);
        assert_eq!(
            select_strategy(&p, &atoms),
            LayerStrategy::Netwm(atoms.net_wm_state_above)
        );
        let p = policy(WmCapabilities::FULLSCREEN | WmCapabilities::BELOW);
        assert_eq!(
            select_strategy(&p, &atoms),
            LayerStrategy::Netwm(atoms.net_wm_state_fullscreen)
        );
        let p = policy(WmCapabilities::BELOW);
        assert_eq!(
            select_strategy(&p, &atoms),
            LayerStrategy::Netwm(atoms.net_wm_state_below)
        );
    }

    #[test]
    fn empty_policy_is_a_no_op() {
        let atoms = fake_atoms();
        assert_eq!(
            select_strategy(&policy(WmCapabilities::empty()), &atoms),
            LayerStrategy::NoOp
        );
    }
}
