// src/x11/wm.rs
#![allow(non_snake_case)] // Allow non-snake case for X11 types

//! Window-manager capability probing and fullscreen-type resolution.
//!
//! Two generations of stacking protocol are probed on the root window: the
//! legacy GNOME `_WIN_PROTOCOLS`/`_WIN_LAYER` layering hints, and the modern
//! NetWM `_NET_SUPPORTED` state list. The probed capability set is then
//! folded with the user's override tokens into the effective negotiation
//! policy.
//!
//! The reductions over advertised atom lists are pure functions so the
//! branching (including the Metacity workaround) is unit-testable without a
//! server.

use super::atoms::Atoms;
use super::connection::Connection;
use bitflags::bitflags;
use log::{debug, info};
use std::ptr;

use libc::{c_int, c_uchar, c_ulong};
use x11::xlib;

/// Legacy `_WIN_LAYER` stacking values we negotiate with.
pub const WIN_LAYER_NORMAL: u64 = 4;
pub const WIN_LAYER_ABOVE_DOCK: u64 = 10;

bitflags! {
    /// Support flags for window-manager stacking/fullscreen protocols.
    ///
    /// `LAYER` denotes the legacy layering protocol; the other four bits
    /// collectively denote modern state-protocol support.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
    pub struct WmCapabilities: u8 {
        const LAYER = 1 << 0;
        const FULLSCREEN = 1 << 1;
        const STAYS_ON_TOP = 1 << 2;
        const ABOVE = 1 << 3;
        const BELOW = 1 << 4;
        /// Union of the modern state-protocol bits.
        const NETWM = Self::FULLSCREEN.bits()
            | Self::STAYS_ON_TOP.bits()
            | Self::ABOVE.bits()
            | Self::BELOW.bits();
    }
}

/// The capability bitmask after the override fold, plus the effective legacy
/// layer number used by `_WIN_LAYER` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectivePolicy {
    pub caps: WmCapabilities,
    pub fs_layer: u64,
}

impl Default for EffectivePolicy {
    fn default() -> Self {
        EffectivePolicy {
            caps: WmCapabilities::empty(),
            fs_layer: WIN_LAYER_ABOVE_DOCK,
        }
    }
}

/// Reduces the legacy `_WIN_PROTOCOLS` advertisement to capability flags.
///
/// Metacity is the only known window manager that reports supporting *only*
/// the `_WIN_LAYER` hint here, and its support for it is broken; when that
/// exact pattern is observed the LAYER flag is cleared again.
pub fn reduce_win_protocols(advertised: &[xlib::Atom], win_layer_atom: xlib::Atom) -> WmCapabilities {
    let mut caps = WmCapabilities::empty();
    let mut hint_pattern = 0u8;
    for &atom in advertised {
        if atom == win_layer_atom {
            caps |= WmCapabilities::LAYER;
            hint_pattern |= 1;
        } else {
            hint_pattern |= 2;
        }
    }
    if caps.contains(WmCapabilities::LAYER) && hint_pattern == 1 {
        caps.remove(WmCapabilities::LAYER);
        info!("Using workaround for Metacity: layering advertised but broken.");
    }
    caps
}

/// Reduces the modern `_NET_SUPPORTED` advertisement to capability flags.
/// Unrecognized atoms are ignored.
pub fn reduce_net_supported(advertised: &[xlib::Atom], atoms: &Atoms) -> WmCapabilities {
    let mut caps = WmCapabilities::empty();
    for &atom in advertised {
        let flag = if atom == atoms.net_wm_state_fullscreen {
            WmCapabilities::FULLSCREEN
        } else if atom == atoms.net_wm_state_above {
            WmCapabilities::ABOVE
        } else if atom == atoms.net_wm_state_stays_on_top {
            WmCapabilities::STAYS_ON_TOP
        } else if atom == atoms.net_wm_state_below {
            WmCapabilities::BELOW
        } else {
            continue;
        };
        debug!("Detected wm supports {:?} state", flag);
        caps |= flag;
    }
    caps
}

/// Reads a root-window property as an atom list. Returns `None` when the
/// property is absent or empty; absence of either protocol advertisement is
/// normal, not an error.
fn get_root_atom_list(connection: &Connection, property: xlib::Atom) -> Option<Vec<xlib::Atom>> {
    let mut actual_type: xlib::Atom = 0;
    let mut actual_format: c_int = 0;
    let mut nitems: c_ulong = 0;
    let mut bytes_after: c_ulong = 0;
    let mut prop: *mut c_uchar = ptr::null_mut();

    // SAFETY: display and root are valid; all out-pointers reference locals.
    let status = unsafe {
        xlib::XGetWindowProperty(
            connection.display(),
            connection.root(),
            property,
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

    if status != xlib::Success as c_int || nitems == 0 || prop.is_null() {
        if !prop.is_null() {
            // SAFETY: prop was allocated by Xlib.
            unsafe { xlib::XFree(prop as *mut _) };
        }
        return None;
    }

    // SAFETY: a successful 32-bit format property read yields `nitems` longs
    // stored as the platform's c_ulong; Atom has the same representation.
    let atoms =
        unsafe { std::slice::from_raw_parts(prop as *const xlib::Atom, nitems as usize).to_vec() };
    // SAFETY: prop was allocated by Xlib.
    unsafe { xlib::XFree(prop as *mut _) };
    Some(atoms)
}

/// Probes the root window for both protocol generations and unions the
/// results. Degrades softly to the empty set when nothing is advertised.
///
/// Must not be called for externally embedded windows; negotiation is the
/// embedder's responsibility there.
pub fn detect_wm_caps(connection: &Connection, atoms: &Atoms) -> WmCapabilities {
    let mut caps = WmCapabilities::empty();

    if let Some(advertised) = get_root_atom_list(connection, atoms.win_protocols) {
        debug!("Detected wm supports legacy layering protocol.");
        caps |= reduce_win_protocols(&advertised, atoms.win_layer);
    }
    if let Some(advertised) = get_root_atom_list(connection, atoms.net_supported) {
        debug!("Detected wm supports NetWM.");
        caps |= reduce_net_supported(&advertised, atoms);
    }

    if caps.is_empty() {
        debug!("Unknown wm type: no stacking protocol advertised.");
    }
    caps
}

/// Resolves the effective negotiation policy from the probed capabilities and
/// the user's override token list.
///
/// A deterministic left fold: each token either forces a flag on, forces it
/// off (`-` prefix), or clears the whole set (`none`); folding continues past
/// a clear, so later tokens may re-add flags. Malformed numeric layer
/// specifiers leave the layer number unchanged. Unrecognized tokens are
/// ignored.
pub fn resolve_fs_type(probed: WmCapabilities, overrides: &[String]) -> EffectivePolicy {
    let mut policy = EffectivePolicy {
        caps: probed,
        ..EffectivePolicy::default()
    };

    for token in overrides {
        let (neg, arg) = match token.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, token.as_str()),
        };

        if let Some(rest) = arg.strip_prefix("layer") {
            if !neg {
                if let Some(num) = rest.strip_prefix('=') {
                    match num.parse::<u64>() {
                        Ok(layer) if layer <= 15 => policy.fs_layer = layer,
                        _ => {} // malformed layer number, keep the old value
                    }
                } else if !rest.is_empty() {
                    continue; // not "layer" or "layer=<n>"
                }
            } else if !rest.is_empty() && !rest.starts_with('=') {
                continue;
            }
            policy.caps.set(WmCapabilities::LAYER, !neg);
        } else if arg == "above" {
            policy.caps.set(WmCapabilities::ABOVE, !neg);
        } else if arg == "below" {
            policy.caps.set(WmCapabilities::BELOW, !neg);
        } else if arg == "fullscreen" {
            policy.caps.set(WmCapabilities::FULLSCREEN, !neg);
        } else if arg == "stays_on_top" {
            policy.caps.set(WmCapabilities::STAYS_ON_TOP, !neg);
        } else if arg == "netwm" {
            if neg {
                policy.caps.remove(WmCapabilities::NETWM);
            } else {
                policy.caps.insert(WmCapabilities::NETWM);
            }
        } else if arg == "none" {
            policy.caps = WmCapabilities::empty(); // clear; keep folding
        }
    }

    dump_policy(&policy);
    policy
}

/// Logs which stacking hints the resolved policy honours.
fn dump_policy(policy: &EffectivePolicy) {
    if policy.caps.is_empty() {
        debug!("Current fstype setting doesn't honour any X atoms");
        return;
    }
    let mut honoured = Vec::new();
    for (name, flag) in [
        ("LAYER", WmCapabilities::LAYER),
        ("FULLSCREEN", WmCapabilities::FULLSCREEN),
        ("STAYS_ON_TOP", WmCapabilities::STAYS_ON_TOP),
        ("ABOVE", WmCapabilities::ABOVE),
        ("BELOW", WmCapabilities::BELOW),
    ] {
        if policy.caps.contains(flag) {
            honoured.push(name);
        }
    }
    debug!(
        "Current fstype setting honours {} X atoms (layer {})",
        honoured.join(" "),
        policy.fs_layer
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_atoms() -> Atoms {
        // Arbitrary distinct atom values; probing logic only compares them.
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

    fn tokens(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test_log::test]
    fn metacity_workaround_clears_lone_layer_hint() {
        let atoms = fake_atoms();
        // Only _WIN_LAYER advertised: claims support, doesn't deliver.
        let caps = reduce_win_protocols(&[atoms.win_layer], atoms.win_layer);
        assert!(caps.is_empty());
    }

    #[test_log::test]
    fn layer_with_other_hints_is_trusted() {
        let atoms = fake_atoms();
        let caps = reduce_win_protocols(&[atoms.win_layer, 999], atoms.win_layer);
        assert_eq!(caps, WmCapabilities::LAYER);
    }

    #[test_log::test]
    fn other_hints_without_layer_yield_nothing() {
        let atoms = fake_atoms();
        let caps = reduce_win_protocols(&[998, 999], atoms.win_layer);
        assert!(caps.is_empty());
    }

    #[test_log::test]
    fn net_supported_maps_known_atoms_and_ignores_the_rest() {
        let atoms = fake_atoms();
        let caps = reduce_net_supported(
            &[atoms.net_wm_state_fullscreen, 777, atoms.net_wm_state_above],
            &atoms,
        );
        assert_eq!(caps, WmCapabilities::FULLSCREEN | WmCapabilities::ABOVE);
    }

    #[test_log::test]
    fn resolve_is_a_pure_left_fold() {
        let overrides = tokens(&["fullscreen", "-above", "layer=7", "stays_on_top"]);
        let probed = WmCapabilities::ABOVE | WmCapabilities::BELOW;
        let once = resolve_fs_type(probed, &overrides);
        let twice = resolve_fs_type(probed, &overrides);
        assert_eq!(once, twice);
        assert_eq!(
            once.caps,
            WmCapabilities::FULLSCREEN
                | WmCapabilities::BELOW
                | WmCapabilities::LAYER
                | WmCapabilities::STAYS_ON_TOP
        );
        assert_eq!(once.fs_layer, 7);
    }

    #[test_log::test]
    fn none_clears_but_folding_continues() {
        let probed = WmCapabilities::FULLSCREEN | WmCapabilities::LAYER;
        let policy = resolve_fs_type(probed, &tokens(&["none", "above"]));
        assert_eq!(policy.caps, WmCapabilities::ABOVE);
    }

    #[test_log::test]
    fn negation_removes_probed_flags() {
        let probed = WmCapabilities::FULLSCREEN | WmCapabilities::STAYS_ON_TOP;
        let policy = resolve_fs_type(probed, &tokens(&["-fullscreen"]));
        assert_eq!(policy.caps, WmCapabilities::STAYS_ON_TOP);
    }

    #[test_log::test]
    fn netwm_token_covers_all_modern_bits() {
        let policy = resolve_fs_type(WmCapabilities::empty(), &tokens(&["netwm"]));
        assert_eq!(policy.caps, WmCapabilities::NETWM);
        let policy = resolve_fs_type(WmCapabilities::NETWM | WmCapabilities::LAYER, &tokens(&["-netwm"]));
        assert_eq!(policy.caps, WmCapabilities::LAYER);
    }

    #[test_log::test]
    fn malformed_layer_number_is_ignored() {
        let policy = resolve_fs_type(WmCapabilities::empty(), &tokens(&["layer=99"]));
        assert_eq!(policy.fs_layer, WIN_LAYER_ABOVE_DOCK);
        // The layer flag itself still applies; only the number was malformed.
        assert!(policy.caps.contains(WmCapabilities::LAYER));

        let policy = resolve_fs_type(WmCapabilities::empty(), &tokens(&["layer=abc"]));
        assert_eq!(policy.fs_layer, WIN_LAYER_ABOVE_DOCK);
    }

    #[test_log::test]
    fn unrecognized_tokens_leave_the_fold_value_unchanged() {
        let probed = WmCapabilities::FULLSCREEN;
        let policy = resolve_fs_type(probed, &tokens(&["bogus", "layering"]));
        assert_eq!(policy.caps, probed);
    }
}
