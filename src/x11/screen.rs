// src/x11/screen.rs
#![allow(non_snake_case)] // Allow non-snake case for X11 types

//! Per-eye screen state and the fullscreen transition state machine.
//!
//! Each eye owns one [`ScreenState`]: its connection, its window, the probed
//! and resolved WM policy, and the fullscreen bookkeeping. The transition
//! itself is split into a pure [`plan_transition`] step, so the geometry
//! snapshot/restore and remap decisions are testable without a server, and an
//! `execute` step that performs the Xlib calls in a fixed order.

use super::atoms::Atoms;
use super::colormap::ColorRamp;
use super::connection::{install_error_logger, Connection};
use super::layer::request_layer;
use super::window::{full_event_mask, ScreenWindow};
use super::wm::{detect_wm_caps, resolve_fs_type, EffectivePolicy, WmCapabilities};
use crate::config::WindowConfig;
use crate::geometry::{eye_fullscreen_rect, pick_output, Rect};
use anyhow::Result;
use log::{debug, info, trace, warn};
use std::time::{Duration, Instant};

use x11::xinerama;
use x11::xlib;

/// Minimum interval between screensaver heartbeats.
const SCREENSAVER_INTERVAL: Duration = Duration::from_secs(30);

/// Which eye of the stereoscopic pair a screen drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// The environment variable naming this eye's display.
    pub fn env_var(self) -> &'static str {
        match self {
            Side::Left => "DISPLAYL",
            Side::Right => "DISPLAYR",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

/// Per-screen in-flight marker for fullscreen transitions.
///
/// Armed when a transition is initiated, disarmed when the server confirms
/// it (the window's MapNotify, or the geometry-bearing ConfigureNotify for
/// transitions that never unmap). While armed, further toggles are refused,
/// so a toggle issued before any notification has been processed is simply
/// dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransitionGuard {
    in_flight: bool,
}

impl TransitionGuard {
    /// Arms the guard. False (and no state change) when a transition is
    /// already in flight.
    pub fn try_begin(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    /// Disarms the guard; a no-op when nothing is in flight.
    pub fn finish(&mut self) {
        self.in_flight = false;
    }

    #[inline]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }
}

/// The decisions for one fullscreen transition, computed before any Xlib
/// call is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsPlan {
    /// State after the transition.
    pub fullscreen: bool,
    /// Geometry to remember before entering, when the restore will be ours to
    /// do. `None` when the modern FULLSCREEN state handles restore for us.
    pub snapshot: Option<Rect>,
    /// Where the window goes.
    pub target: Rect,
    /// Unmap and withdraw before remapping, for managers speaking no
    /// stacking protocol at all.
    pub remap: bool,
    /// Re-assert geometry after the map; managers without the modern
    /// FULLSCREEN state are known to move windows on map.
    pub manual_placement: bool,
}

/// Computes a fullscreen transition from the current state.
///
/// `probed` is the raw capability set from the probe (before overrides): a
/// manager that advertised nothing at all needs the unmap/withdraw dance.
/// `saved` is the geometry remembered when fullscreen was entered; leaving
/// without one falls back to the current geometry.
pub fn plan_transition(
    entering: bool,
    policy: &EffectivePolicy,
    probed: WmCapabilities,
    current: Rect,
    saved: Option<Rect>,
    fs_target: Rect,
) -> FsPlan {
    let ewmh_fs = policy.caps.contains(WmCapabilities::FULLSCREEN);
    if entering {
        FsPlan {
            fullscreen: true,
            snapshot: if ewmh_fs { None } else { Some(current) },
            target: fs_target,
            remap: probed.is_empty(),
            manual_placement: !ewmh_fs,
        }
    } else {
        FsPlan {
            fullscreen: false,
            snapshot: None,
            target: saved.unwrap_or(current),
            remap: probed.is_empty(),
            manual_placement: !ewmh_fs,
        }
    }
}

/// Enumerates this connection's outputs via Xinerama, falling back to the
/// whole screen as a single output when the extension is inactive.
pub fn enumerate_outputs(connection: &Connection) -> Vec<Rect> {
    // SAFETY: Xlib/Xinerama FFI; the returned array is copied then freed.
    unsafe {
        if xinerama::XineramaIsActive(connection.display()) != 0 {
            let mut count = 0;
            let screens = xinerama::XineramaQueryScreens(connection.display(), &mut count);
            if !screens.is_null() && count > 0 {
                let list = std::slice::from_raw_parts(screens, count as usize)
                    .iter()
                    .map(|s| {
                        Rect::new(s.x_org as i32, s.y_org as i32, s.width as u32, s.height as u32)
                    })
                    .collect();
                xlib::XFree(screens as *mut _);
                return list;
            }
            if !screens.is_null() {
                xlib::XFree(screens as *mut _);
            }
        }
    }
    let (w, h) = connection.screen_size();
    vec![Rect::new(0, 0, w, h)]
}

/// One eye's complete windowing state.
pub struct ScreenState {
    pub side: Side,
    connection: Connection,
    atoms: Atoms,
    window: ScreenWindow,
    /// Raw probe result, cached for the life of the screen.
    probed: WmCapabilities,
    policy: EffectivePolicy,
    /// Legacy layer in effect before our first override, captured lazily.
    original_layer: Option<u64>,
    fullscreen: bool,
    /// Armed while a transition awaits server confirmation. Blocks
    /// re-entrant toggles.
    guard: TransitionGuard,
    /// Last geometry confirmed by a ConfigureNotify. Requests never update
    /// this directly.
    geometry: Rect,
    saved_geometry: Option<Rect>,
    pub(super) ramp: Option<ColorRamp>,
    // Pointer autohide bookkeeping, driven by the event pump.
    pub(super) mouse_autohide: bool,
    pub(super) cursor_show_deadline: Option<Instant>,
    ontop: bool,
    border: bool,
    keepaspect: bool,
    screen_index: i32,
    last_screensaver_reset: Option<Instant>,
}

impl ScreenState {
    /// Brings up one eye: connection, atom interning, capability probe and
    /// override fold, equalizer ramp, and the window itself.
    pub fn init(side: Side, config: &WindowConfig, initial: Rect) -> Result<Self> {
        install_error_logger();
        let connection = Connection::open_from_env(side.env_var())?;
        let atoms = Atoms::new(&connection)?;

        let (probed, policy) = if config.window_id.is_some() {
            // Embedding: negotiation already happened in the embedder.
            debug!("{} eye is embedded; skipping WM capability probe", side.label());
            (WmCapabilities::empty(), EffectivePolicy::default())
        } else {
            let probed = detect_wm_caps(&connection, &atoms);
            info!("{} eye WM capabilities: {:?}", side.label(), probed);
            (probed, resolve_fs_type(probed, &config.fstype))
        };

        let ramp = ColorRamp::create(&connection);

        let window = match config.window_id {
            Some(id) => ScreenWindow::from_embedded(&connection, id),
            None => {
                let mut window = ScreenWindow::create(
                    &connection,
                    &atoms,
                    initial,
                    ramp.as_ref().map(|r| r.colormap()),
                    &config.classname,
                    &config.title,
                )?;
                window.apply_size_hints(&connection, initial, false, config.keepaspect);
                window.select_input_witherr(&connection, full_event_mask(config.nomouse_input));
                window
            }
        };

        Ok(ScreenState {
            side,
            connection,
            atoms,
            window,
            probed,
            policy,
            original_layer: None,
            fullscreen: false,
            guard: TransitionGuard::default(),
            geometry: initial,
            saved_geometry: None,
            ramp,
            mouse_autohide: config.mouse_autohide && config.window_id.is_none(),
            cursor_show_deadline: None,
            ontop: config.ontop,
            border: config.border,
            keepaspect: config.keepaspect,
            screen_index: config.screen,
            last_screensaver_reset: None,
        })
    }

    #[inline]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    #[inline]
    pub fn atoms(&self) -> &Atoms {
        &self.atoms
    }

    #[inline]
    pub(super) fn window(&self) -> &ScreenWindow {
        &self.window
    }

    #[inline]
    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    /// Geometry as last confirmed by the server.
    #[inline]
    pub fn geometry(&self) -> Rect {
        self.geometry
    }

    /// Resolves this eye's fullscreen rectangle: Xinerama output selection,
    /// then the side-by-side split when both eyes share one connection.
    pub fn fullscreen_target(&self, shared_display: bool) -> Rect {
        let outputs = enumerate_outputs(&self.connection);
        let (w, h) = self.connection.screen_size();
        let fallback = Rect::new(0, 0, w, h);
        let output =
            pick_output(&outputs, self.screen_index, self.geometry.center()).unwrap_or(fallback);
        eye_fullscreen_rect(self.side, shared_display, output)
    }

    /// True while a previously initiated transition awaits confirmation.
    #[inline]
    pub fn transition_in_flight(&self) -> bool {
        self.guard.is_in_flight()
    }

    /// Toggles fullscreen on this eye. Silently refused while a previous
    /// transition is still waiting for its server confirmation, or when the
    /// window is embedded.
    pub fn toggle_fullscreen(&mut self, shared_display: bool) {
        if self.window.is_embedded() {
            return;
        }
        if !self.guard.try_begin() {
            debug!("{} eye: fullscreen toggle dropped, transition in flight", self.side.label());
            return;
        }
        let entering = !self.fullscreen;
        let target = if entering {
            self.fullscreen_target(shared_display)
        } else {
            Rect::default() // replaced by the saved geometry in the plan
        };
        let plan = plan_transition(
            entering,
            &self.policy,
            self.probed,
            self.geometry,
            self.saved_geometry,
            target,
        );
        self.execute(plan);
    }

    /// Performs a planned transition. Call order matters: managers race the
    /// map against the property and hint changes, so hints go first and the
    /// final raise goes last.
    fn execute(&mut self, plan: FsPlan) {
        info!(
            "{} eye: {} fullscreen, target ({}, {}) {}x{}",
            self.side.label(),
            if plan.fullscreen { "entering" } else { "leaving" },
            plan.target.x,
            plan.target.y,
            plan.target.width,
            plan.target.height
        );
        self.fullscreen = plan.fullscreen;
        if let Some(rect) = plan.snapshot {
            self.saved_geometry = Some(rect);
        }

        if plan.remap {
            // Managers with no protocol re-evaluate geometry only on a fresh
            // map, so pull the window through the withdrawn state.
            self.window.unmap_withdraw(&self.connection);
        }

        self.window
            .set_decorations(&self.connection, &self.atoms, self.border && !plan.fullscreen);
        self.window
            .apply_size_hints(&self.connection, plan.target, false, self.keepaspect);
        request_layer(
            &self.connection,
            &self.atoms,
            self.window.id(),
            &self.policy,
            plan.fullscreen,
            &mut self.original_layer,
        );
        self.window.move_resize(&self.connection, plan.target);

        // Some managers drop always-on-top across a fullscreen cycle.
        if !plan.fullscreen && self.ontop {
            request_layer(
                &self.connection,
                &self.atoms,
                self.window.id(),
                &self.policy,
                true,
                &mut self.original_layer,
            );
        }

        self.window.map_raised(&self.connection);
        if plan.manual_placement {
            self.window.move_resize(&self.connection, plan.target);
        }
        self.window.raise(&self.connection);
        // SAFETY: Xlib FFI; flush the whole batch in request order.
        unsafe {
            xlib::XFlush(self.connection.display());
        }

        if !plan.fullscreen {
            self.saved_geometry = None;
        }
    }

    /// Toggles always-on-top and pushes the new stacking to the manager.
    pub fn set_ontop(&mut self, ontop: bool) {
        self.ontop = ontop;
        request_layer(
            &self.connection,
            &self.atoms,
            self.window.id(),
            &self.policy,
            ontop || self.fullscreen,
            &mut self.original_layer,
        );
    }

    /// Toggles decorations while windowed; fullscreen windows stay bare.
    pub fn set_border(&mut self, border: bool) {
        self.border = border;
        self.window
            .set_decorations(&self.connection, &self.atoms, border && !self.fullscreen);
    }

    /// Records geometry confirmed by a ConfigureNotify. Returns true when it
    /// changed. Also disarms the transition guard: for transitions that never
    /// unmap, this is the server's confirmation.
    pub(super) fn note_configure(&mut self, rect: Rect) -> bool {
        self.guard.finish();
        if rect == self.geometry {
            return false;
        }
        trace!(
            "{} eye geometry now ({}, {}) {}x{}",
            self.side.label(),
            rect.x,
            rect.y,
            rect.width,
            rect.height
        );
        self.geometry = rect;
        true
    }

    /// Handles a MapNotify: the manager accepted the (re)map, so the
    /// transition guard lifts and the gravity override is undone.
    pub(super) fn note_mapped(&mut self) {
        self.guard.finish();
        let ScreenState {
            ref mut window,
            ref connection,
            ..
        } = *self;
        window.restore_gravity(connection);
    }

    /// True when this eye has an adjustable colormap.
    #[inline]
    pub fn has_equalizer(&self) -> bool {
        self.ramp.is_some()
    }

    /// Applies one equalizer knob to this eye's ramp. False without a ramp.
    pub fn set_equalizer_knob(&mut self, name: &str, value: i32) -> bool {
        let ScreenState {
            ref connection,
            ref mut ramp,
            ..
        } = *self;
        match ramp.as_mut() {
            Some(ramp) => {
                ramp.apply(connection, name, value);
                true
            }
            None => false,
        }
    }

    /// Replaces all knob values on this eye's ramp at once.
    pub fn set_equalizer_settings(&mut self, settings: super::colormap::EqSettings) {
        let ScreenState {
            ref connection,
            ref mut ramp,
            ..
        } = *self;
        if let Some(ramp) = ramp.as_mut() {
            ramp.apply_settings(connection, settings);
        }
    }

    /// Reads one equalizer knob from this eye's ramp.
    pub fn get_equalizer_knob(&self, name: &str) -> Option<i32> {
        self.ramp.as_ref().and_then(|ramp| ramp.settings().get(name))
    }

    /// Retitles this eye's window.
    pub fn set_title(&self, title: &str) -> Result<()> {
        self.window.set_title(&self.connection, title)
    }

    /// Keeps the screensaver off while output is active; rate-limited.
    pub fn heartbeat(&mut self) {
        let now = Instant::now();
        let due = match self.last_screensaver_reset {
            Some(last) => now.duration_since(last) >= SCREENSAVER_INTERVAL,
            None => true,
        };
        if due {
            // SAFETY: Xlib FFI.
            unsafe {
                xlib::XResetScreenSaver(self.connection.display());
            }
            self.last_screensaver_reset = Some(now);
        }
    }

    /// Tears this eye down: ramp, window, then the connection. Safe to call
    /// more than once.
    pub fn uninit(&mut self) {
        if self.connection.is_closed() {
            return;
        }
        self.window.show_cursor(&self.connection);
        if let Some(ramp) = self.ramp.as_mut() {
            ramp.free(&self.connection);
        }
        self.window.destroy(&self.connection);
        self.fullscreen = false;
        self.saved_geometry = None;
        self.connection.cleanup();
        info!("{} eye shut down", self.side.label());
    }
}

impl Drop for ScreenState {
    fn drop(&mut self) {
        if !self.connection.is_closed() {
            warn!("{} eye dropped without uninit; cleaning up now", self.side.label());
            self.uninit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x11::wm::WIN_LAYER_ABOVE_DOCK;

    fn policy(caps: WmCapabilities) -> EffectivePolicy {
        EffectivePolicy {
            caps,
            fs_layer: WIN_LAYER_ABOVE_DOCK,
        }
    }

    #[test]
    fn entering_snapshots_geometry_unless_ewmh_handles_restore() {
        let current = Rect::new(10, 20, 640, 480);
        let target = Rect::new(0, 0, 960, 1080);

        let plan = plan_transition(
            true,
            &policy(WmCapabilities::LAYER),
            WmCapabilities::LAYER,
            current,
            None,
            target,
        );
        assert_eq!(plan.snapshot, Some(current));
        assert!(plan.manual_placement);

        let plan = plan_transition(
            true,
            &policy(WmCapabilities::FULLSCREEN),
            WmCapabilities::FULLSCREEN,
            current,
            None,
            target,
        );
        assert_eq!(plan.snapshot, None);
        assert!(!plan.manual_placement);
    }

    #[test]
    fn leaving_restores_the_saved_geometry() {
        let saved = Rect::new(10, 20, 640, 480);
        let plan = plan_transition(
            false,
            &policy(WmCapabilities::LAYER),
            WmCapabilities::LAYER,
            Rect::new(0, 0, 960, 1080),
            Some(saved),
            Rect::default(),
        );
        assert!(!plan.fullscreen);
        assert_eq!(plan.target, saved);
    }

    #[test]
    fn leaving_without_a_snapshot_keeps_current_geometry() {
        let current = Rect::new(0, 0, 960, 1080);
        let plan = plan_transition(
            false,
            &policy(WmCapabilities::FULLSCREEN),
            WmCapabilities::FULLSCREEN,
            current,
            None,
            Rect::default(),
        );
        assert_eq!(plan.target, current);
    }

    #[test]
    fn remap_dance_only_for_protocol_less_managers() {
        let current = Rect::new(0, 0, 640, 480);
        let target = Rect::new(0, 0, 960, 1080);

        let plan = plan_transition(
            true,
            &policy(WmCapabilities::empty()),
            WmCapabilities::empty(),
            current,
            None,
            target,
        );
        assert!(plan.remap);

        // Probed capabilities suppress the dance even if overrides cleared
        // the effective set.
        let plan = plan_transition(
            true,
            &policy(WmCapabilities::empty()),
            WmCapabilities::FULLSCREEN,
            current,
            None,
            target,
        );
        assert!(!plan.remap);
    }

    #[test]
    fn round_trip_returns_to_the_original_geometry() {
        let original = Rect::new(100, 50, 800, 600);
        let fs_target = Rect::new(0, 0, 960, 1080);
        let pol = policy(WmCapabilities::LAYER);

        let enter = plan_transition(true, &pol, pol.caps, original, None, fs_target);
        let saved = enter.snapshot;
        let leave = plan_transition(false, &pol, pol.caps, enter.target, saved, Rect::default());
        assert_eq!(leave.target, original);
    }

    #[test]
    fn second_toggle_before_confirmation_is_discarded() {
        let mut guard = TransitionGuard::default();
        assert!(guard.try_begin());
        // A toggle issued before any notification was processed must not
        // initiate a second transition.
        assert!(!guard.try_begin());
        assert!(guard.is_in_flight());
        // The server's confirmation re-arms the toggle path.
        guard.finish();
        assert!(!guard.is_in_flight());
        assert!(guard.try_begin());
    }

    #[test]
    fn confirmation_without_a_transition_is_harmless() {
        let mut guard = TransitionGuard::default();
        guard.finish();
        assert!(!guard.is_in_flight());
        assert!(guard.try_begin());
    }

    #[test]
    fn sides_resolve_their_own_display_variables() {
        assert_eq!(Side::Left.env_var(), "DISPLAYL");
        assert_eq!(Side::Right.env_var(), "DISPLAYR");
        assert_ne!(Side::Left, Side::Right);
    }
}
