// src/x11/mod.rs

//! X11 backend: two eye screens coordinated into one stereoscopic output.

pub mod atoms;
pub mod colormap;
pub mod connection;
mod event;
pub mod layer;
pub mod screen;
pub mod window;
pub mod wm;

use crate::config::Config;
use crate::events::VoEvent;
use crate::geometry::Rect;
use anyhow::{Context, Result};
use colormap::{dispatch_status, EqSettings, EqStatus};
use log::{debug, info, warn};
use screen::{ScreenState, Side};

/// The stereoscopic output pair.
///
/// Owns both eyes' screens and applies every user-visible operation to the
/// left eye first, then the right. There is no cross-connection atomicity: a
/// failure on one eye leaves the other in its new state, and the next toggle
/// reconverges them. This is accepted; the two X servers share no transaction
/// mechanism.
pub struct StereoOutput {
    left: ScreenState,
    right: ScreenState,
    /// Both eyes resolved to the same display: fullscreen becomes a
    /// side-by-side split instead of two full outputs.
    shared_display: bool,
    fullscreen: bool,
    ontop: bool,
    border: bool,
}

impl StereoOutput {
    /// Brings up both eyes. `initial` is the windowed geometry each eye
    /// starts with.
    ///
    /// Either eye failing to initialize fails the whole pair; an already
    /// initialized left eye is torn down by its drop.
    pub fn init(config: &Config, initial: Rect) -> Result<Self> {
        let left = ScreenState::init(Side::Left, &config.window, initial)
            .context("Failed to initialize the left eye")?;
        let right = ScreenState::init(Side::Right, &config.window, initial)
            .context("Failed to initialize the right eye")?;

        let shared_display =
            left.connection().display_name() == right.connection().display_name();
        info!(
            "Stereo output up: left {:?}, right {:?} ({})",
            left.connection().display_name(),
            right.connection().display_name(),
            if shared_display {
                "shared, side-by-side framing"
            } else {
                "distinct outputs"
            }
        );

        let mut output = StereoOutput {
            left,
            right,
            shared_display,
            fullscreen: false,
            ontop: config.window.ontop,
            border: config.window.border,
        };

        let initial_eq = EqSettings::from(config.equalizer);
        if initial_eq != EqSettings::default() {
            output.left.set_equalizer_settings(initial_eq);
            output.right.set_equalizer_settings(initial_eq);
        }
        if output.ontop {
            output.left.set_ontop(true);
            output.right.set_ontop(true);
        }
        Ok(output)
    }

    #[inline]
    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    #[inline]
    pub fn is_shared_display(&self) -> bool {
        self.shared_display
    }

    pub fn screen(&self, side: Side) -> &ScreenState {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    /// Toggles fullscreen on both eyes, left first. Fails silently while
    /// either eye still awaits a previous transition's confirmation, so the
    /// pair flag never drifts from the eyes' actual state.
    pub fn toggle_fullscreen(&mut self) {
        if self.left.transition_in_flight() || self.right.transition_in_flight() {
            debug!("Fullscreen toggle dropped; a transition is still in flight");
            return;
        }
        self.fullscreen = !self.fullscreen;
        self.left.toggle_fullscreen(self.shared_display);
        self.right.toggle_fullscreen(self.shared_display);
    }

    /// Toggles always-on-top on both eyes.
    pub fn toggle_ontop(&mut self) {
        self.ontop = !self.ontop;
        self.left.set_ontop(self.ontop);
        self.right.set_ontop(self.ontop);
    }

    /// Toggles window decorations on both eyes.
    pub fn toggle_border(&mut self) {
        self.border = !self.border;
        self.left.set_border(self.border);
        self.right.set_border(self.border);
    }

    /// Retitles both windows.
    pub fn set_title(&self, title: &str) -> Result<()> {
        self.left.set_title(title)?;
        self.right.set_title(title)
    }

    /// Sets one equalizer knob on every eye that has a ramp.
    ///
    /// The missing-resource case is reported before the unknown-name case:
    /// without any adjustable colormap the knob name is never inspected. A
    /// failed store on one eye does not stop the other.
    pub fn set_equalizer(&mut self, name: &str, value: i32) -> EqStatus {
        let has_resource = self.left.has_equalizer() || self.right.has_equalizer();
        let status = dispatch_status(has_resource, name);
        if status != EqStatus::Ok {
            return status;
        }
        for eye in [&mut self.left, &mut self.right] {
            if eye.has_equalizer() && !eye.set_equalizer_knob(name, value) {
                warn!("{} eye dropped equalizer update for {:?}", eye.side.label(), name);
            }
        }
        EqStatus::Ok
    }

    /// Reads one equalizer knob. The stored value is shared across eyes, so
    /// whichever ramp exists answers.
    pub fn get_equalizer(&self, name: &str) -> Result<i32, EqStatus> {
        let has_resource = self.left.has_equalizer() || self.right.has_equalizer();
        match dispatch_status(has_resource, name) {
            EqStatus::Ok => self
                .left
                .get_equalizer_knob(name)
                .or_else(|| self.right.get_equalizer_knob(name))
                .ok_or(EqStatus::NotAvailable),
            status => Err(status),
        }
    }

    /// Drains both eyes' pending events and keeps the screensavers reset
    /// while output is active.
    pub fn poll_events(&mut self) -> Vec<VoEvent> {
        let mut events = Vec::new();
        event::pump(&mut self.left, &mut events);
        event::pump(&mut self.right, &mut events);
        self.left.heartbeat();
        self.right.heartbeat();
        events
    }

    /// Tears both eyes down. Safe to call more than once; drop also runs it.
    pub fn uninit(&mut self) {
        self.left.uninit();
        self.right.uninit();
        self.fullscreen = false;
    }
}
