// src/x11/colormap.rs
#![allow(non_snake_case)] // Allow non-snake case for X11 types

//! Equalizer support through DirectColor colormap ramps.
//!
//! Via colormap ramps we can do gamma, brightness and contrast (hue and
//! per-channel intensity would also be possible; saturation would not).
//! A ramp exists only when the default visual is DirectColor; on every other
//! visual the equalizer degrades to the not-available path. Colormaps are
//! private to the client and die with the connection, so unlike a server-wide
//! gamma ramp nothing needs restoring after a crash.

use super::connection::Connection;
use crate::config::EqualizerConfig;
use log::{debug, trace, warn};
use std::mem;

use libc::{c_char, c_int, c_ulong};
use x11::xlib;

/// Outcome of an equalizer knob operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqStatus {
    Ok,
    /// No adjustable color resource on any screen.
    NotAvailable,
    /// The knob name is not one we control.
    NotImplemented,
}

/// XColor component flags.
const DO_RED: c_char = 1;
const DO_GREEN: c_char = 2;
const DO_BLUE: c_char = 4;

/// Knob values in [-100, 100], 0 neutral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EqSettings {
    pub brightness: i32,
    pub contrast: i32,
    pub gamma: i32,
}

impl From<EqualizerConfig> for EqSettings {
    fn from(cfg: EqualizerConfig) -> Self {
        EqSettings {
            brightness: cfg.brightness,
            contrast: cfg.contrast,
            gamma: cfg.gamma,
        }
    }
}

impl EqSettings {
    /// Stores a knob by name. False when the name is not a knob we control.
    pub fn set(&mut self, name: &str, value: i32) -> bool {
        if name.eq_ignore_ascii_case("brightness") {
            self.brightness = value;
        } else if name.eq_ignore_ascii_case("contrast") {
            self.contrast = value;
        } else if name.eq_ignore_ascii_case("gamma") {
            self.gamma = value;
        } else {
            return false;
        }
        true
    }

    /// Reads a knob by name.
    pub fn get(&self, name: &str) -> Option<i32> {
        if name.eq_ignore_ascii_case("brightness") {
            Some(self.brightness)
        } else if name.eq_ignore_ascii_case("contrast") {
            Some(self.contrast)
        } else if name.eq_ignore_ascii_case("gamma") {
            Some(self.gamma)
        } else {
            None
        }
    }
}

/// True when `name` is a knob the colormap path controls.
pub fn knob_is_known(name: &str) -> bool {
    ["brightness", "contrast", "gamma"]
        .iter()
        .any(|k| name.eq_ignore_ascii_case(k))
}

/// Resolves the status of an equalizer request. The resource check comes
/// before the name dispatch: without an adjustable colormap every knob,
/// known or not, reports NotAvailable.
pub fn dispatch_status(has_resource: bool, name: &str) -> EqStatus {
    if !has_resource {
        EqStatus::NotAvailable
    } else if knob_is_known(name) {
        EqStatus::Ok
    } else {
        EqStatus::NotImplemented
    }
}

/// One channel's transfer function: gamma power curve, contrast slope around
/// the midpoint, additive brightness, clamped to [0, 1] and scaled to the
/// 16-bit colormap range.
pub fn transform_color(val: f32, brightness: f32, contrast: f32, gamma: f32) -> u16 {
    let mut s = val.powf(gamma);
    s = (s - 0.5) * contrast + 0.5;
    s += brightness;
    s = s.clamp(0.0, 1.0);
    (s * 65535.0) as u16
}

/// Converts the integer knob values to the transfer-function coefficients.
fn coefficients(settings: &EqSettings) -> (f32, f32, f32) {
    let brightness = 0.01 * settings.brightness as f32;
    let contrast =
        (0.0095 * (settings.contrast + 100) as f32 * std::f32::consts::FRAC_PI_4).tan();
    let gamma = 2f32.powf(-0.02 * settings.gamma as f32);
    (brightness, contrast, gamma)
}

/// An adjustable DirectColor colormap owned by one eye's connection.
pub struct ColorRamp {
    cmap: xlib::Colormap,
    cells: Vec<xlib::XColor>,
    red_mask: c_ulong,
    green_mask: c_ulong,
    blue_mask: c_ulong,
    settings: EqSettings,
}

impl ColorRamp {
    /// Builds an identity ramp on the connection's default visual, or `None`
    /// when that visual is not DirectColor. `None` is the normal case on
    /// TrueColor desktops and simply disables the equalizer.
    pub fn create(connection: &Connection) -> Option<Self> {
        let display = connection.display();
        // SAFETY: display and screen index are valid; the visual pointer
        // returned is owned by Xlib and only read.
        let (default_class, depth) = unsafe {
            let visual = xlib::XDefaultVisual(display, connection.screen());
            let depth = xlib::XDefaultDepth(display, connection.screen());
            ((*visual).class, depth)
        };
        if default_class != xlib::DirectColor {
            debug!("Default visual is not DirectColor; equalizer not available");
            return None;
        }

        // SAFETY: out-struct is local; XMatchVisualInfo fills it on success.
        let vinfo = unsafe {
            let mut vinfo: xlib::XVisualInfo = mem::zeroed();
            if xlib::XMatchVisualInfo(
                display,
                connection.screen(),
                depth,
                xlib::DirectColor,
                &mut vinfo,
            ) == 0
            {
                return None;
            }
            vinfo
        };

        let size = vinfo.colormap_size.max(0) as usize;
        if size == 0 || size > 4096 {
            warn!("Unusable DirectColor colormap size {}", size);
            return None;
        }

        let red_mask = vinfo.red_mask;
        let green_mask = vinfo.green_mask;
        let blue_mask = vinfo.blue_mask;

        // Identity ramp: walk each channel's pixel subfield in its own
        // stride, stopping a channel when its counter wraps.
        let ru = (red_mask & red_mask.wrapping_sub(1)) ^ red_mask;
        let gu = (green_mask & green_mask.wrapping_sub(1)) ^ green_mask;
        let bu = (blue_mask & blue_mask.wrapping_sub(1)) ^ blue_mask;
        let rvu = (65536u64 * ru as u64 / (red_mask + ru) as u64) as c_ulong;
        let gvu = (65536u64 * gu as u64 / (green_mask + gu) as u64) as c_ulong;
        let bvu = (65536u64 * bu as u64 / (blue_mask + bu) as u64) as c_ulong;

        let mut cells: Vec<xlib::XColor> = Vec::with_capacity(size);
        let (mut r, mut g, mut b) = (0 as c_ulong, 0 as c_ulong, 0 as c_ulong);
        let (mut rv, mut gv, mut bv) = (0 as c_ulong, 0 as c_ulong, 0 as c_ulong);
        let mut flags = DO_RED | DO_GREEN | DO_BLUE;
        for _ in 0..size {
            // SAFETY: XColor is plain old data; every field is set below.
            let mut cell: xlib::XColor = unsafe { mem::zeroed() };
            cell.pixel = r | g | b;
            cell.red = (rv & 0xffff) as u16;
            cell.green = (gv & 0xffff) as u16;
            cell.blue = (bv & 0xffff) as u16;
            cell.flags = flags;
            cells.push(cell);

            let t = (r + ru) & red_mask;
            if t < r {
                flags &= !DO_RED;
            }
            r = t;
            let t = (g + gu) & green_mask;
            if t < g {
                flags &= !DO_GREEN;
            }
            g = t;
            let t = (b + bu) & blue_mask;
            if t < b {
                flags &= !DO_BLUE;
            }
            b = t;
            rv += rvu;
            gv += gvu;
            bv += bvu;
        }

        // SAFETY: Xlib FFI; the cells vector holds `size` initialized colors.
        let cmap = unsafe {
            let cmap = xlib::XCreateColormap(
                display,
                connection.root(),
                vinfo.visual,
                xlib::AllocAll,
            );
            xlib::XStoreColors(display, cmap, cells.as_mut_ptr(), size as c_int);
            cmap
        };

        debug!(
            "DirectColor ramp created: {} cells, colormap {}",
            size, cmap
        );
        Some(ColorRamp {
            cmap,
            cells,
            red_mask,
            green_mask,
            blue_mask,
            settings: EqSettings::default(),
        })
    }

    /// The colormap handle, for window creation.
    #[inline]
    pub fn colormap(&self) -> xlib::Colormap {
        self.cmap
    }

    #[inline]
    pub fn settings(&self) -> &EqSettings {
        &self.settings
    }

    /// Stores a knob and re-uploads the ramp. The name must already have
    /// passed [`knob_is_known`].
    pub fn apply(&mut self, connection: &Connection, name: &str, value: i32) {
        if !self.settings.set(name, value) {
            return;
        }
        self.store(connection);
    }

    /// Replaces all knob values at once and re-uploads the ramp.
    pub fn apply_settings(&mut self, connection: &Connection, settings: EqSettings) {
        self.settings = settings;
        self.store(connection);
    }

    /// Recomputes every cell from the current knobs and uploads them.
    fn store(&mut self, connection: &Connection) {
        let (brightness, contrast, gamma) = coefficients(&self.settings);

        // Per-channel input scale: the channel's stride over its full mask,
        // so `scale * last_index` lands at 1.0.
        let rf = ((self.red_mask & self.red_mask.wrapping_sub(1)) ^ self.red_mask) as f32
            / self.red_mask as f32;
        let gf = ((self.green_mask & self.green_mask.wrapping_sub(1)) ^ self.green_mask) as f32
            / self.green_mask as f32;
        let bf = ((self.blue_mask & self.blue_mask.wrapping_sub(1)) ^ self.blue_mask) as f32
            / self.blue_mask as f32;

        for (k, cell) in self.cells.iter_mut().enumerate() {
            let k = k as f32;
            cell.red = transform_color(rf * k, brightness, contrast, gamma);
            cell.green = transform_color(gf * k, brightness, contrast, gamma);
            cell.blue = transform_color(bf * k, brightness, contrast, gamma);
        }
        // SAFETY: Xlib FFI; cells length matches the colormap size.
        unsafe {
            xlib::XStoreColors(
                connection.display(),
                self.cmap,
                self.cells.as_mut_ptr(),
                self.cells.len() as c_int,
            );
            xlib::XFlush(connection.display());
        }
        trace!("Equalizer ramp stored: {:?}", self.settings);
    }

    /// Releases the server-side colormap. Must run before the connection
    /// closes. Idempotent.
    pub fn free(&mut self, connection: &Connection) {
        if self.cmap != 0 && !connection.is_closed() {
            // SAFETY: Xlib FFI; cmap was created on this connection.
            unsafe {
                xlib::XFreeColormap(connection.display(), self.cmap);
            }
            self.cmap = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_check_precedes_name_dispatch() {
        // Unknown knob without the resource still reports NotAvailable.
        assert_eq!(dispatch_status(false, "hue"), EqStatus::NotAvailable);
        assert_eq!(dispatch_status(false, "brightness"), EqStatus::NotAvailable);
        // With the resource, unknown knobs are NotImplemented.
        assert_eq!(dispatch_status(true, "saturation"), EqStatus::NotImplemented);
        assert_eq!(dispatch_status(true, "gamma"), EqStatus::Ok);
    }

    #[test]
    fn knob_names_are_case_insensitive() {
        let mut settings = EqSettings::default();
        assert!(settings.set("Brightness", 40));
        assert_eq!(settings.get("BRIGHTNESS"), Some(40));
        assert!(!settings.set("saturation", 10));
        assert_eq!(settings.get("saturation"), None);
    }

    #[test]
    fn neutral_transform_is_monotonic() {
        let (b, c, g) = coefficients(&EqSettings::default());
        let mut prev = 0u16;
        for k in 0..=64 {
            let v = transform_color(k as f32 / 64.0, b, c, g);
            assert!(v >= prev, "ramp must not decrease");
            prev = v;
        }
    }

    #[test]
    fn extreme_brightness_clamps_to_the_range_ends() {
        // brightness +100 maps an already-bright input to full scale.
        let (b, c, g) = coefficients(&EqSettings {
            brightness: 100,
            ..Default::default()
        });
        assert_eq!(transform_color(1.0, b, c, g), 65535);
        // brightness -100 maps a dark input to zero.
        let (b, c, g) = coefficients(&EqSettings {
            brightness: -100,
            ..Default::default()
        });
        assert_eq!(transform_color(0.0, b, c, g), 0);
    }

    #[test]
    fn gamma_knob_bends_the_curve() {
        let neutral = coefficients(&EqSettings::default());
        let raised = coefficients(&EqSettings {
            gamma: 50,
            ..Default::default()
        });
        // Positive gamma lowers the exponent and brightens midtones.
        let mid_neutral = transform_color(0.5, neutral.0, neutral.1, neutral.2);
        let mid_raised = transform_color(0.5, raised.0, raised.1, raised.2);
        assert!(mid_raised > mid_neutral);
    }
}
