// src/x11/connection.rs
#![allow(non_snake_case)] // Allow non-snake case for X11 types

//! Per-eye X server connection management.
//!
//! Each eye owns its own [`Connection`], resolved from its own environment
//! variable (`DISPLAYL` / `DISPLAYR`), so the two halves of the rig can live
//! on separate X servers or share one.

use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use std::ffi::{CStr, CString};
use std::ptr;

use libc::{c_char, c_int};
use x11::xlib;

/// Fallback display when the eye's environment variable is unset.
const DEFAULT_DISPLAY: &str = ":0.0";

/// Process-wide X error hook. Logs diagnostic fields and returns without
/// terminating; protocol errors on fire-and-forget requests must not kill
/// playback.
pub unsafe extern "C" fn x_error_logger(
    display: *mut xlib::Display,
    event: *mut xlib::XErrorEvent,
) -> c_int {
    let mut msg = [0 as c_char; 80];
    // SAFETY: Xlib invokes this hook with a valid display and event; the
    // buffer length is passed alongside the pointer.
    unsafe {
        xlib::XGetErrorText(display, (*event).error_code as c_int, msg.as_mut_ptr(), 80);
        let text = CStr::from_ptr(msg.as_ptr()).to_string_lossy();
        error!("X11 error: {}", text);
        debug!(
            "X11 error detail: code {:#x}, request {:#x}, minor {:#x}, resource {:#x}, serial {:#x}",
            (*event).error_code,
            (*event).request_code,
            (*event).minor_code,
            (*event).resourceid,
            (*event).serial
        );
    }
    0
}

/// Installs the process-wide error hook. Safe to call more than once.
pub fn install_error_logger() {
    // SAFETY: XSetErrorHandler only stores the function pointer.
    unsafe {
        xlib::XSetErrorHandler(Some(x_error_logger));
    }
}

/// Manages a raw X11 Display pointer, ensuring it's closed on drop.
#[derive(Debug)]
struct ManagedDisplay {
    ptr: *mut xlib::Display,
}

impl ManagedDisplay {
    /// Opens a connection to the display named by `display_name`.
    fn open(display_name: &str) -> Result<Self> {
        let c_name = CString::new(display_name)
            .map_err(|_| anyhow!("Display name contains a NUL byte: {:?}", display_name))?;
        // SAFETY: c_name outlives the call; XOpenDisplay copies what it needs.
        let display_ptr = unsafe { xlib::XOpenDisplay(c_name.as_ptr()) };
        if display_ptr.is_null() {
            Err(anyhow!(
                "Failed to open X display {:?}. Check the environment variable or X server status.",
                display_name
            ))
        } else {
            debug!("X display {:?} opened: {:p}", display_name, display_ptr);
            Ok(Self { ptr: display_ptr })
        }
    }

    #[inline]
    fn raw(&self) -> *mut xlib::Display {
        self.ptr
    }
}

impl Drop for ManagedDisplay {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            info!("Closing X11 display connection: {:p}", self.ptr);
            // SAFETY: ptr is non-null and was returned by XOpenDisplay; it is
            // nulled out by Connection::cleanup so this runs at most once.
            unsafe {
                let status = xlib::XCloseDisplay(self.ptr);
                if status != 0 {
                    warn!("XCloseDisplay returned non-zero status: {}", status);
                }
            }
        }
    }
}

/// One eye's connection to an X server.
///
/// Owns the display exclusively; the matching window and color resources are
/// all scoped to this connection and must be torn down before it closes.
#[derive(Debug)]
pub struct Connection {
    managed_display: ManagedDisplay,
    display_name: String,
    screen: c_int,
    root: xlib::Window,
    local: bool,
}

impl Connection {
    /// Opens the display named by the environment variable `env_var`
    /// (falling back to `:0.0`), and resolves the default screen and root
    /// window.
    ///
    /// A failure here is fatal to this eye's initialization: the caller must
    /// not proceed to create a window on it.
    pub fn open_from_env(env_var: &str) -> Result<Self> {
        let display_name = std::env::var(env_var).unwrap_or_else(|_| DEFAULT_DISPLAY.to_string());
        info!("Opening X display ({} => {:?})", env_var, display_name);

        let managed_display = ManagedDisplay::open(&display_name)?;

        // SAFETY: the display pointer is valid; these calls only read
        // connection-local data.
        let (screen, root) = unsafe {
            let screen = xlib::XDefaultScreen(managed_display.raw());
            let root = xlib::XRootWindow(managed_display.raw(), screen);
            (screen, root)
        };

        let local = is_local_display(&display_name);
        info!(
            "X11 connection {:?} established (screen {}, {} display)",
            display_name,
            screen,
            if local { "local" } else { "remote" }
        );

        Ok(Connection {
            managed_display,
            display_name,
            screen,
            root,
            local,
        })
    }

    /// Marks the connection closed; the actual XCloseDisplay is deferred to
    /// the managed display's drop. Idempotent.
    pub fn cleanup(&mut self) {
        if !self.managed_display.ptr.is_null() {
            // SAFETY: pointer is non-null and owned exclusively by us.
            unsafe {
                xlib::XCloseDisplay(self.managed_display.ptr);
            }
            self.managed_display.ptr = ptr::null_mut();
            debug!("X display {:?} closed", self.display_name);
        }
    }

    /// Returns the raw display pointer. Invalid after `cleanup`.
    #[inline]
    pub fn display(&self) -> *mut xlib::Display {
        self.managed_display.raw()
    }

    /// True once `cleanup` has run.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.managed_display.ptr.is_null()
    }

    #[inline]
    pub fn screen(&self) -> c_int {
        self.screen
    }

    /// Root window of the default screen; capability properties live here.
    #[inline]
    pub fn root(&self) -> xlib::Window {
        self.root
    }

    /// The display string this connection was opened with. Comparing two
    /// eyes' names decides shared-output (side-by-side) framing.
    #[inline]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[inline]
    pub fn is_local(&self) -> bool {
        self.local
    }

    /// Full size of the default screen, used when Xinerama is inactive.
    pub fn screen_size(&self) -> (u32, u32) {
        // SAFETY: display pointer is valid; these are simple macro-equivalents.
        unsafe {
            let w = xlib::XDisplayWidth(self.display(), self.screen);
            let h = xlib::XDisplayHeight(self.display(), self.screen);
            (w.max(0) as u32, h.max(0) as u32)
        }
    }
}

/// Heuristic local-display detection: `unix:N`, `localhost:N`, and `:N` for
/// small N are treated as local.
fn is_local_display(name: &str) -> bool {
    let trimmed = name
        .strip_prefix("unix")
        .or_else(|| name.strip_prefix("localhost"))
        .unwrap_or(name);
    match trimmed.strip_prefix(':') {
        Some(rest) => rest
            .split('.')
            .next()
            .and_then(|n| n.parse::<u32>().ok())
            .map(|n| n < 10)
            .unwrap_or(false),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn local_display_detection() {
        assert!(is_local_display(":0.0"));
        assert!(is_local_display(":1"));
        assert!(is_local_display("unix:0.0"));
        assert!(is_local_display("localhost:3"));
        assert!(!is_local_display("remotehost:0.0"));
        assert!(!is_local_display(":42"));
    }

    #[test_log::test]
    fn cleanup_is_idempotent_on_never_opened_connection() {
        // Constructed by hand with a null pointer: no X server involved.
        let mut conn = Connection {
            managed_display: ManagedDisplay {
                ptr: ptr::null_mut(),
            },
            display_name: ":0.0".to_string(),
            screen: 0,
            root: 0,
            local: true,
        };
        assert!(conn.is_closed());
        conn.cleanup();
        conn.cleanup();
        assert!(conn.is_closed());
    }
}
