// src/x11/window.rs
#![allow(non_snake_case)] // Allow non-snake case for X11 types

//! Per-eye X11 window management.
//!
//! `ScreenWindow` owns one eye's window handle and everything the window
//! manager negotiation needs from it: creation with a blocking wait for the
//! map confirmation, Motif decoration control, WM size hints, input selection
//! with a scoped BadAccess downgrade, pointer hiding, and teardown with a
//! blocking wait for the destroy confirmation.

use super::atoms::Atoms;
use super::connection::{x_error_logger, Connection};
use crate::geometry::Rect;
use anyhow::{anyhow, Result};
use bitflags::bitflags;
use log::{debug, info, trace, warn};
use once_cell::sync::Lazy;
use std::ffi::CString;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use libc::{c_char, c_int, c_long, c_uint, c_ulong};
use x11::xlib;

bitflags! {
    /// Motif `_MOTIF_WM_HINTS` decoration bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MwmDecorations: c_ulong {
        const ALL = 1 << 0;
        const BORDER = 1 << 1;
        const RESIZEH = 1 << 2;
        const TITLE = 1 << 3;
        const MENU = 1 << 4;
        const MINIMIZE = 1 << 5;
        const MAXIMIZE = 1 << 6;
    }
}

bitflags! {
    /// Motif `_MOTIF_WM_HINTS` function bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MwmFunctions: c_ulong {
        const ALL = 1 << 0;
        const RESIZE = 1 << 1;
        const MOVE = 1 << 2;
        const MINIMIZE = 1 << 3;
        const MAXIMIZE = 1 << 4;
        const CLOSE = 1 << 5;
    }
}

const MWM_HINTS_FUNCTIONS: c_ulong = 1 << 0;
const MWM_HINTS_DECORATIONS: c_ulong = 1 << 1;

/// `_MOTIF_WM_HINTS` property layout: five longs.
#[repr(C)]
#[derive(Clone, Copy)]
struct MotifWmHints {
    flags: c_ulong,
    functions: c_ulong,
    decorations: c_ulong,
    input_mode: c_long,
    status: c_ulong,
}

/// The full input mask we want on a created window.
pub fn full_event_mask(nomouse: bool) -> c_long {
    let mask = xlib::StructureNotifyMask
        | xlib::KeyPressMask
        | xlib::PointerMotionMask
        | xlib::ButtonPressMask
        | xlib::ButtonReleaseMask
        | xlib::ExposureMask;
    if nomouse {
        mask & !(xlib::ButtonPressMask | xlib::ButtonReleaseMask)
    } else {
        mask
    }
}

// Scoped BadAccess interception around XSelectInput. The X error hook is
// process-global, so the flag and the saved previous hook have to be too;
// everything else negotiated lives on the owning ScreenWindow.
static SELECTINPUT_ERR: AtomicBool = AtomicBool::new(false);
type ErrorHook =
    Option<unsafe extern "C" fn(*mut xlib::Display, *mut xlib::XErrorEvent) -> c_int>;
static PREV_ERROR_HOOK: Lazy<Mutex<ErrorHook>> = Lazy::new(|| Mutex::new(None));

unsafe extern "C" fn selectinput_error_hook(
    display: *mut xlib::Display,
    event: *mut xlib::XErrorEvent,
) -> c_int {
    // SAFETY: Xlib invokes this hook with a valid event.
    let error_code = unsafe { (*event).error_code };
    if error_code == xlib::BadAccess {
        SELECTINPUT_ERR.store(true, Ordering::SeqCst);
        warn!(
            "X11 error: BadAccess during XSelectInput; the button-press mask \
             is probably grabbed by another application"
        );
        return 0;
    }
    let prev = PREV_ERROR_HOOK.lock().map(|g| *g).unwrap_or(None);
    match prev {
        // SAFETY: forwarding the same valid pointers Xlib gave us.
        Some(hook) => unsafe { hook(display, event) },
        None => unsafe { x_error_logger(display, event) },
    }
}

/// Represents an X11 window and the WM state applied to it.
///
/// Cleanup of server-side resources is handled by [`ScreenWindow::destroy`],
/// which must be called before the owning `Connection` closes. Externally
/// embedded windows are never destroyed by us.
pub struct ScreenWindow {
    id: xlib::Window,
    /// True when the handle was supplied by an embedding application.
    embedded: bool,
    /// True when rendering directly to the root window (embed id 0).
    is_root: bool,
    /// Decoration/function masks read back before stripping, restored on exit.
    saved_decorations: MwmDecorations,
    saved_functions: MwmFunctions,
    /// Gravity in effect before the last size-hint override.
    old_gravity: c_int,
    /// Last geometry passed to the size hints, re-applied when restoring
    /// gravity after a map.
    last_hint_rect: Option<Rect>,
}

impl ScreenWindow {
    /// Creates the eye's window and blocks until the window manager confirms
    /// the map.
    ///
    /// The wait is a filtered synchronous receive on this connection's event
    /// stream: non-matching events are drained and discarded. No timeout is
    /// applied; an unresponsive server stalls the control thread.
    pub fn create(
        connection: &Connection,
        atoms: &Atoms,
        rect: Rect,
        colormap: Option<xlib::Colormap>,
        classname: &str,
        title: &str,
    ) -> Result<Self> {
        info!(
            "Creating X11 window at ({}, {}) size {}x{}",
            rect.x, rect.y, rect.width, rect.height
        );
        let display = connection.display();

        // SAFETY: Xlib FFI; connection is open and attributes fully set for
        // the chosen value mask.
        let window_id = unsafe {
            let mut attributes: xlib::XSetWindowAttributes = mem::zeroed();
            let mut mask = xlib::CWBorderPixel | xlib::CWBackingStore | xlib::CWBitGravity;
            attributes.background_pixel = 0;
            attributes.border_pixel = 0;
            attributes.backing_store = xlib::NotUseful;
            attributes.bit_gravity = xlib::StaticGravity;
            if let Some(cmap) = colormap {
                attributes.colormap = cmap;
                mask |= xlib::CWColormap;
            }

            xlib::XCreateWindow(
                display,
                connection.root(),
                rect.x as c_int,
                rect.y as c_int,
                rect.width as c_uint,
                rect.height as c_uint,
                0,
                xlib::CopyFromParent as c_int,
                xlib::InputOutput as c_uint,
                std::ptr::null_mut(), // CopyFromParent visual
                mask,
                &mut attributes,
            )
        };
        if window_id == 0 {
            return Err(anyhow!("XCreateWindow failed"));
        }
        debug!("X window created (ID: {})", window_id);

        let mut window = ScreenWindow {
            id: window_id,
            embedded: false,
            is_root: false,
            saved_decorations: MwmDecorations::ALL,
            saved_functions: MwmFunctions::MOVE
                | MwmFunctions::CLOSE
                | MwmFunctions::MINIMIZE
                | MwmFunctions::MAXIMIZE
                | MwmFunctions::RESIZE,
            old_gravity: xlib::NorthWestGravity,
            last_hint_rect: None,
        };

        // SAFETY: Xlib FFI on the freshly created window.
        unsafe {
            let mut delete_atom = atoms.wm_delete_window;
            xlib::XSetWMProtocols(display, window_id, &mut delete_atom, 1);
        }
        window.set_class_hint(connection, atoms, classname)?;
        window.set_title(connection, title)?;

        // Map and wait for the manager's confirmation before selecting the
        // real input mask; events arriving mid-setup would be misattributed.
        // SAFETY: Xlib FFI; window id is valid.
        unsafe {
            xlib::XSelectInput(display, window_id, xlib::StructureNotifyMask);
            xlib::XMapWindow(display, window_id);
            xlib::XClearWindow(display, window_id);
        }
        wait_for_event(connection, |xev| {
            // SAFETY: the discriminant is always valid to read; the map union
            // field is read only after the type check.
            unsafe {
                xev.type_ == xlib::MapNotify && xev.map.event == window_id
            }
        });
        // SAFETY: Xlib FFI.
        unsafe {
            xlib::XSelectInput(display, window_id, xlib::NoEventMask);
            xlib::XSync(display, xlib::False);
        }

        Ok(window)
    }

    /// Wraps an externally supplied window handle (embedding). The value 0
    /// means the root window itself.
    pub fn from_embedded(connection: &Connection, id: u64) -> Self {
        let is_root = id == 0;
        let id = if is_root { connection.root() } else { id as xlib::Window };
        info!(
            "Using externally supplied window {} ({})",
            id,
            if is_root { "root" } else { "embedded" }
        );
        ScreenWindow {
            id,
            embedded: true,
            is_root,
            saved_decorations: MwmDecorations::ALL,
            saved_functions: MwmFunctions::all() & !MwmFunctions::ALL,
            old_gravity: xlib::NorthWestGravity,
            last_hint_rect: None,
        }
    }

    #[inline]
    pub fn id(&self) -> xlib::Window {
        self.id
    }

    #[inline]
    pub fn is_embedded(&self) -> bool {
        self.embedded
    }

    /// Selects the input mask, intercepting the BadAccess a pointer grab by
    /// another client can raise. On denial the mask is downgraded to drop
    /// mouse events rather than aborting.
    pub fn select_input_witherr(&self, connection: &Connection, event_mask: c_long) {
        let display = connection.display();
        // SAFETY: Xlib FFI; scoped hook swap around a synced request pair so
        // the error, if any, is observed before the hook is removed.
        unsafe {
            xlib::XSync(display, xlib::False);
            let prev = xlib::XSetErrorHandler(Some(selectinput_error_hook));
            if let Ok(mut slot) = PREV_ERROR_HOOK.lock() {
                *slot = prev;
            }
            SELECTINPUT_ERR.store(false, Ordering::SeqCst);

            xlib::XSelectInput(display, self.id, event_mask);
            xlib::XSync(display, xlib::False);

            let prev = PREV_ERROR_HOOK.lock().map(|g| *g).unwrap_or(None);
            xlib::XSetErrorHandler(prev);
            if SELECTINPUT_ERR.load(Ordering::SeqCst) {
                warn!("Discarding mouse control: input mask downgraded after BadAccess");
                xlib::XSelectInput(
                    display,
                    self.id,
                    event_mask
                        & !(xlib::ButtonPressMask
                            | xlib::ButtonReleaseMask
                            | xlib::PointerMotionMask),
                );
            }
        }
    }

    /// Applies WM size hints for the given geometry: fixed position/size,
    /// a 4px minimum, zero base size, optional aspect lock, and static
    /// gravity so fullscreen placement is not re-interpreted by the manager.
    pub fn apply_size_hints(
        &mut self,
        connection: &Connection,
        rect: Rect,
        maximum: bool,
        keep_aspect: bool,
    ) {
        self.last_hint_rect = Some(rect);
        // SAFETY: Xlib FFI; hints struct fully initialized for its flags.
        unsafe {
            let mut hints: xlib::XSizeHints = mem::zeroed();
            hints.flags = xlib::PPosition | xlib::PSize | xlib::PMinSize;
            if keep_aspect {
                hints.flags |= xlib::PAspect;
                hints.min_aspect.x = rect.width as c_int;
                hints.min_aspect.y = rect.height as c_int;
                hints.max_aspect.x = rect.width as c_int;
                hints.max_aspect.y = rect.height as c_int;
            }
            hints.x = rect.x as c_int;
            hints.y = rect.y as c_int;
            hints.width = rect.width as c_int;
            hints.height = rect.height as c_int;
            // Minimum of 4 avoids degenerate windows and off-by-one issues in
            // scalers that need a few pixels to work with.
            hints.min_width = 4;
            hints.min_height = 4;
            if maximum {
                hints.flags |= xlib::PMaxSize;
                hints.max_width = rect.width as c_int;
                hints.max_height = rect.height as c_int;
            }
            // A zero base size keeps managers that show size feedback happy.
            hints.flags |= xlib::PBaseSize;
            hints.base_width = 0;
            hints.base_height = 0;

            hints.flags |= xlib::PWinGravity;
            hints.win_gravity = xlib::StaticGravity;
            xlib::XSetWMNormalHints(connection.display(), self.id, &mut hints);
        }
        trace!(
            "Size hints applied: ({}, {}) {}x{}",
            rect.x,
            rect.y,
            rect.width,
            rect.height
        );
    }

    /// Restores the pre-override gravity after the manager confirms a map.
    pub fn restore_gravity(&mut self, connection: &Connection) {
        let rect = match self.last_hint_rect {
            Some(rect) => rect,
            None => return,
        };
        // SAFETY: Xlib FFI; hints fully initialized.
        unsafe {
            let mut hints: xlib::XSizeHints = mem::zeroed();
            hints.flags = xlib::PPosition | xlib::PSize | xlib::PWinGravity;
            hints.x = rect.x as c_int;
            hints.y = rect.y as c_int;
            hints.width = rect.width as c_int;
            hints.height = rect.height as c_int;
            hints.win_gravity = self.old_gravity;
            xlib::XSetWMNormalHints(connection.display(), self.id, &mut hints);
        }
    }

    /// Applies or strips window-manager decorations via Motif hints.
    ///
    /// Before the first strip the current decoration and function masks are
    /// read back and remembered, so leaving fullscreen restores whatever the
    /// window had, not a hardcoded set.
    pub fn set_decorations(&mut self, connection: &Connection, atoms: &Atoms, decorated: bool) {
        if self.is_root {
            return; // the root window has no decorations to negotiate
        }
        let display = connection.display();

        if !decorated {
            self.read_back_motif_hints(connection, atoms);
        }

        let (functions, decorations) = if decorated {
            (self.saved_functions, self.saved_decorations)
        } else {
            (MwmFunctions::empty(), MwmDecorations::empty())
        };

        let hints = MotifWmHints {
            flags: MWM_HINTS_FUNCTIONS | MWM_HINTS_DECORATIONS,
            functions: functions.bits(),
            decorations: decorations.bits(),
            input_mode: 0,
            status: 0,
        };
        // SAFETY: Xlib FFI; the property data is a five-long struct matching
        // the Motif hints layout.
        unsafe {
            xlib::XChangeProperty(
                display,
                self.id,
                atoms.motif_wm_hints,
                atoms.motif_wm_hints,
                32,
                xlib::PropModeReplace,
                &hints as *const MotifWmHints as *const u8,
                5,
            );
        }
        debug!(
            "Decorations {} on window {}",
            if decorated { "restored" } else { "stripped" },
            self.id
        );
    }

    /// Reads the current Motif hints off the window into the saved masks.
    fn read_back_motif_hints(&mut self, connection: &Connection, atoms: &Atoms) {
        let mut actual_type: xlib::Atom = 0;
        let mut actual_format: c_int = 0;
        let mut nitems: c_ulong = 0;
        let mut bytes_after: c_ulong = 0;
        let mut prop: *mut u8 = std::ptr::null_mut();

        // SAFETY: Xlib FFI; out-pointers reference locals.
        unsafe {
            xlib::XGetWindowProperty(
                connection.display(),
                self.id,
                atoms.motif_wm_hints,
                0,
                20,
                xlib::False,
                atoms.motif_wm_hints,
                &mut actual_type,
                &mut actual_format,
                &mut nitems,
                &mut bytes_after,
                &mut prop,
            );
            if !prop.is_null() {
                if nitems >= 5 {
                    let hints = &*(prop as *const MotifWmHints);
                    if hints.flags & MWM_HINTS_DECORATIONS != 0 {
                        self.saved_decorations =
                            MwmDecorations::from_bits_truncate(hints.decorations);
                    }
                    if hints.flags & MWM_HINTS_FUNCTIONS != 0 {
                        self.saved_functions = MwmFunctions::from_bits_truncate(hints.functions);
                    }
                }
                xlib::XFree(prop as *mut _);
            }
        }
    }

    /// Sets the WM_CLASS hint and advertises our pid via `_NET_WM_PID`.
    fn set_class_hint(&self, connection: &Connection, atoms: &Atoms, classname: &str) -> Result<()> {
        let name = CString::new(classname)
            .map_err(|_| anyhow!("class name contains a NUL byte"))?;
        let class = CString::new("StereoVO").expect("static string");
        let pid = std::process::id() as c_ulong;
        // SAFETY: Xlib FFI; the class hint strings outlive the call.
        unsafe {
            let mut hint = xlib::XClassHint {
                res_name: name.as_ptr() as *mut c_char,
                res_class: class.as_ptr() as *mut c_char,
            };
            xlib::XSetClassHint(connection.display(), self.id, &mut hint);
            xlib::XChangeProperty(
                connection.display(),
                self.id,
                atoms.net_wm_pid,
                xlib::XA_CARDINAL,
                32,
                xlib::PropModeReplace,
                &pid as *const c_ulong as *const u8,
                1,
            );
        }
        Ok(())
    }

    /// Sets the window title.
    pub fn set_title(&self, connection: &Connection, title: &str) -> Result<()> {
        let title_c = CString::new(title).map_err(|_| anyhow!("title contains a NUL byte"))?;
        // SAFETY: Xlib FFI; the string outlives the call.
        unsafe {
            xlib::XStoreName(connection.display(), self.id, title_c.as_ptr() as *mut c_char);
        }
        Ok(())
    }

    /// Moves and resizes the window; fire-and-forget.
    pub fn move_resize(&self, connection: &Connection, rect: Rect) {
        // SAFETY: Xlib FFI.
        unsafe {
            xlib::XMoveResizeWindow(
                connection.display(),
                self.id,
                rect.x as c_int,
                rect.y as c_int,
                rect.width as c_uint,
                rect.height as c_uint,
            );
        }
    }

    /// Maps the window raised above its siblings.
    pub fn map_raised(&self, connection: &Connection) {
        // SAFETY: Xlib FFI.
        unsafe {
            xlib::XMapRaised(connection.display(), self.id);
        }
    }

    /// Raises the window.
    pub fn raise(&self, connection: &Connection) {
        // SAFETY: Xlib FFI.
        unsafe {
            xlib::XRaiseWindow(connection.display(), self.id);
        }
    }

    /// Unmaps and withdraws the window so a protocol-less window manager
    /// re-evaluates its geometry on the next map.
    pub fn unmap_withdraw(&self, connection: &Connection) {
        // SAFETY: Xlib FFI.
        unsafe {
            xlib::XUnmapWindow(connection.display(), self.id);
            xlib::XWithdrawWindow(connection.display(), self.id, connection.screen());
        }
    }

    /// Reads the window's current geometry in root coordinates.
    pub fn query_geometry(&self, connection: &Connection) -> Rect {
        let display = connection.display();
        let mut root_return: xlib::Window = 0;
        let mut x = 0 as c_int;
        let mut y = 0 as c_int;
        let mut w = 0 as c_uint;
        let mut h = 0 as c_uint;
        let mut border = 0 as c_uint;
        let mut depth = 0 as c_uint;
        let mut child: xlib::Window = 0;
        // SAFETY: Xlib FFI; out-pointers reference locals.
        unsafe {
            xlib::XGetGeometry(
                display,
                self.id,
                &mut root_return,
                &mut x,
                &mut y,
                &mut w,
                &mut h,
                &mut border,
                &mut depth,
            );
            xlib::XTranslateCoordinates(
                display,
                self.id,
                connection.root(),
                0,
                0,
                &mut x,
                &mut y,
                &mut child,
            );
        }
        Rect::new(x, y, w, h)
    }

    /// Hides the pointer over the window with an invisible pixmap cursor.
    /// Skipped when rendering to the root window.
    pub fn hide_cursor(&self, connection: &Connection) {
        if self.is_root {
            return;
        }
        let display = connection.display();
        // SAFETY: Xlib FFI; a 1x1 transparent bitmap becomes the cursor, and
        // the intermediate resources are freed once the server holds a copy.
        unsafe {
            let bitmap_data = [0u8; 8];
            let mut dummy_color: xlib::XColor = mem::zeroed();
            let pixmap = xlib::XCreateBitmapFromData(
                display,
                self.id,
                bitmap_data.as_ptr() as *const c_char,
                8,
                8,
            );
            if pixmap == 0 {
                warn!("Failed to create pixmap for invisible cursor");
                return;
            }
            let cursor = xlib::XCreatePixmapCursor(
                display,
                pixmap,
                pixmap,
                &mut dummy_color,
                &mut dummy_color,
                0,
                0,
            );
            if cursor != 0 {
                xlib::XDefineCursor(display, self.id, cursor);
                xlib::XFreeCursor(display, cursor);
            }
            xlib::XFreePixmap(display, pixmap);
        }
    }

    /// Restores the default pointer. Skipped when rendering to the root
    /// window.
    pub fn show_cursor(&self, connection: &Connection) {
        if self.is_root {
            return;
        }
        // SAFETY: Xlib FFI; cursor 0 restores the parent's cursor.
        unsafe {
            xlib::XDefineCursor(connection.display(), self.id, 0);
        }
    }

    /// Destroys the window and blocks until the server confirms, so the
    /// connection can be closed immediately afterwards. Embedded windows are
    /// left alone. Idempotent.
    pub fn destroy(&mut self, connection: &Connection) {
        if self.id == 0 || connection.is_closed() {
            return;
        }
        if self.embedded {
            debug!("Leaving externally supplied window {} alone", self.id);
            self.id = 0;
            return;
        }
        info!("Destroying X11 window (ID: {})", self.id);
        let window_id = self.id;
        // SAFETY: Xlib FFI.
        unsafe {
            xlib::XClearWindow(connection.display(), window_id);
            xlib::XUnmapWindow(connection.display(), window_id);
            xlib::XDestroyWindow(connection.display(), window_id);
        }
        wait_for_event(connection, |xev| {
            // SAFETY: discriminant checked before the union field is read.
            unsafe {
                xev.type_ == xlib::DestroyNotify && xev.destroy_window.event == window_id
            }
        });
        self.id = 0;
    }
}

impl Drop for ScreenWindow {
    fn drop(&mut self) {
        if self.id != 0 && !self.embedded {
            // destroy() needs the Connection, so drop can only flag the leak.
            warn!(
                "ScreenWindow (ID: {}) dropped without explicit destroy; server resources may leak",
                self.id
            );
        }
    }
}

/// Blocks on the connection's event stream until `matches` accepts an event.
/// Non-matching events are drained and discarded. No timeout: a dead server
/// stalls the control thread, which is the accepted failure mode here.
fn wait_for_event<F>(connection: &Connection, matches: F)
where
    F: Fn(&xlib::XEvent) -> bool,
{
    // SAFETY: XNextEvent blocks until it fills the event struct.
    unsafe {
        let mut xev: xlib::XEvent = mem::zeroed();
        loop {
            xlib::XNextEvent(connection.display(), &mut xev);
            if matches(&xev) {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_event_mask_drops_buttons_when_mouse_disabled() {
        let with_mouse = full_event_mask(false);
        let without = full_event_mask(true);
        assert_ne!(with_mouse, without);
        assert_eq!(without & xlib::ButtonPressMask, 0);
        assert_eq!(without & xlib::ButtonReleaseMask, 0);
        assert_ne!(without & xlib::KeyPressMask, 0);
    }

    #[test]
    fn motif_hints_layout_is_five_longs() {
        assert_eq!(
            mem::size_of::<MotifWmHints>(),
            5 * mem::size_of::<c_ulong>()
        );
    }
}
