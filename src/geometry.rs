// src/geometry.rs

//! Rectangles and the pure placement math for dual-eye fullscreen.
//!
//! Everything here is side-effect free so the split and multi-output
//! selection rules can be tested without a display server.

use crate::x11::screen::Side;
use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in root-window coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    /// Center point, used for auto output selection.
    pub fn center(&self) -> (i32, i32) {
        (
            self.x + self.width as i32 / 2,
            self.y + self.height as i32 / 2,
        )
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x
            && x <= self.x + self.width as i32
            && y >= self.y
            && y <= self.y + self.height as i32
    }
}

/// Computes one eye's fullscreen target rectangle.
///
/// When both eyes share a single display connection the output is framed
/// side-by-side: each eye gets half the width at full height, LEFT at the
/// output origin and RIGHT offset by the half-width. With distinct
/// connections each eye simply covers its own output.
pub fn eye_fullscreen_rect(side: Side, shared_display: bool, output: Rect) -> Rect {
    if !shared_display {
        return output;
    }
    let half = output.width / 2;
    match side {
        Side::Left => Rect::new(output.x, output.y, half, output.height),
        Side::Right => Rect::new(output.x + half as i32, output.y, half, output.height),
    }
}

/// Selects the target output rectangle from a multi-output enumeration.
///
/// `configured` of -1 means auto: pick whichever output contains the current
/// window's center point, scanning from the last output down. A configured
/// index past the end is clamped to the last output.
pub fn pick_output(outputs: &[Rect], configured: i32, window_center: (i32, i32)) -> Option<Rect> {
    if outputs.is_empty() {
        return None;
    }
    let mut index = configured;
    if index >= outputs.len() as i32 {
        index = outputs.len() as i32 - 1;
    }
    if index == -1 {
        let (cx, cy) = window_center;
        index = (0..outputs.len() as i32)
            .rev()
            .find(|&i| outputs[i as usize].contains(cx, cy))
            .unwrap_or(-1);
    }
    if index < 0 {
        index = 0;
    }
    Some(outputs[index as usize])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_display_splits_side_by_side() {
        let output = Rect::new(0, 0, 1920, 1080);
        assert_eq!(
            eye_fullscreen_rect(Side::Left, true, output),
            Rect::new(0, 0, 960, 1080)
        );
        assert_eq!(
            eye_fullscreen_rect(Side::Right, true, output),
            Rect::new(960, 0, 960, 1080)
        );
    }

    #[test]
    fn split_respects_output_origin() {
        let output = Rect::new(1920, 0, 1280, 720);
        assert_eq!(
            eye_fullscreen_rect(Side::Right, true, output),
            Rect::new(1920 + 640, 0, 640, 720)
        );
    }

    #[test]
    fn distinct_displays_use_full_output() {
        let output = Rect::new(0, 0, 1280, 1024);
        assert_eq!(eye_fullscreen_rect(Side::Left, false, output), output);
        assert_eq!(eye_fullscreen_rect(Side::Right, false, output), output);
    }

    #[test]
    fn auto_output_selection_finds_containing_output() {
        let outputs = [Rect::new(0, 0, 1920, 1080), Rect::new(1920, 0, 1280, 1024)];
        assert_eq!(
            pick_output(&outputs, -1, (2000, 100)),
            Some(outputs[1])
        );
        assert_eq!(pick_output(&outputs, -1, (10, 10)), Some(outputs[0]));
    }

    #[test]
    fn auto_selection_falls_back_to_first_output() {
        let outputs = [Rect::new(0, 0, 800, 600)];
        // Center is off every output (window dragged off-screen).
        assert_eq!(pick_output(&outputs, -1, (-500, -500)), Some(outputs[0]));
    }

    #[test]
    fn configured_index_is_clamped() {
        let outputs = [Rect::new(0, 0, 800, 600), Rect::new(800, 0, 800, 600)];
        assert_eq!(pick_output(&outputs, 7, (0, 0)), Some(outputs[1]));
        assert_eq!(pick_output(&outputs, 1, (0, 0)), Some(outputs[1]));
        assert_eq!(pick_output(&[], 0, (0, 0)), None);
    }
}
