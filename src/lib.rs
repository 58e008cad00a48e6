// src/lib.rs

//! Dual-display X11 window management core for stereoscopic video output.
//!
//! This crate manages two independent X display connections, one per eye of
//! a stereoscopic rig, and keeps their windows geometrically and temporally
//! in step: window-manager capability probing, fullscreen/layer negotiation
//! across incompatible WM protocol generations, side-by-side placement when
//! both eyes share one physical output, and colormap-based equalizer changes
//! fanned out to both screens.
//!
//! The entry point is [`x11::StereoOutput`]. Pixel transfer and decode
//! pipelines are out of scope; callers receive normalized [`events::VoEvent`]
//! notifications and drive toggles through the coordinator.

pub mod config;
pub mod events;
pub mod geometry;
pub mod keys;
pub mod x11;

pub use config::Config;
pub use events::VoEvent;
pub use geometry::Rect;
pub use crate::x11::StereoOutput;
