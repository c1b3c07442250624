//! Real-time multi-person 3D pose estimation.
//!
//! This library contains the building blocks of the `lightpose` application: frame sources
//! (webcams, animations, still images), a [tract]-based inference engine for
//! Lightweight-OpenPose-style networks, heatmap/PAF pose decoding, and a small wgpu GUI for
//! displaying the annotated stream alongside an orbitable 3D skeleton view.
//!
//! # 3D Coordinates
//!
//! Decoded keypoints carry root-relative 3D positions in the network's metric space (roughly
//! centimeters). X points right and Y points *down*, matching the input image; Z points away from
//! the camera. Camera extrinsics, when configured, rotate these positions into the world frame.
//!
//! [tract]: https://github.com/sonos/tract

use log::LevelFilter;

pub mod decode;
pub mod draw;
pub mod extrinsics;
pub mod filter;
pub mod gui;
pub mod image;
pub mod iter;
pub mod nn;
pub mod num;
pub mod pipeline;
pub mod playback;
pub mod plot;
pub mod pose;
pub mod render;
pub mod scale;
pub mod source;
pub mod timer;

/// Implementation detail of [`init_logger!`].
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .filter(Some("wgpu"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Installs the stderr logger used by the application binary.
///
/// The calling crate and `lightpose` will log at *debug* level, `wgpu` at *warn* level. The
/// defaults can be overridden via `RUST_LOG`.
///
/// Does nothing when a logger is already registered.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
