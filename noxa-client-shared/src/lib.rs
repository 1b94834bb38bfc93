//! Pieces shared by Noxa front ends: configuration, and the bridge to the
//! system's media controls.
pub mod config;

#[cfg(feature = "media-controls")]
pub mod controls;
