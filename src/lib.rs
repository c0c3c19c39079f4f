//! # rayneo-bridge - runtime core for RayNeo head-mounted displays
//!
//! Presents a RayNeo display-glasses device to a VR host runtime as a
//! 3DoF head-mounted display. Provides:
//! - Telemetry session lifecycle over the vendor channel (IMU, notifications)
//! - Gyro integration into a recenterable head orientation
//! - Per-frame button debounce with double-click recenter
//! - EDID-based discovery of the glasses' desktop output and eye viewports
//! - C FFI for the host runtime glue
//!
//! ## Quick Start
//! ```no_run
//! use rayneo_bridge::{Bridge, BridgeConfig, Eye};
//! use std::time::Duration;
//!
//! let mut bridge = Bridge::init(BridgeConfig::from_env());
//! println!("window: {:?}", bridge.display_config().window_bounds());
//! println!("left eye: {:?}", bridge.eye_viewport(Eye::Left));
//!
//! bridge.activate().unwrap();
//! for _ in 0..100 {
//!     bridge.run_frame();
//!     let pose = bridge.next_pose(Duration::from_secs(1)).unwrap();
//!     println!("q: {:?} valid: {}", pose.quaternion, pose.pose_is_valid);
//! }
//! ```

pub mod error;
pub mod types;
pub mod protocol;
pub mod config;
pub mod orientation;
pub mod debounce;
pub mod channel;
#[cfg(feature = "vendor-sdk")]
pub mod sdk;
pub mod device;
pub mod session;
pub mod edid;
pub mod display;
#[cfg(target_os = "linux")]
pub mod display_x11;
#[cfg(windows)]
pub mod display_win;
pub mod pose;
pub mod bridge;
pub mod ffi;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use error::BridgeError;
pub use types::*;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
