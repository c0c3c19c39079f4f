//! C FFI layer for the host runtime glue.
//!
//! One opaque bridge handle per process. The generated C header is written to
//! `include/rayneo_bridge.h` by cbindgen.
//!
//! Every function except `rn_bridge_destroy` may be called from any thread,
//! concurrently: the host frame thread and the pose reader share one handle.

use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::error::LastError;
use crate::types::{Button, DisplayConfig, Eye, PoseReport, Viewport};
use std::ffi::{c_char, c_int};
use std::time::Duration;

static LAST_ERROR: LastError = LastError::new();

/// Opaque bridge handle for C consumers.
pub struct RnBridge(Bridge);

/// Per-frame result in C-compatible layout.
#[repr(C)]
pub struct RnFrame {
    /// Bitmask of pressed buttons, one bit per `Button`.
    pub pressed: u32,
    /// Non-zero when a double click recentered this frame.
    pub recentered: bool,
}

/// Create the bridge with `RAYNEO_*` environment configuration.
///
/// Blocks while the display is resolved (bounded). Never returns NULL unless
/// allocation fails; a missing device only disables tracking.
#[no_mangle]
pub extern "C" fn rn_bridge_create() -> *mut RnBridge {
    LAST_ERROR.clear();
    let bridge = Bridge::init(BridgeConfig::from_env());
    if let Some(e) = bridge.init_error() {
        LAST_ERROR.set(e);
    }
    Box::into_raw(Box::new(RnBridge(bridge)))
}

/// Shut down and free the bridge.
///
/// # Safety
/// `bridge` must be a pointer returned by `rn_bridge_create`, or null. No
/// other call on the same handle may be in flight or follow.
#[no_mangle]
pub unsafe extern "C" fn rn_bridge_destroy(bridge: *mut RnBridge) {
    if !bridge.is_null() {
        drop(Box::from_raw(bridge));
    }
}

/// Start the background pose producer. Returns 0 on success, -1 on error.
///
/// # Safety
/// `bridge` must be a valid bridge pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn rn_bridge_activate(bridge: *const RnBridge) -> c_int {
    if bridge.is_null() {
        return -1;
    }
    match (*bridge).0.activate() {
        Ok(()) => 0,
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Stop the background pose producer.
///
/// # Safety
/// `bridge` must be a valid bridge pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn rn_bridge_deactivate(bridge: *const RnBridge) {
    if !bridge.is_null() {
        (*bridge).0.deactivate();
    }
}

/// Run one host frame of button processing.
///
/// # Safety
/// `bridge` must be a valid bridge pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn rn_bridge_run_frame(bridge: *const RnBridge) -> RnFrame {
    if bridge.is_null() {
        return RnFrame {
            pressed: 0,
            recentered: false,
        };
    }
    let report = (*bridge).0.run_frame();
    RnFrame {
        pressed: report.pressed.bits(),
        recentered: report.recenter,
    }
}

/// Whether `button` currently reads as pressed.
///
/// # Safety
/// `bridge` must be a valid bridge pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn rn_bridge_is_pressed(bridge: *const RnBridge, button: Button) -> bool {
    if bridge.is_null() {
        return false;
    }
    (*bridge).0.is_pressed(button)
}

/// Write the current pose. Returns 0 on success, -1 on null arguments.
///
/// # Safety
/// `bridge` and `pose` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn rn_bridge_get_pose(
    bridge: *const RnBridge,
    pose: *mut PoseReport,
) -> c_int {
    if bridge.is_null() || pose.is_null() {
        return -1;
    }
    pose.write((*bridge).0.pose());
    0
}

/// Receive the next pose from the producer.
/// `timeout_ms`: 0 = latest without blocking, -1 = block up to one second.
/// Returns 0 on success, -1 on error/timeout.
///
/// # Safety
/// `bridge` and `pose` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn rn_bridge_next_pose(
    bridge: *const RnBridge,
    pose: *mut PoseReport,
    timeout_ms: c_int,
) -> c_int {
    if bridge.is_null() || pose.is_null() {
        return -1;
    }
    let timeout = match timeout_ms {
        0 => Duration::ZERO,
        t if t < 0 => Duration::from_secs(1),
        t => Duration::from_millis(t as u64),
    };
    match (*bridge).0.next_pose(timeout) {
        Ok(report) => {
            pose.write(report);
            0
        }
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Redefine forward as the current heading.
///
/// # Safety
/// `bridge` must be a valid bridge pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn rn_bridge_recenter(bridge: *const RnBridge) {
    if !bridge.is_null() {
        (*bridge).0.recenter();
    }
}

/// Whether the telemetry session is running.
///
/// # Safety
/// `bridge` must be a valid bridge pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn rn_bridge_is_tracking(bridge: *const RnBridge) -> bool {
    !bridge.is_null() && (*bridge).0.is_tracking()
}

/// Write the resolved display configuration. Returns 0 on success.
///
/// # Safety
/// `bridge` and `out` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn rn_bridge_display_config(
    bridge: *const RnBridge,
    out: *mut DisplayConfig,
) -> c_int {
    if bridge.is_null() || out.is_null() {
        return -1;
    }
    out.write((*bridge).0.display_config());
    0
}

/// Write the viewport of one eye. Returns 0 on success.
///
/// # Safety
/// `bridge` and `out` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn rn_bridge_eye_viewport(
    bridge: *const RnBridge,
    eye: Eye,
    out: *mut Viewport,
) -> c_int {
    if bridge.is_null() || out.is_null() {
        return -1;
    }
    out.write((*bridge).0.eye_viewport(eye));
    0
}

/// Get the last error message. Returns NULL if no error.
/// The returned pointer is valid until the next bridge API call.
#[no_mangle]
pub extern "C" fn rn_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}
