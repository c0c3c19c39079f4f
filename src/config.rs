//! Runtime configuration.
//!
//! Defaults carry the tuned design values; every knob can be overridden from
//! the environment (`RAYNEO_*`), which is the only configuration surface the
//! host driver process reliably exposes.

use crate::protocol;
use crate::types::{DisplayConfig, RetryPolicy};
use std::time::Duration;

/// Gyro integration tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationConfig {
    /// Sensitivity multiplier applied to angular velocity before integration.
    pub gyro_scale: f32,
    /// Maximum rotation applied by a single sample, radians (~20°).
    pub max_step_rad: f32,
}

impl Default for OrientationConfig {
    fn default() -> Self {
        Self {
            gyro_scale: 0.2,
            max_step_rad: 0.35,
        }
    }
}

/// Button hold and double-click arbitration tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebounceConfig {
    /// Hold countdown in host frames, started by a click.
    pub hold_frames: u32,
    /// Wall-clock window in which a second app-menu click counts as a double click.
    pub double_click_window: Duration,
    /// Host frames to defer an app-menu single click while waiting for a second one.
    pub single_click_delay_frames: u32,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            hold_frames: 30,
            double_click_window: Duration::from_millis(200),
            single_click_delay_frames: 20,
        }
    }
}

/// Which display identity to look for, and how long to wait for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayTarget {
    pub product_code: u16,
    /// `None` matches any serial number.
    pub serial_number: Option<u32>,
    /// Wait for the identity to show up after the mode switch.
    pub identity_wait: RetryPolicy,
    /// Wait for the OS to place the output on the desktop.
    pub placement_wait: RetryPolicy,
    /// Grace period at provider startup. Zero disables the startup wait.
    pub startup_wait: RetryPolicy,
}

impl Default for DisplayTarget {
    fn default() -> Self {
        let interval = Duration::from_millis(250);
        Self {
            product_code: protocol::STEREO_EDID_PRODUCT,
            serial_number: Some(protocol::STEREO_EDID_SERIAL),
            identity_wait: RetryPolicy::new(Duration::from_secs(5), interval),
            placement_wait: RetryPolicy::new(Duration::from_secs(5), interval),
            startup_wait: RetryPolicy::new(Duration::from_secs(2), Duration::from_millis(200)),
        }
    }
}

/// Hardcoded placement used when display resolution fails.
pub const FALLBACK_DISPLAY: DisplayConfig = DisplayConfig {
    window_x: 2560,
    window_y: 370,
    window_width: 1920,
    window_height: 1080,
    render_width: 1920,
    render_height: 1080,
};

/// Top-level bridge configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    pub poll_timeout: Duration,
    pub orientation: OrientationConfig,
    pub debounce: DebounceConfig,
    pub display: DisplayTarget,
    pub fallback_display: DisplayConfig,
    /// Pose producer cadence.
    pub pose_interval: Duration,
    /// Reported head height while awake, meters.
    pub head_height: f64,
    /// Reported head height while the device sleeps, meters.
    pub sleeping_head_height: f64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            vendor_id: protocol::VID,
            product_id: protocol::PID,
            poll_timeout: protocol::POLL_TIMEOUT,
            orientation: OrientationConfig::default(),
            debounce: DebounceConfig::default(),
            display: DisplayTarget::default(),
            fallback_display: FALLBACK_DISPLAY,
            pose_interval: Duration::from_millis(5),
            head_height: 1.5,
            sleeping_head_height: 1.0,
        }
    }
}

impl BridgeConfig {
    /// Defaults with `RAYNEO_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        cfg.orientation.gyro_scale = read_env_f32("RAYNEO_GYRO_SCALE", cfg.orientation.gyro_scale);
        cfg.orientation.max_step_rad =
            read_env_f32("RAYNEO_MAX_STEP_RAD", cfg.orientation.max_step_rad);

        cfg.debounce.hold_frames = read_env_u32("RAYNEO_HOLD_FRAMES", cfg.debounce.hold_frames);
        cfg.debounce.double_click_window = Duration::from_millis(read_env_u32(
            "RAYNEO_DOUBLE_CLICK_MS",
            cfg.debounce.double_click_window.as_millis() as u32,
        ) as u64);
        cfg.debounce.single_click_delay_frames = read_env_u32(
            "RAYNEO_SINGLE_CLICK_FRAMES",
            cfg.debounce.single_click_delay_frames,
        );

        cfg.pose_interval = Duration::from_millis(read_env_u32(
            "RAYNEO_POSE_INTERVAL_MS",
            cfg.pose_interval.as_millis() as u32,
        ) as u64);

        cfg.display.product_code = read_env_u16("RAYNEO_EDID_PRODUCT", cfg.display.product_code);
        match std::env::var("RAYNEO_EDID_SERIAL").ok().map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "any" => cfg.display.serial_number = None,
            Some(v) => match v.parse::<u32>() {
                Ok(serial) => cfg.display.serial_number = Some(serial),
                Err(_) => {
                    log::warn!("Ignoring RAYNEO_EDID_SERIAL='{}' (expected number or 'any')", v)
                }
            },
            None => {}
        }

        let wait_ms = read_env_u32(
            "RAYNEO_DISPLAY_WAIT_MS",
            cfg.display.identity_wait.window.as_millis() as u32,
        );
        cfg.display.identity_wait.window = Duration::from_millis(wait_ms as u64);
        cfg.display.placement_wait.window = Duration::from_millis(wait_ms as u64);
        if read_env_bool("RAYNEO_SKIP_DISPLAY_WAIT", false) {
            cfg.display.startup_wait = RetryPolicy::once();
            cfg.display.identity_wait = RetryPolicy::once();
            cfg.display.placement_wait = RetryPolicy::once();
        }

        let fb = &mut cfg.fallback_display;
        fb.window_x = read_env_i32("RAYNEO_WINDOW_X", fb.window_x);
        fb.window_y = read_env_i32("RAYNEO_WINDOW_Y", fb.window_y);
        fb.window_width = read_env_u32("RAYNEO_WINDOW_WIDTH", fb.window_width);
        fb.window_height = read_env_u32("RAYNEO_WINDOW_HEIGHT", fb.window_height);
        fb.render_width = fb.window_width;
        fb.render_height = fb.window_height;

        cfg
    }
}

fn read_env_raw(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn read_env_bool(name: &str, default: bool) -> bool {
    read_env_raw(name)
        .and_then(|v| match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => {
                log::warn!("Ignoring {}='{}' (expected a boolean)", name, v);
                None
            }
        })
        .unwrap_or(default)
}

fn read_env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    read_env_raw(name)
        .and_then(|v| match v.parse::<T>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                log::warn!("Ignoring {}='{}' (unparseable)", name, v);
                None
            }
        })
        .unwrap_or(default)
}

pub(crate) fn read_env_u16(name: &str, default: u16) -> u16 {
    read_env_parsed(name, default)
}

pub(crate) fn read_env_u32(name: &str, default: u32) -> u32 {
    read_env_parsed(name, default)
}

pub(crate) fn read_env_i32(name: &str, default: i32) -> i32 {
    read_env_parsed(name, default)
}

pub(crate) fn read_env_f32(name: &str, default: f32) -> f32 {
    let v = read_env_parsed(name, default);
    if v.is_finite() {
        v
    } else {
        default
    }
}
