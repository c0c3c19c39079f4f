use std::time::Duration;

/// One gyroscope sample delivered by the telemetry channel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImuSample {
    /// Angular velocity [x, y, z] in rad/s. All-zero when the device only filled `gyro_dps`.
    pub gyro_rad: [f32; 3],
    /// Angular velocity [x, y, z] in deg/s.
    pub gyro_dps: [f32; 3],
    /// Accelerometer [x, y, z] in g. Carried for diagnostics only.
    pub accel: [f32; 3],
    /// Device clock, assumed milliseconds. 0 is never a valid reference.
    pub tick: u32,
    pub valid: bool,
}

impl ImuSample {
    /// Sample carrying only a rad/s vector.
    pub fn from_rad(gyro_rad: [f32; 3], tick: u32) -> Self {
        Self {
            gyro_rad,
            tick,
            valid: true,
            ..Default::default()
        }
    }

    /// Angular velocity in rad/s, falling back to the deg/s vector when the
    /// rad/s one was left empty by the device.
    pub fn angular_velocity(&self) -> [f32; 3] {
        if self.gyro_rad.iter().any(|&c| c != 0.0) {
            return self.gyro_rad;
        }
        let [x, y, z] = self.gyro_dps;
        [x.to_radians(), y.to_radians(), z.to_radians()]
    }
}

/// Device information answer to a `request_device_info` query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceInfo {
    pub tick: u32,
    pub sensor_on: bool,
    pub board_id: i32,
    pub date: String,
    pub flag: i32,
    pub glasses_fps: i32,
}

/// Typed event yielded by a telemetry channel.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    Attached,
    Detached,
    Imu(ImuSample),
    DeviceInfo(DeviceInfo),
    Notify { code: u32, message: String },
    Log { level: i32, message: String },
}

/// Logical buttons exposed to the host.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    System = 0,
    /// Repurposed from the volume-up key.
    Trigger = 1,
    /// Repurposed from the volume-down key.
    Grip = 2,
    /// Repurposed from the brightness key. Double click recenters.
    AppMenu = 3,
}

impl Button {
    pub const COUNT: usize = 4;
    pub const ALL: [Button; Button::COUNT] =
        [Button::System, Button::Trigger, Button::Grip, Button::AppMenu];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn flag(self) -> Buttons {
        match self {
            Button::System => Buttons::SYSTEM,
            Button::Trigger => Buttons::TRIGGER,
            Button::Grip => Buttons::GRIP,
            Button::AppMenu => Buttons::APP_MENU,
        }
    }

    /// Input component path in the host's input profile.
    pub fn component_path(self) -> &'static str {
        match self {
            Button::System => "/input/system/click",
            Button::Trigger => "/input/trigger/click",
            Button::Grip => "/input/grip/click",
            Button::AppMenu => "/input/application_menu/click",
        }
    }
}

bitflags::bitflags! {
    /// Set of buttons currently reading as pressed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[repr(C)]
    pub struct Buttons: u32 {
        const SYSTEM   = 1 << 0;
        const TRIGGER  = 1 << 1;
        const GRIP     = 1 << 2;
        const APP_MENU = 1 << 3;
    }
}

/// Tracking status reported alongside each pose.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingStatus {
    RunningOk = 0,
    /// Device asleep: pose is stale and flagged invalid.
    OutOfRange = 1,
}

/// One pose report handed to the host.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseReport {
    /// Recenter-relative orientation [qx, qy, qz, qw], always unit norm.
    pub quaternion: [f32; 4],
    /// Fixed seated position in meters [x, y, z]. 3DoF only.
    pub position: [f64; 3],
    /// Euler angles [roll, pitch, yaw] in degrees, for diagnostics.
    pub euler_deg: [f32; 3],
    pub pose_is_valid: bool,
    pub device_is_connected: bool,
    pub tracking: TrackingStatus,
    /// Host steady-clock timestamp in seconds since the producer started.
    pub host_timestamp_s: f64,
}

/// A rectangle in virtual-desktop coordinates.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    Left = 0,
    Right = 1,
}

/// Per-eye viewport inside the device window.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Window and render target the compositor uses for the device.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayConfig {
    pub window_x: i32,
    pub window_y: i32,
    pub window_width: u32,
    pub window_height: u32,
    pub render_width: u32,
    pub render_height: u32,
}

impl DisplayConfig {
    pub fn window_bounds(&self) -> Rect {
        Rect {
            x: self.window_x,
            y: self.window_y,
            width: self.window_width,
            height: self.window_height,
        }
    }

    /// Side-by-side stereo: each eye gets half the window width at full height.
    pub fn eye_viewport(&self, eye: Eye) -> Viewport {
        let half = self.window_width / 2;
        Viewport {
            x: match eye {
                Eye::Left => 0,
                Eye::Right => half,
            },
            y: 0,
            width: half,
            height: self.window_height,
        }
    }
}

/// Result of one host frame of button processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameReport {
    /// Buttons reading as pressed after this frame.
    pub pressed: Buttons,
    /// A double click on the app-menu button requested a recenter this frame.
    pub recenter: bool,
}

/// Bounded retry window for operations that wait on the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub window: Duration,
    pub interval: Duration,
}

impl RetryPolicy {
    pub const fn new(window: Duration, interval: Duration) -> Self {
        Self { window, interval }
    }

    /// Single attempt, no sleeping.
    pub const fn once() -> Self {
        Self {
            window: Duration::ZERO,
            interval: Duration::ZERO,
        }
    }

    /// Number of attempts that fit in the window, at least one.
    pub fn attempts(&self) -> u32 {
        if self.interval.is_zero() {
            return 1;
        }
        let n = self.window.as_nanos().div_ceil(self.interval.as_nanos());
        n.clamp(1, u32::MAX as u128) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_angular_velocity_falls_back_to_dps() {
        let sample = ImuSample {
            gyro_dps: [180.0, 0.0, -90.0],
            tick: 10,
            valid: true,
            ..Default::default()
        };
        let w = sample.angular_velocity();
        assert!((w[0] - std::f32::consts::PI).abs() < 1e-6);
        assert_eq!(w[1], 0.0);
        assert!((w[2] + std::f32::consts::FRAC_PI_2).abs() < 1e-6);

        let rad = ImuSample::from_rad([0.1, 0.0, 0.0], 10);
        assert_eq!(rad.angular_velocity(), [0.1, 0.0, 0.0]);
    }

    #[test]
    fn test_eye_viewports_split_window() {
        let cfg = DisplayConfig {
            window_x: 2560,
            window_y: 370,
            window_width: 1920,
            window_height: 1080,
            render_width: 1920,
            render_height: 1080,
        };
        assert_eq!(
            cfg.eye_viewport(Eye::Left),
            Viewport { x: 0, y: 0, width: 960, height: 1080 }
        );
        assert_eq!(cfg.eye_viewport(Eye::Right).x, 960);
        assert_eq!(cfg.window_bounds().x, 2560);
    }

    #[test]
    fn test_retry_policy_attempts() {
        assert_eq!(RetryPolicy::once().attempts(), 1);
        let p = RetryPolicy::new(Duration::from_secs(5), Duration::from_millis(250));
        assert_eq!(p.attempts(), 20);
        let p = RetryPolicy::new(Duration::from_millis(10), Duration::from_millis(3));
        assert_eq!(p.attempts(), 4);
    }
}
