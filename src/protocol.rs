use std::time::Duration;

// -- USB identifiers --
pub const VID: u16 = 0x1BBB;
pub const PID: u16 = 0xAF50;

/// Bounded wait for one telemetry poll. Keeps the event loop responsive to stop.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(500);

// -- Vendor notification codes (RAYNEO_NOTIFY_*) --
pub const NOTIFY_SLEEP: u32 = 0x01;
pub const NOTIFY_WAKE: u32 = 0x02;
pub const NOTIFY_BUTTON: u32 = 0x10;
pub const NOTIFY_BUTTON_VOLUME_UP: u32 = 0x11;
pub const NOTIFY_BUTTON_VOLUME_DOWN: u32 = 0x12;
pub const NOTIFY_BUTTON_BRIGHTNESS: u32 = 0x13;
pub const NOTIFY_IMU_ON: u32 = 0x20;
pub const NOTIFY_IMU_OFF: u32 = 0x21;

// -- Display identity of the glasses once switched to 3D (side-by-side) mode --
pub const STEREO_EDID_PRODUCT: u16 = 980;
pub const STEREO_EDID_SERIAL: u32 = 17;

/// Semantic meaning of a vendor notification code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    SleepEnter,
    SleepExit,
    SystemClick,
    TriggerClick,
    GripClick,
    AppMenuClick,
    ImuOn,
    ImuOff,
    Unrecognized(u32),
}

impl Notification {
    pub fn from_code(code: u32) -> Self {
        match code {
            NOTIFY_SLEEP => Notification::SleepEnter,
            NOTIFY_WAKE => Notification::SleepExit,
            NOTIFY_BUTTON => Notification::SystemClick,
            NOTIFY_BUTTON_VOLUME_UP => Notification::TriggerClick,
            NOTIFY_BUTTON_VOLUME_DOWN => Notification::GripClick,
            NOTIFY_BUTTON_BRIGHTNESS => Notification::AppMenuClick,
            NOTIFY_IMU_ON => Notification::ImuOn,
            NOTIFY_IMU_OFF => Notification::ImuOff,
            other => Notification::Unrecognized(other),
        }
    }

    /// Button latched by this notification, if any.
    pub fn button(self) -> Option<crate::types::Button> {
        use crate::types::Button;
        match self {
            Notification::SystemClick => Some(Button::System),
            Notification::TriggerClick => Some(Button::Trigger),
            Notification::GripClick => Some(Button::Grip),
            Notification::AppMenuClick => Some(Button::AppMenu),
            _ => None,
        }
    }
}

/// Convert quaternion [w, x, y, z] to Euler angles [roll, pitch, yaw] in degrees.
///
/// Y-up, right-handed host frame, YXZ order (R = Ry * Rx * Rz):
///   roll  (about Z) = atan2(2(xy+wz), 1 - 2(x²+z²))
///   pitch (about X) = asin(2(wx-yz))
///   yaw   (about Y) = atan2(2(xz+wy), 1 - 2(x²+y²))
pub fn quaternion_to_euler(w: f32, x: f32, y: f32, z: f32) -> [f32; 3] {
    let roll = (2.0 * (x * y + w * z)).atan2(1.0 - 2.0 * (x * x + z * z));
    let pitch = (2.0 * (w * x - y * z)).clamp(-1.0, 1.0).asin();
    let yaw = (2.0 * (x * z + w * y)).atan2(1.0 - 2.0 * (x * x + y * y));
    [roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Button;

    #[test]
    fn test_notification_mapping() {
        assert_eq!(Notification::from_code(NOTIFY_SLEEP), Notification::SleepEnter);
        assert_eq!(Notification::from_code(NOTIFY_WAKE), Notification::SleepExit);
        assert_eq!(
            Notification::from_code(NOTIFY_BUTTON_VOLUME_UP).button(),
            Some(Button::Trigger)
        );
        assert_eq!(
            Notification::from_code(NOTIFY_BUTTON_VOLUME_DOWN).button(),
            Some(Button::Grip)
        );
        assert_eq!(
            Notification::from_code(NOTIFY_BUTTON_BRIGHTNESS).button(),
            Some(Button::AppMenu)
        );
        assert_eq!(Notification::from_code(NOTIFY_BUTTON).button(), Some(Button::System));
        assert_eq!(Notification::from_code(NOTIFY_IMU_OFF).button(), None);
        assert_eq!(Notification::from_code(0xBEEF), Notification::Unrecognized(0xBEEF));
    }

    #[test]
    fn test_quaternion_to_euler_identity() {
        let euler = quaternion_to_euler(1.0, 0.0, 0.0, 0.0);
        assert!(euler.iter().all(|a| a.abs() < 1e-5));
    }

    #[test]
    fn test_quaternion_to_euler_yaw() {
        // 90° about +Y
        let h = std::f32::consts::FRAC_PI_4;
        let euler = quaternion_to_euler(h.cos(), 0.0, h.sin(), 0.0);
        assert!(euler[0].abs() < 1e-3);
        assert!(euler[1].abs() < 1e-3);
        assert!((euler[2] - 90.0).abs() < 1e-3);
    }
}
