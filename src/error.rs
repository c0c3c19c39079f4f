use std::fmt;

/// Errors raised by the bridge core.
///
/// None of these terminate the process: callers at the composition root log
/// them and fall back to identity orientation or default window placement.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("Device not found (VID={vid:04X} PID={pid:04X})")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Telemetry channel creation failed: {0}")]
    ChannelCreate(String),

    #[error("Telemetry channel start failed: {0}")]
    ChannelStart(String),

    #[error("Telemetry request failed: {0}")]
    Telemetry(String),

    #[error("Telemetry channel is owned by the running event loop")]
    ChannelBusy,

    #[error("No device session is open")]
    NotOpen,

    #[error("Vendor telemetry SDK not available in this build")]
    SdkUnavailable,

    #[error("Thread error: {0}")]
    Thread(String),

    #[error("Display enumeration failed: {0}")]
    DisplayEnumeration(String),

    #[error("Matching display output not found")]
    DisplayNotFound,

    #[error("Timeout waiting for data")]
    Timeout,

    #[error("Pose stream stopped")]
    StreamStopped,
}

/// Thread-safe last-error storage for the C FFI layer.
pub(crate) struct LastError {
    message: std::sync::Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: std::sync::Mutex::new(String::new()),
        }
    }

    pub fn set(&self, err: &BridgeError) {
        if let Ok(mut msg) = self.message.lock() {
            *msg = fmt::format(format_args!("{}\0", err));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut msg) = self.message.lock() {
            msg.clear();
        }
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        match self.message.lock() {
            Ok(msg) if !msg.is_empty() => msg.as_ptr() as *const std::ffi::c_char,
            _ => std::ptr::null(),
        }
    }
}
