//! Vendor telemetry library binding (`vendor-sdk` feature).
//!
//! Links against the vendor's `RayNeoSDK` shared library and adapts its
//! context/poll API to [`TelemetryChannel`].

use crate::channel::{Connector, TelemetryChannel};
use crate::types::{DeviceInfo, ImuSample, TelemetryEvent};
use crate::{BridgeError, Result};
use std::ffi::{c_char, c_void};
use std::time::Duration;

type RawContext = *mut c_void;

const RAYNEO_OK: i32 = 0;

const EVENT_DEVICE_ATTACHED: u32 = 1;
const EVENT_DEVICE_DETACHED: u32 = 2;
const EVENT_IMU_SAMPLE: u32 = 3;
const EVENT_DEVICE_INFO: u32 = 4;
const EVENT_NOTIFY: u32 = 5;
const EVENT_LOG: u32 = 6;

#[repr(C)]
#[derive(Clone, Copy)]
struct RawImu {
    gyro_dps: [f32; 3],
    gyro_rad: [f32; 3],
    accel: [f32; 3],
    tick: u32,
    valid: bool,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct RawInfo {
    tick: u32,
    sensor_on: i32,
    board_id: i32,
    date: [c_char; 64],
    flag: i32,
    glasses_fps: i32,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct RawNotify {
    code: u32,
    message: [c_char; 256],
}

#[repr(C)]
#[derive(Clone, Copy)]
struct RawLog {
    level: i32,
    message: [c_char; 256],
}

#[repr(C)]
#[derive(Clone, Copy)]
union RawEventData {
    imu: RawImu,
    info: RawInfo,
    notify: RawNotify,
    log: RawLog,
    reserved: [u8; 1024],
}

#[repr(C)]
struct RawEvent {
    kind: u32,
    data: RawEventData,
}

#[link(name = "RayNeoSDK")]
extern "C" {
    fn Rayneo_Create(ctx: *mut RawContext) -> i32;
    fn Rayneo_Destroy(ctx: RawContext);
    fn Rayneo_SetTargetVidPid(ctx: RawContext, vid: u16, pid: u16) -> i32;
    fn Rayneo_Start(ctx: RawContext, flags: u32) -> i32;
    fn Rayneo_Stop(ctx: RawContext) -> i32;
    fn Rayneo_EnableImu(ctx: RawContext) -> i32;
    fn Rayneo_DisableImu(ctx: RawContext) -> i32;
    fn Rayneo_RequestDeviceInfo(ctx: RawContext) -> i32;
    fn Rayneo_PollEvent(ctx: RawContext, event: *mut RawEvent, timeout_ms: u32) -> i32;
}

/// Connector backed by the vendor library.
#[derive(Debug, Default, Clone, Copy)]
pub struct SdkConnector;

impl Connector for SdkConnector {
    fn connect(&self, vendor_id: u16, product_id: u16) -> Result<Box<dyn TelemetryChannel>> {
        let mut ctx: RawContext = std::ptr::null_mut();
        let rc = unsafe { Rayneo_Create(&mut ctx) };
        if rc != RAYNEO_OK || ctx.is_null() {
            return Err(BridgeError::ChannelCreate(format!("Rayneo_Create returned {}", rc)));
        }
        let channel = SdkChannel { ctx };
        let rc = unsafe { Rayneo_SetTargetVidPid(channel.ctx, vendor_id, product_id) };
        if rc != RAYNEO_OK {
            return Err(BridgeError::ChannelCreate(format!(
                "Rayneo_SetTargetVidPid returned {}",
                rc
            )));
        }
        Ok(Box::new(channel))
    }
}

/// Owned vendor context. Destroyed on drop.
struct SdkChannel {
    ctx: RawContext,
}

// The context is only ever used from the thread that currently owns the channel.
unsafe impl Send for SdkChannel {}

fn check(rc: i32, call: &str) -> Result<()> {
    if rc == RAYNEO_OK {
        Ok(())
    } else {
        Err(BridgeError::Telemetry(format!("{} returned {}", call, rc)))
    }
}

fn c_text(raw: &[c_char]) -> String {
    let bytes: Vec<u8> = raw
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

impl TelemetryChannel for SdkChannel {
    fn start(&mut self) -> Result<()> {
        let rc = unsafe { Rayneo_Start(self.ctx, 0) };
        if rc != RAYNEO_OK {
            return Err(BridgeError::ChannelStart(format!(
                "Rayneo_Start returned {} (device not found?)",
                rc
            )));
        }
        Ok(())
    }

    fn enable_imu(&mut self) -> Result<()> {
        check(unsafe { Rayneo_EnableImu(self.ctx) }, "Rayneo_EnableImu")
    }

    fn disable_imu(&mut self) -> Result<()> {
        check(unsafe { Rayneo_DisableImu(self.ctx) }, "Rayneo_DisableImu")
    }

    fn request_device_info(&mut self) -> Result<()> {
        check(
            unsafe { Rayneo_RequestDeviceInfo(self.ctx) },
            "Rayneo_RequestDeviceInfo",
        )
    }

    fn poll_event(&mut self, timeout: Duration) -> Result<Option<TelemetryEvent>> {
        let mut raw = RawEvent {
            kind: 0,
            data: RawEventData { reserved: [0; 1024] },
        };
        let timeout_ms = timeout.as_millis().min(u32::MAX as u128) as u32;
        if unsafe { Rayneo_PollEvent(self.ctx, &mut raw, timeout_ms) } != RAYNEO_OK {
            return Ok(None);
        }

        // Each arm reads the union member the event kind selects.
        let event = unsafe {
            match raw.kind {
                EVENT_DEVICE_ATTACHED => TelemetryEvent::Attached,
                EVENT_DEVICE_DETACHED => TelemetryEvent::Detached,
                EVENT_IMU_SAMPLE => {
                    let s = raw.data.imu;
                    TelemetryEvent::Imu(ImuSample {
                        gyro_rad: s.gyro_rad,
                        gyro_dps: s.gyro_dps,
                        accel: s.accel,
                        tick: s.tick,
                        valid: s.valid,
                    })
                }
                EVENT_DEVICE_INFO => {
                    let i = raw.data.info;
                    TelemetryEvent::DeviceInfo(DeviceInfo {
                        tick: i.tick,
                        sensor_on: i.sensor_on != 0,
                        board_id: i.board_id,
                        date: c_text(&i.date),
                        flag: i.flag,
                        glasses_fps: i.glasses_fps,
                    })
                }
                EVENT_NOTIFY => TelemetryEvent::Notify {
                    code: raw.data.notify.code,
                    message: c_text(&raw.data.notify.message),
                },
                EVENT_LOG => TelemetryEvent::Log {
                    level: raw.data.log.level,
                    message: c_text(&raw.data.log.message),
                },
                other => {
                    log::trace!("Ignoring vendor event type {}", other);
                    return Ok(None);
                }
            }
        };
        Ok(Some(event))
    }

    fn stop(&mut self) {
        let rc = unsafe { Rayneo_Stop(self.ctx) };
        if rc != RAYNEO_OK {
            log::warn!("Rayneo_Stop returned {}", rc);
        }
    }
}

impl Drop for SdkChannel {
    fn drop(&mut self) {
        unsafe { Rayneo_Destroy(self.ctx) };
    }
}
