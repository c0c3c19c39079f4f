//! Device session manager.
//!
//! Owns the telemetry channel lifecycle (open, start, configure, stop, close)
//! and the single event loop thread that dispatches channel events into the
//! orientation integrator and the notification latch.

use crate::channel::{Connector, TelemetryChannel};
use crate::debounce::NotificationLatch;
use crate::orientation::Orientation;
use crate::types::{DeviceInfo, TelemetryEvent};
use crate::{BridgeError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Pause after a failed poll so a broken channel cannot spin the loop.
const POLL_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Shared state the event loop writes into.
#[derive(Debug, Clone)]
pub struct SessionSinks {
    pub orientation: Arc<Orientation>,
    pub latch: Arc<NotificationLatch>,
}

/// One open hardware channel.
///
/// The channel handle lives here until the event loop starts; from then on
/// the loop thread owns it and hands it back when joined.
pub struct DeviceSession {
    vendor_id: u16,
    product_id: u16,
    channel: Option<Box<dyn TelemetryChannel>>,
    started: bool,
    imu_enabled: bool,
    running: Arc<AtomicBool>,
    stop_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<Box<dyn TelemetryChannel>>>,
}

impl DeviceSession {
    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    pub fn product_id(&self) -> u16 {
        self.product_id
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// True while the event loop thread is polling. Cleared by the loop itself
    /// when it observes a detach.
    pub fn is_event_thread_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn channel_mut(&mut self) -> Result<&mut Box<dyn TelemetryChannel>> {
        self.channel.as_mut().ok_or(BridgeError::ChannelBusy)
    }
}

/// Owns at most one [`DeviceSession`] at a time.
pub struct SessionManager {
    connector: Box<dyn Connector>,
    sinks: SessionSinks,
    poll_timeout: Duration,
    session: Option<DeviceSession>,
}

impl SessionManager {
    pub fn new(connector: Box<dyn Connector>, sinks: SessionSinks, poll_timeout: Duration) -> Self {
        Self {
            connector,
            sinks,
            poll_timeout,
            session: None,
        }
    }

    pub fn sinks(&self) -> &SessionSinks {
        &self.sinks
    }

    pub fn session(&self) -> Option<&DeviceSession> {
        self.session.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_started(&self) -> bool {
        self.session.as_ref().is_some_and(DeviceSession::is_started)
    }

    pub fn is_event_thread_running(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(DeviceSession::is_event_thread_running)
    }

    /// Open a channel to the given device. Returns the existing session if one
    /// is already open.
    pub fn open(&mut self, vendor_id: u16, product_id: u16) -> Result<&DeviceSession> {
        if self.session.is_none() {
            let channel = self.connector.connect(vendor_id, product_id)?;
            log::info!(
                "Telemetry channel opened (VID={:04X} PID={:04X})",
                vendor_id,
                product_id
            );
            self.session = Some(DeviceSession {
                vendor_id,
                product_id,
                channel: Some(channel),
                started: false,
                imu_enabled: false,
                running: Arc::new(AtomicBool::new(false)),
                stop_flag: Arc::new(AtomicBool::new(false)),
                thread: None,
            });
        } else {
            log::debug!("Telemetry channel already open, reusing session");
        }
        self.session.as_ref().ok_or(BridgeError::NotOpen)
    }

    /// Start the device. On failure the session stays open but not started.
    pub fn start(&mut self) -> Result<()> {
        let session = self.session.as_mut().ok_or(BridgeError::NotOpen)?;
        if session.started {
            return Ok(());
        }
        match session.channel_mut()?.start() {
            Ok(()) => {
                session.started = true;
                log::info!("Telemetry channel started");
                Ok(())
            }
            Err(e) => Err(match e {
                BridgeError::ChannelStart(_) => e,
                other => BridgeError::ChannelStart(other.to_string()),
            }),
        }
    }

    /// Ask the device to stream IMU samples. Callers treat failure as a warning.
    pub fn enable_telemetry_stream(&mut self) -> Result<()> {
        let session = self.session.as_mut().ok_or(BridgeError::NotOpen)?;
        session.channel_mut()?.enable_imu()?;
        session.imu_enabled = true;
        self.sinks.latch.set_imu_streaming(true);
        log::info!("IMU stream enabled");
        Ok(())
    }

    /// Fire a device-info query. The answer is logged by the event loop.
    pub fn request_device_info(&mut self) -> Result<()> {
        let session = self.session.as_mut().ok_or(BridgeError::NotOpen)?;
        session.channel_mut()?.request_device_info()
    }

    /// Hand the channel to a new event loop thread.
    ///
    /// Requires a started session. A second call while the loop runs is a no-op.
    pub fn spawn_event_loop(&mut self) -> Result<()> {
        let session = self.session.as_mut().ok_or(BridgeError::NotOpen)?;
        if !session.started {
            return Err(BridgeError::ChannelStart("session not started".into()));
        }
        if session.thread.is_some() {
            return Ok(());
        }
        let channel = session.channel.take().ok_or(BridgeError::ChannelBusy)?;

        session.stop_flag.store(false, Ordering::Release);
        session.running.store(true, Ordering::Release);
        let sinks = self.sinks.clone();
        let stop_flag = session.stop_flag.clone();
        let running = session.running.clone();
        let poll_timeout = self.poll_timeout;

        let spawned = std::thread::Builder::new()
            .name("rayneo-events".into())
            .spawn(move || event_loop(channel, sinks, stop_flag, running, poll_timeout));

        match spawned {
            Ok(thread) => {
                session.thread = Some(thread);
                Ok(())
            }
            Err(e) => {
                // The closure, and the channel with it, is gone.
                session.running.store(false, Ordering::Release);
                self.session = None;
                Err(BridgeError::Thread(format!(
                    "Failed to spawn telemetry event thread: {}",
                    e
                )))
            }
        }
    }

    /// Full bring-up: open, start, enable IMU, request info, spawn the loop.
    ///
    /// A start failure closes the session again so no handle leaks.
    pub fn init(&mut self, vendor_id: u16, product_id: u16) -> Result<()> {
        self.open(vendor_id, product_id)?;
        if let Err(e) = self.start() {
            self.close();
            return Err(e);
        }
        if let Err(e) = self.enable_telemetry_stream() {
            log::warn!("IMU stream not enabled, continuing without tracking: {}", e);
        }
        if let Err(e) = self.request_device_info() {
            log::warn!("Device info request failed: {}", e);
        }
        self.spawn_event_loop()
    }

    /// Stop the event loop and the device. Safe to call any number of times.
    pub fn stop(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        session.stop_flag.store(true, Ordering::Release);
        if let Some(thread) = session.thread.take() {
            match thread.join() {
                Ok(channel) => session.channel = Some(channel),
                Err(_) => log::warn!("Telemetry event thread panicked; channel handle lost"),
            }
        }
        session.running.store(false, Ordering::Release);

        if !session.started {
            return;
        }
        if let Some(channel) = session.channel.as_mut() {
            if session.imu_enabled {
                if let Err(e) = channel.disable_imu() {
                    log::warn!("Failed to disable IMU stream: {}", e);
                }
            }
            channel.stop();
        }
        session.imu_enabled = false;
        session.started = false;
        self.sinks.latch.set_imu_streaming(false);
        log::info!("Telemetry channel stopped");
    }

    /// Stop and release the channel handle.
    pub fn close(&mut self) {
        self.stop();
        if self.session.take().is_some() {
            log::info!("Telemetry channel closed");
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.close();
    }
}

/// Poll the channel until stopped or detached, then give the channel back.
fn event_loop(
    mut channel: Box<dyn TelemetryChannel>,
    sinks: SessionSinks,
    stop_flag: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    poll_timeout: Duration,
) -> Box<dyn TelemetryChannel> {
    log::info!("Telemetry event loop started");

    while !stop_flag.load(Ordering::Acquire) {
        match channel.poll_event(poll_timeout) {
            Ok(None) => continue,
            Ok(Some(event)) => {
                if !dispatch(&sinks, event) {
                    break;
                }
            }
            Err(e) => {
                log::warn!("Telemetry poll failed: {}", e);
                std::thread::sleep(POLL_ERROR_BACKOFF);
            }
        }
    }

    running.store(false, Ordering::Release);
    log::info!("Telemetry event loop exited");
    channel
}

/// Route one event. Returns false when the loop should exit.
fn dispatch(sinks: &SessionSinks, event: TelemetryEvent) -> bool {
    match event {
        TelemetryEvent::Attached => log::info!("Device attached"),
        TelemetryEvent::Detached => {
            log::info!("Device detached");
            return false;
        }
        TelemetryEvent::Imu(sample) => {
            sinks.orientation.integrate(&sample);
        }
        TelemetryEvent::DeviceInfo(info) => log_device_info(&info),
        TelemetryEvent::Notify { code, message } => {
            let notification = sinks.latch.on_notification(code);
            log::debug!("Notify 0x{:X} ({:?}): {}", code, notification, message);
        }
        TelemetryEvent::Log { level, message } => {
            log::log!(sdk_log_level(level), "[device] {}", message);
        }
    }
    true
}

fn log_device_info(info: &DeviceInfo) {
    log::info!(
        "Device info: tick={} sensor_on={} board_id={} date={} flag={} fps={}",
        info.tick,
        info.sensor_on,
        info.board_id,
        info.date,
        info.flag,
        info.glasses_fps
    );
}

fn sdk_log_level(level: i32) -> log::Level {
    match level {
        i32::MIN..=0 => log::Level::Debug,
        1 => log::Level::Info,
        2 => log::Level::Warn,
        _ => log::Level::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{replay, ChannelCall, ReplayBehavior, ReplayHandle};
    use crate::config::OrientationConfig;
    use crate::types::ImuSample;
    use std::time::Instant;

    fn manager(behavior: ReplayBehavior) -> (SessionManager, ReplayHandle) {
        let (connector, handle) = replay(behavior);
        let sinks = SessionSinks {
            orientation: Arc::new(Orientation::new(&OrientationConfig::default())),
            latch: Arc::new(NotificationLatch::new()),
        };
        (
            SessionManager::new(Box::new(connector), sinks, Duration::from_millis(20)),
            handle,
        )
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_open_is_idempotent() {
        let (mut mgr, handle) = manager(ReplayBehavior::default());
        mgr.open(0x1BBB, 0xAF50).unwrap();
        mgr.open(0x1BBB, 0xAF50).unwrap();
        let connects = handle
            .calls()
            .into_iter()
            .filter(|c| *c == ChannelCall::Connect)
            .count();
        assert_eq!(connects, 1);
    }

    #[test]
    fn test_start_failure_leaves_clean_state() {
        let (mut mgr, handle) = manager(ReplayBehavior {
            fail_start: true,
            ..Default::default()
        });
        mgr.open(1, 2).unwrap();
        assert!(matches!(mgr.start(), Err(BridgeError::ChannelStart(_))));
        assert!(mgr.is_open());
        assert!(!mgr.is_started());
        assert!(!mgr.is_event_thread_running());
        assert!(mgr.spawn_event_loop().is_err());

        mgr.stop();
        assert!(!handle.calls().contains(&ChannelCall::Stop));
    }

    #[test]
    fn test_init_failure_closes_handle() {
        let (mut mgr, handle) = manager(ReplayBehavior {
            fail_start: true,
            ..Default::default()
        });
        assert!(mgr.init(1, 2).is_err());
        assert!(!mgr.is_open());
        assert_eq!(handle.calls().last(), Some(&ChannelCall::Close));
    }

    #[test]
    fn test_imu_enable_failure_is_not_fatal() {
        let (mut mgr, _handle) = manager(ReplayBehavior {
            fail_enable_imu: true,
            ..Default::default()
        });
        mgr.init(1, 2).unwrap();
        assert!(mgr.is_event_thread_running());
        assert!(!mgr.sinks().latch.imu_streaming());
        mgr.close();
    }

    #[test]
    fn test_loop_dispatches_and_exits_on_detach() {
        let (mut mgr, handle) = manager(ReplayBehavior::default());
        mgr.init(1, 2).unwrap();
        assert!(mgr.sinks().latch.imu_streaming());

        handle.send(TelemetryEvent::Attached);
        handle.send(TelemetryEvent::Imu(ImuSample::from_rad([0.0, 2.0, 0.0], 100)));
        handle.send(TelemetryEvent::Imu(ImuSample::from_rad([0.0, 2.0, 0.0], 150)));
        handle.send(TelemetryEvent::Notify {
            code: crate::protocol::NOTIFY_SLEEP,
            message: "sleep".into(),
        });
        handle.send(TelemetryEvent::Detached);

        let sinks = mgr.sinks().clone();
        assert!(wait_until(|| !mgr.is_event_thread_running()));
        assert!(sinks.latch.is_sleeping());
        assert_ne!(sinks.orientation.snapshot().current, nalgebra::UnitQuaternion::identity());

        // Stop after a spontaneous exit still joins once and shuts the device down.
        mgr.stop();
        mgr.stop();
        let calls = handle.calls();
        let disable = calls.iter().position(|c| *c == ChannelCall::DisableImu);
        let stop = calls.iter().position(|c| *c == ChannelCall::Stop);
        assert!(disable.is_some() && stop.is_some() && disable < stop);
        assert_eq!(calls.iter().filter(|c| **c == ChannelCall::Stop).count(), 1);
    }

    #[test]
    fn test_channel_busy_while_loop_runs() {
        let (mut mgr, _handle) = manager(ReplayBehavior::default());
        mgr.init(1, 2).unwrap();
        assert!(matches!(mgr.request_device_info(), Err(BridgeError::ChannelBusy)));
        mgr.stop();
        assert!(!mgr.is_started());
        mgr.close();
        assert!(matches!(mgr.request_device_info(), Err(BridgeError::NotOpen)));
    }

    #[test]
    fn test_sdk_log_levels() {
        assert_eq!(sdk_log_level(-1), log::Level::Debug);
        assert_eq!(sdk_log_level(2), log::Level::Warn);
        assert_eq!(sdk_log_level(9), log::Level::Error);
    }
}
