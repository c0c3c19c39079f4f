//! Telemetry channel capability interface.
//!
//! The channel is the vendor side of the bridge: a handle that starts the
//! device, toggles the IMU stream and yields typed events with a bounded wait.
//! The session manager only ever talks to it through [`TelemetryChannel`], so
//! the vendor SDK, a recorded replay, or a test script are interchangeable.

use crate::types::TelemetryEvent;
use crate::{BridgeError, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// An open telemetry channel to one device.
///
/// Owned by exactly one thread at a time: the session until the event loop
/// starts, then the event loop until it returns the channel on exit.
pub trait TelemetryChannel: Send {
    /// Start talking to the device. Fails if it is not physically present.
    fn start(&mut self) -> Result<()>;

    fn enable_imu(&mut self) -> Result<()>;

    fn disable_imu(&mut self) -> Result<()>;

    /// Fire-and-forget; the answer arrives as [`TelemetryEvent::DeviceInfo`].
    fn request_device_info(&mut self) -> Result<()>;

    /// Wait up to `timeout` for the next event. `Ok(None)` on timeout.
    fn poll_event(&mut self, timeout: Duration) -> Result<Option<TelemetryEvent>>;

    fn stop(&mut self);
}

/// Creates channels bound to a vendor/product id pair.
pub trait Connector: Send + Sync {
    fn connect(&self, vendor_id: u16, product_id: u16) -> Result<Box<dyn TelemetryChannel>>;
}

/// Connector used when no vendor SDK is linked in. Every connect fails, which
/// leaves the bridge in its degraded identity-pose mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableConnector;

impl Connector for UnavailableConnector {
    fn connect(&self, _vendor_id: u16, _product_id: u16) -> Result<Box<dyn TelemetryChannel>> {
        Err(BridgeError::SdkUnavailable)
    }
}

/// The connector for this build: the vendor SDK when linked, otherwise unavailable.
pub fn default_connector() -> Box<dyn Connector> {
    #[cfg(feature = "vendor-sdk")]
    {
        Box::new(crate::sdk::SdkConnector)
    }
    #[cfg(not(feature = "vendor-sdk"))]
    {
        Box::new(UnavailableConnector)
    }
}

/// Channel operations recorded by the replay channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCall {
    Connect,
    Start,
    EnableImu,
    DisableImu,
    RequestDeviceInfo,
    Stop,
    Close,
}

/// Failure injection for the replay channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayBehavior {
    pub fail_connect: bool,
    pub fail_start: bool,
    pub fail_enable_imu: bool,
}

type CallLog = Arc<Mutex<Vec<ChannelCall>>>;

fn record(log: &CallLog, call: ChannelCall) {
    if let Ok(mut calls) = log.lock() {
        calls.push(call);
    }
}

/// Feeding side of a replay channel.
#[derive(Debug, Clone)]
pub struct ReplayHandle {
    sender: Sender<TelemetryEvent>,
    calls: CallLog,
}

impl ReplayHandle {
    /// Queue an event. Returns false once every receiver is gone.
    pub fn send(&self, event: TelemetryEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    pub fn sender(&self) -> Sender<TelemetryEvent> {
        self.sender.clone()
    }

    /// Channel operations performed so far, in order.
    pub fn calls(&self) -> Vec<ChannelCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

/// Connector producing channels that replay events queued on a [`ReplayHandle`].
#[derive(Debug, Clone)]
pub struct ReplayConnector {
    receiver: Receiver<TelemetryEvent>,
    calls: CallLog,
    behavior: ReplayBehavior,
}

/// Create a replay connector and the handle that feeds it.
pub fn replay(behavior: ReplayBehavior) -> (ReplayConnector, ReplayHandle) {
    let (sender, receiver) = crossbeam_channel::unbounded();
    let calls = CallLog::default();
    (
        ReplayConnector {
            receiver,
            calls: calls.clone(),
            behavior,
        },
        ReplayHandle { sender, calls },
    )
}

impl Connector for ReplayConnector {
    fn connect(&self, vendor_id: u16, product_id: u16) -> Result<Box<dyn TelemetryChannel>> {
        record(&self.calls, ChannelCall::Connect);
        if self.behavior.fail_connect {
            return Err(BridgeError::ChannelCreate(format!(
                "replay connect refused for {:04X}:{:04X}",
                vendor_id, product_id
            )));
        }
        Ok(Box::new(ReplayChannel {
            receiver: self.receiver.clone(),
            calls: self.calls.clone(),
            behavior: self.behavior,
        }))
    }
}

/// A telemetry channel backed by a crossbeam queue.
///
/// When every [`ReplayHandle`] is dropped the channel reports the device as
/// detached, like a cable pull.
pub struct ReplayChannel {
    receiver: Receiver<TelemetryEvent>,
    calls: CallLog,
    behavior: ReplayBehavior,
}

impl TelemetryChannel for ReplayChannel {
    fn start(&mut self) -> Result<()> {
        record(&self.calls, ChannelCall::Start);
        if self.behavior.fail_start {
            return Err(BridgeError::ChannelStart("replay device not present".into()));
        }
        Ok(())
    }

    fn enable_imu(&mut self) -> Result<()> {
        record(&self.calls, ChannelCall::EnableImu);
        if self.behavior.fail_enable_imu {
            return Err(BridgeError::Telemetry("replay IMU stream refused".into()));
        }
        Ok(())
    }

    fn disable_imu(&mut self) -> Result<()> {
        record(&self.calls, ChannelCall::DisableImu);
        Ok(())
    }

    fn request_device_info(&mut self) -> Result<()> {
        record(&self.calls, ChannelCall::RequestDeviceInfo);
        Ok(())
    }

    fn poll_event(&mut self, timeout: Duration) -> Result<Option<TelemetryEvent>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Ok(Some(TelemetryEvent::Detached)),
        }
    }

    fn stop(&mut self) {
        record(&self.calls, ChannelCall::Stop);
    }
}

impl Drop for ReplayChannel {
    fn drop(&mut self) {
        record(&self.calls, ChannelCall::Close);
    }
}
