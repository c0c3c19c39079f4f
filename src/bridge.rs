//! Composition root.
//!
//! [`Bridge`] owns one of everything: the session manager, the shared
//! orientation and notification state, the frame debouncer, the pose producer
//! and the resolved display configuration. The host runtime drives it.
//!
//! `Bridge` is `Sync`: the host frame thread and the pose reader may call it
//! concurrently. Each piece of mutable state sits behind its own lock and no
//! method holds two of them at once.

use crate::channel::{self, Connector};
use crate::config::BridgeConfig;
use crate::debounce::{Debouncer, NotificationLatch};
use crate::device;
use crate::display::{self, DisplayEnumerator, DisplayResolver};
use crate::orientation::Orientation;
use crate::pose::{self, PoseSource, PoseStream};
use crate::session::{SessionManager, SessionSinks};
use crate::types::{Button, DisplayConfig, Eye, FrameReport, PoseReport, Viewport};
use crate::{BridgeError, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

// Every guarded value is left consistent between statements, so a poisoned
// lock is still safe to use.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Bridge {
    config: BridgeConfig,
    orientation: Arc<Orientation>,
    latch: Arc<NotificationLatch>,
    session: Mutex<SessionManager>,
    /// Why tracking is off, if session bring-up failed.
    init_error: Option<BridgeError>,
    debouncer: Mutex<Debouncer>,
    pose_source: PoseSource,
    pose_stream: Mutex<Option<PoseStream>>,
    display: DisplayConfig,
}

impl Bridge {
    /// Bring the bridge up with the build's telemetry connector and the
    /// platform display enumerator.
    ///
    /// Never fails: a missing device leaves an identity pose, a missing
    /// display leaves the fallback window.
    pub fn init(config: BridgeConfig) -> Self {
        device::log_presence(config.vendor_id, config.product_id);
        Self::with_parts(
            config,
            channel::default_connector(),
            display::platform_enumerator(),
        )
    }

    pub fn with_parts(
        config: BridgeConfig,
        connector: Box<dyn Connector>,
        enumerator: Box<dyn DisplayEnumerator>,
    ) -> Self {
        let orientation = Arc::new(Orientation::new(&config.orientation));
        let latch = Arc::new(NotificationLatch::new());

        let mut session = SessionManager::new(
            connector,
            SessionSinks {
                orientation: orientation.clone(),
                latch: latch.clone(),
            },
            config.poll_timeout,
        );
        let init_error = match session.init(config.vendor_id, config.product_id) {
            Ok(()) => {
                log::info!("Telemetry session running");
                None
            }
            Err(e) => {
                log::warn!("Telemetry unavailable, running without tracking: {}", e);
                Some(e)
            }
        };

        let resolver = DisplayResolver::new(enumerator, config.display, config.fallback_display);
        resolver.wait_for_desktop();
        let display = resolver.display_config();

        let debouncer = Debouncer::new(latch.clone(), config.debounce);
        let pose_source = PoseSource::new(
            orientation.clone(),
            latch.clone(),
            config.head_height,
            config.sleeping_head_height,
        );

        Self {
            config,
            orientation,
            latch,
            session: Mutex::new(session),
            init_error,
            debouncer: Mutex::new(debouncer),
            pose_source,
            pose_stream: Mutex::new(None),
            display,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The error that kept the telemetry session from starting, if any.
    pub fn init_error(&self) -> Option<&BridgeError> {
        self.init_error.as_ref()
    }

    /// Start the background pose producer. No-op if already running.
    pub fn activate(&self) -> Result<()> {
        let mut slot = lock(&self.pose_stream);
        if slot.is_none() {
            let stream = PoseStream::start(self.pose_source.clone(), self.config.pose_interval)?;
            *slot = Some(stream);
        }
        Ok(())
    }

    /// Stop the pose producer. Pending [`Bridge::next_pose`] calls return
    /// [`BridgeError::StreamStopped`].
    pub fn deactivate(&self) {
        let stream = lock(&self.pose_stream).take();
        if let Some(stream) = stream {
            stream.stop();
        }
    }

    pub fn is_active(&self) -> bool {
        lock(&self.pose_stream).is_some()
    }

    /// One host frame of button processing. A double click recenters.
    pub fn run_frame(&self) -> FrameReport {
        self.run_frame_at(Instant::now())
    }

    pub fn run_frame_at(&self, now: Instant) -> FrameReport {
        let report = lock(&self.debouncer).tick_at(now);
        if report.recenter {
            self.orientation.recenter();
        }
        report
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        lock(&self.debouncer).is_pressed(button)
    }

    /// Current pose, computed now.
    pub fn pose(&self) -> PoseReport {
        self.pose_source.pose()
    }

    /// Next report from the pose producer. Requires [`Bridge::activate`].
    ///
    /// Waits without holding any bridge lock.
    pub fn next_pose(&self, timeout: Duration) -> Result<PoseReport> {
        let receiver = lock(&self.pose_stream)
            .as_ref()
            .map(PoseStream::subscribe)
            .ok_or(BridgeError::StreamStopped)?;
        pose::recv_pose(&receiver, timeout)
    }

    pub fn recenter(&self) {
        self.orientation.recenter();
    }

    pub fn is_tracking(&self) -> bool {
        let session = lock(&self.session);
        session.is_started() && session.is_event_thread_running()
    }

    pub fn is_sleeping(&self) -> bool {
        self.latch.is_sleeping()
    }

    pub fn display_config(&self) -> DisplayConfig {
        self.display
    }

    pub fn eye_viewport(&self, eye: Eye) -> Viewport {
        self.display.eye_viewport(eye)
    }

    /// Stop the pose producer, then the session. Idempotent.
    pub fn shutdown(&self) {
        self.deactivate();
        lock(&self.session).close();
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{replay, ChannelCall, ReplayBehavior, ReplayHandle};
    use crate::config::{DisplayTarget, FALLBACK_DISPLAY};
    use crate::display::NullEnumerator;
    use crate::protocol::{NOTIFY_BUTTON_BRIGHTNESS, NOTIFY_SLEEP, NOTIFY_WAKE};
    use crate::types::{ImuSample, RetryPolicy, TelemetryEvent};
    use crate::BridgeError;

    fn test_config() -> BridgeConfig {
        BridgeConfig {
            poll_timeout: Duration::from_millis(10),
            pose_interval: Duration::from_millis(1),
            display: DisplayTarget {
                identity_wait: RetryPolicy::once(),
                placement_wait: RetryPolicy::once(),
                startup_wait: RetryPolicy::once(),
                ..DisplayTarget::default()
            },
            ..BridgeConfig::default()
        }
    }

    fn bridge(behavior: ReplayBehavior) -> (Bridge, ReplayHandle) {
        let (connector, handle) = replay(behavior);
        let bridge =
            Bridge::with_parts(test_config(), Box::new(connector), Box::new(NullEnumerator));
        (bridge, handle)
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    fn notify(handle: &ReplayHandle, code: u32) {
        handle.send(TelemetryEvent::Notify {
            code,
            message: String::new(),
        });
    }

    fn is_identity(q: [f32; 4]) -> bool {
        q[..3].iter().all(|c| c.abs() < 1e-4) && (q[3].abs() - 1.0).abs() < 1e-4
    }

    #[test]
    fn test_degraded_without_device() {
        let (b, handle) = bridge(ReplayBehavior {
            fail_start: true,
            ..Default::default()
        });
        assert!(!b.is_tracking());
        assert!(matches!(b.init_error(), Some(BridgeError::ChannelStart(_))));
        assert_eq!(b.display_config(), FALLBACK_DISPLAY);
        assert_eq!(b.eye_viewport(Eye::Left).width, 960);

        let pose = b.pose();
        assert!(pose.pose_is_valid);
        assert!(is_identity(pose.quaternion));
        assert!(b.run_frame().pressed.is_empty());

        b.shutdown();
        assert!(!handle.calls().contains(&ChannelCall::Stop));
        assert!(handle.calls().contains(&ChannelCall::Close));
    }

    #[test]
    fn test_double_click_recenters_pose() {
        let (b, handle) = bridge(ReplayBehavior::default());
        assert!(b.is_tracking());

        handle.send(TelemetryEvent::Imu(ImuSample::from_rad([0.0, 5.0, 0.0], 1)));
        handle.send(TelemetryEvent::Imu(ImuSample::from_rad([0.0, 5.0, 0.0], 101)));
        assert!(wait_until(|| !is_identity(b.pose().quaternion)));

        let t0 = Instant::now();
        notify(&handle, NOTIFY_BUTTON_BRIGHTNESS);
        std::thread::sleep(Duration::from_millis(100));
        assert!(!b.run_frame_at(t0).recenter);
        assert!(lock(&b.debouncer).is_waiting_for_second_click());

        notify(&handle, NOTIFY_BUTTON_BRIGHTNESS);
        std::thread::sleep(Duration::from_millis(100));
        let report = b.run_frame_at(t0 + Duration::from_millis(50));
        assert!(report.recenter);
        assert!(!b.is_pressed(Button::AppMenu));
        assert!(is_identity(b.pose().quaternion));
    }

    #[test]
    fn test_sleep_invalidates_pose_until_wake() {
        let (b, handle) = bridge(ReplayBehavior::default());
        notify(&handle, NOTIFY_SLEEP);
        assert!(wait_until(|| b.is_sleeping()));
        let pose = b.pose();
        assert!(!pose.pose_is_valid);
        assert!(pose.device_is_connected);
        assert_eq!(pose.position[1], b.config().sleeping_head_height);

        notify(&handle, NOTIFY_WAKE);
        assert!(wait_until(|| b.pose().pose_is_valid));
        assert_eq!(b.pose().position[1], b.config().head_height);
    }

    #[test]
    fn test_detach_stops_tracking() {
        let (b, handle) = bridge(ReplayBehavior::default());
        assert!(b.is_tracking());
        drop(handle);
        assert!(wait_until(|| !b.is_tracking()));
        assert!(b.pose().pose_is_valid);
    }

    #[test]
    fn test_pose_producer_lifecycle() {
        let (b, handle) = bridge(ReplayBehavior::default());
        assert!(matches!(
            b.next_pose(Duration::ZERO),
            Err(BridgeError::StreamStopped)
        ));

        b.activate().unwrap();
        b.activate().unwrap();
        assert!(b.is_active());
        let pose = b.next_pose(Duration::from_secs(2)).unwrap();
        assert_eq!(pose.tracking, crate::types::TrackingStatus::RunningOk);

        b.shutdown();
        b.shutdown();
        assert!(!b.is_active());
        let calls = handle.calls();
        assert_eq!(calls.iter().filter(|c| **c == ChannelCall::Stop).count(), 1);
        assert_eq!(calls.last(), Some(&ChannelCall::Close));
    }

    #[test]
    fn test_bridge_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Bridge>();
    }

    #[test]
    fn test_frame_and_pose_threads_run_concurrently() {
        let (b, handle) = bridge(ReplayBehavior::default());
        assert!(b.init_error().is_none());
        b.activate().unwrap();

        std::thread::scope(|scope| {
            let reader = scope.spawn(|| {
                let mut received = 0;
                loop {
                    match b.next_pose(Duration::from_millis(50)) {
                        Ok(_) => received += 1,
                        Err(BridgeError::StreamStopped) => return received,
                        Err(e) => panic!("unexpected pose error: {}", e),
                    }
                }
            });

            for frame in 0..200 {
                if frame == 20 {
                    notify(&handle, crate::protocol::NOTIFY_BUTTON);
                }
                b.run_frame();
                b.pose();
                std::thread::sleep(Duration::from_millis(1));
            }
            // Stopping the producer releases a reader blocked in next_pose.
            b.deactivate();
            let received = reader.join().unwrap();
            assert!(received > 0);
        });

        assert!(!b.is_active());
        assert!(matches!(
            b.next_pose(Duration::ZERO),
            Err(BridgeError::StreamStopped)
        ));
    }
}
