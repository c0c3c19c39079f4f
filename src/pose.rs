use crate::debounce::NotificationLatch;
use crate::orientation::Orientation;
use crate::protocol;
use crate::types::{PoseReport, TrackingStatus};
use crate::{BridgeError, Result};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Builds pose reports from the shared orientation and sleep state.
///
/// Reading never waits for new data: it takes the orientation lock for one
/// copy and re-reports the last known state when nothing changed.
#[derive(Debug, Clone)]
pub struct PoseSource {
    orientation: Arc<Orientation>,
    latch: Arc<NotificationLatch>,
    head_height: f64,
    sleeping_head_height: f64,
    epoch: Instant,
}

impl PoseSource {
    pub fn new(
        orientation: Arc<Orientation>,
        latch: Arc<NotificationLatch>,
        head_height: f64,
        sleeping_head_height: f64,
    ) -> Self {
        Self {
            orientation,
            latch,
            head_height,
            sleeping_head_height,
            epoch: Instant::now(),
        }
    }

    pub fn pose(&self) -> PoseReport {
        let q = self.orientation.relative_orientation();
        let (w, x, y, z) = (q.w, q.i, q.j, q.k);
        let sleeping = self.latch.is_sleeping();

        PoseReport {
            quaternion: [x, y, z, w],
            position: [
                0.0,
                if sleeping {
                    self.sleeping_head_height
                } else {
                    self.head_height
                },
                0.0,
            ],
            euler_deg: protocol::quaternion_to_euler(w, x, y, z),
            pose_is_valid: !sleeping,
            // The device stays registered with the host for the whole session.
            device_is_connected: true,
            tracking: if sleeping {
                TrackingStatus::OutOfRange
            } else {
                TrackingStatus::RunningOk
            },
            host_timestamp_s: self.epoch.elapsed().as_secs_f64(),
        }
    }
}

/// Handle to a running pose producer.
///
/// A background thread samples [`PoseSource`] at a fixed interval and pushes
/// each report into a bounded channel. Reports are dropped, not queued, when
/// the consumer falls behind.
pub struct PoseStream {
    receiver: Receiver<PoseReport>,
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl PoseStream {
    pub fn start(source: PoseSource, interval: Duration) -> Result<PoseStream> {
        let (sender, receiver) = crossbeam_channel::bounded(64);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();

        let thread = std::thread::Builder::new()
            .name("rayneo-pose".into())
            .spawn(move || {
                pose_loop(source, sender, stop_clone, interval);
            })
            .map_err(|e| BridgeError::Thread(format!("Failed to spawn pose thread: {}", e)))?;

        Ok(PoseStream {
            receiver,
            stop_flag,
            thread: Some(thread),
        })
    }

    /// Receive the next report (blocks until available).
    pub fn recv(&self) -> Result<PoseReport> {
        self.receiver.recv().map_err(|_| BridgeError::StreamStopped)
    }

    pub fn try_recv(&self) -> Option<PoseReport> {
        self.receiver.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<PoseReport> {
        recv_pose(&self.receiver, timeout)
    }

    /// A receiver that outlives borrows of the stream. It reports
    /// [`BridgeError::StreamStopped`] once the producer is stopped.
    pub fn subscribe(&self) -> Receiver<PoseReport> {
        self.receiver.clone()
    }

    /// Drain the queue and return the newest report, if any.
    pub fn latest(&self) -> Option<PoseReport> {
        self.receiver.try_iter().last()
    }

    pub fn is_active(&self) -> bool {
        !self.stop_flag.load(Ordering::Relaxed)
    }

    /// Stop the producer and wait for its thread to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for PoseStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Receive one report with a bounded wait.
pub(crate) fn recv_pose(receiver: &Receiver<PoseReport>, timeout: Duration) -> Result<PoseReport> {
    receiver.recv_timeout(timeout).map_err(|e| match e {
        crossbeam_channel::RecvTimeoutError::Timeout => BridgeError::Timeout,
        crossbeam_channel::RecvTimeoutError::Disconnected => BridgeError::StreamStopped,
    })
}

fn pose_loop(
    source: PoseSource,
    sender: Sender<PoseReport>,
    stop_flag: Arc<AtomicBool>,
    interval: Duration,
) {
    log::info!("Pose producer started ({:?} interval)", interval);

    while !stop_flag.load(Ordering::Relaxed) {
        match sender.try_send(source.pose()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => log::trace!("Pose channel full, dropping report"),
            Err(TrySendError::Disconnected(_)) => {
                log::info!("Pose channel disconnected, stopping producer");
                break;
            }
        }
        std::thread::sleep(interval);
    }

    log::info!("Pose producer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrientationConfig;
    use crate::protocol::{NOTIFY_SLEEP, NOTIFY_WAKE};
    use crate::types::ImuSample;

    fn source() -> PoseSource {
        PoseSource::new(
            Arc::new(Orientation::new(&OrientationConfig::default())),
            Arc::new(NotificationLatch::new()),
            1.5,
            1.0,
        )
    }

    #[test]
    fn test_identity_pose_when_idle() {
        let pose = source().pose();
        assert_eq!(pose.quaternion, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(pose.position, [0.0, 1.5, 0.0]);
        assert!(pose.pose_is_valid);
        assert_eq!(pose.tracking, TrackingStatus::RunningOk);
    }

    #[test]
    fn test_sleep_invalidates_pose() {
        let src = source();
        src.latch.on_notification(NOTIFY_SLEEP);
        let pose = src.pose();
        assert!(!pose.pose_is_valid);
        assert_eq!(pose.tracking, TrackingStatus::OutOfRange);
        assert_eq!(pose.position[1], 1.0);
        assert!(pose.device_is_connected);

        src.latch.on_notification(NOTIFY_WAKE);
        assert!(src.pose().pose_is_valid);
    }

    #[test]
    fn test_pose_is_unit_after_rotation() {
        let src = source();
        src.orientation.integrate(&ImuSample::from_rad([0.0, 5.0, 0.0], 1));
        src.orientation.integrate(&ImuSample::from_rad([0.0, 5.0, 0.0], 101));
        let q = src.pose().quaternion;
        let norm = q.iter().map(|c| c * c).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
        assert!(q[1].abs() > 0.01);
    }

    #[test]
    fn test_stream_produces_and_stops() {
        let stream = PoseStream::start(source(), Duration::from_millis(1)).unwrap();
        let pose = stream.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(pose.pose_is_valid);
        assert!(stream.is_active());
        stream.stop();
    }
}
